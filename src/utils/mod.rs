pub use logger::Throttle;

pub mod logger;

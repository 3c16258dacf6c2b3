use std::{error::Error, fmt};

/// Failure raised by the delta builders when a feed has no resolved binding.
///
/// Fatal to the current share cycle only; the scheduler reports it through
/// `on_error` and the next cycle proceeds as usual.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeltaError {
    MissingBinding { feed: &'static str },
}

impl fmt::Display for DeltaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaError::MissingBinding { feed } => {
                write!(f, "unable to find binding for feed {feed}")
            }
        }
    }
}

impl Error for DeltaError {}

/// Failure raised while loading a definitions batch.
///
/// Any malformed record aborts the whole batch before a single event is
/// emitted; this is the only hard startup failure.
#[derive(Debug)]
pub enum IngestError {
    Malformed(serde_json::Error),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::Malformed(err) => write!(f, "unable to load definitions: {err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            IngestError::Malformed(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Malformed(err)
    }
}

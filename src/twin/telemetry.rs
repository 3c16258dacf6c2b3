use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::time::{Duration, Instant};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Immutable snapshot produced by one generator tick.
///
/// Not retained beyond delta construction and the remote push.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub operational: bool,
    /// `POINT(<lat> <lon>)` literal for the current position.
    pub wkt: String,
    pub speed_kmh: f64,
    /// Heading in radians.
    pub bearing: f64,
}

/// Mutable physics state of one twin.
///
/// The entity travels outward from its start point along a fixed random
/// bearing at a fixed random speed until the outbound leg is covered, then
/// reverses by pi radians and returns; at zero distance it reverses again,
/// indefinitely. Speed and leg length are drawn once at construction.
#[derive(Debug)]
pub struct SimulationState {
    lat: f64,
    lon: f64,
    speed_kmh: f64,
    bearing: f64,
    max_distance_km: f64,
    distance_covered_km: f64,
    returning: bool,
    last_update: Instant,
    rng: StdRng,
}

impl SimulationState {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self::with_rng(lat, lon, StdRng::from_entropy())
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_rng(lat: f64, lon: f64, mut rng: StdRng) -> Self {
        Self {
            lat,
            lon,
            speed_kmh: rng.gen_range(45.0..55.0),
            bearing: rng.gen_range(0.0..2.0 * PI),
            max_distance_km: rng.gen_range(5.0..20.0),
            distance_covered_km: 0.0,
            returning: false,
            last_update: Instant::now(),
            rng,
        }
    }

    /// Advances by the wall-clock time since the previous tick.
    pub fn tick(&mut self) -> TelemetrySample {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update);
        self.last_update = now;
        self.advance(elapsed)
    }

    /// One simulation step for a given elapsed time. No I/O; the only
    /// nondeterminism is the owned RNG (operational flag is re-sampled
    /// uniformly every step, independent of motion).
    pub fn advance(&mut self, elapsed: Duration) -> TelemetrySample {
        let hours = elapsed.as_secs_f64() / 3600.0;
        let mut distance = self.speed_kmh * hours;

        if !self.returning {
            self.distance_covered_km += distance;
            if self.distance_covered_km >= self.max_distance_km {
                self.returning = true;
                self.bearing += PI;
                distance = self.distance_covered_km - self.max_distance_km;
                self.distance_covered_km = self.max_distance_km;
            }
        } else {
            self.distance_covered_km -= distance;
            if self.distance_covered_km <= 0.0 {
                self.returning = false;
                self.bearing += PI;
                distance = -self.distance_covered_km;
                self.distance_covered_km = 0.0;
            }
        }

        // Flat-earth advance; adequate for legs of a few kilometres.
        let d_lat = distance / EARTH_RADIUS_KM * (180.0 / PI);
        let d_lon =
            distance / (EARTH_RADIUS_KM * (PI * self.lat / 180.0).cos()) * (180.0 / PI);
        self.lat += d_lat * self.bearing.cos();
        self.lon += d_lon * self.bearing.sin();

        TelemetrySample {
            operational: self.rng.gen_bool(0.5),
            wkt: format!("POINT({} {})", self.lat, self.lon),
            speed_kmh: self.speed_kmh,
            bearing: self.bearing,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }

    pub fn distance_covered_km(&self) -> f64 {
        self.distance_covered_km
    }

    pub fn returning(&self) -> bool {
        self.returning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> SimulationState {
        SimulationState::with_rng(51.5, -0.12, StdRng::seed_from_u64(seed))
    }

    #[test]
    fn outbound_distance_never_exceeds_leg_by_more_than_one_increment() {
        let mut state = seeded(7);
        let step = Duration::from_secs(60);
        let increment = state.speed_kmh() / 60.0;
        for _ in 0..2000 {
            state.advance(step);
            assert!(
                state.distance_covered_km() <= state.max_distance_km() + increment,
                "covered {} exceeds leg {} by more than {}",
                state.distance_covered_km(),
                state.max_distance_km(),
                increment
            );
            assert!(state.distance_covered_km() >= 0.0);
        }
    }

    #[test]
    fn bearing_reverses_at_leg_threshold() {
        let mut state = seeded(11);
        let initial_bearing = {
            // Peek before any motion.
            let s = state.advance(Duration::ZERO);
            s.bearing
        };
        // One giant step covers the whole outbound leg.
        state.advance(Duration::from_secs(3600 * 5));
        assert!(state.returning());
        let reversed = state.advance(Duration::ZERO).bearing;
        assert!((reversed - initial_bearing - PI).abs() < 1e-9);
    }

    #[test]
    fn returning_flips_back_at_origin() {
        let mut state = seeded(13);
        state.advance(Duration::from_secs(3600 * 5));
        assert!(state.returning());
        state.advance(Duration::from_secs(3600 * 5));
        assert!(!state.returning());
        assert_eq!(state.distance_covered_km(), 0.0);
    }

    #[test]
    fn operational_flag_is_resampled_every_tick() {
        let mut state = seeded(7);
        let flags: Vec<bool> = (0..64)
            .map(|_| state.advance(Duration::from_secs(1)).operational)
            .collect();
        assert!(flags.iter().any(|f| *f));
        assert!(flags.iter().any(|f| !*f));
    }

    #[test]
    fn sample_carries_wkt_point_and_fixed_speed() {
        let mut state = seeded(3);
        let speed = state.speed_kmh();
        assert!((45.0..55.0).contains(&speed));
        assert!((5.0..20.0).contains(&state.max_distance_km()));
        let sample = state.advance(Duration::from_secs(30));
        assert!(sample.wkt.starts_with("POINT("));
        assert!(sample.wkt.ends_with(')'));
        assert_eq!(sample.speed_kmh, speed);
    }

    #[test]
    fn zero_elapsed_does_not_move() {
        let mut state = seeded(5);
        let before = state.position();
        state.advance(Duration::ZERO);
        assert_eq!(state.position(), before);
    }
}

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::twin::telemetry::{SimulationState, TelemetrySample};

pub mod telemetry;

/// Initial coordinates of a twin, as found in the definitions file.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Static description of one entity, parsed from one record of the
/// definitions batch. Immutable; consumed once to derive a [`TwinIdentity`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinDefinition {
    pub identifier: String,
    pub label: String,
    pub owner: String,
    pub manufacturer_name: String,
    pub model: String,
    pub colour: String,
    pub unit: i32,
    pub comment: String,
    #[serde(default)]
    pub operational: bool,
    pub location: GeoPoint,
}

/// Opaque handle bound 1:1 to a definition's identifier.
///
/// Derived exactly once per identifier by an
/// [`IdentityProvider`](crate::remote::IdentityProvider); owned by the twin
/// for its entire lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TwinIdentity {
    pub identifier: String,
    pub did: String,
}

/// Live instance of one entity: definition, identity, and the mutable
/// simulation state ticked by its share loop.
#[derive(Debug)]
pub struct Twin {
    definition: TwinDefinition,
    identity: TwinIdentity,
    state: Mutex<SimulationState>,
}

impl Twin {
    pub fn new(definition: TwinDefinition, identity: TwinIdentity) -> Self {
        let state = SimulationState::new(
            definition.location.latitude,
            definition.location.longitude,
        );
        Self::with_state(definition, identity, state)
    }

    /// Constructor taking a pre-built simulation state, for deterministic
    /// setups.
    pub fn with_state(
        definition: TwinDefinition,
        identity: TwinIdentity,
        state: SimulationState,
    ) -> Self {
        Self {
            definition,
            identity,
            state: Mutex::new(state),
        }
    }

    pub fn definition(&self) -> &TwinDefinition {
        &self.definition
    }

    pub fn identity(&self) -> &TwinIdentity {
        &self.identity
    }

    pub fn did(&self) -> &str {
        &self.identity.did
    }

    /// Advances the simulation by the wall-clock time elapsed since the
    /// previous tick and returns a fresh telemetry sample.
    pub fn tick(&self) -> TelemetrySample {
        self.state.lock().tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn definition() -> TwinDefinition {
        serde_json::from_str(
            r#"{
                "identifier": "car-1",
                "label": "Car 1",
                "owner": "Ada",
                "manufacturerName": "Maker",
                "model": "M1",
                "colour": "red",
                "unit": 4,
                "comment": "fleet car",
                "location": {"latitude": 51.5, "longitude": -0.12}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn definition_parses_with_default_operational_flag() {
        let definition = definition();
        assert_eq!(definition.manufacturer_name, "Maker");
        assert_eq!(definition.unit, 4);
        assert!(!definition.operational);
    }

    #[test]
    fn twin_ticks_its_own_state() {
        let definition = definition();
        let identity = TwinIdentity {
            identifier: definition.identifier.clone(),
            did: "did:twin:abc".into(),
        };
        let state = SimulationState::with_rng(
            definition.location.latitude,
            definition.location.longitude,
            StdRng::seed_from_u64(42),
        );
        let twin = Twin::with_state(definition, identity, state);
        let sample = twin.tick();
        assert!(sample.wkt.starts_with("POINT("));
        assert!((45.0..55.0).contains(&sample.speed_kmh));
        assert_eq!(twin.did(), "did:twin:abc");
    }
}

use crate::error::DeltaError;
use crate::remote::bindings::Binding;
use crate::semantic::{Delta, Literal, Statement, vocab};
use crate::twin::TwinIdentity;
use crate::twin::telemetry::TelemetrySample;

/// Feed carrying the operational flag.
pub const STATUS_FEED: &str = "status";
/// Feed carrying position, speed and heading.
pub const LOCATION_FEED: &str = "locationData";

const VALUE_KEY_VALUE: &str = "value";
const VALUE_KEY_WKT: &str = "wktLiteral";
const VALUE_KEY_SPEED: &str = "speed";
const VALUE_KEY_DIRECTION: &str = "direction";

/// Statically declared mapping from a location value key to the predicate
/// linking it from the feed resource and the suffix of its sub-identifier.
const LOCATION_SCHEMA: [(&str, &str, &str); 3] = [
    (VALUE_KEY_WKT, vocab::HAS_GEOMETRY, "_geometry"),
    (VALUE_KEY_SPEED, vocab::HAS_SPEED, "_speed"),
    (VALUE_KEY_DIRECTION, vocab::HAS_DIRECTION, "_direction"),
];

/// Builds the replace-delta for the status feed.
///
/// Fails with [`DeltaError::MissingBinding`] when no binding advertises the
/// feed; fatal for this cycle only.
pub fn build_status_delta(
    identity: &TwinIdentity,
    bindings: &[Binding],
    sample: &TelemetrySample,
) -> Result<Delta, DeltaError> {
    let feed = Binding::for_feed(bindings, STATUS_FEED);
    let first = feed.first().ok_or(DeltaError::MissingBinding { feed: STATUS_FEED })?;

    let resource = first.value_id.as_str();
    let mut delta = Delta::new();
    push_feed_header(&mut delta, resource, first, &identity.did);

    if let Some(binding) = Binding::find(bindings, STATUS_FEED, VALUE_KEY_VALUE) {
        let value_node = format!("{}_value", first.value_id);
        delta.push(Statement::iri(resource, vocab::HAS_VALUE, &value_node));
        push_value_key(&mut delta, &value_node, binding);
        delta.push(Statement::literal(
            &value_node,
            vocab::PAYLOAD,
            Literal::Bool(sample.operational),
        ));
    }

    Ok(delta)
}

/// Builds the replace-delta for the location feed.
///
/// The geometry, speed and direction value nodes are each optional and
/// independent; whichever bindings exist get a payload.
pub fn build_location_delta(
    identity: &TwinIdentity,
    bindings: &[Binding],
    sample: &TelemetrySample,
) -> Result<Delta, DeltaError> {
    let feed = Binding::for_feed(bindings, LOCATION_FEED);
    let first = feed
        .first()
        .ok_or(DeltaError::MissingBinding { feed: LOCATION_FEED })?;

    let resource = first.value_id.as_str();
    let mut delta = Delta::new();
    push_feed_header(&mut delta, resource, first, &identity.did);

    for (key, predicate, suffix) in LOCATION_SCHEMA {
        let Some(binding) = Binding::find(bindings, LOCATION_FEED, key) else {
            continue;
        };
        let node = format!("{}{}", first.value_id, suffix);
        delta.push(Statement::iri(resource, predicate, &node));
        push_value_key(&mut delta, &node, binding);
        match key {
            VALUE_KEY_WKT => {
                delta.push(Statement::iri(&node, vocab::RDF_TYPE, vocab::SPATIAL_OBJECT));
                delta.push(Statement::literal(
                    &node,
                    vocab::AS_WKT,
                    Literal::Typed {
                        value: sample.wkt.clone(),
                        datatype: vocab::WKT_LITERAL.to_string(),
                    },
                ));
            }
            VALUE_KEY_SPEED => {
                delta.push(Statement::literal(
                    &node,
                    vocab::PAYLOAD,
                    Literal::Double(sample.speed_kmh),
                ));
            }
            VALUE_KEY_DIRECTION => {
                delta.push(Statement::literal(
                    &node,
                    vocab::PAYLOAD,
                    Literal::Double(sample.bearing),
                ));
            }
            _ => {}
        }
    }

    Ok(delta)
}

fn push_feed_header(delta: &mut Delta, resource: &str, binding: &Binding, did: &str) {
    delta.push(Statement::literal(
        resource,
        vocab::POINT_NAME,
        Literal::String(binding.point_name.clone()),
    ));
    delta.push(Statement::iri(resource, vocab::POINT_ID, &binding.point_id));
    delta.push(Statement::iri(resource, vocab::TWIN_ID, did));
}

fn push_value_key(delta: &mut Delta, node: &str, binding: &Binding) {
    if let Some(key) = &binding.value_key {
        delta.push(Statement::literal(
            node,
            vocab::VALUE_KEY,
            Literal::String(key.clone()),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::Term;

    fn identity() -> TwinIdentity {
        TwinIdentity {
            identifier: "car-1".into(),
            did: "did:twin:abc".into(),
        }
    }

    fn sample(operational: bool) -> TelemetrySample {
        TelemetrySample {
            operational,
            wkt: "POINT(51.5 -0.12)".into(),
            speed_kmh: 48.0,
            bearing: 1.25,
        }
    }

    fn binding(point_name: &str, value_id: &str, value_key: Option<&str>) -> Binding {
        Binding {
            point_id: format!("urn:point:{point_name}"),
            point_name: point_name.into(),
            value_id: value_id.into(),
            value_key: value_key.map(Into::into),
        }
    }

    fn payloads(delta: &Delta) -> Vec<&Statement> {
        delta
            .statements()
            .iter()
            .filter(|s| s.predicate == vocab::PAYLOAD)
            .collect()
    }

    #[test]
    fn status_delta_carries_exactly_one_boolean_payload() {
        let bindings = vec![binding(STATUS_FEED, "urn:value:status", Some("value"))];
        let delta = build_status_delta(&identity(), &bindings, &sample(true)).unwrap();

        let payloads = payloads(&delta);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].object, Term::Literal(Literal::Bool(true)));
        assert_eq!(payloads[0].subject, "urn:value:status_value");
        assert!(delta.subjects().contains("urn:value:status"));
    }

    #[test]
    fn status_delta_without_value_key_has_header_only() {
        let bindings = vec![binding(STATUS_FEED, "urn:value:status", None)];
        let delta = build_status_delta(&identity(), &bindings, &sample(false)).unwrap();
        assert_eq!(delta.len(), 3);
        assert!(payloads(&delta).is_empty());
    }

    #[test]
    fn missing_feed_binding_is_an_error() {
        let bindings = vec![binding(LOCATION_FEED, "urn:value:loc", Some("wktLiteral"))];
        let err = build_status_delta(&identity(), &bindings, &sample(true)).unwrap_err();
        assert_eq!(err, DeltaError::MissingBinding { feed: STATUS_FEED });

        let err = build_location_delta(&identity(), &[], &sample(true)).unwrap_err();
        assert_eq!(err, DeltaError::MissingBinding { feed: LOCATION_FEED });
    }

    #[test]
    fn location_delta_emits_geometry_with_typed_literal() {
        let bindings = vec![binding(LOCATION_FEED, "urn:value:loc", Some("wktLiteral"))];
        let delta = build_location_delta(&identity(), &bindings, &sample(true)).unwrap();

        let geom = "urn:value:loc_geometry";
        assert!(delta.statements().iter().any(|s| {
            s.subject == "urn:value:loc"
                && s.predicate == vocab::HAS_GEOMETRY
                && s.object == Term::Iri(geom.into())
        }));
        assert!(delta.statements().iter().any(|s| {
            s.subject == geom
                && s.predicate == vocab::AS_WKT
                && s.object
                    == Term::Literal(Literal::Typed {
                        value: "POINT(51.5 -0.12)".into(),
                        datatype: vocab::WKT_LITERAL.into(),
                    })
        }));
        // No speed or direction bindings, so no double payloads.
        assert!(payloads(&delta).is_empty());
    }

    #[test]
    fn location_value_nodes_are_independent() {
        let bindings = vec![
            binding(LOCATION_FEED, "urn:value:loc", Some("speed")),
            binding(LOCATION_FEED, "urn:value:loc", Some("direction")),
        ];
        let delta = build_location_delta(&identity(), &bindings, &sample(true)).unwrap();

        let payloads = payloads(&delta);
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().any(|s| s.subject == "urn:value:loc_speed"
            && s.object == Term::Literal(Literal::Double(48.0))));
        assert!(payloads.iter().any(|s| s.subject == "urn:value:loc_direction"
            && s.object == Term::Literal(Literal::Double(1.25))));
        assert!(!delta.statements().iter().any(|s| s.predicate == vocab::AS_WKT));
    }

    #[test]
    fn header_names_the_twin() {
        let bindings = vec![binding(STATUS_FEED, "urn:value:status", Some("value"))];
        let delta = build_status_delta(&identity(), &bindings, &sample(true)).unwrap();
        assert!(delta.statements().iter().any(|s| {
            s.predicate == vocab::TWIN_ID && s.object == Term::Iri("did:twin:abc".into())
        }));
    }
}

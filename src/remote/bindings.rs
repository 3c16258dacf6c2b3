use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::remote::RemoteTwinService;
use crate::twin::TwinIdentity;

/// Association discovered via remote query between a feed and the
/// remote-assigned identifiers needed to label outgoing telemetry.
///
/// Resolved once per twin after creation succeeds and held for the lifetime
/// of its share loop; never refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub point_id: String,
    pub point_name: String,
    pub value_id: String,
    pub value_key: Option<String>,
}

impl Binding {
    /// Bindings advertising the given feed, in result order.
    pub fn for_feed<'a>(bindings: &'a [Binding], point_name: &str) -> Vec<&'a Binding> {
        bindings
            .iter()
            .filter(|b| b.point_name == point_name)
            .collect()
    }

    /// First binding matching both the feed and the value key.
    pub fn find<'a>(
        bindings: &'a [Binding],
        point_name: &str,
        value_key: &str,
    ) -> Option<&'a Binding> {
        bindings
            .iter()
            .find(|b| b.point_name == point_name && b.value_key.as_deref() == Some(value_key))
    }
}

// Tabular result document as produced by a SPARQL endpoint:
// results.bindings is a list of rows, each mapping a column to a cell.
#[derive(Debug, Deserialize)]
struct TabularDocument {
    results: TabularResults,
}

#[derive(Debug, Deserialize)]
struct TabularResults {
    bindings: Vec<HashMap<String, TabularCell>>,
}

#[derive(Debug, Deserialize)]
struct TabularCell {
    value: String,
}

/// Resolves a twin's feed/value bindings with a single query round trip.
///
/// Any transport or parse failure degrades to an empty list; callers treat
/// that as "no bindings available" and skip delta construction per cycle.
#[derive(Clone)]
pub struct BindingResolver {
    remote: Arc<dyn RemoteTwinService>,
}

impl BindingResolver {
    pub fn new(remote: Arc<dyn RemoteTwinService>) -> Self {
        Self { remote }
    }

    pub async fn resolve(&self, identity: &TwinIdentity) -> Vec<Binding> {
        let query = advertised_bindings_query(&identity.did);
        let document = match self.remote.query(identity, &query).await {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(did = %identity.did, "binding query failed: {err:#}");
                return Vec::new();
            }
        };
        match parse_rows(document) {
            Ok(bindings) => bindings,
            Err(err) => {
                tracing::warn!(did = %identity.did, "unable to parse binding rows: {err:#}");
                Vec::new()
            }
        }
    }
}

fn advertised_bindings_query(did: &str) -> String {
    format!(
        "PREFIX rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#>\n\
         PREFIX iot: <http://data.iotics.com/iotics#>\n\
         \n\
         SELECT ?pointID ?pointName ?valueID ?valueKey\n\
         WHERE {{\n\
           ?resource iot:advertises ?pointID .\n\
           ?pointID iot:pointName ?pointName .\n\
           ?pointID iot:presents ?valueID .\n\
           OPTIONAL {{ ?valueID iot:valueKey ?valueKey }}\n\
           VALUES ?resource {{ <{did}> }}\n\
         }}\n"
    )
}

fn parse_rows(document: Value) -> anyhow::Result<Vec<Binding>> {
    let document: TabularDocument = serde_json::from_value(document)?;
    let mut bindings = Vec::with_capacity(document.results.bindings.len());
    for row in document.results.bindings {
        let cell = |column: &str| row.get(column).map(|c| c.value.clone());
        let (Some(point_id), Some(point_name), Some(value_id)) =
            (cell("pointID"), cell("pointName"), cell("valueID"))
        else {
            tracing::debug!("skipping binding row with missing columns: {row:?}");
            continue;
        };
        bindings.push(Binding {
            point_id,
            point_name,
            value_id,
            value_key: cell("valueKey"),
        });
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Ack;
    use crate::twin::TwinDefinition;
    use crate::twin::telemetry::TelemetrySample;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::json;

    fn identity() -> TwinIdentity {
        TwinIdentity {
            identifier: "car-1".into(),
            did: "did:twin:abc".into(),
        }
    }

    fn row(point: &str, name: &str, value: &str, key: Option<&str>) -> Value {
        let mut row = json!({
            "pointID": {"type": "uri", "value": point},
            "pointName": {"type": "literal", "value": name},
            "valueID": {"type": "uri", "value": value},
        });
        if let Some(key) = key {
            row["valueKey"] = json!({"type": "literal", "value": key});
        }
        row
    }

    struct FixedRemote(Result<Value, String>);

    #[async_trait]
    impl RemoteTwinService for FixedRemote {
        async fn create_or_update(
            &self,
            _identity: &TwinIdentity,
            _definition: &TwinDefinition,
        ) -> Result<Ack> {
            unimplemented!("not exercised")
        }

        async fn publish(
            &self,
            _identity: &TwinIdentity,
            _sample: &TelemetrySample,
        ) -> Result<Ack> {
            unimplemented!("not exercised")
        }

        async fn query(&self, _identity: &TwinIdentity, _query: &str) -> Result<Value> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    #[test]
    fn parses_rows_with_optional_value_key() {
        let document = json!({
            "head": {"vars": ["pointID", "pointName", "valueID", "valueKey"]},
            "results": {"bindings": [
                row("urn:point:status", "status", "urn:value:status", Some("value")),
                row("urn:point:loc", "locationData", "urn:value:loc", None),
            ]}
        });
        let bindings = parse_rows(document).unwrap();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].value_key.as_deref(), Some("value"));
        assert_eq!(bindings[1].value_key, None);
    }

    #[test]
    fn rows_missing_required_columns_are_skipped() {
        let document = json!({
            "results": {"bindings": [
                {"pointName": {"value": "status"}},
                row("urn:point:status", "status", "urn:value:status", Some("value")),
            ]}
        });
        let bindings = parse_rows(document).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].point_name, "status");
    }

    #[tokio::test]
    async fn transport_failure_resolves_to_empty() {
        let resolver = BindingResolver::new(Arc::new(FixedRemote(Err("boom".into()))));
        assert!(resolver.resolve(&identity()).await.is_empty());
    }

    #[tokio::test]
    async fn malformed_document_resolves_to_empty() {
        let resolver =
            BindingResolver::new(Arc::new(FixedRemote(Ok(json!({"unexpected": true})))));
        assert!(resolver.resolve(&identity()).await.is_empty());
    }

    #[test]
    fn query_is_scoped_to_the_twin_did() {
        let query = advertised_bindings_query("did:twin:abc");
        assert!(query.contains("<did:twin:abc>"));
        assert!(query.contains("?pointID ?pointName ?valueID ?valueKey"));
    }

    #[test]
    fn feed_filter_and_find() {
        let bindings = vec![
            Binding {
                point_id: "urn:p1".into(),
                point_name: "status".into(),
                value_id: "urn:v1".into(),
                value_key: Some("value".into()),
            },
            Binding {
                point_id: "urn:p2".into(),
                point_name: "locationData".into(),
                value_id: "urn:v2".into(),
                value_key: Some("speed".into()),
            },
        ];
        assert_eq!(Binding::for_feed(&bindings, "status").len(), 1);
        assert!(Binding::find(&bindings, "locationData", "speed").is_some());
        assert!(Binding::find(&bindings, "locationData", "value").is_none());
    }
}

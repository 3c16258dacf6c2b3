use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::twin::telemetry::TelemetrySample;
use crate::twin::{TwinDefinition, TwinIdentity};

pub mod bindings;

/// Acknowledgement returned by the remote directory for create and publish.
#[derive(Debug, Clone)]
pub struct Ack {
    /// Remote-assigned twin id echoed back in the response.
    pub twin_id: String,
}

/// Remote directory/identity service the fleet registers with and
/// publishes to. Wire transport is outside this crate.
#[async_trait]
pub trait RemoteTwinService: Send + Sync {
    /// Idempotent create-or-update of a twin's description.
    async fn create_or_update(
        &self,
        identity: &TwinIdentity,
        definition: &TwinDefinition,
    ) -> Result<Ack>;

    /// Pushes one telemetry sample for a registered twin.
    async fn publish(&self, identity: &TwinIdentity, sample: &TelemetrySample) -> Result<Ack>;

    /// Runs a structured query scoped to the given identity and returns the
    /// raw tabular result document. The orchestrator only ever interprets
    /// the four binding columns out of it.
    async fn query(&self, identity: &TwinIdentity, query: &str) -> Result<Value>;
}

/// Derives the opaque identity handle for a business key.
/// Must be deterministic: the same key always yields the same identity.
pub trait IdentityProvider: Send + Sync {
    fn derive_twin_identity(&self, business_key: &str) -> Result<TwinIdentity>;
}

/// Deterministic identity provider hashing a fixed seed with the business
/// key. Stands in for a real resolver-backed identity scheme in local
/// deployments and tests.
#[derive(Debug, Clone)]
pub struct SeededIdentityProvider {
    seed: String,
}

impl SeededIdentityProvider {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }
}

impl IdentityProvider for SeededIdentityProvider {
    fn derive_twin_identity(&self, business_key: &str) -> Result<TwinIdentity> {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.as_bytes());
        hasher.update(b":");
        hasher.update(business_key.as_bytes());
        let digest = hasher.finalize();
        Ok(TwinIdentity {
            identifier: business_key.to_string(),
            did: format!("did:twin:{}", hex::encode(&digest[..16])),
        })
    }
}

use parking_lot::Mutex;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{OrchestratorConfig, RetryPolicy};
use crate::dispatcher::{Dispatcher, EventKind, IngestMode, LifecycleEvent};
use crate::error::IngestError;
use crate::remote::bindings::{Binding, BindingResolver};
use crate::remote::{IdentityProvider, RemoteTwinService};
use crate::scheduler::JitterScheduler;
use crate::semantic::store::LocalStore;
use crate::semantic::{build_location_delta, build_status_delta};
use crate::twin::{Twin, TwinDefinition};
use crate::warn_throttled;

/// Event-driven pipeline that takes twin definitions through registration
/// (under unbounded retry), binding resolution, and into an indefinitely
/// repeating, jittered share loop per twin.
///
/// The stages only talk through the [`Dispatcher`]:
///
/// ```text
/// ingest -> Loaded -> CreateRequested -> ShareRequested -> share loop
///                          ^    | on failure
///                          +----+ (re-emitted, paced by RetryPolicy)
/// ```
pub struct TwinLifecycleOrchestrator {
    cfg: OrchestratorConfig,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<JitterScheduler>,
    processed: Arc<AtomicU64>,
    stages: Mutex<Vec<JoinHandle<()>>>,
}

impl TwinLifecycleOrchestrator {
    /// Wires the stage handlers and returns the running orchestrator.
    /// Must be called from within a tokio runtime.
    pub fn new(
        cfg: OrchestratorConfig,
        remote: Arc<dyn RemoteTwinService>,
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(cfg.event_capacity));
        let scheduler = Arc::new(JitterScheduler::new(cfg.scheduler()));
        let processed = Arc::new(AtomicU64::new(0));

        let stages = vec![
            tokio::spawn(loaded_stage(
                dispatcher.subscribe(EventKind::Loaded),
                dispatcher.clone(),
                identity,
            )),
            tokio::spawn(create_stage(
                dispatcher.subscribe(EventKind::CreateRequested),
                dispatcher.clone(),
                remote.clone(),
                cfg.create_retry.clone(),
                processed.clone(),
            )),
            tokio::spawn(share_stage(
                dispatcher.subscribe(EventKind::ShareRequested),
                BindingResolver::new(remote.clone()),
                scheduler.clone(),
                store,
                remote,
            )),
        ];

        Self {
            cfg,
            dispatcher,
            scheduler,
            processed,
            stages: Mutex::new(stages),
        }
    }

    /// Loads a JSON array of twin definitions and feeds it into the
    /// pipeline. The whole batch is parsed up front: one malformed record
    /// aborts the load before any event is emitted. Emission itself runs on
    /// a dedicated task, decoupled from registration and sharing latency.
    ///
    /// Returns the number of definitions accepted.
    pub fn ingest<R: Read>(&self, source: R, mode: IngestMode) -> Result<usize, IngestError> {
        let definitions: Vec<TwinDefinition> = serde_json::from_reader(source)?;
        let count = definitions.len();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            for definition in definitions {
                dispatcher
                    .publish(LifecycleEvent::Loaded { definition, mode })
                    .await;
            }
            debug!("ingestion batch emitted ({count} definitions)");
        });
        Ok(count)
    }

    /// Twins registered so far. Observability only.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.cfg
    }

    /// Stops the share scheduler, closes the event bus, and waits for the
    /// stage handlers to drain. In-flight remote calls are not cancelled.
    pub async fn shutdown(&self) {
        self.scheduler.stop();
        self.dispatcher.close();
        let stages = std::mem::take(&mut *self.stages.lock());
        for stage in stages {
            let _ = stage.await;
        }
        info!("orchestrator shut down");
    }
}

/// Loaded stage: derive the identity, build the live twin, route it to
/// registration or directly to sharing.
async fn loaded_stage(
    mut rx: mpsc::Receiver<LifecycleEvent>,
    dispatcher: Arc<Dispatcher>,
    identity: Arc<dyn IdentityProvider>,
) {
    while let Some(event) = rx.recv().await {
        let LifecycleEvent::Loaded { definition, mode } = event else {
            continue;
        };
        let derived = match identity.derive_twin_identity(&definition.identifier) {
            Ok(derived) => derived,
            Err(err) => {
                error!(
                    identifier = %definition.identifier,
                    "identity derivation failed, twin skipped: {err:#}"
                );
                continue;
            }
        };
        debug!(identifier = %derived.identifier, did = %derived.did, "twin loaded");
        let twin = Arc::new(Twin::new(definition, derived));
        let next = match mode {
            IngestMode::RegisterAndShare => LifecycleEvent::CreateRequested { twin, attempt: 0 },
            IngestMode::ShareOnly => LifecycleEvent::ShareRequested(twin),
        };
        dispatcher.publish(next).await;
    }
}

/// Create stage: one registration attempt per event, on its own task.
/// Success moves the twin to sharing; failure re-emits the event with the
/// attempt bumped. Retries are unbounded, only paced by the policy.
async fn create_stage(
    mut rx: mpsc::Receiver<LifecycleEvent>,
    dispatcher: Arc<Dispatcher>,
    remote: Arc<dyn RemoteTwinService>,
    retry: RetryPolicy,
    processed: Arc<AtomicU64>,
) {
    while let Some(event) = rx.recv().await {
        let LifecycleEvent::CreateRequested { twin, attempt } = event else {
            continue;
        };
        let dispatcher = dispatcher.clone();
        let remote = remote.clone();
        let retry = retry.clone();
        let processed = processed.clone();
        tokio::spawn(async move {
            match remote.create_or_update(twin.identity(), twin.definition()).await {
                Ok(ack) => {
                    let count = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        did = %twin.did(),
                        twin_id = %ack.twin_id,
                        label = %twin.definition().label,
                        "processed twin {count}"
                    );
                    dispatcher.publish(LifecycleEvent::ShareRequested(twin)).await;
                }
                Err(err) => {
                    warn_throttled!(
                        Duration::from_secs(5),
                        "twin creation failed (attempt {attempt}): {err:#}, retrying"
                    );
                    let delay = retry.delay_for(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    dispatcher
                        .publish(LifecycleEvent::CreateRequested {
                            twin,
                            attempt: attempt.saturating_add(1),
                        })
                        .await;
                }
            }
        });
    }
}

/// Share stage: resolve bindings once, then run the twin's share loop on the
/// scheduler until shutdown.
async fn share_stage(
    mut rx: mpsc::Receiver<LifecycleEvent>,
    resolver: BindingResolver,
    scheduler: Arc<JitterScheduler>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteTwinService>,
) {
    while let Some(event) = rx.recv().await {
        let LifecycleEvent::ShareRequested(twin) = event else {
            continue;
        };
        let resolver = resolver.clone();
        let scheduler = scheduler.clone();
        let store = store.clone();
        let remote = remote.clone();
        tokio::spawn(async move {
            let bindings = Arc::new(resolver.resolve(twin.identity()).await);
            if bindings.is_empty() {
                // Resolution happens once per twin; cycles will keep
                // skipping delta construction until the process restarts.
                warn!(did = %twin.did(), "no bindings advertised for twin");
            }
            let task = {
                let twin = twin.clone();
                move || {
                    share_cycle(twin.clone(), bindings.clone(), store.clone(), remote.clone())
                }
            };
            let did = twin.did().to_string();
            let err_did = did.clone();
            let _loop = scheduler.start(
                task,
                move |_| debug!(did = %did, "share cycle complete"),
                move |err| debug!(did = %err_did, "share cycle failed: {err:#}"),
            );
        });
    }
}

/// One tick of a twin's share loop: fresh telemetry, both deltas into the
/// local store, sample pushed to the remote service. The push result is
/// logged only; the loop never stops because of it.
async fn share_cycle(
    twin: Arc<Twin>,
    bindings: Arc<Vec<Binding>>,
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteTwinService>,
) -> anyhow::Result<()> {
    let sample = twin.tick();
    let status = build_status_delta(twin.identity(), &bindings, &sample)?;
    let location = build_location_delta(twin.identity(), &bindings, &sample)?;
    store.apply_delta(&status);
    store.apply_delta(&location);

    match remote.publish(twin.identity(), &sample).await {
        Ok(_) => info!(
            did = %twin.did(),
            operational = sample.operational,
            "shared twin telemetry"
        ),
        Err(err) => warn_throttled!(
            Duration::from_secs(5),
            "telemetry push failed: {err:#}"
        ),
    }
    Ok(())
}

//! Cloud queue poller
//!
//! Drains one restaurant's print queue: claim, dispatch to a transport,
//! report the outcome. Network trouble is never an event worth more than a
//! warning - the next tick retries everything.
//!
//! Job state machine on the remote store:
//!
//! ```text
//! queued ──claim──▶ printing ──success──▶ printed   (terminal)
//!    ▲                │
//!    │                └──fail, attempts < max──▶ queued
//!    │                └──fail otherwise───────▶ failed (terminal)
//! ```

use crate::cloud::job::{JobStatus, JobTarget, PrintJob};
use crate::cloud::store::{FieldValue, QueueStore, StoreDocument, StoreError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bridge_printer::{NetworkPrinter, OsPrinter, Printer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default delay between queue polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Extra poll fired after a batch, to drain jobs enqueued while printing
const DRAIN_DELAY: Duration = Duration::from_millis(500);

/// Jobs fetched per poll
const MAX_JOBS_PER_POLL: u32 = 20;

/// Payloads above this are failed permanently instead of printed
const MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// A dispatch failure and whether retrying could ever help
struct JobFailure {
    message: String,
    permanent: bool,
}

impl JobFailure {
    fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }

    fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }
}

/// Polls the cloud print queue for one restaurant
///
/// Configuration is a snapshot taken at construction; the supervisor swaps
/// the whole poller when anything changes.
pub struct CloudPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    store: QueueStore,
    device_id: String,
    device_name: String,
    poll_interval: Duration,
    /// At most one batch is dispatched at a time per bridge
    processing: AtomicBool,
    started: AtomicBool,
    shutdown: CancellationToken,
}

impl CloudPoller {
    pub fn new(store: QueueStore, device_id: String, device_name: String) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                store,
                device_id,
                device_name,
                poll_interval: DEFAULT_POLL_INTERVAL,
                processing: AtomicBool::new(false),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Shorten the poll interval (tests)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        Arc::get_mut(&mut self.inner)
            .expect("with_interval before start")
            .poll_interval = interval;
        self
    }

    /// Schedule periodic polls, firing one immediately. Idempotent.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            info!(
                device_id = %inner.device_id,
                interval_ms = inner.poll_interval.as_millis(),
                "Cloud queue poller started"
            );

            let mut ticker = tokio::time::interval(inner.poll_interval);
            loop {
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    // The first tick fires at once; an in-flight poll always
                    // runs to completion, stop only cancels future ticks
                    _ = ticker.tick() => inner.poll_once().await,
                }
            }

            info!(device_id = %inner.device_id, "Cloud queue poller stopped");
        });
    }

    /// Cancel future polls. Idempotent; in-flight work finishes.
    pub fn stop(&self) {
        self.inner.shutdown.cancel();
    }
}

impl PollerInner {
    fn poll_once(self: &Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            // A tick that lands while a batch is dispatching returns immediately
            if self
                .processing
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            let batch = match self.store.list_queued(MAX_JOBS_PER_POLL).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Queue poll failed, retrying next tick");
                    self.processing.store(false, Ordering::SeqCst);
                    return;
                }
            };

            let mut dispatched = 0usize;
            for doc in batch {
                if self.process_document(doc).await {
                    dispatched += 1;
                }
            }
            self.processing.store(false, Ordering::SeqCst);

            if dispatched > 0 {
                // Jobs may have been enqueued while the batch printed
                let inner = self.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = inner.shutdown.cancelled() => {}
                        _ = tokio::time::sleep(DRAIN_DELAY) => inner.poll_once().await,
                    }
                });
            }
        })
    }

    /// Claim, dispatch and report one job. Returns whether it was claimed.
    async fn process_document(&self, doc: StoreDocument) -> bool {
        let Some(job) = PrintJob::from_document(&doc) else {
            warn!(doc = %doc.name, "Skipping malformed queue document");
            return false;
        };
        if job.status != JobStatus::Queued {
            return false;
        }

        // Claim: re-read, verify still queued, then patch guarded by the
        // revision we read. Losing the race is routine, not an error.
        let fresh = match self.store.get(&job.name).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound) => return false,
            Err(e) => {
                warn!(job = job.id(), error = %e, "Claim read failed, retrying next tick");
                return false;
            }
        };
        let Some(job) = PrintJob::from_document(&fresh) else {
            return false;
        };
        if job.status != JobStatus::Queued {
            debug!(job = job.id(), "Job no longer queued, skipping");
            return false;
        }

        let attempt = job.attempts + 1;
        let claim = BTreeMap::from([
            ("status".to_string(), FieldValue::string("printing")),
            ("claimedBy".to_string(), FieldValue::string(&self.device_id)),
            (
                "claimedByName".to_string(),
                FieldValue::string(&self.device_name),
            ),
            ("claimedAt".to_string(), FieldValue::now()),
            ("attempts".to_string(), FieldValue::integer(attempt)),
        ]);
        let claim_mask = ["status", "claimedBy", "claimedByName", "claimedAt", "attempts"];
        match self
            .store
            .patch(&job.name, claim, &claim_mask, job.update_time.as_deref())
            .await
        {
            Ok(()) => {}
            Err(StoreError::PreconditionFailed) => {
                debug!(job = job.id(), "Lost claim race, skipping");
                return false;
            }
            Err(e) => {
                warn!(job = job.id(), error = %e, "Claim patch failed, retrying next tick");
                return false;
            }
        }

        info!(
            job = job.id(),
            target = job.target.kind(),
            attempt,
            max_attempts = job.max_attempts,
            "Claimed print job"
        );

        let outcome = dispatch(&job).await;
        self.report(&job, attempt, outcome).await;
        true
    }

    /// Write the job's terminal or re-queued state back to the store
    async fn report(&self, job: &PrintJob, attempt: i64, outcome: Result<(), JobFailure>) {
        let (fields, mask): (BTreeMap<String, FieldValue>, &[&str]) = match &outcome {
            Ok(()) => {
                info!(job = job.id(), "Print job done");
                (
                    BTreeMap::from([
                        ("status".to_string(), FieldValue::string("printed")),
                        ("printedAt".to_string(), FieldValue::now()),
                        ("error".to_string(), FieldValue::null()),
                    ]),
                    &["status", "printedAt", "error"],
                )
            }
            Err(failure) if !failure.permanent && attempt < job.max_attempts => {
                warn!(
                    job = job.id(),
                    attempt,
                    error = %failure.message,
                    "Print failed, re-queueing"
                );
                (
                    BTreeMap::from([
                        ("status".to_string(), FieldValue::string("queued")),
                        ("claimedBy".to_string(), FieldValue::null()),
                        ("claimedByName".to_string(), FieldValue::null()),
                        ("claimedAt".to_string(), FieldValue::null()),
                        (
                            "error".to_string(),
                            FieldValue::string(format!("Retry: {}", failure.message)),
                        ),
                    ]),
                    &["status", "claimedBy", "claimedByName", "claimedAt", "error"],
                )
            }
            Err(failure) => {
                warn!(
                    job = job.id(),
                    attempt,
                    error = %failure.message,
                    "Print failed permanently"
                );
                (
                    BTreeMap::from([
                        ("status".to_string(), FieldValue::string("failed")),
                        (
                            "error".to_string(),
                            FieldValue::string(failure.message.clone()),
                        ),
                    ]),
                    &["status", "error"],
                )
            }
        };

        if let Err(e) = self.store.patch(&job.name, fields, mask, None).await {
            warn!(job = job.id(), error = %e, "Failed to report job outcome");
        }
    }
}

/// Route a claimed job to its transport
///
/// Jobs whose target can never be satisfied (unknown kind, missing
/// addressing fields) fail permanently - retrying cannot help without an
/// external edit.
async fn dispatch(job: &PrintJob) -> Result<(), JobFailure> {
    let payload = STANDARD
        .decode(&job.payload_b64)
        .map_err(|_| JobFailure::permanent("invalid payload base64"))?;
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(JobFailure::permanent(format!(
            "payload too large: {} bytes",
            payload.len()
        )));
    }

    match &job.target {
        JobTarget::Lan { ip, port } => {
            if ip.is_empty() {
                return Err(JobFailure::permanent("no_lan_ip"));
            }
            let printer = NetworkPrinter::new(ip, *port)
                .map_err(|e| JobFailure::permanent(e.to_string()))?;
            printer.print(&payload).await.map_err(classify)
        }
        JobTarget::OsPrinter { printer_name } => {
            if printer_name.is_empty() {
                return Err(JobFailure::permanent("no_printer_name"));
            }
            OsPrinter::new(printer_name)
                .print(&payload)
                .await
                .map_err(classify)
        }
        JobTarget::Unknown { kind } => Err(JobFailure::permanent(format!(
            "unknown_target: {kind:?}"
        ))),
    }
}

fn classify(error: bridge_printer::PrintError) -> JobFailure {
    if error.is_permanent() {
        JobFailure::permanent(error.to_string())
    } else {
        JobFailure::transient(error.to_string())
    }
}

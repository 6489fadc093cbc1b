//! The async ingest pipeline: raw payloads in, stored spans out.
//!
//! Transports hand the collector opaque byte payloads with no declared
//! encoding. Each payload is sniffed and decoded leniently, sampled by
//! trace ID, and batched into storage writes. Garbage input increments a
//! drop counter and is logged through a [`DelayLimiter`] so one broken
//! producer cannot flood the log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracewire_codec::decode_any;
use tracewire_model::Span;
use tracewire_storage::InMemoryStorage;

use crate::{CollectorConfig, CollectorError, DelayLimiter, Sampler};

/// Monotonic pipeline counters, shared with the worker task.
#[derive(Debug, Default)]
pub struct CollectorMetrics {
    messages: AtomicU64,
    messages_dropped: AtomicU64,
    bytes: AtomicU64,
    spans: AtomicU64,
    spans_dropped: AtomicU64,
}

impl CollectorMetrics {
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Payloads that yielded no spans, malformed or unrecognizable.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn spans(&self) -> u64 {
        self.spans.load(Ordering::Relaxed)
    }

    /// Spans decoded but rejected by the sampler.
    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }
}

pub struct Collector {
    sender: mpsc::Sender<Vec<u8>>,
    metrics: Arc<CollectorMetrics>,
    worker: JoinHandle<()>,
}

impl Collector {
    /// Spawns the pipeline worker onto the current tokio runtime.
    pub fn start(
        storage: Arc<InMemoryStorage>,
        config: CollectorConfig,
    ) -> Result<Collector, CollectorError> {
        let sampler = Sampler::create(config.sample_rate)?;
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let metrics = Arc::new(CollectorMetrics::default());
        let worker = tokio::spawn(run(
            receiver,
            storage,
            sampler,
            config,
            Arc::clone(&metrics),
        ));
        Ok(Collector { sender, metrics, worker })
    }

    /// Queues one raw payload in any supported encoding. Waits when the
    /// queue is full.
    pub async fn submit(&self, payload: Vec<u8>) -> Result<(), CollectorError> {
        self.sender
            .send(payload)
            .await
            .map_err(|_| CollectorError::Closed)
    }

    pub fn metrics(&self) -> &CollectorMetrics {
        &self.metrics
    }

    /// Drains queued payloads, writes the open batch, and stops.
    pub async fn shutdown(self) {
        drop(self.sender);
        let _ = self.worker.await;
    }
}

async fn run(
    mut receiver: mpsc::Receiver<Vec<u8>>,
    storage: Arc<InMemoryStorage>,
    sampler: Sampler,
    config: CollectorConfig,
    metrics: Arc<CollectorMetrics>,
) {
    let drop_log: DelayLimiter<&'static str> =
        DelayLimiter::new(config.log_quiet_period, 1_000);

    while let Some(payload) = receiver.recv().await {
        let mut batch = decode_payload(&payload, sampler, &metrics, &drop_log);
        let deadline = Instant::now() + config.batch_timeout;
        let mut open = true;

        while batch.len() < config.max_batch_length {
            tokio::select! {
                next = receiver.recv() => match next {
                    Some(payload) => batch.extend(decode_payload(
                        &payload, sampler, &metrics, &drop_log,
                    )),
                    None => {
                        open = false;
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => break,
            }
        }

        if !batch.is_empty() {
            tracing::debug!(spans = batch.len(), "writing batch");
            if let Err(error) = storage.accept(batch).execute() {
                tracing::warn!(%error, "storage rejected batch");
            }
        }
        if !open {
            return;
        }
    }
}

fn decode_payload(
    payload: &[u8],
    sampler: Sampler,
    metrics: &CollectorMetrics,
    drop_log: &DelayLimiter<&'static str>,
) -> Vec<Span> {
    metrics.messages.fetch_add(1, Ordering::Relaxed);
    metrics.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);

    let decoded = decode_any(payload);
    if decoded.is_empty() {
        metrics.messages_dropped.fetch_add(1, Ordering::Relaxed);
        if drop_log.should_invoke("undecodable payload") {
            tracing::warn!(len = payload.len(), "dropping undecodable payload");
        } else {
            tracing::debug!(len = payload.len(), "dropping undecodable payload");
        }
        return decoded;
    }

    metrics.spans.fetch_add(decoded.len() as u64, Ordering::Relaxed);
    let mut kept = Vec::with_capacity(decoded.len());
    for span in decoded {
        // debug overrides the sampling decision, like an upstream force
        // trace header would
        if span.debug || sampler.is_sampled(span.trace_id_low() as i64) {
            kept.push(span);
        } else {
            metrics.spans_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
    kept
}

//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the strongly-typed metric groups for each subsystem,
//! and an async HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// DAG admission and main-chain election metrics.
#[derive(Clone)]
pub struct ConsensusMetrics {
    /// Latency of the full admission pipeline (spec.md §4.3) in seconds.
    pub block_validation_seconds: Histogram,
    /// Blocks rejected, labeled by the admission step that rejected them
    /// (`syntax`, `signature`, `arithmetic`, `double_spend`).
    pub blocks_rejected: IntCounterVec,
    /// Blocks currently parked in the orphan pool awaiting a link.
    pub orphan_pool_size: IntGauge,
    /// Completed main-chain reorgs.
    pub reorgs_total: IntCounter,
    /// Distribution of reorg depth (blocks reverted) when one occurs.
    pub reorg_depth: Histogram,
}

impl ConsensusMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let block_validation_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_block_validation_seconds",
                "Time to run the admission pipeline for one block, in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
            ]),
        )?;
        registry.register(Box::new(block_validation_seconds.clone()))?;

        let blocks_rejected = IntCounterVec::new(
            Opts::new(
                "consensus_blocks_rejected_total",
                "Total number of blocks rejected by the admission pipeline",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let orphan_pool_size = IntGauge::with_opts(Opts::new(
            "consensus_orphan_pool_size",
            "Number of blocks currently parked in the orphan pool",
        ))?;
        registry.register(Box::new(orphan_pool_size.clone()))?;

        let reorgs_total = IntCounter::with_opts(Opts::new(
            "consensus_reorgs_total",
            "Total number of main-chain reorgs applied",
        ))?;
        registry.register(Box::new(reorgs_total.clone()))?;

        let reorg_depth = Histogram::with_opts(
            HistogramOpts::new(
                "consensus_reorg_depth",
                "Number of blocks reverted by a reorg",
            )
            .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0]),
        )?;
        registry.register(Box::new(reorg_depth.clone()))?;

        Ok(Self {
            block_validation_seconds,
            blocks_rejected,
            orphan_pool_size,
            reorgs_total,
            reorg_depth,
        })
    }
}

/// Block store metrics: put/get latency against the RocksDB backend.
#[derive(Clone)]
pub struct StoreMetrics {
    pub get_seconds: Histogram,
    pub put_seconds: Histogram,
}

impl StoreMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let get_seconds = Histogram::with_opts(HistogramOpts::new(
            "store_get_seconds",
            "Latency of a single block-store read, in seconds",
        ))?;
        registry.register(Box::new(get_seconds.clone()))?;

        let put_seconds = Histogram::with_opts(HistogramOpts::new(
            "store_put_seconds",
            "Latency of a single atomic block-store batch write, in seconds",
        ))?;
        registry.register(Box::new(put_seconds.clone()))?;

        Ok(Self {
            get_seconds,
            put_seconds,
        })
    }
}

/// Per-peer message queue metrics (spec.md §4.5).
#[derive(Clone)]
pub struct QueueMetrics {
    /// Current queued-bytes depth, summed across all active peer queues.
    pub queue_depth_bytes: IntGauge,
    /// Disconnects issued by the queue layer, labeled by reason.
    pub disconnects_total: IntCounterVec,
}

impl QueueMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let queue_depth_bytes = IntGauge::with_opts(Opts::new(
            "queue_depth_bytes",
            "Total bytes queued across all active peer message queues",
        ))?;
        registry.register(Box::new(queue_depth_bytes.clone()))?;

        let disconnects_total = IntCounterVec::new(
            Opts::new(
                "queue_disconnects_total",
                "Total peer disconnects issued by the message queue, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(disconnects_total.clone()))?;

        Ok(Self {
            queue_depth_bytes,
            disconnects_total,
        })
    }
}

/// Wrapper around a Prometheus registry and the consensus metrics.
///
/// This is the main handle you pass around in the node. It can be wrapped
/// in an [`Arc`] and shared across threads/tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub consensus: ConsensusMetrics,
    pub store: StoreMetrics,
    pub queue: QueueMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers every subsystem's metrics into it.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("xdagj".to_string()), None)?;
        let consensus = ConsensusMetrics::register(&registry)?;
        let store = StoreMetrics::register(&registry)?;
        let queue = QueueMetrics::register(&registry)?;
        Ok(Self {
            registry,
            consensus,
            store,
            queue,
        })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            eprintln!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
///
/// This function is `async` and is intended to be spawned onto a Tokio
/// runtime, e.g.:
///
/// ```ignore
/// let registry = Arc::new(MetricsRegistry::new()?);
/// let addr: SocketAddr = "127.0.0.1:9898".parse()?;
/// tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
/// ```
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                eprintln!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn consensus_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = ConsensusMetrics::register(&registry).expect("register metrics");

        metrics.block_validation_seconds.observe(0.003);
        metrics.blocks_rejected.with_label_values(&["signature"]).inc();
        metrics.orphan_pool_size.set(4);
        metrics.reorgs_total.inc();
        metrics.reorg_depth.observe(3.0);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.consensus.block_validation_seconds.observe(0.01);
        let text = registry.gather_text();
        assert!(text.contains("consensus_block_validation_seconds"));
    }
}

//! Dispatcher - fan-out of extracted frame-sets to sinks

use std::sync::Arc;

use contracts::{ExtractedFrameSet, SinkConfig, SinkType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::error::{DispatcherError, Result};
use crate::handle::{OverflowPolicy, SinkHandle};
use crate::metrics::MetricsSnapshot;
use crate::sinks::{FileSink, LogSink};

/// Sink param selecting the overflow policy
pub const OVERFLOW_PARAM: &str = "overflow";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<ExtractedFrameSet>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<ExtractedFrameSet>) -> Self {
        Self { config, input_rx }
    }

    #[instrument(name = "dispatcher_builder_build", skip(self), fields(sink_count = self.config.sinks.len()))]
    pub fn build(self) -> Result<Dispatcher> {
        let handles = self
            .config
            .sinks
            .iter()
            .map(create_sink_handle)
            .collect::<Result<Vec<_>>>()?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

/// File sinks must not lose frames and block by default; log sinks drop.
fn overflow_policy(config: &SinkConfig) -> Result<OverflowPolicy> {
    match config.params.get(OVERFLOW_PARAM) {
        Some(value) => value
            .parse()
            .map_err(|value| DispatcherError::OverflowPolicy {
                name: config.name.clone(),
                value,
            }),
        None => Ok(match config.sink_type {
            SinkType::File => OverflowPolicy::Block,
            SinkType::Log => OverflowPolicy::DropNewest,
        }),
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle> {
    let policy = overflow_policy(config)?;
    match config.sink_type {
        SinkType::Log => {
            let sink = LogSink::new(&config.name);
            Ok(SinkHandle::spawn(sink, config.queue_capacity, policy))
        }
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(SinkHandle::spawn(sink, config.queue_capacity, policy))
        }
    }
}

/// Totals per sink after shutdown
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub frame_sets: u64,
    pub sinks: Vec<(String, MetricsSnapshot)>,
}

pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<ExtractedFrameSet>,
}

impl Dispatcher {
    /// Dispatcher over ready-made sink handles
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<ExtractedFrameSet>,
    ) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Fan frame-sets out until the input closes, then shut every sink down
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> DispatchReport {
        info!(sinks = self.handles.len(), "dispatcher started");

        let mut frame_sets: u64 = 0;
        while let Some(frame_set) = self.input_rx.recv().await {
            frame_sets += 1;
            let frame_set = Arc::new(frame_set);
            for handle in &self.handles {
                handle.send(Arc::clone(&frame_set)).await;
            }

            if frame_sets.is_multiple_of(100) {
                debug!(frame_sets, "dispatcher progress");
            }
        }

        info!(frame_sets, "dispatcher input closed, shutting down");
        let mut sinks = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            sinks.push((name, handle.shutdown().await));
        }
        info!("dispatcher shutdown complete");

        DispatchReport { frame_sets, sinks }
    }

    pub fn spawn(self) -> JoinHandle<DispatchReport> {
        tokio::spawn(self.run())
    }
}

/// Build a dispatcher from sink configs
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<ExtractedFrameSet>,
) -> Result<Dispatcher> {
    let config = DispatcherConfig {
        sinks: sink_configs,
    };
    DispatcherBuilder::new(config, input_rx).build()
}

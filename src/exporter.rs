//! Exporter context
//!
//! The [`Exporter`] is the one object the serving layer talks to. It owns
//! the device set, the poller and the metric sink, and is constructed
//! explicitly at startup; nothing in the pipeline is a process global.
//!
//! # Example
//!
//! ```rust
//! use elmetrics::{class, Device, Exporter, ExporterConfig, StaticTransport};
//! use std::sync::Arc;
//!
//! # tokio_test_block(async {
//! let panel = Device::new("192.168.1.20", class::DISTRIBUTION_PANEL_METERING);
//! let transport = StaticTransport::new()
//!     .with_device(panel.clone())
//!     .with_property(&panel, 0xC6, vec![0x00, 0x00, 0x04, 0xB0]);
//!
//! let exporter = Exporter::builtin(Arc::new(transport), ExporterConfig::default()).unwrap();
//! exporter.discover().await;
//!
//! let text = exporter.poll_and_export().await.unwrap();
//! assert!(text.contains("total_power_watts"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use crate::classes::ClassDecoderRegistry;
use crate::error::Result;
use crate::poller::{DevicePoller, PollerConfig};
use crate::protocol::Device;
use crate::sink::MetricSink;
use crate::transport::DeviceTransport;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Exporter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    /// How long [`Exporter::discover`] listens to the discovery feed
    pub discovery_window: Duration,
    /// Keep only devices whose class has rules
    pub supported_only: bool,
    /// Poller settings
    pub poller: PollerConfig,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            discovery_window: Duration::from_secs(crate::DEFAULT_DISCOVERY_SECS),
            supported_only: false,
            poller: PollerConfig::default(),
        }
    }
}

/// Insertion-ordered set of discovered devices
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    order: Vec<Device>,
    seen: HashSet<Device>,
}

impl DeviceSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device; returns false if it was already known
    pub fn insert(&mut self, device: Device) -> bool {
        if !self.seen.insert(device.clone()) {
            return false;
        }
        self.order.push(device);
        true
    }

    /// Devices in discovery order
    pub fn as_slice(&self) -> &[Device] {
        &self.order
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Device set + poller + sink
pub struct Exporter {
    transport: Arc<dyn DeviceTransport>,
    devices: RwLock<DeviceSet>,
    poller: DevicePoller,
    sink: MetricSink,
    config: ExporterConfig,
}

impl Exporter {
    /// Build an exporter with the built-in class table and gauges
    pub fn builtin(transport: Arc<dyn DeviceTransport>, config: ExporterConfig) -> Result<Self> {
        let classes = ClassDecoderRegistry::builtin();
        let sink = MetricSink::builtin(&classes)?;
        Ok(Self::with_parts(transport, classes, sink, config))
    }

    /// Build an exporter from an already validated class table and sink
    pub fn with_parts(
        transport: Arc<dyn DeviceTransport>,
        classes: ClassDecoderRegistry,
        sink: MetricSink,
        config: ExporterConfig,
    ) -> Self {
        let poller = DevicePoller::new(Arc::new(classes), config.poller.clone());
        Self {
            transport,
            devices: RwLock::new(DeviceSet::new()),
            poller,
            sink,
            config,
        }
    }

    /// Listen to the discovery feed for the configured window
    ///
    /// Returns the number of newly added devices. Stops early if the feed
    /// ends.
    pub async fn discover(&self) -> usize {
        info!(
            window_ms = self.config.discovery_window.as_millis() as u64,
            "starting ECHONET Lite discovery"
        );

        let mut added = 0;
        let listen = async {
            let mut feed = self.transport.discover();
            while let Some(device) = feed.next().await {
                if self.add_device(device).await {
                    added += 1;
                }
            }
        };
        if tokio::time::timeout(self.config.discovery_window, listen)
            .await
            .is_err()
        {
            debug!("discovery window elapsed");
        }

        let total = self.devices.read().await.len();
        self.sink.set_device_count(total);
        info!(added, total, "stopping ECHONET Lite discovery");
        added
    }

    /// Add one device to the set
    pub async fn add_device(&self, device: Device) -> bool {
        if self.config.supported_only && !self.poller.registry().supports(device.class) {
            debug!(device = %device, "ignoring unsupported device class");
            return false;
        }

        let inserted = self.devices.write().await.insert(device.clone());
        if inserted {
            info!(
                device = %device,
                group = %crate::classes::group_name(device.class.group),
                class = %crate::classes::class_name(device.class.group, device.class.class),
                "discovered device"
            );
        }
        inserted
    }

    /// Snapshot of the device set in discovery order
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.as_slice().to_vec()
    }

    /// Run one poll cycle and return the text exposition
    pub async fn poll_and_export(&self) -> Result<String> {
        let devices = self.devices().await;
        let started = Instant::now();

        let outcome = self
            .poller
            .poll_cycle(self.transport.as_ref(), &devices)
            .await;
        let elapsed = started.elapsed();

        debug!(
            devices = outcome.stats.devices,
            samples = outcome.stats.samples,
            failed = outcome.stats.failed_fetches,
            malformed = outcome.stats.malformed,
            elapsed_ms = elapsed.as_millis() as u64,
            "poll cycle complete"
        );

        self.sink.set_device_count(devices.len());
        Ok(self
            .sink
            .apply_cycle(&outcome.samples, &outcome.stats, elapsed)?)
    }

    /// Render the registry without polling
    pub fn snapshot(&self) -> Result<String> {
        Ok(self.sink.snapshot()?)
    }

    /// The metric sink
    pub fn sink(&self) -> &MetricSink {
        &self.sink
    }

    /// The poller
    pub fn poller(&self) -> &DevicePoller {
        &self.poller
    }

    /// Close the transport
    pub async fn shutdown(&self) {
        info!("shutting down exporter");
        self.transport.close().await;
    }
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("config", &self.config)
            .field("sink", &self.sink)
            .finish()
    }
}

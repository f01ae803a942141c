// ELMetrics - ECHONET Lite property decoding for Prometheus
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device poller
//!
//! Walks the device set, evaluates each device's class rules and produces
//! [`MetricSample`]s. Evaluation per device is two-phase:
//!
//! 1. fetch every distinct unit property referenced by a coded-multiplier
//!    rule, once;
//! 2. fetch and decode each rule's property in declared order, scaling
//!    with the multipliers from phase 1.
//!
//! A failed fetch or malformed buffer only skips the affected rule.

use crate::classes::{class_name, group_name, ClassDecoderRegistry};
use crate::codec::{PropertyCodec, Reading};
use crate::error::TransportError;
use crate::protocol::{Device, NumericFormat, PropertyCode};
use crate::sample::{LabelKind, MetricRule, MetricSample};
use crate::scale::{MultiplierTable, ScaleResolver};
use crate::transport::DeviceTransport;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Poller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Maximum number of devices polled at the same time
    pub concurrency: usize,
    /// Upper bound on a single property fetch
    pub fetch_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            fetch_timeout: None,
        }
    }
}

/// Counters for one poll cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Devices visited
    pub devices: usize,
    /// Samples produced
    pub samples: usize,
    /// Fetches that failed or timed out
    pub failed_fetches: usize,
    /// Buffers that did not match their declared encoding
    pub malformed: usize,
}

impl PollStats {
    fn merge(&mut self, other: &PollStats) {
        self.devices += other.devices;
        self.samples += other.samples;
        self.failed_fetches += other.failed_fetches;
        self.malformed += other.malformed;
    }
}

/// Result of one poll cycle
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// Samples in device order, then rule order
    pub samples: Vec<MetricSample>,
    /// Cycle counters
    pub stats: PollStats,
}

/// Multipliers resolved in phase 1, keyed by unit property and table.
/// `None` means the fetch or decode failed.
type Multipliers = HashMap<(PropertyCode, MultiplierTable), Option<f64>>;

/// Evaluates class rules against devices
#[derive(Debug, Clone)]
pub struct DevicePoller {
    registry: Arc<ClassDecoderRegistry>,
    config: PollerConfig,
}

impl DevicePoller {
    /// Create a poller over a class registry
    pub fn new(registry: Arc<ClassDecoderRegistry>, config: PollerConfig) -> Self {
        Self { registry, config }
    }

    /// The class registry
    pub fn registry(&self) -> &ClassDecoderRegistry {
        &self.registry
    }

    /// Poll every device and return the samples
    pub async fn poll_all<T>(&self, transport: &T, devices: &[Device]) -> Vec<MetricSample>
    where
        T: DeviceTransport + ?Sized,
    {
        self.poll_cycle(transport, devices).await.samples
    }

    /// Poll every device, returning samples and counters
    ///
    /// Devices run concurrently up to `concurrency`; output order always
    /// follows `devices`.
    pub async fn poll_cycle<T>(&self, transport: &T, devices: &[Device]) -> PollOutcome
    where
        T: DeviceTransport + ?Sized,
    {
        // Futures are built up front (they stay inert until polled) so the
        // stream holds no closure; keeps the future `Send` for axum handlers
        let pending: Vec<_> = devices
            .iter()
            .map(|device| self.poll_device(transport, device))
            .collect();
        let per_device: Vec<PollOutcome> = stream::iter(pending)
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut outcome = PollOutcome::default();
        for device in per_device {
            outcome.stats.merge(&device.stats);
            outcome.samples.extend(device.samples);
        }
        outcome
    }

    /// Poll a single device
    pub async fn poll_device<T>(&self, transport: &T, device: &Device) -> PollOutcome
    where
        T: DeviceTransport + ?Sized,
    {
        let mut outcome = PollOutcome {
            samples: Vec::new(),
            stats: PollStats {
                devices: 1,
                ..Default::default()
            },
        };

        let rules = self.registry.rules_for(device.class.group, device.class.class);
        if rules.is_empty() {
            debug!(device = %device, "no rules for device class, skipping");
            return outcome;
        }

        let group = group_name(device.class.group);
        let class = class_name(device.class.group, device.class.class);
        debug!(device = %device, %group, %class, rules = rules.len(), "polling device");

        let multipliers = self
            .resolve_multipliers(transport, device, rules, &mut outcome.stats)
            .await;

        for rule in rules {
            let data = match self.fetch(transport, device, rule.property).await {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        device = %device,
                        epc = %format!("0x{:02X}", rule.property),
                        metric = rule.metric,
                        error = %e,
                        "property fetch failed"
                    );
                    outcome.stats.failed_fetches += 1;
                    continue;
                }
            };

            let reading = match PropertyCodec::decode_property(&data, rule.encoding) {
                Ok(reading) => reading,
                Err(e) => {
                    warn!(
                        device = %device,
                        epc = %format!("0x{:02X}", rule.property),
                        metric = rule.metric,
                        format = %rule.encoding.format(),
                        error = %e,
                        "malformed property buffer"
                    );
                    outcome.stats.malformed += 1;
                    continue;
                }
            };

            let coded = rule
                .scale
                .coded_property()
                .and_then(|key| multipliers.get(&key).copied().flatten());

            let base = SampleBase {
                rule,
                device,
                group: &group,
                class: &class,
            };
            match reading {
                Reading::Scalar(raw) => {
                    let value = ScaleResolver::resolve_with_factor(raw, rule.factor, &rule.scale, coded);
                    outcome.samples.push(base.sample(value, None));
                }
                Reading::Array(slots) => {
                    for (index, slot) in slots.into_iter().enumerate() {
                        let Some(raw) = slot else { continue };
                        let value =
                            ScaleResolver::resolve_with_factor(raw, rule.factor, &rule.scale, coded);
                        outcome.samples.push(base.sample(value, Some(index as u32 + 1)));
                    }
                }
            }
        }

        outcome.stats.samples = outcome.samples.len();
        outcome
    }

    /// Phase 1: fetch each distinct unit property once
    async fn resolve_multipliers<T>(
        &self,
        transport: &T,
        device: &Device,
        rules: &[MetricRule],
        stats: &mut PollStats,
    ) -> Multipliers
    where
        T: DeviceTransport + ?Sized,
    {
        let mut multipliers = Multipliers::new();

        for (property, table) in rules.iter().filter_map(|r| r.scale.coded_property()) {
            if multipliers.contains_key(&(property, table)) {
                continue;
            }

            let resolved = match self.fetch(transport, device, property).await {
                Ok(data) => match PropertyCodec::try_decode(&data, NumericFormat::UInt8) {
                    Ok(code) => {
                        let code = code as u8;
                        if table.lookup(code).is_none() {
                            debug!(
                                device = %device,
                                table = table.as_str(),
                                code = %format!("0x{:02X}", code),
                                "undefined unit code, using multiplier 1"
                            );
                        }
                        Some(table.multiplier(code))
                    }
                    Err(e) => {
                        warn!(
                            device = %device,
                            epc = %format!("0x{:02X}", property),
                            error = %e,
                            "malformed unit property, using multiplier 1"
                        );
                        stats.malformed += 1;
                        None
                    }
                },
                Err(e) => {
                    warn!(
                        device = %device,
                        epc = %format!("0x{:02X}", property),
                        error = %e,
                        "unit property fetch failed, using multiplier 1"
                    );
                    stats.failed_fetches += 1;
                    None
                }
            };

            multipliers.insert((property, table), resolved);
        }

        multipliers
    }

    /// Single fetch with the configured timeout
    async fn fetch<T>(
        &self,
        transport: &T,
        device: &Device,
        epc: PropertyCode,
    ) -> Result<Vec<u8>, TransportError>
    where
        T: DeviceTransport + ?Sized,
    {
        let request = transport.fetch_property(&device.address, device.class, epc);
        match self.config.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(TransportError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })),
            None => request.await,
        }
    }
}

/// Fields shared by all samples of one rule evaluation
struct SampleBase<'a> {
    rule: &'a MetricRule,
    device: &'a Device,
    group: &'a str,
    class: &'a str,
}

impl SampleBase<'_> {
    fn sample(&self, value: f64, circuit: Option<u32>) -> MetricSample {
        let location = match self.rule.label {
            LabelKind::Location(location) => Some(location.to_string()),
            LabelKind::None | LabelKind::Circuit => None,
        };
        MetricSample {
            metric: self.rule.metric.to_string(),
            address: self.device.address.clone(),
            group: self.group.to_string(),
            class: self.class.to_string(),
            circuit,
            location,
            value,
        }
    }
}

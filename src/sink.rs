//! Metric sink
//!
//! Owns an explicit Prometheus [`Registry`] with one [`GaugeVec`] per metric
//! name. Gauges are last-value-wins per label tuple. The gauge catalog and
//! the class rule table are cross-checked when the sink is built, so a rule
//! that writes an unregistered metric is a startup failure rather than a
//! sample silently dropped on every scrape.

use crate::classes::ClassDecoderRegistry;
use crate::error::{ConfigError, Result, SinkError};
use crate::poller::PollStats;
use crate::sample::{LabelShape, MetricSample};
use prometheus::{Encoder, Gauge, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Declaration of one device gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaugeSpec {
    /// Metric name
    pub name: &'static str,
    /// Help text
    pub help: &'static str,
    /// Label set
    pub labels: LabelShape,
}

impl GaugeSpec {
    const fn new(name: &'static str, help: &'static str, labels: LabelShape) -> Self {
        Self { name, help, labels }
    }
}

/// Gauges produced by the built-in class table
pub const BUILTIN_GAUGES: &[GaugeSpec] = &[
    // ============================================================
    // Distribution panel metering
    // ============================================================
    GaugeSpec::new(
        "power_total_in_kwh",
        "cumulative purchased electric energy in kWh",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "power_total_out_kwh",
        "cumulative reverse-direction electric energy in kWh",
        LabelShape::Device,
    ),
    GaugeSpec::new("total_power_watts", "total power in watts", LabelShape::Device),
    GaugeSpec::new(
        "circuit_power_total_kwh",
        "circuit cumulative electric energy in kWh",
        LabelShape::Circuit,
    ),
    GaugeSpec::new("circuit_power_watts", "circuit power in watts", LabelShape::Circuit),
    // ============================================================
    // Solar generation
    // ============================================================
    GaugeSpec::new(
        "power_generated_watts",
        "instantaneous generated power in watts",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "power_generated_kwh",
        "cumulative generated electric energy in kWh",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "power_sold_kwh",
        "cumulative sold electric energy in kWh",
        LabelShape::Device,
    ),
    // ============================================================
    // Water
    // ============================================================
    GaugeSpec::new(
        "water_consumed_liters",
        "cumulative consumed water in liters",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "water_heater_temperature_celsius",
        "water heater temperature in degrees celsius",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "water_heater_capacity_liters",
        "water heater tank capacity in liters",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "water_heater_available_liters",
        "remaining hot water in liters",
        LabelShape::Device,
    ),
    GaugeSpec::new(
        "water_heater_used_liters",
        "used hot water in liters",
        LabelShape::Device,
    ),
    // ============================================================
    // Climate
    // ============================================================
    GaugeSpec::new(
        "air_conditioner_temperature_celsius",
        "air conditioner measured temperature in degrees celsius",
        LabelShape::Location,
    ),
];

/// Check that the gauge catalog and the class rules agree
///
/// Every rule metric needs a gauge with the same label shape, every gauge
/// must be written by at least one rule, and gauge names are unique.
pub fn check_consistency(
    catalog: &[GaugeSpec],
    classes: &ClassDecoderRegistry,
) -> std::result::Result<(), ConfigError> {
    let mut by_name: HashMap<&str, &GaugeSpec> = HashMap::new();
    for spec in catalog {
        if by_name.insert(spec.name, spec).is_some() {
            return Err(ConfigError::DuplicateGauge(spec.name.to_string()));
        }
    }

    classes.validate()?;

    let mut used: HashSet<&str> = HashSet::new();
    for (code, rules) in classes.iter() {
        for rule in rules {
            let spec = by_name
                .get(rule.metric)
                .ok_or_else(|| ConfigError::MissingGauge {
                    metric: rule.metric.to_string(),
                    class: code.to_string(),
                })?;
            if spec.labels != rule.label.shape() {
                return Err(ConfigError::LabelShape {
                    metric: rule.metric.to_string(),
                    rule: rule.label.shape().as_str(),
                    gauge: spec.labels.as_str(),
                });
            }
            used.insert(rule.metric);
        }
    }

    match catalog.iter().find(|spec| !used.contains(spec.name)) {
        Some(unused) => Err(ConfigError::UnusedGauge(unused.name.to_string())),
        None => Ok(()),
    }
}

/// Exporter self-metrics, registered next to the device gauges
#[derive(Clone)]
struct ExporterMetrics {
    devices: IntGauge,
    samples: IntGauge,
    fetch_failures: IntCounter,
    poll_duration: Gauge,
}

impl ExporterMetrics {
    fn register(registry: &Registry) -> std::result::Result<Self, prometheus::Error> {
        let metrics = Self {
            devices: IntGauge::new("echonet_exporter_devices", "Number of discovered devices")?,
            samples: IntGauge::new(
                "echonet_exporter_samples",
                "Samples produced by the last poll cycle",
            )?,
            fetch_failures: IntCounter::new(
                "echonet_exporter_fetch_failures_total",
                "Property fetches that failed or timed out",
            )?,
            poll_duration: Gauge::new(
                "echonet_exporter_poll_duration_seconds",
                "Duration of the last poll cycle in seconds",
            )?,
        };
        registry.register(Box::new(metrics.devices.clone()))?;
        registry.register(Box::new(metrics.samples.clone()))?;
        registry.register(Box::new(metrics.fetch_failures.clone()))?;
        registry.register(Box::new(metrics.poll_duration.clone()))?;
        Ok(metrics)
    }
}

/// Applies samples to a Prometheus registry and renders the exposition
pub struct MetricSink {
    registry: Registry,
    gauges: HashMap<&'static str, (GaugeVec, LabelShape)>,
    exporter: ExporterMetrics,
    /// Held across "apply a cycle" and "render a snapshot"
    cycle: Mutex<()>,
}

impl MetricSink {
    /// Build a sink with the built-in gauge catalog
    pub fn builtin(classes: &ClassDecoderRegistry) -> Result<Self> {
        Self::new(BUILTIN_GAUGES, classes)
    }

    /// Build a sink after cross-checking the catalog against the rules
    pub fn new(catalog: &[GaugeSpec], classes: &ClassDecoderRegistry) -> Result<Self> {
        check_consistency(catalog, classes)?;

        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(catalog.len());
        for spec in catalog {
            let gauge = GaugeVec::new(Opts::new(spec.name, spec.help), spec.labels.label_names())
                .map_err(SinkError::from)?;
            registry
                .register(Box::new(gauge.clone()))
                .map_err(SinkError::from)?;
            gauges.insert(spec.name, (gauge, spec.labels));
        }
        let exporter = ExporterMetrics::register(&registry).map_err(SinkError::from)?;

        Ok(Self {
            registry,
            gauges,
            exporter,
            cycle: Mutex::new(()),
        })
    }

    /// The underlying registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply one cycle of samples and return the exposition text
    ///
    /// All samples are checked before any gauge is touched, so a bad
    /// sample leaves the registry unchanged.
    pub fn apply(&self, samples: &[MetricSample]) -> std::result::Result<String, SinkError> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.set_all(samples)?;
        self.encode()
    }

    /// Apply a poll cycle with its counters and return the exposition text
    pub fn apply_cycle(
        &self,
        samples: &[MetricSample],
        stats: &PollStats,
        elapsed: Duration,
    ) -> std::result::Result<String, SinkError> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.set_all(samples)?;
        self.exporter.samples.set(stats.samples as i64);
        self.exporter
            .fetch_failures
            .inc_by(stats.failed_fetches as u64);
        self.exporter.poll_duration.set(elapsed.as_secs_f64());
        self.encode()
    }

    /// Record the size of the device set
    pub fn set_device_count(&self, count: usize) {
        self.exporter.devices.set(count as i64);
    }

    /// Render the current registry without applying anything
    pub fn snapshot(&self) -> std::result::Result<String, SinkError> {
        let _cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        self.encode()
    }

    /// Read back a gauge value by label pairs
    pub fn read_gauge(&self, metric: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = self
            .registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == metric)?;

        family
            .get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(name, value)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *name && p.get_value() == *value)
                    })
            })
            .map(|m| m.get_gauge().get_value())
    }

    fn set_all(&self, samples: &[MetricSample]) -> std::result::Result<(), SinkError> {
        let mut resolved = Vec::with_capacity(samples.len());
        for sample in samples {
            let (gauge, shape) = self
                .gauges
                .get(sample.metric.as_str())
                .ok_or_else(|| SinkError::UnknownMetric(sample.metric.clone()))?;
            if sample.shape() != Some(*shape) {
                return Err(SinkError::LabelMismatch {
                    metric: sample.metric.clone(),
                    expected: shape.as_str(),
                });
            }
            resolved.push((gauge, sample));
        }

        for (gauge, sample) in resolved {
            let values = sample.label_values();
            let values: Vec<&str> = values.iter().map(String::as_str).collect();
            gauge.with_label_values(&values).set(sample.value);
        }
        Ok(())
    }

    fn encode(&self) -> std::result::Result<String, SinkError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for MetricSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricSink")
            .field("gauges", &self.gauges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{class, NumericFormat};
    use crate::sample::MetricRule;

    fn sample(metric: &str, value: f64) -> MetricSample {
        MetricSample {
            metric: metric.to_string(),
            address: "10.0.0.2".to_string(),
            group: "Housing/facility-related device class group".to_string(),
            class: "Power distribution board metering".to_string(),
            circuit: None,
            location: None,
            value,
        }
    }

    fn device_labels() -> Vec<(&'static str, &'static str)> {
        vec![
            ("address", "10.0.0.2"),
            ("echonet_group", "Housing/facility-related device class group"),
            ("echonet_class", "Power distribution board metering"),
        ]
    }

    #[test]
    fn test_builtin_catalog_is_consistent() {
        check_consistency(BUILTIN_GAUGES, &ClassDecoderRegistry::builtin()).unwrap();
    }

    #[test]
    fn test_missing_gauge_is_fatal() {
        let catalog: Vec<GaugeSpec> = BUILTIN_GAUGES
            .iter()
            .copied()
            .filter(|g| g.name != "power_sold_kwh")
            .collect();
        let result = MetricSink::new(&catalog, &ClassDecoderRegistry::builtin());
        assert!(matches!(
            result,
            Err(crate::ElMetricsError::Config(ConfigError::MissingGauge { .. }))
        ));
    }

    #[test]
    fn test_unused_gauge_is_fatal() {
        let classes = ClassDecoderRegistry::builder()
            .class(
                class::DISTRIBUTION_PANEL_METERING,
                vec![MetricRule::scalar(0xC6, NumericFormat::Int32, "total_power_watts")],
            )
            .build()
            .unwrap();
        let result = check_consistency(BUILTIN_GAUGES, &classes);
        assert!(matches!(result, Err(ConfigError::UnusedGauge(_))));
    }

    #[test]
    fn test_label_shape_mismatch_is_fatal() {
        let classes = ClassDecoderRegistry::builder()
            .class(
                class::DISTRIBUTION_PANEL_METERING,
                vec![MetricRule::scalar(0xC6, NumericFormat::Int32, "total_power_watts")
                    .at_location("panel")],
            )
            .build()
            .unwrap();
        let catalog = [GaugeSpec::new("total_power_watts", "w", LabelShape::Device)];
        let result = check_consistency(&catalog, &classes);
        assert!(matches!(result, Err(ConfigError::LabelShape { .. })));
    }

    #[test]
    fn test_duplicate_gauge_is_fatal() {
        let catalog = [
            GaugeSpec::new("total_power_watts", "w", LabelShape::Device),
            GaugeSpec::new("total_power_watts", "w", LabelShape::Device),
        ];
        let result = check_consistency(&catalog, &ClassDecoderRegistry::default());
        assert_eq!(
            result,
            Err(ConfigError::DuplicateGauge("total_power_watts".to_string()))
        );
    }

    #[test]
    fn test_last_value_wins() {
        let sink = MetricSink::builtin(&ClassDecoderRegistry::builtin()).unwrap();
        sink.apply(&[sample("total_power_watts", 100.0)]).unwrap();
        sink.apply(&[
            sample("total_power_watts", 250.0),
            sample("total_power_watts", 300.0),
        ])
        .unwrap();

        assert_eq!(
            sink.read_gauge("total_power_watts", &device_labels()),
            Some(300.0)
        );
    }

    #[test]
    fn test_unknown_metric_fails_loudly() {
        let sink = MetricSink::builtin(&ClassDecoderRegistry::builtin()).unwrap();
        let result = sink.apply(&[sample("total_power_watts", 1.0), sample("bogus", 1.0)]);
        assert!(matches!(result, Err(SinkError::UnknownMetric(m)) if m == "bogus"));
        // nothing from the rejected cycle was applied
        assert_eq!(sink.read_gauge("total_power_watts", &device_labels()), None);
    }

    #[test]
    fn test_label_mismatch_fails_loudly() {
        let sink = MetricSink::builtin(&ClassDecoderRegistry::builtin()).unwrap();
        let result = sink.apply(&[sample("circuit_power_watts", 1.0)]);
        assert!(matches!(result, Err(SinkError::LabelMismatch { .. })));
    }

    #[test]
    fn test_exposition_contains_labels() {
        let sink = MetricSink::builtin(&ClassDecoderRegistry::builtin()).unwrap();
        let mut circuit = sample("circuit_power_watts", 42.0);
        circuit.circuit = Some(2);
        let text = sink.apply(&[circuit]).unwrap();

        assert!(text.contains("# TYPE circuit_power_watts gauge"));
        assert!(text.contains("circuit_id=\"2\""));
        assert!(text.contains("echonet_class=\"Power distribution board metering\""));
    }

    #[test]
    fn test_self_metrics() {
        let sink = MetricSink::builtin(&ClassDecoderRegistry::builtin()).unwrap();
        sink.set_device_count(3);
        let stats = PollStats {
            devices: 3,
            samples: 0,
            failed_fetches: 2,
            malformed: 0,
        };
        let text = sink
            .apply_cycle(&[], &stats, Duration::from_millis(250))
            .unwrap();

        assert!(text.contains("echonet_exporter_devices 3"));
        assert!(text.contains("echonet_exporter_fetch_failures_total 2"));
        assert!(text.contains("echonet_exporter_poll_duration_seconds 0.25"));
    }
}

//! Metric rules and samples
//!
//! A [`MetricRule`] says which property to read and how to turn it into a
//! named gauge value; a [`MetricSample`] is one resulting value for one
//! device in one poll cycle.

use crate::protocol::{NumericFormat, PropertyCode, PropertyEncoding};
use crate::scale::ScaleRule;
use std::fmt;

/// Extra label attached to a metric beyond address/group/class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    /// address, echonet_group, echonet_class only
    None,
    /// Adds `circuit_id`, assigned from the array slot position
    Circuit,
    /// Adds a fixed `location` tag
    Location(&'static str),
}

impl LabelKind {
    /// Label shape, ignoring the location value
    pub fn shape(&self) -> LabelShape {
        match self {
            LabelKind::None => LabelShape::Device,
            LabelKind::Circuit => LabelShape::Circuit,
            LabelKind::Location(_) => LabelShape::Location,
        }
    }
}

/// Label set of a gauge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelShape {
    /// address, echonet_group, echonet_class
    Device,
    /// Device labels + circuit_id
    Circuit,
    /// Device labels + location
    Location,
}

impl LabelShape {
    /// Prometheus label names, in value order
    pub fn label_names(&self) -> &'static [&'static str] {
        match self {
            LabelShape::Device => &["address", "echonet_group", "echonet_class"],
            LabelShape::Circuit => &["address", "echonet_group", "echonet_class", "circuit_id"],
            LabelShape::Location => &["address", "echonet_group", "echonet_class", "location"],
        }
    }

    /// Shape name for error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelShape::Device => "device",
            LabelShape::Circuit => "circuit",
            LabelShape::Location => "location",
        }
    }
}

/// Declarative extraction rule for one property
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRule {
    /// Property to fetch
    pub property: PropertyCode,
    /// How to interpret the bytes
    pub encoding: PropertyEncoding,
    /// How to scale the raw integer
    pub scale: ScaleRule,
    /// Unit conversion factor applied before scaling (e.g. m³ → L)
    pub factor: f64,
    /// Target gauge name
    pub metric: &'static str,
    /// Label shape
    pub label: LabelKind,
}

impl MetricRule {
    /// Scalar rule with no scaling and no extra labels
    pub fn scalar(property: PropertyCode, format: NumericFormat, metric: &'static str) -> Self {
        Self {
            property,
            encoding: PropertyEncoding::Scalar(format),
            scale: ScaleRule::None,
            factor: 1.0,
            metric,
            label: LabelKind::None,
        }
    }

    /// Array rule expanding into one circuit-labelled sample per slot
    pub fn circuits(property: PropertyCode, format: NumericFormat, metric: &'static str) -> Self {
        Self {
            encoding: PropertyEncoding::Array(format),
            label: LabelKind::Circuit,
            ..Self::scalar(property, format, metric)
        }
    }

    /// Set the scale rule
    pub fn with_scale(mut self, scale: ScaleRule) -> Self {
        self.scale = scale;
        self
    }

    /// Set the conversion factor
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Tag samples with a location
    pub fn at_location(mut self, location: &'static str) -> Self {
        self.label = LabelKind::Location(location);
        self
    }
}

/// One decoded value ready for the metric sink
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Gauge name
    pub metric: String,
    /// Device address
    pub address: String,
    /// Human-readable class group name
    pub group: String,
    /// Human-readable class name
    pub class: String,
    /// 1-based circuit index for array rules
    pub circuit: Option<u32>,
    /// Location tag for location rules
    pub location: Option<String>,
    /// Scaled value
    pub value: f64,
}

impl MetricSample {
    /// Label shape of this sample; `None` if it carries both a circuit
    /// and a location
    pub fn shape(&self) -> Option<LabelShape> {
        match (self.circuit, &self.location) {
            (None, None) => Some(LabelShape::Device),
            (Some(_), None) => Some(LabelShape::Circuit),
            (None, Some(_)) => Some(LabelShape::Location),
            (Some(_), Some(_)) => None,
        }
    }

    /// Label values matching [`LabelShape::label_names`]
    pub fn label_values(&self) -> Vec<String> {
        let mut values = vec![self.address.clone(), self.group.clone(), self.class.clone()];
        if let Some(circuit) = self.circuit {
            values.push(circuit.to_string());
        }
        if let Some(ref location) = self.location {
            values.push(location.clone());
        }
        values
    }
}

impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{address=\"{}\"", self.metric, self.address)?;
        if let Some(circuit) = self.circuit {
            write!(f, ",circuit_id=\"{}\"", circuit)?;
        }
        if let Some(ref location) = self.location {
            write!(f, ",location=\"{}\"", location)?;
        }
        write!(f, "}} {}", self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scale::MultiplierTable;

    #[test]
    fn test_rule_builders() {
        let rule = MetricRule::circuits(0xB3, NumericFormat::UInt32, "circuit_power_total_kwh")
            .with_scale(ScaleRule::CodedMultiplier {
                property: 0xC2,
                table: MultiplierTable::EnergyUnit,
            });
        assert!(rule.encoding.is_array());
        assert_eq!(rule.label, LabelKind::Circuit);
        assert_eq!(rule.factor, 1.0);
        assert_eq!(rule.scale.coded_property(), Some((0xC2, MultiplierTable::EnergyUnit)));

        let rule = MetricRule::scalar(0xBB, NumericFormat::Int8, "t").at_location("indoor");
        assert_eq!(rule.label, LabelKind::Location("indoor"));
    }

    #[test]
    fn test_label_shapes() {
        assert_eq!(
            LabelKind::Location("indoor").shape(),
            LabelKind::Location("outdoor").shape()
        );
        assert_ne!(LabelKind::Circuit.shape(), LabelKind::None.shape());
        assert_eq!(LabelShape::Circuit.label_names().len(), 4);
    }

    #[test]
    fn test_sample_display() {
        let sample = MetricSample {
            metric: "circuit_power_watts".to_string(),
            address: "10.0.0.2".to_string(),
            group: "g".to_string(),
            class: "c".to_string(),
            circuit: Some(3),
            location: None,
            value: 120.0,
        };
        assert_eq!(sample.shape(), Some(LabelShape::Circuit));
        assert_eq!(sample.label_values(), vec!["10.0.0.2", "g", "c", "3"]);
        assert_eq!(
            sample.to_string(),
            "circuit_power_watts{address=\"10.0.0.2\",circuit_id=\"3\"} 120"
        );
    }
}

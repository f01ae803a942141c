//! Class decoder registry
//!
//! Maps a device class to the ordered list of [`MetricRule`]s that describe
//! what to read from it. The table is built once at startup and never
//! changes; adding a device class means adding a row set here, not new
//! polling code.

use crate::error::ConfigError;
use crate::protocol::{class, epc, ClassCode, NumericFormat};
use crate::sample::{LabelKind, MetricRule};
use crate::scale::{MultiplierTable, ScaleRule};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

/// Immutable class → rules table
#[derive(Debug, Clone, Default)]
pub struct ClassDecoderRegistry {
    classes: BTreeMap<ClassCode, Vec<MetricRule>>,
}

impl ClassDecoderRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The built-in table of supported device classes
    pub fn builtin() -> Self {
        let energy_unit = ScaleRule::CodedMultiplier {
            property: epc::panel::ENERGY_UNIT,
            table: MultiplierTable::EnergyUnit,
        };
        let volume_unit = ScaleRule::CodedMultiplier {
            property: epc::water_meter::VOLUME_UNIT,
            table: MultiplierTable::WaterVolumeUnit,
        };

        let classes = BTreeMap::from([
            (
                class::DISTRIBUTION_PANEL_METERING,
                vec![
                    MetricRule::scalar(
                        epc::panel::CUMULATIVE_IN,
                        NumericFormat::UInt32,
                        "power_total_in_kwh",
                    )
                    .with_scale(energy_unit),
                    MetricRule::scalar(
                        epc::panel::CUMULATIVE_OUT,
                        NumericFormat::UInt32,
                        "power_total_out_kwh",
                    )
                    .with_scale(energy_unit),
                    MetricRule::scalar(
                        epc::panel::INSTANTANEOUS_POWER,
                        NumericFormat::Int32,
                        "total_power_watts",
                    ),
                    MetricRule::circuits(
                        epc::panel::CIRCUIT_CUMULATIVE_LIST,
                        NumericFormat::UInt32,
                        "circuit_power_total_kwh",
                    )
                    .with_scale(energy_unit),
                    MetricRule::circuits(
                        epc::panel::CIRCUIT_POWER_LIST,
                        NumericFormat::Int32,
                        "circuit_power_watts",
                    ),
                ],
            ),
            (
                class::SOLAR_POWER_GENERATION,
                vec![
                    MetricRule::scalar(
                        epc::solar::INSTANTANEOUS_GENERATED,
                        NumericFormat::UInt16,
                        "power_generated_watts",
                    ),
                    MetricRule::scalar(
                        epc::solar::CUMULATIVE_GENERATED,
                        NumericFormat::UInt32,
                        "power_generated_kwh",
                    )
                    .with_scale(ScaleRule::FixedMultiplier(0.001)),
                    MetricRule::scalar(
                        epc::solar::CUMULATIVE_SOLD,
                        NumericFormat::UInt32,
                        "power_sold_kwh",
                    )
                    .with_scale(ScaleRule::FixedMultiplier(0.001)),
                ],
            ),
            (
                class::WATER_FLOW_METER,
                vec![MetricRule::scalar(
                    epc::water_meter::CUMULATIVE_VOLUME,
                    NumericFormat::UInt32,
                    "water_consumed_liters",
                )
                .with_scale(volume_unit)
                .with_factor(1000.0)],
            ),
            (
                class::ELECTRIC_WATER_HEATER,
                vec![
                    MetricRule::scalar(
                        epc::water_heater::TEMPERATURE,
                        NumericFormat::UInt8,
                        "water_heater_temperature_celsius",
                    ),
                    MetricRule::scalar(
                        epc::water_heater::TANK_CAPACITY,
                        NumericFormat::UInt16,
                        "water_heater_capacity_liters",
                    ),
                    MetricRule::scalar(
                        epc::water_heater::AVAILABLE_VOLUME,
                        NumericFormat::UInt16,
                        "water_heater_available_liters",
                    ),
                    MetricRule::scalar(
                        epc::water_heater::USED_VOLUME,
                        NumericFormat::UInt16,
                        "water_heater_used_liters",
                    ),
                ],
            ),
            (
                class::HOME_AIR_CONDITIONER,
                vec![
                    MetricRule::scalar(
                        epc::air_conditioner::INDOOR_TEMPERATURE,
                        NumericFormat::Int8,
                        "air_conditioner_temperature_celsius",
                    )
                    .at_location("indoor"),
                    MetricRule::scalar(
                        epc::air_conditioner::OUTDOOR_TEMPERATURE,
                        NumericFormat::Int8,
                        "air_conditioner_temperature_celsius",
                    )
                    .at_location("outdoor"),
                ],
            ),
        ]);

        Self { classes }
    }

    /// Rules for a class; empty when the class is not supported
    pub fn rules_for(&self, group: u8, class: u8) -> &[MetricRule] {
        self.classes
            .get(&ClassCode::new(group, class))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether any rules exist for a class
    pub fn supports(&self, class: ClassCode) -> bool {
        self.classes.contains_key(&class)
    }

    /// Iterate over all classes and their rules
    pub fn iter(&self) -> impl Iterator<Item = (&ClassCode, &[MetricRule])> {
        self.classes.iter().map(|(code, rules)| (code, rules.as_slice()))
    }

    /// Number of supported classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Check the per-class invariants
    ///
    /// - array encodings carry circuit labels and nothing else does
    /// - no two rules of a class write the same gauge identity
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (code, rules) in &self.classes {
            let mut seen: HashSet<(&str, LabelKind)> = HashSet::new();
            for rule in rules {
                let is_circuit = rule.label == LabelKind::Circuit;
                if rule.encoding.is_array() != is_circuit {
                    return Err(ConfigError::InvalidRule {
                        class: code.to_string(),
                        metric: rule.metric.to_string(),
                        reason: "array encodings must use circuit labels and only they may",
                    });
                }
                if !seen.insert((rule.metric, rule.label)) {
                    return Err(ConfigError::DuplicateRule {
                        class: code.to_string(),
                        metric: rule.metric.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Builder for custom registries
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classes: BTreeMap<ClassCode, Vec<MetricRule>>,
    duplicate: Option<ClassCode>,
}

impl RegistryBuilder {
    /// Register the rule list of a class
    pub fn class(mut self, code: ClassCode, rules: Vec<MetricRule>) -> Self {
        if self.classes.insert(code, rules).is_some() && self.duplicate.is_none() {
            self.duplicate = Some(code);
        }
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<ClassDecoderRegistry, ConfigError> {
        if let Some(code) = self.duplicate {
            return Err(ConfigError::DuplicateClass(code.to_string()));
        }
        let registry = ClassDecoderRegistry {
            classes: self.classes,
        };
        registry.validate()?;
        Ok(registry)
    }
}

/// Human-readable class group name
pub fn group_name(group: u8) -> Cow<'static, str> {
    let name = match group {
        0x00 => "Sensor-related device class group",
        0x01 => "Air conditioner-related device class group",
        0x02 => "Housing/facility-related device class group",
        0x03 => "Cooking/housework-related device class group",
        0x04 => "Health-related device class group",
        0x05 => "Management/control-related device class group",
        0x06 => "AV-related device class group",
        0x0E => "Profile class group",
        0x0F => "User definition class group",
        _ => return Cow::Owned(format!("0x{:02X}", group)),
    };
    Cow::Borrowed(name)
}

/// Human-readable class name
pub fn class_name(group: u8, class: u8) -> Cow<'static, str> {
    let name = match (group, class) {
        (0x00, 0x11) => "Temperature sensor",
        (0x00, 0x12) => "Humidity sensor",
        (0x01, 0x30) => "Home air conditioner",
        (0x01, 0x35) => "Air cleaner",
        (0x02, 0x6B) => "Electric water heater",
        (0x02, 0x79) => "Household solar power generation",
        (0x02, 0x7D) => "Storage battery",
        (0x02, 0x81) => "Water flow meter",
        (0x02, 0x82) => "Gas meter",
        (0x02, 0x87) => "Power distribution board metering",
        (0x02, 0x88) => "Low-voltage smart electric energy meter",
        (0x02, 0x90) => "General lighting",
        (0x05, 0xFF) => "Controller",
        (0x0E, 0xF0) => "Node profile",
        _ => return Cow::Owned(ClassCode::new(group, class).to_string()),
    };
    Cow::Borrowed(name)
}

//! Scale resolution
//!
//! Turns raw integer readings into physical values. A multiplier `m` means
//! one raw unit is `m` reported units. Fractional multipliers are applied by
//! dividing by their (integer) inverse so that `0.001` scales by exactly
//! `/ 1000` instead of accumulating the representation error of `0.001`.

use crate::protocol::PropertyCode;

/// Code→multiplier lookup table for a unit property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiplierTable {
    /// Unit for cumulative electric energy (kWh), codes 0x00-0x0D
    EnergyUnit,
    /// Unit for cumulative flowing water (m³), codes 0x00-0x06
    WaterVolumeUnit,
}

impl MultiplierTable {
    /// Look up a unit code. `None` for codes the table does not define.
    pub fn lookup(&self, code: u8) -> Option<f64> {
        match self {
            MultiplierTable::EnergyUnit => match code {
                0x00 => Some(1.0),
                0x01 => Some(0.1),
                0x02 => Some(0.01),
                0x03 => Some(0.001),
                0x04 => Some(0.0001),
                0x0A => Some(10.0),
                0x0B => Some(100.0),
                0x0C => Some(1000.0),
                0x0D => Some(10000.0),
                _ => None,
            },
            MultiplierTable::WaterVolumeUnit => match code {
                0x00 => Some(1.0),
                0x01 => Some(0.1),
                0x02 => Some(0.01),
                0x03 => Some(0.001),
                0x04 => Some(0.0001),
                0x05 => Some(0.00001),
                0x06 => Some(0.000001),
                _ => None,
            },
        }
    }

    /// Look up a unit code, defaulting to 1 for undefined codes
    pub fn multiplier(&self, code: u8) -> f64 {
        self.lookup(code).unwrap_or(1.0)
    }

    /// Table name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MultiplierTable::EnergyUnit => "energy_unit",
            MultiplierTable::WaterVolumeUnit => "water_volume_unit",
        }
    }
}

/// How a raw reading is scaled
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ScaleRule {
    /// Raw value is already in the reported unit
    #[default]
    None,
    /// Constant multiplier
    FixedMultiplier(f64),
    /// Multiplier read from another property of the same device
    CodedMultiplier {
        /// Property carrying the unit code
        property: PropertyCode,
        /// Table translating the code
        table: MultiplierTable,
    },
}

impl ScaleRule {
    /// Unit property this rule depends on, if any
    pub fn coded_property(&self) -> Option<(PropertyCode, MultiplierTable)> {
        match self {
            ScaleRule::CodedMultiplier { property, table } => Some((*property, *table)),
            _ => None,
        }
    }
}

/// Applies scale rules to raw readings
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaleResolver;

impl ScaleResolver {
    /// Resolve a raw reading
    ///
    /// `coded_lookup` is the already-resolved multiplier for a
    /// [`ScaleRule::CodedMultiplier`]; `None` (fetch failed) means 1.
    pub fn resolve(raw: i64, rule: &ScaleRule, coded_lookup: Option<f64>) -> f64 {
        Self::resolve_with_factor(raw, 1.0, rule, coded_lookup)
    }

    /// Resolve a raw reading after applying a unit conversion factor
    pub fn resolve_with_factor(
        raw: i64,
        factor: f64,
        rule: &ScaleRule,
        coded_lookup: Option<f64>,
    ) -> f64 {
        let value = raw as f64 * factor;
        match rule {
            ScaleRule::None => value,
            ScaleRule::FixedMultiplier(m) => Self::apply(value, *m),
            ScaleRule::CodedMultiplier { .. } => Self::apply(value, coded_lookup.unwrap_or(1.0)),
        }
    }

    /// Apply multiplier `m` to a value
    pub fn apply(value: f64, m: f64) -> f64 {
        if m > 0.0 && m < 1.0 {
            value / inverse(m)
        } else {
            value * m
        }
    }
}

/// Inverse of a fractional multiplier, snapped to an integer when the
/// multiplier is a negative power of ten (or any 1/n)
fn inverse(m: f64) -> f64 {
    let inv = 1.0 / m;
    let rounded = inv.round();
    if (inv - rounded).abs() <= rounded * 1e-9 {
        rounded
    } else {
        inv
    }
}

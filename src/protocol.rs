//! Protocol definitions for ELMetrics
//!
//! This module defines the core ECHONET Lite types used by the pipeline:
//! - Class codes (group + class) and device identity
//! - Numeric formats and property encodings
//! - Well-known property codes (EPC)

use std::fmt;

/// Property code (EPC) of a readable device attribute
pub type PropertyCode = u8;

/// Two-level device type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassCode {
    /// Class group code (e.g. 0x02 housing/facility-related)
    pub group: u8,
    /// Class code within the group (e.g. 0x87 distribution panel metering)
    pub class: u8,
}

impl ClassCode {
    /// Create a class code from its group and class bytes
    pub const fn new(group: u8, class: u8) -> Self {
        Self { group, class }
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}{:02X}", self.group, self.class)
    }
}

/// A discovered device
///
/// Identity is the (address, class) pair. Devices are immutable after
/// discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Device {
    /// Transport-level endpoint identifier (usually an IP address)
    pub address: String,
    /// Device class
    pub class: ClassCode,
}

impl Device {
    /// Create a new device
    pub fn new(address: impl Into<String>, class: ClassCode) -> Self {
        Self {
            address: address.into(),
            class,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.class)
    }
}

/// Fixed-width big-endian integer format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    /// unsigned char (1 byte)
    UInt8,
    /// signed char (1 byte)
    Int8,
    /// unsigned short (2 bytes)
    UInt16,
    /// signed short (2 bytes)
    Int16,
    /// unsigned long (4 bytes)
    UInt32,
    /// signed long (4 bytes)
    Int32,
}

impl NumericFormat {
    /// Width in bytes
    pub fn width(&self) -> usize {
        match self {
            NumericFormat::UInt8 | NumericFormat::Int8 => 1,
            NumericFormat::UInt16 | NumericFormat::Int16 => 2,
            NumericFormat::UInt32 | NumericFormat::Int32 => 4,
        }
    }

    /// Whether values are two's-complement signed
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            NumericFormat::Int8 | NumericFormat::Int16 | NumericFormat::Int32
        )
    }

    /// Check whether a decoded value is one of the reserved
    /// overflow/underflow/no-data codes of this format.
    pub fn is_not_applicable(&self, value: i64) -> bool {
        let bits = (self.width() * 8) as u32;
        if self.is_signed() {
            let max = (1i64 << (bits - 1)) - 1;
            let min = -(1i64 << (bits - 1));
            value == max || value == max - 1 || value == min
        } else {
            let max = (1i64 << bits) - 1;
            value == max || value == max - 1
        }
    }
}

impl fmt::Display for NumericFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NumericFormat::UInt8 => "u8",
            NumericFormat::Int8 => "i8",
            NumericFormat::UInt16 => "u16be",
            NumericFormat::Int16 => "i16be",
            NumericFormat::UInt32 => "u32be",
            NumericFormat::Int32 => "i32be",
        };
        f.write_str(name)
    }
}

/// How a raw property buffer is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyEncoding {
    /// A single value of the given format
    Scalar(NumericFormat),
    /// `[min_index, max_index]` header followed by homogeneous elements
    Array(NumericFormat),
}

impl PropertyEncoding {
    /// Element format
    pub fn format(&self) -> NumericFormat {
        match self {
            PropertyEncoding::Scalar(f) | PropertyEncoding::Array(f) => *f,
        }
    }

    /// Whether this is an array encoding
    pub fn is_array(&self) -> bool {
        matches!(self, PropertyEncoding::Array(_))
    }
}

/// Well-known class codes
pub mod class {
    use super::ClassCode;

    /// Home air conditioner
    pub const HOME_AIR_CONDITIONER: ClassCode = ClassCode::new(0x01, 0x30);
    /// Electric water heater
    pub const ELECTRIC_WATER_HEATER: ClassCode = ClassCode::new(0x02, 0x6B);
    /// Household solar power generation
    pub const SOLAR_POWER_GENERATION: ClassCode = ClassCode::new(0x02, 0x79);
    /// Water flow meter
    pub const WATER_FLOW_METER: ClassCode = ClassCode::new(0x02, 0x81);
    /// Power distribution board metering
    pub const DISTRIBUTION_PANEL_METERING: ClassCode = ClassCode::new(0x02, 0x87);
    /// Node profile
    pub const NODE_PROFILE: ClassCode = ClassCode::new(0x0E, 0xF0);
}

/// Well-known property codes, grouped by device class
pub mod epc {
    /// Distribution panel metering (0x0287)
    pub mod panel {
        /// Measured cumulative electric energy, normal direction
        pub const CUMULATIVE_IN: u8 = 0xC0;
        /// Measured cumulative electric energy, reverse direction
        pub const CUMULATIVE_OUT: u8 = 0xC1;
        /// Unit for cumulative electric energy
        pub const ENERGY_UNIT: u8 = 0xC2;
        /// Measured instantaneous electric power
        pub const INSTANTANEOUS_POWER: u8 = 0xC6;
        /// Per-circuit cumulative electric energy list
        pub const CIRCUIT_CUMULATIVE_LIST: u8 = 0xB3;
        /// Per-circuit instantaneous power list
        pub const CIRCUIT_POWER_LIST: u8 = 0xB7;
    }

    /// Household solar power generation (0x0279)
    pub mod solar {
        /// Measured instantaneous generated power
        pub const INSTANTANEOUS_GENERATED: u8 = 0xE0;
        /// Measured cumulative generated energy (0.001 kWh)
        pub const CUMULATIVE_GENERATED: u8 = 0xE1;
        /// Measured cumulative sold energy (0.001 kWh)
        pub const CUMULATIVE_SOLD: u8 = 0xE3;
    }

    /// Water flow meter (0x0281)
    pub mod water_meter {
        /// Measured cumulative flowing water
        pub const CUMULATIVE_VOLUME: u8 = 0xE0;
        /// Unit for cumulative flowing water
        pub const VOLUME_UNIT: u8 = 0xE1;
    }

    /// Electric water heater (0x026B)
    pub mod water_heater {
        /// Measured water temperature
        pub const TEMPERATURE: u8 = 0xC1;
        /// Remaining hot water volume
        pub const AVAILABLE_VOLUME: u8 = 0xE1;
        /// Tank capacity
        pub const TANK_CAPACITY: u8 = 0xE2;
        /// Used hot water volume
        pub const USED_VOLUME: u8 = 0xEC;
    }

    /// Home air conditioner (0x0130)
    pub mod air_conditioner {
        /// Measured room temperature
        pub const INDOOR_TEMPERATURE: u8 = 0xBB;
        /// Measured outdoor air temperature
        pub const OUTDOOR_TEMPERATURE: u8 = 0xBE;
    }
}

// ELMetrics Exporter - Fixture replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixture replay for running the exporter without a network transport.
//!
//! A fixture is a CSV file describing devices and their property
//! responses:
//!
//! ```text
//! address,group,class,epc,data
//! 192.168.1.20,0x02,0x87,0xC2,02
//! 192.168.1.20,0x02,0x87,0xC0,0007A120
//! 192.168.1.20,0x02,0x87,0xC6,
//! 192.168.1.30,0x0E,0xF0,,
//! ```
//!
//! An empty `data` cell makes the property fetch fail. An empty `epc`
//! cell only announces the device.

use elmetrics::{ClassCode, Device, StaticTransport, TransportError};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

const HEADERS: [&str; 5] = ["address", "group", "class", "epc", "data"];

/// Summary of a loaded fixture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixtureInfo {
    /// Distinct devices.
    pub device_count: usize,
    /// Property rows with a payload.
    pub property_count: usize,
    /// Property rows that fail on fetch.
    pub failure_count: usize,
}

/// Fixture loaded into an in-memory transport.
#[derive(Debug)]
pub struct Fixture {
    transport: StaticTransport,
    info: FixtureInfo,
}

impl Fixture {
    /// Load a fixture file.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ReplayError::FileNotFound(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let fixture = Self::parse(&mut reader)?;

        info!(
            "Loaded fixture: {} devices, {} properties, {} failing",
            fixture.info.device_count, fixture.info.property_count, fixture.info.failure_count
        );
        Ok(fixture)
    }

    fn parse<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Self, ReplayError> {
        let headers = reader.headers()?.clone();
        let header_strs: Vec<&str> = headers.iter().map(str::trim).collect();
        if header_strs != HEADERS {
            return Err(ReplayError::InvalidFormat(format!(
                "Header must be '{}'",
                HEADERS.join(",")
            )));
        }

        let mut transport = StaticTransport::new();
        let mut info = FixtureInfo::default();

        for (index, result) in reader.records().enumerate() {
            let record = result?;
            // Header is line 1
            let line = index + 2;
            let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");

            let address = field(0);
            if address.is_empty() {
                return Err(ReplayError::InvalidRow {
                    line,
                    reason: "empty address".to_string(),
                });
            }
            let group = parse_code(field(1), line, "group")?;
            let class = parse_code(field(2), line, "class")?;
            let device = Device::new(address, ClassCode::new(group, class));

            if !transport.devices().contains(&device) {
                info.device_count += 1;
            }
            transport.insert_device(device.clone());

            if field(3).is_empty() {
                continue;
            }
            let epc = parse_code(field(3), line, "epc")?;

            let data = field(4);
            let response = if data.is_empty() {
                info.failure_count += 1;
                Err(TransportError::Unreachable(device.address.clone()))
            } else {
                info.property_count += 1;
                let digits = data.trim_start_matches("0x").trim_start_matches("0X");
                Ok(hex::decode(digits).map_err(|e| ReplayError::InvalidRow {
                    line,
                    reason: format!("data: {}", e),
                })?)
            };
            debug!(device = %device, epc = %format!("0x{:02X}", epc), "fixture property");
            transport.insert_response(&device, epc, response);
        }

        if info.device_count == 0 {
            return Err(ReplayError::EmptyFixture);
        }

        Ok(Self { transport, info })
    }

    /// Fixture summary.
    pub fn info(&self) -> FixtureInfo {
        self.info.clone()
    }

    /// Hand over the transport.
    pub fn into_transport(self) -> StaticTransport {
        self.transport
    }
}

/// Parse a one-byte hex code, with or without `0x`.
fn parse_code(text: &str, line: usize, column: &str) -> Result<u8, ReplayError> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(digits, 16).map_err(|_| ReplayError::InvalidRow {
        line,
        reason: format!("{} '{}' is not a hex byte", column, text),
    })
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid row at line {line}: {reason}")]
    InvalidRow { line: usize, reason: String },

    #[error("Empty fixture")]
    EmptyFixture,
}

#[cfg(test)]
mod tests {
    use super::*;
    use elmetrics::{class, DeviceTransport};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "address,group,class,epc,data").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_fixture() {
        let file = create_test_csv(&[
            "192.168.1.20,0x02,0x87,0xC2,02",
            "192.168.1.20,0x02,0x87,0xC0,0007A120",
            "192.168.1.20,0x02,0x87,0xC6,",
            "192.168.1.30,0E,F0,,",
        ]);

        let fixture = Fixture::from_csv(file.path()).expect("Failed to parse fixture");
        assert_eq!(
            fixture.info(),
            FixtureInfo {
                device_count: 2,
                property_count: 2,
                failure_count: 1,
            }
        );

        let transport = fixture.into_transport();
        assert_eq!(transport.devices().len(), 2);
        assert_eq!(transport.devices()[1].class, class::NODE_PROFILE);
    }

    #[tokio::test]
    async fn test_fixture_responses() {
        let file = create_test_csv(&[
            "192.168.1.20,0x02,0x87,0xC0,0x0007A120",
            "192.168.1.20,0x02,0x87,0xC6,",
        ]);
        let transport = Fixture::from_csv(file.path()).unwrap().into_transport();
        let panel = class::DISTRIBUTION_PANEL_METERING;

        assert_eq!(
            transport.fetch_property("192.168.1.20", panel, 0xC0).await,
            Ok(vec![0x00, 0x07, 0xA1, 0x20])
        );
        assert!(transport
            .fetch_property("192.168.1.20", panel, 0xC6)
            .await
            .is_err());
    }

    #[test]
    fn test_invalid_fixtures() {
        let file = create_test_csv(&["192.168.1.20,0x02,0x287,0xC0,00"]);
        assert!(matches!(
            Fixture::from_csv(file.path()),
            Err(ReplayError::InvalidRow { line: 2, .. })
        ));

        let file = create_test_csv(&["192.168.1.20,0x02,0x87,0xC0,0G"]);
        assert!(matches!(
            Fixture::from_csv(file.path()),
            Err(ReplayError::InvalidRow { .. })
        ));

        let file = create_test_csv(&[]);
        assert!(matches!(
            Fixture::from_csv(file.path()),
            Err(ReplayError::EmptyFixture)
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp_ms,temp").unwrap();
        file.flush().unwrap();
        assert!(matches!(
            Fixture::from_csv(file.path()),
            Err(ReplayError::InvalidFormat(_))
        ));

        assert!(matches!(
            Fixture::from_csv("/nonexistent/fixture.csv"),
            Err(ReplayError::FileNotFound(_))
        ));
    }
}

// ELMetrics - ECHONET Lite property decoding for Prometheus
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device transport seam
//!
//! The network side of ECHONET Lite (multicast discovery, UDP framing,
//! request/response matching) lives behind [`DeviceTransport`]. The
//! pipeline only needs a discovery feed and a single-property fetch.

use crate::error::TransportError;
use crate::protocol::{ClassCode, Device, PropertyCode};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Transport collaborator used by the exporter
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Feed of discovered devices; may be endless
    fn discover(&self) -> BoxStream<'_, Device>;

    /// Fetch the raw EDT bytes of one property
    async fn fetch_property(
        &self,
        address: &str,
        class: ClassCode,
        epc: PropertyCode,
    ) -> Result<Vec<u8>, TransportError>;

    /// Release transport resources
    async fn close(&self) {}
}

type PropertyKey = (String, ClassCode, PropertyCode);

/// In-memory transport answering from a fixed table
///
/// Properties with no entry answer [`TransportError::PropertyUnavailable`];
/// addresses with no device answer [`TransportError::Unreachable`].
/// After [`DeviceTransport::close`] every fetch answers
/// [`TransportError::Closed`] and discovery is empty.
#[derive(Debug, Default)]
pub struct StaticTransport {
    devices: Vec<Device>,
    responses: HashMap<PropertyKey, Result<Vec<u8>, TransportError>>,
    fetch_log: Mutex<Vec<(String, PropertyCode)>>,
    closed: AtomicBool,
}

impl StaticTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a device to the discovery feed (duplicates are kept, as a real
    /// network would repeat announcements)
    pub fn with_device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Set the response bytes of a property
    pub fn with_property(
        mut self,
        device: &Device,
        epc: PropertyCode,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        self.responses.insert(
            (device.address.clone(), device.class, epc),
            Ok(data.into()),
        );
        self
    }

    /// Make a property fetch fail
    pub fn with_failure(mut self, device: &Device, epc: PropertyCode, error: TransportError) -> Self {
        self.responses
            .insert((device.address.clone(), device.class, epc), Err(error));
        self
    }

    /// Add a device if it is not already in the discovery feed
    pub fn insert_device(&mut self, device: Device) {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }
    }

    /// Set a response in place
    pub fn insert_response(
        &mut self,
        device: &Device,
        epc: PropertyCode,
        response: Result<Vec<u8>, TransportError>,
    ) {
        self.responses
            .insert((device.address.clone(), device.class, epc), response);
    }

    /// Devices in the discovery feed
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of fetches issued for one property of one address
    pub fn fetch_count(&self, address: &str, epc: PropertyCode) -> usize {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(a, e)| a == address && *e == epc)
            .count()
    }

    /// Whether the transport has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Total number of fetches issued
    pub fn total_fetches(&self) -> usize {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl DeviceTransport for StaticTransport {
    fn discover(&self) -> BoxStream<'_, Device> {
        if self.is_closed() {
            return stream::empty().boxed();
        }
        stream::iter(self.devices.iter().cloned()).boxed()
    }

    async fn fetch_property(
        &self,
        address: &str,
        class: ClassCode,
        epc: PropertyCode,
    ) -> Result<Vec<u8>, TransportError> {
        self.fetch_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((address.to_string(), epc));

        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        if !self
            .devices
            .iter()
            .any(|d| d.address == address && d.class == class)
        {
            return Err(TransportError::Unreachable(address.to_string()));
        }

        match self.responses.get(&(address.to_string(), class, epc)) {
            Some(response) => response.clone(),
            None => Err(TransportError::PropertyUnavailable {
                address: address.to_string(),
                epc,
            }),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

//! # Device Discovery
//!
//! Finding nearby Bluetooth printers.
//!
//! ## Available Sources
//!
//! - [`bluetoothctl`]: BlueZ via the `bluetoothctl` CLI (Linux)
//!
//! ## Sessions
//!
//! Each call to `scan()` opens a new discovery session in the
//! [`DeviceRegistry`]. Results are keyed by address, so a device reported
//! twice is updated in place. Once a session is stopped or superseded, late
//! results for it are dropped without error.
//!
//! Pairing status is advisory. An unpaired device can still be selected.

pub mod bluetoothctl;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use bluetoothctl::BluetoothctlDiscovery;

/// Discovery failure (adapter missing, disabled, or tool unavailable)
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct DiscoveryError(pub String);

/// A device seen during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Advertised name, if the device reported one
    pub name: Option<String>,
    /// Hardware address (MAC)
    pub address: String,
    /// Whether the platform has a pairing bond for this device
    #[serde(default)]
    pub bonded: bool,
    /// Signal strength, when the source reports it
    #[serde(default)]
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
            bonded: false,
            rssi: None,
        }
    }

    /// Name for lists; nameless devices show the tail of their address.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                let tail_start = self.address.len().saturating_sub(5);
                let tail = self.address.get(tail_start..).unwrap_or(&self.address);
                format!("Unknown device ({})", tail)
            }
        }
    }

    pub fn looks_like_printer(&self) -> bool {
        self.name.as_deref().is_some_and(looks_like_printer)
    }
}

/// Name heuristic for printer-like devices. Advisory only, never a filter.
pub fn looks_like_printer(name: &str) -> bool {
    const HINTS: &[&str] = &["print", "pos", "thermal", "epson", "star", "zebra"];
    let name = name.to_lowercase();
    HINTS.iter().any(|hint| name.contains(hint))
}

/// Yields discovered devices and pairing status.
#[async_trait]
pub trait BluetoothDiscoverySource: Send + Sync {
    /// Start a discovery session.
    ///
    /// The stream is finite; call `scan()` again to restart.
    async fn scan(&self) -> Result<BoxStream<'static, DiscoveredDevice>, DiscoveryError>;

    /// Stop discovery. Best-effort; results may still arrive afterwards.
    async fn stop(&self);

    /// Whether the platform has a pairing bond with this address.
    async fn is_bonded(&self, address: &str) -> bool;
}

// ============================================================================
// DEVICE REGISTRY
// ============================================================================

/// Identifier of one discovery session.
pub type SessionId = u64;

/// What happened to an ingested device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    Added,
    Updated,
    /// Session stopped or superseded
    Ignored,
}

/// Address-keyed set of devices from the current discovery session.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    session: SessionId,
    scanning: bool,
    devices: Vec<DiscoveredDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new session, discarding results of the previous one.
    pub fn begin(&mut self) -> SessionId {
        self.session += 1;
        self.scanning = true;
        self.devices.clear();
        self.session
    }

    /// Close the current session. Later results for it are ignored.
    pub fn stop(&mut self) {
        self.scanning = false;
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Whether results for `session` are still accepted.
    pub fn accepts(&self, session: SessionId) -> bool {
        self.scanning && session == self.session
    }

    /// Merge a discovery result, keyed by address.
    pub fn ingest(&mut self, session: SessionId, device: DiscoveredDevice) -> Ingest {
        if !self.accepts(session) {
            return Ingest::Ignored;
        }

        let existing = self
            .devices
            .iter_mut()
            .find(|d| d.address.eq_ignore_ascii_case(&device.address));

        match existing {
            Some(known) => {
                if device.name.is_some() {
                    known.name = device.name;
                }
                if device.rssi.is_some() {
                    known.rssi = device.rssi;
                }
                known.bonded = device.bonded;
                Ingest::Updated
            }
            None => {
                self.devices.push(device);
                Ingest::Added
            }
        }
    }

    pub fn get(&self, address: &str) -> Option<&DiscoveredDevice> {
        self.devices
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Devices for display: bonded first, then by display name.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        let mut devices = self.devices.clone();
        devices.sort_by(|a, b| {
            b.bonded
                .cmp(&a.bonded)
                .then_with(|| a.display_name().cmp(&b.display_name()))
        });
        devices
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device(name: Option<&str>, address: &str, bonded: bool) -> DiscoveredDevice {
        DiscoveredDevice {
            bonded,
            ..DiscoveredDevice::new(name, address)
        }
    }

    #[test]
    fn test_duplicates_update_in_place() {
        let mut registry = DeviceRegistry::new();
        let session = registry.begin();

        assert_eq!(
            registry.ingest(session, device(None, "00:11:62:AA:BB:CC", false)),
            Ingest::Added
        );
        assert_eq!(
            registry.ingest(session, device(Some("TSP650II"), "00:11:62:aa:bb:cc", true)),
            Ingest::Updated
        );

        assert_eq!(registry.len(), 1);
        let known = registry.get("00:11:62:AA:BB:CC").unwrap();
        assert_eq!(known.name.as_deref(), Some("TSP650II"));
        assert!(known.bonded);
    }

    #[test]
    fn test_update_keeps_known_name() {
        let mut registry = DeviceRegistry::new();
        let session = registry.begin();
        registry.ingest(session, device(Some("Kitchen"), "AA:AA:AA:AA:AA:AA", false));
        registry.ingest(session, device(None, "AA:AA:AA:AA:AA:AA", false));
        assert_eq!(
            registry.get("AA:AA:AA:AA:AA:AA").unwrap().name.as_deref(),
            Some("Kitchen")
        );
    }

    #[test]
    fn test_results_after_stop_are_ignored() {
        let mut registry = DeviceRegistry::new();
        let session = registry.begin();
        registry.stop();
        assert_eq!(
            registry.ingest(session, device(None, "AA:AA:AA:AA:AA:AA", false)),
            Ingest::Ignored
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_session_is_ignored() {
        let mut registry = DeviceRegistry::new();
        let old = registry.begin();
        let new = registry.begin();
        assert_eq!(
            registry.ingest(old, device(None, "AA:AA:AA:AA:AA:AA", false)),
            Ingest::Ignored
        );
        assert_eq!(
            registry.ingest(new, device(None, "AA:AA:AA:AA:AA:AA", false)),
            Ingest::Added
        );
    }

    #[test]
    fn test_snapshot_order() {
        let mut registry = DeviceRegistry::new();
        let session = registry.begin();
        registry.ingest(session, device(Some("Zebra"), "00:00:00:00:00:01", false));
        registry.ingest(session, device(Some("Beta"), "00:00:00:00:00:02", true));
        registry.ingest(session, device(Some("Alpha"), "00:00:00:00:00:03", false));

        let names: Vec<String> = registry.snapshot().iter().map(|d| d.display_name()).collect();
        assert_eq!(names, vec!["Beta", "Alpha", "Zebra"]);
    }

    #[test]
    fn test_unknown_device_name() {
        let nameless = device(None, "00:11:62:AA:BB:CC", false);
        assert_eq!(nameless.display_name(), "Unknown device (BB:CC)");
        let blank = device(Some("  "), "00:11:62:AA:BB:CC", false);
        assert_eq!(blank.display_name(), "Unknown device (BB:CC)");
    }

    #[test]
    fn test_looks_like_printer() {
        assert!(looks_like_printer("Star TSP650II"));
        assert!(looks_like_printer("MTP-II POS"));
        assert!(looks_like_printer("ThermalPrinter"));
        assert!(!looks_like_printer("Pixel Buds"));
    }
}

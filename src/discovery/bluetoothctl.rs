//! # BlueZ Discovery
//!
//! Discovery through the `bluetoothctl` command-line tool shipped with BlueZ.
//!
//! ```bash
//! # What scan() runs
//! $ bluetoothctl --timeout 8 scan on
//! $ bluetoothctl devices
//! Device 00:11:62:AA:BB:CC Star Micronics
//!
//! # What is_bonded() runs
//! $ bluetoothctl info 00:11:62:AA:BB:CC
//!     Paired: yes
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{BluetoothDiscoverySource, DiscoveredDevice, DiscoveryError};

/// Default scan window
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(8);

/// BlueZ-backed discovery source.
pub struct BluetoothctlDiscovery {
    program: String,
    timeout: Duration,
}

impl BluetoothctlDiscovery {
    pub fn new() -> Self {
        Self {
            program: "bluetoothctl".to_string(),
            timeout: DEFAULT_SCAN_TIMEOUT,
        }
    }

    /// Set how long each scan listens before listing devices.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, DiscoveryError> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| DiscoveryError(format!("Failed to run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoveryError(format!(
                "{} {} failed: {}",
                self.program,
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for BluetoothctlDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BluetoothDiscoverySource for BluetoothctlDiscovery {
    async fn scan(&self) -> Result<BoxStream<'static, DiscoveredDevice>, DiscoveryError> {
        let secs = self.timeout.as_secs().max(1).to_string();
        debug!(timeout_secs = %secs, "Starting bluetoothctl scan");

        // The scan itself only populates BlueZ's device cache; exit status is
        // non-zero when the timeout ends it, so it is not checked.
        let _ = Command::new(&self.program)
            .args(["--timeout", secs.as_str(), "scan", "on"])
            .output()
            .await
            .map_err(|e| DiscoveryError(format!("Failed to run {}: {}", self.program, e)))?;

        let listing = self.run(&["devices"]).await?;
        let paired = self.run(&["devices", "Paired"]).await.unwrap_or_default();
        let paired: Vec<String> = parse_devices(&paired)
            .into_iter()
            .map(|d| d.address.to_uppercase())
            .collect();

        let devices: Vec<DiscoveredDevice> = parse_devices(&listing)
            .into_iter()
            .map(|mut d| {
                d.bonded = paired.contains(&d.address.to_uppercase());
                d
            })
            .collect();

        debug!(count = devices.len(), "bluetoothctl listed devices");
        Ok(stream::iter(devices).boxed())
    }

    async fn stop(&self) {
        if let Err(e) = self.run(&["scan", "off"]).await {
            warn!(error = %e, "Failed to stop bluetoothctl scan");
        }
    }

    async fn is_bonded(&self, address: &str) -> bool {
        match self.run(&["info", address]).await {
            Ok(info) => parse_paired(&info),
            Err(e) => {
                debug!(address, error = %e, "Pairing query failed");
                false
            }
        }
    }
}

/// Parse `Device <MAC> <name>` lines.
fn parse_devices(output: &str) -> Vec<DiscoveredDevice> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.trim().strip_prefix("Device ")?;
            let (address, name) = match rest.split_once(' ') {
                Some((address, name)) => (address, Some(name.trim())),
                None => (rest, None),
            };
            if !crate::driver::rfcomm::is_valid_mac(address) {
                return None;
            }
            // BlueZ echoes the address as the name for nameless devices
            let name = name.filter(|n| !n.is_empty() && n.replace('-', ":") != address);
            Some(DiscoveredDevice::new(name, address))
        })
        .collect()
}

/// Find `Paired: yes` in `bluetoothctl info` output.
fn parse_paired(info: &str) -> bool {
    info.lines().any(|line| {
        line.trim()
            .strip_prefix("Paired:")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("yes"))
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_devices() {
        let output = "\
Device 00:11:62:AA:BB:CC Star Micronics
Device 66:77:88:99:AA:BB 66-77-88-99-AA-BB
[CHG] Controller 11:22:33:44:55:66 Discovering: yes
Device not-a-mac Whatever
Device DC:0D:30:12:34:56
";
        let devices = parse_devices(output);
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].name.as_deref(), Some("Star Micronics"));
        assert_eq!(devices[0].address, "00:11:62:AA:BB:CC");
        assert_eq!(devices[1].name, None);
        assert_eq!(devices[2].name, None);
        assert!(devices.iter().all(|d| !d.bonded));
    }

    #[test]
    fn test_parse_paired() {
        let info = "Device 00:11:62:AA:BB:CC (public)\n\tName: Star\n\tPaired: yes\n\tTrusted: no\n";
        assert!(parse_paired(info));
        assert!(!parse_paired("\tPaired: no\n"));
        assert!(!parse_paired(""));
    }
}

//! # Printer Fleet Manager
//!
//! Single source of truth for the configured printers. The manager owns the
//! in-memory fleet, is the only writer of the store's printer table, and
//! drives discovery, setup flows and the driver connection.
//!
//! ## Guarantees
//!
//! - At most one printer is marked default after any operation settles.
//!   Promoting one printer demotes every other in a single batch write.
//! - The in-memory fleet changes only after the store accepted the write.
//! - Only one mutating operation per printer runs at a time; a second one
//!   is rejected, never queued.
//! - At most one driver connection is open across the whole fleet.
//! - A deleted printer's connection is closed before its record is removed.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetprint::discovery::BluetoothctlDiscovery;
//! use fleetprint::driver::RfcommDriver;
//! use fleetprint::fleet::{PrinterFleetManager, SetupEvent, SetupIntent};
//! use fleetprint::store::JsonFileStore;
//!
//! # async fn demo() -> fleetprint::FleetResult<()> {
//! let manager = PrinterFleetManager::new(
//!     Arc::new(JsonFileStore::new("fleetprint.json")),
//!     Arc::new(BluetoothctlDiscovery::new()),
//!     Arc::new(RfcommDriver::default()),
//! );
//! manager.load().await?;
//!
//! let mut flow = manager.begin_setup(SetupIntent::NewManual).await?;
//! if let Some(device) = manager.discovered_devices().into_iter().next() {
//!     manager.dispatch(&mut flow, SetupEvent::DeviceSelected(device)).await?;
//!     manager.dispatch(&mut flow, SetupEvent::Save).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod setup;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Local;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::discovery::{BluetoothDiscoverySource, DeviceRegistry, DiscoveredDevice, Ingest};
use crate::driver::{PrintJob, PrinterDriver};
use crate::error::{FleetError, FleetResult};
use crate::model::{PrinterBrand, PrinterConfig, PrinterId};
use crate::store::ConfigStore;

use connection::{InFlight, lock};

pub use connection::{ConnectionState, Operation};
pub use setup::{DraftEdit, SetupEvent, SetupFlow, SetupIntent, SetupState, Step};

/// Tuning knobs for [`PrinterFleetManager`].
#[derive(Debug, Clone)]
pub struct FleetOptions {
    /// The first printer saved into an empty fleet becomes the default.
    pub first_printer_becomes_default: bool,
    /// Footer line printed at the bottom of test pages (empty for none)
    pub test_page_footer: String,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            first_printer_becomes_default: true,
            test_page_footer: "If you can read this, printing works.".to_string(),
        }
    }
}

/// Owns the printer fleet and its lifecycle.
pub struct PrinterFleetManager {
    store: Arc<dyn ConfigStore>,
    discovery: Arc<dyn BluetoothDiscoverySource>,
    driver: Arc<dyn PrinterDriver>,
    options: FleetOptions,

    fleet: RwLock<Vec<PrinterConfig>>,
    devices: Mutex<DeviceRegistry>,
    connections: Mutex<HashMap<PrinterId, ConnectionState>>,
    /// Printer whose connection the driver currently holds
    active: Mutex<Option<PrinterId>>,
    /// Serializes driver access; lock before `fleet` when both are needed
    lane: tokio::sync::Mutex<()>,
    in_flight: InFlight,
}

impl PrinterFleetManager {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        discovery: Arc<dyn BluetoothDiscoverySource>,
        driver: Arc<dyn PrinterDriver>,
    ) -> Self {
        Self::with_options(store, discovery, driver, FleetOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn ConfigStore>,
        discovery: Arc<dyn BluetoothDiscoverySource>,
        driver: Arc<dyn PrinterDriver>,
        options: FleetOptions,
    ) -> Self {
        Self {
            store,
            discovery,
            driver,
            options,
            fleet: RwLock::new(Vec::new()),
            devices: Mutex::new(DeviceRegistry::new()),
            connections: Mutex::new(HashMap::new()),
            active: Mutex::new(None),
            lane: tokio::sync::Mutex::new(()),
            in_flight: InFlight::default(),
        }
    }

    pub fn options(&self) -> &FleetOptions {
        &self.options
    }

    /// Load the fleet from the store, replacing the in-memory copy.
    ///
    /// If the store holds several defaults, only the first keeps the flag
    /// and the demotions are written back.
    pub async fn load(&self) -> FleetResult<usize> {
        let mut printers = self.store.list_printers().await?;

        let mut demoted = Vec::new();
        let mut seen_default = false;
        for printer in printers.iter_mut().filter(|p| p.is_default) {
            if seen_default {
                printer.is_default = false;
                demoted.push(printer.clone());
            }
            seen_default = true;
        }
        if !demoted.is_empty() {
            warn!(count = demoted.len(), "Store held several default printers; demoting extras");
            self.store.upsert_printers(&demoted).await?;
        }

        let count = printers.len();
        *self.fleet.write().await = printers;
        info!(count, "Fleet loaded");
        Ok(count)
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub async fn printers(&self) -> Vec<PrinterConfig> {
        self.fleet.read().await.clone()
    }

    pub async fn get(&self, id: PrinterId) -> FleetResult<PrinterConfig> {
        self.fleet
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    pub async fn default_printer(&self) -> Option<PrinterConfig> {
        self.fleet.read().await.iter().find(|p| p.is_default).cloned()
    }

    /// The default printer, if it is set to print unattended.
    pub async fn auto_print_printer(&self) -> Option<PrinterConfig> {
        self.default_printer().await.filter(|p| p.is_auto_print)
    }

    pub fn connection_state(&self, id: PrinterId) -> ConnectionState {
        lock(&self.connections).get(&id).cloned().unwrap_or_default()
    }

    /// Printer holding the open driver connection.
    pub fn active_printer(&self) -> Option<PrinterId> {
        *lock(&self.active)
    }

    /// Mutating operation currently running on a printer, if any.
    pub fn operation_in_flight(&self, id: PrinterId) -> Option<Operation> {
        self.in_flight.current(id)
    }

    fn set_state(&self, id: PrinterId, state: ConnectionState) {
        debug!(printer_id = %id, state = %state, "Connection state");
        lock(&self.connections).insert(id, state);
    }

    // ========================================================================
    // DISCOVERY
    // ========================================================================

    /// Run one discovery session to completion and return what it found.
    ///
    /// Restarting discards the previous session's results. Devices that
    /// arrive after [`stop_scan`](Self::stop_scan) are dropped.
    pub async fn scan(&self) -> FleetResult<Vec<DiscoveredDevice>> {
        let session = lock(&self.devices).begin();
        info!(session, "Discovery started");

        let mut stream = match self.discovery.scan().await {
            Ok(stream) => stream,
            Err(e) => {
                lock(&self.devices).stop();
                warn!(error = %e, "Discovery failed");
                return Err(e.into());
            }
        };

        while let Some(mut device) = stream.next().await {
            if !lock(&self.devices).accepts(session) {
                debug!(session, "Discovery session closed; dropping late results");
                break;
            }
            if !device.bonded {
                device.bonded = self.discovery.is_bonded(&device.address).await;
            }
            let address = device.address.clone();
            match lock(&self.devices).ingest(session, device) {
                Ingest::Added => debug!(address = %address, "Device found"),
                Ingest::Updated => debug!(address = %address, "Device updated"),
                Ingest::Ignored => break,
            }
        }

        let mut registry = lock(&self.devices);
        if registry.accepts(session) {
            registry.stop();
        }
        info!(session, count = registry.len(), "Discovery finished");
        Ok(registry.snapshot())
    }

    /// Stop the running discovery session. Best-effort.
    pub async fn stop_scan(&self) {
        lock(&self.devices).stop();
        self.discovery.stop().await;
        info!("Discovery stopped");
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.devices).is_scanning()
    }

    /// Devices of the latest session, bonded first.
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        lock(&self.devices).snapshot()
    }

    // ========================================================================
    // SETUP FLOWS
    // ========================================================================

    /// Open a setup flow.
    ///
    /// `NewManual` starts a discovery run. A discovery failure does not fail
    /// the flow; it is reported through [`SetupFlow::scan_error`] and the
    /// address can still be entered by hand.
    pub async fn begin_setup(&self, intent: SetupIntent) -> FleetResult<SetupFlow> {
        match intent {
            SetupIntent::NewFromDevice(device) => {
                info!(address = %device.address, "Setup started from discovered device");
                Ok(SetupFlow::from_device(&device))
            }
            SetupIntent::NewManual => {
                info!("Setup started");
                let mut flow = SetupFlow::manual();
                if let Err(e) = self.scan().await {
                    flow.set_scan_error(Some(e.to_string()));
                }
                Ok(flow)
            }
            SetupIntent::EditExisting(id) => {
                let config = self.get(id).await?;
                info!(printer_id = %id, "Editing printer");
                Ok(SetupFlow::editing(config))
            }
        }
    }

    /// Re-run discovery for a flow that is still selecting a device.
    pub async fn rescan(&self, flow: &mut SetupFlow) -> FleetResult<Vec<DiscoveredDevice>> {
        if flow.state() != SetupState::SelectingDevice {
            return Err(FleetError::InvalidTransition {
                state: flow.state().label(),
                event: "scan for devices",
            });
        }
        let result = self.scan().await;
        flow.set_scan_error(result.as_ref().err().map(ToString::to_string));
        result
    }

    /// Feed one event into a setup flow, persisting on `Save`.
    ///
    /// When saving fails the flow stays in `Configuring`.
    pub async fn dispatch(&self, flow: &mut SetupFlow, event: SetupEvent) -> FleetResult<SetupState> {
        if let SetupEvent::DeviceSelected(device) = &event {
            info!(address = %device.address, "Device selected");
        }
        match flow.handle(event)? {
            Step::State(state) => Ok(state),
            Step::Commit(draft) => {
                let keep_stored_default = !flow.is_new() && flow.default_choice().is_none();
                let saved = self.persist(draft, keep_stored_default).await?;
                flow.mark_saved(saved);
                Ok(flow.state())
            }
        }
    }

    // ========================================================================
    // FLEET MUTATIONS
    // ========================================================================

    /// Validate and persist a printer, new or existing.
    ///
    /// Saving with `is_default` demotes every other printer in the same
    /// write. The default printer cannot clear its own flag; another printer
    /// has to be promoted instead. Returns the config as stored.
    pub async fn save(&self, config: PrinterConfig) -> FleetResult<PrinterConfig> {
        self.persist(config, false).await
    }

    /// `save`, optionally keeping the stored default flag of an existing
    /// printer over the one in `config`.
    async fn persist(
        &self,
        config: PrinterConfig,
        keep_stored_default: bool,
    ) -> FleetResult<PrinterConfig> {
        config.validate()?;
        let _guard = self.in_flight.begin(config.id, Operation::Save)?;

        let mut fleet = self.fleet.write().await;
        let mut config = config;

        match fleet.iter().find(|p| p.id == config.id) {
            Some(existing) => {
                if existing.address != config.address {
                    return Err(FleetError::validation(
                        "address",
                        "cannot be changed after creation",
                    ));
                }
                if config.brand == PrinterBrand::Unknown {
                    config.brand = existing.brand;
                }
                if keep_stored_default {
                    config.is_default = existing.is_default;
                }
                if existing.is_default && !config.is_default {
                    return Err(FleetError::validation(
                        "is_default",
                        "make another printer the default instead",
                    ));
                }
            }
            None => {
                if fleet.is_empty() && self.options.first_printer_becomes_default {
                    config.is_default = true;
                }
            }
        }

        let (next, changed) = with_upsert(&fleet, config.clone());
        self.store.upsert_printers(&changed).await?;
        *fleet = next;

        info!(
            printer_id = %config.id,
            name = %config.name,
            is_default = config.is_default,
            demoted = changed.len() - 1,
            "Printer saved"
        );
        Ok(config)
    }

    /// Make one printer the default, demoting all others atomically.
    pub async fn set_default(&self, id: PrinterId) -> FleetResult<()> {
        let _guard = self.in_flight.begin(id, Operation::SetDefault)?;
        let mut fleet = self.fleet.write().await;

        let target = fleet
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))?;

        let (next, changed) = with_upsert(
            &fleet,
            PrinterConfig {
                is_default: true,
                ..target
            },
        );
        if changed.len() == 1 && fleet.iter().any(|p| p.id == id && p.is_default) {
            debug!(printer_id = %id, "Already the default printer");
            return Ok(());
        }

        self.store.upsert_printers(&changed).await?;
        *fleet = next;
        info!(printer_id = %id, demoted = changed.len() - 1, "Default printer changed");
        Ok(())
    }

    /// Remove a printer, closing its connection first if it holds one.
    pub async fn delete(&self, id: PrinterId) -> FleetResult<()> {
        let _guard = self.in_flight.begin(id, Operation::Delete)?;
        let _lane = self.lane.lock().await;
        let mut fleet = self.fleet.write().await;

        let position = fleet
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| not_found(id))?;

        if self.active_printer() == Some(id) {
            info!(printer_id = %id, "Closing connection of deleted printer");
            self.driver.close().await;
            *lock(&self.active) = None;
            self.set_state(id, ConnectionState::Disconnected);
        }

        self.store.delete_printer(id).await?;
        let removed = fleet.remove(position);
        lock(&self.connections).remove(&id);

        if removed.is_default {
            info!(printer_id = %id, "Default printer deleted; no default is set");
        } else {
            info!(printer_id = %id, "Printer deleted");
        }
        Ok(())
    }

    // ========================================================================
    // CONNECTION LIFECYCLE
    // ========================================================================

    /// Open the driver connection to a printer.
    ///
    /// Any other open connection is closed first. On success the detected
    /// brand is stored on the config. Failures are not retried.
    pub async fn connect(&self, id: PrinterId) -> FleetResult<PrinterBrand> {
        let _guard = self.in_flight.begin(id, Operation::Connect)?;
        let config = self.get(id).await?;
        let _lane = self.lane.lock().await;

        self.close_active().await;
        self.set_state(id, ConnectionState::Connecting);
        info!(printer_id = %id, address = %config.address, "Connecting");

        let brand = match self.driver.open(&config.address).await {
            Ok(brand) => brand,
            Err(e) => {
                let cause = e.to_string();
                warn!(printer_id = %id, error = %cause, "Connect failed");
                self.set_state(id, ConnectionState::Error { cause: cause.clone() });
                return Err(FleetError::Connection(cause));
            }
        };

        if let Err(e) = self.record_brand(id, brand).await {
            self.driver.close().await;
            self.set_state(id, ConnectionState::Disconnected);
            return Err(e);
        }

        *lock(&self.active) = Some(id);
        self.set_state(id, ConnectionState::Connected { brand });
        info!(printer_id = %id, brand = %brand, "Connected");
        Ok(brand)
    }

    /// Close a printer's connection. Idempotent.
    pub async fn disconnect(&self, id: PrinterId) -> FleetResult<()> {
        let _guard = self.in_flight.begin(id, Operation::Disconnect)?;
        let _lane = self.lane.lock().await;

        if self.active_printer() == Some(id) {
            self.driver.close().await;
            *lock(&self.active) = None;
            info!(printer_id = %id, "Disconnected");
        }
        self.set_state(id, ConnectionState::Disconnected);
        Ok(())
    }

    /// Run a job on a connected printer.
    ///
    /// A driver failure is returned to the caller; the connection stays
    /// open and the printer returns to `Connected`.
    pub async fn print(&self, id: PrinterId, job: PrintJob) -> FleetResult<()> {
        let _guard = self.in_flight.begin(id, Operation::Print)?;
        let _lane = self.lane.lock().await;

        let brand = match self.connection_state(id) {
            ConnectionState::Connected { brand } if self.active_printer() == Some(id) => brand,
            _ => return Err(FleetError::NotConnected { id: id.to_string() }),
        };

        self.set_state(id, ConnectionState::Printing);
        info!(printer_id = %id, title = %job.title, copies = job.copies, "Printing");
        let result = self.driver.print(&job).await;
        self.set_state(id, ConnectionState::Connected { brand });

        result.map_err(|e| {
            warn!(printer_id = %id, error = %e, "Print failed");
            FleetError::Connection(e.to_string())
        })
    }

    /// Print a test page on a connected printer.
    pub async fn test_print(&self, id: PrinterId) -> FleetResult<()> {
        let config = self.get(id).await?;
        let job = PrintJob::test_page(&config, &self.options.test_page_footer, Local::now());
        self.print(id, job).await
    }

    /// Close whatever connection is open. Caller holds the lane.
    async fn close_active(&self) {
        let previous = lock(&self.active).take();
        if let Some(previous) = previous {
            self.driver.close().await;
            self.set_state(previous, ConnectionState::Disconnected);
            debug!(printer_id = %previous, "Closed previous connection");
        }
    }

    async fn record_brand(&self, id: PrinterId, brand: PrinterBrand) -> FleetResult<()> {
        let mut fleet = self.fleet.write().await;
        let Some(position) = fleet.iter().position(|p| p.id == id) else {
            return Err(not_found(id));
        };
        if fleet[position].brand == brand {
            return Ok(());
        }

        let mut updated = fleet[position].clone();
        updated.brand = brand;
        self.store.upsert_printer(&updated).await?;
        fleet[position] = updated;
        Ok(())
    }
}

fn not_found(id: PrinterId) -> FleetError {
    FleetError::NotFound(format!("printer {}", id))
}

/// Insert or replace `config`, demoting other defaults when it is one.
///
/// Returns the next fleet and the records that changed, `config` first.
fn with_upsert(
    fleet: &[PrinterConfig],
    config: PrinterConfig,
) -> (Vec<PrinterConfig>, Vec<PrinterConfig>) {
    let mut next = fleet.to_vec();
    let mut changed = vec![config.clone()];

    if config.is_default {
        for other in next.iter_mut().filter(|p| p.id != config.id && p.is_default) {
            other.is_default = false;
            changed.push(other.clone());
        }
    }

    match next.iter_mut().find(|p| p.id == config.id) {
        Some(existing) => *existing = config,
        None => next.push(config),
    }
    (next, changed)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn printer(name: &str, is_default: bool) -> PrinterConfig {
        PrinterConfig {
            is_default,
            ..PrinterConfig::new(name, "00:11:62:00:00:01")
        }
    }

    fn defaults(fleet: &[PrinterConfig]) -> Vec<&str> {
        fleet
            .iter()
            .filter(|p| p.is_default)
            .map(|p| p.name.as_str())
            .collect()
    }

    #[test]
    fn test_upsert_default_demotes_others() {
        let fleet = vec![printer("A", true), printer("B", false)];
        let promoted = PrinterConfig {
            is_default: true,
            ..fleet[1].clone()
        };

        let (next, changed) = with_upsert(&fleet, promoted);
        assert_eq!(defaults(&next), vec!["B"]);
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].name, "B");
        assert!(!changed[1].is_default);
        // Input untouched
        assert_eq!(defaults(&fleet), vec!["A"]);
    }

    #[test]
    fn test_upsert_non_default_touches_one_record() {
        let fleet = vec![printer("A", true)];
        let (next, changed) = with_upsert(&fleet, printer("B", false));
        assert_eq!(next.len(), 2);
        assert_eq!(changed.len(), 1);
        assert_eq!(defaults(&next), vec!["A"]);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let fleet = vec![printer("A", false), printer("B", false)];
        let renamed = PrinterConfig {
            name: "A2".to_string(),
            ..fleet[0].clone()
        };
        let (next, _) = with_upsert(&fleet, renamed);
        let names: Vec<&str> = next.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A2", "B"]);
    }

    #[test]
    fn test_default_options() {
        let options = FleetOptions::default();
        assert!(options.first_printer_becomes_default);
        assert!(!options.test_page_footer.is_empty());
    }
}

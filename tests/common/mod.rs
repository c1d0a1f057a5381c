//! Scripted collaborators for the scenario tests.
//!
//! Every fake appends to a shared [`Journal`] so tests can assert the order
//! in which the manager talks to its collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{Notify, mpsc};

use fleetprint::discovery::{BluetoothDiscoverySource, DiscoveredDevice, DiscoveryError};
use fleetprint::driver::{DriverError, PrintJob, PrinterDriver};
use fleetprint::fleet::PrinterFleetManager;
use fleetprint::model::{PrinterBrand, PrinterConfig, PrinterId, TemplateConfig};
use fleetprint::store::{ConfigStore, MemoryStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Memory store that records calls and can be told to fail writes.
pub struct RecordingStore {
    inner: MemoryStore,
    journal: Journal,
    fail_writes: AtomicBool,
    fail_template_ids: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            inner: MemoryStore::new(),
            journal,
            fail_writes: AtomicBool::new(false),
            fail_template_ids: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail writes to these template ids only.
    pub fn fail_templates(&self, ids: &[&str]) {
        *self.fail_template_ids.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk is read-only".to_string()));
        }
        Ok(())
    }

    fn check_template(&self, id: &str) -> Result<(), StoreError> {
        self.check()?;
        if self.fail_template_ids.lock().unwrap().iter().any(|f| f == id) {
            return Err(StoreError::Unavailable(format!("cannot write {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for RecordingStore {
    async fn list_printers(&self) -> Result<Vec<PrinterConfig>, StoreError> {
        self.inner.list_printers().await
    }

    async fn upsert_printer(&self, printer: &PrinterConfig) -> Result<(), StoreError> {
        self.journal.record(format!("store.upsert_printer {}", printer.name));
        self.check()?;
        self.inner.upsert_printer(printer).await
    }

    async fn upsert_printers(&self, printers: &[PrinterConfig]) -> Result<(), StoreError> {
        self.journal
            .record(format!("store.upsert_printers {}", printers.len()));
        self.check()?;
        self.inner.upsert_printers(printers).await
    }

    async fn delete_printer(&self, id: PrinterId) -> Result<(), StoreError> {
        self.journal.record("store.delete_printer");
        self.check()?;
        self.inner.delete_printer(id).await
    }

    async fn list_templates(&self) -> Result<Vec<TemplateConfig>, StoreError> {
        self.inner.list_templates().await
    }

    async fn upsert_template(&self, template: &TemplateConfig) -> Result<(), StoreError> {
        self.journal
            .record(format!("store.upsert_template {}", template.template_id));
        self.check_template(&template.template_id)?;
        self.inner.upsert_template(template).await
    }

    async fn delete_template(&self, id: &str) -> Result<(), StoreError> {
        self.journal.record(format!("store.delete_template {}", id));
        self.check_template(id)?;
        self.inner.delete_template(id).await
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Driver that records calls, can fail on demand, and can hold `open`
/// until released.
pub struct FakeDriver {
    journal: Journal,
    brand: PrinterBrand,
    hold_open: AtomicBool,
    release: Notify,
    fail_open: AtomicBool,
    fail_print: AtomicBool,
    printed: Mutex<Vec<PrintJob>>,
}

impl FakeDriver {
    pub fn new(journal: Journal, brand: PrinterBrand) -> Self {
        Self {
            journal,
            brand,
            hold_open: AtomicBool::new(false),
            release: Notify::new(),
            fail_open: AtomicBool::new(false),
            fail_print: AtomicBool::new(false),
            printed: Mutex::new(Vec::new()),
        }
    }

    pub fn hold_open(&self, hold: bool) {
        self.hold_open.store(hold, Ordering::SeqCst);
    }

    pub fn release_open(&self) {
        self.release.notify_one();
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn fail_print(&self, fail: bool) {
        self.fail_print.store(fail, Ordering::SeqCst);
    }

    pub fn printed(&self) -> Vec<PrintJob> {
        self.printed.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrinterDriver for FakeDriver {
    async fn open(&self, address: &str) -> Result<PrinterBrand, DriverError> {
        self.journal.record(format!("driver.open {}", address));
        if self.hold_open.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DriverError::Unreachable {
                address: address.to_string(),
                reason: "Host is down".to_string(),
            });
        }
        Ok(self.brand)
    }

    async fn close(&self) {
        self.journal.record("driver.close");
    }

    async fn print(&self, job: &PrintJob) -> Result<(), DriverError> {
        self.journal.record(format!("driver.print {}", job.title));
        if self.fail_print.load(Ordering::SeqCst) {
            return Err(DriverError::Write("paper out".to_string()));
        }
        self.printed.lock().unwrap().push(job.clone());
        Ok(())
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// Discovery fed by the test through a channel.
pub struct FakeDiscovery {
    journal: Journal,
    scripted: Mutex<Vec<DiscoveredDevice>>,
    live: Mutex<Option<mpsc::UnboundedReceiver<DiscoveredDevice>>>,
    bonded: Vec<String>,
    fail: AtomicBool,
}

impl FakeDiscovery {
    /// Each scan yields `devices` and ends.
    pub fn scripted(journal: Journal, devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            journal,
            scripted: Mutex::new(devices),
            live: Mutex::new(None),
            bonded: Vec::new(),
            fail: AtomicBool::new(false),
        }
    }

    /// The next scan yields whatever the returned sender delivers, until
    /// the sender is dropped.
    pub fn live(journal: Journal) -> (Self, mpsc::UnboundedSender<DiscoveredDevice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let discovery = Self {
            live: Mutex::new(Some(rx)),
            ..Self::scripted(journal, Vec::new())
        };
        (discovery, tx)
    }

    pub fn with_bonded(mut self, addresses: &[&str]) -> Self {
        self.bonded = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BluetoothDiscoverySource for FakeDiscovery {
    async fn scan(&self) -> Result<BoxStream<'static, DiscoveredDevice>, DiscoveryError> {
        self.journal.record("discovery.scan");
        if self.fail.load(Ordering::SeqCst) {
            return Err(DiscoveryError("Bluetooth is off".to_string()));
        }
        if let Some(rx) = self.live.lock().unwrap().take() {
            return Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|device| (device, rx))
            })
            .boxed());
        }
        Ok(stream::iter(self.scripted.lock().unwrap().clone()).boxed())
    }

    async fn stop(&self) {
        self.journal.record("discovery.stop");
    }

    async fn is_bonded(&self, address: &str) -> bool {
        self.bonded.iter().any(|b| b.eq_ignore_ascii_case(address))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

pub struct Harness {
    pub journal: Journal,
    pub store: Arc<RecordingStore>,
    pub driver: Arc<FakeDriver>,
    pub manager: Arc<PrinterFleetManager>,
}

impl Harness {
    pub fn new(discovery: FakeDiscovery) -> Self {
        let journal = discovery.journal.clone();
        let store = Arc::new(RecordingStore::new(journal.clone()));
        let driver = Arc::new(FakeDriver::new(journal.clone(), PrinterBrand::Star));
        let manager = Arc::new(PrinterFleetManager::new(
            store.clone(),
            Arc::new(discovery),
            driver.clone(),
        ));
        Self {
            journal,
            store,
            driver,
            manager,
        }
    }

    pub fn empty() -> Self {
        Self::new(FakeDiscovery::scripted(Journal::default(), Vec::new()))
    }

    /// Save printers through the manager and clear the journal.
    pub async fn with_printers(self, names: &[&str]) -> (Self, Vec<PrinterId>) {
        let mut ids = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let address = format!("00:11:62:00:00:{:02X}", i + 1);
            let saved = self
                .manager
                .save(PrinterConfig::new(*name, address))
                .await
                .unwrap();
            ids.push(saved.id);
        }
        self.journal.clear();
        (self, ids)
    }
}

/// Poll until `check` holds, yielding to other tasks in between.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub fn device(name: Option<&str>, address: &str) -> DiscoveredDevice {
    DiscoveredDevice::new(name, address)
}

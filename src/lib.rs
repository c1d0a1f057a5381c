//! # Fleetprint - Receipt Printer Fleet Library
//!
//! Fleetprint manages the receipt printers of a point-of-sale setup and the
//! templates that decide what a printed receipt shows. It provides:
//!
//! - **Fleet management**: setup flows, default-printer exclusivity and the
//!   connection lifecycle of Bluetooth thermal printers
//! - **Template engine**: parent/child visibility rules for receipt fields
//! - **Persistence**: in-memory and JSON-file stores
//! - **Linux backends**: BlueZ discovery and RFCOMM printing
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetprint::{
//!     discovery::BluetoothctlDiscovery,
//!     driver::RfcommDriver,
//!     fleet::PrinterFleetManager,
//!     model::PrinterConfig,
//!     store::JsonFileStore,
//! };
//!
//! # async fn demo() -> fleetprint::FleetResult<()> {
//! let manager = PrinterFleetManager::new(
//!     Arc::new(JsonFileStore::new("fleetprint.json")),
//!     Arc::new(BluetoothctlDiscovery::new()),
//!     Arc::new(RfcommDriver::default()),
//! );
//! manager.load().await?;
//!
//! let printer = manager
//!     .save(PrinterConfig::new("Front counter", "00:11:62:AA:BB:CC"))
//!     .await?;
//! manager.connect(printer.id).await?;
//! manager.test_print(printer.id).await?;
//! manager.disconnect(printer.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`fleet`] | Printer fleet manager and setup flows |
//! | [`template`] | Template dependency engine and library |
//! | [`model`] | Printer and template records |
//! | [`store`] | Persistence boundary |
//! | [`discovery`] | Bluetooth device discovery |
//! | [`driver`] | Printer connections and print jobs |
//! | [`error`] | Error types |

pub mod discovery;
pub mod driver;
pub mod error;
pub mod fleet;
pub mod model;
pub mod store;
pub mod template;

pub use error::{FleetError, FleetResult};
pub use fleet::{FleetOptions, PrinterFleetManager};
pub use template::{TemplateDependencyEngine, TemplateEdit, TemplateLibrary};

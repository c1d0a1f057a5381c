//! # Data Model
//!
//! Persisted entities shared by the fleet manager and the template engine.
//!
//! ## Modules
//!
//! - [`printer`]: Printer settings
//! - [`template`]: Receipt template field visibility

pub mod printer;
pub mod template;

pub use printer::{PaperWidth, PrinterBrand, PrinterConfig, PrinterId, TransportKind};
pub use template::{Cluster, ClusterState, Field, TemplateConfig, TemplateType};

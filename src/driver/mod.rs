//! # Printer Drivers
//!
//! The boundary to a physical printer: open a connection, run print jobs,
//! close it again. A driver holds at most one open connection.
//!
//! ## Available Drivers
//!
//! - [`rfcomm`]: Bluetooth Serial Port Profile via `/dev/rfcommN` (Linux)

pub mod rfcomm;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;

use crate::model::{PrinterBrand, PrinterConfig};

pub use rfcomm::RfcommDriver;

/// Driver failure
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    /// The device could not be reached or opened
    #[error("cannot reach {address}: {reason}")]
    Unreachable { address: String, reason: String },

    /// Writing to an open connection failed
    #[error("write failed: {0}")]
    Write(String),

    /// `print` without a prior successful `open`
    #[error("no open connection")]
    NotOpen,
}

/// A text print job.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJob {
    pub title: String,
    pub lines: Vec<String>,
    pub copies: u8,
    /// Request a paper cut after each copy
    pub cut: bool,
}

impl PrintJob {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
            copies: 1,
            cut: false,
        }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    /// Test page for a configured printer.
    ///
    /// Lines are centred to the printer's paper width. Printed once; the cut
    /// follows the printer's auto-cut setting.
    pub fn test_page(config: &PrinterConfig, footer: &str, at: DateTime<Local>) -> Self {
        let width = config.paper_width.chars_per_line();
        let rule = "=".repeat(width);
        let center = |s: &str| format!("{:^width$}", s, width = width);

        let mut job = Self::new(format!("Test page: {}", config.display_name()))
            .line(rule.clone())
            .line(center("PRINTER TEST"))
            .line(rule.clone())
            .line(format!("Name:    {}", config.display_name()))
            .line(format!("Address: {}", config.address))
            .line(format!("Paper:   {}", config.paper_width))
            .line(format!("Brand:   {}", config.brand))
            .line(format!("Time:    {}", at.format("%Y-%m-%d %H:%M:%S")))
            .line("-".repeat(width));
        if !footer.is_empty() {
            job = job.line(center(footer));
        }
        job.copies = 1;
        job.cut = config.auto_cut;
        job
    }
}

/// Opens connections to and prints on a physical printer.
#[async_trait]
pub trait PrinterDriver: Send + Sync {
    /// Open a connection, replacing any open one, and report the brand.
    async fn open(&self, address: &str) -> Result<PrinterBrand, DriverError>;

    /// Close the open connection, if any. Never fails.
    async fn close(&self);

    /// Print on the open connection.
    async fn print(&self, job: &PrintJob) -> Result<(), DriverError>;
}

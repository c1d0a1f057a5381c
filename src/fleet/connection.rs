//! Per-printer connection state and the in-flight operation guard.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{FleetError, FleetResult};
use crate::model::{PrinterBrand, PrinterId};

/// Connection lifecycle of one printer.
///
/// ```text
/// Disconnected -> Connecting -> Connected <-> Printing
///                      |                         |
///                      +--------> Error <--------+
/// ```
///
/// `Disconnect` returns any state to `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected {
        brand: PrinterBrand,
    },
    Printing,
    Error {
        cause: String,
    },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected { brand } => write!(f, "connected ({})", brand),
            Self::Printing => f.write_str("printing"),
            Self::Error { cause } => write!(f, "error: {}", cause),
        }
    }
}

/// Mutating operation on a single printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Save,
    SetDefault,
    Connect,
    Disconnect,
    Print,
    Delete,
}

/// Recover the data of a poisoned lock. Every critical section here is a
/// single map update, so the map is never left half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Tracks which printers have an operation running.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlight {
    ops: Arc<Mutex<HashMap<PrinterId, Operation>>>,
}

impl InFlight {
    /// Claim `id` for `op`, or reject if another operation holds it.
    ///
    /// The claim is released when the returned guard drops.
    pub fn begin(&self, id: PrinterId, op: Operation) -> FleetResult<InFlightGuard> {
        let mut ops = lock(&self.ops);
        if let Some(running) = ops.get(&id) {
            return Err(match (running, op) {
                (Operation::Connect, Operation::Connect) => {
                    FleetError::AlreadyConnecting { id: id.to_string() }
                }
                _ => FleetError::AlreadyInProgress { id: id.to_string() },
            });
        }
        ops.insert(id, op);
        Ok(InFlightGuard {
            ops: self.ops.clone(),
            id,
        })
    }

    pub fn current(&self, id: PrinterId) -> Option<Operation> {
        lock(&self.ops).get(&id).copied()
    }
}

pub(crate) struct InFlightGuard {
    ops: Arc<Mutex<HashMap<PrinterId, Operation>>>,
    id: PrinterId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.ops).remove(&self.id);
    }
}

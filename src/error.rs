//! # Error Types
//!
//! This module defines the error taxonomy shared by the fleet manager and the
//! template engine. Every variant's `Display` output is the short message a
//! user sees.
//!
//! | Variant | Recoverable by |
//! |---------|----------------|
//! | `Validation` | correcting the input |
//! | `AlreadyInProgress` / `AlreadyConnecting` | retrying later |
//! | `Connection` | retrying the connect or print |
//! | `Persistence` | nothing; the operation is abandoned |

use thiserror::Error;

use crate::discovery::DiscoveryError;
use crate::store::StoreError;

/// Main error type for fleetprint operations
#[derive(Debug, Error)]
pub enum FleetError {
    /// A required field is missing or out of range
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Another mutating operation on the same printer is still running
    #[error("Another operation is already running for printer {id}")]
    AlreadyInProgress { id: String },

    /// A connect for the same printer is still running
    #[error("Already connecting to printer {id}")]
    AlreadyConnecting { id: String },

    /// Driver open or print failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bluetooth discovery could not start
    #[error("Discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Store failure, surfaced verbatim
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// Unknown printer or template id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Printing requires an open connection
    #[error("Printer {id} is not connected")]
    NotConnected { id: String },

    /// Event not accepted in the current setup state
    #[error("Cannot {event} while {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    /// Built-in templates cannot be deleted or renamed
    #[error("Built-in template '{id}' cannot be {action}")]
    BuiltInTemplate { id: String, action: &'static str },

    /// Custom templates have no canonical default to reset to
    #[error("Custom template '{id}' has no default to reset to")]
    CustomTemplateHasNoDefault { id: String },

    /// A gated field was enabled while its precondition is off
    #[error("{field} requires {requires} to be shown first")]
    FieldGated {
        field: &'static str,
        requires: &'static str,
    },
}

impl FleetError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether the caller can reasonably retry or correct the input.
    ///
    /// Only store failures are fatal to the current operation.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Persistence(_))
    }
}

/// Result type for fleetprint operations
pub type FleetResult<T> = Result<T, FleetError>;

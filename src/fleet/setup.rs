//! # Printer Setup Flow
//!
//! One add-or-edit session for a single printer, as an explicit state
//! machine:
//!
//! ```text
//! NewManual:       SelectingDevice --select--> Configuring --save--> Saved
//! NewFromDevice:                               Configuring --save--> Saved
//! EditExisting:                                Configuring --save--> Saved
//! ```
//!
//! Any non-terminal state may be cancelled. `Saved` and `Cancelled` accept
//! no further events.
//!
//! The flow itself never touches the store. A valid `Save` hands the draft
//! back as [`Step::Commit`]; the fleet manager persists it and then calls
//! [`SetupFlow::mark_saved`]. If persisting fails the flow stays in
//! `Configuring` with the draft intact.

use crate::discovery::DiscoveredDevice;
use crate::error::{FleetError, FleetResult};
use crate::model::{PaperWidth, PrinterConfig, PrinterId};

/// Why a setup flow was opened.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupIntent {
    /// A device picked from a discovery list; its address is fixed.
    NewFromDevice(DiscoveredDevice),
    /// Start from discovery, or type the address by hand.
    NewManual,
    /// Edit a saved printer.
    EditExisting(PrinterId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    SelectingDevice,
    Configuring,
    Saved,
    Cancelled,
}

impl SetupState {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            Self::SelectingDevice => "selecting a device",
            Self::Configuring => "configuring",
            Self::Saved => "saved",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Saved | Self::Cancelled)
    }
}

/// One change to the draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftEdit {
    Name(String),
    /// Only for manually entered printers
    Address(String),
    PaperWidth(PaperWidth),
    AutoPrint(bool),
    AutoCut(bool),
    Default(bool),
    Copies(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetupEvent {
    /// Explicit pick from the discovery list
    DeviceSelected(DiscoveredDevice),
    EnterManually,
    Edit(DraftEdit),
    Save,
    Cancel,
}

impl SetupEvent {
    fn label(&self) -> &'static str {
        match self {
            Self::DeviceSelected(_) => "select a device",
            Self::EnterManually => "enter an address manually",
            Self::Edit(_) => "edit the printer",
            Self::Save => "save",
            Self::Cancel => "cancel",
        }
    }
}

/// Outcome of handling one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// The flow moved to (or stayed in) the returned state.
    State(SetupState),
    /// The draft passed validation and must be persisted.
    Commit(PrinterConfig),
}

/// State holder for one setup session.
#[derive(Debug, Clone)]
pub struct SetupFlow {
    state: SetupState,
    draft: Option<PrinterConfig>,
    is_new: bool,
    address_editable: bool,
    scan_error: Option<String>,
    /// Default flag set through `DraftEdit::Default`, if the user touched it
    default_choice: Option<bool>,
}

impl SetupFlow {
    pub(crate) fn manual() -> Self {
        Self {
            state: SetupState::SelectingDevice,
            draft: None,
            is_new: true,
            address_editable: false,
            scan_error: None,
            default_choice: None,
        }
    }

    pub(crate) fn from_device(device: &DiscoveredDevice) -> Self {
        Self {
            state: SetupState::Configuring,
            draft: Some(draft_for(device)),
            is_new: true,
            address_editable: false,
            scan_error: None,
            default_choice: None,
        }
    }

    pub(crate) fn editing(config: PrinterConfig) -> Self {
        Self {
            state: SetupState::Configuring,
            draft: Some(config),
            is_new: false,
            address_editable: false,
            scan_error: None,
            default_choice: None,
        }
    }

    pub fn state(&self) -> SetupState {
        self.state
    }

    /// The config being edited, once a device is chosen.
    pub fn draft(&self) -> Option<&PrinterConfig> {
        self.draft.as_ref()
    }

    /// Whether saving creates a new printer.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn address_editable(&self) -> bool {
        self.address_editable
    }

    /// Why the last discovery run in this flow failed, if it did.
    pub fn scan_error(&self) -> Option<&str> {
        self.scan_error.as_deref()
    }

    /// The default flag the user chose in this flow, if any.
    ///
    /// An edit that never sets it keeps the stored flag on save.
    pub fn default_choice(&self) -> Option<bool> {
        self.default_choice
    }

    pub(crate) fn set_scan_error(&mut self, error: Option<String>) {
        self.scan_error = error;
    }

    /// Apply one event.
    ///
    /// Events that do not fit the current state return
    /// [`FleetError::InvalidTransition`] and leave the flow untouched.
    pub fn handle(&mut self, event: SetupEvent) -> FleetResult<Step> {
        let invalid = |state: SetupState, event: &SetupEvent| FleetError::InvalidTransition {
            state: state.label(),
            event: event.label(),
        };

        match (self.state, event) {
            (SetupState::SelectingDevice, SetupEvent::DeviceSelected(device)) => {
                self.draft = Some(draft_for(&device));
                self.address_editable = false;
                self.state = SetupState::Configuring;
            }
            (SetupState::SelectingDevice, SetupEvent::EnterManually) => {
                self.draft = Some(PrinterConfig::new("", ""));
                self.address_editable = true;
                self.state = SetupState::Configuring;
            }
            (SetupState::Configuring, SetupEvent::Edit(edit)) => self.apply(edit)?,
            (SetupState::Configuring, SetupEvent::Save) => {
                let draft = self.draft.as_ref().ok_or_else(|| {
                    FleetError::InvalidTransition {
                        state: self.state.label(),
                        event: SetupEvent::Save.label(),
                    }
                })?;
                draft.validate()?;
                return Ok(Step::Commit(draft.clone()));
            }
            (state, SetupEvent::Cancel) if !state.is_terminal() => {
                self.state = SetupState::Cancelled;
            }
            (state, event) => return Err(invalid(state, &event)),
        }

        Ok(Step::State(self.state))
    }

    /// Record a successful save and end the flow.
    pub(crate) fn mark_saved(&mut self, saved: PrinterConfig) {
        self.draft = Some(saved);
        self.state = SetupState::Saved;
    }

    fn apply(&mut self, edit: DraftEdit) -> FleetResult<()> {
        let address_editable = self.address_editable;
        if let DraftEdit::Default(on) = &edit {
            self.default_choice = Some(*on);
        }
        let Some(draft) = self.draft.as_mut() else {
            return Ok(());
        };

        match edit {
            DraftEdit::Name(name) => draft.name = name,
            DraftEdit::Address(address) => {
                if !address_editable {
                    return Err(FleetError::validation(
                        "address",
                        "cannot be changed for this printer",
                    ));
                }
                draft.address = address.trim().to_string();
            }
            DraftEdit::PaperWidth(width) => draft.paper_width = width,
            DraftEdit::AutoPrint(on) => draft.is_auto_print = on,
            DraftEdit::AutoCut(on) => draft.auto_cut = on,
            DraftEdit::Default(on) => draft.is_default = on,
            DraftEdit::Copies(copies) => draft.copies = copies,
        }
        Ok(())
    }
}

/// Draft for a freshly discovered device.
fn draft_for(device: &DiscoveredDevice) -> PrinterConfig {
    PrinterConfig::new(device.display_name(), device.address.clone())
}

// ============================================================================
// TESTS
// ============================================================================

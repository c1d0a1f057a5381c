//! # Printer Configuration
//!
//! Persisted settings for one configured receipt printer.
//!
//! ## Paper Widths
//!
//! | Width | Characters per line |
//! |-------|---------------------|
//! | 58mm (sold as 57mm) | 32 |
//! | 80mm | 42 |
//!
//! Stored widths are parsed leniently: anything unrecognized falls back to
//! [`PaperWidth::default`] instead of failing the whole record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};

/// Maximum copies per print job.
pub const MAX_COPIES: u8 = 9;

/// Opaque printer identifier, generated once at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(Uuid);

impl PrinterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PrinterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PrinterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PrinterId {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| FleetError::NotFound(format!("printer '{}'", s)))
    }
}

/// Physical transport. Only Bluetooth is supported today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    Bluetooth,
}

/// Command-language family, detected on first successful connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterBrand {
    #[default]
    Unknown,
    /// Star Micronics (StarPRNT / Star Line mode)
    Star,
    /// Generic ESC/POS
    EscPos,
}

impl fmt::Display for PrinterBrand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Unknown => "unknown",
            Self::Star => "star",
            Self::EscPos => "escpos",
        })
    }
}

/// Supported paper roll widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum PaperWidth {
    #[default]
    #[serde(rename = "58")]
    Mm58,
    #[serde(rename = "80")]
    Mm80,
}

impl PaperWidth {
    /// Parse a width, returning `None` for unsupported values.
    ///
    /// Accepts `"58"`, `"58mm"`, `"57"` (the same roll), `"80"` and `"80mm"`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.trim_end_matches("mm").trim() {
            "57" | "58" => Some(Self::Mm58),
            "80" => Some(Self::Mm80),
            _ => None,
        }
    }

    /// Parse a width, falling back to the default when unparseable.
    pub fn parse_or_default(s: &str) -> Self {
        Self::parse(s).unwrap_or_default()
    }

    /// Nominal width in millimeters.
    pub fn mm(&self) -> u8 {
        match self {
            Self::Mm58 => 58,
            Self::Mm80 => 80,
        }
    }

    /// Characters per line with the printer's default font.
    pub fn chars_per_line(&self) -> usize {
        match self {
            Self::Mm58 => 32,
            Self::Mm80 => 42,
        }
    }
}

impl fmt::Display for PaperWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{}mm", self.mm()))
    }
}

impl<'de> Deserialize<'de> for PaperWidth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::String(s) => Self::parse_or_default(&s),
            serde_json::Value::Number(n) => Self::parse_or_default(&n.to_string()),
            _ => Self::default(),
        })
    }
}

fn default_copies() -> u8 {
    1
}

/// # Printer Configuration
///
/// One printer's persisted settings. `id` and `address` never change after
/// creation; everything else is edited through a setup flow and saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub id: PrinterId,
    pub name: String,
    /// Hardware address (Bluetooth MAC)
    pub address: String,
    #[serde(rename = "type", default)]
    pub transport: TransportKind,
    #[serde(default)]
    pub brand: PrinterBrand,
    #[serde(default)]
    pub paper_width: PaperWidth,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_auto_print: bool,
    #[serde(default)]
    pub auto_cut: bool,
    #[serde(default = "default_copies")]
    pub copies: u8,
}

impl PrinterConfig {
    /// Create a config with a fresh id and default settings.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: PrinterId::new(),
            name: name.into(),
            address: address.into(),
            transport: TransportKind::Bluetooth,
            brand: PrinterBrand::Unknown,
            paper_width: PaperWidth::default(),
            is_default: false,
            is_auto_print: false,
            auto_cut: false,
            copies: default_copies(),
        }
    }

    /// Name shown in lists; falls back to the address.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.address
        } else {
            &self.name
        }
    }

    /// Check required fields before a save.
    pub fn validate(&self) -> FleetResult<()> {
        if self.name.trim().is_empty() {
            return Err(FleetError::validation("name", "must not be blank"));
        }
        if self.address.trim().is_empty() {
            return Err(FleetError::validation("address", "must not be blank"));
        }
        if self.copies == 0 || self.copies > MAX_COPIES {
            return Err(FleetError::validation(
                "copies",
                format!("must be between 1 and {}", MAX_COPIES),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paper_width_parse() {
        assert_eq!(PaperWidth::parse("58"), Some(PaperWidth::Mm58));
        assert_eq!(PaperWidth::parse("57mm"), Some(PaperWidth::Mm58));
        assert_eq!(PaperWidth::parse(" 80MM "), Some(PaperWidth::Mm80));
        assert_eq!(PaperWidth::parse("110"), None);
        assert_eq!(PaperWidth::parse_or_default("wide"), PaperWidth::Mm58);
    }

    #[test]
    fn test_chars_per_line() {
        assert_eq!(PaperWidth::Mm58.chars_per_line(), 32);
        assert_eq!(PaperWidth::Mm80.chars_per_line(), 42);
    }

    #[test]
    fn test_lenient_deserialize() {
        let json = r#"{
            "id": "8c1f8f52-2f0e-4b53-9d1b-3c8a4f3e2a10",
            "name": "Kitchen",
            "address": "00:11:62:AA:BB:CC",
            "paper_width": "banana"
        }"#;
        let config: PrinterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.paper_width, PaperWidth::Mm58);
        assert_eq!(config.copies, 1);
        assert_eq!(config.brand, PrinterBrand::Unknown);
        assert!(!config.is_default);

        let json = json.replace("\"banana\"", "80");
        let config: PrinterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.paper_width, PaperWidth::Mm80);
    }

    #[test]
    fn test_serialize_width_as_string() {
        let config = PrinterConfig::new("Front", "00:11:22:33:44:55");
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["paper_width"], "58");
        assert_eq!(value["type"], "bluetooth");
    }

    #[test]
    fn test_validate_required_fields() {
        let mut config = PrinterConfig::new("  ", "00:11:22:33:44:55");
        assert!(matches!(
            config.validate(),
            Err(FleetError::Validation { field: "name", .. })
        ));

        config.name = "Front".to_string();
        config.address = String::new();
        assert!(matches!(
            config.validate(),
            Err(FleetError::Validation { field: "address", .. })
        ));

        config.address = "00:11:22:33:44:55".to_string();
        config.copies = 0;
        assert!(matches!(
            config.validate(),
            Err(FleetError::Validation { field: "copies", .. })
        ));

        config.copies = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_display_name_falls_back_to_address() {
        let config = PrinterConfig::new("", "00:11:22:33:44:55");
        assert_eq!(config.display_name(), "00:11:22:33:44:55");
    }

    #[test]
    fn test_printer_id_round_trip() {
        let id = PrinterId::new();
        let parsed: PrinterId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-an-id".parse::<PrinterId>().is_err());
    }
}

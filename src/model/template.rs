//! # Receipt Template Configuration
//!
//! A template decides which fields appear on a printed receipt. Fields are
//! grouped into clusters; each cluster has one parent flag and zero or more
//! child flags:
//!
//! | Cluster | Parent | Children |
//! |---------|--------|----------|
//! | Store info | `show_store_info` | name, address, phone |
//! | Order info | `show_order_info` | number, date |
//! | Customer info | `show_customer_info` | name, phone, delivery |
//! | Order content | `show_order_content` | items, prices, notes, totals |
//! | Payment info | `show_payment_info` | (none) |
//! | Footer | `show_footer` | (none) |
//!
//! Parent/child coherence is enforced by
//! [`TemplateDependencyEngine`](crate::template::TemplateDependencyEngine),
//! not by this type: a config loaded from storage may be incoherent until it
//! passes through the engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of every user-created template id.
pub const CUSTOM_PREFIX: &str = "custom_";

/// Default footer for built-in templates.
pub const DEFAULT_FOOTER: &str = "Thank you for your order!";

/// Template category, used to pick defaults on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    FullDetails,
    Delivery,
    Kitchen,
}

impl TemplateType {
    pub const ALL: [TemplateType; 3] = [Self::FullDetails, Self::Delivery, Self::Kitchen];

    /// Fixed id of this type's built-in template.
    pub fn builtin_id(&self) -> &'static str {
        match self {
            Self::FullDetails => "full_details",
            Self::Delivery => "delivery",
            Self::Kitchen => "kitchen",
        }
    }

    /// Display name of this type's built-in template.
    pub fn builtin_name(&self) -> &'static str {
        match self {
            Self::FullDetails => "Full Order Details",
            Self::Delivery => "Delivery Receipt",
            Self::Kitchen => "Kitchen Order",
        }
    }

    /// Type of the built-in template with this id, if it is one.
    pub fn from_builtin_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.builtin_id() == id)
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.builtin_id())
    }
}

impl FromStr for TemplateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_builtin_id(&s.trim().to_lowercase().replace('-', "_")).ok_or_else(|| {
            format!(
                "Unknown template type '{}'. Use full_details, delivery or kitchen",
                s
            )
        })
    }
}

/// Whether the id names one of the fixed built-in templates.
pub fn is_builtin_id(id: &str) -> bool {
    TemplateType::from_builtin_id(id).is_some()
}

/// Whether the id names a user-created template.
pub fn is_custom_id(id: &str) -> bool {
    id.starts_with(CUSTOM_PREFIX)
}

/// Generate a fresh custom template id.
pub fn generate_custom_id() -> String {
    format!("{}{}", CUSTOM_PREFIX, Uuid::new_v4().simple())
}

// ============================================================================
// FIELDS AND CLUSTERS
// ============================================================================

/// A group of one parent flag and its child flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cluster {
    StoreInfo,
    OrderInfo,
    CustomerInfo,
    OrderContent,
    PaymentInfo,
    Footer,
}

impl Cluster {
    pub const ALL: [Cluster; 6] = [
        Self::StoreInfo,
        Self::OrderInfo,
        Self::CustomerInfo,
        Self::OrderContent,
        Self::PaymentInfo,
        Self::Footer,
    ];

    pub fn parent(&self) -> Field {
        match self {
            Self::StoreInfo => Field::StoreInfo,
            Self::OrderInfo => Field::OrderInfo,
            Self::CustomerInfo => Field::CustomerInfo,
            Self::OrderContent => Field::OrderContent,
            Self::PaymentInfo => Field::PaymentInfo,
            Self::Footer => Field::Footer,
        }
    }

    pub fn children(&self) -> &'static [Field] {
        match self {
            Self::StoreInfo => &[Field::StoreName, Field::StoreAddress, Field::StorePhone],
            Self::OrderInfo => &[Field::OrderNumber, Field::OrderDate],
            Self::CustomerInfo => &[
                Field::CustomerName,
                Field::CustomerPhone,
                Field::DeliveryInfo,
            ],
            Self::OrderContent => &[
                Field::ItemDetails,
                Field::ItemPrices,
                Field::OrderNotes,
                Field::Totals,
            ],
            Self::PaymentInfo | Self::Footer => &[],
        }
    }
}

/// One boolean "show" flag of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    StoreInfo,
    StoreName,
    StoreAddress,
    StorePhone,
    OrderInfo,
    OrderNumber,
    OrderDate,
    CustomerInfo,
    CustomerName,
    CustomerPhone,
    DeliveryInfo,
    OrderContent,
    ItemDetails,
    ItemPrices,
    OrderNotes,
    Totals,
    PaymentInfo,
    Footer,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Self::StoreInfo,
        Self::StoreName,
        Self::StoreAddress,
        Self::StorePhone,
        Self::OrderInfo,
        Self::OrderNumber,
        Self::OrderDate,
        Self::CustomerInfo,
        Self::CustomerName,
        Self::CustomerPhone,
        Self::DeliveryInfo,
        Self::OrderContent,
        Self::ItemDetails,
        Self::ItemPrices,
        Self::OrderNotes,
        Self::Totals,
        Self::PaymentInfo,
        Self::Footer,
    ];

    /// Cluster this field belongs to.
    pub fn cluster(&self) -> Cluster {
        match self {
            Self::StoreInfo | Self::StoreName | Self::StoreAddress | Self::StorePhone => {
                Cluster::StoreInfo
            }
            Self::OrderInfo | Self::OrderNumber | Self::OrderDate => Cluster::OrderInfo,
            Self::CustomerInfo | Self::CustomerName | Self::CustomerPhone | Self::DeliveryInfo => {
                Cluster::CustomerInfo
            }
            Self::OrderContent
            | Self::ItemDetails
            | Self::ItemPrices
            | Self::OrderNotes
            | Self::Totals => Cluster::OrderContent,
            Self::PaymentInfo => Cluster::PaymentInfo,
            Self::Footer => Cluster::Footer,
        }
    }

    pub fn is_parent(&self) -> bool {
        self.cluster().parent() == *self
    }

    /// Field that must be shown before this one can be switched on.
    ///
    /// This is an edit-time gate only. Closing the gate later does not
    /// switch the gated field off.
    pub fn gate(&self) -> Option<Field> {
        match self {
            Self::ItemPrices => Some(Self::ItemDetails),
            _ => None,
        }
    }

    /// Stable snake_case name, as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StoreInfo => "store_info",
            Self::StoreName => "store_name",
            Self::StoreAddress => "store_address",
            Self::StorePhone => "store_phone",
            Self::OrderInfo => "order_info",
            Self::OrderNumber => "order_number",
            Self::OrderDate => "order_date",
            Self::CustomerInfo => "customer_info",
            Self::CustomerName => "customer_name",
            Self::CustomerPhone => "customer_phone",
            Self::DeliveryInfo => "delivery_info",
            Self::OrderContent => "order_content",
            Self::ItemDetails => "item_details",
            Self::ItemPrices => "item_prices",
            Self::OrderNotes => "order_notes",
            Self::Totals => "totals",
            Self::PaymentInfo => "payment_info",
            Self::Footer => "footer",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        let wanted = wanted.strip_prefix("show_").unwrap_or(&wanted);
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| format!("Unknown template field '{}'", s))
    }
}

/// Summary of a cluster's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    All,
    None,
    Partial,
}

// ============================================================================
// TEMPLATE CONFIG
// ============================================================================

/// # Template Configuration
///
/// Field-visibility settings of one receipt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub template_id: String,
    pub template_type: TemplateType,
    pub template_name: String,

    pub show_store_info: bool,
    pub show_store_name: bool,
    pub show_store_address: bool,
    pub show_store_phone: bool,

    pub show_order_info: bool,
    pub show_order_number: bool,
    pub show_order_date: bool,

    pub show_customer_info: bool,
    pub show_customer_name: bool,
    pub show_customer_phone: bool,
    pub show_delivery_info: bool,

    pub show_order_content: bool,
    pub show_item_details: bool,
    pub show_item_prices: bool,
    pub show_order_notes: bool,
    pub show_totals: bool,

    pub show_payment_info: bool,

    pub show_footer: bool,
    #[serde(default)]
    pub footer_text: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateConfig {
    /// A config with every flag off and an empty footer.
    fn blank(template_id: String, template_type: TemplateType, template_name: String) -> Self {
        let now = Utc::now();
        Self {
            template_id,
            template_type,
            template_name,
            show_store_info: false,
            show_store_name: false,
            show_store_address: false,
            show_store_phone: false,
            show_order_info: false,
            show_order_number: false,
            show_order_date: false,
            show_customer_info: false,
            show_customer_name: false,
            show_customer_phone: false,
            show_delivery_info: false,
            show_order_content: false,
            show_item_details: false,
            show_item_prices: false,
            show_order_notes: false,
            show_totals: false,
            show_payment_info: false,
            show_footer: false,
            footer_text: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// A fresh custom template: generated `custom_` id, every flag off.
    pub fn custom(name: impl Into<String>, template_type: TemplateType) -> Self {
        Self::blank(generate_custom_id(), template_type, name.into())
    }

    /// The built-in default for a template type.
    ///
    /// Uses the type's fixed built-in id.
    pub fn builtin(template_type: TemplateType) -> Self {
        Self::default_for(template_type, template_type.builtin_id())
    }

    /// The default flag set of `template_type` under an arbitrary id.
    pub fn default_for(template_type: TemplateType, template_id: impl Into<String>) -> Self {
        let mut config = Self::blank(
            template_id.into(),
            template_type,
            template_type.builtin_name().to_string(),
        );
        config.apply_type_defaults();
        config
    }

    /// Overwrite every flag with the defaults of this config's type.
    ///
    /// Keeps id, name and `created_at`.
    pub fn apply_type_defaults(&mut self) {
        let kitchen = self.template_type == TemplateType::Kitchen;
        let delivery = self.template_type == TemplateType::Delivery;

        self.show_store_info = !kitchen;
        self.show_store_name = !kitchen;
        self.show_store_address = !kitchen;
        self.show_store_phone = !kitchen;

        self.show_order_info = true;
        self.show_order_number = true;
        self.show_order_date = true;

        self.show_customer_info = !kitchen;
        self.show_customer_name = !kitchen;
        self.show_customer_phone = !kitchen;
        self.show_delivery_info = delivery;

        self.show_order_content = true;
        self.show_item_details = true;
        self.show_item_prices = !kitchen;
        self.show_order_notes = true;
        self.show_totals = !kitchen;

        self.show_payment_info = !kitchen;
        self.show_footer = !kitchen;
        self.footer_text = if kitchen {
            String::new()
        } else {
            DEFAULT_FOOTER.to_string()
        };
    }

    pub fn is_builtin(&self) -> bool {
        is_builtin_id(&self.template_id)
    }

    pub fn is_custom(&self) -> bool {
        is_custom_id(&self.template_id)
    }

    pub fn get(&self, field: Field) -> bool {
        match field {
            Field::StoreInfo => self.show_store_info,
            Field::StoreName => self.show_store_name,
            Field::StoreAddress => self.show_store_address,
            Field::StorePhone => self.show_store_phone,
            Field::OrderInfo => self.show_order_info,
            Field::OrderNumber => self.show_order_number,
            Field::OrderDate => self.show_order_date,
            Field::CustomerInfo => self.show_customer_info,
            Field::CustomerName => self.show_customer_name,
            Field::CustomerPhone => self.show_customer_phone,
            Field::DeliveryInfo => self.show_delivery_info,
            Field::OrderContent => self.show_order_content,
            Field::ItemDetails => self.show_item_details,
            Field::ItemPrices => self.show_item_prices,
            Field::OrderNotes => self.show_order_notes,
            Field::Totals => self.show_totals,
            Field::PaymentInfo => self.show_payment_info,
            Field::Footer => self.show_footer,
        }
    }

    /// Set one flag with no cascade.
    pub fn set(&mut self, field: Field, value: bool) {
        let slot = match field {
            Field::StoreInfo => &mut self.show_store_info,
            Field::StoreName => &mut self.show_store_name,
            Field::StoreAddress => &mut self.show_store_address,
            Field::StorePhone => &mut self.show_store_phone,
            Field::OrderInfo => &mut self.show_order_info,
            Field::OrderNumber => &mut self.show_order_number,
            Field::OrderDate => &mut self.show_order_date,
            Field::CustomerInfo => &mut self.show_customer_info,
            Field::CustomerName => &mut self.show_customer_name,
            Field::CustomerPhone => &mut self.show_customer_phone,
            Field::DeliveryInfo => &mut self.show_delivery_info,
            Field::OrderContent => &mut self.show_order_content,
            Field::ItemDetails => &mut self.show_item_details,
            Field::ItemPrices => &mut self.show_item_prices,
            Field::OrderNotes => &mut self.show_order_notes,
            Field::Totals => &mut self.show_totals,
            Field::PaymentInfo => &mut self.show_payment_info,
            Field::Footer => &mut self.show_footer,
        };
        *slot = value;
    }

    /// Whether every flag is off.
    pub fn all_flags_off(&self) -> bool {
        Field::ALL.iter().all(|f| !self.get(*f))
    }

    pub fn cluster_state(&self, cluster: Cluster) -> ClusterState {
        let children = cluster.children();
        let on = if children.is_empty() {
            usize::from(self.get(cluster.parent()))
        } else {
            children.iter().filter(|f| self.get(**f)).count()
        };
        let total = children.len().max(1);
        match on {
            0 => ClusterState::None,
            n if n == total => ClusterState::All,
            _ => ClusterState::Partial,
        }
    }

    /// Number of clusters whose parent flag is on.
    pub fn enabled_section_count(&self) -> usize {
        Cluster::ALL
            .iter()
            .filter(|c| self.get(c.parent()))
            .count()
    }

    /// Whether printing with this template produces anything.
    pub fn has_visible_content(&self) -> bool {
        self.enabled_section_count() > 0
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Remote records pulled into the local store.
//!
//! Field names follow the remote API's JSON. Any field the engine does not
//! model explicitly is kept in the flattened `extra` map so it still reaches
//! the store command.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A customer account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Remote account id.
    pub id: i64,
    /// First name of the primary contact.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name of the primary contact or the business name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Display name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// External customer id.
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Address as originally entered.
    #[serde(default)]
    pub original_address: Option<String>,
    /// Id in the linked CRM.
    #[serde(default)]
    pub crm_id: Option<String>,
    /// Owning user.
    #[serde(default)]
    pub account_owner: Option<String>,
    /// Date of the most recent check-in.
    #[serde(default)]
    pub last_checkin_date: Option<String>,
    /// Last remote modification.
    #[serde(default)]
    pub last_modified_date: Option<String>,
    /// Follow-up date.
    #[serde(default)]
    pub follow_up_date: Option<String>,
    /// Custom fields and anything else the API returns.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Account {
    /// Returns a display label for logs and events.
    pub fn label(&self) -> String {
        self.full_name
            .clone()
            .unwrap_or_else(|| format!("account {}", self.id))
    }
}

/// A visit record logged against an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkin {
    /// Remote check-in id.
    pub id: i64,
    /// Id in the linked CRM.
    #[serde(default)]
    pub crm_id: Option<String>,
    /// Account the visit belongs to.
    pub customer: i64,
    /// When the visit was logged.
    #[serde(default)]
    pub log_datetime: Option<String>,
    /// Visit type.
    #[serde(default, rename = "type")]
    pub checkin_type: Option<String>,
    /// Visit comments.
    #[serde(default)]
    pub comments: Option<String>,
    /// Raw JSON of custom check-in fields.
    #[serde(default)]
    pub extra_fields: Option<serde_json::Value>,
    /// User who logged the visit.
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Checkin {
    /// Returns a display label for logs and events.
    pub fn label(&self) -> String {
        format!("check-in {} for account {}", self.id, self.customer)
    }
}

/// A planned route.
///
/// The route list endpoint can return entries without an id; those are
/// skipped by the pull.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Remote route id.
    #[serde(default)]
    pub id: Option<i64>,
    /// Route name.
    #[serde(default)]
    pub name: Option<String>,
    /// Planned date.
    #[serde(default)]
    pub route_date: Option<String>,
    /// Planned duration in minutes.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Start address.
    #[serde(default)]
    pub start_address: Option<String>,
    /// Destination address.
    #[serde(default)]
    pub destination_address: Option<String>,
    /// Planned start time.
    #[serde(default)]
    pub start_time: Option<String>,
}

impl Route {
    /// Returns a display label for logs and events.
    pub fn label(&self) -> String {
        match (&self.name, self.id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => format!("route {id}"),
            (None, None) => "unnamed route".to_string(),
        }
    }
}

/// The company a user profile belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Company id.
    pub id: i64,
    /// Company name.
    #[serde(default)]
    pub name: String,
    /// Short name.
    #[serde(default)]
    pub short_name: Option<String>,
}

/// One selectable value of a profile data field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFieldValue {
    /// Display text.
    pub text: String,
    /// Stored value.
    pub value: serde_json::Value,
}

/// Metadata describing a custom account field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataField {
    /// Field name (`custom_text3`, ...).
    pub name: String,
    /// Display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Position in forms.
    #[serde(default)]
    pub position: i64,
    /// Field type.
    #[serde(default, rename = "type")]
    pub field_type: Option<String>,
    /// Whether the field can be filtered on.
    #[serde(default)]
    pub filterable: bool,
    /// Whether any account has a value for this field.
    #[serde(default)]
    pub has_data: bool,
    /// Account column the field maps to.
    #[serde(default)]
    pub account_field: Option<String>,
    /// Selectable values.
    #[serde(default)]
    pub values: Vec<DataFieldValue>,
}

/// The authenticated user's profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Profile id.
    pub id: i64,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
    /// First name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Whether the user manages other users.
    #[serde(default)]
    pub is_manager: bool,
    /// Base URL of the linked CRM.
    #[serde(default)]
    pub crm_base_url: Option<String>,
    /// Type of the linked CRM.
    #[serde(default)]
    pub crm_type: Option<String>,
    /// Fields the user may push back to the CRM.
    #[serde(default)]
    pub crm_editable_fields_list: Vec<String>,
    /// Company the user belongs to.
    #[serde(default)]
    pub company: Company,
    /// Custom field metadata.
    #[serde(default)]
    pub datafields: Vec<DataField>,
}

impl UserProfile {
    /// Returns "First Last", trimming missing parts.
    pub fn display_name(&self) -> String {
        let first = self.first_name.as_deref().unwrap_or_default();
        let last = self.last_name.as_deref().unwrap_or_default();
        format!("{first} {last}").trim().to_string()
    }
}

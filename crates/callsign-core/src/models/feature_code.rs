//! Feature code model
//!
//! A tenant-scoped or global star-code rule. Codes match either literally,
//! through an alias, or through an administrator-authored regular expression
//! whose capture groups become parameters of the executed action.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Capture names that would shadow template variables in webhook URLs and
/// custom command sequences.
pub const RESERVED_CAPTURE_NAMES: &[&str] =
    &["caller_id", "caller_name", "domain", "code", "uuid", "tenant_id"];

/// Action executed when a feature code matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureAction {
    /// Voicemail access (check own box, prompt for box, or a fixed box)
    #[default]
    Voicemail,
    /// Unconditional call forward enable/disable
    CallForward,
    /// Do Not Disturb enable/disable
    Dnd,
    /// Day/night toggle of a call flow
    CallFlowToggle,
    /// Blind transfer to a fixed destination
    Transfer,
    /// Valet park into the first free slot
    Park,
    /// Valet park into a specific slot
    ParkSlot,
    /// Retrieve a parked call
    ParkRetrieve,
    /// Directed or group call pickup
    Pickup,
    /// Auto-answer intercom to one extension
    Intercom,
    /// Auto-answer page to a group of extensions
    PageGroup,
    /// Bridge to a stored number
    SpeedDial,
    /// Enable call recording for the caller
    Record,
    /// Pipe-separated list of dialplan applications
    Custom,
    /// HTTP callback
    Webhook,
    /// Lua script
    Lua,
}

impl fmt::Display for FeatureAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FeatureAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureAction::Voicemail => "voicemail",
            FeatureAction::CallForward => "call_forward",
            FeatureAction::Dnd => "dnd",
            FeatureAction::CallFlowToggle => "call_flow_toggle",
            FeatureAction::Transfer => "transfer",
            FeatureAction::Park => "park",
            FeatureAction::ParkSlot => "park_slot",
            FeatureAction::ParkRetrieve => "park_retrieve",
            FeatureAction::Pickup => "pickup",
            FeatureAction::Intercom => "intercom",
            FeatureAction::PageGroup => "page_group",
            FeatureAction::SpeedDial => "speed_dial",
            FeatureAction::Record => "record",
            FeatureAction::Custom => "custom",
            FeatureAction::Webhook => "webhook",
            FeatureAction::Lua => "lua",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "voicemail" => Some(FeatureAction::Voicemail),
            "call_forward" => Some(FeatureAction::CallForward),
            "dnd" => Some(FeatureAction::Dnd),
            "call_flow_toggle" => Some(FeatureAction::CallFlowToggle),
            "transfer" => Some(FeatureAction::Transfer),
            "park" => Some(FeatureAction::Park),
            "park_slot" => Some(FeatureAction::ParkSlot),
            "park_retrieve" => Some(FeatureAction::ParkRetrieve),
            "pickup" => Some(FeatureAction::Pickup),
            "intercom" => Some(FeatureAction::Intercom),
            "page_group" => Some(FeatureAction::PageGroup),
            "speed_dial" => Some(FeatureAction::SpeedDial),
            "record" => Some(FeatureAction::Record),
            "custom" => Some(FeatureAction::Custom),
            "webhook" => Some(FeatureAction::Webhook),
            "lua" => Some(FeatureAction::Lua),
            _ => None,
        }
    }
}

/// Feature code entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_feature_code"))]
pub struct FeatureCode {
    pub id: i64,
    pub uuid: Uuid,
    /// `None` marks a global code visible to every tenant
    pub tenant_id: Option<i64>,
    pub code: String,
    pub code_regex: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Feature code name is required"))]
    pub name: String,
    pub description: Option<String>,
    pub action: FeatureAction,
    /// Alias that also matches, e.g. a plain extension number
    pub extension: Option<String>,
    /// Evaluation weight; lower runs first
    pub order: i32,
    pub is_global: bool,
    pub context: Option<String>,
    pub action_data: Option<String>,
    #[serde(default)]
    pub action_params: HashMap<String, String>,
    pub park_lot_name: Option<String>,
    pub park_timeout: i32,
    pub park_announce: bool,
    pub webhook_url: Option<String>,
    pub webhook_method: Option<String>,
    pub lua_script: Option<String>,
    pub transfer_dest: Option<String>,
    pub transfer_context: Option<String>,
    pub group_id: Option<i64>,
    pub blf_hint: Option<String>,
    pub enabled: bool,
}

impl Default for FeatureCode {
    fn default() -> Self {
        Self {
            id: 0,
            uuid: Uuid::nil(),
            tenant_id: None,
            code: String::new(),
            code_regex: None,
            name: String::new(),
            description: None,
            action: FeatureAction::default(),
            extension: None,
            order: 100,
            is_global: false,
            context: None,
            action_data: None,
            action_params: HashMap::new(),
            park_lot_name: None,
            park_timeout: 0,
            park_announce: false,
            webhook_url: None,
            webhook_method: None,
            lua_script: None,
            transfer_dest: None,
            transfer_context: None,
            group_id: None,
            blf_hint: None,
            enabled: true,
        }
    }
}

/// Result of a successful match: named and positional captures
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeMatch {
    pub captures: HashMap<String, String>,
}

impl CodeMatch {
    /// Capture value, or `None` when absent or empty
    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

impl FeatureCode {
    fn regex(&self) -> Option<&str> {
        self.code_regex.as_deref().filter(|r| !r.is_empty())
    }

    /// Match a dialed string against this code
    ///
    /// Tries the regular expression first (collecting named captures and
    /// numbered captures `"1"`..`"n"`), then the literal code, then the alias.
    pub fn matches_dialed(&self, dialed: &str) -> Option<CodeMatch> {
        if let Some(pattern) = self.regex() {
            if let Ok(re) = Regex::new(pattern) {
                if let Some(caps) = re.captures(dialed) {
                    let mut captures = HashMap::new();
                    for name in re.capture_names().flatten() {
                        let value = caps.name(name).map(|m| m.as_str()).unwrap_or("");
                        captures.insert(name.to_string(), value.to_string());
                    }
                    for i in 1..caps.len() {
                        let value = caps.get(i).map(|m| m.as_str()).unwrap_or("");
                        captures.insert(i.to_string(), value.to_string());
                    }
                    return Some(CodeMatch { captures });
                }
            }
        }

        if !self.code.is_empty() && self.code == dialed {
            return Some(CodeMatch::default());
        }

        match self.extension.as_deref() {
            Some(alias) if !alias.is_empty() && alias == dialed => Some(CodeMatch::default()),
            _ => None,
        }
    }

    /// Expression used in the generated dialplan condition
    pub fn dialplan_expression(&self) -> String {
        match self.regex() {
            Some(pattern) => pattern.to_string(),
            None => format!("^{}$", regex::escape(&self.code)),
        }
    }

    /// Lot name, `"default"` when unset
    pub fn lot_name(&self) -> &str {
        self.park_lot_name
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or("default")
    }

    /// Non-empty action data
    pub fn data(&self) -> Option<&str> {
        self.action_data.as_deref().filter(|d| !d.is_empty())
    }
}

/// Save-time checks: literal codes start with `*` or `#`, regular expressions
/// compile and do not name a capture after a reserved template variable.
fn validate_feature_code(fc: &FeatureCode) -> Result<(), ValidationError> {
    match fc.regex() {
        None => {
            if fc.code.len() < 2 {
                return Err(validation_error(
                    "code_too_short",
                    "feature code must be at least 2 characters".to_string(),
                ));
            }
            if !fc.code.starts_with('*') && !fc.code.starts_with('#') {
                return Err(validation_error(
                    "code_prefix",
                    "feature code must start with * or #".to_string(),
                ));
            }
        }
        Some(pattern) => {
            let re = Regex::new(pattern).map_err(|e| {
                validation_error("code_regex", format!("invalid code_regex pattern: {}", e))
            })?;
            if let Some(name) = re
                .capture_names()
                .flatten()
                .find(|n| RESERVED_CAPTURE_NAMES.contains(n))
            {
                return Err(validation_error(
                    "reserved_capture",
                    format!("capture group name '{}' is reserved", name),
                ));
            }
        }
    }
    Ok(())
}

fn validation_error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Owned(message));
    err
}

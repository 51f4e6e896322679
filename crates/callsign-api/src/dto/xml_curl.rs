//! Form posted by mod_xml_curl
//!
//! The switch sends well over a hundred fields; only the ones the document
//! builders read are kept, everything else is ignored.

use serde::Deserialize;

/// Parsed `POST /xml_curl` form
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct XmlCurlRequest {
    /// `directory`, `dialplan` or `configuration`
    pub section: String,
    pub tag_name: String,
    pub key_name: String,
    /// Configuration name for the configuration section, e.g. `acl.conf`
    pub key_value: String,
    pub hostname: String,

    // Directory
    pub user: String,
    pub domain: String,
    pub action: String,
    pub purpose: String,
    pub sip_profile: String,

    // Dialplan
    pub context: String,
    pub destination_number: String,
    pub caller_id_name: String,
    pub caller_id_number: String,
    #[serde(rename = "uuid")]
    pub channel_uuid: String,

    #[serde(rename = "FreeSWITCH-Hostname")]
    pub freeswitch_hostname: String,
}

impl XmlCurlRequest {
    /// Switch host name, preferring the `FreeSWITCH-Hostname` header field
    pub fn switch_hostname(&self) -> &str {
        if self.freeswitch_hostname.is_empty() {
            &self.hostname
        } else {
            &self.freeswitch_hostname
        }
    }

    /// Dialplan context, `default` when the switch sent none
    pub fn dialplan_context(&self) -> &str {
        if self.context.is_empty() {
            "default"
        } else {
            &self.context
        }
    }

    /// Single-destination mode answers inbound routes for one number
    pub fn is_single_dialplan(&self) -> bool {
        self.dialplan_context() == "public" && !self.destination_number.is_empty()
    }

    /// Tenant domain a dialplan request belongs to: the context itself unless
    /// it is the shared `default` context
    pub fn dialplan_domain(&self) -> &str {
        match self.dialplan_context() {
            "default" | "public" => &self.domain,
            context => context,
        }
    }
}

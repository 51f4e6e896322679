//! Configuration documents
//!
//! Only names a [`ConfigurationSource`] knows are answered; every other
//! configuration file is left to the switch's static copy.

use super::{envelope, escape};

/// Produces `configuration` section bodies by file name
pub trait ConfigurationSource: Send + Sync {
    /// Full document for `name` (e.g. `acl.conf`) on switch `hostname`
    fn document(&self, name: &str, hostname: &str) -> Option<String>;
}

/// Network list entry of `acl.conf`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclList {
    pub name: String,
    pub default_allow: bool,
    /// CIDRs added with `type="allow"`
    pub allow: Vec<String>,
}

impl AclList {
    fn render(&self) -> String {
        let default = if self.default_allow { "allow" } else { "deny" };
        if self.allow.is_empty() {
            return format!(
                "        <list name=\"{}\" default=\"{}\"/>\n",
                escape(&self.name),
                default
            );
        }
        let nodes: String = self
            .allow
            .iter()
            .map(|cidr| format!("          <node type=\"allow\" cidr=\"{}\"/>\n", escape(cidr)))
            .collect();
        format!(
            "        <list name=\"{}\" default=\"{}\">\n{}        </list>\n",
            escape(&self.name),
            default,
            nodes
        )
    }
}

/// Built-in source serving `acl.conf` with the private networks allowed
#[derive(Debug, Clone)]
pub struct StaticConfigurationSource {
    acl: Vec<AclList>,
}

impl Default for StaticConfigurationSource {
    fn default() -> Self {
        Self {
            acl: vec![
                AclList {
                    name: "lan".to_string(),
                    default_allow: true,
                    allow: vec![
                        "192.168.0.0/16".to_string(),
                        "10.0.0.0/8".to_string(),
                        "172.16.0.0/12".to_string(),
                    ],
                },
                AclList {
                    name: "loopback.auto".to_string(),
                    default_allow: true,
                    allow: Vec::new(),
                },
            ],
        }
    }
}

impl StaticConfigurationSource {
    pub fn new(acl: Vec<AclList>) -> Self {
        Self { acl }
    }

    fn acl_document(&self) -> String {
        let lists: String = self.acl.iter().map(AclList::render).collect();
        let body = format!(
            "    <configuration name=\"acl.conf\" description=\"Network Lists\">\n      <network-lists>\n{}      </network-lists>\n    </configuration>\n",
            lists
        );
        envelope("configuration", &body)
    }
}

impl ConfigurationSource for StaticConfigurationSource {
    fn document(&self, name: &str, _hostname: &str) -> Option<String> {
        match name {
            "acl.conf" => Some(self.acl_document()),
            _ => None,
        }
    }
}

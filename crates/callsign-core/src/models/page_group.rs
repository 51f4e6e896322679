//! Paging group model

use serde::{Deserialize, Serialize};

/// Extensions paged together with auto-answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PageGroup {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub extensions: Vec<String>,
}

impl PageGroup {
    /// Comma-joined dial string reaching every member at once
    pub fn dial_string(&self, domain: &str) -> String {
        let legs = self
            .extensions
            .iter()
            .map(|ext| format!("user/{}@{}", ext, domain))
            .collect::<Vec<_>>()
            .join(",");
        format!("{{ignore_early_media=true}}{}", legs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dial_string() {
        let group = PageGroup {
            extensions: vec!["1001".into(), "1002".into()],
            ..Default::default()
        };
        assert_eq!(
            group.dial_string("acme.example.com"),
            "{ignore_early_media=true}user/1001@acme.example.com,user/1002@acme.example.com"
        );
    }
}

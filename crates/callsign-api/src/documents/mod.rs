//! Switch XML documents
//!
//! Builders return complete `freeswitch/xml` documents as strings. A lookup
//! that produces nothing is answered with [`not_found`], which makes the
//! switch fall back to its static configuration.

pub mod configuration;
pub mod dialplan;
pub mod directory;

pub use configuration::{ConfigurationSource, StaticConfigurationSource};

pub(crate) const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;

/// Document telling the switch the lookup has no dynamic answer
pub fn not_found() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<document type="freeswitch/xml">
  <section name="result">
    <result status="not found"/>
  </section>
</document>"#
        .to_string()
}

/// Escape text for use in an attribute value
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap one section body in the document envelope
pub(crate) fn envelope(section: &str, body: &str) -> String {
    format!(
        "{XML_HEADER}\n<document type=\"freeswitch/xml\">\n  <section name=\"{section}\">\n{body}  </section>\n</document>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"Tom & "Jerry" <x>"#), "Tom &amp; &#34;Jerry&#34; &lt;x&gt;");
        assert_eq!(escape("plain"), "plain");
    }

    #[test]
    fn test_not_found_document() {
        let doc = not_found();
        assert!(doc.contains(r#"<result status="not found"/>"#));
    }
}

//! Directory (user) documents

use callsign_core::models::Extension;

use super::{envelope, escape};

/// Lifetime the switch may keep the user entry in its own cache, in ms
const USER_CACHEABLE_MS: u32 = 60_000;

/// Digest credential `md5(user:realm:password)` so the password never leaves
pub fn a1_hash(user: &str, realm: &str, password: &str) -> String {
    format!("{:x}", md5::compute(format!("{}:{}:{}", user, realm, password)))
}

fn param(name: &str, value: &str) -> String {
    format!(
        "                <param name=\"{}\" value=\"{}\"/>\n",
        name,
        escape(value)
    )
}

fn variable(name: &str, value: &str) -> String {
    format!(
        "                <variable name=\"{}\" value=\"{}\"/>\n",
        name,
        escape(value)
    )
}

/// Directory document for one extension of `domain`
pub fn user_document(ext: &Extension, domain: &str) -> String {
    let mut params = param("a1-hash", &a1_hash(&ext.extension, domain, &ext.password));
    if ext.voicemail_enabled {
        params.push_str(&param("vm-enabled", "true"));
    }
    if ext.max_registrations > 0 {
        params.push_str(&param(
            "max-registrations-per-extension",
            &ext.max_registrations.to_string(),
        ));
    }

    let mut vars = String::new();
    vars.push_str(&variable("extension_uuid", &ext.uuid.to_string()));
    vars.push_str(&variable("extension", &ext.extension));
    vars.push_str(&variable("domain_name", domain));
    vars.push_str(&variable("user_context", ext.context()));
    let caller_ids = [
        ("effective_caller_id_name", &ext.effective_caller_id_name),
        ("effective_caller_id_number", &ext.effective_caller_id_number),
        ("outbound_caller_id_name", &ext.outbound_caller_id_name),
        ("outbound_caller_id_number", &ext.outbound_caller_id_number),
    ];
    for (name, value) in caller_ids {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            vars.push_str(&variable(name, value));
        }
    }
    vars.push_str(&variable("call_timeout", &ext.call_timeout.to_string()));
    if ext.forward_all_enabled {
        vars.push_str(&variable("forward_all_enabled", "true"));
        if let Some(dest) = ext.forward_all_destination.as_deref() {
            vars.push_str(&variable("forward_all_destination", dest));
        }
    }
    if ext.do_not_disturb {
        vars.push_str(&variable("do_not_disturb", "true"));
    }
    if ext.record_inbound {
        vars.push_str(&variable("record_inbound", "true"));
    }
    if ext.record_outbound {
        vars.push_str(&variable("record_outbound", "true"));
    }

    let body = format!(
        r#"    <domain name="{domain}">
      <params>
        <param name="dial-string" value="{{presence_id=${{dialed_user}}@${{dialed_domain}}}}${{sofia_contact(${{dialed_user}}@${{dialed_domain}})}}"/>
      </params>
      <groups>
        <group name="default">
          <users>
            <user id="{user}" cacheable="{USER_CACHEABLE_MS}">
              <params>
{params}              </params>
              <variables>
{vars}              </variables>
            </user>
          </users>
        </group>
      </groups>
    </domain>
"#,
        domain = escape(domain),
        user = escape(&ext.extension),
    );
    envelope("directory", &body)
}

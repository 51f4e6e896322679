//! Dialplan documents
//!
//! Every enabled feature code becomes one `fc_<name>` extension whose actions
//! tag the channel and hand it to the feature code socket.

use callsign_core::models::FeatureCode;

use super::{envelope, escape};

fn extension_xml(code: &FeatureCode, socket_addr: &str) -> String {
    format!(
        r#"      <extension name="fc_{name}" continue="false">
        <condition field="destination_number" expression="{expression}">
          <action application="set" data="feature_code_uuid={uuid}"/>
          <action application="set" data="feature_code_action={action}"/>
          <action application="socket" data="{socket} async full"/>
        </condition>
      </extension>
"#,
        name = escape(&code.name),
        expression = escape(&code.dialplan_expression()),
        uuid = code.uuid,
        action = code.action,
        socket = escape(socket_addr),
    )
}

/// Context document routing `codes` to the socket at `socket_addr`;
/// `None` when there is nothing to route
pub fn feature_code_document(
    context: &str,
    codes: &[FeatureCode],
    socket_addr: &str,
) -> Option<String> {
    if codes.is_empty() {
        return None;
    }

    let extensions: String = codes
        .iter()
        .map(|code| extension_xml(code, socket_addr))
        .collect();
    let body = format!(
        "    <context name=\"{}\">\n      <!-- Feature Codes -->\n{}    </context>\n",
        escape(context),
        extensions
    );
    Some(envelope("dialplan", &body))
}

//! Basic call control: bridge the caller to a local user

use async_trait::async_trait;
use callsign_core::AppResult;
use callsign_esl::events::{CHANNEL_BRIDGE, CHANNEL_HANGUP_COMPLETE};
use callsign_esl::{CallChannel, CallHandler};
use tracing::{info, warn};

#[derive(Debug, Default, Clone)]
pub struct CallControlService;

impl CallControlService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CallHandler for CallControlService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        let data = call.data().clone();
        info!(
            uuid = %data.uuid,
            caller = %data.caller_id_number,
            destination = %data.destination,
            domain = %data.domain,
            context = %data.context,
            "Callcontrol: handling call"
        );

        call.set_var("hangup_after_bridge", "true").await?;
        call.set_var("continue_on_fail", "true").await?;
        call.set_var("ringback", "${us-ring}").await?;

        let dial = format!("user/{}@{}", data.destination, data.domain);
        info!(uuid = %data.uuid, dial = %dial, "Bridging");
        call.execute("bridge", &dial).await?;

        let result = loop {
            let event = match call.read_event().await {
                Ok(event) => event,
                Err(e) => {
                    warn!(uuid = %data.uuid, error = %e, "Callcontrol: event stream ended");
                    break String::new();
                }
            };
            match event.event_name() {
                Some(CHANNEL_BRIDGE) => info!(uuid = %data.uuid, "Call bridged"),
                Some(CHANNEL_HANGUP_COMPLETE) => {
                    break event
                        .get_variable("bridge_hangup_cause")
                        .filter(|c| !c.is_empty())
                        .or_else(|| event.hangup_cause())
                        .unwrap_or_default()
                        .to_string();
                }
                _ => {}
            }
        };

        info!(uuid = %data.uuid, result = %result, "Callcontrol: call ended");
        Ok(())
    }
}

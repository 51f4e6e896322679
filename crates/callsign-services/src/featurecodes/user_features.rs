//! Voicemail access and per-user flags: forwarding, DND, recording, and the
//! tenant's day/night call flow

use callsign_core::models::PresenceState;
use callsign_core::AppResult;
use serde_json::json;
use tracing::{info, warn};

use super::{write_failed, ExecutionContext, FeatureCodeService};
use crate::blf;
use crate::prompts::{
    DAY_MODE, DND_ACTIVATED, DND_DEACTIVATED, ENTER_DEST_NUMBER, FORWARD_DISABLED,
    FORWARD_ENABLED, INVALID_SELECTION, NIGHT_MODE, RECORDING_ENABLED,
};

/// Double-beep prompt and up to 20 digits for the forward destination
const FORWARD_READ: &str = "2 20 tone_stream://%(250,50,440);%(250,50,440) forward_dest 10000 #";

const CHECK_OWN_BOX: &str = "*97";
const CHECK_ANY_BOX: &str = "*98";
const FORWARD_ON: &str = "*72";
const DND_ON: &str = "*78";

impl FeatureCodeService {
    /// `*97` opens the caller's box, `*98` lets mod_voicemail prompt for one,
    /// otherwise `action_data` names the box
    pub(super) async fn voicemail(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let arg = match (ctx.code.code.as_str(), ctx.code.data()) {
            (CHECK_OWN_BOX, _) => format!("check default {} {}", ctx.domain, ctx.caller_id),
            (CHECK_ANY_BOX, _) | (_, None) => format!("check default {}", ctx.domain),
            (_, Some(mailbox)) => format!("check default {} {}", ctx.domain, mailbox),
        };
        ctx.call.execute("voicemail", &arg).await?;
        Ok(())
    }

    fn enables(ctx: &ExecutionContext<'_>, enabling_code: &str) -> bool {
        ctx.code.code == enabling_code || ctx.code.data() == Some("enable")
    }

    pub(super) async fn call_forward(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        if !Self::enables(ctx, FORWARD_ON) {
            self.repos
                .extensions
                .set_forward(ctx.tenant_id, &ctx.caller_id, false, None)
                .await
                .map_err(|e| write_failed(ctx, "call forward", e))?;

            self.effects.invalidate_directory(&ctx.domain).await;
            blf::notify_forward_change(ctx.call, &ctx.caller_id, &ctx.domain, false, None).await?;
            self.effects.publish(
                "call_forward",
                ctx.tenant_id,
                json!({ "extension": ctx.caller_id, "enabled": false }),
            );
            info!(uuid = %ctx.uuid, caller = %ctx.caller_id, "Call forward disabled");
            return ctx.call.playback(FORWARD_DISABLED).await;
        }

        ctx.call.playback(ENTER_DEST_NUMBER).await?;
        let reply = ctx.call.execute("read", FORWARD_READ).await?;
        let Some(destination) = reply
            .get_variable("forward_dest")
            .filter(|d| !d.is_empty())
            .map(str::to_string)
        else {
            info!(uuid = %ctx.uuid, caller = %ctx.caller_id, "No forward destination entered");
            return Ok(());
        };

        self.repos
            .extensions
            .set_forward(ctx.tenant_id, &ctx.caller_id, true, Some(destination.clone()))
            .await
            .map_err(|e| write_failed(ctx, "call forward", e))?;

        self.effects.invalidate_directory(&ctx.domain).await;
        self.record_presence(ctx.tenant_id, &ctx.caller_id, PresenceState::Forwarded)
            .await;
        blf::notify_forward_change(
            ctx.call,
            &ctx.caller_id,
            &ctx.domain,
            true,
            Some(&destination),
        )
        .await?;
        self.effects.publish(
            "call_forward",
            ctx.tenant_id,
            json!({ "extension": ctx.caller_id, "enabled": true, "destination": destination }),
        );

        info!(uuid = %ctx.uuid, caller = %ctx.caller_id, destination = %destination, "Call forward enabled");
        ctx.call.playback(FORWARD_ENABLED).await
    }

    pub(super) async fn dnd(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let enable = Self::enables(ctx, DND_ON);

        self.repos
            .extensions
            .set_dnd(ctx.tenant_id, &ctx.caller_id, enable)
            .await
            .map_err(|e| write_failed(ctx, "DND", e))?;

        let state = if enable {
            PresenceState::Dnd
        } else {
            PresenceState::Available
        };
        self.record_presence(ctx.tenant_id, &ctx.caller_id, state).await;
        self.effects.invalidate_directory(&ctx.domain).await;
        blf::notify_dnd_change(ctx.call, &ctx.caller_id, &ctx.domain, enable).await?;
        self.effects.publish(
            "presence",
            ctx.tenant_id,
            json!({ "extension": ctx.caller_id, "state": state, "dnd": enable }),
        );

        info!(uuid = %ctx.uuid, caller = %ctx.caller_id, enabled = enable, "DND toggled");
        let prompt = if enable { DND_ACTIVATED } else { DND_DEACTIVATED };
        ctx.call.playback(prompt).await
    }

    /// Advance the tenant's call flow toggled by this code
    pub(super) async fn call_flow_toggle(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let target = ctx.code.data().map(str::to_string);
        let flow = self
            .repos
            .call_flows
            .find_for_code(ctx.tenant_id, &ctx.code.code, target)
            .await?;
        let Some(flow) = flow else {
            warn!(uuid = %ctx.uuid, code = %ctx.code.code, "No call flow for code");
            return ctx.call.playback(INVALID_SELECTION).await;
        };

        let next = flow.next_state();
        self.repos
            .call_flows
            .set_state(flow.id, next)
            .await
            .map_err(|e| write_failed(ctx, "call flow", e))?;

        self.effects.invalidate_dialplan(&ctx.domain).await;
        let lamp_code = flow.feature_code.clone().unwrap_or_else(|| ctx.code.code.clone());
        let alternate = next > 0;
        blf::notify_call_flow_change(ctx.call, &lamp_code, &ctx.domain, alternate).await?;
        self.effects.publish(
            "call_flow",
            ctx.tenant_id,
            json!({ "id": flow.id, "name": flow.name, "state": next }),
        );

        info!(uuid = %ctx.uuid, flow = %flow.name, state = next, "Call flow toggled");
        let prompt = if alternate { NIGHT_MODE } else { DAY_MODE };
        ctx.call.playback(prompt).await
    }

    pub(super) async fn record(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        self.repos
            .extensions
            .enable_recording(ctx.tenant_id, &ctx.caller_id)
            .await
            .map_err(|e| write_failed(ctx, "recording", e))?;
        self.effects.invalidate_directory(&ctx.domain).await;
        ctx.call.playback(RECORDING_ENABLED).await
    }

    /// Presence rows are secondary to the flag itself; a failure only logs
    async fn record_presence(&self, tenant_id: i64, extension: &str, state: PresenceState) {
        if let Err(e) = self.repos.presence.update(tenant_id, extension, state).await {
            warn!(extension = %extension, state = %state, error = %e, "Presence row update failed");
        }
    }
}

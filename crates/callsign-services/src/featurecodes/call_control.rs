//! Pickup, intercom, paging, speed dial and transfer

use callsign_core::AppResult;
use tracing::{info, warn};

use super::{ExecutionContext, FeatureCodeService};
use crate::prompts::{ENTER_EXT, INVALID_SELECTION};

const GROUP_PICKUP: &str = "*8";

/// Headers that make the callee's phone answer on its own
const AUTO_ANSWER: [&str; 2] = [
    "sip_auto_answer=true",
    "sip_h_Alert-Info=<http://0.0.0.0>;info=alert-autoanswer;delay=0",
];
const ANSWER_AFTER: &str = "sip_h_Call-Info=<sip:0.0.0.0>;answer-after=0";

impl FeatureCodeService {
    async fn prompt_extension(ctx: &mut ExecutionContext<'_>) -> AppResult<Option<String>> {
        ctx.call.playback(ENTER_EXT).await?;
        ctx.call.read_digits(2, 6, "ext", 5000).await
    }

    /// Directed pickup from a capture, group pickup for `*8`, otherwise
    /// prompt for the ringing extension
    pub(super) async fn pickup(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let captured = ctx
            .capture("ext")
            .or_else(|| ctx.capture("1"))
            .map(str::to_string);

        let target = match captured {
            Some(ext) => Some(ext),
            None if ctx.code.code == GROUP_PICKUP || ctx.code.data() == Some("group") => {
                let arg = format!("{}@{}", ctx.caller_id, ctx.domain);
                ctx.call.execute("pickup", &arg).await?;
                info!(uuid = %ctx.uuid, caller = %ctx.caller_id, "Group pickup");
                return Ok(());
            }
            None => Self::prompt_extension(ctx).await?,
        };

        if let Some(ext) = target {
            let arg = format!("-bleg {}@{}", ext, ctx.domain);
            ctx.call.execute("intercept", &arg).await?;
            info!(uuid = %ctx.uuid, target = %ext, "Directed pickup");
        }
        Ok(())
    }

    pub(super) async fn intercom(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let target = match ctx.parameter("ext") {
            Some(ext) => Some(ext),
            None => Self::prompt_extension(ctx).await?,
        };
        let Some(ext) = target else {
            return Ok(());
        };

        for header in AUTO_ANSWER.iter().chain([ANSWER_AFTER].iter()) {
            ctx.call.execute("set", header).await?;
        }
        let dial = format!("user/{}@{}", ext, ctx.domain);
        ctx.call.execute("bridge", &dial).await?;
        info!(uuid = %ctx.uuid, target = %ext, "Intercom call");
        Ok(())
    }

    /// Page every member of the code's group at once
    pub(super) async fn page_group(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let group_id = ctx.code.group_id.or_else(|| {
            ctx.parameter("group")
                .and_then(|g| g.parse::<i64>().ok())
        });
        let group = match group_id {
            Some(id) => self.repos.page_groups.find(ctx.tenant_id, id).await?,
            None => None,
        };
        let Some(group) = group else {
            warn!(uuid = %ctx.uuid, group = ?group_id, "Page group not found");
            return ctx.call.playback(INVALID_SELECTION).await;
        };

        for header in AUTO_ANSWER {
            ctx.call.execute("set", header).await?;
        }
        if group.extensions.is_empty() {
            warn!(uuid = %ctx.uuid, group = %group.name, "Page group has no members");
            return Ok(());
        }
        let dial = group.dial_string(&ctx.domain);
        ctx.call.execute("bridge", &dial).await?;
        info!(uuid = %ctx.uuid, group = %group.name, members = group.extensions.len(), "Paging group");
        Ok(())
    }

    /// `action_data` is either a full dial string (`sofia/...`, `user/...`)
    /// that gets bridged, or a number transferred within the domain
    pub(super) async fn speed_dial(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(target) = ctx.code.data().map(|d| ctx.expand(d)) else {
            warn!(uuid = %ctx.uuid, code = %ctx.code.code, "Speed dial without destination");
            return ctx.call.playback(INVALID_SELECTION).await;
        };

        if target.contains('/') {
            ctx.call.execute("bridge", &target).await?;
        } else {
            let arg = format!("{} XML {}", target, ctx.domain);
            ctx.call.execute("transfer", &arg).await?;
        }
        info!(uuid = %ctx.uuid, target = %target, "Speed dial");
        Ok(())
    }

    pub(super) async fn transfer(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(dest) = ctx
            .code
            .transfer_dest
            .as_deref()
            .filter(|d| !d.is_empty())
            .map(|d| ctx.expand(d))
        else {
            warn!(uuid = %ctx.uuid, code = %ctx.code.code, "Transfer without destination");
            return Ok(());
        };
        let context = ctx
            .code
            .transfer_context
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| ctx.domain.clone());

        let arg = format!("{} XML {}", dest, context);
        ctx.call.execute("transfer", &arg).await?;
        Ok(())
    }
}

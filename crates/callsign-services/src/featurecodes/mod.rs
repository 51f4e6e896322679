//! Feature code execution engine
//!
//! The dialplan routes every dialed star code to this listener. The engine
//! resolves exactly one [`FeatureCode`] for the dialed string and runs its
//! action on the call:
//!
//! 1. Candidates are the tenant's enabled codes plus the global ones,
//!    evaluated by ascending `order` (a tenant code wins a tie with a
//!    global one).
//! 2. The first code whose regular expression, literal code or alias matches
//!    is selected. Regex captures become action parameters.
//! 3. The action runs through one exhaustive `match` on [`FeatureAction`].
//!
//! Flag changes (forwarding, DND, call flow state) are written first; cache
//! invalidation and lamp updates follow only when the write succeeded.
//!
//! Every call ends with `hangup NORMAL_CLEARING`. Unknown codes and failed
//! actions play the invalid-selection prompt first.

mod call_control;
mod custom;
mod park;
mod user_features;

use async_trait::async_trait;
use callsign_core::models::{CodeMatch, FeatureAction, FeatureCode};
use callsign_core::{AppError, AppResult};
use callsign_esl::{CallChannel, CallHandler};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::causes::NORMAL_CLEARING;
use crate::effects::SideEffects;
use crate::prompts::INVALID_SELECTION;
use crate::Repositories;

/// Everything an action needs about the call being served
pub struct ExecutionContext<'a> {
    pub call: &'a mut dyn CallChannel,
    pub code: FeatureCode,
    pub captures: CodeMatch,
    pub caller_id: String,
    pub caller_name: String,
    pub domain: String,
    pub tenant_id: i64,
    pub uuid: String,
}

impl ExecutionContext<'_> {
    /// Non-empty capture by name
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name)
    }

    /// Named capture, else the first positional capture, else `action_data`
    pub fn parameter(&self, name: &str) -> Option<String> {
        self.capture(name)
            .or_else(|| self.capture("1"))
            .or_else(|| self.code.data())
            .map(str::to_string)
    }

    /// Substitute `${caller_id}`, `${caller_name}`, `${domain}`, `${code}`,
    /// `${uuid}`, `${tenant_id}` and every capture into `template`
    pub fn expand(&self, template: &str) -> String {
        let mut out = template
            .replace("${caller_id}", &self.caller_id)
            .replace("${caller_name}", &self.caller_name)
            .replace("${domain}", &self.domain)
            .replace("${code}", &self.code.code)
            .replace("${uuid}", &self.uuid)
            .replace("${tenant_id}", &self.tenant_id.to_string());
        for (name, value) in &self.captures.captures {
            out = out.replace(&format!("${{{}}}", name), value);
        }
        out
    }
}

/// Pick the first candidate that matches `dialed`
///
/// Disabled codes are skipped. Candidates are ordered by weight with tenant
/// codes ahead of global ones on equal weight; the sort is stable so the
/// repository's order breaks any remaining tie.
pub fn select_code(
    mut candidates: Vec<FeatureCode>,
    dialed: &str,
) -> Option<(FeatureCode, CodeMatch)> {
    candidates.retain(|fc| fc.enabled);
    candidates.sort_by_key(|fc| (fc.order, fc.tenant_id.is_none()));
    candidates
        .into_iter()
        .find_map(|fc| fc.matches_dialed(dialed).map(|m| (fc, m)))
}

/// Listener for dialed feature codes
pub struct FeatureCodeService {
    repos: Repositories,
    effects: SideEffects,
    http: reqwest::Client,
}

impl FeatureCodeService {
    pub fn new(
        repos: Repositories,
        effects: SideEffects,
        webhook_timeout: Duration,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("webhook client: {}", e)))?;
        Ok(Self {
            repos,
            effects,
            http,
        })
    }

    /// Resolve the code a tenant's caller dialed
    pub async fn resolve(&self, tenant_id: i64, dialed: &str) -> AppResult<(FeatureCode, CodeMatch)> {
        let candidates = self.repos.feature_codes.find_candidates(tenant_id).await?;
        select_code(candidates, dialed).ok_or_else(|| AppError::FeatureCodeNotFound(dialed.to_string()))
    }

    /// Run the matched code's action
    pub async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        info!(
            uuid = %ctx.uuid,
            code = %ctx.code.code,
            action = %ctx.code.action,
            "Executing feature code"
        );

        match ctx.code.action {
            FeatureAction::Voicemail => self.voicemail(ctx).await,
            FeatureAction::CallForward => self.call_forward(ctx).await,
            FeatureAction::Dnd => self.dnd(ctx).await,
            FeatureAction::CallFlowToggle => self.call_flow_toggle(ctx).await,
            FeatureAction::Record => self.record(ctx).await,
            FeatureAction::Park => self.park(ctx).await,
            FeatureAction::ParkSlot => self.park_slot(ctx).await,
            FeatureAction::ParkRetrieve => self.park_retrieve(ctx).await,
            FeatureAction::Pickup => self.pickup(ctx).await,
            FeatureAction::Intercom => self.intercom(ctx).await,
            FeatureAction::PageGroup => self.page_group(ctx).await,
            FeatureAction::SpeedDial => self.speed_dial(ctx).await,
            FeatureAction::Transfer => self.transfer(ctx).await,
            FeatureAction::Webhook => self.webhook(ctx).await,
            FeatureAction::Lua => self.lua(ctx).await,
            FeatureAction::Custom => self.custom(ctx).await,
        }
    }
}

/// Log a failed flag write; cache and lamps stay untouched so observers keep
/// seeing the stored state
fn write_failed(ctx: &ExecutionContext<'_>, what: &str, err: AppError) -> AppError {
    error!(
        uuid = %ctx.uuid,
        caller = %ctx.caller_id,
        domain = %ctx.domain,
        error = %err,
        "{} update failed, skipping cache invalidation and presence notify",
        what
    );
    err
}

#[async_trait]
impl CallHandler for FeatureCodeService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        let data = call.data().clone();
        info!(
            uuid = %data.uuid,
            caller = %data.caller_id_number,
            code = %data.destination,
            domain = %data.domain,
            "Processing feature code"
        );

        call.answer().await?;

        match self.resolve(data.tenant_id, &data.destination).await {
            Ok((code, captures)) => {
                let mut ctx = ExecutionContext {
                    call: &mut *call,
                    code,
                    captures,
                    caller_id: data.caller_id_number.clone(),
                    caller_name: data.caller_id_name.clone(),
                    domain: data.domain.clone(),
                    tenant_id: data.tenant_id,
                    uuid: data.uuid.clone(),
                };
                if let Err(err) = self.execute(&mut ctx).await {
                    if err.is_connection_lost() {
                        return Err(err);
                    }
                    error!(uuid = %data.uuid, code = %data.destination, error = %err, "Feature code failed");
                    ctx.call.playback(INVALID_SELECTION).await?;
                }
            }
            Err(AppError::FeatureCodeNotFound(code)) => {
                warn!(uuid = %data.uuid, code = %code, "Feature code not found");
                call.playback(INVALID_SELECTION).await?;
            }
            Err(err) => {
                error!(uuid = %data.uuid, code = %data.destination, error = %err, "Feature code lookup failed");
                call.playback(INVALID_SELECTION).await?;
            }
        }

        call.hangup(NORMAL_CLEARING).await
    }
}

//! Webhook, Lua and raw application actions

use callsign_core::AppResult;
use reqwest::Method;
use tracing::{error, info, warn};

use super::{ExecutionContext, FeatureCodeService};
use crate::prompts::{CONFIRM_TONE, ERROR};

impl FeatureCodeService {
    /// Call the configured URL; a 2xx answer plays the confirmation tone
    pub(super) async fn webhook(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(template) = ctx.code.webhook_url.as_deref().filter(|u| !u.is_empty()) else {
            warn!(uuid = %ctx.uuid, code = %ctx.code.code, "Webhook without URL");
            return Ok(());
        };
        let url = ctx.expand(template);

        let method_name = ctx
            .code
            .webhook_method
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let method = match Method::from_bytes(method_name.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                error!(uuid = %ctx.uuid, method = %method_name, error = %e, "Invalid webhook method");
                return Ok(());
            }
        };

        let prompt = match self.http.request(method, &url).send().await {
            Ok(response) if response.status().is_success() => {
                info!(uuid = %ctx.uuid, url = %url, status = %response.status(), "Webhook called");
                CONFIRM_TONE
            }
            Ok(response) => {
                warn!(uuid = %ctx.uuid, url = %url, status = %response.status(), "Webhook rejected");
                ERROR
            }
            Err(e) => {
                error!(uuid = %ctx.uuid, url = %url, error = %e, "Webhook call failed");
                ERROR
            }
        };
        ctx.call.playback(prompt).await
    }

    /// Export caller details and captures as `fc_*` variables, then run the script
    pub(super) async fn lua(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(script) = ctx.code.lua_script.clone().filter(|s| !s.is_empty()) else {
            warn!(uuid = %ctx.uuid, code = %ctx.code.code, "Lua action without script");
            return Ok(());
        };

        let mut vars = vec![
            format!("fc_caller_id={}", ctx.caller_id),
            format!("fc_domain={}", ctx.domain),
            format!("fc_code={}", ctx.code.code),
        ];
        let mut captures: Vec<_> = ctx.captures.captures.iter().collect();
        captures.sort();
        vars.extend(
            captures
                .into_iter()
                .map(|(k, v)| format!("fc_capture_{}={}", k, v)),
        );

        for var in &vars {
            ctx.call.execute("set", var).await?;
        }
        ctx.call.execute("lua", &script).await?;
        Ok(())
    }

    /// `action_data` holds `app data|app data|...`, run in order
    pub(super) async fn custom(&self, ctx: &mut ExecutionContext<'_>) -> AppResult<()> {
        let Some(data) = ctx.code.data() else {
            return Ok(());
        };

        let steps: Vec<(String, String)> = data
            .split('|')
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .map(|step| {
                let step = ctx.expand(step);
                match step.split_once(' ') {
                    Some((app, arg)) => (app.to_string(), arg.to_string()),
                    None => (step, String::new()),
                }
            })
            .collect();

        for (app, arg) in &steps {
            ctx.call.execute(app, arg).await?;
        }
        Ok(())
    }
}

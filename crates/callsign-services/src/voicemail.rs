//! Voicemail deposit and retrieval
//!
//! Deposits are recorded by this service and stored through the
//! [`VoicemailRepository`](callsign_core::traits::VoicemailRepository).
//! Retrieval hands the caller to the switch's own `voicemail` application.

use async_trait::async_trait;
use callsign_core::models::NewVoicemailMessage;
use callsign_core::AppResult;
use callsign_esl::{CallChannel, CallHandler, ChannelData};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::blf::notify_voicemail_change;
use crate::prompts::{
    VM_GOODBYE, VM_MAILBOX_FULL, VM_NOT_AVAILABLE, VM_PERSON, VM_RECORD_MESSAGE,
};
use crate::Repositories;

/// Recordings shorter than this are discarded
const MIN_MESSAGE_SECS: i32 = 3;
const SILENCE_THRESHOLD: u32 = 100;
const SILENCE_HITS: u32 = 5;

pub struct VoicemailService {
    repos: Repositories,
    recording_dir: PathBuf,
}

impl VoicemailService {
    pub fn new(repos: Repositories, recording_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos,
            recording_dir: recording_dir.into(),
        }
    }

    /// `<dir>/<tenant>/<extension>/<uuid>.wav`
    pub fn recording_path(&self, tenant_id: i64, extension: &str, uuid: &str) -> PathBuf {
        self.recording_dir
            .join(tenant_id.to_string())
            .join(extension)
            .join(format!("{}.wav", uuid))
    }

    fn is_check(data: &ChannelData) -> bool {
        data.variable("voicemail_action") == Some("check")
            || data.destination == "*97"
            || data.destination == "*98"
    }

    async fn check(&self, call: &mut dyn CallChannel, data: &ChannelData) -> AppResult<()> {
        let arg = format!("check default {} {}", data.domain, data.caller_id_number);
        call.execute("voicemail", &arg).await?;
        Ok(())
    }

    async fn deposit(&self, call: &mut dyn CallChannel, data: &ChannelData) -> AppResult<()> {
        let extension = data.destination.as_str();
        let mailbox = match self.repos.voicemail.find_box(data.tenant_id, extension).await {
            Ok(Some(mailbox)) => mailbox,
            Ok(None) => {
                warn!(uuid = %data.uuid, extension = %extension, "Voicemail box not found");
                return call.playback(VM_NOT_AVAILABLE).await;
            }
            Err(e) => {
                error!(uuid = %data.uuid, extension = %extension, error = %e, "Voicemail box lookup failed");
                return call.playback(VM_NOT_AVAILABLE).await;
            }
        };

        if mailbox.is_full() {
            info!(uuid = %data.uuid, extension = %extension, "Voicemail box is full");
            return call.playback(VM_MAILBOX_FULL).await;
        }

        match mailbox.greeting_path.as_deref().filter(|p| !p.is_empty()) {
            Some(greeting) if file_exists(Path::new(greeting)).await => {
                call.playback(greeting).await?;
            }
            _ => {
                call.playback(VM_PERSON).await?;
                call.execute("say", &format!("en number iterated {}", extension))
                    .await?;
                call.playback(VM_NOT_AVAILABLE).await?;
            }
        }
        if !mailbox.skip_instructions {
            call.playback(VM_RECORD_MESSAGE).await?;
        }

        let path = self.recording_path(mailbox.tenant_id, &mailbox.extension, &data.uuid);
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "Could not create voicemail directory");
            }
        }

        let recorded_at = Utc::now();
        let started = Instant::now();
        let arg = format!(
            "{} {} {} {}",
            path.display(),
            mailbox.record_limit_secs(),
            SILENCE_THRESHOLD,
            SILENCE_HITS
        );
        let complete = call.execute("record", &arg).await?;
        let duration_secs = complete
            .get_variable("record_seconds")
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or_else(|| started.elapsed().as_secs() as i32);

        if duration_secs < MIN_MESSAGE_SECS {
            info!(uuid = %data.uuid, seconds = duration_secs, "Recording too short, discarding");
            let _ = tokio::fs::remove_file(&path).await;
            return Ok(());
        }

        let file_size = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len() as i64)
            .unwrap_or(0);
        let message = NewVoicemailMessage {
            box_id: mailbox.id,
            tenant_id: mailbox.tenant_id,
            caller_id_name: data.caller_id_name.clone(),
            caller_id_number: data.caller_id_number.clone(),
            duration_secs,
            file_path: path.display().to_string(),
            file_size,
            recorded_at,
            channel_uuid: data.uuid.clone(),
        };

        match self.repos.voicemail.save_message(&message).await {
            Ok(()) => {
                info!(uuid = %data.uuid, extension = %extension, seconds = duration_secs, "Voicemail saved");
                if let Err(e) =
                    notify_voicemail_change(call, &mailbox.extension, &data.domain, true).await
                {
                    warn!(uuid = %data.uuid, error = %e, "Voicemail lamp update failed");
                }
            }
            Err(e) => {
                error!(uuid = %data.uuid, extension = %extension, error = %e, "Failed to save voicemail message");
            }
        }

        call.playback(VM_GOODBYE).await
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

#[async_trait]
impl CallHandler for VoicemailService {
    async fn handle_call(&self, call: &mut dyn CallChannel) -> AppResult<()> {
        let data = call.data().clone();
        let check = Self::is_check(&data);
        info!(
            uuid = %data.uuid,
            caller = %data.caller_id_number,
            extension = %data.destination,
            domain = %data.domain,
            action = if check { "check" } else { "deposit" },
            "Voicemail: handling request"
        );

        call.answer().await?;
        if check {
            self.check(call, &data).await?;
        } else {
            self.deposit(call, &data).await?;
        }
        call.hangup("").await
    }
}

//! ESL event parsing and representation
//!
//! Every frame read from an event socket (auth requests, command replies,
//! API responses and events) is represented as an [`EslEvent`]. Plain events
//! arrive wrapped in a `text/event-plain` envelope whose body carries the
//! actual event headers; [`EslEvent::from_frame`] unwraps them.

use crate::constants::{
    CONTENT_TYPE_API, CONTENT_TYPE_AUTH, CONTENT_TYPE_DISCONNECT, CONTENT_TYPE_EVENT,
    CONTENT_TYPE_REPLY,
};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;

/// ESL Event structure
///
/// Headers are URL-decoded on parse. Header names are case sensitive, as
/// FreeSWITCH emits them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EslEvent {
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl EslEvent {
    /// Create a new empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an ESL event from raw text
    ///
    /// ```text
    /// Header-Name: value
    /// Another-Header: another value
    ///
    /// Optional body content
    /// ```
    pub fn parse(raw: &str) -> Self {
        let mut headers = HashMap::new();
        let mut in_body = false;
        let mut body_lines = Vec::new();

        for line in raw.lines() {
            if in_body {
                body_lines.push(line);
                continue;
            }

            // Empty line separates headers from body
            if line.trim().is_empty() {
                if !headers.is_empty() {
                    in_body = true;
                }
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_string();
                let value = value.trim();
                let decoded = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                headers.insert(key, decoded);
            }
        }

        let body = if body_lines.is_empty() {
            None
        } else {
            Some(body_lines.join("\n"))
        };

        Self { headers, body }
    }

    /// Build an event from a frame's header block and optional body
    ///
    /// `text/event-plain` envelopes are unwrapped so the returned event holds
    /// the inner event headers; the envelope's content type is kept.
    pub fn from_frame(head: &str, body: Option<String>) -> Self {
        let mut frame = Self::parse(head);
        match body {
            Some(body) if frame.content_type() == Some(CONTENT_TYPE_EVENT) => {
                let mut event = Self::parse(&body);
                event
                    .headers
                    .entry("Content-Type".to_string())
                    .or_insert_with(|| CONTENT_TYPE_EVENT.to_string());
                event
            }
            Some(body) => {
                frame.body = Some(body);
                frame
            }
            None => frame,
        }
    }

    /// Builder-style header setter
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get a header value by name
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|s| s.as_str())
    }

    /// Header value, or empty string when absent
    pub fn header(&self, name: &str) -> &str {
        self.get_header(name).unwrap_or("")
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn set_header(&mut self, key: String, value: String) {
        self.headers.insert(key, value);
    }

    pub fn event_name(&self) -> Option<&str> {
        self.get_header("Event-Name")
    }

    /// Leg identifier the event refers to
    pub fn unique_id(&self) -> Option<&str> {
        ["Unique-ID", "Channel-UUID"]
            .into_iter()
            .filter_map(|name| self.get_header(name))
            .find(|v| !v.is_empty())
    }

    pub fn caller_number(&self) -> Option<&str> {
        self.get_header("Caller-Caller-ID-Number")
            .or_else(|| self.get_header("Caller-ANI"))
            .or_else(|| self.get_header("variable_sip_from_user"))
    }

    pub fn caller_name(&self) -> Option<&str> {
        self.get_header("Caller-Caller-ID-Name")
    }

    pub fn destination_number(&self) -> Option<&str> {
        self.get_header("Caller-Destination-Number")
            .or_else(|| self.get_header("variable_sip_to_user"))
    }

    pub fn hangup_cause(&self) -> Option<&str> {
        self.get_header("Hangup-Cause")
            .or_else(|| self.get_header("variable_hangup_cause"))
    }

    pub fn direction(&self) -> Option<&str> {
        self.get_header("Call-Direction")
            .or_else(|| self.get_header("variable_direction"))
    }

    /// `Event-Subclass` of CUSTOM events
    pub fn subclass(&self) -> Option<&str> {
        self.get_header("Event-Subclass")
    }

    /// `Job-UUID` of a bgapi reply or BACKGROUND_JOB event
    pub fn job_uuid(&self) -> Option<&str> {
        self.get_header("Job-UUID")
    }

    /// `Event-Date-Timestamp` (microseconds since the epoch), or now
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.get_header("Event-Date-Timestamp")
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(|micros| Utc.timestamp_micros(micros).single())
            .unwrap_or_else(Utc::now)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    pub fn content_length(&self) -> Option<usize> {
        self.get_header("Content-Length").and_then(|s| s.parse().ok())
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.get_header("Reply-Text")
    }

    pub fn is_command_reply(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_REPLY)
    }

    pub fn is_api_response(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_API)
    }

    /// Command replies and API responses both answer a written command
    pub fn is_reply(&self) -> bool {
        self.is_command_reply() || self.is_api_response()
    }

    pub fn is_auth_request(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_AUTH)
    }

    pub fn is_disconnect_notice(&self) -> bool {
        self.content_type() == Some(CONTENT_TYPE_DISCONNECT)
    }

    pub fn is_event(&self) -> bool {
        self.event_name().is_some()
    }

    /// `Reply-Text` of a command reply, else the body of an API response
    fn outcome(&self) -> Option<&str> {
        self.reply_text().or_else(|| self.body())
    }

    /// Reply starts with `+OK`
    pub fn is_ok(&self) -> bool {
        self.outcome().is_some_and(|t| t.starts_with("+OK"))
    }

    /// Reply starts with `-ERR`
    pub fn is_error(&self) -> bool {
        self.outcome().is_some_and(|t| t.starts_with("-ERR"))
    }

    /// Text after `-ERR`, for failed replies only
    pub fn error_message(&self) -> Option<String> {
        let text = self.outcome().filter(|t| t.starts_with("-ERR"))?;
        Some(text.trim_start_matches("-ERR").trim().to_string())
    }

    /// Channel variable, i.e. the `variable_<name>` header
    pub fn get_variable(&self, name: &str) -> Option<&str> {
        let key = format!("variable_{}", name);
        self.get_header(&key)
    }
}

impl fmt::Display for EslEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self
            .event_name()
            .or_else(|| self.content_type())
            .unwrap_or("frame");
        write!(f, "{}", kind)?;
        if let Some(uuid) = self.unique_id() {
            write!(f, " uuid={}", uuid)?;
        }
        if let (Some(from), Some(to)) = (self.caller_number(), self.destination_number()) {
            write!(f, " {}->{}", from, to)?;
        }
        write!(f, " ({} headers)", self.headers.len())
    }
}

//! Event socket wire framing
//!
//! A frame is a block of `Name: value` lines ended by an empty line,
//! followed by exactly `Content-Length` bytes of body when that header is
//! present. Commands are written as text terminated by an empty line.

use crate::event::EslEvent;
use callsign_core::{AppError, AppResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Read one frame
pub async fn read_frame<R>(reader: &mut R) -> AppResult<EslEvent>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = String::new();
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Err(AppError::EslConnection("connection closed by peer".to_string()));
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            // Stray separators between frames
            if head.is_empty() {
                continue;
            }
            break;
        }

        if let Some(len) = line.strip_prefix("Content-Length:") {
            content_length = len.trim().parse().ok();
        }

        head.push_str(line);
        head.push('\n');
    }

    let body = match content_length {
        Some(len) if len > 0 => {
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            Some(String::from_utf8_lossy(&buf).into_owned())
        }
        _ => None,
    };

    Ok(EslEvent::from_frame(&head, body))
}

/// Read frames until a command reply or API response arrives
///
/// Events received in between are handed to `on_event`.
pub async fn read_reply<R, F>(reader: &mut R, mut on_event: F) -> AppResult<EslEvent>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(EslEvent),
{
    loop {
        let frame = read_frame(reader).await?;
        if frame.is_reply() {
            return Ok(frame);
        }
        if frame.is_disconnect_notice() {
            return Err(AppError::CallHungUp("disconnect notice received".to_string()));
        }
        if frame.is_event() {
            on_event(frame);
        } else {
            debug!(frame = %frame, "Skipping unexpected frame while waiting for reply");
        }
    }
}

/// Write one command followed by the blank-line terminator
pub async fn write_command<W>(writer: &mut W, command: &str) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = String::with_capacity(command.len() + 2);
    payload.push_str(command.trim_end_matches('\n'));
    payload.push_str("\n\n");
    writer.write_all(payload.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_frame_with_body() {
        let raw = b"Content-Type: api/response\nContent-Length: 11\n\n+OK running";
        let mut reader = BufReader::new(&raw[..]);

        let frame = read_frame(&mut reader).await.unwrap();
        assert!(frame.is_api_response());
        assert_eq!(frame.body(), Some("+OK running"));
    }

    #[tokio::test]
    async fn test_read_frames_back_to_back() {
        let event_body = "Event-Name: HEARTBEAT\nCore-UUID: x\n\n";
        let raw = format!(
            "Content-Type: command/reply\r\nReply-Text: +OK accepted\r\n\r\nContent-Length: {}\nContent-Type: text/event-plain\n\n{}",
            event_body.len(),
            event_body
        );
        let mut reader = BufReader::new(raw.as_bytes());

        let reply = read_frame(&mut reader).await.unwrap();
        assert!(reply.is_command_reply());
        assert!(reply.is_ok());

        let event = read_frame(&mut reader).await.unwrap();
        assert_eq!(event.event_name(), Some("HEARTBEAT"));
        assert_eq!(event.header("Core-UUID"), "x");
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_connection_error() {
        let mut reader = BufReader::new(&b"Content-Type: command/reply\n"[..]);
        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(err.is_connection_lost());
    }

    #[tokio::test]
    async fn test_read_reply_collects_interleaved_events() {
        let event_body = "Event-Name: CHANNEL_STATE\nUnique-ID: u1\n\n";
        let raw = format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}Content-Type: command/reply\nReply-Text: +OK\n\n",
            event_body.len(),
            event_body
        );
        let mut reader = BufReader::new(raw.as_bytes());
        let mut seen = Vec::new();

        let reply = read_reply(&mut reader, |ev| seen.push(ev)).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].unique_id(), Some("u1"));
    }

    #[tokio::test]
    async fn test_write_command_terminates_with_blank_line() {
        let mut out: Vec<u8> = Vec::new();
        write_command(&mut out, "api status").await.unwrap();
        assert_eq!(out, b"api status\n\n");
    }
}

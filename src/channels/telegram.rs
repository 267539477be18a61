//! Telegram channel — long-polls the Bot API for group messages.
//!
//! Also serves as the avatar source (profile photos) and the artifact
//! publisher (cards are posted to the review chat with `sendPhoto`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::cards::RenderedImage;
use crate::channels::{
    ArtifactPublisher, AvatarSource, Channel, IncomingMessage, MessageStream, OutgoingResponse,
};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Long-poll timeout passed to getUpdates, in seconds.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Updates held between the poller and the monitor before polling pauses.
const UPDATE_BUFFER: usize = 64;

/// Preferred avatar edge; the smallest photo size at least this wide is used.
const AVATAR_MIN_EDGE: i64 = 128;

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    /// Chat ids to watch; `*` watches every chat the bot is in.
    watched_chats: Vec<String>,
    review_chat_id: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, watched_chats: Vec<String>, review_chat_id: String) -> Self {
        Self {
            bot_token,
            watched_chats,
            review_chat_id,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        api_url(self.bot_token.expose_secret(), method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{file_path}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if a chat is in the watched list.
    pub fn is_chat_watched(&self, chat_id: &str) -> bool {
        check_chat_watched(&self.watched_chats, chat_id)
    }

    /// Call a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        if !status.is_success() || data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description");
            return Err(ChannelError::Http(format!(
                "{method} failed ({status}): {description}"
            )));
        }

        Ok(data.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Send a text message, splitting at Telegram's 4096 char limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            self.call("sendMessage", &body)
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "telegram".into(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Upload in-memory bytes with a multipart method (`sendPhoto`, `sendDocument`).
    async fn send_upload(
        &self,
        method: &str,
        field: &str,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        let part = Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part(field.to_string(), part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url(method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!("{method} failed ({status}): {err}"),
            });
        }

        tracing::info!(chat_id, file_name, method, "Telegram upload sent");
        Ok(())
    }

    /// Send a photo from bytes (in-memory).
    pub async fn send_photo_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.send_upload("sendPhoto", "photo", chat_id, file_bytes, file_name, caption)
            .await
    }

    /// Send a document from bytes (in-memory). Used when Telegram refuses
    /// a card as a photo (extreme aspect ratios).
    pub async fn send_document_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        self.send_upload("sendDocument", "document", chat_id, file_bytes, file_name, caption)
            .await
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let url = self.api_url("getUpdates");
        let watched_chats = self.watched_chats.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": POLL_TIMEOUT_SECS,
                    "allowed_updates": ["message", "edited_message"]
                });

                let resp = match client.post(&url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                };

                if !forward_updates(results, &watched_chats, &tx, &mut offset).await {
                    tracing::info!("Telegram listener channel closed");
                    return;
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call("getMe", &serde_json::json!({}))
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl AvatarSource for TelegramChannel {
    async fn fetch_avatar(&self, msg: &IncomingMessage) -> Result<Option<Vec<u8>>, ChannelError> {
        let Ok(user_id) = msg.user_id.parse::<i64>() else {
            return Ok(None);
        };

        let photos = self
            .call(
                "getUserProfilePhotos",
                &serde_json::json!({ "user_id": user_id, "limit": 1 }),
            )
            .await?;
        let Some(file_id) = pick_avatar_file_id(&photos) else {
            return Ok(None);
        };

        let file = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }))
            .await?;
        let Some(file_path) = file.get("file_path").and_then(Value::as_str) else {
            return Ok(None);
        };

        let resp = self
            .client
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChannelError::Http(format!(
                "avatar download failed: {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

#[async_trait]
impl ArtifactPublisher for TelegramChannel {
    async fn publish(
        &self,
        image: &RenderedImage,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError> {
        match self
            .send_photo_bytes(&self.review_chat_id, image.bytes.clone(), filename, caption)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "sendPhoto failed; retrying as document");
                self.send_document_bytes(&self.review_chat_id, image.bytes.clone(), filename, caption)
                    .await
            }
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(token: &str, method: &str) -> String {
    format!("https://api.telegram.org/bot{token}/{method}")
}

/// Push one `getUpdates` batch into `tx`, advancing `offset` past every
/// update seen. Waits while the buffer is full. Returns false once the
/// receiver is gone.
async fn forward_updates(
    results: &[Value],
    watched_chats: &[String],
    tx: &mpsc::Sender<IncomingMessage>,
    offset: &mut i64,
) -> bool {
    for update in results {
        if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
            *offset = uid + 1;
        }

        let Some(incoming) = parse_update(update) else {
            continue;
        };

        let chat_id = incoming
            .metadata
            .get("chat_id")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !check_chat_watched(watched_chats, chat_id) {
            tracing::debug!(chat_id, "Telegram: ignoring unwatched chat");
            continue;
        }

        if tx.send(incoming).await.is_err() {
            return false;
        }
    }
    true
}

/// Check a chat id against the watched list (`*` matches all).
fn check_chat_watched(watched: &[String], chat_id: &str) -> bool {
    !chat_id.is_empty() && watched.iter().any(|c| c == "*" || c == chat_id)
}

/// Convert a getUpdates entry into an [`IncomingMessage`].
///
/// Text messages and captioned media are accepted. Edits get their own id
/// so an edited message is checked again.
pub fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let (message, edited) = match update.get("message") {
        Some(m) => (m, false),
        None => (update.get("edited_message")?, true),
    };

    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)?;

    let from = message.get("from")?;
    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();
    let is_bot = from.get("is_bot").and_then(Value::as_bool).unwrap_or(false);
    let username = from.get("username").and_then(Value::as_str);

    let first_name = from.get("first_name").and_then(Value::as_str);
    let last_name = from.get("last_name").and_then(Value::as_str);
    let display_name = match (first_name, last_name) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        _ => username.unwrap_or(&user_id).to_string(),
    };

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)?
        .to_string();
    let message_id = message.get("message_id").and_then(Value::as_i64)?;

    let sent_at = message
        .get(if edited { "edit_date" } else { "date" })
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);

    let id = if edited {
        format!("{chat_id}-{message_id}-e{}", sent_at.timestamp())
    } else {
        format!("{chat_id}-{message_id}")
    };

    let metadata = serde_json::json!({
        "chat_id": chat_id,
        "message_id": message_id,
        "username": username,
    });

    Some(
        IncomingMessage::new("telegram", user_id.as_str(), text)
            .with_id(id)
            .with_user_name(display_name)
            .with_user_handle(username.unwrap_or(&user_id))
            .with_received_at(sent_at)
            .from_bot(is_bot)
            .with_metadata(metadata),
    )
}

/// Pick a file id from a getUserProfilePhotos result: the smallest size of
/// the newest photo that is at least [`AVATAR_MIN_EDGE`] wide, else the
/// largest available.
fn pick_avatar_file_id(photos: &Value) -> Option<String> {
    let sizes = photos
        .get("photos")
        .and_then(Value::as_array)?
        .first()?
        .as_array()?;

    let width = |s: &Value| s.get("width").and_then(Value::as_i64).unwrap_or(0);
    let chosen = sizes
        .iter()
        .filter(|s| width(s) >= AVATAR_MIN_EDGE)
        .min_by_key(|s| width(s))
        .or_else(|| sizes.iter().max_by_key(|s| width(s)))?;

    chosen
        .get("file_id")
        .and_then(Value::as_str)
        .map(String::from)
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        // Largest char boundary not past max_len
        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(watched: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC".to_string()),
            watched.iter().map(|s| s.to_string()).collect(),
            "-100200".into(),
        )
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        let ch = channel(&[]);
        assert_eq!(
            ch.api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
        assert_eq!(
            ch.file_url("photos/file_1.jpg"),
            "https://api.telegram.org/file/bot123:ABC/photos/file_1.jpg"
        );
    }

    // ── Watched chat tests ──────────────────────────────────────────

    #[test]
    fn telegram_chat_watched_wildcard() {
        assert!(channel(&["*"]).is_chat_watched("-100123"));
    }

    #[test]
    fn telegram_chat_watched_specific() {
        let ch = channel(&["-100123", "-100456"]);
        assert!(ch.is_chat_watched("-100123"));
        assert!(!ch.is_chat_watched("-100789"));
    }

    #[test]
    fn telegram_chat_denied_empty_list() {
        assert!(!channel(&[]).is_chat_watched("-100123"));
    }

    #[test]
    fn telegram_empty_chat_id_never_watched() {
        assert!(!channel(&["*"]).is_chat_watched(""));
    }

    // ── Update parsing ──────────────────────────────────────────────

    fn update(text_field: &str) -> Value {
        let mut u = serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 77,
                "date": 1_709_703_660,
                "chat": { "id": -100123, "type": "supergroup" },
                "from": {
                    "id": 4242,
                    "is_bot": false,
                    "first_name": "Mal",
                    "last_name": "Lory",
                    "username": "mallory"
                }
            }
        });
        u["message"][text_field] = Value::from("you are an 1d10t");
        u
    }

    #[test]
    fn parse_text_message() {
        let msg = parse_update(&update("text")).unwrap();
        assert_eq!(msg.id, "-100123-77");
        assert_eq!(msg.user_id, "4242");
        assert_eq!(msg.display_name(), "Mal Lory");
        assert_eq!(msg.user_handle.as_deref(), Some("mallory"));
        assert_eq!(msg.content, "you are an 1d10t");
        assert_eq!(msg.received_at.timestamp(), 1_709_703_660);
        assert!(!msg.is_bot);
        assert_eq!(msg.metadata["chat_id"], "-100123");
    }

    #[test]
    fn parse_captioned_media() {
        let msg = parse_update(&update("caption")).unwrap();
        assert_eq!(msg.content, "you are an 1d10t");
    }

    #[test]
    fn parse_skips_non_text_updates() {
        assert!(parse_update(&update("sticker")).is_none());
        assert!(parse_update(&serde_json::json!({ "update_id": 1 })).is_none());
    }

    #[test]
    fn parse_edited_message_gets_distinct_id() {
        let edited = serde_json::json!({
            "update_id": 11,
            "edited_message": {
                "message_id": 77,
                "date": 1_709_703_660,
                "edit_date": 1_709_703_700,
                "chat": { "id": -100123 },
                "from": { "id": 4242, "is_bot": false, "first_name": "Mal" },
                "text": "edited"
            }
        });
        let msg = parse_update(&edited).unwrap();
        assert_eq!(msg.id, "-100123-77-e1709703700");
        assert_eq!(msg.display_name(), "Mal");
        assert_eq!(msg.user_handle.as_deref(), Some("4242"));
    }

    #[test]
    fn parse_flags_bot_senders() {
        let mut u = update("text");
        u["message"]["from"]["is_bot"] = Value::Bool(true);
        assert!(parse_update(&u).unwrap().is_bot);
    }

    // ── Avatar selection ────────────────────────────────────────────

    #[test]
    fn avatar_prefers_smallest_size_above_minimum() {
        let photos = serde_json::json!({
            "total_count": 1,
            "photos": [[
                { "file_id": "small", "width": 64 },
                { "file_id": "medium", "width": 160 },
                { "file_id": "large", "width": 640 }
            ]]
        });
        assert_eq!(pick_avatar_file_id(&photos).as_deref(), Some("medium"));
    }

    #[test]
    fn avatar_falls_back_to_largest() {
        let photos = serde_json::json!({
            "photos": [[
                { "file_id": "tiny", "width": 32 },
                { "file_id": "small", "width": 64 }
            ]]
        });
        assert_eq!(pick_avatar_file_id(&photos).as_deref(), Some("small"));
    }

    #[test]
    fn avatar_none_without_photos() {
        let photos = serde_json::json!({ "total_count": 0, "photos": [] });
        assert!(pick_avatar_file_id(&photos).is_none());
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn telegram_send_photo_bytes_fails_with_fake_token() {
        let ch = channel(&["*"]);
        let result = ch
            .send_photo_bytes("123456", vec![0x89, 0x50, 0x4E, 0x47], "test.png", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn avatar_skips_non_numeric_user_ids() {
        let ch = channel(&["*"]);
        let msg = IncomingMessage::new("telegram", "not-a-number", "hi");
        assert!(ch.fetch_avatar(&msg).await.unwrap().is_none());
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "a".repeat(2000));
        assert_eq!(chunks[1], "b".repeat(3000));
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let msg = "é".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert!(chunks.iter().all(|c| c.len() <= 4095));
        assert_eq!(chunks.concat(), msg);
    }

    // ── Respond extracts chat_id from metadata ──────────────────────

    #[tokio::test]
    async fn respond_without_chat_id_fails() {
        let ch = channel(&["*"]);
        let msg = IncomingMessage::new("telegram", "user123", "hello");
        let result = ch.respond(&msg, OutgoingResponse::text("hi")).await;
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }

    // ── Update forwarding ───────────────────────────────────────────

    fn numbered_update(update_id: i64) -> Value {
        let mut u = update("text");
        u["update_id"] = Value::from(update_id);
        u["message"]["message_id"] = Value::from(update_id);
        u
    }

    #[tokio::test]
    async fn forwarding_waits_for_a_full_buffer() {
        let (tx, mut rx) = mpsc::channel(1);
        let batch: Vec<Value> = (1..=3).map(numbered_update).collect();
        let watched = vec!["*".to_string()];

        let mut forwarder = tokio::spawn(async move {
            let mut offset = 0;
            let open = forward_updates(&batch, &watched, &tx, &mut offset).await;
            (open, offset)
        });

        // One slot: the second send blocks until the monitor catches up.
        let waiting =
            tokio::time::timeout(std::time::Duration::from_millis(50), &mut forwarder).await;
        assert!(waiting.is_err());

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(rx.recv().await.unwrap().id);
        }
        assert_eq!(ids, vec!["-100123-1", "-100123-2", "-100123-3"]);
        assert_eq!(forwarder.await.unwrap(), (true, 4));
    }

    #[tokio::test]
    async fn forwarding_skips_unwatched_chats_but_advances_offset() {
        let (tx, mut rx) = mpsc::channel(UPDATE_BUFFER);
        let watched = vec!["-100999".to_string()];
        let mut offset = 0;

        assert!(forward_updates(&[numbered_update(5)], &watched, &tx, &mut offset).await);
        assert_eq!(offset, 6);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn forwarding_stops_when_receiver_is_gone() {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        drop(rx);
        let watched = vec!["*".to_string()];
        let mut offset = 0;

        assert!(!forward_updates(&[numbered_update(1)], &watched, &tx, &mut offset).await);
    }
}

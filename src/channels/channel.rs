//! Channel abstractions: message sources, avatar sources and publishers.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cards::RenderedImage;
use crate::error::ChannelError;

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A chat message as seen by the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Unique id within the process (channel-native where possible).
    pub id: String,
    /// Source channel name, used to route responses.
    pub channel: String,
    /// Stable author identifier.
    pub user_id: String,
    /// Display name of the author.
    pub user_name: Option<String>,
    /// Secondary author tag (username, discriminator).
    pub user_handle: Option<String>,
    /// Whether the author is a bot account.
    pub is_bot: bool,
    /// Message text.
    pub content: String,
    /// When the message was sent.
    pub received_at: DateTime<Utc>,
    /// Channel-specific data for replies (chat ids and the like).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            user_id: user_id.into(),
            user_name: None,
            user_handle: None,
            is_bot: false,
            content: content.into(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    pub fn with_user_handle(mut self, handle: impl Into<String>) -> Self {
        self.user_handle = Some(handle.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }

    pub fn from_bot(mut self, is_bot: bool) -> Self {
        self.is_bot = is_bot;
        self
    }

    /// Name shown on the card: display name, falling back to the user id.
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// A text reply to a message (command acknowledgements).
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A chat transport the monitor listens on.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name; matches `IncomingMessage::channel`.
    fn name(&self) -> &str;

    /// Begin receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Reply in the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Lets one shared channel also serve as avatar source or publisher.
#[async_trait]
impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        (**self).start().await
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        (**self).respond(msg, response).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        (**self).health_check().await
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        (**self).shutdown().await
    }
}

/// Fetches encoded avatar images for message authors.
#[async_trait]
pub trait AvatarSource: Send + Sync {
    /// Raw image bytes, or `None` when the author has no avatar.
    async fn fetch_avatar(&self, msg: &IncomingMessage) -> Result<Option<Vec<u8>>, ChannelError>;
}

/// Delivers rendered cards to the review destination.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    async fn publish(
        &self,
        image: &RenderedImage,
        filename: &str,
        caption: Option<&str>,
    ) -> Result<(), ChannelError>;
}

/// Avatar source for channels without profile pictures.
pub struct NoAvatars;

#[async_trait]
impl AvatarSource for NoAvatars {
    async fn fetch_avatar(&self, _msg: &IncomingMessage) -> Result<Option<Vec<u8>>, ChannelError> {
        Ok(None)
    }
}

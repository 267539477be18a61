//! Channel manager — fans in every channel's stream and routes replies.

use futures::stream;
use tracing::{info, warn};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Box<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        info!(channel = channel.name(), "Channel registered");
        self.channels.push(channel);
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Start every channel and merge their streams.
    ///
    /// A channel that fails to start is logged and skipped; it is only an
    /// error when no channel starts at all.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        let mut last_error = None;

        for channel in &self.channels {
            match channel.start().await {
                Ok(s) => {
                    info!(channel = channel.name(), "Channel started");
                    streams.push(s);
                }
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Channel failed to start");
                    last_error = Some(e);
                }
            }
        }

        if streams.is_empty() {
            return Err(last_error.unwrap_or_else(|| ChannelError::StartupFailed {
                name: "manager".into(),
                reason: "no channels registered".into(),
            }));
        }

        Ok(Box::pin(stream::select_all(streams)))
    }

    /// Send a reply on the channel `msg` arrived on.
    pub async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .iter()
            .find(|c| c.name() == msg.channel)
            .ok_or_else(|| ChannelError::SendFailed {
                name: msg.channel.clone(),
                reason: "channel not registered".into(),
            })?;
        channel.respond(msg, response).await
    }

    pub async fn shutdown_all(&self) -> Result<(), ChannelError> {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                warn!(channel = channel.name(), error = %e, "Channel shutdown failed");
            }
        }
        Ok(())
    }
}

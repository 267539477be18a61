//! Moderation monitor — checks each incoming message against the keyword
//! index and publishes a rendered card for every hit.
//!
//! Flow per message:
//! 1. Skip bot authors and blank messages
//! 2. Normalize + match against the current keyword snapshot
//! 3. Fetch avatar → render card (blocking pool) → publish
//! 4. Handle `/reloadwords` (admins only) after the message itself was checked
//!
//! Failures are logged and reported as [`Outcome::Failed`]; the loop keeps
//! going.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::cards::{Card, CardRenderer, RenderedImage, placeholder_avatar};
use crate::channels::{
    ArtifactPublisher, AvatarSource, ChannelManager, IncomingMessage, OutgoingResponse,
};
use crate::error::{PipelineError, RenderError};
use crate::keywords::{KeywordIndex, KeywordSet};
use crate::pipeline::dedup::RecentIds;
use crate::wordlist::WordFile;

/// Command names that trigger a keyword reload.
const RELOAD_COMMANDS: &[&str] = &["/reloadwords", "!reloadwords"];

const DENIED_REPLY: &str = "You don't have permission to reload keywords.";

/// What happened to one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Bot author or nothing to check.
    Skipped,
    /// No keyword matched.
    Clean,
    /// A card was published.
    Flagged { keyword: String },
    /// Already published for this message id.
    Duplicate,
    /// Matched, but the card could not be produced or delivered.
    Failed { reason: String },
    /// A command was handled; `reply` goes back to the sender. `scan` is
    /// the result of checking the command message itself.
    Command { reply: String, scan: Box<Outcome> },
}

/// Collaborators the monitor needs.
pub struct MonitorDeps {
    pub keywords: Arc<KeywordIndex>,
    pub words: WordFile,
    pub renderer: Arc<CardRenderer>,
    pub avatars: Arc<dyn AvatarSource>,
    pub publisher: Arc<dyn ArtifactPublisher>,
    /// User ids or handles allowed to reload; `*` allows everyone.
    pub admins: Vec<String>,
}

pub struct Monitor {
    deps: MonitorDeps,
    recent: Mutex<RecentIds>,
}

impl Monitor {
    pub fn new(deps: MonitorDeps) -> Self {
        Self {
            deps,
            recent: Mutex::new(RecentIds::default()),
        }
    }

    pub fn keywords(&self) -> &Arc<KeywordIndex> {
        &self.deps.keywords
    }

    /// Run until ctrl-c or until every channel stream ends.
    pub async fn run(&self, channels: ChannelManager) -> crate::error::Result<()> {
        let mut message_stream = channels.start_all().await?;

        info!(
            channels = ?channels.names(),
            keywords = self.deps.keywords.len(),
            "Monitor ready and listening"
        );

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            info!("All channel streams ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            if let Outcome::Command { reply, .. } = self.handle(&message).await {
                if let Err(e) = channels
                    .respond(&message, OutgoingResponse::text(reply))
                    .await
                {
                    warn!(message_id = %message.id, error = %e, "Failed to send command reply");
                }
            }
        }

        channels.shutdown_all().await?;
        Ok(())
    }

    /// Process one message.
    pub async fn handle(&self, msg: &IncomingMessage) -> Outcome {
        if msg.is_bot || msg.content.trim().is_empty() {
            return Outcome::Skipped;
        }

        // The command text is checked against the set in force when it arrived.
        let scan = self.scan(msg).await;

        if is_reload_command(&msg.content) {
            return Outcome::Command {
                reply: self.handle_reload(msg).await,
                scan: Box::new(scan),
            };
        }
        scan
    }

    async fn scan(&self, msg: &IncomingMessage) -> Outcome {
        let snapshot = self.deps.keywords.snapshot();
        let Some(keyword) = snapshot.find(&msg.content).map(String::from) else {
            debug!(message_id = %msg.id, channel = %msg.channel, "Message clean");
            return Outcome::Clean;
        };

        if self.lock_recent().contains(&msg.id) {
            debug!(message_id = %msg.id, "Card already published");
            return Outcome::Duplicate;
        }

        info!(
            message_id = %msg.id,
            channel = %msg.channel,
            user = %msg.user_id,
            keyword = %keyword,
            "Message flagged"
        );

        match self.publish_card(msg, &keyword).await {
            Ok(()) => {
                self.lock_recent().insert(&msg.id);
                Outcome::Flagged { keyword }
            }
            Err(e) => {
                error!(message_id = %msg.id, error = %e, "Failed to publish card");
                Outcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Reload the word file and publish the new set. Returns the keyword count.
    pub async fn reload(&self) -> Result<usize, PipelineError> {
        let raw = self.deps.words.load().await?;
        let set = KeywordSet::build(raw);
        let count = set.len();
        self.deps.keywords.replace(set);
        Ok(count)
    }

    fn is_admin(&self, msg: &IncomingMessage) -> bool {
        self.deps.admins.iter().any(|a| {
            a == "*" || *a == msg.user_id || msg.user_handle.as_deref() == Some(a.as_str())
        })
    }

    async fn handle_reload(&self, msg: &IncomingMessage) -> String {
        if !self.is_admin(msg) {
            warn!(user = %msg.user_id, "Reload denied");
            return DENIED_REPLY.to_string();
        }
        match self.reload().await {
            Ok(count) => {
                info!(user = %msg.user_id, keywords = count, "Keywords reloaded");
                format!("Reloaded {count} keywords.")
            }
            Err(e) => {
                error!(error = %e, "Keyword reload failed");
                format!("Failed to reload keywords: {e}")
            }
        }
    }

    async fn publish_card(&self, msg: &IncomingMessage, keyword: &str) -> Result<(), PipelineError> {
        let avatar = self.avatar_for(msg).await?;
        let mut card = Card::new(
            msg.display_name(),
            msg.user_handle.clone().unwrap_or_default(),
            avatar,
            msg.received_at,
            &msg.content,
        );

        let image = match self.render(card.clone()).await {
            Err(RenderError::Decode(reason)) => {
                warn!(message_id = %msg.id, %reason, "Avatar undecodable; using placeholder");
                card.avatar = placeholder_avatar(&msg.user_id)?;
                self.render(card.clone()).await?
            }
            other => other?,
        };

        let filename = format!("{}.png", msg.id);
        let caption = format!("Flagged message from {} (keyword: {keyword})", card.label());
        self.deps
            .publisher
            .publish(&image, &filename, Some(&caption))
            .await
            .map_err(PipelineError::Publish)?;

        info!(
            message_id = %msg.id,
            filename = %filename,
            width = image.width,
            height = image.height,
            "Card published"
        );
        Ok(())
    }

    async fn avatar_for(&self, msg: &IncomingMessage) -> Result<Vec<u8>, PipelineError> {
        match self.deps.avatars.fetch_avatar(msg).await {
            Ok(Some(bytes)) => return Ok(bytes),
            Ok(None) => {}
            Err(e) => {
                warn!(message_id = %msg.id, error = %e, "Avatar fetch failed; using placeholder");
            }
        }
        Ok(placeholder_avatar(&msg.user_id)?)
    }

    async fn render(&self, card: Card) -> Result<RenderedImage, RenderError> {
        let renderer = Arc::clone(&self.deps.renderer);
        tokio::task::spawn_blocking(move || renderer.render(&card))
            .await
            .map_err(|e| RenderError::Join(e.to_string()))?
    }

    fn lock_recent(&self) -> std::sync::MutexGuard<'_, RecentIds> {
        self.recent.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whether `content` is a reload command. Accepts Telegram's
/// `/reloadwords@BotName` form.
pub fn is_reload_command(content: &str) -> bool {
    let Some(first) = content.split_whitespace().next() else {
        return false;
    };
    let command = first.split('@').next().unwrap_or(first);
    RELOAD_COMMANDS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(command))
}

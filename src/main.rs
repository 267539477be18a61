use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use modwatch::cards::font::FontFace;
use modwatch::cards::{CardRenderer, FileFontProvider, FontSet};
use modwatch::channels::{
    ArtifactPublisher, AvatarSource, Channel, ChannelManager, CliChannel, DirectoryPublisher,
    NoAvatars, TelegramChannel,
};
use modwatch::config::Config;
use modwatch::keywords::{KeywordIndex, KeywordSet};
use modwatch::pipeline::{Monitor, MonitorDeps};
use modwatch::wordlist::WordFile;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    // Initialize tracing; the guard flushes the file writer on exit
    let _log_guard = init_tracing(&config);

    eprintln!("🛡️  modwatch v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Word list: {}", config.words_file.display());

    run(config).await.context("modwatch stopped")?;
    Ok(())
}

/// Wire keywords, renderer and channels from `config`, then monitor until shutdown.
async fn run(config: Config) -> modwatch::error::Result<()> {
    // ── Keywords ────────────────────────────────────────────────────────
    let words = WordFile::new(config.words_file.clone());
    let raw = words.load().await?;
    let keywords = KeywordIndex::new(KeywordSet::build(raw));
    eprintln!("   Keywords: {}", keywords.len());

    // ── Card rendering ──────────────────────────────────────────────────
    let fonts = FontSet::resolve(&FileFontProvider::new(
        config.font_path.clone(),
        config.font_bold_path.clone(),
    ));
    eprintln!(
        "   Fonts: {} / {}",
        fonts.regular.name(),
        fonts.bold.name()
    );
    let renderer = Arc::new(CardRenderer::new(config.render_config(), fonts));

    eprintln!(
        "   Admins: {}",
        if config.admins.iter().any(|a| a == "*") {
            "everyone".to_string()
        } else if config.admins.is_empty() {
            "none (reload disabled)".to_string()
        } else {
            config.admins.join(", ")
        }
    );

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let avatars: Arc<dyn AvatarSource>;
    let publisher: Arc<dyn ArtifactPublisher>;

    match config.telegram {
        Some(telegram) => {
            eprintln!(
                "   Telegram: enabled (watching: {}, review chat: {})",
                if telegram.watched_chats.iter().any(|c| c == "*") {
                    "all chats".to_string()
                } else {
                    telegram.watched_chats.join(", ")
                },
                telegram.review_chat_id
            );

            let channel = Arc::new(TelegramChannel::new(
                telegram.bot_token,
                telegram.watched_chats,
                telegram.review_chat_id,
            ));
            if let Err(e) = channel.health_check().await {
                tracing::warn!(error = %e, "Telegram health check failed");
            }
            avatars = channel.clone();
            publisher = channel.clone();
            channels.add(Box::new(channel));
        }
        None => {
            eprintln!(
                "   Telegram: disabled (cards written to {})",
                config.output_dir.display()
            );
            eprintln!("   Type `name: message` and press Enter.\n");
            avatars = Arc::new(NoAvatars);
            publisher = Arc::new(DirectoryPublisher::new(config.output_dir.clone()));
            channels.add(Box::new(CliChannel::new()));
        }
    }

    eprintln!("   Channels: {}\n", channels.names().join(", "));

    let monitor = Monitor::new(MonitorDeps {
        keywords,
        words,
        renderer,
        avatars,
        publisher,
        admins: config.admins,
    });
    monitor.run(channels).await
}

/// Console logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "modwatch.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

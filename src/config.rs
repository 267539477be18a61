//! Configuration types.
//!
//! Everything is read from environment variables; see [`Config::from_env`].

use std::path::PathBuf;

use chrono_tz::Tz;
use secrecy::SecretString;

use crate::cards::RenderConfig;
use crate::error::ConfigError;

const DEFAULT_FONT_PATH: &str = "/System/Library/Fonts/Supplemental/Arial.ttf";
const DEFAULT_FONT_BOLD_PATH: &str = "/System/Library/Fonts/Supplemental/Arial Bold.ttf";

/// Telegram mode settings. Present only when `TELEGRAM_BOT_TOKEN` is set.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Chat that receives rendered cards.
    pub review_chat_id: String,
    /// Chats to monitor (`*` = every chat the bot is in).
    pub watched_chats: Vec<String>,
}

/// Monitor configuration.
#[derive(Debug)]
pub struct Config {
    /// Backing word list, one keyword per line.
    pub words_file: PathBuf,
    pub font_path: PathBuf,
    pub font_bold_path: PathBuf,
    /// Zone used for card timestamps.
    pub timezone: Tz,
    pub card_width: u32,
    /// User ids or handles allowed to reload keywords (`*` = everyone).
    pub admins: Vec<String>,
    /// Where cards go when running without Telegram.
    pub output_dir: PathBuf,
    /// Daily-rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
    pub telegram: Option<TelegramConfig>,
}

impl Config {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let words_file = var("MODWATCH_WORDS_FILE").unwrap_or_else(|| "words.txt".to_string());
        let font_path = var("MODWATCH_FONT_PATH").unwrap_or_else(|| DEFAULT_FONT_PATH.to_string());
        let font_bold_path =
            var("MODWATCH_FONT_BOLD_PATH").unwrap_or_else(|| DEFAULT_FONT_BOLD_PATH.to_string());

        let timezone = match var("MODWATCH_TIMEZONE") {
            Some(name) => name
                .trim()
                .parse::<Tz>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "MODWATCH_TIMEZONE".into(),
                    message: e.to_string(),
                })?,
            None => chrono_tz::America::Los_Angeles,
        };

        let card_width = match var("MODWATCH_CARD_WIDTH") {
            Some(raw) => parse_width(&raw)?,
            None => RenderConfig::default().width,
        };

        let admins = var("MODWATCH_ADMINS")
            .map(|s| parse_list(&s))
            .unwrap_or_default();

        let output_dir = var("MODWATCH_OUTPUT_DIR").unwrap_or_else(|| "./cards".to_string());
        let log_dir = var("MODWATCH_LOG_DIR").map(PathBuf::from);

        let telegram = match var("TELEGRAM_BOT_TOKEN") {
            Some(token) => {
                let review_chat_id = var("MODWATCH_REVIEW_CHAT_ID")
                    .ok_or_else(|| ConfigError::MissingEnvVar("MODWATCH_REVIEW_CHAT_ID".into()))?;
                let watched_chats = var("MODWATCH_WATCHED_CHATS")
                    .map(|s| parse_list(&s))
                    .unwrap_or_else(|| vec!["*".to_string()]);
                Some(TelegramConfig {
                    bot_token: SecretString::from(token.trim().to_string()),
                    review_chat_id: review_chat_id.trim().to_string(),
                    watched_chats,
                })
            }
            None => None,
        };

        Ok(Self {
            words_file: PathBuf::from(words_file),
            font_path: PathBuf::from(font_path),
            font_bold_path: PathBuf::from(font_bold_path),
            timezone,
            card_width,
            admins,
            output_dir: PathBuf::from(output_dir),
            log_dir,
            telegram,
        })
    }

    /// Card template with the configured width and zone.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            width: self.card_width,
            timezone: self.timezone,
            ..RenderConfig::default()
        }
    }
}

fn parse_width(raw: &str) -> Result<u32, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "MODWATCH_CARD_WIDTH".into(),
        message,
    };
    let width: u32 = raw.trim().parse().map_err(|e| invalid(format!("{e}")))?;
    if width == 0 {
        return Err(invalid("must be greater than zero".into()));
    }
    Ok(width)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

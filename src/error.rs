//! Error types for modwatch.

/// Top-level error type for starting and stopping the monitor.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Word list error: {0}")]
    WordList(#[from] WordListError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Card rendering errors. Font problems are not errors; they downgrade to
/// the built-in face instead.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Avatar could not be decoded: {0}")]
    Decode(String),

    #[error("Card could not be encoded: {0}")]
    Encode(String),

    #[error("Render task failed: {0}")]
    Join(String),
}

/// Font loading errors. Handled inside the renderer's font resolution.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Failed to read font {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Not a usable font file: {path}")]
    Invalid { path: String },
}

/// Word list loading errors.
#[derive(Debug, thiserror::Error)]
pub enum WordListError {
    #[error("Failed to read word list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),

    #[error("Publish failed: {0}")]
    Publish(#[source] ChannelError),

    #[error("Reload failed: {0}")]
    Reload(#[from] WordListError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_convert_to_top_level() {
        fn start() -> Result<()> {
            let started: std::result::Result<(), ChannelError> =
                Err(ChannelError::StartupFailed {
                    name: "telegram".into(),
                    reason: "no token".into(),
                });
            started?;
            Ok(())
        }

        let err = start().unwrap_err();
        assert!(matches!(err, Error::Channel(_)));
        assert_eq!(
            err.to_string(),
            "Channel error: Channel telegram failed to start: no token"
        );
    }

    #[test]
    fn word_list_errors_keep_their_path() {
        let err: Error = WordListError::Io {
            path: "words.txt".into(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        }
        .into();
        assert!(err.to_string().contains("words.txt"));
    }
}

/// Common result type for guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Unified error type for the alert core.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// A raw vote outside {0, 1} reached a window.
    #[error("invalid vote {0}: expected 0 or 1")]
    InvalidVote(u8),

    /// Configuration rejected at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// TOML configuration could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

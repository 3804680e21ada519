use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    #[error("Vault is locked")]
    Locked,
}

/// Failures of the voice gate. None of them are retried automatically.
#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("microphone unavailable: {0}")]
    MicUnavailable(String),

    #[error("microphone access denied")]
    MicDenied,

    #[error("no voice template enrolled")]
    NoTemplate,

    #[error("threshold {0} outside [0, 1]")]
    InvalidThreshold(f32),

    #[error("capture frame interval must be positive")]
    InvalidFrameInterval,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum PinError {
    #[error("PIN must be 4-8 digits")]
    InvalidFormat,

    #[error("PIN has not been set")]
    NotSet,

    #[error(transparent)]
    Store(#[from] StoreError),
}

//! Error types for inbox-ledger.

/// Top-level error type for the relay binary's startup path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. Only raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Credential acquisition errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token refresh request failed: {0}")]
    RefreshFailed(String),

    #[error("Token endpoint rejected refresh ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Token endpoint returned an unreadable response: {0}")]
    InvalidResponse(String),
}

/// Inbound notification decode errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Payload is not valid notification JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Mail provider fetch errors (history delta and message retrieval).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// Transaction extraction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown transaction type: {0:?}")]
    UnknownType(String),

    #[error("amount not found")]
    AmountNotFound,

    #[error("invalid amount format: {0:?}")]
    InvalidAmount(String),
}

/// Ledger read/write errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Failed to read {sheet}!{cell}: {reason}")]
    Read {
        sheet: String,
        cell: String,
        reason: String,
    },

    #[error("Failed to write {sheet}!{cell}: {reason}")]
    Write {
        sheet: String,
        cell: String,
        reason: String,
    },

    #[error("Running total in {sheet}!{cell} would overflow")]
    Overflow { sheet: String, cell: String },
}

/// Pipeline plumbing errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Cursor sequencer has shut down")]
    SequencerClosed,
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;

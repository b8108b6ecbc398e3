//! External collaborators: mail history/message fetch and ledger cells.
//!
//! The pipeline only sees the [`MailSource`] and [`LedgerCells`] traits.
//! Gmail and Sheets REST clients implement them over `reqwest`.

pub mod auth;
pub mod gmail;
pub mod sheets;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::{AuthError, FetchError, LedgerError};
use crate::pipeline::types::{CursorWindow, MailMessage, MessageAdded};

pub use auth::{CredentialProvider, LoggingCredentials, OAuthRefresher};
pub use gmail::GmailClient;
pub use sheets::SheetsClient;

/// Read access to the mailbox change log and message contents.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// All message-added events between the two cursors of `window`.
    async fn fetch_history_delta(
        &self,
        window: CursorWindow,
    ) -> Result<Vec<MessageAdded>, FetchError>;

    /// Retrieve one message's headers and plain-text parts.
    async fn fetch_message(&self, id: &str) -> Result<MailMessage, FetchError>;
}

/// Read/write access to single numeric spreadsheet cells.
#[async_trait]
pub trait LedgerCells: Send + Sync {
    /// Raw cell contents; `None` when the cell is empty or unset.
    async fn read_cell(&self, sheet: &str, cell: &str) -> Result<Option<String>, LedgerError>;

    async fn write_cell(&self, sheet: &str, cell: &str, value: Decimal) -> Result<(), LedgerError>;
}

/// Failure of an authorized provider request.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SendError {
    #[error("auth: {0}")]
    Auth(AuthError),

    #[error("transport: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

impl SendError {
    /// Map onto the mail-fetch taxonomy.
    pub(crate) fn into_fetch_error(self, what: &str) -> FetchError {
        match self {
            Self::Auth(e) => FetchError::Auth(e),
            Self::Transport(e) => FetchError::Transport(e),
            Self::Status { status, body } => match status.as_u16() {
                401 | 403 => FetchError::Auth(AuthError::Rejected {
                    status: status.as_u16(),
                    body,
                }),
                404 => FetchError::NotFound(what.to_string()),
                code => FetchError::Status { status: code, body },
            },
        }
    }
}

/// Send a bearer-authorized request, retrying once with a fresh
/// credential when the provider answers 401.
pub(crate) async fn send_authorized<F>(
    credentials: &dyn CredentialProvider,
    build: F,
) -> Result<reqwest::Response, SendError>
where
    F: Fn(&str) -> reqwest::RequestBuilder,
{
    let mut retried = false;
    loop {
        let token = credentials
            .current_credential()
            .await
            .map_err(SendError::Auth)?;
        let resp = build(token.expose_secret())
            .send()
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED && !retried {
            debug!("Provider returned 401, refreshing credential");
            credentials.invalidate().await;
            retried = true;
            continue;
        }
        let body = resp.text().await.unwrap_or_default();
        return Err(SendError::Status { status, body });
    }
}

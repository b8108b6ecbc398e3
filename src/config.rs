//! Configuration types.
//!
//! Everything is read once at startup by [`RelayConfig::from_env`] and then
//! passed into constructors. Nothing downstream reads the environment.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default bind port for the webhook server.
const DEFAULT_PORT: u16 = 3000;
/// Default capacity of the cursor queue between webhook and sequencer.
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
/// Default number of message ids remembered for deduplication.
const DEFAULT_SEEN_CAPACITY: usize = 10_000;
/// Default per-request timeout for provider calls.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Where transaction facts are accumulated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Spreadsheet identifier.
    pub spreadsheet_id: String,
    /// Sheet (tab) name holding both cells.
    pub sheet_name: String,
    /// Cell address accumulating debits, e.g. `B2`.
    pub debit_cell: String,
    /// Cell address accumulating credits, e.g. `C2`.
    pub credit_cell: String,
}

/// OAuth client credentials shared by the mail and spreadsheet clients.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
    /// Optional access token to use until the first refresh.
    pub access_token: Option<SecretString>,
    pub token_url: String,
}

/// Gmail push-watch registration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Fully-qualified Pub/Sub topic name.
    pub topic_name: String,
    /// Label ids the watch is restricted to.
    pub label_ids: Vec<String>,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Substring the `From` header must contain for a message to be processed.
    pub expected_sender: String,
    pub ledger: LedgerConfig,
    pub oauth: OAuthConfig,
    /// Mailbox user for the Gmail API (`me` for the authorized account).
    pub gmail_user: String,
    /// Watch registration; `None` skips registration at startup.
    pub watch: Option<WatchConfig>,
    pub port: u16,
    pub queue_capacity: usize,
    pub seen_capacity: usize,
    pub http_timeout: Duration,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let ledger = LedgerConfig {
            spreadsheet_id: require("LEDGER_SPREADSHEET_ID")?,
            sheet_name: get("LEDGER_SHEET_NAME").unwrap_or_else(|| "Sheet1".to_string()),
            debit_cell: cell_address("LEDGER_DEBIT_CELL", require("LEDGER_DEBIT_CELL")?)?,
            credit_cell: cell_address("LEDGER_CREDIT_CELL", require("LEDGER_CREDIT_CELL")?)?,
        };
        if ledger.debit_cell == ledger.credit_cell {
            return Err(ConfigError::InvalidValue {
                key: "LEDGER_CREDIT_CELL".into(),
                message: "debit and credit must use distinct cells".into(),
            });
        }

        let oauth = OAuthConfig {
            client_id: require("GOOGLE_CLIENT_ID")?,
            client_secret: SecretString::from(require("GOOGLE_CLIENT_SECRET")?),
            refresh_token: SecretString::from(require("GOOGLE_REFRESH_TOKEN")?),
            access_token: get("GOOGLE_ACCESS_TOKEN").map(SecretString::from),
            token_url: get("GOOGLE_TOKEN_URL")
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
        };

        let watch = get("GMAIL_WATCH_TOPIC").map(|topic_name| {
            let label_ids: Vec<String> = get("GMAIL_WATCH_LABELS")
                .unwrap_or_else(|| "INBOX".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            WatchConfig {
                topic_name,
                label_ids,
            }
        });

        Ok(Self {
            expected_sender: require("EXPECTED_SENDER")?,
            ledger,
            oauth,
            gmail_user: get("GMAIL_USER").unwrap_or_else(|| "me".to_string()),
            watch,
            port: parse_or("INBOX_LEDGER_PORT", get("INBOX_LEDGER_PORT"), DEFAULT_PORT)?,
            queue_capacity: positive(
                "INBOX_LEDGER_QUEUE_CAPACITY",
                parse_or(
                    "INBOX_LEDGER_QUEUE_CAPACITY",
                    get("INBOX_LEDGER_QUEUE_CAPACITY"),
                    DEFAULT_QUEUE_CAPACITY,
                )?,
            )?,
            seen_capacity: positive(
                "INBOX_LEDGER_SEEN_CAPACITY",
                parse_or(
                    "INBOX_LEDGER_SEEN_CAPACITY",
                    get("INBOX_LEDGER_SEEN_CAPACITY"),
                    DEFAULT_SEEN_CAPACITY,
                )?,
            )?,
            http_timeout: Duration::from_secs(parse_or(
                "INBOX_LEDGER_HTTP_TIMEOUT_SECS",
                get("INBOX_LEDGER_HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn positive(key: &str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

/// Validate an A1-style cell address (`B2`, `AA10`).
fn cell_address(key: &str, raw: String) -> Result<String, ConfigError> {
    let upper = raw.to_ascii_uppercase();
    let letters = upper.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    let digits = &upper[letters..];
    let valid = letters > 0
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');
    if !valid {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?} is not an A1 cell address"),
        });
    }
    Ok(upper)
}

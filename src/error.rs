use thiserror::Error;

/// Failure while fetching listings from the Spark API.
///
/// A fetch error aborts the cycle with the snapshot store untouched; the
/// next scheduled tick is the retry mechanism.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("listing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("listing API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed listing response: {0}")]
    Malformed(String),
}

/// Failure delivering a notification on one channel.
///
/// Logged per channel; never aborts the cycle or blocks the store update.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Invalid or incomplete configuration. Fatal at startup only.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("spark.access_token is not set")]
    MissingAccessToken,
    #[error("{field} is not set")]
    MissingField { field: &'static str },
    #[error("invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: url::ParseError,
    },
    #[error("no notification channel configured (need [notifications.slack] and/or [notifications.twilio])")]
    NoChannels,
}

/// Outcome of attempting to start a poll cycle.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("a poll cycle is already in flight")]
    InFlight,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

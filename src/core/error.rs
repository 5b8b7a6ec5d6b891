//! Error types for node access and price estimation

use std::fmt;

use chrono::NaiveDate;

/// Failures reaching or decoding a response from the node data source
#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error("HTTP transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("RPC method {method} failed with code {code}: {message}")]
    Rpc {
        method: String,
        code: i32,
        message: String,
    },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("RPC method {0} returned no result")]
    MissingResult(String),

    #[error("no block at height {0}")]
    UnknownHeight(u64),

    #[error("no block with hash {0}")]
    UnknownHash(String),

    #[error("block {height} has an unrepresentable timestamp {timestamp}")]
    InvalidTimestamp { height: u64, timestamp: i64 },

    #[error("invalid node endpoint: {0}")]
    Endpoint(String),

    #[error("could not load RPC credentials: {0}")]
    Credentials(String),
}

/// Why a requested price date cannot be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRange {
    /// Earlier than the first day the node is known to serve
    BeforeEarliest(NaiveDate),
    /// Not strictly before the chain tip's UTC day, so the day is not complete
    NotFinal(NaiveDate),
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateRange::BeforeEarliest(earliest) => {
                write!(f, "before the earliest supported day {}", earliest)
            }
            DateRange::NotFinal(latest) => {
                write!(f, "not complete yet, latest available day is {}", latest)
            }
        }
    }
}

/// Errors produced by a single price estimate
#[derive(thiserror::Error, Debug)]
pub enum OracleError {
    #[error("node data source error: {0}")]
    DataSource(#[from] NodeError),

    #[error("date {date} is {reason}")]
    OutOfRangeDate { date: NaiveDate, reason: DateRange },

    #[error("could not interpret date '{input}', expected YYYY-MM-DD")]
    MalformedDateInput { input: String },

    #[error("price weighting is degenerate: {0}")]
    DegenerateScore(String),

    #[error("invalid calibration: {0}")]
    Calibration(String),
}

impl OracleError {
    /// True for errors the operator can fix by entering another date
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            OracleError::OutOfRangeDate { .. }
                | OracleError::MalformedDateInput { .. }
                | OracleError::DegenerateScore(_)
        )
    }
}

pub type OracleResult<T> = Result<T, OracleError>;

/// Error taxonomy for the trading engine
///
/// Construction and configuration errors are fail-fast. Only
/// `TransientFeedFailure` is ever retried, and only at the feed boundary.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{name} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("negative value for {name}: {value}")]
    NegativeValue { name: &'static str, value: String },

    #[error("insufficient history: have {available} candles, period {period} needs {required}")]
    InsufficientHistory {
        available: usize,
        period: usize,
        required: usize,
    },

    #[error("unknown {kind} selector: {name:?}")]
    UnknownSelector { kind: &'static str, name: String },

    #[error("transient feed failure: {0}")]
    TransientFeedFailure(String),

    #[error("broker rejected request: {0}")]
    Broker(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

impl BotError {
    /// Whether the failure may clear up by itself on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::TransientFeedFailure(_))
    }

    pub(crate) fn unknown(kind: &'static str, name: &str) -> Self {
        BotError::UnknownSelector {
            kind,
            name: name.to_string(),
        }
    }
}

use chrono::NaiveDate;
use thiserror::Error;
use tradesage_agents::AgentError;

/// Failure of an external collaborator (price history, news, executor).
#[derive(Error, Debug)]
pub enum DataError {
    #[error("No price data for {symbol} between {start} and {end}")]
    NoPrices {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Trade execution failed: {0}")]
    Execution(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("No trading days between {start} and {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),
}

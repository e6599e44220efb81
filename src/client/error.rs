use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Reconnect budget exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u64, last_error: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Connection closed")]
    Closed,

    #[error("Close not acknowledged within {0:?}")]
    CloseTimeout(std::time::Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Client error: {0}")]
    Client(#[from] crate::client::ClientError),

    #[error("Round ended with unresolved slots")]
    IncompleteRound,
}

pub type PoolResult<T> = Result<T, PoolError>;

mod error;
mod pool;

pub use error::{PoolError, PoolResult};
pub use pool::ConnectionPool;

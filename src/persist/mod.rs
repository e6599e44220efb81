mod error;
mod naming;
mod sink;

pub use error::{PersistError, PersistResult};
pub use naming::next_run_file;
pub use sink::CsvSink;

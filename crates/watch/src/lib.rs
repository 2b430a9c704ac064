pub mod cycle;
pub mod detector;
pub mod error;
pub mod schema;
pub mod store;

pub use cycle::{ContentSource, CycleOutcome, LabelFn, Watcher};
pub use detector::{Detection, detect, fingerprint};
pub use error::{FetchError, WatchError};
pub use schema::{LogState, TIMESTAMP_FORMAT, UpdateRecord};
pub use store::{UpdateLogStore, WriterLock};

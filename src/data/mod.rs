//! Local journal: record format, storage medium, day logs, writer and replay.
pub mod day_log;
pub mod medium;
pub mod record;
pub mod replay;
pub mod storage;

pub use day_log::{DayLog, DayLogStore, LineReader};
pub use medium::{FsMedium, MemoryMedium, StorageMedium};
pub use replay::{AbortHandle, ReplayEngine, ReplayReport};
pub use storage::StorageWriter;

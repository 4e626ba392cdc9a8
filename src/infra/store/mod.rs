//! Store backends.

pub mod file;
pub mod memory;
pub mod table;

pub use file::FileTaskStore;
pub use memory::MemoryTaskStore;
pub use table::{TaskTable, DEFAULT_CLAIM_TIMEOUT_SECS};

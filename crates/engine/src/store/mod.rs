pub mod memory;
pub mod sqlite;

pub use memory::MemoryBarStore;
pub use sqlite::SqliteBarStore;

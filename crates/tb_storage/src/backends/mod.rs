pub mod blocking;
pub mod file;
pub mod memory;
pub mod supabase;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use blocking::{BlockingStorage, SyncArticleStore};
pub use file::{FileStorage, JsonFileStore};
pub use memory::MemoryStorage;
pub use supabase::SupabaseStorage;

#[cfg(feature = "sqlite")]
pub use sqlite::SQLiteStorage;

//! Persistence layer — remote user directory and expense store.

pub mod memory;
pub mod supabase;
pub mod traits;

pub use memory::MemoryStore;
pub use supabase::{SupabaseConfig, SupabaseStore};
pub use traits::{ExpenseStore, UserDirectory};

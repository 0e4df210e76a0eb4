pub mod store;
pub mod types;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use store::MemoryStore;

/// Memory store shared between tool handlers, the approval monitor, and the
/// file-watcher thread.
pub type SharedMemory = Arc<Mutex<MemoryStore>>;

/// Lock the shared store, ignoring poisoning. Every mutation is a single
/// map or vec operation followed by a save.
pub fn lock(memory: &SharedMemory) -> MutexGuard<'_, MemoryStore> {
    memory.lock().unwrap_or_else(PoisonError::into_inner)
}

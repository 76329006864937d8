mod file_store;
mod model;
mod store;

pub use file_store::{data_dir_from_env, FileHistoryStore};
pub use model::{ChatMessage, HistoryPage, MessageRole};
pub use store::{HistoryStore, MemoryHistoryStore};

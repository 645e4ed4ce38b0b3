//! Session store adapters

mod file;

pub use file::JsonFileSessionStore;
pub use tribunal_application::ports::session_store::InMemorySessionStore;

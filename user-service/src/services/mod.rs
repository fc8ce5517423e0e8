pub mod database;
pub mod memory;
pub mod sessions;
pub mod store;

pub use database::UserDb;
pub use memory::MemorySessionStore;
pub use sessions::{CreateOutcome, SessionService};
pub use store::{InsertOutcome, SessionStore};

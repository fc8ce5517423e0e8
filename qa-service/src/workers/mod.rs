pub mod persistence;

pub use persistence::{PersistenceHandle, PersistencePool};

pub mod session;

pub use session::{Session, SessionStatus, DEFAULT_SESSION_TITLE};

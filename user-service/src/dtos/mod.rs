pub mod session;

pub use session::{CreateSessionRequest, SessionResponse};

pub mod coordinator;
pub mod database;
pub mod history;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod registry;
pub mod relay;

pub use coordinator::SessionCoordinator;
pub use database::QaDb;
pub use history::{HistoryRecorder, HistoryStore};
pub use orchestrator::ChatOrchestrator;
pub use registry::{SessionRegistry, UserServiceRegistry};
pub use relay::{ChatStream, StreamEvent, StreamRelay};

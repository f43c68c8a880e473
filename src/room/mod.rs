//! Multi-room connection manager and event fan-out.
pub mod format;
mod registry;
mod session;
mod subscribers;

pub use registry::{ConnectOutcome, RegistryError, RoomRegistry};
pub use session::{ConnectionStatus, RoomSession, RoomSummary};
pub use subscribers::{Subscriber, SubscriberSet};

pub mod chain;
pub mod deadline;
pub mod manager;

pub use chain::*;
pub use deadline::*;
pub use manager::*;
pub use warden_events::{ControlPlaneEvent, EventBus};

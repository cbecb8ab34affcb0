pub mod enforcer;
pub mod overrides;

pub use enforcer::*;
pub use overrides::*;
pub use warden_types::{AuthorityLevel, LiabilityLevel};

pub mod filter;
pub mod retry;
pub mod traits;

#[cfg(feature = "memory-store")]
pub mod memory;

#[cfg(feature = "sqlite-store")]
pub mod sqlite;

pub use filter::*;
pub use retry::*;
pub use traits::*;

#[cfg(feature = "memory-store")]
pub use memory::*;

#[cfg(feature = "sqlite-store")]
pub use sqlite::*;

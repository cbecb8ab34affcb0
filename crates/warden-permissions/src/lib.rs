pub mod attenuation;
pub mod glob;

pub use attenuation::*;
pub use glob::*;

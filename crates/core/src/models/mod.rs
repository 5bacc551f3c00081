//! Data models for Tasbih

mod counter;
mod profile;

pub use counter::*;
pub use profile::*;

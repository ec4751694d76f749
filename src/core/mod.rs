//! Core primitives.
//!
//! Geometry, capability bits and the signal model. No state lives here.

pub mod vec3;
pub mod capability;
pub mod signal;

// Re-export core types
pub use vec3::Vec3;
pub use capability::Capabilities;
pub use signal::{signal_strength, link_signal, effective_range, SIGNAL_MAX};

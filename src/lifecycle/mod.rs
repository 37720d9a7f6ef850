//! Wiring, startup and shutdown of the backend, plus log setup.

pub mod system;
pub mod tracing;

pub use system::{Backend, Collaborators, StartError};
pub use self::tracing::setup_tracing;

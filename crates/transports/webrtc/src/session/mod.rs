//! Signaling sessions and the registry that tracks them

pub mod id;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;

pub use id::SessionId;
pub use registry::SessionRegistry;
pub use session::{SessionEvent, SessionState, SignalingSession};

//! Host Shell
//!
//! In-process service around the engine: a tokio task that owns the state,
//! drives ticks and pushes results to player sessions.
//! Framing and sockets are left to the host.

pub mod config;
pub mod protocol;
pub mod session;
pub mod service;

pub use config::ServiceConfig;
pub use protocol::{
    ClientMessage, ServerMessage, NetworkRequest, RequestResult, RequestOutcome,
    DeviceConnectivityUpdate, PlayerConnectivityUpdate, ServerError, ErrorCode, ProtocolError,
};
pub use session::{SessionRegistry, PushError, PushStats};
pub use service::{MeshService, MeshHandle, ServiceError, ServiceStatus};

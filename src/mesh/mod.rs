//! Mesh Engine
//!
//! Device registry, spatial index, connectivity and network lifecycle.
//! Single-threaded; the owner of `MeshState` drives it one tick at a time.
//!
//! ## Module Structure
//!
//! - `device`: Devices, player ids and the device registry
//! - `spatial`: Uniform grid for neighbor queries
//! - `connectivity`: Link test and reachability
//! - `network`: Named, password-gated device groups
//! - `lifecycle`: Create/join/leave/merge
//! - `fanout`: Per-device and per-player views
//! - `events`: Notifications for subscribers
//! - `state`: The context object
//! - `tick`: Fixed-rate update

pub mod device;
pub mod spatial;
pub mod connectivity;
pub mod network;
pub mod lifecycle;
pub mod fanout;
pub mod events;
pub mod state;
pub mod tick;

// Re-export key types
pub use device::{Device, DeviceId, DeviceUpdate, DeviceRegistry, PlayerId};
pub use spatial::{SpatialIndex, IndexConfig, RebuildReason};
pub use connectivity::{connected, Resolver, Traversal};
pub use network::{Network, NetworkId, MemberInfo};
pub use lifecycle::{
    create_or_join, join, leave, merge_check, on_device_unregistered,
    JoinOutcome, LeaveOutcome, MergeRecord, MeshError,
};
pub use fanout::{compute_fanout, apply_fanout, DeviceView, PeerSnapshot, PlayerView, FanoutBatch};
pub use events::{MeshEvent, MeshEventData, DestroyReason};
pub use state::{MeshState, PlayerMembership};
pub use tick::{tick, MeshConfig, TickResult};

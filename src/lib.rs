//! # Mesh Link Server
//!
//! Authoritative connectivity engine for range-limited, ad-hoc device
//! networks in a multiplayer simulation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MESH LINK SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Pure primitives                          │
//! │  ├── vec3.rs      - 3D world positions                       │
//! │  ├── capability.rs- Device capability bits                   │
//! │  └── signal.rs    - Presentational signal strength           │
//! │                                                              │
//! │  mesh/            - Engine (single-threaded, tick-driven)    │
//! │  ├── device.rs    - Devices and the device registry          │
//! │  ├── spatial.rs   - Uniform grid index                       │
//! │  ├── connectivity.rs - Link test and reachability            │
//! │  ├── network.rs   - Named, password-gated networks           │
//! │  ├── lifecycle.rs - Create/join/leave/merge                  │
//! │  ├── fanout.rs    - Per-device and per-player views          │
//! │  ├── state.rs     - Engine context object                    │
//! │  └── tick.rs      - Fixed-rate update                        │
//! │                                                              │
//! │  network/         - Host shell (async)                       │
//! │  ├── service.rs   - Actor owning the engine                  │
//! │  ├── session.rs   - Per-player push channels                 │
//! │  ├── protocol.rs  - Message types                            │
//! │  └── config.rs    - Environment configuration                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `mesh/` module iterates BTreeMaps only, so the same updates and
//! requests in the same order give the same networks, views and events.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod mesh;
pub mod network;

// Re-export commonly used types
pub use core::{Vec3, Capabilities, signal_strength};
pub use mesh::{
    Device, DeviceId, DeviceUpdate, PlayerId, MeshState, MeshConfig, MeshEvent,
    MeshError, Network, NetworkId, JoinOutcome,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine tick rate (Hz)
pub const TICK_RATE: u32 = 10;

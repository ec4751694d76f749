//! Service Configuration
//!
//! Host-shell settings, read from the environment with defaults.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::mesh::spatial::IndexConfig;
use crate::mesh::tick::MeshConfig;

/// Settings for the mesh service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    /// Ticks per second. 0 disables the internal clock; the host steps ticks.
    pub tick_rate: u32,
    /// Ticks between connectivity fan-outs.
    pub fanout_interval_ticks: u64,
    /// Seconds between drift rebuilds of the spatial index.
    pub rebuild_interval_secs: u64,
    /// Outbound buffer per player session.
    pub session_channel_capacity: usize,
    /// Inbound command buffer.
    pub command_channel_capacity: usize,
    /// Event broadcast buffer.
    pub event_channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            fanout_interval_ticks: 1,
            rebuild_interval_secs: 5,
            session_channel_capacity: 64,
            command_channel_capacity: 256,
            event_channel_capacity: 1024,
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables.
    ///
    /// Unset variables keep their defaults. Unparseable ones are logged and
    /// ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_rate: env_or("MESH_TICK_RATE", defaults.tick_rate),
            fanout_interval_ticks: env_or("MESH_FANOUT_INTERVAL_TICKS", defaults.fanout_interval_ticks),
            rebuild_interval_secs: env_or("MESH_REBUILD_INTERVAL_SECS", defaults.rebuild_interval_secs),
            session_channel_capacity: env_or("MESH_SESSION_CHANNEL_CAPACITY", defaults.session_channel_capacity),
            command_channel_capacity: env_or("MESH_COMMAND_CHANNEL_CAPACITY", defaults.command_channel_capacity),
            event_channel_capacity: defaults.event_channel_capacity,
        }
    }

    /// Wall-clock period of one tick, or `None` when ticks are host-driven.
    pub fn tick_period(&self) -> Option<Duration> {
        if self.tick_rate == 0 {
            None
        } else {
            // Absurd rates still get a non-zero period
            Some(Duration::from_nanos((1_000_000_000 / self.tick_rate as u64).max(1)))
        }
    }

    /// Engine tuning derived from these settings.
    pub fn mesh_config(&self) -> MeshConfig {
        let rate = self.tick_rate.max(1) as u64;
        MeshConfig {
            index: IndexConfig {
                rebuild_interval_ticks: self.rebuild_interval_secs.saturating_mul(rate).max(1),
                ..IndexConfig::default()
            },
            fanout_interval_ticks: self.fanout_interval_ticks.max(1),
        }
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid value", key, raw);
            default
        }
    }
}

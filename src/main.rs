//! Mesh Link Server
//!
//! Starts the mesh service and plays a short scripted scenario against it:
//! a join in range, a join out of range, and two same-named networks that
//! merge once their members meet.

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mesh_link::{
    TICK_RATE, VERSION,
    core::{Capabilities, Vec3},
    mesh::{Device, DeviceId, DeviceUpdate, JoinOutcome, PlayerId},
    network::{MeshHandle, MeshService, ServerMessage, ServiceConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    let config = ServiceConfig::from_env();
    info!("Mesh Link Server v{}", VERSION);
    info!("Tick Rate: {} Hz (default {})", config.tick_rate, TICK_RATE);

    let (handle, task) = MeshService::spawn(config);
    demo_scenario(&handle).await?;

    handle.shutdown().await?;
    task.await.context("service task panicked")?;
    Ok(())
}

/// Scripted run of the X/Y/Z/W scenario.
async fn demo_scenario(handle: &MeshHandle) -> anyhow::Result<()> {
    info!("=== Starting Demo Scenario ===");

    let players: Vec<PlayerId> = ["xavier", "yara", "zoe", "wren"]
        .iter()
        .map(|name| PlayerId::from_account(name))
        .collect();
    let (px, py, pz, pw) = (players[0], players[1], players[2], players[3]);

    let x = Device::new(DeviceId(1), "X", Vec3::ZERO, 500.0).with_owner(px);
    let y = Device::new(DeviceId(2), "Y", Vec3::flat(250.0, 0.0), 300.0)
        .with_owner(py)
        .with_capabilities(Capabilities::VIDEO_SOURCE);
    let z = Device::new(DeviceId(3), "Z", Vec3::flat(-1000.0, 0.0), 300.0).with_owner(pz);
    let w = Device::new(DeviceId(4), "W", Vec3::flat(3000.0, 0.0), 300.0).with_owner(pw);
    for device in [x, y, z, w] {
        info!("Registering {} '{}' at {}", device.id, device.name, device.position);
        handle.register_device(device).await?;
    }

    let mut x_inbox = handle.connect(px).await?;

    let created = handle.create_or_join(px, DeviceId(1), "Alpha", "pw1").await?;
    info!("X create_or_join: {:?}", created);

    let joined = handle.join(py, DeviceId(2), "Alpha", "pw1").await?;
    info!("Y join: {:?}", joined);

    let missed = handle.join(pz, DeviceId(3), "Alpha", "pw1").await?;
    info!("Z join: {:?}", missed);
    if missed.is_success() {
        bail!("Z should be out of range");
    }

    let second = handle.create_or_join(pw, DeviceId(4), "Alpha", "pw1").await?;
    info!("W create_or_join: {:?}", second);

    handle.step().await?;
    while let Ok(message) = x_inbox.try_recv() {
        if let ServerMessage::DeviceConnectivity(update) = message {
            for peer in &update.peers {
                info!(
                    "X sees {} '{}' at address {} with signal {:.1}",
                    peer.device, peer.display_name, peer.address, peer.signal
                );
            }
        }
    }

    info!("Moving W next to Y");
    handle
        .update_device(DeviceId(4), DeviceUpdate::moved_to(Vec3::flat(450.0, 0.0)))
        .await?;
    handle.step().await?;

    let status = handle.status().await?;
    info!("Tick {}: {} devices, {} networks", status.tick, status.devices, status.networks);

    let memberships = handle.memberships(pw).await?;
    match memberships.first() {
        Some(membership) => info!(
            "W is in {} '{}' with {:?}",
            membership.network_id, membership.network_name, membership.members
        ),
        None => bail!("W lost its network"),
    }
    if status.networks != 1 || !matches!(created, JoinOutcome::Created(_)) {
        bail!("expected a single merged network");
    }

    info!("=== Scenario Complete ===");
    Ok(())
}

//! Mesh Service
//!
//! Tokio actor that owns `MeshState`. Requests arrive as commands and are
//! handled between ticks, so the engine itself never needs a lock.
//! Results go out over per-player channels and an event broadcast.

use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::mesh::device::{Device, DeviceId, DeviceUpdate, PlayerId};
use crate::mesh::events::{MeshEvent, MeshEventData};
use crate::mesh::lifecycle::{self, JoinOutcome, LeaveOutcome, MeshError};
use crate::mesh::state::{MeshState, PlayerMembership};
use crate::mesh::tick::{tick, TickResult};
use crate::network::config::ServiceConfig;
use crate::network::protocol::{
    ClientMessage, DeviceConnectivityUpdate, MembershipList, NetworkRequest,
    PlayerConnectivityUpdate, RequestResult, ServerError, ServerMessage,
};
use crate::network::session::{PushStats, SessionRegistry};

// =============================================================================
// ERRORS
// =============================================================================

/// Service errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Service task has stopped.
    #[error("mesh service closed")]
    Closed,

    /// Request rejected by the engine.
    #[error("{0}")]
    Mesh(#[from] MeshError),
}

impl<T> From<mpsc::error::SendError<T>> for ServiceError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        ServiceError::Closed
    }
}

impl From<oneshot::error::RecvError> for ServiceError {
    fn from(_: oneshot::error::RecvError) -> Self {
        ServiceError::Closed
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

type Reply<T> = oneshot::Sender<T>;

enum Command {
    RegisterDevice { device: Device, reply: Reply<Result<(), MeshError>> },
    UnregisterDevice { device: DeviceId, reply: Reply<Option<Device>> },
    UpdateDevice { device: DeviceId, update: DeviceUpdate },
    Connect { player: PlayerId, sender: mpsc::Sender<ServerMessage> },
    Disconnect { player: PlayerId },
    CreateOrJoin { player: PlayerId, request: NetworkRequest, reply: Reply<Result<JoinOutcome, MeshError>> },
    Join { player: PlayerId, request: NetworkRequest, reply: Reply<Result<JoinOutcome, MeshError>> },
    Leave { player: PlayerId, device: DeviceId, reply: Reply<Result<LeaveOutcome, MeshError>> },
    ConnectedMembers {
        player: PlayerId,
        device: DeviceId,
        reply: Reply<Result<Option<DeviceConnectivityUpdate>, MeshError>>,
    },
    Memberships { player: PlayerId, reply: Reply<Vec<PlayerMembership>> },
    Step { reply: Reply<u64> },
    Status { reply: Reply<ServiceStatus> },
    Shutdown,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Current engine tick
    pub tick: u64,
    /// Registered devices
    pub devices: usize,
    /// Live networks
    pub networks: usize,
    /// Connected player sessions
    pub players: usize,
    /// Push counters
    pub pushes: PushStats,
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable client of a running [`MeshService`].
#[derive(Clone)]
pub struct MeshHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<MeshEvent>,
    session_capacity: usize,
}

impl MeshHandle {
    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await?;
        Ok(rx.await?)
    }

    /// Register or replace a device.
    pub async fn register_device(&self, device: Device) -> Result<(), ServiceError> {
        Ok(self.call(|reply| Command::RegisterDevice { device, reply }).await??)
    }

    /// Unregister a device, cascading out of its network.
    pub async fn unregister_device(&self, device: DeviceId) -> Result<Option<Device>, ServiceError> {
        self.call(|reply| Command::UnregisterDevice { device, reply }).await
    }

    /// Queue a directory sample for the next tick.
    pub async fn update_device(&self, device: DeviceId, update: DeviceUpdate) -> Result<(), ServiceError> {
        self.commands.send(Command::UpdateDevice { device, update }).await?;
        Ok(())
    }

    /// Open a session for a player. Returns the receiving end of its channel.
    pub async fn connect(&self, player: PlayerId) -> Result<mpsc::Receiver<ServerMessage>, ServiceError> {
        let (sender, receiver) = mpsc::channel(self.session_capacity);
        self.commands.send(Command::Connect { player, sender }).await?;
        Ok(receiver)
    }

    /// Close a player's session.
    pub async fn disconnect(&self, player: PlayerId) -> Result<(), ServiceError> {
        self.commands.send(Command::Disconnect { player }).await?;
        Ok(())
    }

    /// Create a network or join the matching one.
    pub async fn create_or_join(
        &self,
        player: PlayerId,
        device: DeviceId,
        name: &str,
        password: &str,
    ) -> Result<JoinOutcome, ServiceError> {
        let request = network_request(device, name, password);
        Ok(self.call(|reply| Command::CreateOrJoin { player, request, reply }).await??)
    }

    /// Join an existing network.
    pub async fn join(
        &self,
        player: PlayerId,
        device: DeviceId,
        name: &str,
        password: &str,
    ) -> Result<JoinOutcome, ServiceError> {
        let request = network_request(device, name, password);
        Ok(self.call(|reply| Command::Join { player, request, reply }).await??)
    }

    /// Leave the device's network.
    pub async fn leave(&self, player: PlayerId, device: DeviceId) -> Result<LeaveOutcome, ServiceError> {
        Ok(self.call(|reply| Command::Leave { player, device, reply }).await??)
    }

    /// Peers reachable from a device as of the last fan-out.
    pub async fn connected_members(
        &self,
        player: PlayerId,
        device: DeviceId,
    ) -> Result<Option<DeviceConnectivityUpdate>, ServiceError> {
        Ok(self.call(|reply| Command::ConnectedMembers { player, device, reply }).await??)
    }

    /// Every network membership held through the player's devices.
    pub async fn memberships(&self, player: PlayerId) -> Result<Vec<PlayerMembership>, ServiceError> {
        self.call(|reply| Command::Memberships { player, reply }).await
    }

    /// Run one tick now. Returns the new tick number.
    pub async fn step(&self) -> Result<u64, ServiceError> {
        self.call(|reply| Command::Step { reply }).await
    }

    /// Current counters.
    pub async fn status(&self) -> Result<ServiceStatus, ServiceError> {
        self.call(|reply| Command::Status { reply }).await
    }

    /// Stop the service task.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.commands.send(Command::Shutdown).await?;
        Ok(())
    }

    /// Subscribe to every engine event.
    pub fn subscribe(&self) -> broadcast::Receiver<MeshEvent> {
        self.events.subscribe()
    }

    /// Answer a wire message from `player`.
    #[instrument(skip(self, player, message), fields(player = %player.short()))]
    pub async fn request(&self, player: PlayerId, message: ClientMessage) -> Result<ServerMessage, ServiceError> {
        let answer = match message {
            ClientMessage::CreateOrJoin(request) => self
                .create_or_join(player, request.device, &request.name, &request.password)
                .await
                .map(|outcome| ServerMessage::RequestResult(RequestResult::from_join(request.device, outcome))),
            ClientMessage::Join(request) => self
                .join(player, request.device, &request.name, &request.password)
                .await
                .map(|outcome| ServerMessage::RequestResult(RequestResult::from_join(request.device, outcome))),
            ClientMessage::Leave { device } => self
                .leave(player, device)
                .await
                .map(|outcome| ServerMessage::RequestResult(RequestResult::from_leave(device, outcome))),
            ClientMessage::GetConnectedMembers { device } => match self.connected_members(player, device).await {
                Ok(Some(view)) => Ok(ServerMessage::DeviceConnectivity(view)),
                // Not in a network, or no fan-out since it joined
                Ok(None) => Err(ServiceError::Mesh(MeshError::NotInNetwork(device))),
                Err(err) => Err(err),
            },
            ClientMessage::GetMemberships => self
                .memberships(player)
                .await
                .map(|memberships| ServerMessage::Memberships(MembershipList { memberships })),
            ClientMessage::Ping { timestamp } => {
                let tick = self.status().await?.tick;
                Ok(ServerMessage::Pong { timestamp, tick })
            }
        };

        match answer {
            Ok(message) => Ok(message),
            Err(ServiceError::Mesh(err)) => {
                debug!("Request rejected: {}", err);
                Ok(ServerMessage::Error(ServerError::from(&err)))
            }
            Err(ServiceError::Closed) => Err(ServiceError::Closed),
        }
    }
}

impl MeshHandle {
    /// Decode a JSON request and answer it. Malformed input gets an error reply.
    pub async fn request_json(&self, player: PlayerId, raw: &str) -> Result<ServerMessage, ServiceError> {
        match ClientMessage::from_json(raw) {
            Ok(message) => self.request(player, message).await,
            Err(err) => {
                debug!("Malformed request from {}: {}", player.short(), err);
                Ok(ServerMessage::Error(ServerError::from(&err)))
            }
        }
    }
}

fn network_request(device: DeviceId, name: &str, password: &str) -> NetworkRequest {
    NetworkRequest {
        device,
        name: name.to_string(),
        password: password.to_string(),
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// The actor owning the engine state.
pub struct MeshService {
    config: ServiceConfig,
    state: MeshState,
    sessions: SessionRegistry,
    /// Directory samples waiting for the next tick
    pending_updates: BTreeMap<DeviceId, DeviceUpdate>,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<MeshEvent>,
}

impl MeshService {
    /// Create a service and its handle. Call [`MeshService::run`] to start it.
    pub fn new(config: ServiceConfig) -> (Self, MeshHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity.max(1));
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        let handle = MeshHandle {
            commands: command_tx,
            events: event_tx.clone(),
            session_capacity: config.session_channel_capacity.max(1),
        };
        let service = Self {
            state: MeshState::new(config.mesh_config()),
            config,
            sessions: SessionRegistry::new(),
            pending_updates: BTreeMap::new(),
            commands: command_rx,
            events: event_tx,
        };
        (service, handle)
    }

    /// Create and spawn a service on the current runtime.
    pub fn spawn(config: ServiceConfig) -> (MeshHandle, JoinHandle<()>) {
        let (service, handle) = Self::new(config);
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    /// Run until shutdown or until every handle is dropped.
    #[instrument(skip(self), fields(tick_rate = self.config.tick_rate))]
    pub async fn run(mut self) {
        let mut ticker = self.config.tick_period().map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        info!("Mesh service started");
        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => {
                    self.run_tick();
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        break;
                    };
                    if !self.handle_command(command) {
                        break;
                    }
                }
            }
        }
        info!("Mesh service stopped at tick {}", self.state.tick);
    }

    /// Handle one command. Returns false on shutdown.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::RegisterDevice { device, reply } => {
                let _ = reply.send(self.state.register_device(device));
            }
            Command::UnregisterDevice { device, reply } => {
                self.pending_updates.remove(&device);
                let _ = reply.send(self.state.unregister_device(device));
            }
            Command::UpdateDevice { device, update } => {
                let merged = match self.pending_updates.remove(&device) {
                    Some(previous) => previous.merged_with(update),
                    None => update,
                };
                self.pending_updates.insert(device, merged);
            }
            Command::Connect { player, sender } => {
                self.sessions.connect(player, sender);
            }
            Command::Disconnect { player } => {
                self.sessions.disconnect(player);
            }
            Command::CreateOrJoin { player, request, reply } => {
                let result = self.authorize(player, request.device).and_then(|()| {
                    lifecycle::create_or_join(&mut self.state, request.device, &request.name, &request.password)
                });
                let _ = reply.send(result);
            }
            Command::Join { player, request, reply } => {
                let result = self.authorize(player, request.device).and_then(|()| {
                    lifecycle::join(&mut self.state, request.device, &request.name, &request.password)
                });
                let _ = reply.send(result);
            }
            Command::Leave { player, device, reply } => {
                let result = self
                    .authorize(player, device)
                    .and_then(|()| lifecycle::leave(&mut self.state, device));
                let _ = reply.send(result);
            }
            Command::ConnectedMembers { player, device, reply } => {
                let result = self.authorize(player, device).map(|()| {
                    self.state
                        .connected_members(device)
                        .map(|view| DeviceConnectivityUpdate::from_view(self.state.tick, view))
                });
                let _ = reply.send(result);
            }
            Command::Memberships { player, reply } => {
                let _ = reply.send(self.state.memberships_for_player(player));
            }
            Command::Step { reply } => {
                self.run_tick();
                let _ = reply.send(self.state.tick);
            }
            Command::Status { reply } => {
                let _ = reply.send(ServiceStatus {
                    tick: self.state.tick,
                    devices: self.state.registry().len(),
                    networks: self.state.network_count(),
                    players: self.sessions.len(),
                    pushes: self.sessions.stats(),
                });
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// The requesting player must control the device.
    fn authorize(&self, player: PlayerId, device: DeviceId) -> Result<(), MeshError> {
        let record = self.state.device(device).ok_or(MeshError::DeviceNotFound(device))?;
        if record.owner != Some(player) {
            warn!("Player {} tried to act on {}", player.short(), device);
            return Err(MeshError::NotOwner { device, player });
        }
        Ok(())
    }

    fn run_tick(&mut self) -> TickResult {
        let updates = std::mem::take(&mut self.pending_updates);
        let result = tick(&mut self.state, &updates);
        self.distribute(&result);
        result
    }

    /// Publish events and push fan-out views to their owners.
    fn distribute(&mut self, result: &TickResult) {
        for event in &result.events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
            for player in self.recipients(event) {
                let _ = self.sessions.push(player, ServerMessage::Event(event.clone()));
            }
        }

        let Some(batch) = &result.fanout else {
            return;
        };
        for view in &batch.device_views {
            // Ownerless devices are computed but not pushed
            let Some(owner) = view.owner else {
                continue;
            };
            let update = DeviceConnectivityUpdate::from_view(batch.tick, view);
            let _ = self.sessions.push(owner, ServerMessage::DeviceConnectivity(update));
        }
        for view in &batch.player_views {
            let update = PlayerConnectivityUpdate::from_view(batch.tick, view);
            let _ = self.sessions.push(view.player, ServerMessage::PlayerConnectivity(update));
        }
    }

    /// Players an event should be pushed to.
    ///
    /// Owners recorded on the event win over the registry, which no longer
    /// knows devices unregistered earlier in the tick.
    fn recipients(&self, event: &MeshEvent) -> BTreeSet<PlayerId> {
        let owner_of = |device: &DeviceId| self.state.device(*device).and_then(|d| d.owner);
        match &event.data {
            MeshEventData::BroadcastingSourcesChanged { player, .. } => BTreeSet::from([*player]),
            MeshEventData::NetworkJoined { owner, .. } | MeshEventData::NetworkLeft { owner, .. } => {
                owner.iter().copied().collect()
            }
            MeshEventData::MembershipChanged { members, .. } => members.iter().filter_map(owner_of).collect(),
            _ => event.device().as_ref().and_then(owner_of).into_iter().collect(),
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec3::Vec3;
    use crate::mesh::network::NetworkId;
    use crate::network::protocol::{ErrorCode, RequestOutcome};

    fn manual() -> ServiceConfig {
        ServiceConfig {
            tick_rate: 0,
            ..Default::default()
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[tokio::test]
    async fn test_create_join_and_fanout_push() {
        let (handle, _task) = MeshService::spawn(manual());
        let p1 = PlayerId::new([1; 16]);
        let p2 = PlayerId::new([2; 16]);

        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 500.0).with_owner(p1)).await.unwrap();
        handle.register_device(Device::new(DeviceId(2), "Y", Vec3::flat(250.0, 0.0), 300.0).with_owner(p2)).await.unwrap();
        let mut rx1 = handle.connect(p1).await.unwrap();

        let created = handle.create_or_join(p1, DeviceId(1), "Alpha", "pw1").await.unwrap();
        assert_eq!(created, JoinOutcome::Created(NetworkId(1)));
        let joined = handle.join(p2, DeviceId(2), "Alpha", "pw1").await.unwrap();
        assert_eq!(joined, JoinOutcome::Joined(NetworkId(1)));

        assert_eq!(handle.step().await.unwrap(), 1);

        let messages = drain(&mut rx1);
        let view = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::DeviceConnectivity(update) => Some(update.clone()),
                _ => None,
            })
            .expect("device view pushed");
        assert_eq!(view.device, DeviceId(1));
        assert_eq!(view.peers.len(), 1);
        assert!((view.peers[0].signal - 16.67).abs() < 0.01);

        let players = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::PlayerConnectivity(update) => Some(update.clone()),
                _ => None,
            })
            .expect("player view pushed");
        assert_eq!(players.visible_players, vec![p2]);

        let cached = handle.connected_members(p1, DeviceId(1)).await.unwrap().unwrap();
        assert_eq!(cached.peers[0].device, DeviceId(2));
    }

    #[tokio::test]
    async fn test_not_owner_rejected() {
        let (handle, _task) = MeshService::spawn(manual());
        let owner = PlayerId::new([1; 16]);
        let intruder = PlayerId::new([9; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(owner)).await.unwrap();

        let result = handle.create_or_join(intruder, DeviceId(1), "Alpha", "pw1").await;
        assert_eq!(
            result,
            Err(ServiceError::Mesh(MeshError::NotOwner { device: DeviceId(1), player: intruder }))
        );
        assert_eq!(handle.status().await.unwrap().networks, 0);
    }

    #[tokio::test]
    async fn test_wire_request() {
        let (handle, _task) = MeshService::spawn(manual());
        let p1 = PlayerId::new([1; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(p1)).await.unwrap();

        let message = ClientMessage::from_json(
            r#"{"type":"create_or_join","device":1,"name":"Alpha","password":"pw1"}"#,
        )
        .unwrap();
        match handle.request(p1, message).await.unwrap() {
            ServerMessage::RequestResult(result) => {
                assert_eq!(result.outcome, RequestOutcome::Created);
                assert_eq!(result.network_id, Some(NetworkId(1)));
            }
            other => panic!("unexpected {:?}", other),
        }

        match handle.request(p1, ClientMessage::Leave { device: DeviceId(7) }).await.unwrap() {
            ServerMessage::Error(error) => assert_eq!(error.code, ErrorCode::DeviceNotFound),
            other => panic!("unexpected {:?}", other),
        }

        match handle.request(p1, ClientMessage::GetMemberships).await.unwrap() {
            ServerMessage::Memberships(list) => assert_eq!(list.memberships.len(), 1),
            other => panic!("unexpected {:?}", other),
        }

        // joined but no fan-out yet
        match handle.request(p1, ClientMessage::GetConnectedMembers { device: DeviceId(1) }).await.unwrap() {
            ServerMessage::Error(error) => assert_eq!(error.code, ErrorCode::NotInNetwork),
            other => panic!("unexpected {:?}", other),
        }

        match handle.request_json(p1, "{\"type\":\"warp\"}").await.unwrap() {
            ServerMessage::Error(error) => assert_eq!(error.code, ErrorCode::InvalidMessage),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_broadcast_on_tick() {
        let (handle, _task) = MeshService::spawn(manual());
        let mut events = handle.subscribe();
        let p1 = PlayerId::new([1; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(p1)).await.unwrap();
        handle.create_or_join(p1, DeviceId(1), "Alpha", "pw1").await.unwrap();
        handle.step().await.unwrap();

        let first = events.recv().await.unwrap();
        assert!(matches!(first.data, MeshEventData::NetworkCreated { network_id: NetworkId(1), .. }));
    }

    #[tokio::test]
    async fn test_updates_applied_on_next_tick() {
        let (handle, _task) = MeshService::spawn(manual());
        let p1 = PlayerId::new([1; 16]);
        let p2 = PlayerId::new([2; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(p1)).await.unwrap();
        handle.register_device(Device::new(DeviceId(2), "W", Vec3::flat(5000.0, 0.0), 100.0).with_owner(p2)).await.unwrap();
        handle.create_or_join(p1, DeviceId(1), "Alpha", "pw1").await.unwrap();
        handle.create_or_join(p2, DeviceId(2), "Alpha", "pw1").await.unwrap();
        assert_eq!(handle.status().await.unwrap().networks, 2);

        handle.update_device(DeviceId(2), DeviceUpdate::moved_to(Vec3::flat(2000.0, 0.0))).await.unwrap();
        handle.update_device(DeviceId(2), DeviceUpdate::moved_to(Vec3::flat(50.0, 0.0))).await.unwrap();
        handle.step().await.unwrap();

        assert_eq!(handle.status().await.unwrap().networks, 1);
        let memberships = handle.memberships(p2).await.unwrap();
        assert_eq!(memberships[0].network_id, NetworkId(1));
    }

    #[tokio::test]
    async fn test_owner_told_when_device_unregistered() {
        let (handle, _task) = MeshService::spawn(manual());
        let p1 = PlayerId::new([1; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(p1)).await.unwrap();
        let mut rx = handle.connect(p1).await.unwrap();
        handle.create_or_join(p1, DeviceId(1), "Alpha", "pw1").await.unwrap();
        handle.step().await.unwrap();
        drain(&mut rx);

        handle.unregister_device(DeviceId(1)).await.unwrap();
        handle.step().await.unwrap();

        let left: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Event(event) => match event.data {
                    MeshEventData::NetworkLeft { device, network_id, .. } => Some((device, network_id)),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(left, vec![(DeviceId(1), NetworkId(1))]);
    }

    #[tokio::test]
    async fn test_owner_told_when_access_lost() {
        let (handle, _task) = MeshService::spawn(manual());
        let p1 = PlayerId::new([1; 16]);
        handle.register_device(Device::new(DeviceId(1), "X", Vec3::ZERO, 100.0).with_owner(p1)).await.unwrap();
        let mut rx = handle.connect(p1).await.unwrap();
        handle.create_or_join(p1, DeviceId(1), "Alpha", "pw1").await.unwrap();
        handle.step().await.unwrap();
        drain(&mut rx);

        let update = DeviceUpdate::default().with_capabilities(crate::core::capability::Capabilities::NONE);
        handle.update_device(DeviceId(1), update).await.unwrap();
        handle.step().await.unwrap();

        assert!(drain(&mut rx).iter().any(|m| matches!(
            m,
            ServerMessage::Event(MeshEvent { data: MeshEventData::NetworkLeft { device: DeviceId(1), .. }, .. })
        )));
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let (handle, task) = MeshService::spawn(manual());
        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(handle.step().await, Err(ServiceError::Closed));
    }

    #[tokio::test]
    async fn test_clock_drives_ticks() {
        let config = ServiceConfig {
            tick_rate: 200,
            ..Default::default()
        };
        let (handle, _task) = MeshService::spawn(config);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(handle.status().await.unwrap().tick > 0);
    }
}

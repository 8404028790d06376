use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{Street, Table, TableConfig};
use crate::external::{is_69_92_hand, AllowList, EarningsStore, EarningsUpdate};

use super::messages::{InboundMessage, OutboundMessage};

const LOG_TARGET: &str = "hub::session";

/// Tunable timers, all overridable via configuration (matching the
/// original's module-level constants).
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub leave_grace: Duration,
    pub gauge_timeout: Duration,
    pub runout_delay: Duration,
    pub hand_delay: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            leave_grace: Duration::from_secs(30),
            gauge_timeout: Duration::from_secs(30),
            runout_delay: Duration::from_millis(1600),
            hand_delay: Duration::from_millis(1000),
        }
    }
}

pub type ConnectionId = u64;

/// Internal event, carried on the table's single serializing `mpsc`
/// channel. Every inbound client message and every timer firing becomes
/// one of these and is handled strictly in arrival order.
pub enum HubEvent {
    Connect {
        connection_id: ConnectionId,
        outbound_tx: mpsc::Sender<OutboundMessage>,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Inbound {
        connection_id: ConnectionId,
        message: InboundMessage,
    },
    LeaveGraceFired {
        player_id: String,
    },
    DisconnectGraceFired {
        player_id: String,
    },
    GaugeTimeoutFired,
    StartHandDelayFired,
    RunoutTick,
}

/// A cheaply clonable reference to a running table task, keyed into the
/// process-wide registry.
#[derive(Clone)]
pub struct TableHandle {
    pub table_id: String,
    event_tx: mpsc::Sender<HubEvent>,
}

impl TableHandle {
    pub async fn dispatch(&self, connection_id: ConnectionId, message: InboundMessage) {
        let _ = self
            .event_tx
            .send(HubEvent::Inbound {
                connection_id,
                message,
            })
            .await;
    }

    pub async fn connect(&self, connection_id: ConnectionId) -> mpsc::Receiver<OutboundMessage> {
        let (tx, rx) = mpsc::channel(64);
        let _ = self
            .event_tx
            .send(HubEvent::Connect {
                connection_id,
                outbound_tx: tx,
            })
            .await;
        rx
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let _ = self
            .event_tx
            .send(HubEvent::Disconnect { connection_id })
            .await;
    }
}

pub type TableRegistry = DashMap<String, TableHandle>;

/// Spawns the single task that will own and serialize all mutation of one
/// table, and registers its handle.
pub fn spawn_table(
    registry: &TableRegistry,
    table_id: impl Into<String>,
    config: TableConfig,
    hub_config: HubConfig,
    allow_list: Arc<dyn AllowList>,
    earnings: Arc<dyn EarningsStore>,
) -> TableHandle {
    let table_id = table_id.into();
    let (event_tx, event_rx) = mpsc::channel(512);
    let handle = TableHandle {
        table_id: table_id.clone(),
        event_tx: event_tx.clone(),
    };

    let hub = SessionHub::new(
        table_id.clone(),
        config,
        hub_config,
        allow_list,
        earnings,
        event_tx,
    );
    tokio::spawn(hub.run(event_rx));

    registry.insert(table_id, handle.clone());
    handle
}

struct SessionHub {
    table_id: String,
    table: Table,
    hub_config: HubConfig,
    allow_list: Arc<dyn AllowList>,
    earnings: Arc<dyn EarningsStore>,
    self_tx: mpsc::Sender<HubEvent>,

    connections: HashMap<ConnectionId, mpsc::Sender<OutboundMessage>>,
    connection_players: HashMap<ConnectionId, String>,
    player_connections: HashMap<String, ConnectionId>,

    leave_timers: HashMap<String, CancellationToken>,
    disconnect_timers: HashMap<String, CancellationToken>,
    gauge_token: Option<CancellationToken>,
    settlement_ready: HashSet<String>,
    start_hand_token: Option<CancellationToken>,
    runout_token: Option<CancellationToken>,
}

impl SessionHub {
    fn new(
        table_id: String,
        config: TableConfig,
        hub_config: HubConfig,
        allow_list: Arc<dyn AllowList>,
        earnings: Arc<dyn EarningsStore>,
        self_tx: mpsc::Sender<HubEvent>,
    ) -> Self {
        Self {
            table: Table::new(table_id.clone(), config),
            table_id,
            hub_config,
            allow_list,
            earnings,
            self_tx,
            connections: HashMap::new(),
            connection_players: HashMap::new(),
            player_connections: HashMap::new(),
            leave_timers: HashMap::new(),
            disconnect_timers: HashMap::new(),
            gauge_token: None,
            settlement_ready: HashSet::new(),
            start_hand_token: None,
            runout_token: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<HubEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle_event(event).await;
        }
        tracing::info!(target: LOG_TARGET, table_id = %self.table_id, "hub task exiting, channel closed");
    }

    async fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Connect {
                connection_id,
                outbound_tx,
            } => {
                self.connections.insert(connection_id, outbound_tx);
                self.send_state_to(connection_id, OutboundMessage::TableState).await;
            }
            HubEvent::Disconnect { connection_id } => {
                self.connections.remove(&connection_id);
                if let Some(player_id) = self.connection_players.remove(&connection_id) {
                    if self.player_connections.get(&player_id) == Some(&connection_id) {
                        self.player_connections.remove(&player_id);
                        self.arm_disconnect_grace(player_id);
                    }
                }
            }
            HubEvent::Inbound {
                connection_id,
                message,
            } => self.handle_inbound(connection_id, message).await,
            HubEvent::LeaveGraceFired { player_id } => self.on_leave_grace_fired(player_id).await,
            HubEvent::DisconnectGraceFired { player_id } => {
                self.on_disconnect_grace_fired(player_id).await
            }
            HubEvent::GaugeTimeoutFired => self.on_gauge_timeout_fired().await,
            HubEvent::StartHandDelayFired => self.on_start_hand_delay_fired().await,
            HubEvent::RunoutTick => self.on_runout_tick().await,
        }
    }

    // ---- inbound dispatch -------------------------------------------------

    async fn handle_inbound(&mut self, connection_id: ConnectionId, message: InboundMessage) {
        match message {
            InboundMessage::JoinTable { player_id, name } => {
                if !self.is_allowed(&player_id).await {
                    self.send_error(connection_id, "not on allow list".to_string())
                        .await;
                    return;
                }
                self.cancel_leave_timer(&player_id);
                self.cancel_disconnect_timer(&player_id);
                self.guard(|t| t.set_auto_play(&player_id, false));
                self.connection_players
                    .insert(connection_id, player_id.clone());
                self.player_connections
                    .insert(player_id.clone(), connection_id);
                match self.guard(|t| t.join(&player_id, &name)) {
                    Some(Ok(_)) => self.broadcast_table_state().await,
                    Some(Err(err)) => self.send_error(connection_id, err.to_string()).await,
                    None => {}
                }
            }
            InboundMessage::ReserveSeat {
                player_id,
                name,
                seat_index,
            } => {
                self.cancel_leave_timer(&player_id);
                self.cancel_disconnect_timer(&player_id);
                self.connection_players
                    .insert(connection_id, player_id.clone());
                self.player_connections
                    .insert(player_id.clone(), connection_id);
                match self.guard(|t| t.reserve_seat(&player_id, &name, seat_index)) {
                    Some(Ok(_)) => self.broadcast_table_state().await,
                    Some(Err(err)) => self.send_error(connection_id, err.to_string()).await,
                    None => {}
                }
            }
            InboundMessage::LeaveTable { player_id } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                self.arm_leave_grace(player_id);
            }
            InboundMessage::LeaveAfterHand { player_id } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                self.guard(|t| t.mark_leave_after_hand(&player_id));
            }
            InboundMessage::CancelLeaveAfterHand { player_id } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                self.guard(|t| t.cancel_leave_after_hand(&player_id));
            }
            InboundMessage::Action { player_id, action } => {
                match self.guard(|t| t.record_action(&player_id, action)) {
                    Some(Ok(())) => {
                        self.broadcast(OutboundMessage::ActionApplied { player_id, action })
                            .await;
                        self.broadcast_table_state().await;
                        self.after_mutation().await;
                    }
                    Some(Err(err)) => self.send_error(connection_id, err.to_string()).await,
                    None => {}
                }
            }
            InboundMessage::NextHandGaugeComplete { player_id } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                if self.gauge_token.is_none() {
                    return;
                }
                self.settlement_ready.insert(player_id);
                let connected: HashSet<String> =
                    self.player_connections.keys().cloned().collect();
                if connected.is_subset(&self.settlement_ready) {
                    self.resolve_settlement_barrier().await;
                }
            }
            InboundMessage::RevealHand { player_id } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                self.guard(|t| t.reveal_hand(&player_id));
                self.broadcast_table_state().await;
            }
            InboundMessage::SyncState => {
                self.send_state_to(connection_id, OutboundMessage::TableState).await;
            }
            InboundMessage::Heartbeat => {}
            InboundMessage::StartHand => {
                if self.table.street() == Street::Waiting
                    && self.table.occupied_player_ids().len() >= 2
                    && self.start_hand_token.is_none()
                {
                    self.arm_start_hand_delay();
                }
            }
            InboundMessage::ResetTable => {
                self.guard(|t| t.reset_table());
                self.broadcast_table_state().await;
            }
            InboundMessage::SetAutoPlay { player_id, enabled } => {
                let Some(player_id) = self.resolve_player(connection_id, player_id) else {
                    return;
                };
                self.guard(|t| t.set_auto_play(&player_id, enabled));
                self.broadcast_table_state().await;
            }
        }
    }

    fn resolve_player(
        &self,
        connection_id: ConnectionId,
        explicit: Option<String>,
    ) -> Option<String> {
        explicit.or_else(|| self.connection_players.get(&connection_id).cloned())
    }

    /// An empty allow list means "no restriction configured" rather than
    /// "deny everyone" — matching the local-file default when no file exists.
    async fn is_allowed(&self, player_id: &str) -> bool {
        match self.allow_list.allowed_emails().await {
            Ok(allowed) if allowed.is_empty() => true,
            Ok(allowed) => allowed.contains(&player_id.trim().to_lowercase()),
            Err(err) => {
                tracing::error!(target: LOG_TARGET, %err, "allow list lookup failed, denying join");
                false
            }
        }
    }

    /// Runs a table mutation behind `catch_unwind`. On panic, the table is
    /// reset to an empty waiting state — seats are lost, but no half-applied
    /// bet can linger, matching the "abort the hand" failure policy.
    fn guard<F, R>(&mut self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Table) -> R,
    {
        match std::panic::catch_unwind(AssertUnwindSafe(|| f(&mut self.table))) {
            Ok(result) => Some(result),
            Err(_) => {
                tracing::error!(
                    target: LOG_TARGET,
                    table_id = %self.table_id,
                    "panic during table mutation; resetting table to waiting"
                );
                self.table = Table::new(self.table_id.clone(), self.table.config.clone());
                None
            }
        }
    }

    // ---- timers -------------------------------------------------------

    fn arm_leave_grace(&mut self, player_id: String) {
        self.cancel_leave_timer(&player_id);
        let token = CancellationToken::new();
        self.leave_timers.insert(player_id.clone(), token.clone());
        self.spawn_timer(token, self.hub_config.leave_grace, move || {
            HubEvent::LeaveGraceFired {
                player_id: player_id.clone(),
            }
        });
    }

    fn arm_disconnect_grace(&mut self, player_id: String) {
        self.cancel_disconnect_timer(&player_id);
        let token = CancellationToken::new();
        self.disconnect_timers
            .insert(player_id.clone(), token.clone());
        self.spawn_timer(token, self.hub_config.leave_grace, move || {
            HubEvent::DisconnectGraceFired {
                player_id: player_id.clone(),
            }
        });
    }

    fn cancel_leave_timer(&mut self, player_id: &str) {
        if let Some(token) = self.leave_timers.remove(player_id) {
            token.cancel();
        }
    }

    fn cancel_disconnect_timer(&mut self, player_id: &str) {
        if let Some(token) = self.disconnect_timers.remove(player_id) {
            token.cancel();
        }
    }

    fn arm_gauge_timeout(&mut self) {
        let token = CancellationToken::new();
        self.gauge_token = Some(token.clone());
        self.spawn_timer(token, self.hub_config.gauge_timeout, || {
            HubEvent::GaugeTimeoutFired
        });
    }

    fn arm_start_hand_delay(&mut self) {
        let token = CancellationToken::new();
        self.start_hand_token = Some(token.clone());
        self.spawn_timer(token, self.hub_config.hand_delay, || {
            HubEvent::StartHandDelayFired
        });
    }

    fn arm_runout_tick(&mut self) {
        let token = CancellationToken::new();
        self.runout_token = Some(token.clone());
        self.spawn_timer(token, self.hub_config.runout_delay, || HubEvent::RunoutTick);
    }

    fn spawn_timer<F>(&self, token: CancellationToken, duration: Duration, make_event: F)
    where
        F: FnOnce() -> HubEvent + Send + 'static,
    {
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(duration) => {
                    let _ = tx.send(make_event()).await;
                }
            }
        });
    }

    async fn on_leave_grace_fired(&mut self, player_id: String) {
        self.leave_timers.remove(&player_id);
        if self.player_connections.contains_key(&player_id) {
            tracing::debug!(target: LOG_TARGET, %player_id, "leave grace fired but player reconnected, ignoring");
            return;
        }
        self.guard(|t| t.leave(&player_id));
        self.broadcast_table_state().await;
        self.after_mutation().await;
    }

    async fn on_disconnect_grace_fired(&mut self, player_id: String) {
        self.disconnect_timers.remove(&player_id);
        if self.player_connections.contains_key(&player_id) {
            tracing::debug!(target: LOG_TARGET, %player_id, "disconnect grace fired but player reconnected, ignoring");
            return;
        }
        self.guard(|t| t.set_auto_play(&player_id, true));
        self.broadcast_table_state().await;
        self.after_mutation().await;
    }

    async fn on_gauge_timeout_fired(&mut self) {
        if self.gauge_token.is_none() {
            return;
        }
        self.resolve_settlement_barrier().await;
    }

    async fn on_start_hand_delay_fired(&mut self) {
        self.start_hand_token = None;
        if self.table.street() != Street::Waiting {
            return;
        }
        self.guard(|t| t.start_new_hand());
        self.broadcast_state(OutboundMessage::HandState).await;
        self.after_mutation().await;
    }

    async fn on_runout_tick(&mut self) {
        self.runout_token = None;
        if !self.should_auto_runout() {
            return;
        }
        self.guard(|t| t.advance_auto_runout());
        self.broadcast_state(OutboundMessage::HandState).await;
        self.after_mutation().await;
    }

    fn should_auto_runout(&self) -> bool {
        self.table.street().is_betting_round() && self.table.current_turn_seat().is_none()
    }

    /// Re-entrant hook run after every state-changing mutation: continues an
    /// auto-runout in progress, or enters the settlement barrier once a hand
    /// reaches settlement.
    async fn after_mutation(&mut self) {
        if self.table.street() == Street::Settlement {
            self.enter_settlement_barrier().await;
            return;
        }
        if self.should_auto_runout() && self.runout_token.is_none() {
            self.arm_runout_tick();
        }
    }

    async fn enter_settlement_barrier(&mut self) {
        if self.gauge_token.is_some() {
            return;
        }
        if self.table.occupied_player_ids().len() < 2 {
            return;
        }
        self.settlement_ready.clear();
        self.arm_gauge_timeout();
    }

    async fn resolve_settlement_barrier(&mut self) {
        if let Some(token) = self.gauge_token.take() {
            token.cancel();
        }
        self.settlement_ready.clear();

        let updates = self.build_earnings_updates();
        if !updates.is_empty() {
            if let Err(err) = self.earnings.apply_updates(&updates).await {
                tracing::error!(target: LOG_TARGET, table_id = %self.table_id, %err, "failed to flush earnings");
            }
        }

        self.guard(|t| t.apply_pending_payouts());
        self.guard(|t| t.finalize_departures());
        self.guard(|t| t.start_new_hand());

        self.broadcast_state(OutboundMessage::HandState).await;
        self.after_mutation().await;
    }

    fn build_earnings_updates(&self) -> Vec<EarningsUpdate> {
        self.table
            .hand_participants()
            .into_iter()
            .map(|p| {
                let chips_delta = p.payout as i64 - p.hand_commit as i64;
                let is_6992 = p
                    .hole_cards
                    .map(|cards| is_69_92_hand(cards[0].rank, cards[1].rank))
                    .unwrap_or(false);
                EarningsUpdate {
                    email: p.player_id,
                    hands: 1,
                    chips_delta,
                    hands_69_92: if is_6992 { 1 } else { 0 },
                    chips_delta_69_92: if is_6992 { chips_delta } else { 0 },
                }
            })
            .collect()
    }

    // ---- rendering & broadcast -----------------------------------------

    /// Renders the snapshot a single connection should see: that
    /// connection's own seat (if any) has its hole cards revealed, every
    /// other seat stays redacted until showdown/settlement.
    fn state_for(&self, connection_id: ConnectionId) -> crate::engine::TableState {
        let reveal_to: HashSet<crate::engine::SeatIndex> = self
            .connection_players
            .get(&connection_id)
            .and_then(|player_id| self.table.seat_index_for(player_id))
            .into_iter()
            .collect();
        self.table.to_state(&reveal_to)
    }

    async fn send_state_to(&self, connection_id: ConnectionId, wrap: impl Fn(crate::engine::TableState) -> OutboundMessage) {
        let state = self.state_for(connection_id);
        self.send_to(connection_id, wrap(state)).await;
    }

    /// Broadcasts a table snapshot to every connection, personalized per
    /// recipient so each player sees their own hole cards.
    async fn broadcast_state(&mut self, wrap: impl Fn(crate::engine::TableState) -> OutboundMessage) {
        let connection_ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        let mut dead = Vec::new();
        for connection_id in connection_ids {
            let state = self.state_for(connection_id);
            let tx = match self.connections.get(&connection_id) {
                Some(tx) => tx,
                None => continue,
            };
            if tx.send_timeout(wrap(state), Duration::from_millis(500)).await.is_err() {
                dead.push(connection_id);
            }
        }
        for connection_id in dead {
            tracing::warn!(target: LOG_TARGET, table_id = %self.table_id, connection_id, "dropping unresponsive connection");
            self.connections.remove(&connection_id);
        }
    }

    async fn broadcast_table_state(&mut self) {
        self.broadcast_state(OutboundMessage::TableState).await;
    }

    async fn broadcast(&mut self, message: OutboundMessage) {
        let mut dead = Vec::new();
        for (&connection_id, tx) in &self.connections {
            let send = tx.send_timeout(message.clone(), Duration::from_millis(500));
            if send.await.is_err() {
                dead.push(connection_id);
            }
        }
        for connection_id in dead {
            tracing::warn!(target: LOG_TARGET, table_id = %self.table_id, connection_id, "dropping unresponsive connection");
            self.connections.remove(&connection_id);
        }
    }

    async fn send_to(&self, connection_id: ConnectionId, message: OutboundMessage) {
        if let Some(tx) = self.connections.get(&connection_id) {
            if tx.send_timeout(message, Duration::from_millis(500)).await.is_err() {
                tracing::warn!(target: LOG_TARGET, table_id = %self.table_id, connection_id, "send to connection timed out");
            }
        }
    }

    async fn send_error(&self, connection_id: ConnectionId, message: String) {
        self.send_to(connection_id, OutboundMessage::Error { message })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{LocalAllowList, LocalEarningsStore};

    fn test_registry() -> TableRegistry {
        DashMap::new()
    }

    #[tokio::test]
    async fn join_then_sync_state_returns_snapshot() {
        let registry = test_registry();
        let allow_list: Arc<dyn AllowList> = Arc::new(LocalAllowList::new("/nonexistent.json"));
        let earnings: Arc<dyn EarningsStore> = Arc::new(LocalEarningsStore::new(
            std::env::temp_dir().join(format!("hub_test_earnings_{}.json", std::process::id())),
        ));
        let handle = spawn_table(
            &registry,
            "main",
            TableConfig::default(),
            HubConfig::default(),
            allow_list,
            earnings,
        );

        let mut outbound = handle.connect(1).await;
        let _first = outbound.recv().await.expect("initial snapshot");

        handle
            .dispatch(
                1,
                InboundMessage::JoinTable {
                    player_id: "p1".into(),
                    name: "Ann".into(),
                },
            )
            .await;

        let msg = outbound.recv().await.expect("table state after join");
        match msg {
            OutboundMessage::TableState(state) => {
                assert!(state.seats.iter().any(|s| s.player_id.as_deref() == Some("p1")));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

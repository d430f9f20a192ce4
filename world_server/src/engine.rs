//! Simulation engine.
//!
//! The engine is the single context object for a running world. It owns:
//! - the world grid,
//! - the player registry,
//! - the action buffer (last intent per entity since the previous tick),
//! - the client subscription table.
//!
//! Each lives behind its own lock so client input never waits on movement
//! resolution, and no lock is held across an `.await`.
//!
//! A tick swaps the action buffer out, applies every action, then offers each
//! subscriber its windowed view with `try_send`. A full channel means the
//! client misses this tick's view; the tick itself never waits.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use chrono::Utc;
use rand::Rng;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};
use world_shared::{
    action::Action,
    codec::PlayerView,
    config::WorldConfig,
    coords::{Coordinates, Direction},
    entity::EntityId,
    grid::{GridError, WorldGrid},
    player::Player,
};

/// Outcome counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Actions applied (jump and/or move).
    pub applied: usize,
    /// Moves refused by the speed check.
    pub rejected: usize,
    /// Views handed to subscriber channels.
    pub delivered: usize,
    /// Views skipped because the subscriber was full or gone.
    pub dropped: usize,
}

/// Authoritative world simulation.
pub struct Engine {
    cfg: WorldConfig,
    grid: WorldGrid,
    players: RwLock<HashMap<EntityId, Player>>,
    actions: Mutex<HashMap<EntityId, Action>>,
    subscriptions: RwLock<HashMap<EntityId, mpsc::Sender<PlayerView>>>,
    tick: AtomicU64,
}

impl Engine {
    pub fn new(cfg: WorldConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let grid = WorldGrid::new(cfg.grid_size)?;
        info!(
            grid_size = cfg.grid_size,
            window_size = cfg.window_size,
            tick_hz = cfg.tick_hz,
            "World created"
        );

        Ok(Self {
            cfg,
            grid,
            players: RwLock::new(HashMap::new()),
            actions: Mutex::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &WorldConfig {
        &self.cfg
    }

    pub fn grid(&self) -> &WorldGrid {
        &self.grid
    }

    pub fn window_size(&self) -> i32 {
        self.cfg.window_size
    }

    /// Number of ticks completed so far.
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    // ─── Players ───

    /// Spawns a default player on a random free cell.
    pub fn add_player(&self) -> EntityId {
        self.spawn(Player::new())
    }

    /// Spawns `player` on a random free cell, retrying until one is found.
    ///
    /// Never returns on a grid with no free cell.
    pub fn spawn(&self, player: Player) -> EntityId {
        let size = self.grid.size();
        let mut rng = rand::thread_rng();
        let mut attempts: u64 = 0;

        let (id, pos) = loop {
            attempts += 1;
            let pos = Coordinates::new(rng.gen_range(0..size), rng.gen_range(0..size));
            match self.grid.place_entity(&player, pos) {
                Ok(id) => break (id, pos),
                Err(e) => {
                    if attempts % 10_000 == 0 {
                        warn!(attempts, error = %e, "Still looking for a free spawn cell");
                    }
                }
            }
        };

        self.write_players().insert(id, player);
        info!(player_id = %id, %pos, attempts, "Player spawned");
        id
    }

    /// Spawns `player` at an exact position.
    pub fn spawn_at(&self, player: Player, pos: Coordinates) -> Result<EntityId, GridError> {
        let id = self.grid.place_entity(&player, pos)?;
        self.write_players().insert(id, player);
        info!(player_id = %id, %pos, "Player spawned");
        Ok(id)
    }

    /// Populates the world with players nobody controls.
    pub fn seed_players(&self, count: usize) {
        for _ in 0..count {
            self.add_player();
        }
        if count > 0 {
            info!(count, "Seeded unattended players");
        }
    }

    pub fn player(&self, id: EntityId) -> Option<Player> {
        self.read_players().get(&id).cloned()
    }

    pub fn player_count(&self) -> usize {
        self.read_players().len()
    }

    pub fn player_position(&self, id: EntityId) -> Option<Coordinates> {
        self.grid.entity_position(id)
    }

    // ─── Actions ───

    /// Buffers `action` for the next tick, replacing any unconsumed one.
    pub fn set_action(&self, id: EntityId, action: Action) -> Result<(), GridError> {
        if !self.read_players().contains_key(&id) {
            return Err(GridError::UnknownEntity(id));
        }
        self.lock_actions().insert(id, action);
        Ok(())
    }

    /// Actions waiting for the next tick.
    pub fn pending_actions(&self) -> usize {
        self.lock_actions().len()
    }

    // ─── Subscriptions ───

    /// Routes `id`'s per-tick view into `sender`, replacing any earlier one.
    pub fn register_client(&self, id: EntityId, sender: mpsc::Sender<PlayerView>) {
        let previous = self.write_subscriptions().insert(id, sender);
        if previous.is_some() {
            debug!(player_id = %id, "Replaced existing subscription");
        }
    }

    /// Drops `id`'s subscription, closing its channel. Returns false if there
    /// was none.
    pub fn unregister_client(&self, id: EntityId) -> bool {
        let removed = self.write_subscriptions().remove(&id).is_some();
        if removed {
            debug!(player_id = %id, "Subscription removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_subscriptions().len()
    }

    /// The view `id` would receive right now.
    pub fn view_for(&self, id: EntityId) -> Option<PlayerView> {
        let player = self.player(id)?;
        let snapshot = self.grid.windowed_snapshot(id, self.cfg.window_size).ok()?;
        Some(PlayerView {
            tick: self.current_tick(),
            player_id: id,
            player,
            snapshot,
            sent_at: Utc::now(),
        })
    }

    // ─── Tick ───

    /// Runs one full tick: resolve buffered actions, then broadcast.
    ///
    /// # Panics
    /// If the grid refuses a mutation that passed validation, or an action is
    /// buffered for an entity with no player. The world would be left
    /// half-applied.
    pub fn tick(&self) -> TickReport {
        let actions = std::mem::take(&mut *self.lock_actions());

        let mut report = TickReport::default();
        for (id, action) in actions {
            if self.apply_action(id, action) {
                report.applied += 1;
            } else {
                report.rejected += 1;
            }
        }

        report.tick = self.tick.fetch_add(1, Ordering::AcqRel) + 1;
        let (delivered, dropped) = self.broadcast();
        report.delivered = delivered;
        report.dropped = dropped;

        debug!(
            tick = report.tick,
            applied = report.applied,
            rejected = report.rejected,
            delivered = report.delivered,
            dropped = report.dropped,
            "Tick complete"
        );
        report
    }

    /// Returns false when the move was refused.
    fn apply_action(&self, id: EntityId, action: Action) -> bool {
        let (speed, altitude) = {
            let mut players = self.write_players();
            let Some(player) = players.get_mut(&id) else {
                panic!("action buffered for {id} which has no player");
            };
            if action.jump {
                player.jump();
            }
            (player.speed(), player.altitude())
        };

        if action.movement == Direction::None {
            return true;
        }

        let requested = action.requested_distance(speed);
        let limit = speed.saturating_mul(self.cfg.speed_tolerance);
        if requested <= 0 {
            warn!(player_id = %id, requested, "Non-positive move distance, move rejected");
            return false;
        }
        if requested > limit {
            warn!(player_id = %id, requested, limit, "Player is moving too fast, move rejected");
            return false;
        }

        let Some(pos) = self.grid.entity_position(id) else {
            panic!("player {id} is not on the grid");
        };
        let target = action.target(pos, speed);

        match self.grid.resolve_move(id, target, altitude) {
            Ok(_) => true,
            Err(e) => panic!("grid refused validated move of {id}: {e}"),
        }
    }

    fn broadcast(&self) -> (usize, usize) {
        let subs = self.read_subscriptions();
        let mut delivered = 0;
        let mut dropped = 0;

        for (id, sender) in subs.iter() {
            let Some(view) = self.view_for(*id) else {
                dropped += 1;
                continue;
            };
            match sender.try_send(view) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    debug!(player_id = %id, "Subscriber busy, view dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    dropped += 1;
                    debug!(player_id = %id, "Subscriber gone, view dropped");
                }
            }
        }
        (delivered, dropped)
    }

    /// Ticks forever at the configured rate.
    pub async fn run(self: Arc<Self>) {
        let period = self.cfg.tick_interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "Tick loop started");

        loop {
            interval.tick().await;
            self.tick();
        }
    }

    /// Runs [`Engine::run`] on a background task.
    pub fn spawn_tick_loop(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    // ─── Locks ───
    // A panic mid-tick poisons these; the data is still consistent because
    // grid mutation is all-or-nothing, so readers carry on.

    fn read_players(&self) -> std::sync::RwLockReadGuard<'_, HashMap<EntityId, Player>> {
        self.players.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_players(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityId, Player>> {
        self.players.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_actions(&self) -> std::sync::MutexGuard<'_, HashMap<EntityId, Action>> {
        self.actions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_subscriptions(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<EntityId, mpsc::Sender<PlayerView>>> {
        self.subscriptions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_subscriptions(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<EntityId, mpsc::Sender<PlayerView>>> {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use world_shared::codec::decode_action;

    fn engine(grid_size: usize) -> Engine {
        Engine::new(WorldConfig {
            grid_size,
            window_size: 10,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn add_player_registers_defaults() {
        let e = engine(100);
        let id = e.add_player();

        let p = e.player(id).unwrap();
        assert_eq!(p.health, 100);
        assert_eq!(p.altitude(), 1);
        assert!(e.player_position(id).is_some());
        assert_eq!(e.grid().entity_count(), 1);
    }

    #[test]
    fn spawn_fills_small_grid() {
        let e = engine(3);
        let ids: Vec<_> = (0..9).map(|_| e.add_player()).collect();
        assert_eq!(e.player_count(), 9);

        let mut cells: Vec<_> = ids.iter().map(|id| e.player_position(*id).unwrap()).collect();
        cells.sort_by_key(|c| (c.x, c.y));
        cells.dedup();
        assert_eq!(cells.len(), 9);
    }

    #[test]
    fn up_moves_by_speed() {
        let e = engine(100);
        let id = e.spawn_at(Player::new(), Coordinates::new(50, 50)).unwrap();

        e.set_action(id, Action::moving(Direction::Up)).unwrap();
        let report = e.tick();

        assert_eq!(report.applied, 1);
        assert_eq!(e.player_position(id), Some(Coordinates::new(50, 45)));
    }

    #[test]
    fn too_fast_move_rejected() {
        let e = engine(100);
        let start = Coordinates::new(50, 50);
        let id = e.spawn_at(Player::new(), start).unwrap();

        // speed 5 * tolerance 4 = 20
        e.set_action(id, Action::moving(Direction::Up).with_distance(21))
            .unwrap();
        let report = e.tick();

        assert_eq!(report.rejected, 1);
        assert_eq!(e.player_position(id), Some(start));

        e.set_action(id, Action::moving(Direction::Up).with_distance(20))
            .unwrap();
        e.tick();
        assert_eq!(e.player_position(id), Some(Coordinates::new(50, 30)));
    }

    #[test]
    fn out_of_range_distances_rejected() {
        let e = engine(100);
        let start = Coordinates::new(50, 50);
        let id = e.spawn_at(Player::new(), start).unwrap();
        let bystander = e.spawn_at(Player::new(), Coordinates::new(10, 10)).unwrap();

        for raw in [
            r#"{"movement":"Right","distance":2147483647}"#,
            r#"{"movement":"Left","distance":-2147483648}"#,
            r#"{"movement":"Up","distance":-5}"#,
            r#"{"movement":"Down","distance":0}"#,
        ] {
            let action = decode_action(raw.as_bytes()).unwrap();
            e.set_action(id, action).unwrap();
            e.set_action(bystander, Action::moving(Direction::Right)).unwrap();

            let report = e.tick();
            assert_eq!(report.rejected, 1, "{raw}");
            assert_eq!(report.applied, 1, "{raw}");
            assert_eq!(e.player_position(id), Some(start), "{raw}");
        }
        assert_eq!(e.player_position(bystander), Some(Coordinates::new(30, 10)));
        assert_eq!(e.current_tick(), 4);
    }

    #[test]
    fn unknown_entity_action_refused() {
        let e = engine(10);
        let id = EntityId::new_unique();
        assert_eq!(
            e.set_action(id, Action::default()),
            Err(GridError::UnknownEntity(id))
        );
        assert_eq!(e.pending_actions(), 0);
    }

    #[test]
    fn actions_do_not_repeat() {
        let e = engine(100);
        let id = e.spawn_at(Player::new(), Coordinates::new(50, 50)).unwrap();

        e.set_action(id, Action::moving(Direction::Right)).unwrap();
        e.tick();
        e.tick();

        assert_eq!(e.player_position(id), Some(Coordinates::new(55, 50)));
    }

    #[test]
    fn last_write_wins() {
        let e = engine(100);
        let id = e.spawn_at(Player::new(), Coordinates::new(50, 50)).unwrap();

        e.set_action(id, Action::moving(Direction::Up)).unwrap();
        e.set_action(id, Action::moving(Direction::Down)).unwrap();
        assert_eq!(e.pending_actions(), 1);
        e.tick();

        assert_eq!(e.player_position(id), Some(Coordinates::new(50, 55)));
    }

    #[test]
    fn jump_action_lifts_player() {
        let e = engine(20);
        let id = e.spawn_at(Player::new(), Coordinates::new(10, 10)).unwrap();

        e.set_action(id, Action::default().with_jump()).unwrap();
        e.tick();

        let p = e.player(id).unwrap();
        assert_eq!(p.altitude(), 1 + p.jump_height());
        assert_eq!(e.player_position(id), Some(Coordinates::new(10, 10)));
    }

    #[test]
    fn concurrent_set_action_applied_once() {
        let e = engine(100);
        let ids: Vec<_> = (0..16).map(|_| e.add_player()).collect();

        std::thread::scope(|s| {
            for id in &ids {
                let e = &e;
                s.spawn(move || {
                    for _ in 0..50 {
                        e.set_action(*id, Action::default()).unwrap();
                    }
                });
            }
        });

        assert_eq!(e.pending_actions(), ids.len());
        let report = e.tick();
        assert_eq!(report.applied, ids.len());
        assert_eq!(e.pending_actions(), 0);
        assert_eq!(e.tick().applied, 0);
    }

    #[test]
    fn broadcast_delivers_window() {
        let e = engine(50);
        let id = e.spawn_at(Player::new(), Coordinates::new(25, 25)).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        e.register_client(id, tx);

        let report = e.tick();
        assert_eq!(report.delivered, 1);

        let view = rx.try_recv().unwrap();
        assert_eq!(view.player_id, id);
        assert_eq!(view.tick, 1);
        assert!(view.snapshot.width <= 10 && view.snapshot.height <= 10);
        assert_eq!(
            view.snapshot.absolute_position(id),
            Some(Coordinates::new(25, 25))
        );
    }

    #[test]
    fn slow_consumer_loses_updates_not_ticks() {
        let e = engine(50);
        let slow = e.add_player();
        let fast = e.add_player();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(1);
        e.register_client(slow, slow_tx);
        e.register_client(fast, fast_tx);

        let first = e.tick();
        assert_eq!(first.delivered, 2);
        fast_rx.try_recv().unwrap();

        let second = e.tick();
        assert_eq!(second.delivered, 1);
        assert_eq!(second.dropped, 1);
        assert_eq!(fast_rx.try_recv().unwrap().tick, 2);
        // The slow client still holds the first view only.
        assert_eq!(slow_rx.try_recv().unwrap().tick, 1);
        assert!(slow_rx.try_recv().is_err());
    }

    #[test]
    fn unregister_twice_is_harmless() {
        let e = engine(20);
        let id = e.add_player();
        let (tx, mut rx) = mpsc::channel(1);
        e.register_client(id, tx);

        assert!(e.unregister_client(id));
        assert!(!e.unregister_client(id));
        assert_eq!(e.subscriber_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn closed_receiver_counts_as_dropped() {
        let e = engine(20);
        let id = e.add_player();
        let (tx, rx) = mpsc::channel(1);
        e.register_client(id, tx);
        drop(rx);

        let report = e.tick();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.dropped, 1);
    }

    #[tokio::test]
    async fn tick_loop_advances() {
        let e = Arc::new(
            Engine::new(WorldConfig {
                grid_size: 20,
                tick_hz: 50,
                ..Default::default()
            })
            .unwrap(),
        );
        let handle = e.spawn_tick_loop();

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        assert!(e.current_tick() >= 2, "only {} ticks", e.current_tick());
    }
}

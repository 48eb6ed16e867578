//! Key-addressed game registry.
//!
//! Maps opaque session/room keys to independently evolving games and
//! serializes mutation per key. Every accessor hands back a detached
//! [`GameSnapshot`]; live grids never leave the registry. Accepted moves on
//! a key are published to that key's broadcast channel so the transport
//! layer can fan snapshots out to attached room players.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::sync::broadcast;

use game_core::{Direction, Game, GameError, GameSnapshot};

/// Buffered snapshots per room channel; slow subscribers skip ahead.
const CHANGE_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no game registered for key {0:?}")]
    KeyNotFound(String),

    #[error(transparent)]
    Game(#[from] GameError),
}

struct EntryInner {
    game: Game,
    rng: SmallRng,
}

/// One registered game plus its change channel.
///
/// The mutex hold time is bounded by a single grid transformation (O(N^2));
/// no I/O happens under the lock. Change publication stays inside the
/// critical section — the broadcast send is synchronous and non-blocking —
/// so the channel order always matches the per-key serialization order.
struct GameEntry {
    inner: Mutex<EntryInner>,
    changes: broadcast::Sender<GameSnapshot>,
}

impl GameEntry {
    fn new(game: Game, rng: SmallRng) -> Arc<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Arc::new(GameEntry {
            inner: Mutex::new(EntryInner { game, rng }),
            changes,
        })
    }

    fn lock(&self) -> MutexGuard<'_, EntryInner> {
        // A poisoned entry only means some holder panicked; the game value
        // itself is replaced wholesale on mutation, so keep serving it.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, snapshot: GameSnapshot) {
        // No receivers is the normal single-player case.
        let _ = self.changes.send(snapshot);
    }
}

pub struct SessionRegistry {
    entries: RwLock<HashMap<String, Arc<GameEntry>>>,
    default_size: usize,
    seed: Option<u64>,
}

impl SessionRegistry {
    pub fn new(default_size: usize) -> Self {
        SessionRegistry {
            entries: RwLock::new(HashMap::new()),
            default_size,
            seed: None,
        }
    }

    /// Deterministic tile spawning for tests: every created entry starts
    /// from this seed.
    pub fn with_seed(default_size: usize, seed: u64) -> Self {
        SessionRegistry {
            entries: RwLock::new(HashMap::new()),
            default_size,
            seed: Some(seed),
        }
    }

    fn new_rng(&self) -> SmallRng {
        match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        }
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<GameEntry>>> {
        self.entries.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<GameEntry>>> {
        self.entries.write().unwrap_or_else(|p| p.into_inner())
    }

    fn entry(&self, key: &str) -> Result<Arc<GameEntry>, RegistryError> {
        self.read_map()
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::KeyNotFound(key.to_string()))
    }

    /// Return the state for `key`, creating a fresh game of the default
    /// size on first reference. Concurrent first accesses race on the map
    /// write lock; exactly one game is created and everyone sees it.
    pub fn get_or_create(&self, key: &str) -> Result<GameSnapshot, RegistryError> {
        if let Some(entry) = self.read_map().get(key).cloned() {
            return Ok(entry.lock().game.snapshot());
        }

        let entry = {
            let mut map = self.write_map();
            match map.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let mut rng = self.new_rng();
                    let game = Game::new(self.default_size, &mut rng)?;
                    let entry = GameEntry::new(game, rng);
                    map.insert(key.to_string(), entry.clone());
                    tracing::debug!(key, size = self.default_size, "game created");
                    entry
                }
            }
        };
        let snapshot = entry.lock().game.snapshot();
        Ok(snapshot)
    }

    /// Return the state for `key` without creating anything.
    pub fn get(&self, key: &str) -> Result<GameSnapshot, RegistryError> {
        Ok(self.entry(key)?.lock().game.snapshot())
    }

    /// Apply a directional move to `key`'s game under its entry lock.
    ///
    /// The returned snapshot is copied while still holding the lock and
    /// handed out after release. An accepted move is published to the key's
    /// change channel before the lock is released, so subscribers observe
    /// snapshots in the same order the moves were serialized.
    pub fn apply_move(
        &self,
        key: &str,
        direction: Direction,
    ) -> Result<(bool, GameSnapshot), RegistryError> {
        let entry = self.entry(key)?;
        let (moved, snapshot) = {
            let mut inner = entry.lock();
            let EntryInner { game, rng } = &mut *inner;
            let moved = game.shift(direction, rng)?;
            let snapshot = game.snapshot();
            if moved {
                entry.publish(snapshot.clone());
            }
            (moved, snapshot)
        };
        if moved {
            tracing::debug!(
                key,
                ?direction,
                score = snapshot.score,
                game_over = snapshot.game_over,
                "move applied"
            );
        }
        Ok((moved, snapshot))
    }

    /// Replace `key`'s game with a fresh one, creating the entry if absent.
    /// The high-score watermark of an existing entry survives; omitting
    /// `size` keeps the current grid size.
    pub fn reset(&self, key: &str, size: Option<usize>) -> Result<GameSnapshot, RegistryError> {
        let entry = {
            let mut map = self.write_map();
            match map.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let mut rng = self.new_rng();
                    let game = Game::new(size.unwrap_or(self.default_size), &mut rng)?;
                    let entry = GameEntry::new(game, rng);
                    map.insert(key.to_string(), entry.clone());
                    let snapshot = entry.lock().game.snapshot();
                    entry.publish(snapshot.clone());
                    return Ok(snapshot);
                }
            }
        };
        let snapshot = {
            let mut inner = entry.lock();
            let EntryInner { game, rng } = &mut *inner;
            game.reset(size, rng)?;
            let snapshot = game.snapshot();
            entry.publish(snapshot.clone());
            snapshot
        };
        tracing::debug!(key, size = snapshot.size, "game reset");
        Ok(snapshot)
    }

    /// Import a snapshot into `key`, creating the entry if absent. An
    /// existing entry keeps the larger of its own and the imported high
    /// score (the engine's restore rule).
    pub fn restore(&self, key: &str, snapshot: &GameSnapshot) -> Result<GameSnapshot, RegistryError> {
        let entry = {
            let mut map = self.write_map();
            match map.get(key) {
                Some(existing) => existing.clone(),
                None => {
                    let game = Game::from_snapshot(snapshot)?;
                    let entry = GameEntry::new(game, self.new_rng());
                    map.insert(key.to_string(), entry.clone());
                    entry
                }
            }
        };
        let restored = {
            let mut inner = entry.lock();
            inner.game.restore(snapshot)?;
            let restored = inner.game.snapshot();
            entry.publish(restored.clone());
            restored
        };
        tracing::debug!(key, "game state imported");
        Ok(restored)
    }

    /// Drop `key`'s entry. Idempotent; attached subscribers observe their
    /// channel closing.
    pub fn remove(&self, key: &str) {
        if self.write_map().remove(key).is_some() {
            tracing::debug!(key, "game removed");
        }
    }

    /// Subscribe to accepted-move snapshots for `key`.
    pub fn subscribe(&self, key: &str) -> Result<broadcast::Receiver<GameSnapshot>, RegistryError> {
        Ok(self.entry(key)?.changes.subscribe())
    }

    /// Live subscriptions on `key`'s change channel (0 for unknown keys).
    pub fn watcher_count(&self, key: &str) -> usize {
        self.read_map()
            .get(key)
            .map(|e| e.changes.receiver_count())
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read_map().contains_key(key)
    }

    pub fn active_count(&self) -> usize {
        self.read_map().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn get_or_create_registers_once() {
        let registry = SessionRegistry::with_seed(4, 1);
        let first = registry.get_or_create("alice").unwrap();
        let second = registry.get_or_create("alice").unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.active_count(), 1);
        assert!(registry.contains("alice"));
        assert!(!registry.contains("bob"));
    }

    #[test]
    fn independent_keys_get_independent_games() {
        let registry = SessionRegistry::with_seed(4, 1);
        registry.get_or_create("a").unwrap();
        registry.get_or_create("b").unwrap();
        assert_eq!(registry.active_count(), 2);

        // Move "a" until something happens; "b" must stay untouched.
        for dir in Direction::all() {
            let (moved, _) = registry.apply_move("a", dir).unwrap();
            if moved {
                break;
            }
        }
        let a = registry.get_or_create("a").unwrap();
        let b = registry.get_or_create("b").unwrap();
        assert_eq!(a.moves, 1);
        assert_eq!(b.moves, 0);
    }

    #[test]
    fn get_never_creates() {
        let registry = SessionRegistry::new(4);
        assert!(matches!(
            registry.get("ghost"),
            Err(RegistryError::KeyNotFound(_))
        ));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn apply_move_on_unknown_key_fails() {
        let registry = SessionRegistry::new(4);
        assert!(matches!(
            registry.apply_move("ghost", Direction::Left),
            Err(RegistryError::KeyNotFound(_))
        ));
    }

    #[test]
    fn reset_preserves_high_score_and_accepts_new_size() {
        let registry = SessionRegistry::with_seed(4, 2);
        registry.get_or_create("k").unwrap();
        // Grind a few moves to build up a score.
        for _ in 0..10 {
            for dir in Direction::all() {
                let _ = registry.apply_move("k", dir);
            }
        }
        let before = registry.get_or_create("k").unwrap();
        let after = registry.reset("k", Some(5)).unwrap();
        assert_eq!(after.size, 5);
        assert_eq!(after.moves, 0);
        assert!(after.high_score >= before.high_score);
    }

    #[test]
    fn reset_creates_missing_entry() {
        let registry = SessionRegistry::with_seed(4, 3);
        let snap = registry.reset("fresh", None).unwrap();
        assert_eq!(snap.size, 4);
        assert!(registry.contains("fresh"));
    }

    #[test]
    fn reset_rejects_invalid_size() {
        let registry = SessionRegistry::new(4);
        registry.get_or_create("k").unwrap();
        assert!(matches!(
            registry.reset("k", Some(1)),
            Err(RegistryError::Game(GameError::InvalidConfiguration(1)))
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = SessionRegistry::new(4);
        registry.get_or_create("k").unwrap();
        registry.remove("k");
        registry.remove("k");
        assert!(!registry.contains("k"));
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn restore_applies_high_score_max() {
        let registry = SessionRegistry::with_seed(4, 4);
        let mut snap = registry.get_or_create("k").unwrap();
        snap.high_score = 9999;
        let restored = registry.restore("k", &snap).unwrap();
        assert_eq!(restored.high_score, 9999);

        snap.high_score = 1;
        let restored = registry.restore("k", &snap).unwrap();
        assert_eq!(restored.high_score, 9999);
    }

    #[test]
    fn restore_creates_entry_for_unknown_key() {
        let registry = SessionRegistry::with_seed(4, 5);
        let donor = SessionRegistry::with_seed(4, 6);
        let snap = donor.get_or_create("src").unwrap();
        let restored = registry.restore("dst", &snap).unwrap();
        assert_eq!(restored.grid, snap.grid);
        assert!(registry.contains("dst"));
    }

    #[tokio::test]
    async fn subscribers_receive_accepted_moves() {
        let registry = SessionRegistry::with_seed(4, 7);
        registry.get_or_create("room").unwrap();
        let mut rx = registry.subscribe("room").unwrap();
        assert_eq!(registry.watcher_count("room"), 1);

        // Find a direction that actually moves the seeded 2-tile board.
        let mut published = None;
        for dir in Direction::all() {
            let (moved, snap) = registry.apply_move("room", dir).unwrap();
            if moved {
                published = Some(snap);
                break;
            }
        }
        let expected = published.expect("some direction must move a 2-tile board");
        let received = rx.recv().await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn broadcasts_arrive_in_serialization_order() {
        let registry = Arc::new(SessionRegistry::new(4));
        registry.get_or_create("room").unwrap();
        let mut rx = registry.subscribe("room").unwrap();

        // Hammer one key from many threads; accepted moves stay under the
        // channel capacity so nothing lags.
        let mut handles = Vec::new();
        for i in 0..24 {
            let registry = registry.clone();
            let dir = Direction::all()[i % 4];
            handles.push(thread::spawn(move || {
                registry.apply_move("room", dir).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        // Snapshots were published under the entry lock, so the move counter
        // must be strictly increasing across the channel, ending at the
        // final state.
        let mut last = 0;
        while let Ok(snap) = rx.try_recv() {
            assert!(snap.moves > last, "saw moves={} after {}", snap.moves, last);
            last = snap.moves;
        }
        assert_eq!(last, registry.get("room").unwrap().moves);
    }

    #[test]
    fn subscribe_unknown_key_fails() {
        let registry = SessionRegistry::new(4);
        assert!(matches!(
            registry.subscribe("nope"),
            Err(RegistryError::KeyNotFound(_))
        ));
        assert_eq!(registry.watcher_count("nope"), 0);
    }

    #[test]
    fn concurrent_creators_build_one_game() {
        let registry = Arc::new(SessionRegistry::new(4));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || registry.get_or_create("shared").unwrap()));
        }
        let snapshots: Vec<GameSnapshot> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(registry.active_count(), 1);
        // Every winner and loser of the creation race observed the same
        // underlying game (no-move snapshots of one instance are identical).
        for snap in &snapshots {
            assert_eq!(snap.grid, snapshots[0].grid);
        }
    }

    #[test]
    fn concurrent_moves_serialize_per_key() {
        let registry = Arc::new(SessionRegistry::new(4));
        registry.get_or_create("shared").unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let registry = registry.clone();
            let dir = Direction::all()[i % 4];
            handles.push(thread::spawn(move || {
                registry.apply_move("shared", dir).unwrap()
            }));
        }
        let mut accepted = 0u64;
        for handle in handles {
            let (moved, snap) = handle.join().unwrap();
            if moved {
                accepted += 1;
            }
            // No observer ever sees a structurally invalid grid.
            Game::from_snapshot(&snap).unwrap();
        }

        let final_snap = registry.get_or_create("shared").unwrap();
        // The move counter equals the number of accepted moves: some serial
        // ordering of the 50 requests produced this state.
        assert_eq!(final_snap.moves, accepted);
        Game::from_snapshot(&final_snap).unwrap();
    }
}

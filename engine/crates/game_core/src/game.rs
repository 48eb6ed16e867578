use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::Cell;
use crate::error::{GameError, MIN_GRID_SIZE};
use crate::snapshot::GameSnapshot;

/// Merging two tiles into this value latches the `won` flag.
pub const WIN_TILE: u32 = 2048;

/// The four directional moves, snake_case on the wire ("left", "up", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn all() -> [Direction; 4] {
        [Direction::Left, Direction::Right, Direction::Up, Direction::Down]
    }
}

/// Result of reducing a grid in one direction, before any tile spawn.
struct SlideOutcome {
    grid: Vec<Vec<Cell>>,
    /// Some row's content differs from before.
    row_changed: bool,
    /// At least one marker pair annihilated (clears fire even when no row
    /// content would otherwise differ, and count as movement).
    marker_fired: bool,
    /// A merge produced the winning tile.
    won_merge: bool,
}

impl SlideOutcome {
    fn moved(&self) -> bool {
        self.row_changed || self.marker_fired
    }
}

/// Single-grid tile-merge state machine.
///
/// Pure except for the RNG handed into spawning operations; no I/O and no
/// locking. Concurrent access is the registry's responsibility.
#[derive(Debug, Clone)]
pub struct Game {
    grid: Vec<Vec<Cell>>,
    size: usize,
    score: u64,
    high_score: u64,
    moves: u64,
    game_over: bool,
    won: bool,
}

impl Game {
    /// Create a game with an empty `size` x `size` grid and two spawned tiles.
    pub fn new<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self, GameError> {
        if size < MIN_GRID_SIZE {
            return Err(GameError::InvalidConfiguration(size));
        }
        let mut game = Game {
            grid: vec![vec![Cell::Empty; size]; size],
            size,
            score: 0,
            high_score: 0,
            moves: 0,
            game_over: false,
            won: false,
        };
        // A fresh grid has at least 4 cells, so both spawns succeed.
        game.spawn_tile(rng);
        game.spawn_tile(rng);
        game.update_score();
        Ok(game)
    }

    /// Rebuild a game from an imported snapshot, validating its structure.
    pub fn from_snapshot(snapshot: &GameSnapshot) -> Result<Self, GameError> {
        let mut game = Game {
            grid: Vec::new(),
            size: 0,
            score: 0,
            high_score: 0,
            moves: 0,
            game_over: false,
            won: false,
        };
        game.restore(snapshot)?;
        Ok(game)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn high_score(&self) -> u64 {
        self.high_score
    }

    pub fn moves(&self) -> u64 {
        self.moves
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn has_won(&self) -> bool {
        self.won
    }

    pub fn grid(&self) -> &[Vec<Cell>] {
        &self.grid
    }

    /// Apply one directional move. Returns whether the grid changed.
    ///
    /// On a true result the engine has already spawned one tile, bumped the
    /// move counter, recomputed score/high-score and re-evaluated the
    /// terminal flag. A false result leaves the state byte-identical.
    pub fn shift<R: Rng + ?Sized>(
        &mut self,
        direction: Direction,
        rng: &mut R,
    ) -> Result<bool, GameError> {
        self.validate()?;

        let outcome = self.slide(direction);
        if !outcome.moved() {
            return Ok(false);
        }

        self.grid = outcome.grid;
        self.moves += 1;
        if outcome.won_merge {
            self.won = true;
        }
        // A move that changed the grid always frees at least one cell, so
        // the spawn cannot fail on a well-formed state.
        if !self.spawn_tile(rng) {
            return Err(GameError::Corrupt(
                "no empty cell for spawn after a successful move".into(),
            ));
        }
        self.update_score();
        self.game_over = self.is_terminal();
        Ok(true)
    }

    /// Place a 2 (90%) or 4 (10%) on a uniformly random empty cell.
    /// Returns false when the grid has no empty cell.
    pub fn spawn_tile<R: Rng + ?Sized>(&mut self, rng: &mut R) -> bool {
        let empties: Vec<(usize, usize)> = self
            .grid
            .iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .filter(|(_, c)| c.is_empty())
                    .map(move |(c, _)| (r, c))
            })
            .collect();
        if empties.is_empty() {
            return false;
        }
        let (r, c) = empties[rng.gen_range(0..empties.len())];
        let value = if rng.gen_bool(0.9) { 2 } else { 4 };
        self.grid[r][c] = Cell::Number(value);
        true
    }

    /// Terminal predicate: no empty cell, no equal numeric neighbors, and no
    /// marker adjacent to another marker (horizontally or vertically).
    pub fn is_terminal(&self) -> bool {
        for r in 0..self.size {
            for c in 0..self.size {
                let cell = self.grid[r][c];
                if cell.is_empty() {
                    return false;
                }
                for (nr, nc) in [(r, c + 1), (r + 1, c)] {
                    if nr >= self.size || nc >= self.size {
                        continue;
                    }
                    match (cell, self.grid[nr][nc]) {
                        (Cell::Number(a), Cell::Number(b)) if a == b => return false,
                        (Cell::Marker, Cell::Marker) => return false,
                        _ => {}
                    }
                }
            }
        }
        true
    }

    /// Whether any of the four moves would change the grid. Probes a
    /// disposable reduction per direction; the live state is untouched.
    pub fn can_move(&self) -> bool {
        if !self.is_terminal() {
            return true;
        }
        Direction::all().iter().any(|&d| self.slide(d).moved())
    }

    /// Largest numeric tile on the grid, or 0 if none exists.
    pub fn max_tile(&self) -> u32 {
        self.grid
            .iter()
            .flatten()
            .filter_map(|c| c.value())
            .max()
            .unwrap_or(0)
    }

    /// Start over on a fresh grid, keeping the high-score watermark.
    /// `size` of None keeps the current grid size.
    pub fn reset<R: Rng + ?Sized>(
        &mut self,
        size: Option<usize>,
        rng: &mut R,
    ) -> Result<(), GameError> {
        let size = size.unwrap_or(self.size);
        if size < MIN_GRID_SIZE {
            return Err(GameError::InvalidConfiguration(size));
        }
        self.size = size;
        self.grid = vec![vec![Cell::Empty; size]; size];
        self.score = 0;
        self.moves = 0;
        self.game_over = false;
        self.won = false;
        self.spawn_tile(rng);
        self.spawn_tile(rng);
        self.update_score();
        Ok(())
    }

    /// Copy out the observable state.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            grid: self.grid.clone(),
            score: self.score,
            high_score: self.high_score,
            moves: self.moves,
            game_over: self.game_over,
            won: self.won,
            size: self.size,
            max_tile: self.max_tile(),
        }
    }

    /// Replace this game's state with an imported snapshot.
    ///
    /// The snapshot is structurally validated first; the high score becomes
    /// the max of the existing and imported values. `max_tile` is derived
    /// and ignored on import.
    pub fn restore(&mut self, snapshot: &GameSnapshot) -> Result<(), GameError> {
        validate_grid(&snapshot.grid, snapshot.size)?;
        self.grid = snapshot.grid.clone();
        self.size = snapshot.size;
        self.score = snapshot.score;
        self.high_score = self.high_score.max(snapshot.high_score);
        self.moves = snapshot.moves;
        self.game_over = snapshot.game_over;
        self.won = snapshot.won;
        Ok(())
    }

    /// Structural check: square grid of the declared size, every numeric
    /// tile a power of two >= 2. Malformed states are programmer errors and
    /// fail fast instead of being coerced.
    pub fn validate(&self) -> Result<(), GameError> {
        validate_grid(&self.grid, self.size)
    }

    fn update_score(&mut self) {
        self.score = self
            .grid
            .iter()
            .flatten()
            .filter_map(|c| c.value())
            .map(u64::from)
            .sum();
        if self.score > self.high_score {
            self.high_score = self.score;
        }
    }

    /// Reduce the grid in `direction` without touching self.
    ///
    /// All four directions are the canonical leftward reduction composed
    /// with a transpose/reverse transform and its inverse.
    fn slide(&self, direction: Direction) -> SlideOutcome {
        let rows = to_canonical(&self.grid, direction);
        let mut new_rows: Vec<Vec<Cell>> = Vec::with_capacity(self.size);
        let mut row_changed = false;
        let mut won_merge = false;
        // Pre-merge (post-compaction) coordinates of annihilated markers.
        let mut marker_cells: Vec<(usize, usize)> = Vec::new();

        for (r, row) in rows.iter().enumerate() {
            let compact: Vec<Cell> = row.iter().copied().filter(|c| !c.is_empty()).collect();
            let mut merged: Vec<Cell> = Vec::with_capacity(self.size);
            let mut i = 0;
            while i < compact.len() {
                match (compact[i], compact.get(i + 1).copied()) {
                    // One merge per tile per move: the merged tile is pushed
                    // and the scan continues past both sources.
                    (Cell::Number(a), Some(Cell::Number(b))) if a == b => {
                        let doubled = a * 2;
                        if doubled == WIN_TILE {
                            won_merge = true;
                        }
                        merged.push(Cell::Number(doubled));
                        i += 2;
                    }
                    (Cell::Marker, Some(Cell::Marker)) => {
                        marker_cells.push((r, i));
                        marker_cells.push((r, i + 1));
                        i += 2;
                    }
                    (cell, _) => {
                        merged.push(cell);
                        i += 1;
                    }
                }
            }
            merged.resize(self.size, Cell::Empty);
            if merged != *row {
                row_changed = true;
            }
            new_rows.push(merged);
        }

        let marker_fired = !marker_cells.is_empty();
        for &(r, c) in &marker_cells {
            clear_neighborhood(&mut new_rows, r, c, self.size);
        }

        SlideOutcome {
            grid: from_canonical(new_rows, direction),
            row_changed,
            marker_fired,
            won_merge,
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.grid {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{:>4}", cell.to_string())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Zero the Chebyshev-1 neighborhood of (r, c), clamped to the grid.
fn clear_neighborhood(grid: &mut [Vec<Cell>], r: usize, c: usize, size: usize) {
    for nr in r.saturating_sub(1)..=(r + 1).min(size - 1) {
        for nc in c.saturating_sub(1)..=(c + 1).min(size - 1) {
            grid[nr][nc] = Cell::Empty;
        }
    }
}

fn reverse_rows(mut grid: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    for row in &mut grid {
        row.reverse();
    }
    grid
}

fn transpose(grid: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
    let n = grid.len();
    let mut out = vec![vec![Cell::Empty; n]; n];
    for (r, row) in grid.iter().enumerate() {
        for (c, &cell) in row.iter().enumerate() {
            out[c][r] = cell;
        }
    }
    out
}

/// Orient the grid so the requested direction becomes a leftward slide.
fn to_canonical(grid: &[Vec<Cell>], direction: Direction) -> Vec<Vec<Cell>> {
    let grid = grid.to_vec();
    match direction {
        Direction::Left => grid,
        Direction::Right => reverse_rows(grid),
        Direction::Up => transpose(grid),
        Direction::Down => reverse_rows(transpose(grid)),
    }
}

/// Undo `to_canonical`.
fn from_canonical(grid: Vec<Vec<Cell>>, direction: Direction) -> Vec<Vec<Cell>> {
    match direction {
        Direction::Left => grid,
        Direction::Right => reverse_rows(grid),
        Direction::Up => transpose(grid),
        Direction::Down => transpose(reverse_rows(grid)),
    }
}

fn validate_grid(grid: &[Vec<Cell>], size: usize) -> Result<(), GameError> {
    if size < MIN_GRID_SIZE {
        return Err(GameError::InvalidConfiguration(size));
    }
    if grid.len() != size {
        return Err(GameError::Corrupt(format!(
            "expected {} rows, found {}",
            size,
            grid.len()
        )));
    }
    for (r, row) in grid.iter().enumerate() {
        if row.len() != size {
            return Err(GameError::Corrupt(format!(
                "row {} has {} cells, expected {}",
                r,
                row.len(),
                size
            )));
        }
        for (c, cell) in row.iter().enumerate() {
            if let Cell::Number(n) = cell {
                if *n < 2 || !n.is_power_of_two() {
                    return Err(GameError::Corrupt(format!(
                        "cell ({}, {}) holds non-power-of-two value {}",
                        r, c, n
                    )));
                }
            }
        }
    }
    Ok(())
}

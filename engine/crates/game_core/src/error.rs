/// Smallest playable grid. The engine supports any square size from here up.
pub const MIN_GRID_SIZE: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("grid size {0} is below the minimum of {MIN_GRID_SIZE}")]
    InvalidConfiguration(usize),

    #[error("corrupt game state: {0}")]
    Corrupt(String),
}

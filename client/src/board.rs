use shared::{Color, Grid, DEFAULT_COLOR};

/// Read-only view over the latest snapshot
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Board {
    grid: Grid,
}

impl Board {
    pub fn new(grid: Grid) -> Self {
        Self { grid }
    }

    pub fn width(&self) -> usize {
        self.grid.first().map_or(0, |row| row.len())
    }

    pub fn height(&self) -> usize {
        self.grid.len()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<Color> {
        self.grid.get(y)?.get(x).copied()
    }

    /// Whether this board reflects a paint of `color` at `(x, y)`
    ///
    /// The server ignores paints outside the board, so every board reflects
    /// those.
    pub fn shows_paint(&self, x: i64, y: i64, color: Color) -> bool {
        match (usize::try_from(x), usize::try_from(y)) {
            (Ok(x), Ok(y)) if x < self.width() && y < self.height() => {
                self.get(x, y) == Some(color)
            }
            _ => true,
        }
    }

    /// Cells that differ from the server's initial fill
    pub fn painted_cells(&self) -> usize {
        self.grid
            .iter()
            .flatten()
            .filter(|c| **c != DEFAULT_COLOR)
            .count()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn summary(&self) -> String {
        format!(
            "{}x{} board, {} painted cells",
            self.width(),
            self.height(),
            self.painted_cells()
        )
    }
}

//! The authoritative pixel grid
//!
//! The canvas is created once at startup and mutated in place for the life
//! of the server. Handlers share it as [`SharedCanvas`]; every paint and
//! every snapshot goes through the same mutex, so there is a single linear
//! history of paints and a snapshot never observes half of one.
//!
//! Each successful paint bumps the canvas version. A snapshot taken together
//! with [`Canvas::version`] under one lock is tagged with its place in that
//! history, which lets writers drop snapshots overtaken by newer ones.

use shared::{Color, Grid, DEFAULT_COLOR};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub type SharedCanvas = Arc<Mutex<Canvas>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    #[error("pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: usize,
        height: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    /// Row-major cells, `cells[y * width + x]`
    cells: Vec<Color>,
    /// Number of successful paints so far
    version: u64,
}

impl Canvas {
    /// Creates a canvas with every cell set to [`DEFAULT_COLOR`]
    pub fn new(width: usize, height: usize) -> Self {
        Self::filled(width, height, DEFAULT_COLOR)
    }

    pub fn filled(width: usize, height: usize, color: Color) -> Self {
        Self {
            width,
            height,
            cells: vec![color; width * height],
            version: 0,
        }
    }

    pub fn into_shared(self) -> SharedCanvas {
        Arc::new(Mutex::new(self))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets one cell. Coordinates outside the grid leave it untouched.
    pub fn paint(&mut self, x: i64, y: i64, color: Color) -> Result<(), CanvasError> {
        let index = self.index(x, y).ok_or(CanvasError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = color;
        self.version += 1;
        Ok(())
    }

    /// Returns an independent copy of the grid, indexed `grid[y][x]`
    pub fn snapshot(&self) -> Grid {
        if self.width == 0 {
            return vec![Vec::new(); self.height];
        }
        self.cells
            .chunks(self.width)
            .map(|row| row.to_vec())
            .collect()
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let x = usize::try_from(x).ok()?;
        let y = usize::try_from(y).ok()?;
        if x < self.width && y < self.height {
            Some(y * self.width + x)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed_cells(before: &Grid, after: &Grid) -> Vec<(usize, usize)> {
        let mut changed = Vec::new();
        for (y, (row_a, row_b)) in before.iter().zip(after).enumerate() {
            for (x, (a, b)) in row_a.iter().zip(row_b).enumerate() {
                if a != b {
                    changed.push((x, y));
                }
            }
        }
        changed
    }

    #[test]
    fn test_canvas_creation() {
        let canvas = Canvas::new(50, 50);
        let grid = canvas.snapshot();

        assert_eq!(canvas.width(), 50);
        assert_eq!(canvas.height(), 50);
        assert_eq!(grid.len(), 50);
        assert!(grid.iter().all(|row| row.len() == 50));
        assert!(grid.iter().flatten().all(|c| *c == DEFAULT_COLOR));
    }

    #[test]
    fn test_snapshot_shape_non_square() {
        let canvas = Canvas::new(4, 2);
        let grid = canvas.snapshot();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0].len(), 4);
    }

    #[test]
    fn test_paint_changes_only_target_cell() {
        let mut canvas = Canvas::new(7, 5);

        for y in 0..5 {
            for x in 0..7 {
                let before = canvas.snapshot();
                let color = Color::new(x as u8, y as u8, 42);
                canvas.paint(x, y, color).unwrap();
                let after = canvas.snapshot();

                assert_eq!(after[y as usize][x as usize], color);
                assert_eq!(changed_cells(&before, &after), vec![(x as usize, y as usize)]);
            }
        }
    }

    #[test]
    fn test_paint_out_of_bounds() {
        let mut canvas = Canvas::new(10, 8);
        let before = canvas.snapshot();

        for (x, y) in [(-1, 0), (0, -1), (10, 0), (0, 8), (10, 8), (i64::MAX, 0), (0, i64::MIN)] {
            let result = canvas.paint(x, y, Color::RED);
            assert_eq!(
                result,
                Err(CanvasError::OutOfBounds {
                    x,
                    y,
                    width: 10,
                    height: 8
                })
            );
        }

        assert_eq!(canvas.snapshot(), before);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut canvas = Canvas::new(3, 3);
        let snapshot = canvas.snapshot();

        canvas.paint(1, 1, Color::BLACK).unwrap();

        assert_eq!(snapshot[1][1], DEFAULT_COLOR);
        assert_eq!(canvas.snapshot()[1][1], Color::BLACK);
    }

    #[test]
    fn test_version_counts_successful_paints() {
        let mut canvas = Canvas::filled(2, 2, Color::GREEN);
        assert_eq!(canvas.version(), 0);

        canvas.paint(1, 1, Color::RED).unwrap();
        canvas.paint(1, 1, Color::RED).unwrap();
        assert_eq!(canvas.version(), 2);

        assert!(canvas.paint(2, 1, Color::RED).is_err());
        assert!(canvas.paint(-1, 0, Color::RED).is_err());
        assert_eq!(canvas.version(), 2);
    }

    #[test]
    fn test_empty_canvas_rejects_everything() {
        let mut canvas = Canvas::new(0, 3);
        assert!(canvas.paint(0, 0, Color::RED).is_err());
        assert_eq!(canvas.snapshot(), vec![Vec::<Color>::new(); 3]);
    }

    #[tokio::test]
    async fn test_concurrent_paints_are_not_lost() {
        let canvas = Canvas::new(20, 20).into_shared();
        let mut handles = Vec::new();

        for worker in 0..20i64 {
            let canvas = Arc::clone(&canvas);
            handles.push(tokio::spawn(async move {
                for x in 0..20i64 {
                    let mut guard = canvas.lock().await;
                    guard.paint(x, worker, Color::new(worker as u8, x as u8, 1)).unwrap();
                    drop(guard);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let grid = canvas.lock().await.snapshot();
        for (y, row) in grid.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                assert_eq!(*cell, Color::new(y as u8, x as u8, 1));
            }
        }
    }
}

//! Winline templates — static payline shapes

use serde::{Deserialize, Serialize};

use crate::config::GridSpec;
use crate::error::{SequencerError, SequencerResult};

/// One payline shape: exactly one cell per reel, ordered by column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinlineTemplate {
    /// Position in the template set (the server's line key space)
    pub index: u16,
    /// (column, row) cells sorted by column
    cells: Vec<(u8, u8)>,
}

impl WinlineTemplate {
    /// From row positions per reel, e.g. `[0, 1, 2, 1, 0]` for a V
    pub fn from_positions(index: u16, rows_per_reel: &[u8], grid: &GridSpec) -> SequencerResult<Self> {
        if rows_per_reel.len() != grid.reels as usize {
            return Err(SequencerError::InvalidTemplate {
                index: index as usize,
                reason: format!("{} positions for {} reels", rows_per_reel.len(), grid.reels),
            });
        }
        if let Some(row) = rows_per_reel.iter().find(|r| **r >= grid.rows) {
            return Err(SequencerError::InvalidTemplate {
                index: index as usize,
                reason: format!("row {row} outside {} rows", grid.rows),
            });
        }
        let cells = rows_per_reel
            .iter()
            .enumerate()
            .map(|(col, row)| (col as u8, *row))
            .collect();
        Ok(Self { index, cells })
    }

    /// From a boolean mask (`mask[row][col]`) with one active cell per column
    pub fn from_mask(index: u16, mask: &[Vec<bool>], grid: &GridSpec) -> SequencerResult<Self> {
        let invalid = |reason: String| SequencerError::InvalidTemplate {
            index: index as usize,
            reason,
        };
        if mask.len() != grid.rows as usize || mask.iter().any(|r| r.len() != grid.reels as usize) {
            return Err(invalid(format!("mask is not {}x{}", grid.rows, grid.reels)));
        }

        let mut rows = Vec::with_capacity(grid.reels as usize);
        for col in 0..grid.reels as usize {
            let active: Vec<u8> = (0..grid.rows as usize)
                .filter(|row| mask[*row][col])
                .map(|row| row as u8)
                .collect();
            match active.as_slice() {
                [row] => rows.push(*row),
                _ => {
                    return Err(invalid(format!(
                        "column {col} has {} active cells",
                        active.len()
                    )));
                }
            }
        }
        Self::from_positions(index, &rows, grid)
    }

    pub fn cells(&self) -> &[(u8, u8)] {
        &self.cells
    }

    /// Row of this line on a given reel
    pub fn row_at(&self, col: u8) -> Option<u8> {
        self.cells.iter().find(|(c, _)| *c == col).map(|(_, r)| *r)
    }
}

/// Ordered template set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinlineSet {
    templates: Vec<WinlineTemplate>,
}

/// Standard 20 patterns for 5×3 (index 0 = middle row, 1 = top, 2 = bottom)
const STANDARD_5X3: [[u8; 5]; 20] = [
    [1, 1, 1, 1, 1],
    [0, 0, 0, 0, 0],
    [2, 2, 2, 2, 2],
    [0, 1, 2, 1, 0],
    [2, 1, 0, 1, 2],
    [0, 0, 1, 2, 2],
    [2, 2, 1, 0, 0],
    [1, 0, 0, 0, 1],
    [1, 2, 2, 2, 1],
    [0, 1, 0, 1, 0],
    [2, 1, 2, 1, 2],
    [0, 1, 1, 1, 0],
    [2, 1, 1, 1, 2],
    [1, 1, 0, 1, 1],
    [1, 1, 2, 1, 1],
    [0, 2, 0, 2, 0],
    [2, 0, 2, 0, 2],
    [1, 0, 1, 0, 1],
    [1, 2, 1, 2, 1],
    [0, 0, 2, 0, 0],
];

impl WinlineSet {
    pub fn new(templates: Vec<WinlineTemplate>) -> Self {
        Self { templates }
    }

    /// Standard 20-line set
    pub fn standard_5x3() -> Self {
        let grid = GridSpec::standard_5x3();
        let templates = STANDARD_5X3
            .iter()
            .enumerate()
            .filter_map(|(i, rows)| WinlineTemplate::from_positions(i as u16, rows, &grid).ok())
            .collect();
        Self { templates }
    }

    /// From configured row positions
    pub fn from_positions(lines: &[Vec<u8>], grid: &GridSpec) -> SequencerResult<Self> {
        let templates = lines
            .iter()
            .enumerate()
            .map(|(i, rows)| WinlineTemplate::from_positions(i as u16, rows, grid))
            .collect::<SequencerResult<Vec<_>>>()?;
        Ok(Self { templates })
    }

    /// Configured set, or straight rows when the grid is not 5×3
    pub fn for_grid(lines: Option<&[Vec<u8>]>, grid: &GridSpec) -> SequencerResult<Self> {
        match lines {
            Some(lines) => Self::from_positions(lines, grid),
            None if *grid == GridSpec::standard_5x3() => Ok(Self::standard_5x3()),
            None => {
                let rows: Vec<Vec<u8>> = (0..grid.rows)
                    .map(|row| vec![row; grid.reels as usize])
                    .collect();
                Self::from_positions(&rows, grid)
            }
        }
    }

    pub fn get(&self, index: usize) -> Option<&WinlineTemplate> {
        self.templates.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WinlineTemplate> {
        self.templates.iter()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for WinlineSet {
    fn default() -> Self {
        Self::standard_5x3()
    }
}

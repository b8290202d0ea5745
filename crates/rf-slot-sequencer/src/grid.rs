//! Result grid — reel-major symbol matrix for one round

use serde::{Deserialize, Serialize};

use crate::config::{GridSpec, SymbolRules};
use crate::error::{SequencerError, SequencerResult};

/// One grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub col: u8,
    pub row: u8,
    pub symbol: u32,
}

impl Cell {
    pub fn new(col: u8, row: u8, symbol: u32) -> Self {
        Self { col, row, symbol }
    }

    pub fn position(&self) -> (u8, u8) {
        (self.col, self.row)
    }
}

/// Scatter location, ordered by (column, row)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScatterPosition {
    pub col: u8,
    pub row: u8,
}

/// Immutable result grid
///
/// Serialized as a list of reels, each listing its symbols top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u32>>", into = "Vec<Vec<u32>>")]
pub struct Grid {
    columns: Vec<Vec<u32>>,
    rows: u8,
}

impl Grid {
    /// Build from reels (top to bottom). All reels must share a non-zero height.
    pub fn from_columns(columns: Vec<Vec<u32>>) -> SequencerResult<Self> {
        if columns.is_empty() || columns.len() > u8::MAX as usize {
            return Err(SequencerError::InvalidGrid(format!(
                "{} reels",
                columns.len()
            )));
        }
        let rows = columns[0].len();
        if rows == 0 || rows > u8::MAX as usize {
            return Err(SequencerError::InvalidGrid(format!("{rows} rows")));
        }
        if let Some((idx, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(SequencerError::InvalidGrid(format!(
                "reel {idx} has {} rows, expected {rows}",
                col.len()
            )));
        }
        Ok(Self {
            columns,
            rows: rows as u8,
        })
    }

    /// Build from visual rows (left to right)
    pub fn from_rows(rows: Vec<Vec<u32>>) -> SequencerResult<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != width) {
            return Err(SequencerError::InvalidGrid("ragged rows".into()));
        }
        let columns = (0..width)
            .map(|c| rows.iter().map(|r| r[c]).collect())
            .collect();
        Self::from_columns(columns)
    }

    pub fn reels(&self) -> u8 {
        self.columns.len() as u8
    }

    pub fn rows(&self) -> u8 {
        self.rows
    }

    /// Symbol at (column, row)
    pub fn symbol(&self, col: u8, row: u8) -> Option<u32> {
        self.columns
            .get(col as usize)
            .and_then(|c| c.get(row as usize))
            .copied()
    }

    /// Whole reel, top to bottom
    pub fn column(&self, col: u8) -> Option<&[u32]> {
        self.columns.get(col as usize).map(Vec::as_slice)
    }

    pub fn cell(&self, col: u8, row: u8) -> Option<Cell> {
        self.symbol(col, row).map(|symbol| Cell::new(col, row, symbol))
    }

    /// Does the grid have the configured shape?
    pub fn matches(&self, spec: &GridSpec) -> bool {
        self.reels() == spec.reels && self.rows == spec.rows
    }

    /// Every scatter, sorted by (column, row)
    pub fn scatter_positions(&self, rules: &SymbolRules) -> Vec<ScatterPosition> {
        let mut positions: Vec<ScatterPosition> = self
            .columns
            .iter()
            .enumerate()
            .flat_map(|(col, symbols)| {
                symbols
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| rules.is_scatter(**s))
                    .map(move |(row, _)| ScatterPosition {
                        col: col as u8,
                        row: row as u8,
                    })
            })
            .collect();
        positions.sort();
        positions
    }

    /// Scatter count per reel
    pub fn scatter_tally(&self, rules: &SymbolRules) -> Vec<u8> {
        self.columns
            .iter()
            .map(|c| c.iter().filter(|s| rules.is_scatter(**s)).count() as u8)
            .collect()
    }
}

impl TryFrom<Vec<Vec<u32>>> for Grid {
    type Error = SequencerError;

    fn try_from(columns: Vec<Vec<u32>>) -> Result<Self, Self::Error> {
        Self::from_columns(columns)
    }
}

impl From<Grid> for Vec<Vec<u32>> {
    fn from(grid: Grid) -> Self {
        grid.columns
    }
}

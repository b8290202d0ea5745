//! Payline resolver
//!
//! Maps a grid plus a server win descriptor to the exact cells that make up
//! the win. The descriptor's `line_key` is only a hint: every template is
//! scored against the grid and the best fit is chosen independently.
//!
//! Selection order:
//! 1. templates whose streak length equals the descriptor count
//! 2. otherwise the longest valid streak
//!
//! Ties in both cases go to the index closest to the hint, then the lowest.

use serde::{Deserialize, Serialize};

use crate::config::SymbolRules;
use crate::grid::{Cell, Grid};
use crate::symbols::SymbolClass;
use crate::winlines::{WinlineSet, WinlineTemplate};

/// Server-reported win line (display hint, never re-priced)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinDescriptor {
    /// Template index hint
    #[serde(alias = "lineKey")]
    pub line_key: i32,
    /// Paying symbol
    pub symbol: u32,
    /// Matched cell count
    pub count: u8,
    /// Win amount (display only)
    #[serde(default)]
    pub win: f64,
    /// Explicit (column, row) cells, when the server sends them
    #[serde(default)]
    pub positions: Vec<(u8, u8)>,
}

impl WinDescriptor {
    pub fn new(line_key: i32, symbol: u32, count: u8) -> Self {
        Self {
            line_key,
            symbol,
            count,
            win: 0.0,
            positions: Vec::new(),
        }
    }

    pub fn with_win(mut self, win: f64) -> Self {
        self.win = win;
        self
    }

    pub fn with_positions(mut self, positions: Vec<(u8, u8)>) -> Self {
        self.positions = positions;
        self
    }
}

/// How the resolver treats explicit positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverPolicy {
    /// Template matching first, positions only when it yields nothing
    #[default]
    TemplateFirst,
    /// Positions decide the cells; templates only pick the drawn shape
    PositionsAuthoritative,
}

/// Shape drawn for a resolved line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineShape {
    Template(u16),
    /// One-off shape built from explicit positions
    Synthetic,
}

impl LineShape {
    pub fn template_index(&self) -> Option<u16> {
        match self {
            Self::Template(i) => Some(*i),
            Self::Synthetic => None,
        }
    }
}

/// Resolved win line ready for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPayline {
    pub descriptor: WinDescriptor,
    pub shape: LineShape,
    /// Matched cells, left to right
    pub cells: Vec<Cell>,
    /// Full shape of the line (drawn across, not just matched cells)
    pub line_cells: Vec<(u8, u8)>,
}

impl ResolvedPayline {
    pub fn streak_len(&self) -> usize {
        self.cells.len()
    }

    pub fn positions(&self) -> Vec<(u8, u8)> {
        self.cells.iter().map(Cell::position).collect()
    }
}

/// Template-based payline resolver
#[derive(Debug, Clone)]
pub struct PaylineResolver {
    rules: SymbolRules,
    winlines: WinlineSet,
    policy: ResolverPolicy,
}

impl PaylineResolver {
    pub fn new(rules: SymbolRules, winlines: WinlineSet) -> Self {
        Self {
            rules,
            winlines,
            policy: ResolverPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ResolverPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn winlines(&self) -> &WinlineSet {
        &self.winlines
    }

    /// Matched cells one template produces for `symbol` (empty below the minimum)
    pub fn streak(&self, template: &WinlineTemplate, grid: &Grid, symbol: u32) -> Vec<Cell> {
        let class = self.rules.classify(symbol);
        let line: Vec<Option<Cell>> = template
            .cells()
            .iter()
            .map(|(col, row)| grid.cell(*col, *row))
            .collect();
        let hit = |cell: &Option<Cell>| {
            cell.is_some_and(|c| self.rules.matches(symbol, c.symbol))
        };

        let streak: Vec<Cell> = if class.left_anchored() {
            // Templates are column-sorted; cell 0 must be reel 0
            if template.cells().first().map(|(c, _)| *c) != Some(0) {
                return Vec::new();
            }
            line.iter().take_while(|c| hit(*c)).flatten().copied().collect()
        } else {
            let mut best: (usize, usize) = (0, 0);
            let mut start = 0;
            let mut prev_col: Option<u8> = None;
            for (i, cell) in line.iter().enumerate() {
                let contiguous = match (prev_col, cell) {
                    (Some(p), Some(c)) => c.col == p + 1,
                    _ => true,
                };
                if !hit(cell) {
                    start = i + 1;
                    prev_col = None;
                    continue;
                }
                if !contiguous {
                    start = i;
                }
                prev_col = cell.map(|c| c.col);
                let len = i + 1 - start;
                if len > best.1 {
                    best = (start, len);
                }
            }
            line[best.0..best.0 + best.1].iter().flatten().copied().collect()
        };

        if streak.len() < class.min_streak() {
            Vec::new()
        } else {
            streak
        }
    }

    /// Best-fitting template for a descriptor
    fn select_template(&self, grid: &Grid, win: &WinDescriptor) -> Option<(&WinlineTemplate, Vec<Cell>)> {
        let hint = win.line_key as i64;
        let distance = |t: &WinlineTemplate| ((t.index as i64 - hint).abs(), t.index);

        let scored: Vec<(&WinlineTemplate, Vec<Cell>)> = self
            .winlines
            .iter()
            .map(|t| (t, self.streak(t, grid, win.symbol)))
            .filter(|(_, cells)| !cells.is_empty())
            .collect();

        let exact = scored
            .iter()
            .filter(|(_, cells)| cells.len() == win.count as usize)
            .min_by_key(|(t, _)| distance(*t));
        if let Some((t, cells)) = exact {
            return Some((*t, cells.clone()));
        }

        let longest = scored.iter().map(|(_, c)| c.len()).max()?;
        scored
            .into_iter()
            .filter(|(_, cells)| cells.len() == longest)
            .min_by_key(|(t, _)| distance(*t))
    }

    /// Cells from explicit positions, sorted by column, out-of-bounds dropped
    fn cells_from_positions(&self, grid: &Grid, win: &WinDescriptor) -> Vec<Cell> {
        let mut positions = win.positions.clone();
        positions.sort();
        positions.dedup();
        let cells: Vec<Cell> = positions
            .iter()
            .filter_map(|(col, row)| grid.cell(*col, *row))
            .collect();
        if cells.len() != positions.len() {
            log::warn!(
                "[Resolver] dropped {} out-of-grid positions for line {}",
                positions.len() - cells.len(),
                win.line_key
            );
        }
        cells
    }

    /// Template whose shape covers every position (closest to the hint)
    fn template_covering(&self, cells: &[Cell], hint: i32) -> Option<&WinlineTemplate> {
        self.winlines
            .iter()
            .filter(|t| cells.iter().all(|c| t.row_at(c.col) == Some(c.row)))
            .min_by_key(|t| ((t.index as i64 - hint as i64).abs(), t.index))
    }

    fn synthetic(&self, win: &WinDescriptor, cells: Vec<Cell>) -> ResolvedPayline {
        ResolvedPayline {
            descriptor: win.clone(),
            shape: LineShape::Synthetic,
            line_cells: cells.iter().map(Cell::position).collect(),
            cells,
        }
    }

    /// Resolve one descriptor; None when no cells can be derived
    pub fn resolve(&self, grid: &Grid, win: &WinDescriptor) -> Option<ResolvedPayline> {
        if self.policy == ResolverPolicy::PositionsAuthoritative && !win.positions.is_empty() {
            let cells = self.cells_from_positions(grid, win);
            if !cells.is_empty() {
                return Some(match self.template_covering(&cells, win.line_key) {
                    Some(t) => ResolvedPayline {
                        descriptor: win.clone(),
                        shape: LineShape::Template(t.index),
                        line_cells: t.cells().to_vec(),
                        cells,
                    },
                    None => self.synthetic(win, cells),
                });
            }
        }

        if let Some((template, cells)) = self.select_template(grid, win) {
            if template.index as i64 != win.line_key as i64 {
                log::debug!(
                    "[Resolver] line {} re-derived on template {}",
                    win.line_key,
                    template.index
                );
            }
            return Some(ResolvedPayline {
                descriptor: win.clone(),
                shape: LineShape::Template(template.index),
                line_cells: template.cells().to_vec(),
                cells,
            });
        }

        if !win.positions.is_empty() {
            let cells = self.cells_from_positions(grid, win);
            if !cells.is_empty() {
                log::debug!("[Resolver] line {} built from explicit positions", win.line_key);
                return Some(self.synthetic(win, cells));
            }
        }

        log::warn!(
            "[Resolver] no cells for line {} (symbol {}, count {})",
            win.line_key,
            win.symbol,
            win.count
        );
        None
    }

    /// Resolve every descriptor, skipping the ones that yield nothing
    pub fn resolve_all(&self, grid: &Grid, wins: &[WinDescriptor]) -> Vec<ResolvedPayline> {
        wins.iter().filter_map(|w| self.resolve(grid, w)).collect()
    }
}

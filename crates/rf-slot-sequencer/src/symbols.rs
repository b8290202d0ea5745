//! Symbol roles and filler picks

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::SymbolRules;

/// Role a symbol id plays in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
    /// Left-anchored line symbol
    Ordinary,
    /// Pays on any contiguous run
    Bidirectional,
    /// Anticipation trigger, never substituted
    Scatter,
    /// Universal substitute
    Collector,
}

impl SymbolClass {
    /// Minimum streak that counts as a win for this class
    pub fn min_streak(&self) -> usize {
        match self {
            Self::Bidirectional => 2,
            _ => 3,
        }
    }

    /// Does matching require a run starting at column 0?
    pub fn left_anchored(&self) -> bool {
        !matches!(self, Self::Bidirectional)
    }
}

impl SymbolRules {
    pub fn classify(&self, symbol: u32) -> SymbolClass {
        if symbol == self.scatter_id {
            SymbolClass::Scatter
        } else if symbol == self.collector_id {
            SymbolClass::Collector
        } else if symbol == self.bidirectional_id {
            SymbolClass::Bidirectional
        } else {
            SymbolClass::Ordinary
        }
    }

    pub fn is_scatter(&self, symbol: u32) -> bool {
        symbol == self.scatter_id
    }

    /// Does `cell` count as `target`? Collector substitutes except for scatter.
    pub fn matches(&self, target: u32, cell: u32) -> bool {
        cell == target || (cell == self.collector_id && target != self.scatter_id)
    }
}

/// Random filler source for spinning reels
///
/// Purely cosmetic; outcome symbols always come from the server grid.
#[derive(Debug)]
pub struct FillerPool {
    symbols: Vec<u32>,
    rng: StdRng,
}

impl FillerPool {
    pub fn new(symbols: Vec<u32>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { symbols, rng }
    }

    pub fn from_rules(rules: &SymbolRules) -> Self {
        Self::new(rules.filler_pool.clone(), rules.filler_seed)
    }

    /// Fresh filler pick (falls back to the bidirectional id on an empty pool)
    pub fn pick(&mut self) -> u32 {
        if self.symbols.is_empty() {
            return 1;
        }
        let idx = self.rng.random_range(0..self.symbols.len());
        self.symbols[idx]
    }

    /// Fill `count` slots
    pub fn strip(&mut self, count: usize) -> Vec<u32> {
        (0..count).map(|_| self.pick()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_defaults() {
        let rules = SymbolRules::default();
        assert_eq!(rules.classify(12), SymbolClass::Scatter);
        assert_eq!(rules.classify(11), SymbolClass::Collector);
        assert_eq!(rules.classify(1), SymbolClass::Bidirectional);
        assert_eq!(rules.classify(5), SymbolClass::Ordinary);
        assert_eq!(SymbolClass::Bidirectional.min_streak(), 2);
        assert_eq!(SymbolClass::Ordinary.min_streak(), 3);
    }

    #[test]
    fn test_collector_never_substitutes_scatter() {
        let rules = SymbolRules::default();
        assert!(rules.matches(5, 11));
        assert!(rules.matches(1, 11));
        assert!(!rules.matches(12, 11));
        assert!(rules.matches(12, 12));
        assert!(!rules.matches(5, 6));
    }

    #[test]
    fn test_filler_pool_seeded() {
        let mut a = FillerPool::new((1..=10).collect(), Some(7));
        let mut b = FillerPool::new((1..=10).collect(), Some(7));
        assert_eq!(a.strip(16), b.strip(16));
        assert!(a.strip(64).iter().all(|s| (1..=10).contains(s)));
    }
}

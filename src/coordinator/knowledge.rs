//! Strategy performance records
//!
//! The coordinator remembers how each strategy fared on each goal shape and
//! uses that history to order candidates on the next call. Records are
//! append-only: an outcome is folded into the counters and never rewritten.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::prover::StrategyKind;

/// Accumulated history for one strategy on one goal signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub attempts: u64,
    pub successes: u64,
    pub total_elapsed_ms: u64,
}

impl StrategyRecord {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }

    /// Mean wall time per attempt, used as a tiebreaker
    pub fn mean_elapsed_ms(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.total_elapsed_ms as f64 / self.attempts as f64
    }
}

/// Per-signature strategy history with ranking
///
/// Keys are [`GoalProfile::signature`] strings. The map is insertion
/// ordered so serialization is stable across runs.
///
/// [`GoalProfile::signature`]: crate::prover::GoalProfile::signature
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyKnowledgeBase {
    /// Bumped on every recorded outcome
    version: u64,
    records: IndexMap<String, IndexMap<StrategyKind, StrategyRecord>>,
}

impl StrategyKnowledgeBase {
    pub fn new() -> Self {
        StrategyKnowledgeBase::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Fold one observed outcome into the history
    pub fn record(
        &mut self,
        signature: &str,
        strategy: StrategyKind,
        succeeded: bool,
        elapsed_ms: u64,
    ) {
        let entry = self
            .records
            .entry(signature.to_string())
            .or_default()
            .entry(strategy)
            .or_default();
        entry.attempts += 1;
        if succeeded {
            entry.successes += 1;
        }
        entry.total_elapsed_ms += elapsed_ms;
        self.version += 1;
    }

    pub fn get(&self, signature: &str, strategy: StrategyKind) -> Option<&StrategyRecord> {
        self.records.get(signature)?.get(&strategy)
    }

    /// Order candidate strategies for a signature
    ///
    /// Higher success rate first; among equals, cheaper mean time first.
    /// Unseen strategies keep their given order, after proven performers
    /// and before strategies that have only ever failed.
    pub fn rank(&self, signature: &str, candidates: &[StrategyKind]) -> Vec<StrategyKind> {
        let mut scored: Vec<(usize, StrategyKind, f64, f64)> = candidates
            .iter()
            .enumerate()
            .map(|(pos, &kind)| match self.get(signature, kind) {
                Some(r) if r.attempts > 0 => (pos, kind, r.success_rate(), r.mean_elapsed_ms()),
                // No history: neutral prior
                _ => (pos, kind, 0.5, 0.0),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.3.partial_cmp(&b.3).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.0.cmp(&b.0))
        });

        scored.into_iter().map(|(_, kind, _, _)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut kb = StrategyKnowledgeBase::new();
        kb.record("pf--", StrategyKind::Resolution, true, 10);
        kb.record("pf--", StrategyKind::Resolution, false, 30);

        let r = kb.get("pf--", StrategyKind::Resolution).unwrap();
        assert_eq!(r.attempts, 2);
        assert_eq!(r.successes, 1);
        assert_eq!(r.total_elapsed_ms, 40);
        assert_eq!(kb.version(), 2);
    }

    #[test]
    fn test_rank_prefers_success_rate() {
        let mut kb = StrategyKnowledgeBase::new();
        kb.record("-f--", StrategyKind::Resolution, true, 100);
        kb.record("-f--", StrategyKind::Clp, false, 5);

        let ranked = kb.rank("-f--", &[StrategyKind::Clp, StrategyKind::Resolution]);
        assert_eq!(ranked[0], StrategyKind::Resolution);
    }

    #[test]
    fn test_rank_breaks_ties_by_cost() {
        let mut kb = StrategyKnowledgeBase::new();
        kb.record("---c", StrategyKind::Smt, true, 5);
        kb.record("---c", StrategyKind::Clp, true, 50);

        let ranked = kb.rank("---c", &[StrategyKind::Clp, StrategyKind::Smt]);
        assert_eq!(ranked[0], StrategyKind::Smt);
    }

    #[test]
    fn test_unseen_strategy_ranks_between() {
        let mut kb = StrategyKnowledgeBase::new();
        kb.record("p---", StrategyKind::Resolution, true, 10);
        kb.record("p---", StrategyKind::Clp, false, 10);
        kb.record("p---", StrategyKind::Clp, false, 10);

        let ranked = kb.rank(
            "p---",
            &[
                StrategyKind::Clp,
                StrategyKind::ModalTableau,
                StrategyKind::Resolution,
            ],
        );
        assert_eq!(ranked[0], StrategyKind::Resolution);
        assert_eq!(ranked[1], StrategyKind::ModalTableau);
        assert_eq!(ranked[2], StrategyKind::Clp);
    }

    #[test]
    fn test_signatures_are_independent() {
        let mut kb = StrategyKnowledgeBase::new();
        kb.record("p---", StrategyKind::Resolution, true, 10);
        assert!(kb.get("-f--", StrategyKind::Resolution).is_none());
    }
}

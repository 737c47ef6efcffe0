//! Given-clause saturation prover
//!
//! Refutation by saturation: the negated goal joins the clause set and the
//! loop draws the cheapest passive clause, resolves and factors it against
//! everything processed so far, and stops on the empty clause. An exhausted
//! passive queue means the clause set is satisfiable, so the goal is not
//! entailed.
//!
//! Two selection policies are supported. `UnitPreference` keeps every
//! clause in the passive queue and draws unit clauses before anything else.
//! `SetOfSupport` seeds the queue with goal-descended clauses only, so every
//! inference touches the goal's ancestry.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;
use crate::proof::{Justification, Outcome, ProofObject, StepId};
use crate::term::Term;

use super::clause::{clausify_problem, Clause, ClauseOrigin};
use super::resolution::{factor_all, resolve_all};
use super::{is_constraint_atom, BudgetMeter, GoalProfile, Strategy, StrategyKind};

/// Passive clause selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionPolicy {
    /// All clauses enter the passive queue; unit clauses drawn first
    #[default]
    UnitPreference,
    /// Only goal-descended clauses enter the passive queue
    SetOfSupport,
}

/// Configuration for the resolution prover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub policy: ResolutionPolicy,
    /// Clauses heavier than this are discarded
    pub max_clause_weight: usize,
    pub verbose: bool,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        ResolutionConfig {
            policy: ResolutionPolicy::UnitPreference,
            max_clause_weight: 100,
            verbose: false,
        }
    }
}

/// Priority wrapper: min-heap on (unit bias, weight, id)
#[derive(Debug, Clone)]
struct WeightedClause {
    clause: Clause,
    unit_bias: bool,
}

impl WeightedClause {
    fn key(&self) -> (usize, usize, usize) {
        let bias = if self.unit_bias && self.clause.is_unit() {
            0
        } else {
            1
        };
        (bias, self.clause.weight, self.clause.id)
    }
}

impl PartialEq for WeightedClause {
    fn eq(&self, other: &Self) -> bool {
        self.clause.id == other.clause.id
    }
}

impl Eq for WeightedClause {}

impl PartialOrd for WeightedClause {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeightedClause {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the cheapest clause
        other.key().cmp(&self.key())
    }
}

/// Resolution strategy over CNF saturation
#[derive(Debug, Default)]
pub struct ResolutionProver {
    config: ResolutionConfig,
}

impl ResolutionProver {
    pub fn new() -> Self {
        ResolutionProver::default()
    }

    pub fn with_config(config: ResolutionConfig) -> Self {
        ResolutionProver { config }
    }
}

impl Strategy for ResolutionProver {
    fn name(&self) -> &'static str {
        "resolution"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Resolution
    }

    fn supports(&self, profile: &GoalProfile) -> bool {
        !profile.modal
    }

    fn attempt(&self, goal: &Term, context: &Context, meter: &BudgetMeter) -> Result<ProofObject> {
        let premises: Vec<Term> = context.premises().cloned().collect();
        let set = match clausify_problem(&premises, goal) {
            Ok(set) => set,
            Err(e) => {
                return Ok(ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::Unknown { reason: e.message },
                ))
            }
        };

        let mut search = Search::new(&self.config);
        for clause in set.clauses {
            search.process_new_clause(clause);
        }

        let outcome = search.run(meter);
        let mut proof = match outcome {
            SearchResult::Refuted(empty_id) => {
                let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Proved);
                search.reconstruct(empty_id, &mut proof);
                proof
            }
            SearchResult::Saturated => {
                // Constraint atoms are interpreted elsewhere; a saturated
                // set containing them is not a countermodel
                let interpreted = search
                    .all_clauses
                    .iter()
                    .any(|c| c.literals.iter().any(|l| is_constraint_atom(&l.atom)));
                let mut proof = if interpreted {
                    ProofObject::new(
                        goal.clone(),
                        self.name(),
                        Outcome::Unknown {
                            reason: "clause set saturated but contains interpreted atoms"
                                .to_string(),
                        },
                    )
                } else if search.weight_discarded {
                    ProofObject::new(
                        goal.clone(),
                        self.name(),
                        Outcome::Unknown {
                            reason: "saturation incomplete: clauses over the weight limit \
                                     were discarded"
                                .to_string(),
                        },
                    )
                } else {
                    ProofObject::new(goal.clone(), self.name(), Outcome::Disproved)
                };
                proof.diagnostics.push(format!(
                    "saturation exhausted after {} clauses without deriving the empty clause",
                    search.all_clauses.len()
                ));
                proof
            }
            SearchResult::OutOfBudget(resource) => {
                let mut proof = ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::ResourceExhausted(resource),
                );
                proof.diagnostics.push(format!(
                    "stopped at {} clauses, {} resolution steps",
                    search.all_clauses.len(),
                    search.resolution_steps
                ));
                proof
            }
        };

        proof.stats.clauses_generated = search.all_clauses.len();
        proof.stats.resolution_steps = search.resolution_steps;
        Ok(proof.with_elapsed(meter.elapsed()))
    }
}

enum SearchResult {
    Refuted(usize),
    Saturated,
    OutOfBudget(crate::proof::ExhaustedResource),
}

/// Per-attempt search state
struct Search {
    policy: ResolutionPolicy,
    max_clause_weight: usize,
    verbose: bool,
    /// Processed clauses
    usable: Vec<Clause>,
    /// Passive queue
    sos: BinaryHeap<WeightedClause>,
    /// Every kept clause by id, for proof reconstruction
    all_clauses: Vec<Clause>,
    next_id: usize,
    resolution_steps: usize,
    seen: HashSet<String>,
    /// A derived clause was dropped for exceeding the weight limit
    weight_discarded: bool,
}

impl Search {
    fn new(config: &ResolutionConfig) -> Self {
        Search {
            policy: config.policy,
            max_clause_weight: config.max_clause_weight,
            verbose: config.verbose,
            usable: Vec::new(),
            sos: BinaryHeap::new(),
            all_clauses: Vec::new(),
            next_id: 1,
            resolution_steps: 0,
            seen: HashSet::new(),
            weight_discarded: false,
        }
    }

    /// Simplify, dedup and file a freshly derived clause
    fn process_new_clause(&mut self, mut clause: Clause) {
        clause.remove_duplicates();

        if clause.is_tautology() {
            return;
        }
        if !clause.is_empty() && clause.weight > self.max_clause_weight {
            // The discarded clause may have led to a refutation, so a later
            // saturation is no longer a completeness certificate
            self.weight_discarded = true;
            return;
        }

        if !self.seen.insert(clause.signature()) {
            return;
        }

        // Forward subsumption
        if self.usable.iter().any(|c| c.subsumes(&clause)) {
            return;
        }
        // Backward subsumption
        self.usable.retain(|c| !clause.subsumes(c));

        clause.id = self.next_id;
        self.next_id += 1;
        self.all_clauses.push(clause.clone());

        let to_sos = match self.policy {
            ResolutionPolicy::UnitPreference => true,
            ResolutionPolicy::SetOfSupport => clause.is_goal,
        };
        if to_sos {
            self.sos.push(WeightedClause {
                clause,
                unit_bias: self.policy == ResolutionPolicy::UnitPreference,
            });
        } else {
            self.usable.push(clause);
        }
    }

    fn run(&mut self, meter: &BudgetMeter) -> SearchResult {
        while let Some(WeightedClause { clause: given, .. }) = self.sos.pop() {
            // Budget checkpoint, once per given clause
            if let Some(resource) = meter.check_clauses(self.all_clauses.len()) {
                return SearchResult::OutOfBudget(resource);
            }

            if given.is_empty() {
                return SearchResult::Refuted(given.id);
            }

            if self.verbose && self.resolution_steps % 1000 == 0 {
                eprintln!(
                    "given clause {} ({} processed): {}",
                    given.id,
                    self.usable.len(),
                    given
                );
            }

            let new_clauses = self.infer(&given);
            self.usable.push(given);

            for clause in new_clauses {
                if clause.is_empty() {
                    // File it so reconstruction can trace its parents
                    let mut empty = clause;
                    empty.id = self.next_id;
                    self.next_id += 1;
                    let id = empty.id;
                    self.all_clauses.push(empty);
                    return SearchResult::Refuted(id);
                }
                self.process_new_clause(clause);
            }
        }

        SearchResult::Saturated
    }

    /// All resolvents and factors of the given clause
    fn infer(&mut self, given: &Clause) -> Vec<Clause> {
        let mut results = Vec::new();

        for usable in &self.usable {
            let resolvents = resolve_all(given, usable, &mut self.next_id);
            self.resolution_steps += resolvents.len();
            results.extend(resolvents);
        }

        results.extend(factor_all(given, &mut self.next_id));
        results
    }

    /// Trace the empty clause's ancestry into ordered proof steps
    fn reconstruct(&self, empty_id: usize, proof: &mut ProofObject) {
        // Collect the ancestry
        let mut needed: HashSet<usize> = HashSet::new();
        let mut stack = vec![empty_id];
        while let Some(id) = stack.pop() {
            if !needed.insert(id) {
                continue;
            }
            if let Some(clause) = self.all_clauses.iter().find(|c| c.id == id) {
                match &clause.origin {
                    ClauseOrigin::Input | ClauseOrigin::NegatedGoal => {}
                    ClauseOrigin::Resolution {
                        clause1, clause2, ..
                    } => {
                        stack.push(*clause1);
                        stack.push(*clause2);
                    }
                    ClauseOrigin::Factor { clause, .. } => stack.push(*clause),
                }
            }
        }

        // Emit in derivation order; clause ids grow monotonically so sorting
        // by id respects parent-before-child
        let mut ordered: Vec<&Clause> = self
            .all_clauses
            .iter()
            .filter(|c| needed.contains(&c.id))
            .collect();
        ordered.sort_by_key(|c| c.id);

        let mut step_of: HashMap<usize, StepId> = HashMap::new();
        for clause in ordered {
            let justification = match &clause.origin {
                ClauseOrigin::Input => Justification::Premise,
                ClauseOrigin::NegatedGoal => Justification::NegatedGoal,
                ClauseOrigin::Resolution {
                    clause1,
                    clause2,
                    lit1_idx,
                    lit2_idx,
                } => Justification::Resolution {
                    left: step_of.get(clause1).copied().unwrap_or(0),
                    right: step_of.get(clause2).copied().unwrap_or(0),
                    left_literal: *lit1_idx,
                    right_literal: *lit2_idx,
                },
                ClauseOrigin::Factor {
                    clause: parent,
                    lit1_idx,
                    lit2_idx,
                } => Justification::Factoring {
                    from: step_of.get(parent).copied().unwrap_or(0),
                    literal1: *lit1_idx,
                    literal2: *lit2_idx,
                },
            };
            let step = proof.push_step(clause.to_term(), justification);
            step_of.insert(clause.id, step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::ExhaustedResource;
    use crate::prover::Budget;
    use crate::term::parse_term;

    fn prove(premises: &str, goal: &str) -> ProofObject {
        let ctx = Context::parse(premises).unwrap();
        let goal = parse_term(goal).unwrap();
        let prover = ResolutionProver::new();
        prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap()
    }

    #[test]
    fn test_single_step_entailment() {
        // At(John,Home) and At(X,Home) -> CanGoTo(X,Home) entail
        // CanGoTo(John,Home)
        let proof = prove(
            "At(john,home)\nforall X. At(X,home) -> CanGoTo(X,home)\n",
            "CanGoTo(john,home)",
        );
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof.check().is_ok());
        assert!(proof.steps.len() >= 3);
    }

    #[test]
    fn test_unprovable_goal_saturates() {
        let proof = prove(
            "At(john,home)\nforall X. At(X,home) -> CanGoTo(X,home)\n",
            "CanGoTo(john,park)",
        );
        assert_eq!(proof.outcome, Outcome::Disproved);
        assert!(!proof.diagnostics.is_empty());
    }

    #[test]
    fn test_propositional_modus_ponens() {
        let proof = prove("p\np -> q\n", "q");
        assert_eq!(proof.outcome, Outcome::Proved);
    }

    #[test]
    fn test_chained_rules() {
        let proof = prove(
            "P(a)\nforall X. P(X) -> Q(X)\nforall X. Q(X) -> R(X)\n",
            "R(a)",
        );
        assert_eq!(proof.outcome, Outcome::Proved);
    }

    #[test]
    fn test_proof_steps_trace_to_premises() {
        let proof = prove("p\np -> q\n", "q");
        assert!(proof
            .steps
            .iter()
            .any(|s| matches!(s.justification, Justification::Premise)));
        assert!(proof
            .steps
            .iter()
            .any(|s| matches!(s.justification, Justification::NegatedGoal)));
        assert!(proof
            .steps
            .iter()
            .any(|s| matches!(s.justification, Justification::Resolution { .. })));
    }

    #[test]
    fn test_set_of_support_policy() {
        let ctx = Context::parse("p\np -> q\n").unwrap();
        let goal = parse_term("q").unwrap();
        let prover = ResolutionProver::with_config(ResolutionConfig {
            policy: ResolutionPolicy::SetOfSupport,
            ..ResolutionConfig::default()
        });
        let proof = prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap();
        assert_eq!(proof.outcome, Outcome::Proved);
    }

    #[test]
    fn test_growing_clause_set_exhausts_budget() {
        // f grows without bound: P(X) -> P(f(X)) with seed P(a) and an
        // unreachable goal keeps producing new clauses forever
        let ctx = Context::parse("P(a)\nforall X. P(X) -> P(f(X))\n").unwrap();
        let goal = parse_term("Q(a)").unwrap();
        let prover = ResolutionProver::new();
        let meter = BudgetMeter::new(Budget {
            max_clauses: 50,
            deadline_ms: 0,
            ..Budget::default()
        });
        let proof = prover.attempt(&goal, &ctx, &meter).unwrap();
        assert_eq!(
            proof.outcome,
            Outcome::ResourceExhausted(ExhaustedResource::Clauses)
        );
    }

    #[test]
    fn test_weight_discard_blocks_disproof() {
        // An entailed goal whose proof needs a clause over the weight limit
        // must not come back refuted
        let ctx = Context::parse("p\np -> q\n").unwrap();
        let goal = parse_term("q").unwrap();
        let prover = ResolutionProver::with_config(ResolutionConfig {
            max_clause_weight: 1,
            ..ResolutionConfig::default()
        });
        let proof = prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap();
        assert!(matches!(proof.outcome, Outcome::Unknown { .. }));
    }

    #[test]
    fn test_modal_context_reports_unknown() {
        let ctx = Context::parse("[]p\n").unwrap();
        let goal = parse_term("p").unwrap();
        let prover = ResolutionProver::new();
        let proof = prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap();
        assert!(matches!(proof.outcome, Outcome::Unknown { .. }));
    }
}

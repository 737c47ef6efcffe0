//! Modal tableau prover
//!
//! Signed tableau over possible worlds. The root branch holds every premise
//! signed true and the goal signed false, all in world 0; the goal is
//! entailed exactly when every branch closes on a same-world complementary
//! pair. Alpha rules extend a branch, beta rules split it, and the modal
//! rules create or revisit worlds along the accessibility relation of the
//! configured system:
//!
//! - K: only explicit edges
//! - T: reflexive
//! - S4: reflexive and transitive
//! - S5: one universal equivalence class
//!
//! An open branch with nothing left to expand is a countermodel; its
//! literals per world are reported as diagnostics.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{InferError, Result};
use crate::proof::{Justification, Outcome, ProofObject};
use crate::term::{ConnectiveKind, Term};

use super::{BudgetMeter, GoalProfile, Strategy, StrategyKind};

/// Modal accessibility discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModalSystem {
    K,
    T,
    #[default]
    S4,
    S5,
}

impl ModalSystem {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "k" => Ok(ModalSystem::K),
            "t" => Ok(ModalSystem::T),
            "s4" => Ok(ModalSystem::S4),
            "s5" => Ok(ModalSystem::S5),
            other => Err(InferError::config(format!(
                "unknown modal system '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ModalSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModalSystem::K => "K",
            ModalSystem::T => "T",
            ModalSystem::S4 => "S4",
            ModalSystem::S5 => "S5",
        };
        write!(f, "{}", s)
    }
}

/// A formula with a truth sign in a particular world
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignedFormula {
    sign: bool,
    formula: Term,
    world: usize,
}

impl SignedFormula {
    fn new(sign: bool, formula: Term, world: usize) -> Self {
        SignedFormula {
            sign,
            formula,
            world,
        }
    }

    fn key(&self) -> String {
        format!("{}@{}:{}", self.sign, self.world, self.formula)
    }

    fn is_literal(&self) -> bool {
        self.formula.is_atom()
    }
}

/// Rule classification of a signed formula
enum Rule {
    /// Extends the branch with both components
    Alpha(SignedFormula, SignedFormula),
    /// Splits the branch
    Beta(SignedFormula, SignedFormula),
    /// Holds in every accessible world (T-box / F-diamond)
    Nu(bool, Term),
    /// Forces a new accessible world (F-box / T-diamond)
    Pi(bool, Term),
    /// Single-component rewrite (negation sign flip)
    Single(SignedFormula),
    /// Nothing to do
    None,
}

fn classify(sf: &SignedFormula) -> Rule {
    let w = sf.world;
    match &sf.formula {
        Term::Connective(ConnectiveKind::Not, args) => Rule::Single(SignedFormula::new(
            !sf.sign,
            args[0].clone(),
            w,
        )),
        Term::Connective(ConnectiveKind::And, args) => {
            if sf.sign {
                Rule::Alpha(
                    SignedFormula::new(true, args[0].clone(), w),
                    SignedFormula::new(true, args[1].clone(), w),
                )
            } else {
                Rule::Beta(
                    SignedFormula::new(false, args[0].clone(), w),
                    SignedFormula::new(false, args[1].clone(), w),
                )
            }
        }
        Term::Connective(ConnectiveKind::Or, args) => {
            if sf.sign {
                Rule::Beta(
                    SignedFormula::new(true, args[0].clone(), w),
                    SignedFormula::new(true, args[1].clone(), w),
                )
            } else {
                Rule::Alpha(
                    SignedFormula::new(false, args[0].clone(), w),
                    SignedFormula::new(false, args[1].clone(), w),
                )
            }
        }
        Term::Connective(ConnectiveKind::Implies, args) => {
            if sf.sign {
                Rule::Beta(
                    SignedFormula::new(false, args[0].clone(), w),
                    SignedFormula::new(true, args[1].clone(), w),
                )
            } else {
                Rule::Alpha(
                    SignedFormula::new(true, args[0].clone(), w),
                    SignedFormula::new(false, args[1].clone(), w),
                )
            }
        }
        Term::Connective(ConnectiveKind::Iff, args) => {
            let a = args[0].clone();
            let b = args[1].clone();
            if sf.sign {
                // T(A<->B): (A&B) | (~A&~B)
                Rule::Beta(
                    SignedFormula::new(true, Term::and(a.clone(), b.clone()), w),
                    SignedFormula::new(false, Term::or(a, b), w),
                )
            } else {
                // F(A<->B): (A&~B) | (~A&B)
                Rule::Beta(
                    SignedFormula::new(true, Term::and(a.clone(), b.clone().negate()), w),
                    SignedFormula::new(true, Term::and(a.negate(), b), w),
                )
            }
        }
        Term::Connective(ConnectiveKind::Necessarily, args) => {
            if sf.sign {
                Rule::Nu(true, args[0].clone())
            } else {
                Rule::Pi(false, args[0].clone())
            }
        }
        Term::Connective(ConnectiveKind::Possibly, args) => {
            if sf.sign {
                Rule::Pi(true, args[0].clone())
            } else {
                Rule::Nu(false, args[0].clone())
            }
        }
        _ => Rule::None,
    }
}

/// One tableau branch with its worlds and expansion marks
#[derive(Debug, Clone)]
struct Branch {
    formulas: Vec<SignedFormula>,
    present: HashSet<String>,
    /// Formulas already expanded (alpha/beta/pi/single)
    expanded: HashSet<String>,
    /// (nu formula key, target world) pairs already applied
    nu_applied: HashSet<(String, usize)>,
    /// Explicit accessibility edges
    edges: Vec<(usize, usize)>,
    num_worlds: usize,
}

impl Branch {
    fn root(premises: &[Term], goal: &Term) -> Self {
        let mut branch = Branch {
            formulas: Vec::new(),
            present: HashSet::new(),
            expanded: HashSet::new(),
            nu_applied: HashSet::new(),
            edges: Vec::new(),
            num_worlds: 1,
        };
        for p in premises {
            branch.add(SignedFormula::new(true, p.clone(), 0));
        }
        branch.add(SignedFormula::new(false, goal.clone(), 0));
        branch
    }

    fn add(&mut self, sf: SignedFormula) -> bool {
        if self.present.insert(sf.key()) {
            self.formulas.push(sf);
            true
        } else {
            false
        }
    }

    /// Worlds accessible from `from` under the system's closure
    fn accessible(&self, from: usize, system: ModalSystem) -> Vec<usize> {
        match system {
            ModalSystem::K => self
                .edges
                .iter()
                .filter(|(a, _)| *a == from)
                .map(|(_, b)| *b)
                .collect(),
            ModalSystem::T => {
                let mut ws: Vec<usize> = self
                    .edges
                    .iter()
                    .filter(|(a, _)| *a == from)
                    .map(|(_, b)| *b)
                    .collect();
                if !ws.contains(&from) {
                    ws.push(from);
                }
                ws
            }
            ModalSystem::S4 => {
                // Reflexive-transitive closure by fixpoint
                let mut reach: HashSet<usize> = HashSet::new();
                reach.insert(from);
                loop {
                    let before = reach.len();
                    for (a, b) in &self.edges {
                        if reach.contains(a) {
                            reach.insert(*b);
                        }
                    }
                    if reach.len() == before {
                        break;
                    }
                }
                reach.into_iter().collect()
            }
            ModalSystem::S5 => (0..self.num_worlds).collect(),
        }
    }

    /// Same-world complementary literal pair, if any
    fn closure(&self) -> Option<(&SignedFormula, &SignedFormula)> {
        for (i, a) in self.formulas.iter().enumerate() {
            if !a.is_literal() {
                continue;
            }
            for b in self.formulas.iter().skip(i + 1) {
                if b.is_literal()
                    && a.world == b.world
                    && a.sign != b.sign
                    && a.formula == b.formula
                {
                    return Some((a, b));
                }
            }
        }
        None
    }

    /// Literals of an open branch grouped per world, for countermodel output
    fn describe_model(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for w in 0..self.num_worlds {
            let mut parts: Vec<String> = self
                .formulas
                .iter()
                .filter(|sf| sf.is_literal() && sf.world == w)
                .map(|sf| {
                    if sf.sign {
                        format!("{}", sf.formula)
                    } else {
                        format!("~{}", sf.formula)
                    }
                })
                .collect();
            parts.sort();
            lines.push(format!("world {}: {}", w, parts.join(", ")));
        }
        lines
    }
}

/// Configuration for the tableau prover
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableauConfig {
    pub system: ModalSystem,
    pub verbose: bool,
}

/// Tableau strategy with possible worlds
#[derive(Debug, Default)]
pub struct ModalTableauProver {
    config: TableauConfig,
}

impl ModalTableauProver {
    pub fn new(system: ModalSystem) -> Self {
        ModalTableauProver {
            config: TableauConfig {
                system,
                verbose: false,
            },
        }
    }

    pub fn with_config(config: TableauConfig) -> Self {
        ModalTableauProver { config }
    }
}

impl Strategy for ModalTableauProver {
    fn name(&self) -> &'static str {
        "modal-tableau"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::ModalTableau
    }

    fn supports(&self, profile: &GoalProfile) -> bool {
        // Quantifier-free formulas only; variables are treated as constants
        profile.modal || profile.propositional
    }

    fn attempt(&self, goal: &Term, context: &Context, meter: &BudgetMeter) -> Result<ProofObject> {
        if goal.has_quantifier() || context.premises().any(|p| p.has_quantifier()) {
            return Ok(ProofObject::new(
                goal.clone(),
                self.name(),
                Outcome::Unknown {
                    reason: "quantified formulas are outside the tableau fragment".to_string(),
                },
            ));
        }

        let premises: Vec<Term> = context.premises().cloned().collect();
        let mut open_branches = vec![Branch::root(&premises, goal)];
        let mut nodes = 0usize;
        let mut worlds_created = 0usize;
        let mut closures: Vec<(usize, bool, Term)> = Vec::new();

        while let Some(mut branch) = open_branches.pop() {
            // Budget checkpoint, once per expansion step
            if let Some(resource) = meter.check_nodes(nodes) {
                let mut proof = ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::ResourceExhausted(resource),
                );
                proof.stats.worlds_created = worlds_created;
                return Ok(proof.with_elapsed(meter.elapsed()));
            }

            if let Some((closing, _)) = branch.closure() {
                closures.push((closing.world, closing.sign, closing.formula.clone()));
                continue;
            }

            nodes += 1;

            match self.expand_once(&mut branch, &mut worlds_created) {
                Expansion::Extended => open_branches.push(branch),
                Expansion::Split(other) => {
                    open_branches.push(branch);
                    open_branches.push(other);
                }
                Expansion::Saturated => {
                    // Open fully-expanded branch: countermodel
                    let mut proof =
                        ProofObject::new(goal.clone(), self.name(), Outcome::Disproved);
                    proof.diagnostics = branch.describe_model();
                    proof.stats.worlds_created = worlds_created;
                    return Ok(proof.with_elapsed(meter.elapsed()));
                }
            }
        }

        // Every branch closed; record each complementary pair so the
        // closure step points at the literal it clashed with
        let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Proved);
        proof.push_step(goal.clone(), Justification::NegatedGoal);
        for (world, sign, formula) in closures {
            let (literal, complement) = if sign {
                (formula.clone(), formula.negate())
            } else {
                (formula.clone().negate(), formula)
            };
            let literal_step = proof.push_step(literal, Justification::TableauLiteral { world });
            proof.push_step(
                complement,
                Justification::TableauClosure {
                    world,
                    complement_of: literal_step,
                },
            );
        }
        proof.stats.worlds_created = worlds_created;
        Ok(proof.with_elapsed(meter.elapsed()))
    }
}

enum Expansion {
    Extended,
    Split(Branch),
    Saturated,
}

impl ModalTableauProver {
    /// Apply one rule to the branch; non-branching rules are preferred
    fn expand_once(&self, branch: &mut Branch, worlds_created: &mut usize) -> Expansion {
        let system = self.config.system;

        // Alpha, single and pi rules first
        for i in 0..branch.formulas.len() {
            let sf = branch.formulas[i].clone();
            if sf.is_literal() || branch.expanded.contains(&sf.key()) {
                continue;
            }
            match classify(&sf) {
                Rule::Single(component) => {
                    branch.expanded.insert(sf.key());
                    branch.add(component);
                    return Expansion::Extended;
                }
                Rule::Alpha(left, right) => {
                    branch.expanded.insert(sf.key());
                    branch.add(left);
                    branch.add(right);
                    return Expansion::Extended;
                }
                Rule::Pi(sign, body) => {
                    branch.expanded.insert(sf.key());
                    let new_world = branch.num_worlds;
                    branch.num_worlds += 1;
                    *worlds_created += 1;
                    branch.edges.push((sf.world, new_world));
                    branch.add(SignedFormula::new(sign, body, new_world));
                    return Expansion::Extended;
                }
                _ => {}
            }
        }

        // Nu rules: box/diamond formulas revisit every accessible world
        for i in 0..branch.formulas.len() {
            let sf = branch.formulas[i].clone();
            if let Rule::Nu(sign, body) = classify(&sf) {
                for target in branch.accessible(sf.world, system) {
                    let mark = (sf.key(), target);
                    if branch.nu_applied.contains(&mark) {
                        continue;
                    }
                    branch.nu_applied.insert(mark);
                    if branch.add(SignedFormula::new(sign, body.clone(), target)) {
                        return Expansion::Extended;
                    }
                }
            }
        }

        // Beta rules last
        for i in 0..branch.formulas.len() {
            let sf = branch.formulas[i].clone();
            if sf.is_literal() || branch.expanded.contains(&sf.key()) {
                continue;
            }
            if let Rule::Beta(left, right) = classify(&sf) {
                branch.expanded.insert(sf.key());
                let mut other = branch.clone();
                branch.add(left);
                other.add(right);
                return Expansion::Split(other);
            }
        }

        Expansion::Saturated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prover::Budget;
    use crate::term::parse_term;

    fn prove_in(system: ModalSystem, premises: &str, goal: &str) -> Outcome {
        let ctx = Context::parse(premises).unwrap();
        let goal = parse_term(goal).unwrap();
        let prover = ModalTableauProver::new(system);
        prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap()
            .outcome
    }

    #[test]
    fn test_propositional_tautology() {
        assert_eq!(prove_in(ModalSystem::K, "", "p | ~p"), Outcome::Proved);
    }

    #[test]
    fn test_propositional_non_tautology_gives_countermodel() {
        let ctx = Context::new();
        let goal = parse_term("p & q").unwrap();
        let prover = ModalTableauProver::new(ModalSystem::K);
        let proof = prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap();
        assert_eq!(proof.outcome, Outcome::Disproved);
        assert!(!proof.diagnostics.is_empty());
    }

    #[test]
    fn test_modus_ponens_from_context() {
        assert_eq!(
            prove_in(ModalSystem::K, "p\np -> q\n", "q"),
            Outcome::Proved
        );
    }

    #[test]
    fn test_axiom_k_distribution() {
        // K: [](p->q) -> ([]p -> []q)
        assert_eq!(
            prove_in(ModalSystem::K, "", "[](p -> q) -> ([]p -> []q)"),
            Outcome::Proved
        );
    }

    #[test]
    fn test_axiom_t_needs_reflexivity() {
        // []p -> p holds in T but not in K
        assert_eq!(prove_in(ModalSystem::T, "", "[]p -> p"), Outcome::Proved);
        assert_eq!(prove_in(ModalSystem::K, "", "[]p -> p"), Outcome::Disproved);
    }

    #[test]
    fn test_axiom_four_needs_transitivity() {
        // []p -> [][]p holds in S4 but not in T
        assert_eq!(
            prove_in(ModalSystem::S4, "", "[]p -> [][]p"),
            Outcome::Proved
        );
        assert_eq!(
            prove_in(ModalSystem::T, "", "[]p -> [][]p"),
            Outcome::Disproved
        );
    }

    #[test]
    fn test_axiom_five_in_s5() {
        // <>p -> []<>p holds in S5 but not in S4
        assert_eq!(
            prove_in(ModalSystem::S5, "", "<>p -> []<>p"),
            Outcome::Proved
        );
        assert_eq!(
            prove_in(ModalSystem::S4, "", "<>p -> []<>p"),
            Outcome::Disproved
        );
    }

    #[test]
    fn test_necessitation_of_premise_not_assumed() {
        // A premise holds in world 0 only, so []p does not follow from p in K
        assert_eq!(prove_in(ModalSystem::K, "p\n", "[]p"), Outcome::Disproved);
    }

    #[test]
    fn test_closure_steps_name_their_complement() {
        let ctx = Context::parse("p\np -> q\n").unwrap();
        let goal = parse_term("q").unwrap();
        let prover = ModalTableauProver::new(ModalSystem::K);
        let proof = prover
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap();
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof.check().is_ok());

        let mut saw_closure = false;
        for step in &proof.steps {
            if let Justification::TableauClosure { complement_of, .. } = step.justification {
                saw_closure = true;
                let source = &proof.steps[complement_of];
                assert!(matches!(
                    source.justification,
                    Justification::TableauLiteral { .. }
                ));
                // The referenced step holds the literal this one clashed with
                assert!(
                    source.conclusion == step.conclusion.clone().negate()
                        || step.conclusion == source.conclusion.clone().negate()
                );
            }
        }
        assert!(saw_closure);
    }

    #[test]
    fn test_node_budget_exhaustion() {
        let ctx = Context::new();
        let goal = parse_term("[](p -> <>p) -> (p -> q)").unwrap();
        let prover = ModalTableauProver::new(ModalSystem::S4);
        let meter = BudgetMeter::new(Budget {
            max_nodes: 3,
            deadline_ms: 0,
            ..Budget::default()
        });
        let proof = prover.attempt(&goal, &ctx, &meter).unwrap();
        assert!(matches!(proof.outcome, Outcome::ResourceExhausted(_)));
    }

    #[test]
    fn test_quantifier_reports_unknown() {
        assert!(matches!(
            prove_in(ModalSystem::K, "", "forall X. P(X)"),
            Outcome::Unknown { .. }
        ));
    }

    // Cross-check the propositional fragment against truth tables
    fn atoms_of(term: &Term, acc: &mut Vec<String>) {
        match term {
            Term::Application(s, _) | Term::Constant(s) if term.is_atom() => {
                if !acc.contains(&s.name) {
                    acc.push(s.name.clone());
                }
            }
            Term::Connective(_, args) => {
                for a in args {
                    atoms_of(a, acc);
                }
            }
            _ => {}
        }
    }

    fn eval(term: &Term, assignment: &std::collections::HashMap<String, bool>) -> bool {
        match term {
            Term::Application(s, _) | Term::Constant(s) => assignment[&s.name],
            Term::Connective(kind, args) => match kind {
                ConnectiveKind::Not => !eval(&args[0], assignment),
                ConnectiveKind::And => eval(&args[0], assignment) && eval(&args[1], assignment),
                ConnectiveKind::Or => eval(&args[0], assignment) || eval(&args[1], assignment),
                ConnectiveKind::Implies => {
                    !eval(&args[0], assignment) || eval(&args[1], assignment)
                }
                ConnectiveKind::Iff => eval(&args[0], assignment) == eval(&args[1], assignment),
                _ => panic!("modal operator in propositional cross-check"),
            },
            _ => panic!("non-propositional term"),
        }
    }

    fn is_tautology(term: &Term) -> bool {
        let mut atoms = Vec::new();
        atoms_of(term, &mut atoms);
        assert!(atoms.len() <= 6);
        for bits in 0..(1u32 << atoms.len()) {
            let assignment: std::collections::HashMap<String, bool> = atoms
                .iter()
                .enumerate()
                .map(|(i, a)| (a.clone(), bits & (1 << i) != 0))
                .collect();
            if !eval(term, &assignment) {
                return false;
            }
        }
        true
    }

    #[test]
    fn test_truth_table_cross_check() {
        let formulas = [
            "p | ~p",
            "(p -> q) -> ((q -> r) -> (p -> r))",
            "(p & q) -> p",
            "p -> (q -> p)",
            "((p -> q) -> p) -> p",
            "p -> q",
            "(p | q) & ~p & ~q",
            "(p <-> q) | (q <-> r) | (p <-> r)",
        ];
        for input in formulas {
            let term = parse_term(input).unwrap();
            let expected = is_tautology(&term);
            let got = prove_in(ModalSystem::K, "", input) == Outcome::Proved;
            assert_eq!(got, expected, "mismatch on {}", input);
        }
    }
}

//! SMT delegation
//!
//! Goals whose atoms all fall inside linear integer arithmetic can be
//! handed to an [`SmtBackend`] instead of the saturation or CLP search.
//! Translation is strict: any atom outside the supported theory aborts
//! with [`TranslateError::UnsupportedTheory`], which the strategy reports
//! as [`Outcome::Unknown`] so the coordinator can fall back to another
//! strategy. An unsupported theory is never conflated with `Unsat`.
//!
//! The built-in [`BoundPropagationBackend`] refines integer intervals to
//! fixpoint and answers `Sat` only when a concrete model checks out. It is
//! deliberately incomplete and says `Unknown` otherwise.

use std::collections::HashMap;
use std::fmt;

use crate::context::Context;
use crate::error::Result;
use crate::proof::{Justification, Outcome, ProofObject};
use crate::term::{ConnectiveKind, Term, TypeTag};

use super::{is_constraint_atom, BudgetMeter, GoalProfile, Strategy, StrategyKind};

/// Comparison operators of the supported theory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparator::Eq => "=",
            Comparator::Ne => "!=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// Linear integer expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtExpr {
    Int(i64),
    Var(String),
    Add(Box<SmtExpr>, Box<SmtExpr>),
}

impl fmt::Display for SmtExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtExpr::Int(n) => write!(f, "{}", n),
            SmtExpr::Var(v) => write!(f, "{}", v),
            SmtExpr::Add(a, b) => write!(f, "(+ {} {})", a, b),
        }
    }
}

/// One assertion in the supported theory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtFormula {
    Compare {
        op: Comparator,
        left: SmtExpr,
        right: SmtExpr,
    },
    /// Pairwise disequality
    Distinct(Vec<SmtExpr>),
}

impl fmt::Display for SmtFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtFormula::Compare { op, left, right } => write!(f, "({} {} {})", op, left, right),
            SmtFormula::Distinct(es) => {
                write!(f, "(distinct")?;
                for e in es {
                    write!(f, " {}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Backend verdict on a conjunction of assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtOutcome {
    /// Satisfiable, with a witnessing assignment
    Sat(Vec<(String, i64)>),
    Unsat,
    /// The backend could not decide; not a refutation
    Unknown,
}

/// A decision procedure for [`SmtFormula`] conjunctions
pub trait SmtBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, formulas: &[SmtFormula]) -> SmtOutcome;
}

/// Why a term could not be translated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    UnsupportedTheory(String),
}

impl fmt::Display for TranslateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslateError::UnsupportedTheory(what) => {
                write!(f, "unsupported theory: {}", what)
            }
        }
    }
}

/// Translate a goal conjunction into theory assertions
///
/// Only recognized constraint atoms translate. Anything else fails with
/// `UnsupportedTheory` naming the offending subterm.
pub fn translate(term: &Term) -> std::result::Result<Vec<SmtFormula>, TranslateError> {
    match term {
        Term::Connective(ConnectiveKind::And, args) => {
            let mut out = translate(&args[0])?;
            out.extend(translate(&args[1])?);
            Ok(out)
        }
        _ if is_constraint_atom(term) => translate_atom(term),
        _ => Err(TranslateError::UnsupportedTheory(format!("{}", term))),
    }
}

fn translate_expr(arg: &Term) -> std::result::Result<SmtExpr, TranslateError> {
    match arg {
        Term::Constant(sym) if sym.ty == TypeTag::Int => sym
            .name
            .parse::<i64>()
            .map(SmtExpr::Int)
            .map_err(|_| TranslateError::UnsupportedTheory(sym.name.clone())),
        // Free variables join by display name, so the same name in the goal
        // and a premise denotes one SMT symbol; quantified formulas never
        // reach translation
        Term::Variable(v) => Ok(SmtExpr::Var(v.name.clone())),
        other => Err(TranslateError::UnsupportedTheory(format!("{}", other))),
    }
}

fn translate_atom(atom: &Term) -> std::result::Result<Vec<SmtFormula>, TranslateError> {
    let (name, args) = match atom {
        Term::Application(s, args) => (s.name.as_str(), args),
        other => return Err(TranslateError::UnsupportedTheory(format!("{}", other))),
    };

    let cmp = |op: Comparator,
               args: &[Term]|
     -> std::result::Result<Vec<SmtFormula>, TranslateError> {
        Ok(vec![SmtFormula::Compare {
            op,
            left: translate_expr(&args[0])?,
            right: translate_expr(&args[1])?,
        }])
    };

    match name {
        "lt" if args.len() == 2 => cmp(Comparator::Lt, args),
        "le" if args.len() == 2 => cmp(Comparator::Le, args),
        "gt" if args.len() == 2 => cmp(Comparator::Gt, args),
        "ge" if args.len() == 2 => cmp(Comparator::Ge, args),
        "eq" if args.len() == 2 => cmp(Comparator::Eq, args),
        "neq" if args.len() == 2 => cmp(Comparator::Ne, args),
        "in_range" if args.len() == 3 => {
            let v = translate_expr(&args[0])?;
            Ok(vec![
                SmtFormula::Compare {
                    op: Comparator::Ge,
                    left: v.clone(),
                    right: translate_expr(&args[1])?,
                },
                SmtFormula::Compare {
                    op: Comparator::Le,
                    left: v,
                    right: translate_expr(&args[2])?,
                },
            ])
        }
        "all_different" => {
            let es = args
                .iter()
                .map(translate_expr)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(vec![SmtFormula::Distinct(es)])
        }
        "sum" if args.len() == 3 => Ok(vec![SmtFormula::Compare {
            op: Comparator::Eq,
            left: SmtExpr::Add(
                Box::new(translate_expr(&args[0])?),
                Box::new(translate_expr(&args[1])?),
            ),
            right: translate_expr(&args[2])?,
        }]),
        other => Err(TranslateError::UnsupportedTheory(other.to_string())),
    }
}

// ============================================================================
// Built-in backend
// ============================================================================

const BOUND_LIMIT: i64 = 1 << 30;
const MAX_ROUNDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Interval {
    lo: i64,
    hi: i64,
}

impl Interval {
    fn full() -> Self {
        Interval {
            lo: -BOUND_LIMIT,
            hi: BOUND_LIMIT,
        }
    }

    fn is_empty(&self) -> bool {
        self.lo > self.hi
    }

    fn is_point(&self) -> bool {
        self.lo == self.hi
    }
}

/// Interval refinement backend
///
/// Sound on `Unsat`, model-checked on `Sat`, `Unknown` everywhere else.
#[derive(Debug, Default)]
pub struct BoundPropagationBackend;

impl BoundPropagationBackend {
    pub fn new() -> Self {
        BoundPropagationBackend
    }

    fn expr_bounds(expr: &SmtExpr, bounds: &HashMap<String, Interval>) -> Interval {
        match expr {
            SmtExpr::Int(n) => Interval { lo: *n, hi: *n },
            SmtExpr::Var(v) => bounds.get(v).copied().unwrap_or_else(Interval::full),
            SmtExpr::Add(a, b) => {
                let ia = Self::expr_bounds(a, bounds);
                let ib = Self::expr_bounds(b, bounds);
                Interval {
                    lo: ia.lo.saturating_add(ib.lo),
                    hi: ia.hi.saturating_add(ib.hi),
                }
            }
        }
    }

    /// Tighten a variable's interval; true when it changed
    fn tighten(
        bounds: &mut HashMap<String, Interval>,
        var: &str,
        lo: Option<i64>,
        hi: Option<i64>,
    ) -> bool {
        let entry = bounds
            .entry(var.to_string())
            .or_insert_with(Interval::full);
        let before = *entry;
        if let Some(lo) = lo {
            entry.lo = entry.lo.max(lo);
        }
        if let Some(hi) = hi {
            entry.hi = entry.hi.min(hi);
        }
        *entry != before
    }

    fn refine(formula: &SmtFormula, bounds: &mut HashMap<String, Interval>) -> bool {
        match formula {
            SmtFormula::Compare { op, left, right } => {
                let rb = Self::expr_bounds(right, bounds);
                let lb = Self::expr_bounds(left, bounds);
                let mut changed = false;

                // Only direct variables tighten; compound sides contribute
                // their interval to the other side
                if let SmtExpr::Var(v) = left {
                    changed |= match op {
                        Comparator::Lt => Self::tighten(bounds, v, None, Some(rb.hi - 1)),
                        Comparator::Le => Self::tighten(bounds, v, None, Some(rb.hi)),
                        Comparator::Gt => Self::tighten(bounds, v, Some(rb.lo + 1), None),
                        Comparator::Ge => Self::tighten(bounds, v, Some(rb.lo), None),
                        Comparator::Eq => Self::tighten(bounds, v, Some(rb.lo), Some(rb.hi)),
                        Comparator::Ne => false,
                    };
                }
                if let SmtExpr::Var(v) = right {
                    changed |= match op {
                        Comparator::Lt => Self::tighten(bounds, v, Some(lb.lo + 1), None),
                        Comparator::Le => Self::tighten(bounds, v, Some(lb.lo), None),
                        Comparator::Gt => Self::tighten(bounds, v, None, Some(lb.hi - 1)),
                        Comparator::Ge => Self::tighten(bounds, v, None, Some(lb.hi)),
                        Comparator::Eq => Self::tighten(bounds, v, Some(lb.lo), Some(lb.hi)),
                        Comparator::Ne => false,
                    };
                }
                // sum: a + b = c also narrows the addends
                if let (SmtExpr::Add(a, b), Comparator::Eq) = (left, op) {
                    let ia = Self::expr_bounds(a, bounds);
                    let ib = Self::expr_bounds(b, bounds);
                    if let SmtExpr::Var(v) = a.as_ref() {
                        changed |= Self::tighten(
                            bounds,
                            v,
                            Some(rb.lo.saturating_sub(ib.hi)),
                            Some(rb.hi.saturating_sub(ib.lo)),
                        );
                    }
                    if let SmtExpr::Var(v) = b.as_ref() {
                        changed |= Self::tighten(
                            bounds,
                            v,
                            Some(rb.lo.saturating_sub(ia.hi)),
                            Some(rb.hi.saturating_sub(ia.lo)),
                        );
                    }
                }
                changed
            }
            SmtFormula::Distinct(es) => {
                // Point intervals knock their value off other members
                let mut changed = false;
                let points: Vec<(usize, i64)> = es
                    .iter()
                    .enumerate()
                    .filter_map(|(i, e)| match Self::expr_bounds(e, bounds) {
                        iv if iv.is_point() => Some((i, iv.lo)),
                        _ => None,
                    })
                    .collect();
                for (i, e) in es.iter().enumerate() {
                    if let SmtExpr::Var(v) = e {
                        for &(j, value) in &points {
                            if i == j {
                                continue;
                            }
                            let iv = Self::expr_bounds(e, bounds);
                            if iv.lo == value {
                                changed |= Self::tighten(bounds, v, Some(value + 1), None);
                            } else if iv.hi == value {
                                changed |= Self::tighten(bounds, v, None, Some(value - 1));
                            }
                        }
                    }
                }
                changed
            }
        }
    }

    fn holds(formula: &SmtFormula, model: &HashMap<String, i64>) -> bool {
        fn eval(expr: &SmtExpr, model: &HashMap<String, i64>) -> Option<i64> {
            match expr {
                SmtExpr::Int(n) => Some(*n),
                SmtExpr::Var(v) => model.get(v).copied(),
                SmtExpr::Add(a, b) => Some(eval(a, model)?.saturating_add(eval(b, model)?)),
            }
        }
        match formula {
            SmtFormula::Compare { op, left, right } => {
                let (l, r) = match (eval(left, model), eval(right, model)) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return false,
                };
                match op {
                    Comparator::Eq => l == r,
                    Comparator::Ne => l != r,
                    Comparator::Lt => l < r,
                    Comparator::Le => l <= r,
                    Comparator::Gt => l > r,
                    Comparator::Ge => l >= r,
                }
            }
            SmtFormula::Distinct(es) => {
                let vals: Vec<Option<i64>> = es.iter().map(|e| eval(e, model)).collect();
                for i in 0..vals.len() {
                    for j in (i + 1)..vals.len() {
                        match (vals[i], vals[j]) {
                            (Some(a), Some(b)) if a != b => {}
                            _ => return false,
                        }
                    }
                }
                true
            }
        }
    }

    fn collect_vars(formulas: &[SmtFormula]) -> Vec<String> {
        fn walk(expr: &SmtExpr, out: &mut Vec<String>) {
            match expr {
                SmtExpr::Int(_) => {}
                SmtExpr::Var(v) => {
                    if !out.contains(v) {
                        out.push(v.clone());
                    }
                }
                SmtExpr::Add(a, b) => {
                    walk(a, out);
                    walk(b, out);
                }
            }
        }
        let mut out = Vec::new();
        for f in formulas {
            match f {
                SmtFormula::Compare { left, right, .. } => {
                    walk(left, &mut out);
                    walk(right, &mut out);
                }
                SmtFormula::Distinct(es) => {
                    for e in es {
                        walk(e, &mut out);
                    }
                }
            }
        }
        out
    }
}

impl SmtBackend for BoundPropagationBackend {
    fn name(&self) -> &'static str {
        "bound-propagation"
    }

    fn solve(&self, formulas: &[SmtFormula]) -> SmtOutcome {
        let mut bounds: HashMap<String, Interval> = HashMap::new();
        for var in Self::collect_vars(formulas) {
            bounds.insert(var, Interval::full());
        }

        for _ in 0..MAX_ROUNDS {
            let mut changed = false;
            for formula in formulas {
                changed |= Self::refine(formula, &mut bounds);
            }
            if bounds.values().any(|iv| iv.is_empty()) {
                return SmtOutcome::Unsat;
            }
            if !changed {
                break;
            }
        }

        // Candidate model: every variable at its lower bound
        let model: HashMap<String, i64> = bounds.iter().map(|(v, iv)| (v.clone(), iv.lo)).collect();
        if formulas.iter().all(|f| Self::holds(f, &model)) {
            let mut assignment: Vec<(String, i64)> = model.into_iter().collect();
            assignment.sort();
            return SmtOutcome::Sat(assignment);
        }

        SmtOutcome::Unknown
    }
}

// ============================================================================
// Strategy wrapper
// ============================================================================

/// Delegates arithmetic goals to an [`SmtBackend`]
pub struct SmtStrategy {
    backend: Box<dyn SmtBackend>,
}

impl SmtStrategy {
    pub fn new() -> Self {
        SmtStrategy {
            backend: Box::new(BoundPropagationBackend::new()),
        }
    }

    pub fn with_backend(backend: Box<dyn SmtBackend>) -> Self {
        SmtStrategy { backend }
    }
}

impl Default for SmtStrategy {
    fn default() -> Self {
        SmtStrategy::new()
    }
}

impl Strategy for SmtStrategy {
    fn name(&self) -> &'static str {
        "smt"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Smt
    }

    fn supports(&self, profile: &GoalProfile) -> bool {
        profile.constrained && !profile.modal
    }

    fn attempt(&self, goal: &Term, context: &Context, meter: &BudgetMeter) -> Result<ProofObject> {
        let mut formulas = match translate(goal) {
            Ok(fs) => fs,
            Err(err) => {
                let proof = ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::Unknown {
                        reason: err.to_string(),
                    },
                );
                return Ok(proof.with_elapsed(meter.elapsed()));
            }
        };

        // Ground constraint premises join the assertion set; any other
        // premise puts the problem outside the theory
        for premise in context.premises() {
            match translate(premise) {
                Ok(fs) => formulas.extend(fs),
                Err(err) => {
                    let proof = ProofObject::new(
                        goal.clone(),
                        self.name(),
                        Outcome::Unknown {
                            reason: err.to_string(),
                        },
                    );
                    return Ok(proof.with_elapsed(meter.elapsed()));
                }
            }
        }

        if let Some(resource) = meter.check_propagations(0) {
            return Ok(ProofObject::new(
                goal.clone(),
                self.name(),
                Outcome::ResourceExhausted(resource),
            )
            .with_elapsed(meter.elapsed()));
        }

        let outcome = self.backend.solve(&formulas);

        let mut proof = match outcome {
            SmtOutcome::Sat(model) => {
                let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Proved);
                for (name, value) in model {
                    proof.answers.push((name, Term::int(value)));
                }
                proof
            }
            SmtOutcome::Unsat => {
                let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Disproved);
                proof
                    .diagnostics
                    .push("assertions are unsatisfiable".to_string());
                proof
            }
            SmtOutcome::Unknown => ProofObject::new(
                goal.clone(),
                self.name(),
                Outcome::Unknown {
                    reason: format!("backend {} could not decide", self.backend.name()),
                },
            ),
        };

        proof.push_step(
            goal.clone(),
            Justification::SmtVerdict {
                backend: self.backend.name().to_string(),
            },
        );
        Ok(proof.with_elapsed(meter.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_term;

    fn attempt(premises: &str, goal: &str) -> ProofObject {
        let ctx = Context::parse(premises).unwrap();
        let goal = parse_term(goal).unwrap();
        SmtStrategy::new()
            .attempt(&goal, &ctx, &BudgetMeter::default())
            .unwrap()
    }

    #[test]
    fn test_translate_comparison() {
        let t = parse_term("lt(X,5)").unwrap();
        let fs = translate(&t).unwrap();
        assert_eq!(fs.len(), 1);
        assert_eq!(format!("{}", fs[0]), "(< X 5)");
    }

    #[test]
    fn test_translate_rejects_logic_atom() {
        let t = parse_term("At(john,home)").unwrap();
        assert!(matches!(
            translate(&t),
            Err(TranslateError::UnsupportedTheory(_))
        ));
    }

    #[test]
    fn test_satisfiable_bounds() {
        let proof = attempt("", "in_range(X,1,10) & gt(X,8)");
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof
            .answers
            .contains(&("X".to_string(), Term::int(9))));
    }

    #[test]
    fn test_unsatisfiable_bounds() {
        let proof = attempt("", "in_range(X,1,10) & gt(X,10)");
        assert_eq!(proof.outcome, Outcome::Disproved);
    }

    #[test]
    fn test_sum_narrows_addends() {
        let proof = attempt("", "in_range(X,0,5) & in_range(Y,0,5) & sum(X,Y,10)");
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof.answers.contains(&("X".to_string(), Term::int(5))));
        assert!(proof.answers.contains(&("Y".to_string(), Term::int(5))));
    }

    #[test]
    fn test_unsupported_theory_reports_unknown() {
        // Non-arithmetic atom in the goal: strategy must not claim Unsat
        let proof = attempt("", "Reachable(a,b) & lt(X,5)");
        assert!(matches!(proof.outcome, Outcome::Unknown { .. }));
    }

    #[test]
    fn test_unsupported_premise_reports_unknown() {
        let proof = attempt("At(john,home)\n", "lt(X,5)");
        assert!(matches!(proof.outcome, Outcome::Unknown { .. }));
    }

    #[test]
    fn test_verdict_step_names_backend() {
        let proof = attempt("", "eq(X,3)");
        assert!(proof.steps.iter().any(|s| matches!(
            &s.justification,
            Justification::SmtVerdict { backend } if backend == "bound-propagation"
        )));
    }

    #[test]
    fn test_constraint_premises_join_assertions() {
        let proof = attempt("lt(X,3)\n", "in_range(X,1,10) & gt(X,1)");
        assert_eq!(proof.outcome, Outcome::Proved);
        assert!(proof.answers.contains(&("X".to_string(), Term::int(2))));
    }
}

//! Constraint logic programming strategy
//!
//! Processes a goal conjunction left to right. Recognized constraint atoms
//! (`lt`, `le`, `gt`, `ge`, `eq`, `neq`, `in_range`, `all_different`, `sum`)
//! are posted to a finite-domain constraint store and propagated to
//! fixpoint; every other atom is resolved against the context's facts and
//! Horn rules by SLD resolution. An emptied domain or an unmatchable
//! subgoal triggers chronological backtracking to the last choice point.
//! Success is a full assignment: SLD bindings plus labeled domain values.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::context::Context;
use crate::error::Result;
use crate::proof::{ExhaustedResource, Justification, Outcome, ProofObject};
use crate::term::{ConnectiveKind, SimpleTypeSystem, Term, TypeTag};
use crate::unify::{unify_into, Substitution};

use super::{is_constraint_atom, BudgetMeter, GoalProfile, Strategy, StrategyKind};

/// Default domain given to constraint variables that carry no `in_range`
const DEFAULT_DOMAIN: std::ops::RangeInclusive<i64> = 0..=100;

const MAX_SLD_DEPTH: usize = 64;

/// A finite set of candidate values; only ever shrinks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    values: BTreeSet<i64>,
}

impl Domain {
    pub fn from_range(range: std::ops::RangeInclusive<i64>) -> Self {
        Domain {
            values: range.collect(),
        }
    }

    pub fn singleton(value: i64) -> Self {
        Domain {
            values: BTreeSet::from([value]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_singleton(&self) -> bool {
        self.values.len() == 1
    }

    pub fn value(&self) -> Option<i64> {
        if self.is_singleton() {
            self.values.iter().next().copied()
        } else {
            None
        }
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn min(&self) -> Option<i64> {
        self.values.iter().next().copied()
    }

    pub fn max(&self) -> Option<i64> {
        self.values.iter().next_back().copied()
    }

    pub fn remove(&mut self, value: i64) -> bool {
        self.values.remove(&value)
    }

    pub fn restrict_lt(&mut self, n: i64) {
        self.values.retain(|&v| v < n);
    }

    pub fn restrict_le(&mut self, n: i64) {
        self.values.retain(|&v| v <= n);
    }

    pub fn restrict_gt(&mut self, n: i64) {
        self.values.retain(|&v| v > n);
    }

    pub fn restrict_ge(&mut self, n: i64) {
        self.values.retain(|&v| v >= n);
    }

    pub fn intersect(&mut self, other: &Domain) {
        self.values.retain(|v| other.values.contains(v));
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.iter().copied()
    }
}

/// Comparison operators shared by var-var and var-const constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A constraint operand: store variable or integer literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Var(usize),
    Const(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Constraint {
    Cmp(CmpOp, Operand, Operand),
    AllDifferent(Vec<usize>),
    /// a + b = c
    Sum(Operand, Operand, Operand),
}

impl Constraint {
    fn store_vars(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut push = |op: &Operand| {
            if let Operand::Var(v) = op {
                out.push(*v);
            }
        };
        match self {
            Constraint::Cmp(_, a, b) => {
                push(a);
                push(b);
            }
            Constraint::AllDifferent(vars) => out.extend(vars.iter().copied()),
            Constraint::Sum(a, b, c) => {
                push(a);
                push(b);
                push(c);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PropagationResult {
    NoChange,
    Reduced,
    Failed,
}

/// Finite-domain store with worklist propagation
#[derive(Debug, Clone, Default)]
struct ConstraintStore {
    domains: Vec<Domain>,
    constraints: Vec<Constraint>,
    /// Term variable id -> store variable index
    var_index: HashMap<u64, usize>,
    /// Store variable index -> display name
    names: Vec<String>,
}

impl ConstraintStore {
    fn var_for(&mut self, term_var: u64, name: &str) -> usize {
        if let Some(&idx) = self.var_index.get(&term_var) {
            return idx;
        }
        let idx = self.domains.len();
        self.domains.push(Domain::from_range(DEFAULT_DOMAIN));
        self.names.push(name.to_string());
        self.var_index.insert(term_var, idx);
        idx
    }

    fn post(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Propagate all constraints to fixpoint
    ///
    /// Returns the number of propagation rounds, or `None` when a domain
    /// emptied.
    fn propagate(&mut self) -> Option<usize> {
        let mut queue: VecDeque<usize> = (0..self.constraints.len()).collect();
        let mut rounds = 0usize;

        while let Some(idx) = queue.pop_front() {
            rounds += 1;
            match self.propagate_one(idx) {
                PropagationResult::Failed => return None,
                PropagationResult::Reduced => {
                    // Requeue neighbours of the touched variables
                    let touched = self.constraints[idx].store_vars();
                    for (j, c) in self.constraints.iter().enumerate() {
                        if j != idx
                            && c.store_vars().iter().any(|v| touched.contains(v))
                            && !queue.contains(&j)
                        {
                            queue.push_back(j);
                        }
                    }
                }
                PropagationResult::NoChange => {}
            }
        }

        Some(rounds)
    }

    fn bounds(&self, op: Operand) -> Option<(i64, i64)> {
        match op {
            Operand::Const(c) => Some((c, c)),
            Operand::Var(v) => Some((self.domains[v].min()?, self.domains[v].max()?)),
        }
    }

    fn propagate_one(&mut self, idx: usize) -> PropagationResult {
        let constraint = self.constraints[idx].clone();
        match constraint {
            Constraint::Cmp(op, a, b) => self.propagate_cmp(op, a, b),
            Constraint::AllDifferent(vars) => self.propagate_all_different(&vars),
            Constraint::Sum(a, b, c) => self.propagate_sum(a, b, c),
        }
    }

    fn propagate_cmp(&mut self, op: CmpOp, a: Operand, b: Operand) -> PropagationResult {
        let (min_a, max_a) = match self.bounds(a) {
            Some(x) => x,
            None => return PropagationResult::Failed,
        };
        let (min_b, max_b) = match self.bounds(b) {
            Some(x) => x,
            None => return PropagationResult::Failed,
        };

        let mut changed = false;
        let mut shrink = |store: &mut Self, op: Operand, f: &dyn Fn(&mut Domain)| {
            if let Operand::Var(v) = op {
                let before = store.domains[v].size();
                f(&mut store.domains[v]);
                if store.domains[v].size() != before {
                    changed = true;
                }
            }
        };

        match op {
            CmpOp::Lt => {
                shrink(self, a, &|d| d.restrict_lt(max_b));
                shrink(self, b, &|d| d.restrict_gt(min_a));
            }
            CmpOp::Le => {
                shrink(self, a, &|d| d.restrict_le(max_b));
                shrink(self, b, &|d| d.restrict_ge(min_a));
            }
            CmpOp::Gt => {
                shrink(self, a, &|d| d.restrict_gt(min_b));
                shrink(self, b, &|d| d.restrict_lt(max_a));
            }
            CmpOp::Ge => {
                shrink(self, a, &|d| d.restrict_ge(min_b));
                shrink(self, b, &|d| d.restrict_le(max_a));
            }
            CmpOp::Eq => match (a, b) {
                (Operand::Var(x), Operand::Var(y)) => {
                    let dy = self.domains[y].clone();
                    let before_x = self.domains[x].size();
                    self.domains[x].intersect(&dy);
                    let dx = self.domains[x].clone();
                    let before_y = self.domains[y].size();
                    self.domains[y].intersect(&dx);
                    changed = self.domains[x].size() != before_x
                        || self.domains[y].size() != before_y;
                }
                (Operand::Var(x), Operand::Const(c)) | (Operand::Const(c), Operand::Var(x)) => {
                    let before = self.domains[x].size();
                    self.domains[x].intersect(&Domain::singleton(c));
                    changed = self.domains[x].size() != before;
                }
                (Operand::Const(c1), Operand::Const(c2)) => {
                    if c1 != c2 {
                        return PropagationResult::Failed;
                    }
                }
            },
            CmpOp::Neq => match (a, b) {
                (Operand::Var(x), Operand::Var(y)) => {
                    if let Some(vx) = self.domains[x].value() {
                        changed |= self.domains[y].remove(vx);
                    }
                    if let Some(vy) = self.domains[y].value() {
                        changed |= self.domains[x].remove(vy);
                    }
                }
                (Operand::Var(x), Operand::Const(c)) | (Operand::Const(c), Operand::Var(x)) => {
                    changed = self.domains[x].remove(c);
                }
                (Operand::Const(c1), Operand::Const(c2)) => {
                    if c1 == c2 {
                        return PropagationResult::Failed;
                    }
                }
            },
        }

        let empty = [a, b].iter().any(|op| match op {
            Operand::Var(v) => self.domains[*v].is_empty(),
            Operand::Const(_) => false,
        });
        if empty {
            PropagationResult::Failed
        } else if changed {
            PropagationResult::Reduced
        } else {
            PropagationResult::NoChange
        }
    }

    fn propagate_all_different(&mut self, vars: &[usize]) -> PropagationResult {
        let mut changed = false;
        for (i, &x) in vars.iter().enumerate() {
            if let Some(vx) = self.domains[x].value() {
                for (j, &y) in vars.iter().enumerate() {
                    if i != j {
                        changed |= self.domains[y].remove(vx);
                        if self.domains[y].is_empty() {
                            return PropagationResult::Failed;
                        }
                    }
                }
            }
        }
        if changed {
            PropagationResult::Reduced
        } else {
            PropagationResult::NoChange
        }
    }

    /// Bounds propagation for a + b = c
    fn propagate_sum(&mut self, a: Operand, b: Operand, c: Operand) -> PropagationResult {
        let (min_a, max_a) = match self.bounds(a) {
            Some(x) => x,
            None => return PropagationResult::Failed,
        };
        let (min_b, max_b) = match self.bounds(b) {
            Some(x) => x,
            None => return PropagationResult::Failed,
        };
        let (min_c, max_c) = match self.bounds(c) {
            Some(x) => x,
            None => return PropagationResult::Failed,
        };

        let mut changed = false;
        let mut clamp = |store: &mut Self, op: Operand, lo: i64, hi: i64| {
            if let Operand::Var(v) = op {
                let before = store.domains[v].size();
                store.domains[v].restrict_ge(lo);
                store.domains[v].restrict_le(hi);
                if store.domains[v].size() != before {
                    changed = true;
                }
            }
        };

        clamp(self, c, min_a + min_b, max_a + max_b);
        clamp(self, a, min_c - max_b, max_c - min_b);
        clamp(self, b, min_c - max_a, max_c - min_a);

        let empty = [a, b, c].iter().any(|op| match op {
            Operand::Var(v) => self.domains[*v].is_empty(),
            Operand::Const(_) => false,
        });
        if empty {
            PropagationResult::Failed
        } else if changed {
            PropagationResult::Reduced
        } else {
            PropagationResult::NoChange
        }
    }

    /// All variables bound to a single value
    fn fully_assigned(&self) -> bool {
        self.domains.iter().all(|d| d.is_singleton())
    }
}

/// Search state counters
#[derive(Debug, Default)]
struct ClpStats {
    propagations: usize,
    backtracks: usize,
    constraints_posted: Vec<String>,
    /// The depth cutoff fired somewhere in the search
    depth_limited: bool,
}

/// CLP strategy
#[derive(Debug, Default)]
pub struct ClpProver;

impl ClpProver {
    pub fn new() -> Self {
        ClpProver
    }
}

impl Strategy for ClpProver {
    fn name(&self) -> &'static str {
        "clp"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Clp
    }

    fn supports(&self, profile: &GoalProfile) -> bool {
        profile.constrained && !profile.modal
    }

    fn attempt(&self, goal: &Term, context: &Context, meter: &BudgetMeter) -> Result<ProofObject> {
        let subgoals = flatten_conjunction(goal);
        if subgoals
            .iter()
            .any(|sg| !matches!(sg, Term::Application(_, _)))
        {
            return Ok(ProofObject::new(
                goal.clone(),
                self.name(),
                Outcome::Unknown {
                    reason: "goal is not a conjunction of atoms".to_string(),
                },
            ));
        }

        let mut stats = ClpStats::default();
        let mut subst = Substitution::new();
        let store = ConstraintStore::default();

        let solved = match self.solve(
            &subgoals,
            context,
            store,
            &mut subst,
            0,
            meter,
            &mut stats,
        ) {
            Ok(result) => result,
            Err(resource) => {
                let mut proof = ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::ResourceExhausted(resource),
                );
                proof.stats.propagations = stats.propagations;
                proof.stats.backtracks = stats.backtracks;
                return Ok(proof.with_elapsed(meter.elapsed()));
            }
        };

        let mut proof = match solved {
            Some((final_subst, store)) => {
                let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Proved);
                for posted in &stats.constraints_posted {
                    proof.push_step(
                        goal.clone(),
                        Justification::ConstraintPropagation {
                            constraint: posted.clone(),
                        },
                    );
                }
                // Answers: labeled domain values first, then symbolic bindings
                for store_var in store.var_index.values() {
                    if let Some(v) = store.domains[*store_var].value() {
                        proof
                            .answers
                            .push((store.names[*store_var].clone(), Term::int(v)));
                    }
                }
                for v in goal.variables() {
                    if store.var_index.contains_key(&v.id) {
                        continue;
                    }
                    let bound = final_subst.apply(&Term::Variable(v.clone()));
                    if !bound.is_var() {
                        proof.answers.push((v.name.clone(), bound));
                    }
                }
                proof.answers.sort_by(|a, b| a.0.cmp(&b.0));
                proof
            }
            None if stats.depth_limited => {
                // A deeper derivation may still exist
                let mut proof = ProofObject::new(
                    goal.clone(),
                    self.name(),
                    Outcome::Unknown {
                        reason: "derivation depth limit reached".to_string(),
                    },
                );
                proof
                    .diagnostics
                    .push(format!("search cut off at depth {}", MAX_SLD_DEPTH));
                proof
            }
            None => {
                let mut proof = ProofObject::new(goal.clone(), self.name(), Outcome::Disproved);
                proof
                    .diagnostics
                    .push("search space exhausted without a satisfying assignment".to_string());
                proof
            }
        };

        proof.stats.propagations = stats.propagations;
        proof.stats.backtracks = stats.backtracks;
        Ok(proof.with_elapsed(meter.elapsed()))
    }
}

type Solved = Option<(Substitution, ConstraintStore)>;

impl ClpProver {
    /// Process subgoals left to right, backtracking chronologically
    #[allow(clippy::too_many_arguments)]
    fn solve(
        &self,
        subgoals: &[Term],
        context: &Context,
        mut store: ConstraintStore,
        subst: &mut Substitution,
        depth: usize,
        meter: &BudgetMeter,
        stats: &mut ClpStats,
    ) -> std::result::Result<Solved, ExhaustedResource> {
        if depth > MAX_SLD_DEPTH {
            stats.depth_limited = true;
            return Ok(None);
        }

        let (subgoal, rest) = match subgoals.split_first() {
            Some(split) => split,
            None => {
                // All subgoals consumed: label whatever is still unbound
                return self.label(store, subst, meter, stats);
            }
        };

        let subgoal = subst.apply(subgoal);

        if is_constraint_atom(&subgoal) {
            if !post_constraint(&subgoal, &mut store) {
                return Ok(None);
            }
            stats.constraints_posted.push(format!("{}", subgoal));
            match store.propagate() {
                Some(rounds) => {
                    stats.propagations += rounds;
                    if let Some(resource) = meter.check_propagations(stats.propagations) {
                        return Err(resource);
                    }
                }
                None => {
                    stats.backtracks += 1;
                    return Ok(None);
                }
            }
            return self.solve(rest, context, store, subst, depth, meter, stats);
        }

        let types = SimpleTypeSystem;

        // Facts
        for fact in context.facts() {
            let mut attempt = subst.clone();
            if unify_into(&subgoal, fact, &types, &mut attempt) {
                let mut branch_subst = attempt;
                match self.solve(
                    rest,
                    context,
                    store.clone(),
                    &mut branch_subst,
                    depth,
                    meter,
                    stats,
                )? {
                    Some(found) => return Ok(Some(found)),
                    None => stats.backtracks += 1,
                }
            }
        }

        // Horn rules: body -> head
        for rule in context.rules() {
            let fresh = {
                let mut mapping = fnv::FnvHashMap::default();
                rule.standardize_apart(&mut mapping)
            };
            let (body, head) = match split_rule(&fresh) {
                Some(parts) => parts,
                None => continue,
            };
            let mut attempt = subst.clone();
            if unify_into(&subgoal, &head, &types, &mut attempt) {
                let mut expanded: Vec<Term> = flatten_conjunction(&body);
                expanded.extend(rest.iter().cloned());
                let mut branch_subst = attempt;
                match self.solve(
                    &expanded,
                    context,
                    store.clone(),
                    &mut branch_subst,
                    depth + 1,
                    meter,
                    stats,
                )? {
                    Some(found) => return Ok(Some(found)),
                    None => stats.backtracks += 1,
                }
            }
        }

        Ok(None)
    }

    /// Bind every remaining multi-value domain by depth-first value choice
    fn label(
        &self,
        mut store: ConstraintStore,
        subst: &Substitution,
        meter: &BudgetMeter,
        stats: &mut ClpStats,
    ) -> std::result::Result<Solved, ExhaustedResource> {
        // Bindings made by SLD after a constraint was posted must reach the
        // store before labeling
        for (term_var, store_var) in store.var_index.clone() {
            let var_term = subst.get(term_var).cloned();
            if let Some(Term::Constant(sym)) = var_term {
                if sym.ty == TypeTag::Int {
                    if let Ok(v) = sym.name.parse::<i64>() {
                        store
                            .constraints
                            .push(Constraint::Cmp(CmpOp::Eq, Operand::Var(store_var), Operand::Const(v)));
                    }
                }
            }
        }

        match store.propagate() {
            Some(rounds) => {
                stats.propagations += rounds;
                if let Some(resource) = meter.check_propagations(stats.propagations) {
                    return Err(resource);
                }
            }
            None => {
                stats.backtracks += 1;
                return Ok(None);
            }
        }

        if store.fully_assigned() {
            return Ok(Some((subst.clone(), store)));
        }

        // Smallest domain first
        let pick = store
            .domains
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_singleton())
            .min_by_key(|(_, d)| d.size())
            .map(|(i, _)| i);

        let var = match pick {
            Some(v) => v,
            None => return Ok(Some((subst.clone(), store))),
        };

        let candidates: Vec<i64> = store.domains[var].iter().collect();
        for value in candidates {
            let mut trial = store.clone();
            trial.domains[var] = Domain::singleton(value);
            match self.label(trial, subst, meter, stats)? {
                Some(found) => return Ok(Some(found)),
                None => stats.backtracks += 1,
            }
        }

        Ok(None)
    }
}

/// Split `body -> head` after quantifier stripping
fn split_rule(rule: &Term) -> Option<(Term, Term)> {
    match rule {
        Term::Quantifier(_, _, body) => split_rule(body),
        Term::Connective(ConnectiveKind::Implies, args) => {
            Some((args[0].clone(), args[1].clone()))
        }
        _ => None,
    }
}

fn flatten_conjunction(term: &Term) -> Vec<Term> {
    match term {
        Term::Connective(ConnectiveKind::And, args) => {
            let mut out = flatten_conjunction(&args[0]);
            out.extend(flatten_conjunction(&args[1]));
            out
        }
        _ => vec![term.clone()],
    }
}

/// Translate a constraint atom into store constraints
///
/// Returns false when an argument is neither an integer nor a variable.
fn post_constraint(atom: &Term, store: &mut ConstraintStore) -> bool {
    let (name, args) = match atom {
        Term::Application(s, args) => (s.name.as_str(), args),
        _ => return false,
    };

    let operand = |arg: &Term, store: &mut ConstraintStore| -> Option<Operand> {
        match arg {
            Term::Constant(sym) if sym.ty == TypeTag::Int => {
                sym.name.parse::<i64>().ok().map(Operand::Const)
            }
            Term::Variable(v) => Some(Operand::Var(store.var_for(v.id, &v.name))),
            _ => None,
        }
    };

    match name {
        "lt" | "le" | "gt" | "ge" | "eq" | "neq" if args.len() == 2 => {
            let a = match operand(&args[0], store) {
                Some(op) => op,
                None => return false,
            };
            let b = match operand(&args[1], store) {
                Some(op) => op,
                None => return false,
            };
            let op = match name {
                "lt" => CmpOp::Lt,
                "le" => CmpOp::Le,
                "gt" => CmpOp::Gt,
                "ge" => CmpOp::Ge,
                "eq" => CmpOp::Eq,
                _ => CmpOp::Neq,
            };
            store.post(Constraint::Cmp(op, a, b));
            true
        }
        "in_range" if args.len() == 3 => {
            let v = match operand(&args[0], store) {
                Some(Operand::Var(v)) => v,
                _ => return false,
            };
            let (lo, hi) = match (operand(&args[1], store), operand(&args[2], store)) {
                (Some(Operand::Const(lo)), Some(Operand::Const(hi))) => (lo, hi),
                _ => return false,
            };
            store.domains[v] = Domain::from_range(lo..=hi);
            true
        }
        "all_different" => {
            let mut vars = Vec::new();
            for arg in args {
                match operand(arg, store) {
                    Some(Operand::Var(v)) => vars.push(v),
                    _ => return false,
                }
            }
            store.post(Constraint::AllDifferent(vars));
            true
        }
        "sum" if args.len() == 3 => {
            let ops: Vec<Operand> = match args
                .iter()
                .map(|a| operand(a, store))
                .collect::<Option<Vec<_>>>()
            {
                Some(ops) => ops,
                None => return false,
            };
            store.post(Constraint::Sum(ops[0], ops[1], ops[2]));
            true
        }
        _ => false,
    }
}

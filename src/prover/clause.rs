//! Clause representation and CNF conversion
//!
//! A clause is a disjunction of literals; a literal is a possibly negated
//! atom. The conversion pipeline runs connective elimination, negation
//! normal form, skolemization (Skolem functions parameterized by the
//! enclosing universals), quantifier dropping and or-over-and distribution.
//! Modal operators have no clausal form and are rejected up front.

use std::collections::HashSet;
use std::fmt;

use fnv::FnvHashMap;

use crate::error::{InferError, Result};
use crate::term::{ConnectiveKind, QuantifierKind, Term, TypedVar};
use crate::unify::{match_into, Substitution};

/// A literal is a possibly negated atom
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    /// The underlying atom (a bool-typed application)
    pub atom: Term,
    /// Whether this literal is negated
    pub negated: bool,
}

impl Literal {
    pub fn positive(atom: Term) -> Self {
        Literal {
            atom,
            negated: false,
        }
    }

    pub fn negative(atom: Term) -> Self {
        Literal {
            atom,
            negated: true,
        }
    }

    /// Negate this literal
    pub fn negate(&self) -> Literal {
        Literal {
            atom: self.atom.clone(),
            negated: !self.negated,
        }
    }

    pub fn is_positive(&self) -> bool {
        !self.negated
    }

    pub fn is_negative(&self) -> bool {
        self.negated
    }

    pub fn is_ground(&self) -> bool {
        self.atom.is_ground()
    }

    pub fn variables(&self) -> HashSet<TypedVar> {
        self.atom.variables()
    }

    /// Apply a substitution to this literal
    pub fn apply_substitution(&self, subst: &Substitution) -> Literal {
        Literal {
            atom: subst.apply(&self.atom),
            negated: self.negated,
        }
    }

    /// Rename variables consistently through a shared mapping
    pub fn standardize_apart(&self, mapping: &mut FnvHashMap<u64, TypedVar>) -> Literal {
        Literal {
            atom: self.atom.standardize_apart(mapping),
            negated: self.negated,
        }
    }

    /// Check if this literal has opposite sign and the same predicate
    pub fn complements(&self, other: &Literal) -> bool {
        self.negated != other.negated && predicate_name(&self.atom) == predicate_name(&other.atom)
    }

    pub fn weight(&self) -> usize {
        self.atom.size()
    }

    /// The literal as a formula term
    pub fn to_term(&self) -> Term {
        if self.negated {
            self.atom.clone().negate()
        } else {
            self.atom.clone()
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "-{}", self.atom)
        } else {
            write!(f, "{}", self.atom)
        }
    }
}

fn predicate_name(atom: &Term) -> &str {
    match atom {
        Term::Application(s, _) | Term::Constant(s) => &s.name,
        _ => "",
    }
}

/// Where a clause came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseOrigin {
    /// Context premise
    Input,
    /// Negated goal conjecture
    NegatedGoal,
    /// Resolvent of two clauses
    Resolution {
        clause1: usize,
        clause2: usize,
        lit1_idx: usize,
        lit2_idx: usize,
    },
    /// Factor of one clause
    Factor {
        clause: usize,
        lit1_idx: usize,
        lit2_idx: usize,
    },
}

/// A clause is a disjunction of literals
#[derive(Debug, Clone)]
pub struct Clause {
    pub literals: Vec<Literal>,
    /// Unique identifier within one saturation run
    pub id: usize,
    /// Weight for clause selection (sum of literal weights)
    pub weight: usize,
    pub origin: ClauseOrigin,
    /// Whether this clause descends from the negated goal
    pub is_goal: bool,
}

impl Clause {
    pub fn new(literals: Vec<Literal>, id: usize) -> Self {
        let weight = literals.iter().map(|l| l.weight()).sum();
        Clause {
            literals,
            id,
            weight,
            origin: ClauseOrigin::Input,
            is_goal: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn is_unit(&self) -> bool {
        self.literals.len() == 1
    }

    /// At most one positive literal
    pub fn is_horn(&self) -> bool {
        self.literals.iter().filter(|l| l.is_positive()).count() <= 1
    }

    pub fn is_ground(&self) -> bool {
        self.literals.iter().all(|l| l.is_ground())
    }

    pub fn variables(&self) -> HashSet<TypedVar> {
        let mut vars = HashSet::new();
        for lit in &self.literals {
            vars.extend(lit.variables());
        }
        vars
    }

    pub fn apply_substitution(&self, subst: &Substitution) -> Clause {
        let literals: Vec<Literal> = self
            .literals
            .iter()
            .map(|l| l.apply_substitution(subst))
            .collect();
        let weight = literals.iter().map(|l| l.weight()).sum();
        Clause {
            literals,
            id: self.id,
            weight,
            origin: self.origin.clone(),
            is_goal: self.is_goal,
        }
    }

    /// Rename all variables to fresh ones
    pub fn standardize_apart(&self) -> Clause {
        let mut mapping = FnvHashMap::default();
        Clause {
            literals: self
                .literals
                .iter()
                .map(|l| l.standardize_apart(&mut mapping))
                .collect(),
            id: self.id,
            weight: self.weight,
            origin: self.origin.clone(),
            is_goal: self.is_goal,
        }
    }

    /// Check if this clause subsumes another (is at least as general)
    pub fn subsumes(&self, other: &Clause) -> bool {
        if self.literals.len() > other.literals.len() {
            return false;
        }
        try_subsumption(&self.literals, &other.literals, &Substitution::new())
    }

    /// Drop repeated literals, keeping the first occurrence
    pub fn remove_duplicates(&mut self) {
        let mut seen = HashSet::new();
        self.literals.retain(|l| seen.insert(format!("{}", l)));
        self.weight = self.literals.iter().map(|l| l.weight()).sum();
    }

    /// A clause is a tautology only when it holds a literal and its exact
    /// negation; {P(x), -P(y)} is not one
    pub fn is_tautology(&self) -> bool {
        for (i, lit1) in self.literals.iter().enumerate() {
            for lit2 in self.literals.iter().skip(i + 1) {
                if lit1.negated != lit2.negated && lit1.atom == lit2.atom {
                    return true;
                }
            }
        }
        false
    }

    /// Order-independent signature used for duplicate detection
    pub fn signature(&self) -> String {
        let mut parts: Vec<String> = self.literals.iter().map(|l| format!("{}", l)).collect();
        parts.sort();
        parts.join("|")
    }

    /// The clause as a formula term (disjunction of its literals)
    pub fn to_term(&self) -> Term {
        match self.literals.split_first() {
            None => Term::atom("false", vec![]),
            Some((first, rest)) => rest
                .iter()
                .fold(first.to_term(), |acc, l| Term::or(acc, l.to_term())),
        }
    }
}

fn try_subsumption(remaining: &[Literal], targets: &[Literal], subst: &Substitution) -> bool {
    let (lit, rest) = match remaining.split_first() {
        Some(split) => split,
        None => return true,
    };

    let types = crate::term::SimpleTypeSystem;
    for (i, target) in targets.iter().enumerate() {
        if lit.negated != target.negated {
            continue;
        }
        let lit_atom = subst.apply(&lit.atom);
        let mut extended = subst.clone();
        if !match_into(&lit_atom, &target.atom, &types, &mut extended) {
            continue;
        }
        let remaining_targets: Vec<Literal> = targets
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, l)| l.clone())
            .collect();
        if try_subsumption(rest, &remaining_targets, &extended) {
            return true;
        }
    }

    false
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            write!(f, "$false")
        } else {
            for (i, lit) in self.literals.iter().enumerate() {
                if i > 0 {
                    write!(f, " | ")?;
                }
                write!(f, "{}", lit)?;
            }
            Ok(())
        }
    }
}

impl PartialEq for Clause {
    fn eq(&self, other: &Self) -> bool {
        self.literals.len() == other.literals.len() && self.signature() == other.signature()
    }
}

impl Eq for Clause {}

/// A growing set of clauses with id allocation
#[derive(Debug, Clone, Default)]
pub struct ClauseSet {
    pub clauses: Vec<Clause>,
    next_id: usize,
}

impl ClauseSet {
    pub fn new() -> Self {
        ClauseSet {
            clauses: vec![],
            next_id: 1,
        }
    }

    /// Add a clause, assigning it the next id
    pub fn add(&mut self, mut clause: Clause) -> usize {
        clause.id = self.next_id;
        self.next_id += 1;
        let id = clause.id;
        self.clauses.push(clause);
        id
    }

    pub fn add_axiom(&mut self, literals: Vec<Literal>) -> usize {
        self.add(Clause::new(literals, 0))
    }

    pub fn add_goal(&mut self, literals: Vec<Literal>) -> usize {
        let mut clause = Clause::new(literals, 0);
        clause.origin = ClauseOrigin::NegatedGoal;
        clause.is_goal = true;
        self.add(clause)
    }

    pub fn get(&self, id: usize) -> Option<&Clause> {
        self.clauses.iter().find(|c| c.id == id)
    }

    pub fn contains_empty(&self) -> bool {
        self.clauses.iter().any(|c| c.is_empty())
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn remove_tautologies(&mut self) {
        self.clauses.retain(|c| !c.is_tautology());
    }
}

// ============================================================================
// CNF conversion
// ============================================================================

/// Convert a formula into clause literal lists
///
/// Fails on modal operators, which have no clausal form.
pub fn clausify(term: &Term, skolem_counter: &mut usize) -> Result<Vec<Vec<Literal>>> {
    let eliminated = eliminate_connectives(term)?;
    let nnf = to_nnf(&eliminated)?;
    let skolemized = skolemize(&nnf, skolem_counter, &[]);
    let quantifier_free = drop_quantifiers(&skolemized);
    distribute(&quantifier_free)
}

/// Rewrite implications and biconditionals into and/or/not
fn eliminate_connectives(term: &Term) -> Result<Term> {
    match term {
        Term::Connective(ConnectiveKind::Implies, args) => {
            let a = eliminate_connectives(&args[0])?;
            let b = eliminate_connectives(&args[1])?;
            Ok(Term::or(a.negate(), b))
        }
        Term::Connective(ConnectiveKind::Iff, args) => {
            let a = eliminate_connectives(&args[0])?;
            let b = eliminate_connectives(&args[1])?;
            Ok(Term::and(
                Term::or(a.clone().negate(), b.clone()),
                Term::or(b.negate(), a),
            ))
        }
        Term::Connective(kind, _) if kind.is_modal() => Err(InferError::reasoning(
            "modal operator has no clausal form",
        )),
        Term::Connective(kind, args) => {
            let args = args
                .iter()
                .map(eliminate_connectives)
                .collect::<Result<Vec<_>>>()?;
            Ok(Term::Connective(*kind, args))
        }
        Term::Quantifier(kind, v, body) => Ok(Term::Quantifier(
            *kind,
            v.clone(),
            Box::new(eliminate_connectives(body)?),
        )),
        _ => Ok(term.clone()),
    }
}

/// Push negations inward to atoms (input must be implication-free)
fn to_nnf(term: &Term) -> Result<Term> {
    match term {
        Term::Connective(ConnectiveKind::Not, args) => match &args[0] {
            Term::Connective(ConnectiveKind::Not, inner) => to_nnf(&inner[0]),
            Term::Connective(ConnectiveKind::And, inner) => Ok(Term::or(
                to_nnf(&inner[0].clone().negate())?,
                to_nnf(&inner[1].clone().negate())?,
            )),
            Term::Connective(ConnectiveKind::Or, inner) => Ok(Term::and(
                to_nnf(&inner[0].clone().negate())?,
                to_nnf(&inner[1].clone().negate())?,
            )),
            Term::Quantifier(QuantifierKind::Forall, v, body) => Ok(Term::Quantifier(
                QuantifierKind::Exists,
                v.clone(),
                Box::new(to_nnf(&body.as_ref().clone().negate())?),
            )),
            Term::Quantifier(QuantifierKind::Exists, v, body) => Ok(Term::Quantifier(
                QuantifierKind::Forall,
                v.clone(),
                Box::new(to_nnf(&body.as_ref().clone().negate())?),
            )),
            inner if inner.is_atom() => Ok(term.clone()),
            other => Err(InferError::internal(format!(
                "negation of unexpected formula in NNF: {}",
                other
            ))),
        },
        Term::Connective(kind @ (ConnectiveKind::And | ConnectiveKind::Or), args) => {
            Ok(Term::Connective(
                *kind,
                vec![to_nnf(&args[0])?, to_nnf(&args[1])?],
            ))
        }
        Term::Quantifier(kind, v, body) => Ok(Term::Quantifier(
            *kind,
            v.clone(),
            Box::new(to_nnf(body)?),
        )),
        _ => Ok(term.clone()),
    }
}

/// Replace existentials with Skolem terms over the enclosing universals
fn skolemize(term: &Term, counter: &mut usize, universals: &[TypedVar]) -> Term {
    match term {
        Term::Quantifier(QuantifierKind::Forall, v, body) => {
            let mut extended = universals.to_vec();
            extended.push(v.clone());
            Term::Quantifier(
                QuantifierKind::Forall,
                v.clone(),
                Box::new(skolemize(body, counter, &extended)),
            )
        }
        Term::Quantifier(QuantifierKind::Exists, v, body) => {
            *counter += 1;
            let name = format!("sk{}", counter);
            let skolem = if universals.is_empty() {
                Term::constant(&name)
            } else {
                Term::func(
                    &name,
                    universals.iter().map(|u| Term::Variable(u.clone())).collect(),
                )
            };
            let substituted = body.substitute(v.id, &skolem);
            skolemize(&substituted, counter, universals)
        }
        Term::Connective(kind, args) => Term::Connective(
            *kind,
            args.iter().map(|a| skolemize(a, counter, universals)).collect(),
        ),
        _ => term.clone(),
    }
}

fn drop_quantifiers(term: &Term) -> Term {
    match term {
        Term::Quantifier(_, _, body) => drop_quantifiers(body),
        Term::Connective(kind, args) => {
            Term::Connective(*kind, args.iter().map(drop_quantifiers).collect())
        }
        _ => term.clone(),
    }
}

/// Or-over-and distribution down to literal lists
fn distribute(term: &Term) -> Result<Vec<Vec<Literal>>> {
    match term {
        Term::Connective(ConnectiveKind::And, args) => {
            let mut clauses = distribute(&args[0])?;
            clauses.extend(distribute(&args[1])?);
            Ok(clauses)
        }
        Term::Connective(ConnectiveKind::Or, args) => {
            let left = distribute(&args[0])?;
            let right = distribute(&args[1])?;
            let mut result = Vec::with_capacity(left.len() * right.len());
            for lc in &left {
                for rc in &right {
                    let mut clause = lc.clone();
                    clause.extend(rc.clone());
                    result.push(clause);
                }
            }
            Ok(result)
        }
        Term::Connective(ConnectiveKind::Not, args) if args[0].is_atom() => {
            Ok(vec![vec![Literal::negative(args[0].clone())]])
        }
        atom if atom.is_atom() => Ok(vec![vec![Literal::positive(atom.clone())]]),
        other => Err(InferError::internal(format!(
            "unexpected formula after NNF: {}",
            other
        ))),
    }
}

/// Clausify a set of premises and a goal into one clause set
///
/// The goal is negated before conversion; its clauses form the initial set
/// of support.
pub fn clausify_problem(premises: &[Term], goal: &Term) -> Result<ClauseSet> {
    let mut counter = 0usize;
    let mut set = ClauseSet::new();

    for premise in premises {
        for literals in clausify(premise, &mut counter)? {
            set.add_axiom(literals);
        }
    }

    let negated = close_universally(goal).negate();
    for literals in clausify(&negated, &mut counter)? {
        set.add_goal(literals);
    }

    set.remove_tautologies();
    Ok(set)
}

/// Universally close a goal's free variables so its negation introduces
/// fresh existential witnesses rather than free variables
fn close_universally(goal: &Term) -> Term {
    let mut closed = goal.clone();
    let mut vars: Vec<TypedVar> = goal.variables().into_iter().collect();
    vars.sort_by(|a, b| a.id.cmp(&b.id));
    for v in vars {
        closed = Term::Quantifier(QuantifierKind::Exists, v, Box::new(closed));
    }
    closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_term;

    fn lits(input: &str) -> Vec<Vec<Literal>> {
        let term = parse_term(input).unwrap();
        let mut counter = 0;
        clausify(&term, &mut counter).unwrap()
    }

    #[test]
    fn test_literal_complements() {
        let atom = parse_term("p(a)").unwrap();
        let pos = Literal::positive(atom.clone());
        let neg = Literal::negative(atom);
        assert!(pos.complements(&neg));
        assert!(!pos.complements(&pos));
    }

    #[test]
    fn test_clause_horn() {
        let p = Literal::positive(parse_term("p(a)").unwrap());
        let nq = Literal::negative(parse_term("q(a)").unwrap());
        let clause = Clause::new(vec![p, nq], 1);
        assert!(clause.is_horn());
        assert!(!clause.is_unit());
    }

    #[test]
    fn test_tautology_exact_only() {
        let px = parse_term("p(X)").unwrap();
        let taut = Clause::new(
            vec![Literal::positive(px.clone()), Literal::negative(px)],
            1,
        );
        assert!(taut.is_tautology());

        // Unifiable but not identical atoms are not a tautology
        let not_taut = Clause::new(
            vec![
                Literal::positive(parse_term("p(X)").unwrap()),
                Literal::negative(parse_term("p(Y)").unwrap()),
            ],
            2,
        );
        assert!(!not_taut.is_tautology());
    }

    #[test]
    fn test_subsumption() {
        // p(X) subsumes p(a) | q(b)
        let general = Clause::new(vec![Literal::positive(parse_term("p(X)").unwrap())], 1);
        let specific = Clause::new(
            vec![
                Literal::positive(parse_term("p(a)").unwrap()),
                Literal::positive(parse_term("q(b)").unwrap()),
            ],
            2,
        );
        assert!(general.subsumes(&specific));
        assert!(!specific.subsumes(&general));
    }

    #[test]
    fn test_subsumption_needs_consistent_bindings() {
        // p(X) | q(X) does not subsume p(a) | q(b): X cannot be both a and b
        let mut counter = 0;
        let t = parse_term("p(X) | q(X)").unwrap();
        let shared = Clause::new(clausify(&t, &mut counter).unwrap().remove(0), 1);
        let specific = Clause::new(
            vec![
                Literal::positive(parse_term("p(a)").unwrap()),
                Literal::positive(parse_term("q(b)").unwrap()),
            ],
            2,
        );
        assert!(!shared.subsumes(&specific));
    }

    #[test]
    fn test_nnf_de_morgan() {
        let clauses = lits("~(p & q)");
        // one clause: -p | -q
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].len(), 2);
        assert!(clauses[0].iter().all(|l| l.is_negative()));
    }

    #[test]
    fn test_cnf_distribution() {
        // (p & q) | r gives (p | r) & (q | r)
        let clauses = lits("(p & q) | r");
        assert_eq!(clauses.len(), 2);
        assert!(clauses.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn test_implication_elimination() {
        let clauses = lits("p -> q");
        assert_eq!(clauses.len(), 1);
        let clause = &clauses[0];
        assert_eq!(clause.len(), 2);
    }

    #[test]
    fn test_skolem_constant() {
        // exists X. P(X) becomes P(sk1)
        let clauses = lits("exists X. P(X)");
        assert_eq!(clauses.len(), 1);
        assert!(clauses[0][0].is_ground());
    }

    #[test]
    fn test_skolem_function_of_universals() {
        // forall X. exists Y. Loves(X,Y) becomes Loves(X, sk(X))
        let clauses = lits("forall X. exists Y. Loves(X,Y)");
        assert_eq!(clauses.len(), 1);
        let atom = &clauses[0][0].atom;
        match atom {
            Term::Application(_, args) => match &args[1] {
                Term::Application(s, skargs) => {
                    assert!(s.name.starts_with("sk"));
                    assert_eq!(skargs.len(), 1);
                }
                other => panic!("expected skolem function, got {}", other),
            },
            other => panic!("expected application, got {}", other),
        }
    }

    #[test]
    fn test_modal_rejected() {
        let term = parse_term("[]p").unwrap();
        let mut counter = 0;
        assert!(clausify(&term, &mut counter).is_err());
    }

    #[test]
    fn test_clausify_problem_marks_goal() {
        let premises = vec![parse_term("p(a)").unwrap()];
        let goal = parse_term("p(a)").unwrap();
        let set = clausify_problem(&premises, &goal).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.clauses.iter().any(|c| c.is_goal));
        // Negated goal appears as a negative literal
        let goal_clause = set.clauses.iter().find(|c| c.is_goal).unwrap();
        assert!(goal_clause.literals[0].is_negative());
    }
}

//! Unification of typed terms
//!
//! Implements the Martelli-Montanari unification algorithm with occurs check.
//! Bindings are kept idempotent: binding a variable rewrites every existing
//! binding, so applying the resulting substitution once is enough. A
//! [`TypeSystem`] gates every binding and decomposition, so ill-typed
//! unifiers are rejected before they are built.

use std::collections::HashSet;

use fnv::FnvHashMap;

use crate::term::{Term, TypeSystem, TypedVar, VarId};

/// A substitution mapping variable ids to terms
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    bindings: FnvHashMap<VarId, Term>,
}

impl Substitution {
    /// Create an empty substitution
    pub fn new() -> Self {
        Substitution {
            bindings: FnvHashMap::default(),
        }
    }

    /// Create a substitution with a single binding
    pub fn singleton(var: &TypedVar, term: Term) -> Self {
        let mut s = Substitution::new();
        s.bind(var.id, term);
        s
    }

    /// Add a binding, keeping the substitution idempotent
    pub fn bind(&mut self, id: VarId, term: Term) {
        // Apply current bindings to the incoming term
        let term = self.apply(&term);

        // Apply the new binding to all existing bindings
        for bound in self.bindings.values_mut() {
            *bound = bound.substitute(id, &term);
        }

        self.bindings.insert(id, term);
    }

    /// Look up a variable binding
    pub fn get(&self, id: VarId) -> Option<&Term> {
        self.bindings.get(&id)
    }

    /// Check if the substitution is empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of bound variables
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Apply this substitution to a term
    pub fn apply(&self, term: &Term) -> Term {
        self.apply_depth(term, 0)
    }

    fn apply_depth(&self, term: &Term, depth: usize) -> Term {
        // Bindings are idempotent; the depth guard only protects against
        // substitutions corrupted by a buggy caller
        if depth > 100 {
            return term.clone();
        }

        match term {
            Term::Variable(v) => match self.bindings.get(&v.id) {
                Some(t) => self.apply_depth(t, depth + 1),
                None => term.clone(),
            },
            Term::Constant(_) => term.clone(),
            Term::Application(s, args) => Term::Application(
                s.clone(),
                args.iter().map(|a| self.apply_depth(a, depth + 1)).collect(),
            ),
            Term::Connective(kind, args) => Term::Connective(
                *kind,
                args.iter().map(|a| self.apply_depth(a, depth + 1)).collect(),
            ),
            Term::Quantifier(kind, v, body) => Term::Quantifier(
                *kind,
                v.clone(),
                Box::new(self.apply_depth(body, depth + 1)),
            ),
        }
    }

    /// Compose two substitutions: apply `other` first, then `self`
    pub fn compose(&self, other: &Substitution) -> Substitution {
        let mut result = Substitution::new();

        for (id, term) in &other.bindings {
            result.bindings.insert(*id, self.apply(term));
        }

        for (id, term) in &self.bindings {
            if !other.bindings.contains_key(id) {
                result.bindings.insert(*id, term.clone());
            }
        }

        result
    }

    /// Restrict the substitution to the given variables
    pub fn restrict(&self, vars: &HashSet<TypedVar>) -> Substitution {
        let ids: HashSet<VarId> = vars.iter().map(|v| v.id).collect();
        Substitution {
            bindings: self
                .bindings
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, t)| (*id, t.clone()))
                .collect(),
        }
    }
}

/// Unify two terms, returning the most general unifier
///
/// Returns `None` on symbol clash, arity mismatch, occurs-check failure or
/// a type-incompatible binding.
pub fn unify(t1: &Term, t2: &Term, types: &dyn TypeSystem) -> Option<Substitution> {
    let mut subst = Substitution::new();
    if unify_into(t1, t2, types, &mut subst) {
        Some(subst)
    } else {
        None
    }
}

/// Unify two terms under an existing substitution, extending it in place
///
/// On failure the substitution may hold partial bindings; callers that need
/// rollback clone first.
pub fn unify_into(
    t1: &Term,
    t2: &Term,
    types: &dyn TypeSystem,
    subst: &mut Substitution,
) -> bool {
    let mut equations = vec![(t1.clone(), t2.clone())];

    while let Some((a, b)) = equations.pop() {
        let a = subst.apply(&a);
        let b = subst.apply(&b);

        if a == b {
            // Delete rule
            continue;
        }

        match (&a, &b) {
            // Orient: put variable on left
            (_, Term::Variable(_)) if !a.is_var() => {
                equations.push((b, a));
            }

            // Eliminate: bind variable, occurs check first
            (Term::Variable(v), t) => {
                if t.contains_var(v.id) {
                    return false;
                }
                if !types.check_compatible(&v.ty, &t.ty()) {
                    return false;
                }
                subst.bind(v.id, t.clone());
            }

            // Decompose applications on matching head symbols
            (Term::Application(s1, args1), Term::Application(s2, args2)) => {
                if s1.name != s2.name || args1.len() != args2.len() {
                    return false;
                }
                if !types.check_compatible(&s1.ty, &s2.ty) {
                    return false;
                }
                for (x, y) in args1.iter().zip(args2.iter()) {
                    equations.push((x.clone(), y.clone()));
                }
            }

            // Connectives decompose structurally (used by the tableau prover)
            (Term::Connective(k1, args1), Term::Connective(k2, args2)) => {
                if k1 != k2 || args1.len() != args2.len() {
                    return false;
                }
                for (x, y) in args1.iter().zip(args2.iter()) {
                    equations.push((x.clone(), y.clone()));
                }
            }

            // Constant clash or any other shape mismatch
            _ => return false,
        }
    }

    true
}

/// Check if two terms are unifiable without keeping the unifier
pub fn unifiable(t1: &Term, t2: &Term, types: &dyn TypeSystem) -> bool {
    unify(t1, t2, types).is_some()
}

/// Match a pattern against a term (one-way unification)
///
/// Variables in the pattern can be bound; variables in the term are treated
/// as constants. Used by subsumption and by context fact retrieval.
pub fn match_term(pattern: &Term, term: &Term, types: &dyn TypeSystem) -> Option<Substitution> {
    let mut subst = Substitution::new();
    if match_into(pattern, term, types, &mut subst) {
        Some(subst)
    } else {
        None
    }
}

/// One-way matching under an existing substitution
pub fn match_into(
    pattern: &Term,
    term: &Term,
    types: &dyn TypeSystem,
    subst: &mut Substitution,
) -> bool {
    let mut equations = vec![(pattern.clone(), term.clone())];

    while let Some((p, t)) = equations.pop() {
        let p = subst.apply(&p);

        match (&p, &t) {
            (Term::Variable(v), _) => {
                if !types.check_compatible(&v.ty, &t.ty()) {
                    return false;
                }
                match subst.get(v.id) {
                    Some(existing) => {
                        if existing != &t {
                            return false;
                        }
                    }
                    None => subst.bind(v.id, t.clone()),
                }
            }
            (Term::Application(s1, args1), Term::Application(s2, args2)) => {
                if s1.name != s2.name || args1.len() != args2.len() {
                    return false;
                }
                for (x, y) in args1.iter().zip(args2.iter()) {
                    equations.push((x.clone(), y.clone()));
                }
            }
            (Term::Connective(k1, args1), Term::Connective(k2, args2)) => {
                if k1 != k2 || args1.len() != args2.len() {
                    return false;
                }
                for (x, y) in args1.iter().zip(args2.iter()) {
                    equations.push((x.clone(), y.clone()));
                }
            }
            (Term::Constant(s1), Term::Constant(s2)) => {
                if s1 != s2 {
                    return false;
                }
            }
            _ => return false,
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{SimpleTypeSystem, TypeTag};

    fn ts() -> SimpleTypeSystem {
        SimpleTypeSystem
    }

    #[test]
    fn test_unify_identical() {
        let t = Term::constant("a");
        let result = unify(&t, &t, &ts());
        assert!(result.is_some());
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_unify_var_const() {
        let x = Term::var("X");
        let a = Term::constant("a");

        let subst = unify(&x, &a, &ts()).unwrap();
        assert_eq!(subst.apply(&x), a);
    }

    #[test]
    fn test_unify_clash() {
        let a = Term::constant("a");
        let b = Term::constant("b");
        assert!(unify(&a, &b, &ts()).is_none());
    }

    #[test]
    fn test_unify_occurs_check() {
        let x = Term::var("X");
        let fx = Term::func("f", vec![x.clone()]);
        assert!(unify(&x, &fx, &ts()).is_none());
    }

    #[test]
    fn test_unify_occurs_check_nested() {
        let x = Term::var("X");
        let gfx = Term::func("g", vec![Term::func("f", vec![x.clone()])]);
        assert!(unify(&x, &gfx, &ts()).is_none());
    }

    #[test]
    fn test_unify_function_args() {
        let x = Term::var("X");
        let y = Term::var("Y");
        let a = Term::constant("a");
        let b = Term::constant("b");

        let t1 = Term::func("f", vec![x.clone(), a.clone()]);
        let t2 = Term::func("f", vec![b.clone(), y.clone()]);

        let subst = unify(&t1, &t2, &ts()).unwrap();
        assert_eq!(subst.apply(&x), b);
        assert_eq!(subst.apply(&y), a);
    }

    #[test]
    fn test_unify_type_gate() {
        // A domain-typed variable cannot bind an integer
        let p = Term::Variable(TypedVar::fresh("P", TypeTag::Named("Person".to_string())));
        assert!(unify(&p, &Term::int(3), &ts()).is_none());
    }

    #[test]
    fn test_unify_var_binds_int() {
        // Parser variables carry the Entity tag; integer fact arguments
        // must still bind
        let a = Term::var("A");
        let thirty = Term::int(30);
        let subst = unify(&a, &thirty, &ts()).unwrap();
        assert_eq!(subst.apply(&a), thirty);

        let goal = Term::atom("Age", vec![Term::var("P"), Term::var("A")]);
        let fact = Term::atom("Age", vec![Term::constant("alice"), Term::int(30)]);
        assert!(unify(&goal, &fact, &ts()).is_some());
    }

    #[test]
    fn test_mgu_idempotent() {
        // f(X, Y) with f(Y, a): applying the result twice changes nothing
        let x = Term::var("X");
        let y = Term::var("Y");
        let a = Term::constant("a");

        let t1 = Term::func("f", vec![x.clone(), y.clone()]);
        let t2 = Term::func("f", vec![y.clone(), a.clone()]);

        let subst = unify(&t1, &t2, &ts()).unwrap();
        let once = subst.apply(&t1);
        let twice = subst.apply(&once);
        assert_eq!(once, twice);
        assert_eq!(once, subst.apply(&t2));
    }

    #[test]
    fn test_unify_var_var() {
        let x = Term::var("X");
        let y = Term::var("Y");
        let subst = unify(&x, &y, &ts()).unwrap();
        assert_eq!(subst.apply(&x), subst.apply(&y));
    }

    #[test]
    fn test_unify_into_extends() {
        let x = Term::var("X");
        let y = Term::var("Y");
        let a = Term::constant("a");
        let b = Term::constant("b");

        let mut subst = Substitution::new();
        assert!(unify_into(&x, &a, &ts(), &mut subst));
        assert!(unify_into(&y, &b, &ts(), &mut subst));
        assert_eq!(subst.apply(&x), a);
        assert_eq!(subst.apply(&y), b);
    }

    #[test]
    fn test_match_one_way() {
        let x = Term::var("X");
        let pattern = Term::atom("P", vec![x.clone()]);
        let fact = Term::atom("P", vec![Term::constant("a")]);

        let subst = match_term(&pattern, &fact, &ts()).unwrap();
        assert_eq!(subst.apply(&x), Term::constant("a"));

        // Reverse direction must not bind the fact's constant
        assert!(match_term(&fact, &pattern, &ts()).is_none());
    }

    #[test]
    fn test_match_consistent_bindings() {
        let x = Term::var("X");
        let pattern = Term::atom("P", vec![x.clone(), x.clone()]);
        let same = Term::atom("P", vec![Term::constant("a"), Term::constant("a")]);
        let diff = Term::atom("P", vec![Term::constant("a"), Term::constant("b")]);

        assert!(match_term(&pattern, &same, &ts()).is_some());
        assert!(match_term(&pattern, &diff, &ts()).is_none());
    }

    #[test]
    fn test_compose() {
        let x = Term::var("X");
        let y = Term::var("Y");
        let a = Term::constant("a");

        let (xid, yv) = match (&x, &y) {
            (Term::Variable(xv), Term::Variable(yv)) => (xv.id, yv.clone()),
            _ => unreachable!(),
        };

        let mut s1 = Substitution::new();
        s1.bind(xid, y.clone());

        let mut s2 = Substitution::new();
        s2.bind(yv.id, a.clone());

        let composed = s2.compose(&s1);
        assert_eq!(composed.apply(&x), a);
    }
}

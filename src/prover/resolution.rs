//! Resolution inference rules
//!
//! Binary resolution and factoring over typed clauses. Both rules apply the
//! MGU to every remaining literal and record the parent clause ids so the
//! saturation loop can reconstruct proofs.

use crate::term::SimpleTypeSystem;
use crate::unify::unify;

use super::clause::{Clause, ClauseOrigin, Literal};

/// Perform binary resolution between two clauses
///
/// Given C1 = {L1, ...} and C2 = {L2, ...} where L1 and the complement of
/// L2 unify, produces the resolvent (C1 - {L1}) ∪ σ(C2 - {L2}).
pub fn resolve(
    clause1: &Clause,
    lit1_idx: usize,
    clause2: &Clause,
    lit2_idx: usize,
    new_id: usize,
) -> Option<Clause> {
    if lit1_idx >= clause1.literals.len() || lit2_idx >= clause2.literals.len() {
        return None;
    }

    let lit1 = &clause1.literals[lit1_idx];
    let lit2 = &clause2.literals[lit2_idx];

    if lit1.negated == lit2.negated {
        return None;
    }

    let types = SimpleTypeSystem;
    let mgu = unify(&lit1.atom, &lit2.atom, &types)?;

    let mut new_literals: Vec<Literal> = Vec::new();

    for (i, lit) in clause1.literals.iter().enumerate() {
        if i != lit1_idx {
            new_literals.push(lit.apply_substitution(&mgu));
        }
    }

    for (i, lit) in clause2.literals.iter().enumerate() {
        if i != lit2_idx {
            let applied = lit.apply_substitution(&mgu);
            if !new_literals.contains(&applied) {
                new_literals.push(applied);
            }
        }
    }

    let weight = new_literals.iter().map(|l| l.weight()).sum();

    Some(Clause {
        literals: new_literals,
        id: new_id,
        weight,
        origin: ClauseOrigin::Resolution {
            clause1: clause1.id,
            clause2: clause2.id,
            lit1_idx,
            lit2_idx,
        },
        is_goal: clause1.is_goal || clause2.is_goal,
    })
}

/// All binary resolvents of two clauses, with variables standardized apart
pub fn resolve_all(clause1: &Clause, clause2: &Clause, next_id: &mut usize) -> Vec<Clause> {
    let mut resolvents = Vec::new();

    let clause2_renamed = clause2.standardize_apart();

    for (i, lit1) in clause1.literals.iter().enumerate() {
        for (j, lit2) in clause2_renamed.literals.iter().enumerate() {
            if lit1.complements(lit2) {
                if let Some(resolvent) = resolve(clause1, i, &clause2_renamed, j, *next_id) {
                    *next_id += 1;
                    resolvents.push(resolvent);
                }
            }
        }
    }

    resolvents
}

/// Perform factoring within a clause
///
/// Given C = {L1, L2, ...} where L1 and L2 have the same sign and unify
/// with MGU σ, produces σ(C - {L2}).
pub fn factor(clause: &Clause, lit1_idx: usize, lit2_idx: usize, new_id: usize) -> Option<Clause> {
    if lit1_idx >= clause.literals.len()
        || lit2_idx >= clause.literals.len()
        || lit1_idx == lit2_idx
    {
        return None;
    }

    let lit1 = &clause.literals[lit1_idx];
    let lit2 = &clause.literals[lit2_idx];

    if lit1.negated != lit2.negated {
        return None;
    }

    let types = SimpleTypeSystem;
    let mgu = unify(&lit1.atom, &lit2.atom, &types)?;

    let mut new_literals: Vec<Literal> = Vec::new();
    for (i, lit) in clause.literals.iter().enumerate() {
        if i != lit2_idx {
            let applied = lit.apply_substitution(&mgu);
            if !new_literals.contains(&applied) {
                new_literals.push(applied);
            }
        }
    }

    let weight = new_literals.iter().map(|l| l.weight()).sum();

    Some(Clause {
        literals: new_literals,
        id: new_id,
        weight,
        origin: ClauseOrigin::Factor {
            clause: clause.id,
            lit1_idx,
            lit2_idx,
        },
        is_goal: clause.is_goal,
    })
}

/// All factors of a clause
pub fn factor_all(clause: &Clause, next_id: &mut usize) -> Vec<Clause> {
    let mut factors = Vec::new();

    for i in 0..clause.literals.len() {
        for j in (i + 1)..clause.literals.len() {
            if let Some(f) = factor(clause, i, j, *next_id) {
                *next_id += 1;
                factors.push(f);
            }
        }
    }

    factors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::parse_term;

    fn pos(s: &str) -> Literal {
        Literal::positive(parse_term(s).unwrap())
    }

    fn neg(s: &str) -> Literal {
        Literal::negative(parse_term(s).unwrap())
    }

    #[test]
    fn test_binary_resolution_ground() {
        // P(a) and -P(a) | Q(b) gives Q(b)
        let clause1 = Clause::new(vec![pos("P(a)")], 1);
        let clause2 = Clause::new(vec![neg("P(a)"), pos("Q(b)")], 2);

        let r = resolve(&clause1, 0, &clause2, 0, 3).unwrap();
        assert_eq!(r.literals.len(), 1);
        assert_eq!(format!("{}", r.literals[0]), "Q(b)");
    }

    #[test]
    fn test_resolution_applies_unifier() {
        // P(X) and -P(a) | Q(X) gives Q(a) when X is shared
        let t = parse_term("~P(a) | Q(X)").unwrap();
        let mut counter = 0;
        let lits = super::super::clause::clausify(&t, &mut counter)
            .unwrap()
            .remove(0);
        let clause2 = Clause::new(lits, 2);
        let p_idx = clause2
            .literals
            .iter()
            .position(|l| l.is_negative())
            .unwrap();

        let clause1 = Clause::new(vec![pos("P(X)")], 1);
        let r = resolve(&clause1, 0, &clause2, p_idx, 3).unwrap();
        assert_eq!(r.literals.len(), 1);
        assert!(r.literals[0].is_ground() || format!("{}", r.literals[0]).starts_with("Q"));
    }

    #[test]
    fn test_same_sign_does_not_resolve() {
        let clause1 = Clause::new(vec![pos("P(a)")], 1);
        let clause2 = Clause::new(vec![pos("P(a)")], 2);
        assert!(resolve(&clause1, 0, &clause2, 0, 3).is_none());
    }

    #[test]
    fn test_derive_empty_clause() {
        let clause1 = Clause::new(vec![pos("P(a)")], 1);
        let clause2 = Clause::new(vec![neg("P(a)")], 2);
        let r = resolve(&clause1, 0, &clause2, 0, 3).unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_resolve_all_standardizes_apart() {
        // P(X) against -P(X) | Q(X): the two X's are different variables
        let clause1 = Clause::new(vec![pos("P(X)")], 1);
        let clause2 = Clause::new(vec![neg("P(X)"), pos("Q(X)")], 2);

        let mut next_id = 3;
        let resolvents = resolve_all(&clause1, &clause2, &mut next_id);
        assert_eq!(resolvents.len(), 1);
        assert_eq!(resolvents[0].literals.len(), 1);
    }

    #[test]
    fn test_factoring() {
        // P(X) | P(a) factors to P(a)
        let clause = Clause::new(vec![pos("P(X)"), pos("P(a)")], 1);
        let f = factor(&clause, 0, 1, 2).unwrap();
        assert_eq!(f.literals.len(), 1);
        assert!(f.literals[0].is_ground());
    }

    #[test]
    fn test_factor_requires_same_sign() {
        let clause = Clause::new(vec![pos("P(X)"), neg("P(a)")], 1);
        assert!(factor(&clause, 0, 1, 2).is_none());
    }

    #[test]
    fn test_resolvent_keeps_goal_flag() {
        let mut clause1 = Clause::new(vec![pos("P(a)")], 1);
        clause1.is_goal = true;
        let clause2 = Clause::new(vec![neg("P(a)"), pos("Q(b)")], 2);
        let r = resolve(&clause1, 0, &clause2, 0, 3).unwrap();
        assert!(r.is_goal);
    }
}

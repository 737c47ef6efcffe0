//! Canonical term representation
//!
//! Terms are the shared currency of the whole engine: goals, context facts,
//! clause literals and tableau formulas are all [`Term`] values. A term is a
//! constant, a variable, an application (predicates and functions), a logical
//! connective or a quantifier. Every node carries a resolved [`TypeTag`];
//! equality is structural.
//!
//! Variable ids come from a process-wide monotonic counter so that terms
//! built in different contexts can never capture each other's variables.

pub mod types;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, InferError};

pub use types::{SimpleTypeSystem, TypeSystem, TypeTag};

/// Unique variable identifier
pub type VarId = u64;

static VAR_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a globally unique variable id
pub fn fresh_var_id() -> VarId {
    VAR_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A named symbol with its resolved type
///
/// Used for constants and for application heads, where `ty` is the result
/// type of the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeTag,
}

impl Symbol {
    pub fn new(name: &str, ty: TypeTag) -> Self {
        Symbol {
            name: name.to_string(),
            ty,
        }
    }
}

/// A typed logic variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypedVar {
    pub name: String,
    pub id: VarId,
    pub ty: TypeTag,
}

impl TypedVar {
    /// Create a variable with a fresh globally unique id
    pub fn fresh(name: &str, ty: TypeTag) -> Self {
        TypedVar {
            name: name.to_string(),
            id: fresh_var_id(),
            ty,
        }
    }
}

impl fmt::Display for TypedVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Logical connective kinds (including the modal operators)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectiveKind {
    Not,
    And,
    Or,
    Implies,
    Iff,
    /// Modal necessity ([] / box)
    Necessarily,
    /// Modal possibility (<> / diamond)
    Possibly,
}

impl ConnectiveKind {
    /// Number of operands the connective takes
    pub fn arity(&self) -> usize {
        match self {
            ConnectiveKind::Not | ConnectiveKind::Necessarily | ConnectiveKind::Possibly => 1,
            _ => 2,
        }
    }

    /// Whether this is one of the modal operators
    pub fn is_modal(&self) -> bool {
        matches!(self, ConnectiveKind::Necessarily | ConnectiveKind::Possibly)
    }
}

/// Quantifier kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantifierKind {
    Forall,
    Exists,
}

/// A term in the shared model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    /// A typed constant
    Constant(Symbol),
    /// A typed variable
    Variable(TypedVar),
    /// Predicate or function application; the symbol's type is the result type
    Application(Symbol, Vec<Term>),
    /// Logical connective over formulas (always of type bool)
    Connective(ConnectiveKind, Vec<Term>),
    /// Quantified formula (always of type bool)
    Quantifier(QuantifierKind, TypedVar, Box<Term>),
}

impl Term {
    /// Create an entity constant
    pub fn constant(name: &str) -> Self {
        Term::Constant(Symbol::new(name, TypeTag::Entity))
    }

    /// Create an integer constant
    pub fn int(value: i64) -> Self {
        Term::Constant(Symbol::new(&value.to_string(), TypeTag::Int))
    }

    /// Create an entity variable with a fresh id
    pub fn var(name: &str) -> Self {
        Term::Variable(TypedVar::fresh(name, TypeTag::Entity))
    }

    /// Create a predicate application (an atomic formula)
    pub fn atom(pred: &str, args: Vec<Term>) -> Self {
        Term::Application(Symbol::new(pred, TypeTag::Bool), args)
    }

    /// Create a function application with an entity result
    pub fn func(name: &str, args: Vec<Term>) -> Self {
        Term::Application(Symbol::new(name, TypeTag::Entity), args)
    }

    /// Negate a formula
    pub fn negate(self) -> Self {
        Term::Connective(ConnectiveKind::Not, vec![self])
    }

    /// Conjoin two formulas
    pub fn and(a: Term, b: Term) -> Self {
        Term::Connective(ConnectiveKind::And, vec![a, b])
    }

    /// Disjoin two formulas
    pub fn or(a: Term, b: Term) -> Self {
        Term::Connective(ConnectiveKind::Or, vec![a, b])
    }

    /// Build an implication
    pub fn implies(a: Term, b: Term) -> Self {
        Term::Connective(ConnectiveKind::Implies, vec![a, b])
    }

    /// The resolved type of this node
    pub fn ty(&self) -> TypeTag {
        match self {
            Term::Constant(s) => s.ty.clone(),
            Term::Variable(v) => v.ty.clone(),
            Term::Application(s, _) => s.ty.clone(),
            Term::Connective(_, _) | Term::Quantifier(_, _, _) => TypeTag::Bool,
        }
    }

    /// Check if this term is a variable
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// Check if this is an atomic formula (bool-typed application)
    pub fn is_atom(&self) -> bool {
        match self {
            Term::Application(s, _) | Term::Constant(s) => s.ty.is_bool(),
            _ => false,
        }
    }

    /// Check if this term contains no variables
    pub fn is_ground(&self) -> bool {
        match self {
            Term::Constant(_) => true,
            Term::Variable(_) => false,
            Term::Application(_, args) | Term::Connective(_, args) => {
                args.iter().all(|a| a.is_ground())
            }
            Term::Quantifier(_, _, body) => body.is_ground(),
        }
    }

    /// Check if the formula contains a modal operator
    pub fn has_modality(&self) -> bool {
        match self {
            Term::Connective(kind, args) => {
                kind.is_modal() || args.iter().any(|a| a.has_modality())
            }
            Term::Application(_, args) => args.iter().any(|a| a.has_modality()),
            Term::Quantifier(_, _, body) => body.has_modality(),
            _ => false,
        }
    }

    /// Check if the formula contains a quantifier
    pub fn has_quantifier(&self) -> bool {
        match self {
            Term::Quantifier(_, _, _) => true,
            Term::Connective(_, args) | Term::Application(_, args) => {
                args.iter().any(|a| a.has_quantifier())
            }
            _ => false,
        }
    }

    /// All free variables in this term
    pub fn variables(&self) -> HashSet<TypedVar> {
        let mut vars = HashSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut HashSet<TypedVar>) {
        match self {
            Term::Constant(_) => {}
            Term::Variable(v) => {
                vars.insert(v.clone());
            }
            Term::Application(_, args) | Term::Connective(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
            Term::Quantifier(_, v, body) => {
                let mut inner = HashSet::new();
                body.collect_variables(&mut inner);
                inner.remove(v);
                vars.extend(inner);
            }
        }
    }

    /// Check whether the term contains the given variable (by id)
    pub fn contains_var(&self, id: VarId) -> bool {
        match self {
            Term::Constant(_) => false,
            Term::Variable(v) => v.id == id,
            Term::Application(_, args) | Term::Connective(_, args) => {
                args.iter().any(|a| a.contains_var(id))
            }
            Term::Quantifier(_, v, body) => v.id != id && body.contains_var(id),
        }
    }

    /// Number of symbols in the term (used for clause weights)
    pub fn size(&self) -> usize {
        match self {
            Term::Constant(_) | Term::Variable(_) => 1,
            Term::Application(_, args) | Term::Connective(_, args) => {
                1 + args.iter().map(|a| a.size()).sum::<usize>()
            }
            Term::Quantifier(_, _, body) => 1 + body.size(),
        }
    }

    /// Replace a variable (by id) with a replacement term
    pub fn substitute(&self, id: VarId, replacement: &Term) -> Term {
        match self {
            Term::Variable(v) if v.id == id => replacement.clone(),
            Term::Constant(_) | Term::Variable(_) => self.clone(),
            Term::Application(s, args) => Term::Application(
                s.clone(),
                args.iter().map(|a| a.substitute(id, replacement)).collect(),
            ),
            Term::Connective(kind, args) => Term::Connective(
                *kind,
                args.iter().map(|a| a.substitute(id, replacement)).collect(),
            ),
            Term::Quantifier(kind, v, body) => {
                if v.id == id {
                    self.clone()
                } else {
                    Term::Quantifier(*kind, v.clone(), Box::new(body.substitute(id, replacement)))
                }
            }
        }
    }

    /// Rename every variable to a fresh one, consistently
    ///
    /// Used to standardize clauses and rules apart before resolution.
    pub fn standardize_apart(&self, mapping: &mut FnvHashMap<VarId, TypedVar>) -> Term {
        match self {
            Term::Constant(_) => self.clone(),
            Term::Variable(v) => {
                let fresh = mapping
                    .entry(v.id)
                    .or_insert_with(|| TypedVar::fresh(&v.name, v.ty.clone()));
                Term::Variable(fresh.clone())
            }
            Term::Application(s, args) => Term::Application(
                s.clone(),
                args.iter().map(|a| a.standardize_apart(mapping)).collect(),
            ),
            Term::Connective(kind, args) => Term::Connective(
                *kind,
                args.iter().map(|a| a.standardize_apart(mapping)).collect(),
            ),
            Term::Quantifier(kind, v, body) => {
                let fresh = TypedVar::fresh(&v.name, v.ty.clone());
                mapping.insert(v.id, fresh.clone());
                let new_body = body.standardize_apart(mapping);
                Term::Quantifier(*kind, fresh, Box::new(new_body))
            }
        }
    }

    /// Validate that a term is well-formed enough to dispatch
    ///
    /// Checks that connectives have the right operand count and bool-typed
    /// operands, that quantifier bodies are formulas and that application
    /// arguments are not formulas themselves.
    pub fn validate(&self, types: &dyn TypeSystem) -> Result<(), InferError> {
        match self {
            Term::Constant(_) | Term::Variable(_) => Ok(()),
            Term::Application(s, args) => {
                for arg in args {
                    if arg.ty().is_bool() {
                        return Err(InferError::new(
                            ErrorCode::TypeMismatch,
                            format!("formula used as argument of {}", s.name),
                        ));
                    }
                    arg.validate(types)?;
                }
                Ok(())
            }
            Term::Connective(kind, args) => {
                if args.len() != kind.arity() {
                    return Err(InferError::new(
                        ErrorCode::TypeMismatch,
                        format!(
                            "{:?} expects {} operands, got {}",
                            kind,
                            kind.arity(),
                            args.len()
                        ),
                    ));
                }
                for arg in args {
                    if !arg.ty().is_bool() {
                        return Err(InferError::new(
                            ErrorCode::TypeMismatch,
                            format!("operand of {:?} is not a formula: {}", kind, arg),
                        ));
                    }
                    arg.validate(types)?;
                }
                Ok(())
            }
            Term::Quantifier(_, _, body) => {
                if !body.ty().is_bool() {
                    return Err(InferError::new(
                        ErrorCode::TypeMismatch,
                        format!("quantifier body is not a formula: {}", body),
                    ));
                }
                body.validate(types)
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Constant(s) => write!(f, "{}", s.name),
            Term::Variable(v) => write!(f, "{}", v.name),
            Term::Application(s, args) => {
                if args.is_empty() {
                    write!(f, "{}", s.name)
                } else {
                    write!(f, "{}(", s.name)?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ")")
                }
            }
            Term::Connective(kind, args) => match kind {
                ConnectiveKind::Not => write!(f, "~{}", args[0]),
                ConnectiveKind::Necessarily => write!(f, "[]{}", args[0]),
                ConnectiveKind::Possibly => write!(f, "<>{}", args[0]),
                ConnectiveKind::And => write!(f, "({} & {})", args[0], args[1]),
                ConnectiveKind::Or => write!(f, "({} | {})", args[0], args[1]),
                ConnectiveKind::Implies => write!(f, "({} -> {})", args[0], args[1]),
                ConnectiveKind::Iff => write!(f, "({} <-> {})", args[0], args[1]),
            },
            Term::Quantifier(kind, v, body) => {
                let kw = match kind {
                    QuantifierKind::Forall => "forall",
                    QuantifierKind::Exists => "exists",
                };
                write!(f, "{} {}. {}", kw, v.name, body)
            }
        }
    }
}

// ============================================================================
// Text parser
// ============================================================================

/// Parse a goal or context formula from its text form
///
/// Grammar (loosest binding first): `<->`, `->`, `|`, `&`, then the unary
/// prefixes `~`, `[]`, `<>`, then `forall X. F` / `exists X. F`, parentheses
/// and atoms. Uppercase-initial identifiers in argument position are
/// variables; bare integers are int constants; everything else is an entity
/// constant or function application.
pub fn parse_term(input: &str) -> Result<Term, InferError> {
    let mut parser = Parser::default();
    parser.parse_formula(input)
}

#[derive(Default)]
struct Parser {
    // Same-named variables within one formula share an id
    vars: FnvHashMap<String, TypedVar>,
}

impl Parser {
    fn parse_formula(&mut self, input: &str) -> Result<Term, InferError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(InferError::new(ErrorCode::ParseError, "empty formula"));
        }

        if let Some(rest) = input.strip_prefix("forall ") {
            return self.parse_quantifier(QuantifierKind::Forall, rest);
        }
        if let Some(rest) = input.strip_prefix("exists ") {
            return self.parse_quantifier(QuantifierKind::Exists, rest);
        }

        // Binary connectives, loosest first, scanning at paren depth 0
        for (token, kind) in [
            ("<->", ConnectiveKind::Iff),
            ("->", ConnectiveKind::Implies),
            ("|", ConnectiveKind::Or),
            ("&", ConnectiveKind::And),
        ] {
            if let Some(pos) = find_connective(input, token) {
                let left = self.parse_formula(&input[..pos])?;
                let right = self.parse_formula(&input[pos + token.len()..])?;
                return Ok(Term::Connective(kind, vec![left, right]));
            }
        }

        if let Some(rest) = input.strip_prefix('~') {
            return Ok(self.parse_formula(rest)?.negate());
        }
        if let Some(rest) = input.strip_prefix("[]") {
            let inner = self.parse_formula(rest)?;
            return Ok(Term::Connective(ConnectiveKind::Necessarily, vec![inner]));
        }
        if let Some(rest) = input.strip_prefix("<>") {
            let inner = self.parse_formula(rest)?;
            return Ok(Term::Connective(ConnectiveKind::Possibly, vec![inner]));
        }

        if input.starts_with('(') && input.ends_with(')') && balanced(&input[1..input.len() - 1]) {
            return self.parse_formula(&input[1..input.len() - 1]);
        }

        self.parse_atom(input)
    }

    fn parse_quantifier(&mut self, kind: QuantifierKind, rest: &str) -> Result<Term, InferError> {
        let dot = rest.find('.').ok_or_else(|| {
            InferError::new(ErrorCode::ParseError, "missing '.' after quantified variable")
        })?;
        let var_name = rest[..dot].trim();
        let var = self
            .vars
            .entry(var_name.to_string())
            .or_insert_with(|| TypedVar::fresh(var_name, TypeTag::Entity))
            .clone();
        let body = self.parse_formula(&rest[dot + 1..])?;
        Ok(Term::Quantifier(kind, var, Box::new(body)))
    }

    fn parse_atom(&mut self, input: &str) -> Result<Term, InferError> {
        let input = input.trim();
        if let Some(paren) = input.find('(') {
            if !input.ends_with(')') {
                return Err(InferError::new(
                    ErrorCode::ParseError,
                    format!("unbalanced parentheses in atom: {}", input),
                ));
            }
            let pred = &input[..paren];
            let args = self.parse_args(&input[paren + 1..input.len() - 1])?;
            Ok(Term::atom(pred, args))
        } else {
            // Propositional atom
            Ok(Term::atom(input, vec![]))
        }
    }

    fn parse_args(&mut self, input: &str) -> Result<Vec<Term>, InferError> {
        if input.trim().is_empty() {
            return Ok(vec![]);
        }
        let mut args = Vec::new();
        let mut current = String::new();
        let mut depth = 0usize;
        for c in input.chars() {
            match c {
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => {
                    args.push(self.parse_inner_term(current.trim())?);
                    current.clear();
                }
                _ => current.push(c),
            }
        }
        if !current.trim().is_empty() {
            args.push(self.parse_inner_term(current.trim())?);
        }
        Ok(args)
    }

    fn parse_inner_term(&mut self, input: &str) -> Result<Term, InferError> {
        if input.is_empty() {
            return Err(InferError::new(ErrorCode::ParseError, "empty term"));
        }

        if let Ok(n) = input.parse::<i64>() {
            return Ok(Term::int(n));
        }

        if let Some(paren) = input.find('(') {
            if !input.ends_with(')') {
                return Err(InferError::new(
                    ErrorCode::ParseError,
                    format!("unbalanced parentheses in term: {}", input),
                ));
            }
            let name = &input[..paren];
            let args = self.parse_args(&input[paren + 1..input.len() - 1])?;
            return Ok(Term::func(name, args));
        }

        let first_upper = input
            .chars()
            .next()
            .map(|c| c.is_uppercase())
            .unwrap_or(false);
        if first_upper {
            let var = self
                .vars
                .entry(input.to_string())
                .or_insert_with(|| TypedVar::fresh(input, TypeTag::Entity))
                .clone();
            Ok(Term::Variable(var))
        } else {
            Ok(Term::constant(input))
        }
    }
}

fn find_connective(input: &str, token: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
        if depth == 0 && input[i..].starts_with(token) {
            // `->` and `|` must not match inside `<->`
            if token != "<->" && input[i..].starts_with("<->") {
                i += 3;
                continue;
            }
            if token == "->" && i > 0 && bytes[i - 1] == b'<' {
                i += 1;
                continue;
            }
            return Some(i);
        }
        i += 1;
    }
    None
}

fn balanced(input: &str) -> bool {
    let mut depth = 0i32;
    for c in input.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_ids_unique() {
        let a = Term::var("x");
        let b = Term::var("x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_structural_equality() {
        let a = Term::atom("P", vec![Term::constant("a")]);
        let b = Term::atom("P", vec![Term::constant("a")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ground_and_variables() {
        let x = TypedVar::fresh("X", TypeTag::Entity);
        let t = Term::atom("P", vec![Term::Variable(x.clone()), Term::constant("a")]);
        assert!(!t.is_ground());
        assert_eq!(t.variables().len(), 1);
        assert!(t.contains_var(x.id));
    }

    #[test]
    fn test_quantifier_binds() {
        let x = TypedVar::fresh("X", TypeTag::Entity);
        let body = Term::atom("P", vec![Term::Variable(x.clone())]);
        let q = Term::Quantifier(QuantifierKind::Forall, x, Box::new(body));
        assert!(q.variables().is_empty());
    }

    #[test]
    fn test_substitute() {
        let x = TypedVar::fresh("X", TypeTag::Entity);
        let t = Term::atom("P", vec![Term::Variable(x.clone())]);
        let r = t.substitute(x.id, &Term::constant("a"));
        assert_eq!(r, Term::atom("P", vec![Term::constant("a")]));
    }

    #[test]
    fn test_standardize_apart_renames() {
        let x = TypedVar::fresh("X", TypeTag::Entity);
        let t = Term::atom(
            "P",
            vec![Term::Variable(x.clone()), Term::Variable(x.clone())],
        );
        let mut mapping = FnvHashMap::default();
        let renamed = t.standardize_apart(&mut mapping);
        assert_ne!(t, renamed);
        // Both occurrences must map to the same fresh variable
        assert_eq!(renamed.variables().len(), 1);
        assert!(!renamed.contains_var(x.id));
    }

    #[test]
    fn test_parse_atom() {
        let t = parse_term("At(john,office)").unwrap();
        assert_eq!(
            t,
            Term::atom("At", vec![Term::constant("john"), Term::constant("office")])
        );
    }

    #[test]
    fn test_parse_variables_shared() {
        let t = parse_term("At(P,A) & Connected(A,B)").unwrap();
        // A appears twice and must share one id
        assert_eq!(t.variables().len(), 3);
    }

    #[test]
    fn test_parse_connective_precedence() {
        let t = parse_term("p -> q | r").unwrap();
        match t {
            Term::Connective(ConnectiveKind::Implies, _) => {}
            other => panic!("expected implication at top, got {}", other),
        }
    }

    #[test]
    fn test_parse_iff_not_split_as_implies() {
        let t = parse_term("p <-> q").unwrap();
        match t {
            Term::Connective(ConnectiveKind::Iff, _) => {}
            other => panic!("expected iff at top, got {}", other),
        }
    }

    #[test]
    fn test_parse_modal() {
        let t = parse_term("[]p -> p").unwrap();
        assert!(t.has_modality());
    }

    #[test]
    fn test_parse_quantified() {
        let t = parse_term("forall X. Mortal(X)").unwrap();
        assert!(t.has_quantifier());
        assert!(t.variables().is_empty());
    }

    #[test]
    fn test_parse_nested_function() {
        let t = parse_term("P(f(g(a),X))").unwrap();
        assert!(!t.is_ground());
        assert_eq!(t.size(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_arity() {
        let bad = Term::Connective(ConnectiveKind::And, vec![Term::atom("p", vec![])]);
        assert!(bad.validate(&SimpleTypeSystem).is_err());
    }

    #[test]
    fn test_validate_rejects_formula_argument() {
        let bad = Term::atom("P", vec![Term::atom("q", vec![])]);
        assert!(bad.validate(&SimpleTypeSystem).is_err());
    }

    #[test]
    fn test_display_roundtrip_parse() {
        let t = parse_term("(p & q) -> r").unwrap();
        let reparsed = parse_term(&format!("{}", t)).unwrap();
        assert_eq!(t, reparsed);
    }
}

//! entail - automated deductive inference engine
//!
//! A multi-strategy theorem prover over a shared typed term model. Goals and
//! premises are first-order formulas with optional modal operators and
//! finite-domain constraint atoms; the engine classifies each goal and
//! dispatches it to the strategy most likely to decide it.
//!
//! # Architecture
//!
//! - [`term`] - typed terms, connectives, quantifiers, the text parser
//! - [`unify`] - substitutions and Martelli-Montanari unification
//! - [`context`] - immutable premise snapshots and the [`context::KnowledgeStore`] trait
//! - [`proof`] - checkable [`ProofObject`]s with step-level justifications
//! - [`prover`] - the four strategies: resolution saturation, modal tableau,
//!   constraint logic programming, SMT delegation
//! - [`coordinator`] - goal classification, strategy ranking, dispatch
//! - [`config`] - TOML + environment configuration
//!
//! # Example
//!
//! ```rust
//! use entail::{Context, InferenceCoordinator, parse_term};
//!
//! let context = Context::parse(
//!     "At(john,home)\n\
//!      forall X. At(X,home) -> CanGoTo(X,home)\n",
//! )
//! .unwrap();
//! let goal = parse_term("CanGoTo(john,home)").unwrap();
//!
//! let mut coordinator = InferenceCoordinator::new();
//! let proof = coordinator.submit_goal(&goal, &context).unwrap();
//! assert!(proof.outcome.is_proved());
//! ```

pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod proof;
pub mod prover;
pub mod term;
pub mod unify;

pub use crate::config::EngineConfig;
pub use crate::context::{Context, KnowledgeStore, MemoryStore, SharedContext};
pub use crate::coordinator::{InferenceCoordinator, StrategyKnowledgeBase};
pub use crate::error::{ErrorCode, InferError, Result};
pub use crate::proof::{Justification, Outcome, ProofObject, ProofStep, TraceSink};
pub use crate::prover::{
    Budget, BudgetMeter, ClpProver, GoalProfile, ModalSystem, ModalTableauProver,
    ResolutionPolicy, ResolutionProver, SmtBackend, SmtStrategy, Strategy, StrategyKind,
};
pub use crate::term::{parse_term, Term, TypeSystem, TypeTag};
pub use crate::unify::{unify, Substitution};

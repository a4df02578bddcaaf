//! Programmable abuse-filter engine.
//!
//! Rules are configuration data: an ordered list of conditions plus one
//! action, loaded once and immutable during evaluation. Conditions are a
//! tagged AST rather than embedded executable config; named custom
//! predicates are resolved through a registry.

pub mod evaluator;
pub mod rules;

pub use evaluator::{evaluate, CustomPredicate, EvalInput, PredicateRegistry};
pub use rules::{
    default_rules, flood_scope_key, max_flood_window_secs, FilterAction, FilterCondition,
    FilterOutcome, FilterRule, FloodField, TextField,
};

//! stepsim-core: Amazon States Language definition model.
//!
//! Parses and validates state machine definitions and provides the syntax
//! layer shared by the evaluator:
//!
//! - [`StateMachine`] -- validated definition (per-variant field whitelists,
//!   transition graph checks, nested Map/Parallel machines)
//! - [`JsonPath`] -- the JSONPath subset used by the legacy dialect
//! - [`IntrinsicCall`] -- parsed `States.*` intrinsic functions
//! - [`jsonata`] -- lexer and parser for the JSONata subset
//!
//! Nothing here performs I/O or runs asynchronously.

pub mod definition;
pub mod error;
pub mod intrinsic;
pub mod jsonata;
pub mod path;

// ── Convenience re-exports ───────────────────────────────────────────

pub use definition::{
    Catcher, ChoiceRule, PathSetting, Retrier, State, StateKind, StateMachine, StateType,
    StateVariant, Transition,
};
pub use error::{DefinitionError, QueryLanguage, SyntaxError};
pub use intrinsic::{IntrinsicArg, IntrinsicCall};
pub use path::{JsonPath, PathRoot, Segment};

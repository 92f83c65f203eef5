//! Stream reading and expression evaluation for persisted Kunquat state.
//!
//! Two independent pieces live here: [`streader`] pulls typed values out of
//! the JSON-subset format used for composition/instrument/pattern state,
//! and [`expr`] evaluates the small expression language trigger arguments
//! and bind rule conditions are written in. `expr` reuses `streader`'s
//! number/string scanners so both layers agree on literal syntax.

mod expr;
mod streader;

pub use expr::{EmptyEnv, EvalError, EvalResult, Env, Evaluator, Value, STACK_DEPTH};
pub use streader::{JsonValue, Mark, StreamError, StreamResult, Streader};

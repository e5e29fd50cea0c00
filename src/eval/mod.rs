pub mod builtins;
pub mod expr;
pub mod for_expr;
pub mod scope;

pub use builtins::{create_registry, FuncArgs, FuncDef, FuncError, FunctionRegistry};
pub use expr::EvalContext;
pub use scope::Scope;

use crate::error::EvalError;
use crate::frontend::ast::Expr;
use crate::graph::Bindings;
use crate::value::Value;

/// Evaluate an expression that may only use literals, operators and pure builtins.
pub fn evaluate_constant(expr: &Expr) -> Result<Value, EvalError> {
    let bindings = Bindings::new();
    let functions = create_registry();
    EvalContext::new(&bindings, &functions).evaluate(expr)
}

use crate::error::EvalError;
use crate::eval::builtins::FunctionRegistry;
use crate::eval::for_expr;
use crate::eval::scope::Scope;
use crate::frontend::ast::{BinaryOp, Expr, SplatOp, TemplatePart, UnaryOp};
use crate::graph::{self, Bindings};
use crate::value::{coerce, Map, Value, ValueType};

/// Everything an expression can see while it is evaluated.
///
/// Cheap to build: the bindings and functions are borrowed, only the scope is owned.
#[derive(Clone)]
pub struct EvalContext<'a> {
    pub bindings: &'a Bindings,
    pub functions: &'a FunctionRegistry,
    pub scope: Scope,
}

impl<'a> EvalContext<'a> {
    pub fn new(bindings: &'a Bindings, functions: &'a FunctionRegistry) -> Self {
        Self {
            bindings,
            functions,
            scope: Scope::new(),
        }
    }

    pub fn with_scope(&self, scope: Scope) -> Self {
        Self {
            bindings: self.bindings,
            functions: self.functions,
            scope,
        }
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::List(items) => items
                .iter()
                .map(|e| self.evaluate(e))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Map(entries) => {
                let mut map = Map::new();
                for (k, v) in entries {
                    let key = map_key(&self.evaluate(k)?)?;
                    let value = self.evaluate(v)?;
                    if map.contains_key(&key) {
                        return Err(EvalError::DuplicateKey(key));
                    }
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            Expr::Reference(path) => self.resolve_reference(path),
            Expr::GetAttr { expr, name } => {
                let v = self.evaluate(expr)?;
                get_attr(&v, name).cloned()
            }
            Expr::Index { expr, key } => {
                let v = self.evaluate(expr)?;
                let k = self.evaluate(key)?;
                index(&v, &k).cloned()
            }
            Expr::Splat { expr, each } => self.splat(expr, each),
            Expr::FunctionCall {
                name,
                args,
                expand_final,
            } => {
                let mut values = args
                    .iter()
                    .map(|a| self.evaluate(a))
                    .collect::<Result<Vec<_>, _>>()?;
                if *expand_final {
                    match values.pop() {
                        Some(Value::List(rest)) => values.extend(rest),
                        Some(other) => {
                            return Err(EvalError::type_error(format!(
                                "cannot expand a {} into arguments of {name}(); expected a list",
                                other.kind()
                            )))
                        }
                        None => {}
                    }
                }
                self.functions.call(name, values)
            }
            Expr::Conditional {
                cond,
                true_expr,
                false_expr,
            } => {
                if self.condition(cond, "condition")? {
                    self.evaluate(true_expr)
                } else {
                    self.evaluate(false_expr)
                }
            }
            Expr::For(fe) => for_expr::evaluate_for(self, fe),
            Expr::Template(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => out.push_str(s),
                        TemplatePart::Interpolation(e) => {
                            out.push_str(&self.evaluate(e)?.to_template_string()?)
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expr::Unary { op, expr } => {
                let v = self.evaluate(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!as_bool(&v, "operand of !")?)),
                    UnaryOp::Neg => Ok(Value::Number(-as_number(&v, "operand of -")?)),
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
        }
    }

    /// Evaluate `expr` and require a bool, as used by conditionals, filters and validations.
    pub fn condition(&self, expr: &Expr, what: &str) -> Result<bool, EvalError> {
        as_bool(&self.evaluate(expr)?, what)
    }

    fn resolve_reference(&self, path: &[String]) -> Result<Value, EvalError> {
        let Some(root) = path.first() else {
            return Err(EvalError::UnresolvedReference(String::new()));
        };
        if let Some(v) = self.scope.lookup(root) {
            return traverse(v, &path[1..]).cloned();
        }
        let (addr, used) = graph::split_address(path)
            .ok_or_else(|| EvalError::UnresolvedReference(path.join(".")))?;
        let v = self
            .bindings
            .get(&addr)
            .ok_or(EvalError::UnresolvedReference(addr))?;
        traverse(v, &path[used..]).cloned()
    }

    fn splat(&self, expr: &Expr, each: &[SplatOp]) -> Result<Value, EvalError> {
        let items = match self.evaluate(expr)? {
            Value::Null => Vec::new(),
            Value::List(items) => items,
            other => vec![other],
        };
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let mut current = item;
            for op in each {
                current = match op {
                    SplatOp::GetAttr(name) => get_attr(&current, name)?.clone(),
                    SplatOp::Index(key) => index(&current, &self.evaluate(key)?)?.clone(),
                };
            }
            out.push(current);
        }
        Ok(Value::List(out))
    }

    fn binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        // `&&` and `||` only evaluate the right-hand side when it decides the result.
        match op {
            BinaryOp::And => {
                return Ok(Value::Bool(
                    self.condition(lhs, "left operand of &&")?
                        && self.condition(rhs, "right operand of &&")?,
                ))
            }
            BinaryOp::Or => {
                return Ok(Value::Bool(
                    self.condition(lhs, "left operand of ||")?
                        || self.condition(rhs, "right operand of ||")?,
                ))
            }
            _ => {}
        }
        let l = self.evaluate(lhs)?;
        let r = self.evaluate(rhs)?;
        let result = match op {
            BinaryOp::Eq => Value::Bool(l == r),
            BinaryOp::NotEq => Value::Bool(l != r),
            BinaryOp::Less | BinaryOp::LessEq | BinaryOp::Greater | BinaryOp::GreaterEq => {
                let a = as_number(&l, "left operand of comparison")?;
                let b = as_number(&r, "right operand of comparison")?;
                Value::Bool(match op {
                    BinaryOp::Less => a < b,
                    BinaryOp::LessEq => a <= b,
                    BinaryOp::Greater => a > b,
                    _ => a >= b,
                })
            }
            _ => {
                let a = as_number(&l, "left operand of arithmetic")?;
                let b = as_number(&r, "right operand of arithmetic")?;
                Value::Number(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
                        return Err(EvalError::type_error("division by zero"))
                    }
                    BinaryOp::Div => a / b,
                    _ => a % b,
                })
            }
        };
        Ok(result)
    }
}

fn as_bool(v: &Value, what: &str) -> Result<bool, EvalError> {
    if v.is_null() {
        return Err(EvalError::type_error(format!("{what} must be a bool, got null")));
    }
    match coerce(v, &ValueType::Bool) {
        Ok(Value::Bool(b)) => Ok(b),
        _ => Err(EvalError::type_error(format!(
            "{what} must be a bool, got {}",
            v.kind()
        ))),
    }
}

fn as_number(v: &Value, what: &str) -> Result<f64, EvalError> {
    match coerce(v, &ValueType::Number) {
        Ok(Value::Number(n)) => Ok(n),
        _ => Err(EvalError::type_error(format!(
            "{what} must be a number, got {}",
            v.kind()
        ))),
    }
}

/// Map keys may be strings, or numbers and bools converted to strings.
pub(crate) fn map_key(v: &Value) -> Result<String, EvalError> {
    match v {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => v.to_template_string(),
        other => Err(EvalError::type_error(format!(
            "map key must be a string, got {}",
            other.kind()
        ))),
    }
}

fn traverse<'v>(value: &'v Value, path: &[String]) -> Result<&'v Value, EvalError> {
    path.iter().try_fold(value, |v, name| get_attr(v, name))
}

/// `value.name`
pub fn get_attr<'v>(value: &'v Value, name: &str) -> Result<&'v Value, EvalError> {
    match value {
        Value::Map(map) => map
            .get(name)
            .ok_or_else(|| EvalError::MissingKey(name.to_string())),
        Value::Null => Err(EvalError::type_error(format!(
            "cannot access attribute '{name}' on a null value"
        ))),
        other => Err(EvalError::type_error(format!(
            "cannot access attribute '{name}' on a {}",
            other.kind()
        ))),
    }
}

/// `value[key]`
pub fn index<'v>(value: &'v Value, key: &Value) -> Result<&'v Value, EvalError> {
    match value {
        Value::List(items) => {
            let i = match coerce(key, &ValueType::Number)? {
                Value::Number(n) if n.fract() == 0.0 => n as i64,
                _ => {
                    return Err(EvalError::type_error(format!(
                        "list index must be a whole number, got {key}"
                    )))
                }
            };
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or(EvalError::IndexOutOfRange {
                    index: i,
                    len: items.len(),
                })
        }
        Value::Map(map) => {
            let k = map_key(key)?;
            map.get(&k).ok_or(EvalError::MissingKey(k))
        }
        other => Err(EvalError::type_error(format!(
            "cannot index into a {}",
            other.kind()
        ))),
    }
}

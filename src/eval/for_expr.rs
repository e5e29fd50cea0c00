//! `for` expressions: `[for v in coll : expr if cond]` and `{for k, v in coll : key => value}`.
use crate::error::EvalError;
use crate::eval::expr::{map_key, EvalContext};
use crate::frontend::ast::{Expr, ForExpr};
use crate::value::{Map, Value};

pub fn evaluate_for(ctx: &EvalContext<'_>, fe: &ForExpr) -> Result<Value, EvalError> {
    let collection = ctx.evaluate(&fe.collection)?;
    eval_for_expr(
        ctx,
        &collection,
        fe.key_var.as_deref(),
        &fe.value_var,
        fe.key_expr.as_ref(),
        &fe.value_expr,
        fe.cond.as_ref(),
        fe.grouping,
    )
}

/// Iterate `collection` (lists in order, maps in sorted-key order), bind the loop variables in
/// a fresh scope per element, filter, and build either a list or a map.
///
/// In map form duplicate keys fail with [`EvalError::DuplicateKey`] unless `grouping` is set,
/// in which case values sharing a key are collected into a list.
#[allow(clippy::too_many_arguments)]
pub fn eval_for_expr(
    ctx: &EvalContext<'_>,
    collection: &Value,
    key_var: Option<&str>,
    value_var: &str,
    key_expr: Option<&Expr>,
    value_expr: &Expr,
    cond: Option<&Expr>,
    grouping: bool,
) -> Result<Value, EvalError> {
    let entries: Vec<(Value, &Value)> = match collection {
        Value::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (Value::from(i), v))
            .collect(),
        Value::Map(map) => map.iter().map(|(k, v)| (Value::from(k.as_str()), v)).collect(),
        Value::Null => {
            return Err(EvalError::type_error(
                "for expression cannot iterate over a null value",
            ))
        }
        other => {
            return Err(EvalError::type_error(format!(
                "for expression collection must be a list or map, got {}",
                other.kind()
            )))
        }
    };

    let mut list_out = Vec::new();
    let mut map_out = Map::new();
    for (key, value) in entries {
        let mut scope = ctx.scope.with_var(value_var, value.clone());
        if let Some(kv) = key_var {
            scope = scope.with_var(kv, key);
        }
        let iter_ctx = ctx.with_scope(scope);

        if let Some(cond) = cond {
            if !iter_ctx.condition(cond, "for expression condition")? {
                continue;
            }
        }

        let item = iter_ctx.evaluate(value_expr)?;
        match key_expr {
            None => list_out.push(item),
            Some(key_expr) => {
                let k = map_key(&iter_ctx.evaluate(key_expr)?)?;
                if grouping {
                    if let Value::List(group) =
                        map_out.entry(k).or_insert_with(|| Value::List(Vec::new()))
                    {
                        group.push(item);
                    }
                } else if map_out.contains_key(&k) {
                    return Err(EvalError::DuplicateKey(k));
                } else {
                    map_out.insert(k, item);
                }
            }
        }
    }

    Ok(if key_expr.is_some() {
        Value::Map(map_out)
    } else {
        Value::List(list_out)
    })
}

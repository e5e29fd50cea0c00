use crate::error::EvalError;
use crate::frontend::ast::{BlockRef, Config, Expr, ResourceBlock};
use crate::graph::{walk_body_references, walk_free_references};

/// Static checks that need no evaluation.
///
/// - `count` and `for_each` on the same resource
/// - `each.*` outside a `for_each` resource, `count.*` outside a `count` resource
/// - references in a variable default
/// - `depends_on` entries that are not plain references
pub fn validate(cfg: &Config) -> Result<(), EvalError> {
    for (addr, block) in cfg.blocks() {
        check_block(block).map_err(|e| e.in_block(addr))?;
    }
    Ok(())
}

fn check_block(block: BlockRef<'_>) -> Result<(), EvalError> {
    match block {
        BlockRef::Variable(v) => {
            if let Some(default) = &v.default {
                let mut found = None;
                walk_free_references(default, &mut |path| {
                    found.get_or_insert_with(|| path.join("."));
                });
                if let Some(reference) = found {
                    return Err(EvalError::Variable {
                        name: v.name.clone(),
                        message: format!("default must be a constant, found reference '{reference}'"),
                    });
                }
            }
            for val in &v.validations {
                no_instance_roots(&val.condition)?;
                no_instance_roots(&val.error_message)?;
            }
            Ok(())
        }
        BlockRef::Local(e) => no_instance_roots(e),
        BlockRef::Output(o) => no_instance_roots(&o.value),
        BlockRef::Resource(r) => check_resource(r),
    }
}

fn check_resource(r: &ResourceBlock) -> Result<(), EvalError> {
    if r.count.is_some() && r.for_each.is_some() {
        return Err(EvalError::Expansion(
            "count and for_each cannot be used together".into(),
        ));
    }
    for e in r.count.iter().chain(r.for_each.iter()) {
        no_instance_roots(e)?;
    }
    for e in &r.depends_on {
        if !matches!(e, Expr::Reference(_)) {
            return Err(EvalError::Expansion(
                "depends_on entries must be references to other blocks".into(),
            ));
        }
    }

    let mut err = None;
    walk_body_references(&r.body, &mut |path| {
        if err.is_some() {
            return;
        }
        err = match path.first().map(String::as_str) {
            Some("each") if r.for_each.is_none() => Some(EvalError::Expansion(
                "'each' can only be used in a resource with for_each".into(),
            )),
            Some("count") if r.count.is_none() => Some(EvalError::Expansion(
                "'count' can only be used in a resource with count".into(),
            )),
            Some("self") => Some(unsupported_self()),
            _ => None,
        };
    });
    err.map_or(Ok(()), Err)
}

/// `each` and `count` only exist inside an expanded resource body.
fn no_instance_roots(expr: &Expr) -> Result<(), EvalError> {
    let mut err = None;
    walk_free_references(expr, &mut |path| {
        if err.is_none() {
            err = match path.first().map(String::as_str) {
                Some(root @ ("each" | "count")) => Some(EvalError::Expansion(format!(
                    "'{root}' can only be used inside a resource body"
                ))),
                Some("self") => Some(unsupported_self()),
                _ => None,
            };
        }
    });
    err.map_or(Ok(()), Err)
}

fn unsupported_self() -> EvalError {
    EvalError::Expansion("'self' references are not supported".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeclarationPolicy;
    use crate::frontend::parse_config;

    fn check(src: &str) -> Result<(), EvalError> {
        validate(&parse_config(src, RedeclarationPolicy::LastWins).unwrap())
    }

    #[test]
    fn accepts_a_well_formed_configuration() {
        check(
            r#"
variable "names" {
  default = ["neo"]
}

resource "aws_iam_user" "by_index" {
  count = length(var.names)
  name  = var.names[count.index]
}

resource "aws_iam_user" "by_name" {
  for_each   = toset(var.names)
  name       = each.value
  depends_on = [aws_iam_user.by_index]

  dynamic "tag" {
    for_each = { team = "a" }
    content {
      key = tag.key
    }
  }
}

output "upper" {
  value = [for each in var.names : upper(each)]
}
"#,
        )
        .unwrap();
    }

    #[test]
    fn rejects_count_with_for_each() {
        let err = check("resource \"a\" \"b\" {\n  count = 1\n  for_each = {}\n}\n").unwrap_err();
        assert!(matches!(err.root(), EvalError::Expansion(_)));
        assert!(err.to_string().starts_with("a.b: "), "{err}");
    }

    #[test]
    fn rejects_each_and_count_outside_their_resources() {
        for src in [
            "resource \"a\" \"b\" {\n  name = each.key\n}\n",
            "resource \"a\" \"b\" {\n  for_each = {}\n  name = count.index\n}\n",
            "locals {\n  x = each.value\n}\n",
            "output \"o\" {\n  value = count.index\n}\n",
            "resource \"a\" \"b\" {\n  count = count.index\n}\n",
        ] {
            let err = check(src).unwrap_err();
            assert!(matches!(err.root(), EvalError::Expansion(_)), "{src}: {err}");
        }
    }

    #[test]
    fn rejects_references_in_variable_defaults() {
        let err = check("variable \"a\" {\n  default = local.x\n}\n").unwrap_err();
        assert!(matches!(err.root(), EvalError::Variable { name, .. } if name == "a"));
    }

    #[test]
    fn rejects_non_reference_depends_on() {
        let err = check("resource \"a\" \"b\" {\n  depends_on = [\"x\"]\n}\n").unwrap_err();
        assert!(matches!(err.root(), EvalError::Expansion(_)));
    }
}

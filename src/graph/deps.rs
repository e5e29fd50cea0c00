use std::collections::{BTreeSet, HashMap};

use crate::error::EvalError;
use crate::frontend::ast::{Body, BlockRef, Config, Expr, NestedBlock, SplatOp, TemplatePart};
use crate::graph::split_address;

/// What the expression walker reports.
#[derive(Debug, Clone, Copy)]
enum Node<'e> {
    Reference(&'e [String]),
    Call(&'e str),
}

/// Every binding address `expr` can read. Names bound by enclosing `for` expressions and the
/// scope roots (`each`, `count`, `path`, `self`) are not addresses and are left out.
pub fn references(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk_free_references(expr, &mut |path| insert_address(path, &mut out));
    out
}

fn insert_address(path: &[String], out: &mut BTreeSet<String>) {
    if let Some((addr, _)) = split_address(path) {
        out.insert(addr);
    }
}

/// Call `f` with every reference path in `expr` whose root is not bound by an enclosing `for`
/// expression or dynamic block iterator.
pub fn walk_free_references(expr: &Expr, f: &mut impl FnMut(&[String])) {
    walk(expr, &mut Vec::new(), &mut |node| {
        if let Node::Reference(path) = node {
            f(path)
        }
    });
}

/// Like [`walk_free_references`], over every attribute and nested block of a body.
pub fn walk_body_references(body: &Body, f: &mut impl FnMut(&[String])) {
    walk_body(body, &mut Vec::new(), &mut |node| {
        if let Node::Reference(path) = node {
            f(path)
        }
    });
}

fn walk<'e>(expr: &'e Expr, bound: &mut Vec<String>, f: &mut impl FnMut(Node<'e>)) {
    match expr {
        Expr::Literal(_) => {}
        Expr::List(items) => {
            for e in items {
                walk(e, bound, f);
            }
        }
        Expr::Map(entries) => {
            for (k, v) in entries {
                walk(k, bound, f);
                walk(v, bound, f);
            }
        }
        Expr::Reference(path) => {
            if path.first().is_some_and(|root| !bound.contains(root)) {
                f(Node::Reference(path));
            }
        }
        Expr::GetAttr { expr, .. } => walk(expr, bound, f),
        Expr::Index { expr, key } => {
            walk(expr, bound, f);
            walk(key, bound, f);
        }
        Expr::Splat { expr, each } => {
            walk(expr, bound, f);
            for op in each {
                if let SplatOp::Index(key) = op {
                    walk(key, bound, f);
                }
            }
        }
        Expr::FunctionCall { name, args, .. } => {
            f(Node::Call(name));
            for e in args {
                walk(e, bound, f);
            }
        }
        Expr::Conditional {
            cond,
            true_expr,
            false_expr,
        } => {
            walk(cond, bound, f);
            walk(true_expr, bound, f);
            walk(false_expr, bound, f);
        }
        Expr::For(fe) => {
            walk(&fe.collection, bound, f);
            let depth = bound.len();
            bound.extend(fe.key_var.iter().cloned());
            bound.push(fe.value_var.clone());
            if let Some(k) = &fe.key_expr {
                walk(k, bound, f);
            }
            walk(&fe.value_expr, bound, f);
            if let Some(c) = &fe.cond {
                walk(c, bound, f);
            }
            bound.truncate(depth);
        }
        Expr::Template(parts) => {
            for part in parts {
                if let TemplatePart::Interpolation(e) = part {
                    walk(e, bound, f);
                }
            }
        }
        Expr::Unary { expr, .. } => walk(expr, bound, f),
        Expr::Binary { lhs, rhs, .. } => {
            walk(lhs, bound, f);
            walk(rhs, bound, f);
        }
    }
}

fn walk_body<'e>(body: &'e Body, bound: &mut Vec<String>, f: &mut impl FnMut(Node<'e>)) {
    for expr in body.attributes.values() {
        walk(expr, bound, f);
    }
    for block in &body.blocks {
        match block {
            NestedBlock::Static { body, .. } => walk_body(body, bound, f),
            NestedBlock::Dynamic {
                for_each,
                iterator,
                content,
                ..
            } => {
                walk(for_each, bound, f);
                bound.push(iterator.clone());
                walk_body(content, bound, f);
                bound.pop();
            }
        }
    }
}

/// Addresses a block reads, excluding itself.
pub fn block_dependencies(address: &str, block: BlockRef<'_>) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    walk_block(block, &mut |node| {
        if let Node::Reference(path) = node {
            insert_address(path, &mut out);
        }
    });
    out.remove(address);
    out
}

/// Whether any expression of the block calls the function `name`.
pub fn block_calls(block: BlockRef<'_>, name: &str) -> bool {
    let mut found = false;
    walk_block(block, &mut |node| {
        if matches!(node, Node::Call(n) if n == name) {
            found = true;
        }
    });
    found
}

fn walk_block<'e>(block: BlockRef<'e>, f: &mut impl FnMut(Node<'e>)) {
    let mut bound = Vec::new();
    match block {
        BlockRef::Variable(v) => {
            for e in v.default.iter() {
                walk(e, &mut bound, f);
            }
            for val in &v.validations {
                walk(&val.condition, &mut bound, f);
                walk(&val.error_message, &mut bound, f);
            }
        }
        BlockRef::Local(e) => walk(e, &mut bound, f),
        BlockRef::Resource(r) => {
            for e in r.count.iter().chain(r.for_each.iter()).chain(r.depends_on.iter()) {
                walk(e, &mut bound, f);
            }
            walk_body(&r.body, &mut bound, f);
        }
        BlockRef::Output(o) => walk(&o.value, &mut bound, f),
    }
}

/// Order blocks so every block comes after the blocks it references.
///
/// Kahn's algorithm; among blocks that are ready at the same time the one declared first goes
/// first. References to addresses no block declares add no edge.
pub fn evaluation_order(config: &Config) -> Result<Vec<String>, EvalError> {
    let blocks = config.blocks();
    let index: HashMap<&str, usize> = blocks
        .iter()
        .enumerate()
        .map(|(i, (addr, _))| (addr.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; blocks.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); blocks.len()];
    for (i, (addr, block)) in blocks.iter().enumerate() {
        for dep in block_dependencies(addr, *block) {
            if let Some(&j) = index.get(dep.as_str()) {
                dependents[j].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| i)
        .collect();
    let mut order = Vec::with_capacity(blocks.len());
    while let Some(i) = ready.pop_first() {
        order.push(blocks[i].0.clone());
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() != blocks.len() {
        let remaining = blocks
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, (addr, _))| addr.clone())
            .collect();
        return Err(EvalError::CyclicDependency(remaining));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeclarationPolicy;
    use crate::frontend::{parse_config, parse_expr};
    use pretty_assertions::assert_eq;

    fn refs(src: &str) -> Vec<String> {
        references(&parse_expr(src).unwrap()).into_iter().collect()
    }

    #[test]
    fn collects_addresses_not_attribute_paths() {
        assert_eq!(
            refs("\"${aws_iam_user.example[0].name}-${var.suffix}\""),
            vec!["aws_iam_user.example", "var.suffix"]
        );
        assert_eq!(refs("data.aws_ami.ubuntu.id"), vec!["data.aws_ami.ubuntu"]);
    }

    #[test]
    fn loop_variables_are_not_references() {
        assert_eq!(
            refs("[for name in var.names : upper(name) if name != local.skip]"),
            vec!["local.skip", "var.names"]
        );
        assert_eq!(refs("{for k, v in var.m : k => v.id}"), vec!["var.m"]);
        assert!(refs("each.value").is_empty());
        assert!(refs("count.index + 1").is_empty());
    }

    #[test]
    fn loop_variables_only_shadow_inside_the_loop() {
        // `name` after the comprehension is a resource type, not the loop variable.
        assert_eq!(
            refs("concat([for name in [] : name], [name.x])"),
            vec!["name.x"]
        );
    }

    #[test]
    fn orders_by_dependency_then_declaration() {
        let cfg = parse_config(
            r#"
output "names" {
  value = aws_iam_user.example[*].name
}

resource "aws_iam_user" "example" {
  count = length(var.user_names)
  name  = var.user_names[count.index]
}

variable "user_names" {
  default = ["neo"]
}

locals {
  unused = 1
}
"#,
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        assert_eq!(
            evaluation_order(&cfg).unwrap(),
            vec![
                "var.user_names",
                "local.unused",
                "aws_iam_user.example",
                "output.names"
            ]
        );
    }

    #[test]
    fn detects_cycles() {
        let cfg = parse_config(
            "locals {\n  a = local.b\n  b = local.a\n  c = 1\n}\n",
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        match evaluation_order(&cfg) {
            Err(EvalError::CyclicDependency(blocks)) => {
                assert_eq!(blocks, vec!["local.a", "local.b"])
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_references_add_no_edges() {
        let cfg = parse_config("locals {\n  a = var.nope\n}\n", RedeclarationPolicy::LastWins)
            .unwrap();
        assert_eq!(evaluation_order(&cfg).unwrap(), vec!["local.a"]);
    }

    #[test]
    fn dynamic_iterators_and_depends_on() {
        let cfg = parse_config(
            r#"
resource "aws_instance" "web" {
  depends_on = [aws_iam_user.admin]
  dynamic "tag" {
    for_each = local.tags
    content {
      key = tag.key
    }
  }
}
"#,
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        let deps = block_dependencies(
            "aws_instance.web",
            BlockRef::Resource(&cfg.resources["aws_instance.web"]),
        );
        assert_eq!(
            deps.into_iter().collect::<Vec<_>>(),
            vec!["aws_iam_user.admin", "local.tags"]
        );
    }
}

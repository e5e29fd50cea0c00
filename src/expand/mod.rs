//! Expansion of `resource` and `data` blocks into concrete instances.
use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::Serialize;

use crate::error::EvalError;
use crate::eval::expr::map_key;
use crate::eval::EvalContext;
use crate::frontend::ast::{Body, NestedBlock, ResourceBlock, ResourceMode};
use crate::graph::Binding;
use crate::value::{coerce, Map, Value, ValueType};

/// Which instance of a resource this is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum InstanceKey {
    /// Neither `count` nor `for_each`.
    None,
    /// From `count`.
    Index(usize),
    /// From `for_each`.
    Key(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::None => Ok(()),
            InstanceKey::Index(i) => write!(f, "[{i}]"),
            InstanceKey::Key(k) => write!(f, "[{k:?}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceInstance {
    pub mode: ResourceMode,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    pub key: InstanceKey,
    pub attributes: Map,
}

impl ResourceInstance {
    /// `aws_iam_user.example[0]`, `aws_iam_user.example["neo"]` or `aws_iam_user.example`.
    pub fn address(&self) -> String {
        format!("{}{}", self.block_address(), self.key)
    }

    /// Address of the block this instance was expanded from, without the instance key.
    pub fn block_address(&self) -> String {
        match self.mode {
            ResourceMode::Managed => format!("{}.{}", self.resource_type, self.name),
            ResourceMode::Data => format!("data.{}.{}", self.resource_type, self.name),
        }
    }
}

/// Expand a resource block into its instances.
///
/// `count` gives instances keyed `0..N`, `for_each` one instance per entry in key order, and a
/// block with neither exactly one instance.
pub fn expand(block: &ResourceBlock, ctx: &EvalContext<'_>) -> Result<Vec<ResourceInstance>, EvalError> {
    let instance = |key: InstanceKey, ctx: &EvalContext<'_>| -> Result<ResourceInstance, EvalError> {
        let attributes = evaluate_body(&block.body, ctx)?;
        let inst = ResourceInstance {
            mode: block.mode,
            resource_type: block.resource_type.clone(),
            name: block.name.clone(),
            key,
            attributes,
        };
        debug!("expanded {}", inst.address());
        Ok(inst)
    };

    match (&block.count, &block.for_each) {
        (Some(_), Some(_)) => Err(EvalError::Expansion(format!(
            "{}: count and for_each cannot be used together",
            block.address()
        ))),
        (Some(count), None) => {
            let n = count_value(&ctx.evaluate(count)?)?;
            (0..n)
                .map(|i| instance(InstanceKey::Index(i), &ctx.with_scope(ctx.scope.with_count(i))))
                .collect()
        }
        (None, Some(for_each)) => for_each_entries(&ctx.evaluate(for_each)?)?
            .into_iter()
            .map(|(k, v)| {
                let scope = ctx.scope.with_each(Value::from(k.as_str()), v);
                instance(InstanceKey::Key(k), &ctx.with_scope(scope))
            })
            .collect(),
        (None, None) => Ok(vec![instance(InstanceKey::None, ctx)?]),
    }
}

/// Largest `count` a resource may expand to.
pub const MAX_COUNT: i64 = 100_000;

fn count_value(v: &Value) -> Result<usize, EvalError> {
    if v.is_null() {
        return Err(EvalError::InvalidCount("count must not be null".into()));
    }
    let n = coerce(v, &ValueType::Number)
        .map_err(|_| EvalError::InvalidCount(format!("expected a number, got {}", v.kind())))?;
    match n.as_i64() {
        Some(i) if i > MAX_COUNT => Err(EvalError::InvalidCount(format!(
            "count {i} exceeds the limit of {MAX_COUNT} instances"
        ))),
        Some(i) if i >= 0 => Ok(i as usize),
        _ => Err(EvalError::InvalidCount(format!(
            "expected a whole number >= 0, got {n}"
        ))),
    }
}

/// Normalize a `for_each` value to key → value. A map is used as is; a list is a set of
/// strings whose elements are both key and value.
fn for_each_entries(v: &Value) -> Result<BTreeMap<String, Value>, EvalError> {
    match v {
        Value::Map(map) => Ok(map.clone()),
        Value::List(items) => {
            let mut out = BTreeMap::new();
            for item in items {
                let key = match item {
                    Value::String(s) => s.clone(),
                    Value::Number(_) | Value::Bool(_) => map_key(item)?,
                    other => {
                        return Err(EvalError::type_error(format!(
                            "for_each set elements must be strings, got {}",
                            other.kind()
                        )))
                    }
                };
                if out.contains_key(&key) {
                    return Err(EvalError::DuplicateKey(key));
                }
                out.insert(key.clone(), Value::String(key));
            }
            Ok(out)
        }
        other => Err(EvalError::type_error(format!(
            "for_each must be a map or a set of strings, got {}",
            other.kind()
        ))),
    }
}

/// Evaluate a block body: attributes plus nested blocks gathered into lists under their type.
pub fn evaluate_body(body: &Body, ctx: &EvalContext<'_>) -> Result<Map, EvalError> {
    let mut out = Map::new();
    for (name, expr) in &body.attributes {
        out.insert(name.clone(), ctx.evaluate(expr)?);
    }
    let mut nested: BTreeMap<&str, Vec<Value>> = BTreeMap::new();
    for block in &body.blocks {
        match block {
            NestedBlock::Static { kind, body } => {
                nested
                    .entry(kind.as_str())
                    .or_default()
                    .push(Value::Map(evaluate_body(body, ctx)?));
            }
            NestedBlock::Dynamic {
                kind,
                for_each,
                iterator,
                content,
            } => {
                let items = nested.entry(kind.as_str()).or_default();
                for (key, value) in dynamic_entries(&ctx.evaluate(for_each)?)? {
                    let scope = ctx.scope.with_iterator(iterator, key, value);
                    items.push(Value::Map(evaluate_body(content, &ctx.with_scope(scope))?));
                }
            }
        }
    }
    for (kind, blocks) in nested {
        if out.contains_key(kind) {
            return Err(EvalError::Expansion(format!(
                "'{kind}' is used both as an attribute and as a block type"
            )));
        }
        out.insert(kind.to_string(), Value::List(blocks));
    }
    Ok(out)
}

/// Lists iterate with their index as key, maps in key order.
fn dynamic_entries(v: &Value) -> Result<Vec<(Value, Value)>, EvalError> {
    match v {
        Value::List(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, item)| (Value::from(i), item.clone()))
            .collect()),
        Value::Map(map) => Ok(map
            .iter()
            .map(|(k, item)| (Value::from(k.as_str()), item.clone()))
            .collect()),
        other => Err(EvalError::type_error(format!(
            "dynamic block for_each must be a list or map, got {}",
            other.kind()
        ))),
    }
}

/// The value references to a resource see: a list for `count`, a map for `for_each`, the
/// attribute map for a singleton.
pub fn resource_binding(block: &ResourceBlock, instances: Vec<ResourceInstance>) -> Binding {
    let value = if block.count.is_some() {
        Value::List(instances.iter().map(|i| Value::Map(i.attributes.clone())).collect())
    } else if block.for_each.is_some() {
        Value::Map(
            instances
                .iter()
                .filter_map(|i| match &i.key {
                    InstanceKey::Key(k) => Some((k.clone(), Value::Map(i.attributes.clone()))),
                    _ => None,
                })
                .collect(),
        )
    } else {
        instances
            .first()
            .map(|i| Value::Map(i.attributes.clone()))
            .unwrap_or_default()
    };
    Binding::Resource { instances, value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeclarationPolicy;
    use crate::eval::create_registry;
    use crate::frontend::parse_config;
    use crate::graph::Bindings;
    use pretty_assertions::assert_eq;

    fn expand_src(src: &str, addr: &str) -> Result<Vec<ResourceInstance>, EvalError> {
        let cfg = parse_config(src, RedeclarationPolicy::LastWins).unwrap();
        let bindings = Bindings::new();
        let funcs = create_registry();
        let block = cfg.resource(addr).unwrap();
        expand(block, &EvalContext::new(&bindings, &funcs))
    }

    fn names(instances: &[ResourceInstance]) -> Vec<String> {
        instances.iter().map(ResourceInstance::address).collect()
    }

    #[test]
    fn count_instances_are_indexed() {
        let got = expand_src(
            r#"
resource "aws_iam_user" "example" {
  count = 3
  name  = "user-${count.index}"
}
"#,
            "aws_iam_user.example",
        )
        .unwrap();
        assert_eq!(
            names(&got),
            vec![
                "aws_iam_user.example[0]",
                "aws_iam_user.example[1]",
                "aws_iam_user.example[2]"
            ]
        );
        assert_eq!(got[2].attributes["name"], Value::from("user-2"));
        assert_eq!(got[2].key, InstanceKey::Index(2));
    }

    #[test]
    fn count_zero_and_invalid_counts() {
        let zero = expand_src(
            "resource \"a\" \"b\" {\n  count = 0\n}\n",
            "a.b",
        )
        .unwrap();
        assert!(zero.is_empty());

        for bad in ["-1", "1.5", "\"x\"", "null", "[1]", "1e15", "100001"] {
            let err = expand_src(&format!("resource \"a\" \"b\" {{\n  count = {bad}\n}}\n"), "a.b")
                .unwrap_err();
            assert!(matches!(err, EvalError::InvalidCount(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn for_each_over_a_set_keys_by_element() {
        let got = expand_src(
            r#"
resource "aws_iam_user" "example" {
  for_each = toset(["neo", "trinity", "morpheus"])
  name     = each.value
}
"#,
            "aws_iam_user.example",
        )
        .unwrap();
        assert_eq!(
            names(&got),
            vec![
                "aws_iam_user.example[\"morpheus\"]",
                "aws_iam_user.example[\"neo\"]",
                "aws_iam_user.example[\"trinity\"]"
            ]
        );
        assert_eq!(got[1].attributes["name"], Value::from("neo"));
    }

    #[test]
    fn for_each_list_elements_convert_to_string_keys() {
        let got = expand_src(
            "resource \"a\" \"b\" {\n  for_each = [\"x\", 1, true]\n  v = each.value\n}\n",
            "a.b",
        )
        .unwrap();
        assert_eq!(names(&got), vec!["a.b[\"1\"]", "a.b[\"true\"]", "a.b[\"x\"]"]);
        assert_eq!(got[0].attributes["v"], Value::from("1"));

        let err = expand_src("resource \"a\" \"b\" {\n  for_each = [1, \"1\"]\n}\n", "a.b")
            .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateKey(k) if k == "1"));
        let err = expand_src("resource \"a\" \"b\" {\n  for_each = [null]\n}\n", "a.b")
            .unwrap_err();
        assert!(matches!(err, EvalError::Type(_)), "{err}");
    }

    #[test]
    fn for_each_over_a_map_binds_key_and_value() {
        let got = expand_src(
            r#"
resource "user" "u" {
  for_each = { b = "admin", a = "dev" }
  label    = "${each.key}:${each.value}"
}
"#,
            "user.u",
        )
        .unwrap();
        let labels: Vec<_> = got.iter().map(|i| i.attributes["label"].clone()).collect();
        assert_eq!(labels, vec![Value::from("a:dev"), Value::from("b:admin")]);
    }

    #[test]
    fn for_each_list_must_be_unique() {
        let err = expand_src(
            "resource \"a\" \"b\" {\n  for_each = [\"x\", \"x\"]\n}\n",
            "a.b",
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::DuplicateKey(k) if k == "x"));
    }

    #[test]
    fn count_and_for_each_together_fail() {
        let err = expand_src(
            "resource \"a\" \"b\" {\n  count = 1\n  for_each = {}\n}\n",
            "a.b",
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::Expansion(_)));
    }

    #[test]
    fn dynamic_blocks_expand_into_lists() {
        let got = expand_src(
            r#"
resource "aws_autoscaling_group" "example" {
  name = "asg"

  tag {
    key   = "static"
    value = "1"
  }

  dynamic "tag" {
    for_each = { Name = "web", Team = "infra" }
    iterator = t
    content {
      key   = t.key
      value = t.value
    }
  }
}
"#,
            "aws_autoscaling_group.example",
        )
        .unwrap();
        let tags = got[0].attributes["tag"].as_list().unwrap();
        let keys: Vec<_> = tags.iter().map(|t| t.as_map().unwrap()["key"].clone()).collect();
        assert_eq!(
            keys,
            vec![Value::from("static"), Value::from("Name"), Value::from("Team")]
        );
    }

    #[test]
    fn nested_dynamic_blocks_see_outer_iterators() {
        let got = expand_src(
            r#"
resource "r" "x" {
  dynamic "rule" {
    for_each = ["a", "b"]
    content {
      dynamic "port" {
        for_each = [80]
        content {
          id = "${rule.value}-${port.value}"
        }
      }
    }
  }
}
"#,
            "r.x",
        )
        .unwrap();
        let rules = got[0].attributes["rule"].as_list().unwrap();
        let id = |i: usize| {
            rules[i].as_map().unwrap()["port"].as_list().unwrap()[0]
                .as_map()
                .unwrap()["id"]
                .clone()
        };
        assert_eq!(id(0), Value::from("a-80"));
        assert_eq!(id(1), Value::from("b-80"));
    }

    #[test]
    fn binding_shapes() {
        let cfg = parse_config(
            r#"
resource "a" "counted" {
  count = 2
  n = count.index
}
resource "a" "keyed" {
  for_each = toset(["k"])
  n = each.key
}
resource "a" "single" {
  n = 1
}
"#,
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        let bindings = Bindings::new();
        let funcs = create_registry();
        let ctx = EvalContext::new(&bindings, &funcs);
        let bind = |addr: &str| {
            let block = cfg.resource(addr).unwrap();
            resource_binding(block, expand(block, &ctx).unwrap())
                .value()
                .clone()
        };
        assert_eq!(bind("a.counted").as_list().unwrap().len(), 2);
        assert_eq!(
            bind("a.keyed").as_map().unwrap()["k"].as_map().unwrap()["n"],
            Value::from("k")
        );
        assert_eq!(bind("a.single").as_map().unwrap()["n"], Value::from(1i64));
    }
}

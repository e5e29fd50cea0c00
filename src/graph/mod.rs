//! The binding table and the dependency graph between blocks.
pub mod deps;

use std::collections::BTreeMap;

use crate::error::EvalError;
use crate::expand::ResourceInstance;
use crate::value::Value;

pub use deps::{
    block_calls, block_dependencies, evaluation_order, references, walk_body_references,
    walk_free_references,
};

/// What an address is bound to once its block has been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Value(Value),
    /// An expanded resource: its instances plus the value references see
    /// (list for `count`, map for `for_each`, attribute map for a singleton).
    Resource {
        instances: Vec<ResourceInstance>,
        value: Value,
    },
}

impl Binding {
    pub fn value(&self) -> &Value {
        match self {
            Binding::Value(v) => v,
            Binding::Resource { value, .. } => value,
        }
    }
}

/// Address to binding. Write-once: every address is bound at most once per pass.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: BTreeMap<String, Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: impl Into<String>, binding: Binding) -> Result<(), EvalError> {
        let address = address.into();
        if self.entries.contains_key(&address) {
            return Err(EvalError::AlreadyBound(address));
        }
        self.entries.insert(address, binding);
        Ok(())
    }

    pub fn get(&self, address: &str) -> Option<&Value> {
        self.entries.get(address).map(Binding::value)
    }

    pub fn binding(&self, address: &str) -> Option<&Binding> {
        self.entries.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains_key(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Names that are never block addresses.
pub(crate) const SCOPE_ROOTS: &[&str] = &["each", "count", "path", "self"];

/// Split a reference path into the binding address it reads and the number of segments that
/// address uses: `var.N` and `local.N` take two, `data.T.N` three, any other `T.N` two.
pub fn split_address(path: &[String]) -> Option<(String, usize)> {
    let root = path.first()?;
    let needed = match root.as_str() {
        "var" | "local" => 2,
        "data" => 3,
        r if SCOPE_ROOTS.contains(&r) => return None,
        _ => 2,
    };
    (path.len() >= needed).then(|| (path[..needed].join("."), needed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('.').map(String::from).collect()
    }

    #[test]
    fn bindings_are_write_once() {
        let mut b = Bindings::new();
        b.insert("var.a", Binding::Value(Value::from(1i64))).unwrap();
        assert!(matches!(
            b.insert("var.a", Binding::Value(Value::from(2i64))),
            Err(EvalError::AlreadyBound(a)) if a == "var.a"
        ));
        assert_eq!(b.get("var.a"), Some(&Value::from(1i64)));
    }

    #[test]
    fn address_rules() {
        assert_eq!(
            split_address(&path("var.names")),
            Some(("var.names".into(), 2))
        );
        assert_eq!(
            split_address(&path("data.aws_ami.ubuntu.id")),
            Some(("data.aws_ami.ubuntu".into(), 3))
        );
        assert_eq!(
            split_address(&path("aws_iam_user.example.name")),
            Some(("aws_iam_user.example".into(), 2))
        );
        assert_eq!(split_address(&path("each.value")), None);
        assert_eq!(split_address(&path("local")), None);
    }
}

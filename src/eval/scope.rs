use std::collections::HashMap;

use crate::value::{Map, Value};

/// Names bound by the surrounding construct rather than by a block: `for` loop variables,
/// `each`, `count`, `dynamic` iterators and `path`.
///
/// Inner bindings shadow outer ones and shadow block addresses with the same root. Each
/// iteration works on its own clone, so bindings never leak between iterations.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    names: HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.names.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn with_var(&self, name: impl Into<String>, value: Value) -> Self {
        let mut scope = self.clone();
        scope.names.insert(name.into(), value);
        scope
    }

    /// `each.key` / `each.value` inside a `for_each` resource.
    pub fn with_each(&self, key: Value, value: Value) -> Self {
        self.with_iterator("each", key, value)
    }

    /// `count.index` inside a `count` resource.
    pub fn with_count(&self, index: usize) -> Self {
        let mut m = Map::new();
        m.insert("index".to_string(), Value::from(index));
        self.with_var("count", Value::Map(m))
    }

    /// `<name>.key` / `<name>.value`, used by `each` and `dynamic` block iterators.
    pub fn with_iterator(&self, name: &str, key: Value, value: Value) -> Self {
        let mut m = Map::new();
        m.insert("key".to_string(), key);
        m.insert("value".to_string(), value);
        self.with_var(name, Value::Map(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_bindings_shadow_and_do_not_leak() {
        let outer = Scope::new().with_var("x", Value::from(1i64));
        let inner = outer.with_var("x", Value::from(2i64));
        assert_eq!(inner.lookup("x"), Some(&Value::from(2i64)));
        assert_eq!(outer.lookup("x"), Some(&Value::from(1i64)));
    }

    #[test]
    fn count_and_each_are_maps() {
        let s = Scope::new()
            .with_count(3)
            .with_each(Value::from("neo"), Value::from("admin"));
        let count = s.lookup("count").unwrap().as_map().unwrap();
        assert_eq!(count["index"], Value::from(3usize));
        let each = s.lookup("each").unwrap().as_map().unwrap();
        assert_eq!(each["key"], Value::from("neo"));
        assert_eq!(each["value"], Value::from("admin"));
    }
}

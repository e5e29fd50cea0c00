use std::cmp::Ordering;

use super::{FuncArgs, FuncDef};
use crate::eval::expr::map_key;
use crate::value::{coerce, Map, Value, ValueType};

fn any_list() -> ValueType {
    ValueType::list_of(ValueType::Any)
}

fn any_map() -> ValueType {
    ValueType::map_of(ValueType::Any)
}

/// Number of elements in a list or map, or characters in a string
pub fn create_length_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::List(items) => Ok(Value::from(items.len())),
            Value::Map(map) => Ok(Value::from(map.len())),
            Value::String(s) => Ok(Value::from(s.chars().count())),
            other => Err(format!("cannot take the length of a {}", other.kind()).into()),
        })
}

/// Keys of a map, sorted
pub fn create_keys_func() -> FuncDef {
    FuncDef::builder()
        .param(any_map())
        .build(|args: FuncArgs| {
            Ok(Value::from(
                args.map(0)?.keys().map(String::as_str).collect::<Vec<_>>(),
            ))
        })
}

/// Values of a map, in key order
pub fn create_values_func() -> FuncDef {
    FuncDef::builder()
        .param(any_map())
        .build(|args: FuncArgs| Ok(Value::List(args.map(0)?.values().cloned().collect())))
}

/// Convert a list to a set: duplicates removed, elements sorted
pub fn create_toset_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::set_of(ValueType::Any))
        .build(|args: FuncArgs| Ok(args[0].clone()))
}

pub fn create_tolist_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .build(|args: FuncArgs| Ok(args[0].clone()))
}

pub fn create_tomap_func() -> FuncDef {
    FuncDef::builder()
        .param(any_map())
        .build(|args: FuncArgs| Ok(args[0].clone()))
}

/// Concatenate multiple lists into a single list
pub fn create_concat_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .variadic_param(any_list())
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for i in 0..args.len() {
                result.extend(args.list(i)?.iter().cloned());
            }
            Ok(Value::List(result))
        })
}

/// Flatten nested lists into a single level list
pub fn create_flatten_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .build(|args: FuncArgs| {
            fn flatten(values: &[Value], out: &mut Vec<Value>) {
                for v in values {
                    match v {
                        Value::List(inner) => flatten(inner, out),
                        other => out.push(other.clone()),
                    }
                }
            }

            let mut result = Vec::new();
            flatten(args.list(0)?, &mut result);
            Ok(Value::List(result))
        })
}

/// Remove duplicate values from a list preserving the first occurrence
pub fn create_distinct_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = Vec::new();
            for v in args.list(0)? {
                if !result.contains(v) {
                    result.push(v.clone());
                }
            }
            Ok(Value::List(result))
        })
}

pub fn create_contains_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .param(ValueType::Any)
        .build(|args: FuncArgs| Ok(Value::from(args.list(0)?.contains(&args[1]))))
}

/// Element at an index, wrapping around the end of the list
pub fn create_element_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .param(ValueType::Number)
        .build(|args: FuncArgs| {
            let items = args.list(0)?;
            let idx = args.int(1)?;
            if items.is_empty() {
                return Err("cannot use element function with an empty list".into());
            }
            if idx < 0 {
                return Err("cannot use element function with a negative index".into());
            }
            Ok(items[idx as usize % items.len()].clone())
        })
}

/// Return the index of a value in a list, or error if not found
pub fn create_index_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .param(ValueType::Any)
        .build(|args: FuncArgs| {
            args.list(0)?
                .iter()
                .position(|v| v == &args[1])
                .map(Value::from)
                .ok_or_else(|| "item not found".into())
        })
}

/// Look up a key in a map, with an optional default
pub fn create_lookup_func() -> FuncDef {
    FuncDef::builder()
        .param(any_map())
        .param(ValueType::String)
        .variadic_param(ValueType::Any)
        .build(|args: FuncArgs| {
            let key = args.str(1)?;
            match (args.map(0)?.get(key), args.get(2)) {
                (Some(v), _) => Ok(v.clone()),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(format!("key '{key}' not found and no default given").into()),
            }
        })
}

/// Merge maps; later arguments take precedence
pub fn create_merge_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(any_map())
        .build(|args: FuncArgs| {
            let mut out = Map::new();
            for v in args.iter() {
                if let Value::Map(m) = v {
                    out.extend(m.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            Ok(Value::Map(out))
        })
}

/// `range(limit)`, `range(start, limit)` or `range(start, limit, step)`
pub fn create_range_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .variadic_param(ValueType::Number)
        .build(|args: FuncArgs| {
            let (start, limit, step) = match args.len() {
                1 => (0.0, args.number(0)?, 1.0),
                2 => {
                    let (s, l) = (args.number(0)?, args.number(1)?);
                    (s, l, if l < s { -1.0 } else { 1.0 })
                }
                3 => (args.number(0)?, args.number(1)?, args.number(2)?),
                _ => return Err("range takes one to three arguments".into()),
            };
            if step == 0.0 {
                return Err("step must not be zero".into());
            }
            if (step > 0.0 && limit < start) || (step < 0.0 && limit > start) {
                return Err("step has the wrong sign for the given start and limit".into());
            }
            let mut out = Vec::new();
            let mut n = start;
            while (step > 0.0 && n < limit) || (step < 0.0 && n > limit) {
                out.push(Value::Number(n));
                n += step;
                if out.len() > 1024 {
                    return Err("range would produce more than 1024 elements".into());
                }
            }
            Ok(Value::List(out))
        })
}

/// Build a map from a list of keys and a list of values
pub fn create_zipmap_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::list_of(ValueType::String))
        .param(any_list())
        .build(|args: FuncArgs| {
            let keys = args.list(0)?;
            let values = args.list(1)?;
            if keys.len() != values.len() {
                return Err(format!(
                    "number of keys ({}) does not match number of values ({})",
                    keys.len(),
                    values.len()
                )
                .into());
            }
            let mut out = Map::new();
            for (k, v) in keys.iter().zip(values) {
                out.insert(
                    map_key(k).map_err(|e| e.to_string())?,
                    v.clone(),
                );
            }
            Ok(Value::Map(out))
        })
}

/// Elements from start (inclusive) to end (exclusive)
pub fn create_slice_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .param(ValueType::Number)
        .param(ValueType::Number)
        .build(|args: FuncArgs| {
            let items = args.list(0)?;
            let start = args.int(1)?;
            let end = args.int(2)?;
            if start < 0 || end > items.len() as i64 || start > end {
                return Err(format!(
                    "invalid slice [{start}:{end}] of a list with {} elements",
                    items.len()
                )
                .into());
            }
            Ok(Value::List(items[start as usize..end as usize].to_vec()))
        })
}

/// Sort a list of strings lexicographically
pub fn create_sort_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::list_of(ValueType::String))
        .build(|args: FuncArgs| {
            let mut result = args.list(0)?.clone();
            result.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            Ok(Value::List(result))
        })
}

pub fn create_reverse_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .build(|args: FuncArgs| Ok(Value::List(args.list(0)?.iter().rev().cloned().collect())))
}

/// Return the first non-null, non-empty-string argument
pub fn create_coalesce_func() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ValueType::Any)
        .build(|args: FuncArgs| {
            args.iter()
                .find(|v| !v.is_null() && v.as_str() != Some(""))
                .cloned()
                .ok_or_else(|| "no non-null, non-empty-string arguments".into())
        })
}

/// Remove null and empty-string elements from a list
pub fn create_compact_func() -> FuncDef {
    FuncDef::builder()
        .param(any_list())
        .build(|args: FuncArgs| {
            let items = args.list(0)?;
            let mut out = Vec::with_capacity(items.len());
            for v in items {
                if v.is_null() || v.as_str() == Some("") {
                    continue;
                }
                out.push(coerce(v, &ValueType::String).map_err(|e| e.to_string())?);
            }
            Ok(Value::List(out))
        })
}

#[cfg(test)]
mod tests {
    use crate::eval::builtins::tests::eval;
    use crate::value::{Map, Value};

    #[test]
    fn test_length_function() {
        assert_eq!(eval("length([1, 2, 3])").unwrap(), Value::from(3usize));
        assert_eq!(eval("length({a = 1})").unwrap(), Value::from(1usize));
        assert_eq!(eval("length(\"héllo\")").unwrap(), Value::from(5usize));
        assert!(eval("length(5)").is_err());
    }

    #[test]
    fn test_keys_and_values() {
        assert_eq!(
            eval("keys({b = 1, a = 2})").unwrap(),
            Value::from(vec!["a", "b"])
        );
        assert_eq!(
            eval("values({b = 1, a = 2})").unwrap(),
            Value::from(vec![2i64, 1])
        );
    }

    #[test]
    fn test_toset_dedupes_and_sorts() {
        assert_eq!(
            eval("toset([\"neo\", \"trinity\", \"morpheus\", \"neo\"])").unwrap(),
            Value::from(vec!["morpheus", "neo", "trinity"])
        );
    }

    #[test]
    fn test_concat_flatten_distinct() {
        assert_eq!(
            eval("concat([1], [2, 3])").unwrap(),
            Value::from(vec![1i64, 2, 3])
        );
        assert_eq!(
            eval("flatten([[1, [2]], 3])").unwrap(),
            Value::from(vec![1i64, 2, 3])
        );
        assert_eq!(
            eval("distinct([\"a\", \"b\", \"a\"])").unwrap(),
            Value::from(vec!["a", "b"])
        );
    }

    #[test]
    fn test_contains_element_index() {
        assert_eq!(eval("contains([\"a\"], \"a\")").unwrap(), Value::from(true));
        assert_eq!(eval("element([\"a\", \"b\"], 3)").unwrap(), Value::from("b"));
        assert_eq!(eval("index([\"a\", \"b\"], \"b\")").unwrap(), Value::from(1usize));
        assert!(eval("index([\"a\"], \"z\")").is_err());
        assert!(eval("element([], 0)").is_err());
    }

    #[test]
    fn test_lookup_function() {
        assert_eq!(eval("lookup({a = \"x\"}, \"a\")").unwrap(), Value::from("x"));
        assert_eq!(
            eval("lookup({a = \"x\"}, \"b\", \"dflt\")").unwrap(),
            Value::from("dflt")
        );
        assert!(eval("lookup({a = \"x\"}, \"b\")").is_err());
    }

    #[test]
    fn test_merge_function() {
        let mut expected = Map::new();
        expected.insert("a".into(), Value::from(1i64));
        expected.insert("b".into(), Value::from(3i64));
        assert_eq!(
            eval("merge({a = 1, b = 2}, {b = 3})").unwrap(),
            Value::Map(expected)
        );
    }

    #[test]
    fn test_range_function() {
        assert_eq!(eval("range(3)").unwrap(), Value::from(vec![0i64, 1, 2]));
        assert_eq!(eval("range(1, 4)").unwrap(), Value::from(vec![1i64, 2, 3]));
        assert_eq!(eval("range(4, 1)").unwrap(), Value::from(vec![4i64, 3, 2]));
        assert_eq!(eval("range(0, 10, 5)").unwrap(), Value::from(vec![0i64, 5]));
        assert!(eval("range(0, 1, 0)").is_err());
    }

    #[test]
    fn test_zipmap_function() {
        let v = eval("zipmap([\"a\", \"b\"], [1, 2])").unwrap();
        assert_eq!(v.as_map().unwrap()["b"], Value::from(2i64));
        assert!(eval("zipmap([\"a\"], [1, 2])").is_err());
    }

    #[test]
    fn test_slice_sort_reverse() {
        assert_eq!(
            eval("slice([\"a\", \"b\", \"c\", \"d\"], 1, 3)").unwrap(),
            Value::from(vec!["b", "c"])
        );
        assert!(eval("slice([\"a\"], 0, 2)").is_err());
        assert_eq!(
            eval("sort([\"c\", \"a\", \"b\"])").unwrap(),
            Value::from(vec!["a", "b", "c"])
        );
        assert_eq!(
            eval("reverse([1, 2, 3])").unwrap(),
            Value::from(vec![3i64, 2, 1])
        );
    }

    #[test]
    fn test_coalesce_and_compact() {
        assert_eq!(eval("coalesce(null, \"\", \"b\")").unwrap(), Value::from("b"));
        assert!(eval("coalesce(null, \"\")").is_err());
        assert_eq!(
            eval("compact([\"a\", \"\", null, \"b\"])").unwrap(),
            Value::from(vec!["a", "b"])
        );
    }
}

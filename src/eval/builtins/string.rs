use regex::Regex;

use super::{FuncArgs, FuncDef, FuncError};
use crate::value::{format_number, Map, Value, ValueType};

/// Convert a string to uppercase
pub fn create_upper_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.to_uppercase())))
}

/// Convert a string to lowercase
pub fn create_lower_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.to_lowercase())))
}

/// Uppercase the first letter of every word
pub fn create_title_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let mut out = String::new();
            let mut at_word_start = true;
            for c in args.str(0)?.chars() {
                if at_word_start && c.is_alphabetic() {
                    out.extend(c.to_uppercase());
                } else {
                    out.push(c);
                }
                at_word_start = !c.is_alphanumeric();
            }
            Ok(Value::from(out))
        })
}

/// Remove any of the characters in `cutset` from both ends of a string
pub fn create_trim_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let cutset: Vec<char> = args.str(1)?.chars().collect();
            Ok(Value::from(args.str(0)?.trim_matches(cutset.as_slice())))
        })
}

/// Remove leading and trailing whitespace
pub fn create_trimspace_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.trim())))
}

pub fn create_trimprefix_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let s = args.str(0)?;
            Ok(Value::from(s.strip_prefix(args.str(1)?).unwrap_or(s)))
        })
}

pub fn create_trimsuffix_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let s = args.str(0)?;
            Ok(Value::from(s.strip_suffix(args.str(1)?).unwrap_or(s)))
        })
}

/// Replace occurrences of a substring. A search string wrapped in slashes is a regex.
pub fn create_replace_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let s = args.str(0)?;
            let search = args.str(1)?;
            let replacement = args.str(2)?;
            let pattern = search
                .strip_prefix('/')
                .and_then(|p| p.strip_suffix('/'))
                .filter(|p| !p.is_empty());
            match pattern {
                Some(p) => {
                    let re = Regex::new(p).map_err(|e| format!("invalid regex: {e}"))?;
                    Ok(Value::from(re.replace_all(s, replacement).into_owned()))
                }
                None => Ok(Value::from(s.replace(search, replacement))),
            }
        })
}

/// Extract a substring by character offset and length.
/// A negative offset counts from the end; a length of -1 takes the rest.
pub fn create_substr_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::Number)
        .param(ValueType::Number)
        .build(|args: FuncArgs| {
            let chars: Vec<char> = args.str(0)?.chars().collect();
            let len = chars.len() as i64;
            let mut offset = args.int(1)?;
            let length = args.int(2)?;
            if offset < 0 {
                offset += len;
            }
            if offset < 0 || offset > len {
                return Err("offset out of range".into());
            }
            let end = if length < 0 {
                len
            } else {
                offset.saturating_add(length).min(len)
            };
            Ok(Value::from(
                chars[offset as usize..end as usize].iter().collect::<String>(),
            ))
        })
}

pub fn create_startswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.starts_with(args.str(1)?))))
}

pub fn create_endswith_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.ends_with(args.str(1)?))))
}

pub fn create_strcontains_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| Ok(Value::from(args.str(0)?.contains(args.str(1)?))))
}

/// Join one or more lists of strings with a separator
pub fn create_join_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::list_of(ValueType::String))
        .variadic_param(ValueType::list_of(ValueType::String))
        .build(|args: FuncArgs| {
            let sep = args.str(0)?;
            let mut parts = Vec::new();
            for i in 1..args.len() {
                for item in args.list(i)? {
                    match item {
                        Value::String(s) => parts.push(s.as_str()),
                        _ => return Err("cannot join a null element".into()),
                    }
                }
            }
            Ok(Value::from(parts.join(sep)))
        })
}

/// Split a string by a separator
pub fn create_split_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let sep = args.str(0)?;
            let s = args.str(1)?;
            if s.is_empty() {
                return Ok(Value::List(Vec::new()));
            }
            Ok(Value::from(s.split(sep).collect::<Vec<_>>()))
        })
}

/// printf-style formatting: `%s %d %f %t %v %q %%`, with an optional `.N` precision.
pub fn create_format_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .variadic_param(ValueType::Any)
        .build(|args: FuncArgs| {
            let spec = args.str(0)?;
            let mut values = args[1..].iter();
            let mut out = String::new();
            let mut chars = spec.chars().peekable();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                let mut precision = None;
                if chars.peek() == Some(&'.') {
                    chars.next();
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                        digits.push(*d);
                        chars.next();
                    }
                    precision = Some(digits.parse::<usize>().unwrap_or(0));
                }
                let verb = chars.next().ok_or("format string ends with '%'")?;
                if verb == '%' {
                    out.push('%');
                    continue;
                }
                let v = values
                    .next()
                    .ok_or_else(|| format!("not enough arguments for %{verb}"))?;
                out.push_str(&format_verb(verb, precision, v)?);
            }
            if values.next().is_some() {
                return Err("too many arguments for format string".into());
            }
            Ok(Value::from(out))
        })
}

fn format_verb(verb: char, precision: Option<usize>, v: &Value) -> Result<String, FuncError> {
    match (verb, v) {
        ('s' | 'v', Value::String(s)) => Ok(s.clone()),
        ('s' | 'v', Value::Number(n)) => Ok(format_number(*n)),
        ('s' | 'v' | 't', Value::Bool(b)) => Ok(b.to_string()),
        ('v', other) => Ok(serde_json::to_string(other).map_err(|e| e.to_string())?),
        ('q', Value::String(s)) => Ok(serde_json::to_string(s).map_err(|e| e.to_string())?),
        ('d', Value::Number(n)) if n.fract() == 0.0 => Ok(format!("{}", *n as i64)),
        ('f', Value::Number(n)) => Ok(format!("{:.*}", precision.unwrap_or(6), n)),
        (verb, other) => Err(format!("unsupported value {} for %{verb}", other.kind()).into()),
    }
}

/// Apply a regular expression and return the first match.
///
/// Without capture groups the result is the matched string, with unnamed groups a list of
/// captures, with named groups a map of captures.
pub fn create_regex_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let re = Regex::new(args.str(0)?).map_err(|e| format!("invalid regex: {e}"))?;
            let caps = re
                .captures(args.str(1)?)
                .ok_or("pattern did not match any part of the string")?;
            let text = |i: usize| Value::from(caps.get(i).map(|m| m.as_str()).unwrap_or(""));
            if re.captures_len() == 1 {
                return Ok(text(0));
            }
            let named: Vec<&str> = re.capture_names().flatten().collect();
            if !named.is_empty() {
                let mut m = Map::new();
                for name in named {
                    let v = caps.name(name).map(|m| m.as_str()).unwrap_or("");
                    m.insert(name.to_string(), Value::from(v));
                }
                return Ok(Value::Map(m));
            }
            Ok(Value::List((1..re.captures_len()).map(text).collect()))
        })
}

#[cfg(test)]
mod tests {
    use crate::eval::builtins::tests::eval;
    use crate::value::Value;

    #[test]
    fn test_case_functions() {
        assert_eq!(eval("upper(\"neo\")").unwrap(), Value::from("NEO"));
        assert_eq!(eval("lower(\"NEO\")").unwrap(), Value::from("neo"));
        assert_eq!(
            eval("title(\"hello world-wide\")").unwrap(),
            Value::from("Hello World-Wide")
        );
    }

    #[test]
    fn test_trim_functions() {
        assert_eq!(eval("trim(\"?!hello?!\", \"!?\")").unwrap(), Value::from("hello"));
        assert_eq!(eval("trimspace(\"  x \\n\")").unwrap(), Value::from("x"));
        assert_eq!(
            eval("trimprefix(\"helloworld\", \"hello\")").unwrap(),
            Value::from("world")
        );
        assert_eq!(
            eval("trimsuffix(\"helloworld\", \"planet\")").unwrap(),
            Value::from("helloworld")
        );
    }

    #[test]
    fn test_replace_function() {
        assert_eq!(
            eval("replace(\"1 + 2 + 3\", \"+\", \"-\")").unwrap(),
            Value::from("1 - 2 - 3")
        );
        assert_eq!(
            eval("replace(\"hello world\", \"/w.*d/\", \"everybody\")").unwrap(),
            Value::from("hello everybody")
        );
    }

    #[test]
    fn test_substr_function() {
        assert_eq!(eval("substr(\"hello world\", 1, 4)").unwrap(), Value::from("ello"));
        assert_eq!(eval("substr(\"hello world\", -5, -1)").unwrap(), Value::from("world"));
        assert_eq!(eval("substr(\"hi\", 0, 10)").unwrap(), Value::from("hi"));
        assert!(eval("substr(\"hi\", 5, 1)").is_err());
        assert_eq!(
            eval("substr(\"hello\", 1, 9007199254740991)").unwrap(),
            Value::from("ello")
        );
        assert_eq!(eval("substr(\"hello\", 1, 1e300)").unwrap(), Value::from("ello"));
    }

    #[test]
    fn test_predicates() {
        assert_eq!(eval("startswith(\"hello\", \"he\")").unwrap(), Value::from(true));
        assert_eq!(eval("endswith(\"hello\", \"he\")").unwrap(), Value::from(false));
        assert_eq!(eval("strcontains(\"hello\", \"ll\")").unwrap(), Value::from(true));
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(
            eval("join(\", \", [\"a\", \"b\"], [\"c\"])").unwrap(),
            Value::from("a, b, c")
        );
        assert_eq!(
            eval("split(\",\", \"a,b,c\")").unwrap(),
            Value::from(vec!["a", "b", "c"])
        );
        assert_eq!(eval("split(\",\", \"\")").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_format_function() {
        assert_eq!(
            eval("format(\"Hello, %s! You are %d.\", \"Neo\", 30)").unwrap(),
            Value::from("Hello, Neo! You are 30.")
        );
        assert_eq!(eval("format(\"%.2f%%\", 3.14159)").unwrap(), Value::from("3.14%"));
        assert_eq!(eval("format(\"%q\", \"x\")").unwrap(), Value::from("\"x\""));
        assert!(eval("format(\"%s %s\", \"a\")").is_err());
        assert!(eval("format(\"%s\", \"a\", \"b\")").is_err());
    }

    #[test]
    fn test_regex_function() {
        assert_eq!(eval("regex(\"[a-z]+\", \"53453453.345345aaabbbccc23454\")").unwrap(),
            Value::from("aaabbbccc"));
        assert_eq!(
            eval("regex(\"(\\\\d+)-(\\\\d+)\", \"10-20\")").unwrap(),
            Value::from(vec!["10", "20"])
        );
        let m = eval("regex(\"(?P<user>\\\\w+)@(?P<host>\\\\w+)\", \"neo@matrix\")").unwrap();
        assert_eq!(m.as_map().unwrap()["host"], Value::from("matrix"));
        assert!(eval("regex(\"z\", \"abc\")").is_err());
    }
}

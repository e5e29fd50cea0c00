use base64::{engine::general_purpose, Engine as _};

use super::{FuncArgs, FuncDef};
use crate::value::{Value, ValueType};

pub fn create_base64encode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let encoded = general_purpose::STANDARD.encode(args.str(0)?.as_bytes());
            Ok(Value::from(encoded))
        })
}

pub fn create_base64decode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            match general_purpose::STANDARD.decode(args.str(0)?) {
                Ok(decoded_bytes) => match String::from_utf8(decoded_bytes) {
                    Ok(decoded_string) => Ok(Value::from(decoded_string)),
                    Err(_) => Err("Invalid UTF-8 in decoded data".into()),
                },
                Err(_) => Err("Invalid base64 string".into()),
            }
        })
}

pub fn create_jsonencode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Any)
        .build(|args: FuncArgs| {
            let s = serde_json::to_string(&args[0]).map_err(|e| e.to_string())?;
            Ok(Value::from(s))
        })
}

pub fn create_jsondecode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let v: serde_json::Value =
                serde_json::from_str(args.str(0)?).map_err(|e| format!("invalid JSON: {e}"))?;
            Ok(Value::from(v))
        })
}

pub fn create_yamlencode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Any)
        .build(|args: FuncArgs| {
            let s = serde_yaml::to_string(&args[0]).map_err(|e| e.to_string())?;
            Ok(Value::from(s))
        })
}

pub fn create_yamldecode_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let v: serde_yaml::Value =
                serde_yaml::from_str(args.str(0)?).map_err(|e| format!("invalid YAML: {e}"))?;
            Ok(Value::try_from(v)?)
        })
}

#[cfg(test)]
mod tests {
    use crate::eval::builtins::tests::eval;
    use crate::value::Value;

    #[test]
    fn test_base64_round_trip() {
        assert_eq!(
            eval("base64encode(\"hello world\")").unwrap(),
            Value::from("aGVsbG8gd29ybGQ=")
        );
        assert_eq!(
            eval("base64decode(\"aGVsbG8gd29ybGQ=\")").unwrap(),
            Value::from("hello world")
        );
        assert!(eval("base64decode(\"***\")").is_err());
    }

    #[test]
    fn test_jsonencode_function() {
        assert_eq!(
            eval("jsonencode({b = [1, true], a = null})").unwrap(),
            Value::from(r#"{"a":null,"b":[1,true]}"#)
        );
    }

    #[test]
    fn test_jsondecode_function() {
        let v = eval(r#"jsondecode("{\"port\": 5432}")"#).unwrap();
        assert_eq!(v.as_map().unwrap()["port"], Value::from(5432i64));
        assert!(eval("jsondecode(\"{\")").is_err());
    }

    #[test]
    fn test_yaml_functions() {
        let v = eval(r#"yamldecode("username: admin\npassword: s3cret\n")"#).unwrap();
        assert_eq!(v.as_map().unwrap()["username"], Value::from("admin"));
        assert_eq!(
            eval("yamlencode([\"a\"])").unwrap(),
            Value::from("- a\n")
        );
    }
}

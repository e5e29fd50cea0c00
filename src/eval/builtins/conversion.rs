use super::{FuncArgs, FuncDef};
use crate::value::{coerce, Value, ValueType};

fn convert_to(ty: ValueType) -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Any)
        .build(move |args: FuncArgs| coerce(&args[0], &ty).map_err(|e| e.root().to_string().into()))
}

/// Convert a primitive value to a string; null stays null
pub fn create_tostring_func() -> FuncDef {
    convert_to(ValueType::String)
}

/// Convert a numeric string to a number; null stays null
pub fn create_tonumber_func() -> FuncDef {
    convert_to(ValueType::Number)
}

/// Convert "true"/"false" to a bool; null stays null
pub fn create_tobool_func() -> FuncDef {
    convert_to(ValueType::Bool)
}

#[cfg(test)]
mod tests {
    use crate::error::EvalError;
    use crate::eval::builtins::tests::eval;
    use crate::value::Value;

    #[test]
    fn test_tostring_function() {
        assert_eq!(eval("tostring(42)").unwrap(), Value::from("42"));
        assert_eq!(eval("tostring(true)").unwrap(), Value::from("true"));
        assert_eq!(eval("tostring(null)").unwrap(), Value::Null);
        assert!(eval("tostring([1])").is_err());
    }

    #[test]
    fn test_tonumber_function() {
        assert_eq!(eval("tonumber(\"1.5\")").unwrap(), Value::from(1.5));
        assert!(matches!(
            eval("tonumber(\"no\")"),
            Err(EvalError::FunctionCall { name, .. }) if name == "tonumber"
        ));
    }

    #[test]
    fn test_tobool_function() {
        assert_eq!(eval("tobool(\"true\")").unwrap(), Value::from(true));
        assert!(eval("tobool(1)").is_err());
    }
}

use super::{FuncArgs, FuncDef};
use crate::value::{Value, ValueType};

fn fold_numbers(args: &FuncArgs, f: fn(f64, f64) -> f64) -> Result<Value, super::FuncError> {
    let mut acc = args.number(0)?;
    for i in 1..args.len() {
        acc = f(acc, args.number(i)?);
    }
    Ok(Value::from(acc))
}

/// Smallest of one or more numbers
pub fn create_min_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .variadic_param(ValueType::Number)
        .build(|args: FuncArgs| fold_numbers(&args, f64::min))
}

/// Largest of one or more numbers
pub fn create_max_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .variadic_param(ValueType::Number)
        .build(|args: FuncArgs| fold_numbers(&args, f64::max))
}

pub fn create_abs_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .build(|args: FuncArgs| Ok(Value::from(args.number(0)?.abs())))
}

pub fn create_ceil_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .build(|args: FuncArgs| Ok(Value::from(args.number(0)?.ceil())))
}

pub fn create_floor_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::Number)
        .build(|args: FuncArgs| Ok(Value::from(args.number(0)?.floor())))
}

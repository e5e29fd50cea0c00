// Built-in functions organized by category

pub mod collection;
pub mod conversion;
pub mod crypto;
pub mod datetime;
pub mod encoding;
pub mod filesystem;
pub mod numeric;
pub mod string;

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

use crate::error::{EvalError, SecretError};
use crate::value::{coerce, Map, Value, ValueType};

/// Why a builtin rejected its arguments.
#[derive(Debug, Error)]
pub enum FuncError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl From<String> for FuncError {
    fn from(m: String) -> Self {
        FuncError::Message(m)
    }
}

impl From<&str> for FuncError {
    fn from(m: &str) -> Self {
        FuncError::Message(m.to_string())
    }
}

pub type FuncResult = Result<Value, FuncError>;

/// Arguments after arity checking and coercion to the declared parameter types.
#[derive(Debug, Clone)]
pub struct FuncArgs(Vec<Value>);

impl Deref for FuncArgs {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl FuncArgs {
    pub fn new(values: Vec<Value>) -> Self {
        FuncArgs(values)
    }

    fn arg(&self, i: usize) -> Result<&Value, FuncError> {
        match self.0.get(i) {
            Some(Value::Null) => Err(format!("argument {} must not be null", i + 1).into()),
            Some(v) => Ok(v),
            None => Err(format!("missing argument {}", i + 1).into()),
        }
    }

    fn expect<'a, T>(
        &'a self,
        i: usize,
        kind: &str,
        f: impl FnOnce(&'a Value) -> Option<T>,
    ) -> Result<T, FuncError> {
        let v = self.arg(i)?;
        f(v).ok_or_else(|| {
            format!("argument {} must be a {kind}, got {}", i + 1, v.kind()).into()
        })
    }

    pub fn str(&self, i: usize) -> Result<&str, FuncError> {
        self.expect(i, "string", Value::as_str)
    }

    pub fn number(&self, i: usize) -> Result<f64, FuncError> {
        self.expect(i, "number", Value::as_f64)
    }

    pub fn int(&self, i: usize) -> Result<i64, FuncError> {
        self.expect(i, "whole number", Value::as_i64)
    }

    pub fn bool(&self, i: usize) -> Result<bool, FuncError> {
        self.expect(i, "bool", Value::as_bool)
    }

    pub fn list(&self, i: usize) -> Result<&Vec<Value>, FuncError> {
        self.expect(i, "list", Value::as_list)
    }

    pub fn map(&self, i: usize) -> Result<&Map, FuncError> {
        self.expect(i, "map", Value::as_map)
    }
}

type FuncBody = Arc<dyn Fn(FuncArgs) -> FuncResult + Send + Sync>;

/// A builtin: declared parameter types plus the body.
#[derive(Clone)]
pub struct FuncDef {
    params: Vec<ValueType>,
    variadic: Option<ValueType>,
    body: FuncBody,
}

impl fmt::Debug for FuncDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncDef")
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct FuncDefBuilder {
    params: Vec<ValueType>,
    variadic: Option<ValueType>,
}

impl FuncDefBuilder {
    pub fn param(mut self, ty: ValueType) -> Self {
        self.params.push(ty);
        self
    }

    /// Any number of trailing arguments of type `ty`.
    pub fn variadic_param(mut self, ty: ValueType) -> Self {
        self.variadic = Some(ty);
        self
    }

    pub fn build<F>(self, body: F) -> FuncDef
    where
        F: Fn(FuncArgs) -> FuncResult + Send + Sync + 'static,
    {
        FuncDef {
            params: self.params,
            variadic: self.variadic,
            body: Arc::new(body),
        }
    }
}

impl FuncDef {
    pub fn builder() -> FuncDefBuilder {
        FuncDefBuilder::default()
    }

    /// Check arity, coerce every argument to its declared type, then run the body.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let fail = |message: String| EvalError::FunctionCall {
            name: name.to_string(),
            message,
        };
        let n = self.params.len();
        if args.len() < n || (self.variadic.is_none() && args.len() > n) {
            let expected = match self.variadic {
                Some(_) => format!("at least {n}"),
                None => n.to_string(),
            };
            return Err(fail(format!(
                "expected {expected} argument(s), got {}",
                args.len()
            )));
        }
        let mut coerced = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let ty = self.params.get(i).or(self.variadic.as_ref());
            let v = match ty {
                Some(ty) => coerce(arg, ty)
                    .map_err(|e| fail(format!("argument {}: {}", i + 1, e.root())))?,
                None => arg.clone(),
            };
            coerced.push(v);
        }
        (self.body)(FuncArgs(coerced)).map_err(|e| match e {
            FuncError::Secret(e) => EvalError::Secret(e),
            FuncError::Message(m) => fail(m),
        })
    }
}

/// Named functions available to expressions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    funcs: HashMap<String, FuncDef>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `def` under `name`, replacing any previous function with that name.
    pub fn declare(&mut self, name: impl Into<String>, def: FuncDef) {
        self.funcs.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&FuncDef> {
        self.funcs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.funcs.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Copy every function of `other` into this registry; `other` wins on name clashes.
    pub fn merge(&mut self, other: &FunctionRegistry) {
        for (name, def) in &other.funcs {
            self.funcs.insert(name.clone(), def.clone());
        }
    }

    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        self.get(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?
            .call(name, args)
    }
}

/// Create a registry with all pure built-in functions.
///
/// `file`, `fileexists` and `secret` need a loader or secret source and are added by the engine.
pub fn create_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();

    // String functions
    reg.declare("upper", string::create_upper_func());
    reg.declare("lower", string::create_lower_func());
    reg.declare("title", string::create_title_func());
    reg.declare("trim", string::create_trim_func());
    reg.declare("trimspace", string::create_trimspace_func());
    reg.declare("trimprefix", string::create_trimprefix_func());
    reg.declare("trimsuffix", string::create_trimsuffix_func());
    reg.declare("replace", string::create_replace_func());
    reg.declare("substr", string::create_substr_func());
    reg.declare("startswith", string::create_startswith_func());
    reg.declare("endswith", string::create_endswith_func());
    reg.declare("strcontains", string::create_strcontains_func());
    reg.declare("join", string::create_join_func());
    reg.declare("split", string::create_split_func());
    reg.declare("format", string::create_format_func());
    reg.declare("regex", string::create_regex_func());

    // Collection functions
    reg.declare("length", collection::create_length_func());
    reg.declare("keys", collection::create_keys_func());
    reg.declare("values", collection::create_values_func());
    reg.declare("toset", collection::create_toset_func());
    reg.declare("tolist", collection::create_tolist_func());
    reg.declare("tomap", collection::create_tomap_func());
    reg.declare("concat", collection::create_concat_func());
    reg.declare("flatten", collection::create_flatten_func());
    reg.declare("distinct", collection::create_distinct_func());
    reg.declare("contains", collection::create_contains_func());
    reg.declare("element", collection::create_element_func());
    reg.declare("index", collection::create_index_func());
    reg.declare("lookup", collection::create_lookup_func());
    reg.declare("merge", collection::create_merge_func());
    reg.declare("range", collection::create_range_func());
    reg.declare("zipmap", collection::create_zipmap_func());
    reg.declare("slice", collection::create_slice_func());
    reg.declare("sort", collection::create_sort_func());
    reg.declare("reverse", collection::create_reverse_func());
    reg.declare("coalesce", collection::create_coalesce_func());
    reg.declare("compact", collection::create_compact_func());

    // Numeric functions
    reg.declare("min", numeric::create_min_func());
    reg.declare("max", numeric::create_max_func());
    reg.declare("abs", numeric::create_abs_func());
    reg.declare("ceil", numeric::create_ceil_func());
    reg.declare("floor", numeric::create_floor_func());

    // Conversion functions
    reg.declare("tostring", conversion::create_tostring_func());
    reg.declare("tonumber", conversion::create_tonumber_func());
    reg.declare("tobool", conversion::create_tobool_func());

    // Encoding functions
    reg.declare("base64encode", encoding::create_base64encode_func());
    reg.declare("base64decode", encoding::create_base64decode_func());
    reg.declare("jsonencode", encoding::create_jsonencode_func());
    reg.declare("jsondecode", encoding::create_jsondecode_func());
    reg.declare("yamlencode", encoding::create_yamlencode_func());
    reg.declare("yamldecode", encoding::create_yamldecode_func());

    // Cryptographic functions
    reg.declare("md5", crypto::create_md5_func());
    reg.declare("sha256", crypto::create_sha256_func());
    reg.declare("sha512", crypto::create_sha512_func());

    // Date and time functions
    reg.declare("formatdate", datetime::create_formatdate_func());
    reg.declare("timeadd", datetime::create_timeadd_func());
    reg.declare("timecmp", datetime::create_timecmp_func());

    reg
}

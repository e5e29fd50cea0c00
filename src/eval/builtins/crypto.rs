use sha2::{Digest, Sha256, Sha512};

use super::{FuncArgs, FuncDef};
use crate::value::{Value, ValueType};

/// Cryptographic hash functions, returning lowercase hex digests
pub fn create_md5_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let digest = md5::compute(args.str(0)?.as_bytes());
            Ok(Value::from(format!("{:x}", digest)))
        })
}

pub fn create_sha256_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let mut hasher = Sha256::new();
            hasher.update(args.str(0)?.as_bytes());
            Ok(Value::from(format!("{:x}", hasher.finalize())))
        })
}

pub fn create_sha512_func() -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(|args: FuncArgs| {
            let mut hasher = Sha512::new();
            hasher.update(args.str(0)?.as_bytes());
            Ok(Value::from(format!("{:x}", hasher.finalize())))
        })
}

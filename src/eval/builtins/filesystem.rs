use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{FuncArgs, FuncDef};
use crate::value::{Value, ValueType};
use crate::Loader;

fn resolve(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// Read a file, relative to the configuration directory, as a UTF-8 string
pub fn create_file_func(loader: Arc<dyn Loader>, base_dir: PathBuf) -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(move |args: FuncArgs| {
            let path = resolve(&base_dir, args.str(0)?);
            let content = loader
                .load(&path)
                .map_err(|e| format!("reading {}: {e:#}", path.display()))?;
            Ok(Value::from(content))
        })
}

pub fn create_fileexists_func(loader: Arc<dyn Loader>, base_dir: PathBuf) -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(move |args: FuncArgs| {
            let path = resolve(&base_dir, args.str(0)?);
            Ok(Value::from(loader.exists(&path)))
        })
}

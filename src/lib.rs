pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod expand;
pub mod frontend;
pub mod graph;
pub mod passes;
pub mod secrets;
pub mod value;

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use config::RedeclarationPolicy;
pub use engine::{Engine, Evaluation};
pub use error::{EvalError, SecretError};
pub use expand::{InstanceKey, ResourceInstance};
pub use frontend::ast::Config;
pub use value::{Map, Value, ValueType};

// Loader abstraction: lets callers control how files are read.
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path) -> Result<String>;

    fn load_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(self.load(path)?.into_bytes())
    }

    fn exists(&self, path: &Path) -> bool {
        self.load_bytes(path).is_ok()
    }
}

/// Reads from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl Loader for FsLoader {
    fn load(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }

    fn load_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Serves files from memory, keyed by the exact path they are requested under.
#[derive(Debug, Clone, Default)]
pub struct MapLoader {
    files: HashMap<PathBuf, String>,
}

impl MapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }
}

impl Loader for MapLoader {
    fn load(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing file: {}", path.display()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

// Pure API: parse and lower every file in `paths`, in order, using a Loader.
pub fn load_config(
    paths: &[impl AsRef<Path>],
    loader: &dyn Loader,
    policy: RedeclarationPolicy,
) -> Result<Config> {
    frontend::load_files(paths, loader, policy)
}

// Pure validation: static checks that need no evaluation.
pub fn validate(cfg: &Config) -> Result<()> {
    passes::validate(cfg)?;
    graph::evaluation_order(cfg)?;
    Ok(())
}

/// Keep only instances whose resource type passes the include/exclude lists.
pub fn apply_resource_filters(eval: &Evaluation, include: &[String], exclude: &[String]) -> Evaluation {
    Evaluation {
        instances: eval
            .instances
            .iter()
            .filter(|i| config::type_selected(include, exclude, &i.resource_type))
            .cloned()
            .collect(),
        ..eval.clone()
    }
}

pub fn generate_with_backend(backend: &str, eval: &Evaluation, show_sensitive: bool) -> Result<String> {
    let be = backends::get_backend(backend)
        .ok_or_else(|| anyhow::anyhow!(format!("unknown backend '{backend}'")))?;
    be.generate(eval, show_sensitive)
}

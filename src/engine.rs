//! One evaluation pass over a configuration.
//!
//! The pass validates the configuration, orders its blocks by their references and evaluates
//! them one at a time, binding each result before anything that reads it runs. The first error
//! aborts the pass.
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};

use crate::error::EvalError;
use crate::eval::builtins::filesystem::{create_file_func, create_fileexists_func};
use crate::eval::{create_registry, EvalContext, FuncDef, FunctionRegistry, Scope};
use crate::expand::{self, ResourceInstance};
use crate::frontend::ast::{BlockRef, Config, VariableBlock};
use crate::frontend::parse_expr;
use crate::graph::{self, Binding, Bindings};
use crate::passes;
use crate::secrets::{
    create_secret_func, Decryptor, EncryptedFileSource, EnvSecretSource, PlaintextDecryptor,
    SecretRouter, SecretSource,
};
use crate::value::{coerce, Map, Value, ValueType};
use crate::{FsLoader, Loader};

/// Placeholder shown instead of a sensitive value.
pub const REDACTED: &str = "(sensitive)";

/// Evaluation settings plus the services expressions can reach (files, secrets, functions).
pub struct Engine {
    loader: Arc<dyn Loader>,
    base_dir: PathBuf,
    inputs: IndexMap<String, Value>,
    env: HashMap<String, String>,
    env_prefix: String,
    secrets: Option<Arc<dyn SecretSource>>,
    decryptor: Arc<dyn Decryptor>,
    functions: FunctionRegistry,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine reading files from disk, with the process environment as its environment.
    pub fn new() -> Self {
        Self {
            loader: Arc::new(FsLoader),
            base_dir: PathBuf::from("."),
            inputs: IndexMap::new(),
            env: std::env::vars().collect(),
            env_prefix: crate::config::DEFAULT_ENV_PREFIX.to_string(),
            secrets: None,
            decryptor: Arc::new(PlaintextDecryptor),
            functions: FunctionRegistry::new(),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = loader;
        self
    }

    /// Directory `file()`, `fileexists()`, `file:` secrets and `path.module` are relative to.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Explicit variable values; these win over the environment and over defaults.
    pub fn with_inputs(mut self, inputs: IndexMap<String, Value>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Replace the environment used for `<prefix><name>` variables and `env:` secrets.
    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Use `source` for `secret()` instead of the default `env:`/`file:` router.
    pub fn with_secrets(mut self, source: Arc<dyn SecretSource>) -> Self {
        self.secrets = Some(source);
        self
    }

    /// Decryptor for `file:` secrets in the default router.
    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    /// Register an extra function. It replaces a builtin with the same name.
    pub fn with_function(mut self, name: impl Into<String>, def: FuncDef) -> Self {
        self.functions.declare(name, def);
        self
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    fn secret_source(&self) -> Arc<dyn SecretSource> {
        if let Some(source) = &self.secrets {
            return source.clone();
        }
        let files = EncryptedFileSource::new(self.loader.clone(), self.decryptor.clone())
            .with_base_dir(self.base_dir.clone());
        Arc::new(
            SecretRouter::new()
                .with_source("env", Arc::new(EnvSecretSource::from_map(self.env.clone())))
                .with_source("file", Arc::new(files)),
        )
    }

    /// Builtins, the loader- and secret-backed functions, then any registered extras.
    pub fn registry(&self) -> FunctionRegistry {
        let mut reg = create_registry();
        reg.declare(
            "file",
            create_file_func(self.loader.clone(), self.base_dir.clone()),
        );
        reg.declare(
            "fileexists",
            create_fileexists_func(self.loader.clone(), self.base_dir.clone()),
        );
        reg.declare("secret", create_secret_func(self.secret_source()));
        reg.merge(&self.functions);
        reg
    }

    fn root_scope(&self) -> Scope {
        let dir = Value::from(self.base_dir.display().to_string());
        let cwd = std::env::current_dir().unwrap_or_default();
        let mut path = Map::new();
        path.insert("module".to_string(), dir.clone());
        path.insert("root".to_string(), dir);
        path.insert("cwd".to_string(), Value::from(cwd.display().to_string()));
        Scope::new().with_var("path", Value::Map(path))
    }

    /// Evaluate every block of `config` in dependency order.
    pub fn evaluate(&self, config: &Config) -> Result<Evaluation, EvalError> {
        passes::validate(config)?;
        let order = graph::evaluation_order(config)?;
        let blocks: HashMap<String, BlockRef<'_>> = config.blocks().into_iter().collect();
        let functions = self.registry();
        let scope = self.root_scope();

        let mut eval = Evaluation {
            order: order.clone(),
            ..Evaluation::default()
        };
        for addr in &order {
            let Some(block) = blocks.get(addr) else {
                continue;
            };
            let ctx = EvalContext {
                bindings: &eval.bindings,
                functions: &functions,
                scope: scope.clone(),
            };
            let (binding, sensitive) = self
                .evaluate_block(addr, *block, &ctx, &eval.sensitive)
                .map_err(|e| e.in_block(addr.as_str()))?;

            let shown = if sensitive {
                REDACTED.to_string()
            } else {
                binding.value().to_string()
            };
            debug!("{addr} = {shown}");

            if sensitive {
                eval.sensitive.insert(addr.clone());
            }
            if let Binding::Resource { instances, .. } = &binding {
                eval.instances.extend(instances.iter().cloned());
            }
            if let BlockRef::Output(o) = block {
                eval.outputs.insert(o.name.clone(), binding.value().clone());
            }
            eval.bindings
                .insert(addr.clone(), binding)
                .map_err(|e| e.in_block(addr.as_str()))?;
        }

        info!(
            "evaluated {} blocks: {} resource instances, {} outputs",
            eval.order.len(),
            eval.instances.len(),
            eval.outputs.len()
        );
        Ok(eval)
    }

    /// The block's binding and whether it is sensitive. Anything derived from a sensitive
    /// block is sensitive too.
    fn evaluate_block(
        &self,
        addr: &str,
        block: BlockRef<'_>,
        ctx: &EvalContext<'_>,
        sensitive: &BTreeSet<String>,
    ) -> Result<(Binding, bool), EvalError> {
        // Secret plaintext and anything computed from a sensitive block stay sensitive.
        let derived = || {
            graph::block_calls(block, "secret")
                || graph::block_dependencies(addr, block).iter().any(|d| sensitive.contains(d))
        };
        match block {
            BlockRef::Variable(v) => {
                let value = self.resolve_variable(addr, v, ctx)?;
                Ok((Binding::Value(value), v.sensitive || derived()))
            }
            BlockRef::Local(expr) => Ok((Binding::Value(ctx.evaluate(expr)?), derived())),
            BlockRef::Resource(r) => {
                let instances: Vec<ResourceInstance> = expand::expand(r, ctx)?;
                Ok((expand::resource_binding(r, instances), derived()))
            }
            BlockRef::Output(o) => {
                let value = ctx.evaluate(&o.value)?;
                Ok((Binding::Value(value), o.sensitive || derived()))
            }
        }
    }

    /// Explicit input, then `<prefix><name>` from the environment, then the default.
    fn resolve_variable(
        &self,
        addr: &str,
        v: &VariableBlock,
        ctx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let fail = |message: String| EvalError::Variable {
            name: v.name.clone(),
            message,
        };
        let env_key = format!("{}{}", self.env_prefix, v.name);
        let value = if let Some(input) = self.inputs.get(&v.name) {
            self.parse_input(v, input.clone(), ctx)?
        } else if let Some(raw) = self.env.get(&env_key) {
            debug!("var.{} taken from {env_key}", v.name);
            self.parse_input(v, Value::from(raw.as_str()), ctx)?
        } else if let Some(default) = &v.default {
            ctx.evaluate(default)?
        } else {
            return Err(fail("no value given and no default".into()));
        };

        let value = match &v.ty {
            Some(ty) => coerce(&value, ty).map_err(|e| fail(e.root().to_string()))?,
            None => value,
        };
        if value.is_null() && !v.nullable {
            return Err(fail("must not be null".into()));
        }

        if !v.validations.is_empty() {
            let mut probe = ctx.bindings.clone();
            probe.insert(addr, Binding::Value(value.clone()))?;
            let pctx = EvalContext {
                bindings: &probe,
                functions: ctx.functions,
                scope: ctx.scope.clone(),
            };
            for val in &v.validations {
                if !pctx.condition(&val.condition, "validation condition")? {
                    let message = pctx.evaluate(&val.error_message)?.to_template_string()?;
                    return Err(fail(message));
                }
            }
        }
        Ok(value)
    }

    /// Strings given for a variable typed as a number, bool or collection are HCL expressions:
    /// `--var 'names=["neo","trinity"]'`.
    fn parse_input(
        &self,
        v: &VariableBlock,
        input: Value,
        ctx: &EvalContext<'_>,
    ) -> Result<Value, EvalError> {
        let Value::String(raw) = &input else {
            return Ok(input);
        };
        match &v.ty {
            None | Some(ValueType::String) | Some(ValueType::Any) => Ok(input),
            Some(ty) => {
                let parsed = parse_expr(raw).and_then(|expr| {
                    let empty = Bindings::new();
                    EvalContext::new(&empty, ctx.functions)
                        .evaluate(&expr)
                        .map_err(anyhow::Error::from)
                });
                match (parsed, ty) {
                    (Ok(value), _) => Ok(value),
                    // "42" and "true" still convert through the usual coercion.
                    (Err(_), ValueType::Number | ValueType::Bool) => Ok(input),
                    (Err(e), _) => Err(EvalError::Variable {
                        name: v.name.clone(),
                        message: format!("cannot parse {raw:?} as {ty}: {e:#}"),
                    }),
                }
            }
        }
    }
}

/// Everything one pass produced.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Block addresses in the order they were evaluated.
    pub order: Vec<String>,
    pub bindings: Bindings,
    /// Every resource and data instance, grouped by block in evaluation order.
    pub instances: Vec<ResourceInstance>,
    pub outputs: Map,
    /// Addresses whose values must not be shown.
    pub sensitive: BTreeSet<String>,
}

impl Evaluation {
    pub fn get(&self, address: &str) -> Option<&Value> {
        self.bindings.get(address)
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    pub fn is_sensitive(&self, address: &str) -> bool {
        self.sensitive.contains(address)
    }

    /// Instances of the block at `address` (e.g. `aws_iam_user.example`).
    pub fn instances_of<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a ResourceInstance> {
        self.instances.iter().filter(move |i| {
            let a = i.address();
            a == address || a.strip_prefix(address).is_some_and(|rest| rest.starts_with('['))
        })
    }

    /// Outputs with sensitive values replaced by a placeholder.
    pub fn redacted_outputs(&self) -> Map {
        self.outputs
            .iter()
            .map(|(name, v)| {
                let v = if self.is_sensitive(&format!("output.{name}")) {
                    Value::from(REDACTED)
                } else {
                    v.clone()
                };
                (name.clone(), v)
            })
            .collect()
    }
}

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

use crate::config::RedeclarationPolicy;
use crate::eval;
use crate::frontend::ast::{self, ResourceMode};
use crate::frontend::lower::{self, Declaration};
use crate::value::Value;
use crate::Loader;

/// Read, parse and lower every file in `paths`, in order, into one configuration.
pub fn load_files(
    paths: &[impl AsRef<Path>],
    loader: &dyn Loader,
    policy: RedeclarationPolicy,
) -> Result<ast::Config> {
    let mut config = ast::Config::default();
    let mut visited: Vec<PathBuf> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let abspath = path
            .absolutize()
            .map_err(|e| anyhow::anyhow!("absolutize error: {e}"))?
            .to_path_buf();
        // The same file given twice would redeclare everything it holds.
        if visited.contains(&abspath) {
            warn!("skipping {}: already loaded", path.display());
            continue;
        }
        visited.push(abspath);
        let content = loader
            .load(path)
            .with_context(|| format!("reading HCL file {}", path.display()))?;
        merge_source(&mut config, &content, policy)
            .with_context(|| format!("loading {}", path.display()))?;
        debug!("loaded {}", path.display());
    }
    Ok(config)
}

/// Parse a single HCL source into a configuration.
pub fn parse_config(src: &str, policy: RedeclarationPolicy) -> Result<ast::Config> {
    let mut config = ast::Config::default();
    merge_source(&mut config, src, policy)?;
    Ok(config)
}

fn merge_source(config: &mut ast::Config, src: &str, policy: RedeclarationPolicy) -> Result<()> {
    let body: hcl::Body = hcl::from_str(src).context("parsing HCL")?;
    for decl in lower::lower_file(&body)? {
        declare(config, decl, policy)?;
    }
    Ok(())
}

/// Add one declaration. A redeclared address is removed and re-inserted at the end, so the
/// surviving block takes the position of the later declaration.
pub fn declare(
    config: &mut ast::Config,
    decl: Declaration,
    policy: RedeclarationPolicy,
) -> Result<()> {
    let addr = decl.address();
    let replaced = match decl {
        Declaration::Variable(v) => {
            let old = config.variables.shift_remove(&v.name);
            config.variables.insert(v.name.clone(), v);
            old.is_some()
        }
        Declaration::Local(name, expr) => {
            let old = config.locals.shift_remove(&name);
            config.locals.insert(name, expr);
            old.is_some()
        }
        Declaration::Resource(r) => {
            let map = match r.mode {
                ResourceMode::Managed => &mut config.resources,
                ResourceMode::Data => &mut config.data,
            };
            let old = map.shift_remove(&addr);
            map.insert(addr.clone(), r);
            old.is_some()
        }
        Declaration::Output(o) => {
            let old = config.outputs.shift_remove(&o.name);
            config.outputs.insert(o.name.clone(), o);
            old.is_some()
        }
    };
    if replaced {
        match policy {
            RedeclarationPolicy::Error => bail!("'{addr}' is declared more than once"),
            RedeclarationPolicy::LastWins => {
                warn!("'{addr}' redeclared, the later declaration replaces the earlier one")
            }
        }
    }
    Ok(())
}

/// Load variable values from a `.tfvars`-style HCL file or a JSON object file.
///
/// Values must be constant: literals, collections and builtin calls without references.
pub fn load_var_file(path: &Path, loader: &dyn Loader) -> Result<IndexMap<String, Value>> {
    let content = loader
        .load(path)
        .with_context(|| format!("reading var file {}", path.display()))?;
    parse_var_file(&content, path.extension().is_some_and(|e| e == "json"))
        .with_context(|| format!("loading var file {}", path.display()))
}

pub fn parse_var_file(content: &str, json: bool) -> Result<IndexMap<String, Value>> {
    let mut out = IndexMap::new();
    if json {
        let obj: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(content).context("var file must be a JSON object")?;
        for (k, v) in obj {
            out.insert(k, Value::from(v));
        }
        return Ok(out);
    }
    let body: hcl::Body = hcl::from_str(content).context("parsing var file as HCL")?;
    if body.blocks().next().is_some() {
        bail!("var files may only contain attributes");
    }
    for attr in body.attributes() {
        let name = attr.key();
        let expr = lower::lower_expr(attr.expr())?;
        let v = eval::evaluate_constant(&expr)
            .with_context(|| format!("evaluating var '{name}'"))?;
        out.insert(name.to_string(), v);
    }
    Ok(out)
}

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use indexmap::IndexMap;
use log::info;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfexpand::config::{self, Config as Settings, TargetConfig};
use tfexpand::frontend::load_var_file;
use tfexpand::graph::{block_dependencies, evaluation_order};
use tfexpand::secrets::CommandDecryptor;
use tfexpand::{
    apply_resource_filters, generate_with_backend, load_config, validate, Engine, FsLoader,
    RedeclarationPolicy, Value,
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tfexpand")]
#[command(about = "Evaluate Terraform-style HCL: variables, count/for_each expansion and comprehensions", long_about = None)]
struct Cli {
    /// HCL file or directory of *.tf / *.hcl files (default: current directory)
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Set a variable: --var key=value (repeatable)
    #[arg(long, global = true, value_parser = parse_key_val::<String, String>)]
    var: Vec<(String, String)>,

    /// Load variables from a file (HCL .tfvars or JSON). Can repeat.
    #[arg(long, global = true)]
    var_file: Vec<PathBuf>,

    /// Backend to use: json|yaml (ignored when running settings-file targets)
    #[arg(long, global = true, default_value = "json")]
    backend: String,

    /// Settings file (default: tfexpand.toml in the current directory, if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target name to run from the settings file
    #[arg(long, global = true)]
    target: Option<String>,

    /// What to do when an address is declared twice
    #[arg(long, global = true, value_enum)]
    redeclaration: Option<RedeclarationPolicy>,

    /// Print sensitive values instead of redacting them
    #[arg(long, global = true)]
    show_sensitive: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the configuration and print expanded resources and outputs (default)
    Eval {
        /// Write the result to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Check the configuration without evaluating it
    Validate {},
    /// Print the dependency graph in DOT format
    Graph {},
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut cli = Cli::parse();
    let command = cli.command.take().unwrap_or(Commands::Eval { output: None });

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
    let settings = config::load_config_from_path(&settings_path)
        .with_context(|| format!("failed to load {}", settings_path.display()))?;
    if cli.config.is_some() && settings.is_none() {
        bail!("{} not found", settings_path.display());
    }
    let root = settings_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let settings = settings.unwrap_or_default();

    match command {
        Commands::Eval { output } => {
            let run_targets =
                cli.target.is_some() || (cli.input.is_none() && !settings.targets.is_empty());
            if run_targets {
                let targets: Vec<&TargetConfig> = match &cli.target {
                    Some(name) => vec![settings.target(name).ok_or_else(|| {
                        anyhow!("target '{name}' not found in {}", settings_path.display())
                    })?],
                    None => settings.targets.iter().collect(),
                };
                for target in targets {
                    run_target(&settings, &root, target, &cli)?;
                }
            } else {
                let run = Run::new(&settings, &root, None, &cli)?;
                let eval = run.evaluate()?;
                let artifact = generate_with_backend(&cli.backend, &eval, cli.show_sensitive)?;
                write_or_print(output.as_deref(), &artifact)?;
            }
        }
        Commands::Validate {} => {
            let run = Run::new(&settings, &root, None, &cli)?;
            let cfg = run.load()?;
            validate(&cfg)?;
            info!(
                "Valid: {} variable(s), {} local(s), {} data source(s), {} resource(s), {} output(s)",
                cfg.variables.len(),
                cfg.locals.len(),
                cfg.data.len(),
                cfg.resources.len(),
                cfg.outputs.len()
            );
        }
        Commands::Graph {} => {
            let run = Run::new(&settings, &root, None, &cli)?;
            let cfg = run.load()?;
            let order = evaluation_order(&cfg)?;
            let blocks: HashMap<String, _> = cfg.blocks().into_iter().collect();
            println!("digraph {{");
            for addr in &order {
                println!("  \"{addr}\";");
                if let Some(block) = blocks.get(addr) {
                    for dep in block_dependencies(addr, *block) {
                        if blocks.contains_key(&dep) {
                            println!("  \"{addr}\" -> \"{dep}\";");
                        }
                    }
                }
            }
            println!("}}");
        }
    }

    Ok(())
}

/// Everything one evaluation needs, merged from the settings file, a target and the CLI.
struct Run {
    files: Vec<PathBuf>,
    base_dir: PathBuf,
    inputs: IndexMap<String, Value>,
    env: HashMap<String, String>,
    env_prefix: String,
    policy: RedeclarationPolicy,
    decrypt_command: Vec<String>,
}

impl Run {
    fn new(settings: &Settings, root: &Path, target: Option<&TargetConfig>, cli: &Cli) -> Result<Self> {
        let s = &settings.settings;
        let input = match (&cli.input, target.and_then(|t| t.input.as_deref()), s.input.as_deref()) {
            (Some(p), _, _) => p.clone(),
            (None, Some(p), _) | (None, None, Some(p)) => root.join(p),
            (None, None, None) => root.to_path_buf(),
        };
        let files = collect_input_files(&input)?;
        let base_dir = if input.is_dir() {
            input.clone()
        } else {
            input.parent().map(Path::to_path_buf).unwrap_or_default()
        };

        // Later sources win: settings var files, target var files, CLI var files, target vars,
        // CLI vars.
        let mut inputs = IndexMap::new();
        let target_files = target.map(|t| t.var_files.as_slice()).unwrap_or_default();
        for vf in s.var_files.iter().chain(target_files) {
            inputs.extend(load_var_file(&root.join(vf), &FsLoader)?);
        }
        for vf in &cli.var_file {
            inputs.extend(load_var_file(vf, &FsLoader)?);
        }
        if let Some(t) = target {
            for (k, v) in &t.vars {
                inputs.insert(k.clone(), toml_to_value(v)?);
            }
        }
        for (k, v) in &cli.var {
            inputs.insert(k.clone(), Value::from(v.as_str()));
        }

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.extend(s.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(Self {
            files,
            base_dir,
            inputs,
            env,
            env_prefix: s.env_prefix().to_string(),
            policy: cli.redeclaration.unwrap_or(s.redeclaration),
            decrypt_command: s.decrypt_command.clone(),
        })
    }

    fn load(&self) -> Result<tfexpand::Config> {
        load_config(&self.files, &FsLoader, self.policy)
    }

    fn evaluate(&self) -> Result<tfexpand::Evaluation> {
        let cfg = self.load()?;
        let mut engine = Engine::new()
            .with_base_dir(self.base_dir.clone())
            .with_inputs(self.inputs.clone())
            .with_env(self.env.clone())
            .with_env_prefix(self.env_prefix.clone());
        if let Some(decryptor) = CommandDecryptor::from_argv(&self.decrypt_command) {
            engine = engine.with_decryptor(Arc::new(decryptor));
        }
        Ok(engine.evaluate(&cfg)?)
    }
}

fn run_target(settings: &Settings, root: &Path, target: &TargetConfig, cli: &Cli) -> Result<()> {
    info!("Running target: {}", target.name);

    let run = Run::new(settings, root, Some(target), cli)?;
    let eval = run
        .evaluate()
        .with_context(|| format!("evaluating target '{}'", target.name))?;
    let filtered = apply_resource_filters(&eval, &target.include, &target.exclude);
    let artifact = generate_with_backend(&target.backend, &filtered, cli.show_sensitive)?;

    let output = target.output.as_ref().map(|o| root.join(o));
    write_or_print(output.as_deref(), &artifact)
}

fn write_or_print(output: Option<&Path>, artifact: &str) -> Result<()> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, artifact).with_context(|| format!("writing {}", path.display()))?;
            info!("Wrote output to: {}", path.display());
        }
        None => println!("{artifact}"),
    }
    Ok(())
}

/// A file as is, or the `*.tf` / `*.hcl` files directly inside a directory, sorted by name.
fn collect_input_files(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input {} does not exist", input.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(input).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        let is_config = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case("tf") || s.eq_ignore_ascii_case("hcl"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_config {
            files.push(entry.into_path());
        }
    }
    if files.is_empty() {
        bail!("no *.tf or *.hcl files in {}", input.display());
    }
    Ok(files)
}

fn toml_to_value(value: &toml::Value) -> Result<Value> {
    match value {
        toml::Value::String(s) => Ok(Value::from(s.as_str())),
        toml::Value::Integer(i) => Ok(Value::from(*i)),
        toml::Value::Float(f) => Ok(Value::from(*f)),
        toml::Value::Boolean(b) => Ok(Value::from(*b)),
        toml::Value::Datetime(d) => Ok(Value::from(d.to_string())),
        toml::Value::Array(arr) => arr
            .iter()
            .map(toml_to_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        toml::Value::Table(map) => {
            let mut out = tfexpand::Map::new();
            for (k, v) in map {
                out.insert(k.clone(), toml_to_value(v)?);
            }
            Ok(Value::Map(out))
        }
    }
}

fn parse_key_val<K, V>(s: &str) -> Result<(K, V)>
where
    K: std::str::FromStr,
    V: std::str::FromStr,
    <K as std::str::FromStr>::Err: std::fmt::Display,
    <V as std::str::FromStr>::Err: std::fmt::Display,
{
    let pos = s.find('=').ok_or_else(|| anyhow!("expected key=value"))?;
    let key = s[..pos]
        .parse()
        .map_err(|e| anyhow!("failed to parse key: {}", e))?;
    let value = s[pos + 1..]
        .parse()
        .map_err(|e| anyhow!("failed to parse value: {}", e))?;
    Ok((key, value))
}

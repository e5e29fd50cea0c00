//! Secret sources used by the `secret()` function.
//!
//! A reference is resolved to plaintext by a [`SecretSource`]. [`SecretRouter`] picks a source
//! by the reference's scheme (`env:DB_PASSWORD`, `file:creds.yml.enc`), so one configuration can
//! mix environment secrets with encrypted files.
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread;

use log::{debug, warn};

use crate::error::SecretError;
use crate::eval::{FuncArgs, FuncDef, FuncError};
use crate::value::{Value, ValueType};
use crate::Loader;

pub trait SecretSource: Send + Sync {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError>;
}

/// Reads secrets from environment variables; the reference is the variable name.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretSource {
    overrides: Option<HashMap<String, String>>,
}

impl EnvSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve against a fixed map instead of the process environment.
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self {
            overrides: Some(vars),
        }
    }
}

impl SecretSource for EnvSecretSource {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        let found = match &self.overrides {
            Some(vars) => vars.get(reference).cloned(),
            None => std::env::var(reference).ok(),
        };
        found.ok_or_else(|| SecretError::NotFound(reference.to_string()))
    }
}

/// Turns ciphertext into plaintext.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, reference: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError>;
}

/// For files that are stored decrypted.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextDecryptor;

impl Decryptor for PlaintextDecryptor {
    fn decrypt(&self, _reference: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        Ok(ciphertext.to_vec())
    }
}

/// Pipes the ciphertext to an external program (e.g. `sops -d /dev/stdin`) and reads the
/// plaintext from its stdout.
#[derive(Debug, Clone)]
pub struct CommandDecryptor {
    program: String,
    args: Vec<String>,
}

impl CommandDecryptor {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from an argv list as written in the settings file. `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }
}

impl Decryptor for CommandDecryptor {
    fn decrypt(&self, reference: &str, ciphertext: &[u8]) -> Result<Vec<u8>, SecretError> {
        let fail = |message: String| SecretError::Decrypt {
            reference: reference.to_string(),
            message,
        };
        debug!("decrypting {reference} with {}", self.program);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fail(format!("starting {}: {e}", self.program)))?;
        // stdin is written from another thread while stdout and stderr are drained here.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = ciphertext.to_vec();
            thread::spawn(move || stdin.write_all(&input))
        });
        let output = child
            .wait_with_output()
            .map_err(|e| fail(format!("waiting for {}: {e}", self.program)))?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // The program may exit without reading all of its input.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(fail(format!("writing to {}: {e}", self.program))),
                Err(_) => return Err(fail(format!("writer thread for {} panicked", self.program))),
            }
        }
        if !output.status.success() {
            return Err(fail(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

/// Reads an encrypted file through the [`Loader`] and decrypts it. The reference is a path,
/// relative to `base_dir` unless absolute.
pub struct EncryptedFileSource {
    loader: Arc<dyn Loader>,
    decryptor: Arc<dyn Decryptor>,
    base_dir: PathBuf,
}

impl EncryptedFileSource {
    pub fn new(loader: Arc<dyn Loader>, decryptor: Arc<dyn Decryptor>) -> Self {
        Self {
            loader,
            decryptor,
            base_dir: PathBuf::new(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}

impl SecretSource for EncryptedFileSource {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        let path = Path::new(reference);
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };
        if !self.loader.exists(&path) {
            return Err(SecretError::NotFound(reference.to_string()));
        }
        let ciphertext = self.loader.load_bytes(&path).map_err(|e| SecretError::Io {
            reference: reference.to_string(),
            message: format!("{e:#}"),
        })?;
        let plaintext = self.decryptor.decrypt(reference, &ciphertext)?;
        String::from_utf8(plaintext).map_err(|_| SecretError::InvalidUtf8(reference.to_string()))
    }
}

/// Dispatches `<scheme>:<name>` references to the source registered for the scheme.
#[derive(Default)]
pub struct SecretRouter {
    sources: HashMap<String, Arc<dyn SecretSource>>,
}

impl SecretRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, scheme: impl Into<String>, source: Arc<dyn SecretSource>) -> Self {
        self.sources.insert(scheme.into(), source);
        self
    }
}

impl SecretSource for SecretRouter {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        let (scheme, name) = reference
            .split_once(':')
            .filter(|(s, n)| !s.is_empty() && !n.is_empty())
            .ok_or_else(|| SecretError::UnsupportedReference(reference.to_string()))?;
        let source = self
            .sources
            .get(scheme)
            .ok_or_else(|| SecretError::UnsupportedReference(reference.to_string()))?;
        source.resolve_secret(name)
    }
}

/// Retries retryable failures of the wrapped source up to `attempts` times in total.
pub struct Retrying<S> {
    inner: S,
    attempts: usize,
}

impl<S: SecretSource> Retrying<S> {
    pub fn new(inner: S, attempts: usize) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
        }
    }
}

impl<S: SecretSource> SecretSource for Retrying<S> {
    fn resolve_secret(&self, reference: &str) -> Result<String, SecretError> {
        let mut attempt = 1;
        loop {
            match self.inner.resolve_secret(reference) {
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    warn!("resolving secret '{reference}' failed (attempt {attempt}): {e}");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// `secret(reference)`: the plaintext of a secret, e.g. `yamldecode(secret("file:creds.yml"))`.
pub fn create_secret_func(source: Arc<dyn SecretSource>) -> FuncDef {
    FuncDef::builder()
        .param(ValueType::String)
        .build(move |args: FuncArgs| {
            let plaintext = source.resolve_secret(args.str(0)?).map_err(FuncError::from)?;
            Ok(Value::from(plaintext))
        })
}

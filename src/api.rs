use crate::context::Context;
use crate::error::{ParseError, TycoError};
use crate::serialization::{to_value, Value};
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension picked up when loading a directory.
pub const EXTENSION: &str = "tyco";

impl Serialize for Context {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl Context {
    /// Projects the resolved globals and primary-keyed structs into a
    /// generic, serializable `Value`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        to_value(self)
    }

    /// Serializes the resolved data into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the resolved data into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }
}

/// Every `.tyco` file below `dir`, in a stable order.
fn collect_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().is_some_and(|ext| ext == EXTENSION))
        .collect();
    files.sort();
    files
}

/// Loads a file, or every `.tyco` file under a directory, into one resolved
/// context.
///
/// Files reached through `#include` are scanned once, no matter how many
/// times they are named.
///
/// # Errors
/// Returns a `TycoError` carrying the source name and offending line when
/// any file fails to scan or resolve.
pub fn load(path: impl AsRef<Path>) -> Result<Context, TycoError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        collect_files(path)
    } else {
        vec![path.to_path_buf()]
    };
    log::info!("loading {} file(s) from {}", files.len(), path.display());

    let mut ctx = Context::new();
    for file in &files {
        ctx.scan_path(file).map_err(|e| ctx.annotate(e))?;
    }
    finish(ctx)
}

/// Loads in-memory text. Relative includes resolve against the current
/// working directory.
///
/// # Errors
/// Returns a `TycoError` when the text fails to scan or resolve.
pub fn load_text(content: &str) -> Result<Context, TycoError> {
    let mut ctx = Context::new();
    ctx.scan_text("<string>", content)
        .map_err(|e| ctx.annotate(e))?;
    finish(ctx)
}

fn finish(mut ctx: Context) -> Result<Context, TycoError> {
    ctx.resolve().map_err(|e: ParseError| ctx.annotate(e))?;
    Ok(ctx)
}

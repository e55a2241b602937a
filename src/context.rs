use crate::ast::{Document, NodeId};
use crate::error::ParseError;
use crate::parser::Parser;
use crate::resolver;
use crate::schema::{Defaults, Struct};
use crate::text::{SourceId, Text};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One scanned unit of input.
#[derive(Debug)]
pub(crate) struct Source {
    pub(crate) name: String,
    pub(crate) text: String,
    /// Canonical path for files; `None` for in-memory text.
    pub(crate) path: Option<PathBuf>,
    /// Per-type default overrides visible in this source: type → attribute → node.
    pub(crate) defaults: HashMap<String, Defaults>,
    complete: bool,
}

/// A load session: every node, global, struct and source reached while loading.
///
/// Built by [`crate::load`] or [`crate::load_text`]; fully resolved by the
/// time it is handed out.
#[derive(Debug, Default)]
pub struct Context {
    pub(crate) doc: Document,
    pub(crate) globals: Vec<(String, NodeId)>,
    pub(crate) structs: Vec<Struct>,
    pub(crate) struct_index: HashMap<String, usize>,
    pub(crate) sources: Vec<Source>,
    path_cache: HashMap<PathBuf, SourceId>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// The node bound to a global attribute.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<NodeId> {
        self.globals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
    }

    /// Globals in declaration order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.globals.iter().map(|(n, id)| (n.as_str(), *id))
    }

    /// Structs in declaration order.
    #[must_use]
    pub fn structs(&self) -> &[Struct] {
        &self.structs
    }

    #[must_use]
    pub fn get_struct(&self, type_name: &str) -> Option<&Struct> {
        self.struct_id(type_name).map(|idx| &self.structs[idx])
    }

    /// Display name of a source (`<string>` for in-memory text).
    #[must_use]
    pub fn source_name(&self, id: SourceId) -> Option<&str> {
        self.sources.get(id.index()).map(|s| s.name.as_str())
    }

    pub(crate) fn struct_id(&self, type_name: &str) -> Option<usize> {
        self.struct_index.get(type_name).copied()
    }

    pub(crate) fn add_struct(&mut self, type_name: &str) -> usize {
        let idx = self.structs.len();
        self.structs.push(Struct::new(type_name));
        self.struct_index.insert(type_name.to_string(), idx);
        log::trace!("declared struct {type_name}");
        idx
    }

    pub(crate) fn source(&self, id: SourceId) -> &Source {
        &self.sources[id.index()]
    }

    pub(crate) fn defaults_mut(&mut self, id: SourceId) -> &mut HashMap<String, Defaults> {
        &mut self.sources[id.index()].defaults
    }

    /// Scans a file once; later requests for the same canonical path return
    /// the cached source, even while it is still being scanned.
    pub(crate) fn scan_path(&mut self, path: &Path) -> Result<SourceId, ParseError> {
        if !path.exists() {
            return Err(ParseError::bare(format!(
                "Unable to find path {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(ParseError::bare(format!(
                "Can only load path if it is a regular file: {}",
                path.display()
            )));
        }
        let canonical = fs::canonicalize(path).map_err(|e| {
            ParseError::bare(format!("Unable to find path {}: {e}", path.display()))
        })?;
        if let Some(&id) = self.path_cache.get(&canonical) {
            if !self.source(id).complete {
                log::warn!(
                    "include cycle through {}; continuing with the partially scanned source",
                    path.display()
                );
            }
            return Ok(id);
        }
        let text = fs::read_to_string(path).map_err(|e| {
            ParseError::bare(format!("Unable to read {}: {e}", path.display()))
        })?;
        let id = self.add_source(path.display().to_string(), text, Some(canonical.clone()));
        self.path_cache.insert(canonical, id);
        self.scan_source(id)?;
        Ok(id)
    }

    /// Scans in-memory text as an anonymous source.
    pub(crate) fn scan_text(&mut self, name: &str, content: &str) -> Result<SourceId, ParseError> {
        let id = self.add_source(name.to_string(), content.to_string(), None);
        self.scan_source(id)?;
        Ok(id)
    }

    fn add_source(&mut self, name: String, text: String, path: Option<PathBuf>) -> SourceId {
        let mut text = text.replace("\r\n", "\n");
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        let id = SourceId(self.sources.len());
        self.sources.push(Source {
            name,
            text,
            path,
            defaults: HashMap::new(),
            complete: false,
        });
        id
    }

    fn scan_source(&mut self, id: SourceId) -> Result<(), ParseError> {
        let source = self.source(id);
        log::debug!("scanning {}", source.name);
        let lines: Vec<Text> = source
            .text
            .split_inclusive('\n')
            .enumerate()
            .map(|(i, line)| Text::new(line, id, i + 1, 1))
            .collect();
        Parser::new(self, id, lines).parse()?;
        self.sources[id.index()].complete = true;
        log::debug!("finished scanning {}", self.source(id).name);
        Ok(())
    }

    /// Runs the resolution passes over everything scanned so far.
    pub(crate) fn resolve(&mut self) -> Result<(), ParseError> {
        resolver::resolve(self)
    }

    /// Attaches the source name, offending line and span to a located error.
    pub(crate) fn annotate(&self, err: ParseError) -> ParseError {
        match err.location().and_then(|loc| self.sources.get(loc.source.index())) {
            Some(source) => err.annotate(&source.name, &source.text),
            None => err,
        }
    }
}

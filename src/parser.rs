use crate::ast::{Arg, NodeId, SchemaInfo};
use crate::context::Context;
use crate::error::ParseError;
use crate::lexer::{
    include_path, looks_like_schema_typo, match_block, match_default, match_global, match_row,
    match_schema, strip_comments, Decl, Lexer, STRUCTURAL,
};
use crate::schema::{Attribute, Defaults};
use crate::text::{SourceId, Text};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One parsed attribute value and the delimiter that ended it.
#[derive(Debug)]
struct ParsedAttr {
    key: Option<String>,
    node: NodeId,
    delim: char,
}

/// Scans one source line by line, populating the context as it goes.
pub struct Parser<'c> {
    ctx: &'c mut Context,
    source: SourceId,
    lexer: Lexer,
}

impl<'c> Parser<'c> {
    pub fn new(ctx: &'c mut Context, source: SourceId, lines: Vec<Text>) -> Self {
        Self {
            ctx,
            source,
            lexer: Lexer::new(lines),
        }
    }

    pub fn parse(&mut self) -> Result<(), ParseError> {
        while let Some(line) = self.lexer.pop_front() {
            if let Some(path) = include_path(&line) {
                let path = path.to_string();
                self.parse_include(&path, &line)?;
                continue;
            }
            if let Some(decl) = match_global(&line) {
                self.parse_global(&line, &decl)?;
                continue;
            }
            if let Some((type_name, end)) = match_block(&line) {
                self.parse_block(&line, &type_name, end)?;
                continue;
            }
            if strip_comments(&line)?.is_empty() {
                continue;
            }
            return Err(ParseError::new(
                "Malformatted config line - expecting an include, struct block, or global",
                &line,
            ));
        }
        Ok(())
    }

    fn defaults(&self) -> &HashMap<String, Defaults> {
        &self.ctx.source(self.source).defaults
    }

    fn defaults_mut(&mut self) -> &mut HashMap<String, Defaults> {
        self.ctx.defaults_mut(self.source)
    }

    /// Includes resolve against the including file's directory, or the
    /// working directory for in-memory text.
    fn base_dir(&self) -> Result<PathBuf, ParseError> {
        match self.ctx.source(self.source).path.as_deref().and_then(Path::parent) {
            Some(dir) => Ok(dir.to_path_buf()),
            None => std::env::current_dir().map_err(|e| {
                ParseError::bare(format!("Unable to determine the working directory: {e}"))
            }),
        }
    }

    fn parse_include(&mut self, raw: &str, line: &Text) -> Result<(), ParseError> {
        let target = Path::new(raw);
        let target = if target.is_absolute() {
            target.to_path_buf()
        } else {
            self.base_dir()?.join(target)
        };
        log::debug!("including {}", target.display());
        let included = self.ctx.scan_path(&target).map_err(|e| {
            if e.is_located() {
                e
            } else {
                ParseError::new(e.message(), line)
            }
        })?;
        // Later writers win per attribute; the included source keeps its own map.
        let inherited = self.ctx.source(included).defaults.clone();
        let own = self.defaults_mut();
        for (type_name, attrs) in inherited {
            own.entry(type_name).or_default().extend(attrs);
        }
        Ok(())
    }

    fn parse_global(&mut self, line: &Text, decl: &Decl) -> Result<(), ParseError> {
        if self.ctx.global(&decl.name).is_some() {
            return Err(ParseError::new(
                format!("Global attribute '{}' is defined more than once", decl.name),
                line,
            ));
        }
        let value = line.slice_from(decl.value_start).trim_start();
        if value.is_empty() {
            return Err(ParseError::new(
                "Must provide a value when setting globals",
                &value,
            ));
        }
        self.lexer.push_front(value);
        let attr = self.parse_attr(&['\n'], &[], true, Some(&decl.name))?;
        let info = SchemaInfo::field(
            &decl.type_name,
            &decl.name,
            decl.flag == Some('?'),
            decl.array,
        );
        self.ctx.doc.apply_schema(attr.node, &info)?;
        self.ctx.globals.push((decl.name.clone(), attr.node));
        log::trace!("global {} declared", decl.name);
        Ok(())
    }

    fn parse_block(&mut self, line: &Text, type_name: &str, end: usize) -> Result<(), ParseError> {
        let rest = strip_comments(&line.slice_from(end))?;
        if !rest.trim().is_empty() {
            return Err(ParseError::new(
                format!("Unexpected content after struct block header '{type_name}:'"),
                &rest.trim_start(),
            ));
        }
        let idx = match self.ctx.struct_id(type_name) {
            Some(idx) => idx,
            None => {
                let idx = self.ctx.add_struct(type_name);
                self.parse_schema(idx)?;
                idx
            }
        };
        self.parse_rows(idx)
    }

    fn parse_schema(&mut self, idx: usize) -> Result<(), ParseError> {
        let type_name = self.ctx.structs[idx].type_name.clone();
        self.defaults_mut().insert(type_name.clone(), Defaults::new());
        while let Some(front) = self.lexer.front() {
            let content = strip_comments(front)?;
            if content.is_empty() {
                self.lexer.pop_front();
                continue;
            }
            let Some(decl) = match_schema(&content) else {
                if looks_like_schema_typo(&content) {
                    return Err(ParseError::new(
                        "Schema attribute likely missing trailing colon",
                        &content.trim_start(),
                    ));
                }
                break;
            };
            let Some(line) = self.lexer.pop_front() else {
                break;
            };
            let attr = Attribute {
                name: decl.name.clone(),
                type_name: decl.type_name.clone(),
                primary_key: decl.flag == Some('*'),
                nullable: decl.flag == Some('?'),
                array: decl.array,
            };
            self.ctx.structs[idx].add_attribute(attr.clone(), &line)?;
            let default = line.slice_from(decl.value_start).trim_start();
            if !strip_comments(&default)?.is_empty() {
                self.lexer.push_front(default);
                let node = self.parse_default_value(&attr)?;
                self.defaults_mut()
                    .entry(type_name.clone())
                    .or_default()
                    .insert(attr.name, node);
            }
        }
        Ok(())
    }

    fn parse_default_value(&mut self, attr: &Attribute) -> Result<NodeId, ParseError> {
        let parsed = self.parse_attr(&['\n'], &[], true, Some(&attr.name))?;
        let info = SchemaInfo::field(&attr.type_name, &attr.name, attr.nullable, attr.array);
        self.ctx.doc.apply_schema(parsed.node, &info)?;
        Ok(parsed.node)
    }

    /// Default overrides and instance rows, up to the next unindented line.
    fn parse_rows(&mut self, idx: usize) -> Result<(), ParseError> {
        while let Some(front) = self.lexer.front() {
            if front.starts_with("#include ") {
                break;
            }
            let content = strip_comments(front)?;
            if content.is_empty() {
                self.lexer.pop_front();
                continue;
            }
            if !front.starts_with(char::is_whitespace) {
                break;
            }
            if match_schema(&content).is_some() {
                return Err(ParseError::new(
                    "Cannot add schema attributes after initial construction",
                    front,
                ));
            }
            let Some(line) = self.lexer.pop_front() else {
                break;
            };
            if let Some((name, start)) = match_default(&line) {
                self.parse_default_override(idx, &line, &name, start)?;
            } else if let Some(start) = match_row(&line) {
                self.parse_row(idx, &line, start)?;
            } else {
                return Err(ParseError::new(
                    "Malformatted struct line - expecting a default or an instance row",
                    &line.trim_start(),
                ));
            }
        }
        Ok(())
    }

    fn parse_default_override(
        &mut self,
        idx: usize,
        line: &Text,
        name: &str,
        start: usize,
    ) -> Result<(), ParseError> {
        let type_name = self.ctx.structs[idx].type_name.clone();
        let Some(attr) = self.ctx.structs[idx].attribute(name).cloned() else {
            return Err(ParseError::new(
                format!("{name} not found in the schema for {type_name}"),
                &line.trim_start(),
            ));
        };
        let value = line.slice_from(start).trim_start();
        if strip_comments(&value)?.is_empty() {
            if let Some(defaults) = self.defaults_mut().get_mut(&type_name) {
                defaults.remove(name);
            }
            return Ok(());
        }
        self.lexer.push_front(value);
        let node = self.parse_default_value(&attr)?;
        self.defaults_mut()
            .entry(type_name)
            .or_default()
            .insert(attr.name, node);
        Ok(())
    }

    fn parse_row(&mut self, idx: usize, line: &Text, start: usize) -> Result<(), ParseError> {
        self.lexer.push_front(line.slice_from(start).trim_start());
        let mut args = Vec::new();
        while let Some(front) = self.lexer.front() {
            let content = strip_comments(front)?;
            if content.is_empty() {
                self.lexer.pop_front();
                break;
            }
            if content == "\\" {
                self.lexer.pop_front();
                self.lexer.trim_front();
                continue;
            }
            let attr = self.parse_attr(&[',', '\n'], &[], false, None)?;
            args.push(Arg {
                key: attr.key,
                node: attr.node,
            });
        }
        let fragment = match args.first() {
            Some(arg) => self.ctx.doc.node(arg.node).fragment.clone(),
            None => line.clone(),
        };
        let type_name = self.ctx.structs[idx].type_name.clone();
        let defaults = self.ctx.sources[self.source.index()]
            .defaults
            .get(&type_name);
        let id = self.ctx.structs[idx].build_instance(&mut self.ctx.doc, args, defaults, &fragment)?;
        self.ctx.structs[idx].push_instance(id);
        log::trace!("{type_name} row at line {}", line.row());
        Ok(())
    }

    /// Parses one attribute value at the front of the queue.
    ///
    /// `good` lists the delimiters that may end the value; `bad` extends the
    /// structural characters that must not appear unquoted. With
    /// `fixed_name` set the value belongs to a declared attribute and a
    /// leading `name:` is rejected.
    fn parse_attr(
        &mut self,
        good: &[char],
        bad: &[char],
        pop_empty: bool,
        fixed_name: Option<&str>,
    ) -> Result<ParsedAttr, ParseError> {
        let bad: Vec<char> = bad
            .iter()
            .chain(STRUCTURAL.iter())
            .copied()
            .filter(|c| !good.contains(c))
            .collect();

        let mut key = None;
        if let Some((name, skip)) = self.lexer.peek_key() {
            if fixed_name.is_some() {
                return Err(self.colon_error(&name));
            }
            self.lexer.advance(skip)?;
            if let Some((second, _)) = self.lexer.peek_key() {
                return Err(self.colon_error(&second));
            }
            key = Some(name);
        }

        let front = self.lexer.current()?.clone();
        let (node, delim) = if front.starts_with('[') {
            self.lexer.advance(1)?;
            let items = self.parse_list(']', &front)?;
            let node = self.build_array(items, &front)?;
            (node, self.lexer.strip_delim(good)?)
        } else if let Some((type_name, skip)) = self.lexer.peek_call() {
            self.lexer.advance(skip)?;
            let args = self.parse_list(')', &front)?;
            let node = self.build_call(&type_name, args, &front)?;
            (node, self.lexer.strip_delim(good)?)
        } else if front.starts_with(['"', '\'']) {
            let content = self.lexer.read_string()?;
            let node = self.ctx.doc.scalar(content);
            (node, self.lexer.strip_delim(good)?)
        } else {
            let (content, delim) = self.lexer.read_bare(good, &bad)?;
            (self.ctx.doc.scalar(content), delim)
        };

        self.lexer.skip_inline_space();
        if pop_empty && self.lexer.front().is_some_and(|f| f.is_empty()) {
            self.lexer.pop_front();
        }
        if let Some(name) = key.as_deref().or(fixed_name) {
            self.ctx.doc.node_mut(node).attr_name = Some(name.to_string());
        }
        Ok(ParsedAttr { key, node, delim })
    }

    fn colon_error(&self, name: &str) -> ParseError {
        let message = format!(
            "Colon : found in content - enclose in quotes to prevent being used as a field name: {name}"
        );
        match self.lexer.front() {
            Some(front) => ParseError::new(message, front),
            None => ParseError::bare(message),
        }
    }

    /// Comma-separated values up to `closing`; blank lines, comment lines
    /// and a trailing comma are allowed.
    fn parse_list(&mut self, closing: char, opening: &Text) -> Result<Vec<Arg>, ParseError> {
        let good = [closing, ','];
        let bad = if closing == ']' { [')'] } else { [']'] };
        let mut items = Vec::new();
        loop {
            let Some(front) = self.lexer.front() else {
                return Err(ParseError::new(
                    format!("Unterminated list; expected '{closing}' before end of file"),
                    opening,
                ));
            };
            if strip_comments(front)?.is_empty() {
                self.lexer.pop_front();
                continue;
            }
            self.lexer.skip_inline_space();
            if self.lexer.front().is_some_and(|f| f.starts_with(closing)) {
                self.lexer.advance(closing.len_utf8())?;
                break;
            }
            let attr = self.parse_attr(&good, &bad, true, None)?;
            items.push(Arg {
                key: attr.key,
                node: attr.node,
            });
            if attr.delim == closing {
                break;
            }
        }
        Ok(items)
    }

    fn build_array(&mut self, items: Vec<Arg>, opening: &Text) -> Result<NodeId, ParseError> {
        if let Some(Arg { key: Some(key), node }) = items.iter().find(|a| a.key.is_some()) {
            return Err(ParseError::new(
                format!("Array elements cannot be keyed: {key}"),
                &self.ctx.doc.node(*node).fragment,
            ));
        }
        let nodes = items.into_iter().map(|a| a.node).collect();
        Ok(self.ctx.doc.array(nodes, opening.clone()))
    }

    /// `Type(...)` builds an inline instance when `Type` is already known and
    /// has no primary key; otherwise it is a reference resolved later.
    fn build_call(
        &mut self,
        type_name: &str,
        args: Vec<Arg>,
        opening: &Text,
    ) -> Result<NodeId, ParseError> {
        match self.ctx.struct_id(type_name) {
            Some(idx) if self.ctx.structs[idx].primary_keys().is_empty() => {
                let defaults = self.defaults().get(type_name).cloned();
                self.ctx.structs[idx].build_instance(
                    &mut self.ctx.doc,
                    args,
                    defaults.as_ref(),
                    opening,
                )
            }
            _ => Ok(self.ctx.doc.reference(type_name, args, opening.clone())),
        }
    }
}

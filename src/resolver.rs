//! Resolution passes run once every source has been scanned.
//!
//! The passes run in a fixed order over the whole context: parents, base
//! values, primary-key indices, references, then templates. Each later pass
//! depends on every earlier one having completed for all sources.

use crate::ast::{BaseType, Document, Literal, NodeId, NodeKind, Parent, Rendered};
use crate::context::Context;
use crate::error::ParseError;
use crate::utils::unescape;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use bigdecimal::BigDecimal;
use std::str::FromStr;

pub(crate) fn resolve(ctx: &mut Context) -> Result<(), ParseError> {
    set_parents(ctx);
    log::debug!("resolver: parents set");
    render_base_content(ctx)?;
    log::debug!("resolver: base content rendered");
    for s in &mut ctx.structs {
        s.load_primary_keys(&ctx.doc)?;
    }
    log::debug!("resolver: primary keys indexed");
    render_references(ctx)?;
    log::debug!("resolver: references resolved");
    render_templates(ctx)?;
    log::debug!("resolver: templates expanded");
    Ok(())
}

fn instance_ids(ctx: &Context) -> Vec<NodeId> {
    ctx.structs
        .iter()
        .flat_map(|s| s.instances().iter().copied())
        .collect()
}

fn global_ids(ctx: &Context) -> Vec<NodeId> {
    ctx.globals.iter().map(|(_, id)| *id).collect()
}

/// Every default node held by any source, each exactly once.
fn default_ids(ctx: &Context) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = ctx
        .sources
        .iter()
        .flat_map(|src| src.defaults.values())
        .flat_map(|attrs| attrs.values().copied())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

// --- Pass 1: parents ---

fn set_parents(ctx: &mut Context) {
    for (_, id) in &ctx.globals {
        set_parent(&mut ctx.doc, *id, Parent::Globals);
    }
    for s in &ctx.structs {
        for &id in s.instances() {
            set_parent(&mut ctx.doc, id, Parent::Unset);
        }
    }
}

/// Arrays are transparent: their items share the array's own parent.
fn set_parent(doc: &mut Document, id: NodeId, parent: Parent) {
    doc.node_mut(id).parent = parent;
    match &doc.node(id).kind {
        NodeKind::Array(items) => {
            for item in items.clone() {
                set_parent(doc, item, parent);
            }
        }
        NodeKind::Instance(inst) => {
            let fields: Vec<NodeId> = inst.fields.iter().map(|(_, f)| *f).collect();
            for field in fields {
                set_parent(doc, field, Parent::Node(id));
            }
        }
        NodeKind::Scalar(_) | NodeKind::Reference(_) => {}
    }
}

// --- Pass 2: base content ---

fn render_base_content(ctx: &mut Context) -> Result<(), ParseError> {
    let ids = default_ids(ctx)
        .into_iter()
        .chain(global_ids(ctx))
        .chain(instance_ids(ctx));
    for id in ids {
        render_base(&mut ctx.doc, id)?;
    }
    Ok(())
}

/// Reference arguments are left alone; they are rendered while the
/// reference is looked up.
fn render_base(doc: &mut Document, id: NodeId) -> Result<(), ParseError> {
    match &doc.node(id).kind {
        NodeKind::Scalar(_) => render_scalar(doc, id),
        NodeKind::Reference(_) => Ok(()),
        NodeKind::Array(_) | NodeKind::Instance(_) => {
            for child in doc.node(id).children() {
                render_base(doc, child)?;
            }
            Ok(())
        }
    }
}

/// Converts one scalar's source text to its typed value.
pub(crate) fn render_scalar(doc: &mut Document, id: NodeId) -> Result<(), ParseError> {
    let node = doc.node(id);
    let NodeKind::Scalar(scalar) = &node.kind else {
        return Err(ParseError::internal(
            "only plain values can be rendered",
            &node.fragment,
        ));
    };
    if !scalar.value.is_pending() {
        return Err(ParseError::internal(
            "value was rendered more than once",
            &node.fragment,
        ));
    }
    let (Some(type_name), Some(_), Some(nullable), Some(_)) = (
        node.type_name.as_deref(),
        node.attr_name.as_ref(),
        node.nullable,
        node.array,
    ) else {
        return Err(ParseError::internal(
            "attribute metadata missing before rendering",
            &node.fragment,
        ));
    };
    let text = scalar.content.as_str();
    let literal = type_name == BaseType::Str.name() && text.starts_with('\'');
    let value = if nullable && text == "null" {
        Literal::Null
    } else {
        parse_literal(type_name, text).map_err(|msg| ParseError::new(msg, &scalar.content))?
    };
    if let NodeKind::Scalar(s) = &mut doc.node_mut(id).kind {
        s.value = Rendered::Resolved(value);
        s.literal = literal;
    }
    Ok(())
}

fn parse_literal(type_name: &str, text: &str) -> Result<Literal, String> {
    let Some(base) = BaseType::from_name(type_name) else {
        return Err(format!("Unsupported type '{type_name}'"));
    };
    match base {
        BaseType::Str => Ok(Literal::Str(unquote(text).to_string())),
        BaseType::Int => parse_int(text)
            .map(Literal::Int)
            .ok_or_else(|| format!("'{text}' is not a valid integer literal")),
        BaseType::Float => parse_float(text)
            .map(Literal::Float)
            .ok_or_else(|| format!("'{text}' is not a valid floating-point literal")),
        BaseType::Decimal => BigDecimal::from_str(text)
            .map(Literal::Decimal)
            .map_err(|_| format!("'{text}' is not a valid decimal literal")),
        BaseType::Bool => match text {
            "true" => Ok(Literal::Bool(true)),
            "false" => Ok(Literal::Bool(false)),
            _ => Err(format!(
                "Boolean fields must be either 'true' or 'false', but '{text}' was provided"
            )),
        },
        BaseType::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(Literal::Date)
            .map_err(|_| format!("'{text}' is not a valid ISO-8601 date (YYYY-MM-DD)")),
        BaseType::Time => parse_time(text)
            .map(Literal::Time)
            .ok_or_else(|| format!("'{text}' is not a valid ISO-8601 time (HH:MM:SS)")),
        BaseType::DateTime => parse_datetime(text).ok_or_else(|| {
            format!("'{text}' is not a valid ISO-8601 datetime (YYYY-MM-DD HH:MM:SS±TZ)")
        }),
    }
}

/// Strips the quotes of a quoted string; a triple-quoted string also loses
/// one leading newline. Bare text is returned as is.
fn unquote(text: &str) -> &str {
    for triple in ["'''", "\"\"\""] {
        if let Some(inner) = text
            .strip_prefix(triple)
            .and_then(|t| t.strip_suffix(triple))
        {
            return inner.strip_prefix('\n').unwrap_or(inner);
        }
    }
    match text.chars().next() {
        Some(q @ ('"' | '\'')) if text.len() >= 2 && text.ends_with(q) => &text[1..text.len() - 1],
        _ => text,
    }
}

/// Removes `_` digit separators; they may only sit between digits.
fn strip_separators(digits: &str) -> Option<String> {
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    Some(digits.chars().filter(|&c| c != '_').collect())
}

fn parse_int(text: &str) -> Option<i64> {
    let (sign, body) = match text.chars().next() {
        Some(c @ ('-' | '+')) => (c, &text[1..]),
        _ => ('+', text),
    };
    let (radix, digits) = match body.get(..2) {
        Some("0x" | "0X") => (16, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        Some("0o" | "0O") => (8, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        Some("0b" | "0B") => (2, body[2..].strip_prefix('_').unwrap_or(&body[2..])),
        _ => (10, body),
    };
    let digits = strip_separators(digits)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    i64::from_str_radix(&format!("{sign}{digits}"), radix).ok()
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned = strip_separators(text)?;
    cleaned.parse::<f64>().ok()
}

fn parse_time(text: &str) -> Option<NaiveTime> {
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(text, fmt).ok())
}

/// Accepts a `T` or space separator, an optional `Z` or `±HH:MM` offset,
/// and a bare date (midnight).
fn parse_datetime(text: &str) -> Option<Literal> {
    let mut normalized = text.to_string();
    if text.len() > 10 && text.is_char_boundary(10) && text.is_char_boundary(11) {
        if let " " | "T" = &text[10..11] {
            normalized = format!("{}T{}", &text[..10], &text[11..]);
        }
    }
    if let Some(utc) = normalized.strip_suffix('Z') {
        normalized = format!("{utc}+00:00");
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"] {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Some(Literal::DateTimeTz(dt));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(Literal::DateTime(dt));
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(Literal::DateTime)
}

// --- Pass 4: references ---

fn render_references(ctx: &mut Context) -> Result<(), ParseError> {
    let ids: Vec<NodeId> = default_ids(ctx)
        .into_iter()
        .chain(global_ids(ctx))
        .chain(instance_ids(ctx))
        .collect();
    for id in ids {
        resolve_references(ctx, id)?;
    }
    Ok(())
}

fn resolve_references(ctx: &mut Context, id: NodeId) -> Result<(), ParseError> {
    let node = ctx.doc.node(id);
    match &node.kind {
        NodeKind::Scalar(_) => Ok(()),
        NodeKind::Array(_) | NodeKind::Instance(_) => {
            for child in node.children() {
                resolve_references(ctx, child)?;
            }
            Ok(())
        }
        NodeKind::Reference(r) => {
            if !r.target.is_pending() {
                return Err(ParseError::internal(
                    "reference was resolved more than once",
                    &node.fragment,
                ));
            }
            let Some(&idx) = ctx.struct_index.get(&r.type_name) else {
                return Err(ParseError::new(
                    format!("Unknown struct '{}' referenced", r.type_name),
                    &node.fragment,
                ));
            };
            let args = r.args.clone();
            let fragment = node.fragment.clone();
            let target = ctx.structs[idx].load_reference(&mut ctx.doc, args, &fragment)?;
            log::trace!("resolved {} reference at {}:{}", ctx.structs[idx].type_name, fragment.row(), fragment.col());
            if let NodeKind::Reference(r) = &mut ctx.doc.node_mut(id).kind {
                r.target = Rendered::Resolved(target);
            }
            Ok(())
        }
    }
}

// --- Pass 5: templates ---

fn render_templates(ctx: &mut Context) -> Result<(), ParseError> {
    let ids: Vec<NodeId> = global_ids(ctx).into_iter().chain(instance_ids(ctx)).collect();
    for id in ids {
        expand_node(&mut ctx.doc, &ctx.globals, id)?;
    }
    Ok(())
}

fn expand_node(
    doc: &mut Document,
    globals: &[(String, NodeId)],
    id: NodeId,
) -> Result<(), ParseError> {
    match &doc.node(id).kind {
        NodeKind::Scalar(_) => expand_scalar(doc, globals, id),
        NodeKind::Reference(_) => Ok(()),
        NodeKind::Array(_) | NodeKind::Instance(_) => {
            for child in doc.node(id).children() {
                expand_node(doc, globals, child)?;
            }
            Ok(())
        }
    }
}

fn expand_scalar(
    doc: &mut Document,
    globals: &[(String, NodeId)],
    id: NodeId,
) -> Result<(), ParseError> {
    let node = doc.node(id);
    let NodeKind::Scalar(scalar) = &node.kind else {
        return Ok(());
    };
    if node.type_name.as_deref() != Some(BaseType::Str.name()) || scalar.literal {
        return Ok(());
    }
    let current = match scalar.value.get() {
        Some(Literal::Str(s)) => s.clone(),
        Some(Literal::Null) => return Ok(()),
        _ => {
            return Err(ParseError::internal(
                "string value was not rendered before templating",
                &node.fragment,
            ))
        }
    };
    let fragment = node.fragment.clone();
    let parent = node.parent;
    let expanded = {
        let doc: &Document = doc;
        substitute(&current, |placeholder, path| {
            lookup_template(doc, globals, parent, path).map_err(|msg| {
                ParseError::new(format!("Template '{placeholder}' {msg}"), &fragment)
            })
        })?
    };
    if let NodeKind::Scalar(s) = &mut doc.node_mut(id).kind {
        s.value = Rendered::Resolved(Literal::Str(unescape(&expanded)));
    }
    Ok(())
}

/// Replaces every `{path}` placeholder (`path` made of word characters and
/// dots) with the value produced by `render(placeholder, path)`.
fn substitute(
    content: &str,
    mut render: impl FnMut(&str, &str) -> Result<String, ParseError>,
) -> Result<String, ParseError> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let len = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
            .unwrap_or(after.len());
        if len > 0 && after[len..].starts_with('}') {
            out.push_str(&rest[..open]);
            out.push_str(&render(&rest[open..open + len + 2], &after[..len])?);
            rest = &after[len + 1..];
        } else {
            out.push_str(&rest[..=open]);
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Globals,
    Node(NodeId),
}

fn scope_of(parent: Parent) -> Option<Scope> {
    match parent {
        Parent::Unset => None,
        Parent::Globals => Some(Scope::Globals),
        Parent::Node(id) => Some(Scope::Node(id)),
    }
}

fn lookup(doc: &Document, globals: &[(String, NodeId)], scope: Scope, attr: &str) -> Option<Scope> {
    let field_of = |id: NodeId| match &doc.node(id).kind {
        NodeKind::Instance(inst) => inst.field(attr),
        NodeKind::Reference(r) => r.target.get().and_then(|target| match &doc.node(*target).kind {
            NodeKind::Instance(inst) => inst.field(attr),
            _ => None,
        }),
        _ => None,
    };
    let found = match scope {
        Scope::Globals => globals.iter().find(|(n, _)| n == attr).map(|(_, id)| *id),
        Scope::Node(id) => field_of(id),
    };
    found.map(Scope::Node)
}

/// Resolves a placeholder path from `parent`; errors carry only the tail
/// of the message.
fn lookup_template(
    doc: &Document,
    globals: &[(String, NodeId)],
    parent: Parent,
    path: &str,
) -> Result<String, String> {
    let mut scope = scope_of(parent);
    let mut path = path;
    if path.starts_with("..") {
        // One leading dot per ancestor hop beyond the first.
        path = &path[1..];
        while let Some(rest) = path.strip_prefix('.') {
            scope = match scope {
                Some(Scope::Node(id)) => scope_of(doc.node(id).parent),
                _ => None,
            };
            if scope.is_none() {
                return Err("references a parent that does not exist".to_string());
            }
            path = rest;
        }
    }
    for (i, attr) in path.split('.').enumerate() {
        scope = match scope.and_then(|s| lookup(doc, globals, s, attr)) {
            Some(found) => Some(found),
            None if i == 0 && attr == "global" => Some(Scope::Globals),
            None => return Err(format!("references unknown attribute '{attr}'")),
        };
    }
    let Some(Scope::Node(target)) = scope else {
        return Err("can only insert strings or integers (got 'global')".to_string());
    };
    let node = doc.node(target);
    let type_name = node.type_name.as_deref().unwrap_or("unknown");
    match &node.kind {
        NodeKind::Scalar(s) if matches!(type_name, "str" | "int") => match s.value.get() {
            Some(Literal::Str(v)) => Ok(v.clone()),
            Some(Literal::Int(v)) => Ok(v.to_string()),
            Some(Literal::Null) => Err("cannot insert a null value".to_string()),
            _ => Err(format!("refers to '{type_name}' value that was never rendered")),
        },
        NodeKind::Array(_) => Err(format!(
            "can only insert strings or integers (got '{type_name}[]')"
        )),
        _ => Err(format!(
            "can only insert strings or integers (got '{type_name}')"
        )),
    }
}

use crate::error::ParseError;
use crate::text::Text;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use bigdecimal::BigDecimal;
use std::fmt;

// --- Scalar types ---

/// The built-in scalar types a schema attribute may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Str,
    Int,
    Bool,
    Float,
    Decimal,
    Date,
    Time,
    DateTime,
}

impl BaseType {
    pub const ALL: [BaseType; 8] = [
        BaseType::Str,
        BaseType::Int,
        BaseType::Bool,
        BaseType::Float,
        BaseType::Decimal,
        BaseType::Date,
        BaseType::Time,
        BaseType::DateTime,
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            BaseType::Str => "str",
            BaseType::Int => "int",
            BaseType::Bool => "bool",
            BaseType::Float => "float",
            BaseType::Decimal => "decimal",
            BaseType::Date => "date",
            BaseType::Time => "time",
            BaseType::DateTime => "datetime",
        }
    }

    pub(crate) fn names() -> String {
        Self::ALL.map(Self::name).join(", ")
    }
}

/// A rendered scalar value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Str(String),
    Int(i64),
    Bool(bool),
    Float(f64),
    Decimal(BigDecimal),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<FixedOffset>),
}

impl Literal {
    /// Canonical text used to compare primary-key components.
    pub(crate) fn key_part(&self) -> String {
        match self {
            Literal::Null => "null".to_string(),
            Literal::Str(s) => format!("s:{s}"),
            Literal::Int(i) => format!("i:{i}"),
            Literal::Bool(b) => format!("b:{b}"),
            Literal::Float(f) => format!("f:{f:?}"),
            Literal::Decimal(d) => format!("d:{}", d.normalized()),
            other => format!("t:{other}"),
        }
    }

    /// Python-like repr used inside key tuples in error messages.
    pub(crate) fn repr(&self) -> String {
        match self {
            Literal::Str(s) => format!("'{s}'"),
            other => other.to_string(),
        }
    }
}

fn write_fraction(f: &mut fmt::Formatter<'_>, nanos: u32) -> fmt::Result {
    if nanos == 0 {
        Ok(())
    } else {
        write!(f, ".{:06}", nanos / 1_000)
    }
}

/// ISO-8601 rendering with a `T` separator and microsecond fractions.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Str(s) => write!(f, "{s}"),
            Literal::Int(i) => write!(f, "{i}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Decimal(d) => write!(f, "{d}"),
            Literal::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Literal::Time(t) => {
                write!(f, "{}", t.format("%H:%M:%S"))?;
                write_fraction(f, t.nanosecond())
            }
            Literal::DateTime(dt) => {
                write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))?;
                write_fraction(f, dt.nanosecond())
            }
            Literal::DateTimeTz(dt) => {
                write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S"))?;
                write_fraction(f, dt.nanosecond())?;
                write!(f, "{}", dt.format("%:z"))
            }
        }
    }
}

/// A value that is filled in exactly once by a resolution pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Rendered<T> {
    #[default]
    Pending,
    Resolved(T),
}

impl<T> Rendered<T> {
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        match self {
            Rendered::Pending => None,
            Rendered::Resolved(v) => Some(v),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Rendered::Pending)
    }
}

// --- Node arena ---

/// Handle of a node inside a `Document`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Non-owning back-link used only for template scope lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parent {
    #[default]
    Unset,
    Globals,
    Node(NodeId),
}

/// A leaf value as written in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub content: Text,
    /// Single-quoted strings are never interpolated.
    pub literal: bool,
    pub value: Rendered<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub type_name: String,
    pub fields: Vec<(String, NodeId)>,
}

impl Instance {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<NodeId> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }
}

/// A by-primary-key pointer, resolved during the reference pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub type_name: String,
    pub args: Vec<Arg>,
    pub target: Rendered<NodeId>,
}

/// One supplied argument: positional when `key` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub key: Option<String>,
    pub node: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Scalar(Scalar),
    Array(Vec<NodeId>),
    Instance(Instance),
    Reference(Reference),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub fragment: Text,
    pub attr_name: Option<String>,
    pub type_name: Option<String>,
    pub nullable: Option<bool>,
    pub array: Option<bool>,
    pub parent: Parent,
}

impl Node {
    fn new(kind: NodeKind, fragment: Text) -> Self {
        let type_name = match &kind {
            NodeKind::Instance(i) => Some(i.type_name.clone()),
            NodeKind::Reference(r) => Some(r.type_name.clone()),
            _ => None,
        };
        Self {
            kind,
            fragment,
            attr_name: None,
            type_name,
            nullable: None,
            array: None,
            parent: Parent::Unset,
        }
    }

    /// Children whose scope owner is this node (arrays are transparent).
    #[must_use]
    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Scalar(_) => Vec::new(),
            NodeKind::Array(items) => items.clone(),
            NodeKind::Instance(inst) => inst.fields.iter().map(|(_, id)| *id).collect(),
            NodeKind::Reference(r) => r.args.iter().map(|a| a.node).collect(),
        }
    }

    fn attr(&self) -> &str {
        self.attr_name.as_deref().unwrap_or("<unnamed>")
    }
}

/// Partial schema metadata; `None` fields leave the node untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaInfo<'a> {
    pub type_name: Option<&'a str>,
    pub attr_name: Option<&'a str>,
    pub nullable: Option<bool>,
    pub array: Option<bool>,
}

impl<'a> SchemaInfo<'a> {
    #[must_use]
    pub fn field(type_name: &'a str, attr_name: &'a str, nullable: bool, array: bool) -> Self {
        Self {
            type_name: Some(type_name),
            attr_name: Some(attr_name),
            nullable: Some(nullable),
            array: Some(array),
        }
    }
}

/// Owns every node produced while scanning, addressed by `NodeId`.
#[derive(Debug, Default, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn scalar(&mut self, content: Text) -> NodeId {
        let fragment = content.clone();
        self.push(Node::new(
            NodeKind::Scalar(Scalar {
                content,
                literal: false,
                value: Rendered::Pending,
            }),
            fragment,
        ))
    }

    pub fn array(&mut self, items: Vec<NodeId>, fragment: Text) -> NodeId {
        self.push(Node::new(NodeKind::Array(items), fragment))
    }

    pub fn instance(
        &mut self,
        type_name: &str,
        fields: Vec<(String, NodeId)>,
        fragment: Text,
    ) -> NodeId {
        self.push(Node::new(
            NodeKind::Instance(Instance {
                type_name: type_name.to_string(),
                fields,
            }),
            fragment,
        ))
    }

    pub fn reference(&mut self, type_name: &str, args: Vec<Arg>, fragment: Text) -> NodeId {
        self.push(Node::new(
            NodeKind::Reference(Reference {
                type_name: type_name.to_string(),
                args,
                target: Rendered::Pending,
            }),
            fragment,
        ))
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Deep copy with fresh (unrendered, parentless) state, so a default
    /// inherited by many instances never aliases between them.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let original = self.node(id).clone();
        let kind = match original.kind {
            NodeKind::Scalar(s) => NodeKind::Scalar(Scalar {
                content: s.content,
                literal: false,
                value: Rendered::Pending,
            }),
            NodeKind::Array(items) => {
                NodeKind::Array(items.into_iter().map(|i| self.deep_copy(i)).collect())
            }
            NodeKind::Instance(inst) => NodeKind::Instance(Instance {
                type_name: inst.type_name,
                fields: inst
                    .fields
                    .into_iter()
                    .map(|(name, f)| (name, self.deep_copy(f)))
                    .collect(),
            }),
            NodeKind::Reference(r) => NodeKind::Reference(Reference {
                type_name: r.type_name,
                args: r
                    .args
                    .into_iter()
                    .map(|a| Arg {
                        key: a.key,
                        node: self.deep_copy(a.node),
                    })
                    .collect(),
                target: Rendered::Pending,
            }),
        };
        self.push(Node {
            kind,
            parent: Parent::Unset,
            ..original
        })
    }

    /// Stamps schema metadata onto a node, validating shape and type.
    pub fn apply_schema(&mut self, id: NodeId, info: &SchemaInfo<'_>) -> Result<(), ParseError> {
        let node = &mut self.nodes[id.0];
        if let Some(name) = info.attr_name {
            node.attr_name = Some(name.to_string());
        }
        if let Some(nullable) = info.nullable {
            node.nullable = Some(nullable);
        }
        if let Some(array) = info.array {
            node.array = Some(array);
        }
        match &node.kind {
            NodeKind::Instance(inst) => {
                if let Some(expected) = info.type_name {
                    if expected != inst.type_name {
                        return Err(ParseError::new(
                            format!(
                                "Field '{}' expects an instance of '{expected}', but '{}' was provided",
                                node.attr(),
                                inst.type_name
                            ),
                            &node.fragment,
                        ));
                    }
                }
                if node.array == Some(true) {
                    return Err(ParseError::new(
                        format!(
                            "Field '{}' is declared as a list, but an object was provided",
                            node.attr()
                        ),
                        &node.fragment,
                    ));
                }
            }
            NodeKind::Reference(r) => {
                if let Some(expected) = info.type_name {
                    if expected != r.type_name {
                        return Err(ParseError::new(
                            format!(
                                "Reference for '{}' expects type '{expected}', but '{}' was given",
                                node.attr(),
                                r.type_name
                            ),
                            &node.fragment,
                        ));
                    }
                }
                if node.array == Some(true) {
                    return Err(ParseError::new(
                        format!(
                            "Reference for '{}' is declared as a list, but a reference was given",
                            node.attr()
                        ),
                        &node.fragment,
                    ));
                }
            }
            NodeKind::Array(items) => {
                if let Some(t) = info.type_name {
                    node.type_name = Some(t.to_string());
                }
                let items = items.clone();
                let type_name = node.type_name.clone();
                let attr_name = node.attr_name.clone();
                let element = SchemaInfo {
                    type_name: type_name.as_deref(),
                    attr_name: attr_name.as_deref(),
                    nullable: Some(false),
                    array: Some(false),
                };
                for item in items {
                    self.apply_schema(item, &element)?;
                }
                let node = &self.nodes[id.0];
                if node.array == Some(false) {
                    return Err(ParseError::new(
                        format!(
                            "The schema for '{0}' does not indicate this is an array. \
                             Append [] to the schema definition if '{0}' should be an array.",
                            node.attr()
                        ),
                        &node.fragment,
                    ));
                }
            }
            NodeKind::Scalar(s) => {
                let is_null = s.content == "null";
                if let Some(t) = info.type_name {
                    node.type_name = Some(t.to_string());
                }
                if node.array == Some(true) && !(node.nullable == Some(true) && is_null) {
                    return Err(ParseError::new(
                        format!(
                            "Schema indicates that this should be an array, but found a single value for '{}'",
                            node.attr()
                        ),
                        &node.fragment,
                    ));
                }
                if let Some(t) = &node.type_name {
                    if BaseType::from_name(t).is_none() {
                        return Err(ParseError::new(
                            format!("Invalid {t} type - must be one of: {}", BaseType::names()),
                            &node.fragment,
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

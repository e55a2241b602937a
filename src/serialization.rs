use crate::ast::{Document, Literal, NodeId, NodeKind};
use crate::context::Context;
use bigdecimal::ToPrimitive;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A generic, serializable view of a resolved context.
///
/// Objects keep declaration order: globals first, then structs, and each
/// instance's fields in schema order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    /// Field of an object value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

fn literal_to_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Str(s) => Value::String(s.clone()),
        Literal::Int(i) => Value::Int(*i),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Float(f) => Value::Float(*f),
        // Parsing the decimal text keeps the float correctly rounded.
        Literal::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .ok()
            .or_else(|| d.to_f64())
            .map_or(Value::Null, Value::Float),
        temporal => Value::String(temporal.to_string()),
    }
}

/// Globals by name, then one array per struct that declares a primary key.
/// Structs without a primary key only exist inline and are left out.
pub(crate) fn to_value(ctx: &Context) -> Value {
    let mut projector = Projector {
        ctx,
        doc: ctx.document(),
        visiting: Vec::new(),
    };
    let mut root: Vec<(String, Value)> = ctx
        .globals()
        .map(|(name, id)| (name.to_string(), projector.node(id)))
        .collect();
    for s in ctx.structs() {
        if s.primary_keys().is_empty() {
            continue;
        }
        let instances = s.instances().iter().map(|&id| projector.node(id)).collect();
        root.push((s.type_name.clone(), Value::Array(instances)));
    }
    Value::Object(root)
}

struct Projector<'a> {
    ctx: &'a Context,
    doc: &'a Document,
    /// Instances currently being projected, innermost last.
    visiting: Vec<NodeId>,
}

impl Projector<'_> {
    fn node(&mut self, id: NodeId) -> Value {
        let doc = self.doc;
        match &doc.node(id).kind {
            NodeKind::Scalar(s) => s.value.get().map_or(Value::Null, literal_to_value),
            NodeKind::Array(items) => Value::Array(items.iter().map(|&i| self.node(i)).collect()),
            NodeKind::Instance(_) => self.instance(id),
            NodeKind::Reference(r) => r.target.get().map_or(Value::Null, |&t| self.instance(t)),
        }
    }

    /// An instance already on the stack closes a reference cycle; it is
    /// emitted with its primary-key fields only.
    fn instance(&mut self, id: NodeId) -> Value {
        let doc = self.doc;
        let NodeKind::Instance(inst) = &doc.node(id).kind else {
            return Value::Null;
        };
        if self.visiting.contains(&id) {
            let keys = self
                .ctx
                .get_struct(&inst.type_name)
                .map(|s| s.primary_keys().to_vec())
                .unwrap_or_default();
            let fields = inst
                .fields
                .iter()
                .filter(|(name, _)| keys.contains(name))
                .map(|(name, f)| (name.clone(), self.scalar_only(*f)))
                .collect();
            return Value::Object(fields);
        }
        self.visiting.push(id);
        let fields = inst
            .fields
            .iter()
            .map(|(name, f)| (name.clone(), self.node(*f)))
            .collect();
        self.visiting.pop();
        Value::Object(fields)
    }

    fn scalar_only(&self, id: NodeId) -> Value {
        match &self.doc.node(id).kind {
            NodeKind::Scalar(s) => s.value.get().map_or(Value::Null, literal_to_value),
            _ => Value::Null,
        }
    }
}

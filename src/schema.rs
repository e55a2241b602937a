use crate::ast::{Arg, Document, Literal, NodeId, NodeKind, Rendered, SchemaInfo};
use crate::error::ParseError;
use crate::resolver::render_scalar;
use crate::text::Text;
use std::collections::HashMap;

/// Per-type default values contributed by one source: attribute name → node.
pub type Defaults = HashMap<String, NodeId>;

/// One declared attribute of a struct schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub type_name: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub array: bool,
}

impl Attribute {
    fn schema_info(&self) -> SchemaInfo<'_> {
        SchemaInfo::field(&self.type_name, &self.name, self.nullable, self.array)
    }
}

/// A named record type: its schema, its row instances, and the
/// primary-key index built during resolution.
#[derive(Debug, Clone)]
pub struct Struct {
    pub type_name: String,
    attributes: Vec<Attribute>,
    primary_keys: Vec<String>,
    instances: Vec<NodeId>,
    index: HashMap<Vec<String>, NodeId>,
}

impl Struct {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            attributes: Vec::new(),
            primary_keys: Vec::new(),
            instances: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    #[must_use]
    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    #[must_use]
    pub fn instances(&self) -> &[NodeId] {
        &self.instances
    }

    /// Looks up an indexed instance by its rendered key values.
    #[must_use]
    pub fn lookup(&self, key: &[Literal]) -> Option<NodeId> {
        let key: Vec<String> = key.iter().map(Literal::key_part).collect();
        self.index.get(&key).copied()
    }

    /// Adds a schema attribute declared on `line`.
    pub fn add_attribute(&mut self, attr: Attribute, line: &Text) -> Result<(), ParseError> {
        if !self.instances.is_empty() {
            return Err(ParseError::new(
                "Cannot add schema attributes after initial construction",
                line,
            ));
        }
        if self.attribute(&attr.name).is_some() {
            return Err(ParseError::new(
                format!(
                    "Duplicate attribute {} found in {}",
                    attr.name, self.type_name
                ),
                line,
            ));
        }
        if attr.primary_key {
            if attr.array {
                return Err(ParseError::new("Cannot set a primary key on an array", line));
            }
            self.primary_keys.push(attr.name.clone());
        }
        self.attributes.push(attr);
        Ok(())
    }

    pub(crate) fn push_instance(&mut self, id: NodeId) {
        self.instances.push(id);
    }

    /// Binds positional-then-keyed arguments, completes the remaining
    /// attributes from `defaults`, stamps schema metadata onto every field,
    /// and allocates the instance node.
    pub fn build_instance(
        &self,
        doc: &mut Document,
        args: Vec<Arg>,
        defaults: Option<&Defaults>,
        fragment: &Text,
    ) -> Result<NodeId, ParseError> {
        let names: Vec<&str> = self.attributes.iter().map(|a| a.name.as_str()).collect();
        let supplied = self.bind(doc, args, &names, "Positional arguments")?;

        let mut fields = Vec::with_capacity(self.attributes.len());
        for attr in &self.attributes {
            let node = match supplied.iter().find(|(n, _)| *n == attr.name) {
                Some((_, id)) => *id,
                None => match defaults.and_then(|d| d.get(&attr.name)) {
                    Some(default) => doc.deep_copy(*default),
                    None => {
                        return Err(ParseError::new(
                            format!(
                                "Invalid attribute {} for struct '{}': value is required and no default is defined",
                                attr.name, self.type_name
                            ),
                            fragment,
                        ))
                    }
                },
            };
            fields.push((attr.name.clone(), node));
        }
        if let Some((name, id)) = supplied
            .iter()
            .find(|(n, _)| self.attribute(n).is_none())
        {
            return Err(ParseError::new(
                format!("'{}' has no attribute named '{name}'", self.type_name),
                &doc.node(*id).fragment,
            ));
        }
        for (attr, (_, id)) in self.attributes.iter().zip(&fields) {
            doc.apply_schema(*id, &attr.schema_info())?;
        }
        log::trace!("built {} instance with {} fields", self.type_name, fields.len());
        Ok(doc.instance(&self.type_name, fields, fragment.clone()))
    }

    /// Maps arguments onto `names` by position until the first keyed
    /// argument; after that only keyed arguments are accepted.
    fn bind(
        &self,
        doc: &mut Document,
        args: Vec<Arg>,
        names: &[&str],
        what: &str,
    ) -> Result<Vec<(String, NodeId)>, ParseError> {
        let mut bound: Vec<(String, NodeId)> = Vec::with_capacity(args.len());
        let mut keyed_only = false;
        for (i, arg) in args.into_iter().enumerate() {
            let name = match arg.key {
                Some(key) => {
                    keyed_only = true;
                    key
                }
                None => {
                    let fragment = &doc.node(arg.node).fragment;
                    if keyed_only {
                        return Err(ParseError::new(
                            format!(
                                "{what} for '{}' must appear before keyed arguments",
                                self.type_name
                            ),
                            fragment,
                        ));
                    }
                    let Some(name) = names.get(i) else {
                        return Err(ParseError::new(
                            format!(
                                "Too many positional arguments for '{}' (expected at most {})",
                                self.type_name,
                                names.len()
                            ),
                            fragment,
                        ));
                    };
                    let name = (*name).to_string();
                    doc.node_mut(arg.node).attr_name = Some(name.clone());
                    name
                }
            };
            if bound.iter().any(|(n, _)| *n == name) {
                return Err(ParseError::new(
                    format!("Attribute '{name}' of '{}' is supplied more than once", self.type_name),
                    &doc.node(arg.node).fragment,
                ));
            }
            bound.push((name, arg.node));
        }
        Ok(bound)
    }

    /// Builds the key → instance index from already-rendered key fields.
    pub fn load_primary_keys(&mut self, doc: &Document) -> Result<(), ParseError> {
        if self.primary_keys.is_empty() {
            return Ok(());
        }
        for &id in &self.instances {
            let node = doc.node(id);
            let NodeKind::Instance(inst) = &node.kind else {
                return Err(ParseError::internal("struct instance is not an instance node", &node.fragment));
            };
            let mut key = Vec::with_capacity(self.primary_keys.len());
            for pk in &self.primary_keys {
                let field = inst.field(pk).map(|f| doc.node(f));
                match field.map(|f| &f.kind) {
                    Some(NodeKind::Scalar(s)) => match &s.value {
                        Rendered::Resolved(v) => key.push(v.clone()),
                        Rendered::Pending => {
                            return Err(ParseError::internal(
                                format!("primary key '{pk}' was not rendered"),
                                &node.fragment,
                            ))
                        }
                    },
                    _ => {
                        return Err(ParseError::new(
                            format!("Primary key '{pk}' of {} must be a plain value", self.type_name),
                            &node.fragment,
                        ))
                    }
                }
            }
            let parts: Vec<String> = key.iter().map(Literal::key_part).collect();
            if self.index.contains_key(&parts) {
                return Err(ParseError::new(
                    format!(
                        "{} with primary key {} already exists",
                        self.type_name,
                        key_repr(&key)
                    ),
                    &node.fragment,
                ));
            }
            self.index.insert(parts, id);
        }
        log::trace!("indexed {} {} instances", self.index.len(), self.type_name);
        Ok(())
    }

    /// Resolves reference arguments against this struct's primary keys and
    /// returns the matching instance.
    pub fn load_reference(
        &self,
        doc: &mut Document,
        args: Vec<Arg>,
        fragment: &Text,
    ) -> Result<NodeId, ParseError> {
        if self.primary_keys.is_empty() {
            return Err(ParseError::new(
                format!(
                    "'{}' declares no primary key and can only be constructed inline",
                    self.type_name
                ),
                fragment,
            ));
        }
        let names: Vec<&str> = self.primary_keys.iter().map(String::as_str).collect();
        let bound = self.bind(doc, args, &names, "Positional reference arguments")?;
        for (name, id) in &bound {
            let Some(attr) = self.attribute(name) else {
                return Err(ParseError::new(
                    format!("'{}' has no attribute named '{name}'", self.type_name),
                    &doc.node(*id).fragment,
                ));
            };
            doc.apply_schema(*id, &attr.schema_info())?;
            render_scalar(doc, *id)?;
        }

        let mut key = Vec::with_capacity(self.primary_keys.len());
        for pk in &self.primary_keys {
            let Some((_, id)) = bound.iter().find(|(n, _)| n == pk) else {
                return Err(ParseError::new(
                    format!("Reference to '{}' is missing primary key '{pk}'", self.type_name),
                    fragment,
                ));
            };
            match &doc.node(*id).kind {
                NodeKind::Scalar(s) => match s.value.get() {
                    Some(v) => key.push(v.clone()),
                    None => return Err(ParseError::internal("reference key was not rendered", fragment)),
                },
                _ => {
                    return Err(ParseError::new(
                        format!("Primary key '{pk}' of {} must be a plain value", self.type_name),
                        &doc.node(*id).fragment,
                    ))
                }
            }
        }

        match self.lookup(&key) {
            Some(found) => Ok(found),
            None => {
                let at = bound
                    .iter()
                    .find(|(n, _)| Some(n) == self.primary_keys.first())
                    .map_or_else(|| fragment.clone(), |(_, id)| doc.node(*id).fragment.clone());
                Err(ParseError::new(
                    format!(
                        "{}{} is referenced, but instance can not be found",
                        self.type_name,
                        key_repr(&key)
                    ),
                    &at,
                ))
            }
        }
    }
}

/// Renders a key like a tuple: `('web',)`, `('a', 1)`, `()`.
fn key_repr(key: &[Literal]) -> String {
    let parts: Vec<String> = key.iter().map(Literal::repr).collect();
    if parts.len() == 1 {
        format!("({},)", parts[0])
    } else {
        format!("({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::SourceId;

    fn t(s: &str) -> Text {
        Text::new(s, SourceId(0), 1, 1)
    }

    fn attr(name: &str, type_name: &str, pk: bool) -> Attribute {
        Attribute {
            name: name.to_string(),
            type_name: type_name.to_string(),
            primary_key: pk,
            nullable: false,
            array: false,
        }
    }

    fn server() -> Struct {
        let mut s = Struct::new("Server");
        s.add_attribute(attr("name", "str", true), &t(" *str name:")).unwrap();
        s.add_attribute(attr("port", "int", false), &t(" int port:")).unwrap();
        s
    }

    #[test]
    fn test_duplicate_attribute() {
        let mut s = server();
        let err = s
            .add_attribute(attr("port", "int", false), &t(" int port:"))
            .unwrap_err();
        assert_eq!(err.message(), "Duplicate attribute port found in Server");
    }

    #[test]
    fn test_primary_key_on_array() {
        let mut s = Struct::new("Tag");
        let mut a = attr("names", "str", true);
        a.array = true;
        let err = s.add_attribute(a, &t(" *str[] names:")).unwrap_err();
        assert_eq!(err.message(), "Cannot set a primary key on an array");
    }

    #[test]
    fn test_build_instance_uses_defaults() {
        let s = server();
        let mut doc = Document::new();
        let default_port = doc.scalar(t("80"));
        let defaults: Defaults = [("port".to_string(), default_port)].into_iter().collect();
        let name = doc.scalar(t("web"));
        let id = s
            .build_instance(&mut doc, vec![Arg { key: None, node: name }], Some(&defaults), &t("web"))
            .unwrap();
        let NodeKind::Instance(inst) = &doc.node(id).kind else {
            panic!("expected instance");
        };
        let port = inst.field("port").unwrap();
        assert_ne!(port, default_port);
        assert_eq!(doc.node(port).type_name.as_deref(), Some("int"));
    }

    #[test]
    fn test_build_instance_missing_value() {
        let s = server();
        let mut doc = Document::new();
        let name = doc.scalar(t("web"));
        let err = s
            .build_instance(&mut doc, vec![Arg { key: None, node: name }], None, &t("web"))
            .unwrap_err();
        assert_eq!(
            err.message(),
            "Invalid attribute port for struct 'Server': value is required and no default is defined"
        );
    }

    #[test]
    fn test_positional_after_keyed() {
        let s = server();
        let mut doc = Document::new();
        let port = doc.scalar(t("80"));
        let name = doc.scalar(t("web"));
        let args = vec![
            Arg { key: Some("port".into()), node: port },
            Arg { key: None, node: name },
        ];
        let err = s.build_instance(&mut doc, args, None, &t("x")).unwrap_err();
        assert_eq!(
            err.message(),
            "Positional arguments for 'Server' must appear before keyed arguments"
        );
    }

    #[test]
    fn test_unknown_keyed_argument() {
        let s = server();
        let mut doc = Document::new();
        let name = doc.scalar(t("web"));
        let port = doc.scalar(t("80"));
        let extra = doc.scalar(t("x"));
        let args = vec![
            Arg { key: None, node: name },
            Arg { key: None, node: port },
            Arg { key: Some("color".into()), node: extra },
        ];
        let err = s.build_instance(&mut doc, args, None, &t("x")).unwrap_err();
        assert_eq!(err.message(), "'Server' has no attribute named 'color'");
    }

    #[test]
    fn test_key_repr() {
        assert_eq!(key_repr(&[Literal::Str("web".into())]), "('web',)");
        assert_eq!(
            key_repr(&[Literal::Str("a".into()), Literal::Int(1)]),
            "('a', 1)"
        );
    }
}

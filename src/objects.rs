//! Native objects built from a resolved context.
//!
//! Every instance becomes one shared [`Object`]; references to the same
//! instance yield the same `Rc`. A validator registered for a type name
//! runs once per materialized object of that type.

use crate::ast::{Literal, NodeId, NodeKind};
use crate::context::Context;
use crate::error::{ParseError, TycoError, ValidationError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// A materialized value.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    Scalar(Literal),
    List(Vec<Native>),
    Object(Rc<Object>),
}

impl Native {
    #[must_use]
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Native::Scalar(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Native::Object(o) => Some(o),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub type_name: String,
    pub fields: Vec<(String, Native)>,
}

impl Object {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Native> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Checks a materialized object; the error text is reported to the caller.
pub trait Validator {
    fn validate(&self, object: &Object) -> Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&Object) -> Result<(), String>,
{
    fn validate(&self, object: &Object) -> Result<(), String> {
        self(object)
    }
}

/// Validators keyed by struct type name.
#[derive(Default)]
pub struct Registry {
    validators: HashMap<String, Box<dyn Validator>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.validators.keys().collect();
        names.sort();
        f.debug_struct("Registry").field("validators", &names).finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the validator for `type_name`.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        validator: impl Validator + 'static,
    ) -> &mut Self {
        self.validators.insert(type_name.into(), Box::new(validator));
        self
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&dyn Validator> {
        self.validators.get(type_name).map(|v| v.as_ref())
    }
}

/// Globals plus every struct's row instances, materialized in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Objects {
    pub globals: Object,
    pub structs: Vec<(String, Vec<Rc<Object>>)>,
}

impl Objects {
    /// Row instances of one struct.
    #[must_use]
    pub fn instances(&self, type_name: &str) -> Option<&[Rc<Object>]> {
        self.structs
            .iter()
            .find(|(n, _)| n == type_name)
            .map(|(_, v)| v.as_slice())
    }
}

/// Pseudo type name of the object holding all globals.
pub const GLOBALS_TYPE: &str = "globals";

struct Materializer<'a> {
    ctx: &'a Context,
    registry: &'a Registry,
    cache: HashMap<NodeId, Rc<Object>>,
    in_progress: HashSet<NodeId>,
}

impl<'a> Materializer<'a> {
    fn new(ctx: &'a Context, registry: &'a Registry) -> Self {
        Self {
            ctx,
            registry,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    fn node(&mut self, id: NodeId) -> Result<Native, TycoError> {
        let ctx = self.ctx;
        let doc = ctx.document();
        let node = doc.node(id);
        match &node.kind {
            NodeKind::Scalar(s) => match s.value.get() {
                Some(v) => Ok(Native::Scalar(v.clone())),
                None => Err(ParseError::internal("value was never rendered", &node.fragment).into()),
            },
            NodeKind::Array(items) => items
                .iter()
                .map(|&i| self.node(i))
                .collect::<Result<Vec<_>, _>>()
                .map(Native::List),
            NodeKind::Instance(_) => self.instance(id).map(Native::Object),
            NodeKind::Reference(r) => match r.target.get() {
                Some(&target) => self.instance(target).map(Native::Object),
                None => Err(ParseError::internal("reference was never resolved", &node.fragment).into()),
            },
        }
    }

    fn instance(&mut self, id: NodeId) -> Result<Rc<Object>, TycoError> {
        if let Some(done) = self.cache.get(&id) {
            return Ok(Rc::clone(done));
        }
        let ctx = self.ctx;
        let node = ctx.document().node(id);
        let NodeKind::Instance(inst) = &node.kind else {
            return Err(ParseError::internal("expected an instance", &node.fragment).into());
        };
        if !self.in_progress.insert(id) {
            return Err(ParseError::new(
                format!(
                    "Cannot materialize '{}': its references form a cycle",
                    inst.type_name
                ),
                &node.fragment,
            )
            .into());
        }
        let mut fields = Vec::with_capacity(inst.fields.len());
        for (name, field) in &inst.fields {
            fields.push((name.clone(), self.node(*field)?));
        }
        let object = Rc::new(Object {
            type_name: inst.type_name.clone(),
            fields,
        });
        if let Some(validator) = self.registry.get(&inst.type_name) {
            validator
                .validate(&object)
                .map_err(|message| ValidationError {
                    type_name: inst.type_name.clone(),
                    message,
                })?;
        }
        self.in_progress.remove(&id);
        self.cache.insert(id, Rc::clone(&object));
        Ok(object)
    }

    fn globals(&mut self) -> Result<Object, TycoError> {
        let ctx = self.ctx;
        let mut fields = Vec::new();
        for (name, id) in ctx.globals() {
            fields.push((name.to_string(), self.node(id)?));
        }
        Ok(Object {
            type_name: GLOBALS_TYPE.to_string(),
            fields,
        })
    }

    fn structs(&mut self) -> Result<Vec<(String, Vec<Rc<Object>>)>, TycoError> {
        let ctx = self.ctx;
        let mut out = Vec::new();
        for s in ctx.structs() {
            let instances = s
                .instances()
                .iter()
                .map(|&id| self.instance(id))
                .collect::<Result<Vec<_>, _>>()?;
            out.push((s.type_name.clone(), instances));
        }
        Ok(out)
    }
}

impl Context {
    fn located(&self, err: TycoError) -> TycoError {
        match err {
            TycoError::Parse(e) => TycoError::Parse(self.annotate(e)),
            other => other,
        }
    }

    /// Materializes globals and all struct instances, validating each
    /// instance once.
    ///
    /// # Errors
    /// Returns a `TycoError::Validation` when a validator rejects an object,
    /// or a `TycoError::Parse` when references form a cycle.
    pub fn materialize(&self, registry: &Registry) -> Result<Objects, TycoError> {
        let mut m = Materializer::new(self, registry);
        let globals = m.globals().map_err(|e| self.located(e))?;
        let structs = m.structs().map_err(|e| self.located(e))?;
        log::debug!("materialized {} objects", m.cache.len());
        Ok(Objects { globals, structs })
    }

    /// All globals as one object.
    ///
    /// # Errors
    /// See [`Context::materialize`].
    pub fn globals_object(&self, registry: &Registry) -> Result<Object, TycoError> {
        Materializer::new(self, registry)
            .globals()
            .map_err(|e| self.located(e))
    }

    /// Every struct (with or without a primary key) and its row instances.
    ///
    /// # Errors
    /// See [`Context::materialize`].
    pub fn objects(
        &self,
        registry: &Registry,
    ) -> Result<Vec<(String, Vec<Rc<Object>>)>, TycoError> {
        Materializer::new(self, registry)
            .structs()
            .map_err(|e| self.located(e))
    }
}

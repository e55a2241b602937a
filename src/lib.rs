pub mod api;
pub mod ast;
pub mod context;
pub mod error;
pub mod lexer;
pub mod objects;
pub mod parser;
pub mod schema;
pub mod text;
pub mod utils;
mod resolver;
mod serialization;

pub use api::{load, load_text, EXTENSION};
pub use context::Context;
pub use error::{ParseError, TycoError, ValidationError};
pub use objects::{Native, Object, Objects, Registry, Validator};
pub use serialization::Value;

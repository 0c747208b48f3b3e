//! Card compiler and runtime card model for Cardhost
//!
//! A raw card (schema source, per-format component sources, parent pointer,
//! asset files) is compiled into a [`CompiledCard`]: a resolved field table
//! merged with the parent's, a compiled schema module, and one rewritten
//! component module per format. The [`model`] module wraps card data on the
//! wire and converts primitive values with the serializers compiled cards
//! declare.

pub mod base;
pub mod builder;
pub mod codec;
pub mod compiler;
pub mod error;
pub mod hbs;
pub mod js;
pub mod model;
pub mod parse;
pub mod schema;
pub mod serializers;
pub mod template;
pub mod types;
pub mod utils;

pub use builder::{Builder, MemoryBuilder, ModuleDefiner};
pub use compiler::{assert_valid_compiled_card, BaseCardCache, Compiler, CompilerConfig};
pub use error::*;
pub use model::{CardDocument, CardModel, Setter};
pub use parse::parse_raw_card_content;
pub use serializers::{CardValue, PrimitiveSerializer, SerializerRegistry};
pub use types::*;

//! Template dialect: parser, tree, and printer.

pub mod ast;
mod parser;
mod printer;

pub use ast::*;
pub use parser::parse_template;
pub use printer::print_template;

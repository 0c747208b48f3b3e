//! Host-language module syntax: tokens, structure, and span edits.

pub mod lexer;
pub mod module;

pub use lexer::{quote_string, tokenize, Span, Token, TokenKind};
pub use module::{
    apply_edits, ClassDecl, ClassMember, Decorator, DecoratorArg, Edit, ImportDecl, ImportName,
    Module, OptionsObject, ScopeEntry, ScopeProperty, StringArg, TemplateCall,
};

//! Error types for card compilation and validation

use crate::types::Format;
use thiserror::Error;

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Broad classification of compile failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The card author declared something contradictory.
    Configuration,
    /// A referenced card could not be fetched.
    Resolution,
    /// The card is malformed.
    Structural,
    /// The compiled card carries data that does not match its fields.
    Validation,
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("card '{url}' adopts from '{document}' but its schema adopts from '{schema}'")]
    ConflictingParent {
        url: String,
        document: String,
        schema: String,
    },

    #[error("card '{url}' redefines field(s) {} already defined by parent '{parent}'", .fields.join(", "))]
    FieldCollision {
        url: String,
        parent: String,
        fields: Vec<String>,
    },

    #[error("{} template of '{url}' references unknown field '{field}'{}", .format, did_you_mean(.suggestions))]
    UnknownField {
        url: String,
        format: Format,
        field: String,
        suggestions: Vec<String>,
    },

    #[error("invalid field declaration '{field}' in '{url}': {reason}")]
    InvalidFieldDeclaration {
        url: String,
        field: String,
        reason: String,
    },

    #[error("adoption cycle detected: {}", .chain.join(" -> "))]
    AdoptionCycle { url: String, chain: Vec<String> },

    #[error("card dependency cycle detected: {}", .chain.join(" -> "))]
    DependencyCycle { url: String, chain: Vec<String> },

    #[error("no such card: {url}")]
    CardNotFound { url: String },

    #[error("card '{url}' has no schema and no parent to inherit one from")]
    MissingSchema { url: String },

    #[error("card '{url}' has no {format} template and no parent to inherit one from")]
    MissingComponent { url: String, format: Format },

    #[error("card '{url}' points {pointer} at '{file}', which is not in its files")]
    MissingFile {
        url: String,
        pointer: &'static str,
        file: String,
    },

    #[error("syntax error in {file} of '{url}'{} at offset {offset}: {message}", .format.map(|f| format!(" ({f} template)")).unwrap_or_default())]
    Syntax {
        url: String,
        file: String,
        format: Option<Format>,
        offset: usize,
        message: String,
    },

    #[error("failed to define module '{filename}' for '{url}': {message}")]
    Define {
        url: String,
        filename: String,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::ConflictingParent { .. }
            | CompileError::FieldCollision { .. }
            | CompileError::UnknownField { .. }
            | CompileError::InvalidFieldDeclaration { .. }
            | CompileError::AdoptionCycle { .. }
            | CompileError::DependencyCycle { .. } => ErrorKind::Configuration,
            CompileError::CardNotFound { .. } => ErrorKind::Resolution,
            CompileError::MissingSchema { .. }
            | CompileError::MissingComponent { .. }
            | CompileError::MissingFile { .. }
            | CompileError::Syntax { .. }
            | CompileError::Define { .. } => ErrorKind::Structural,
            CompileError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// Whether this failure should be reported to the requesting client as a
    /// bad request rather than treated as an internal compiler failure.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

/// Failures of [`assert_valid_compiled_card`](crate::assert_valid_compiled_card).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("compiled card is missing its url")]
    MissingUrl,

    #[error("compiled card '{url}' is missing its schema module")]
    MissingSchemaModule { url: String },

    #[error("unexpected field(s) in data of '{url}': {}", .fields.join(", "))]
    UnexpectedFields { url: String, fields: Vec<String> },
}

/// Errors raised while converting primitive values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SerializeError {
    #[error("serializer '{serializer}' cannot {direction} {found}")]
    UnsupportedValue {
        serializer: &'static str,
        direction: &'static str,
        found: String,
    },

    #[error("serializer '{serializer}' failed to parse '{input}': {reason}")]
    Parse {
        serializer: &'static str,
        input: String,
        reason: String,
    },
}

/// Errors raised by the runtime card model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("unknown serializer '{0}'")]
    UnknownSerializer(String),

    #[error("setter path is empty")]
    EmptyPath,

    #[error("document is not a card: {0}")]
    InvalidDocument(String),

    #[error("cannot set '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

fn did_you_mean(suggestions: &[String]) -> String {
    match suggestions.first() {
        Some(candidate) => format!(". Did you mean '{}'?", candidate),
        None => String::new(),
    }
}

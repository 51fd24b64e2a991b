//! Error types for quel-sql

use thiserror::Error;

/// The result type for quel-sql operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during QUEL compilation
#[derive(Debug, Error)]
pub enum Error {
    /// Error during tokenization
    #[error("Lexical error at line {line}: {message}")]
    Lex { message: String, line: usize },

    /// Invalid QUEL syntax
    #[error("Syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },

    /// Error during SQL generation
    #[error("Generation error: {0}")]
    Generate(String),
}

impl Error {
    /// Create a lexical error
    pub fn lex(message: impl Into<String>, line: usize) -> Self {
        Error::Lex {
            message: message.into(),
            line,
        }
    }

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Error::Syntax {
            message: message.into(),
            line,
        }
    }

    /// Create a generation error
    pub fn generate(message: impl Into<String>) -> Self {
        Error::Generate(message.into())
    }
}

impl From<crate::schema::SchemaError> for Error {
    fn from(err: crate::schema::SchemaError) -> Self {
        Error::Generate(err.to_string())
    }
}

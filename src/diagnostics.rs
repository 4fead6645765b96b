use thiserror::Error;

/// Reported when the tokenizer encounters input it cannot form a token from.
#[derive(Debug, Clone, Error)]
#[error("lexical error at {line}:{column}: {message}")]
pub struct LexicalError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Reported when the parser encounters an unexpected token.
#[derive(Debug, Clone, Error)]
#[error("syntax error at {line}:{column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Reported by the semantic analyzer. Positions default to 0:0 for constructs
/// whose spans were not threaded through.
#[derive(Debug, Clone, Error)]
#[error("semantic error at {line}:{column}: {message}")]
pub struct SemanticError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SemanticError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            line: 0,
            column: 0,
            message: message.into(),
        }
    }

    pub fn at(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

/// Any error produced by a pipeline stage. Every variant is fatal to the run;
/// no partial output is produced after one is raised.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error(transparent)]
    Lexical(#[from] LexicalError),
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
}

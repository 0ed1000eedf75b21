use thiserror::Error;

/// A parser over a slice of already-lexed items.
///
/// `pos` is the index of the next unread item; on success the parser returns
/// the index just past what it consumed.
pub trait Parser<I, O> {
    fn parse(&self, input: &[I], pos: usize) -> ParseResult<O>;
}

pub type ParseResult<O> = Result<(usize, O), ParseError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected '{found}' at token {position}")]
    Unexpected { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("no alternative matched at token {position}")]
    NoAlternative { position: usize },
    #[error("{0}")]
    Fail(String),
    #[error("{message}: {inner}")]
    WithContext {
        message: String,
        inner: Box<ParseError>,
    },
}

impl ParseError {
    /// The innermost error, without the context chain.
    pub fn root_cause(&self) -> &ParseError {
        match self {
            ParseError::WithContext { inner, .. } => inner.root_cause(),
            other => other,
        }
    }
}

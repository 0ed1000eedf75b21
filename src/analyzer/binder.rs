use std::sync::Arc;

use thiserror::Error;

use super::core::ParseError;
use super::parsers::parse_syntax;
use crate::ast::{Expression, Syntax, TemplatePart, TemplateSegment};
use crate::eval::EvalError;
use crate::functions::FunctionTable;
use crate::tokenizer::{Token, Tokenizer, TokenizerError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("{0}")]
    Tokenize(#[from] TokenizerError),
    #[error("syntax error in '{text}': {error}")]
    Parse { text: String, error: ParseError },
    #[error("{0}")]
    Bind(#[from] EvalError),
}

pub type ExpressionResult<T> = Result<T, ExpressionError>;

/// Turns expression text into a bound [`Expression`].
///
/// Binding looks every call up in the function table and runs its static
/// validator, so arity and literal-type mistakes are reported here, before
/// anything is evaluated.
#[derive(Debug, Clone)]
pub struct ExpressionParser {
    functions: Arc<FunctionTable>,
}

impl ExpressionParser {
    pub fn new(functions: Arc<FunctionTable>) -> Self {
        Self { functions }
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        &self.functions
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn parse(&self, text: &str) -> ExpressionResult<Expression> {
        let syntax = parse_source(text)?;
        self.bind(syntax)
    }

    pub fn bind(&self, syntax: Syntax) -> ExpressionResult<Expression> {
        match syntax {
            Syntax::Literal(value) => Ok(Expression::Constant(value)),
            Syntax::Path(path) => Ok(Expression::Accessor { path }),
            Syntax::Call { name, args } => {
                let args = args
                    .into_iter()
                    .map(|arg| self.bind(arg))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                Ok(self.functions.make_call(&name, args)?)
            }
            Syntax::Template(segments) => segments
                .into_iter()
                .map(|segment| match segment {
                    TemplateSegment::Text(text) => Ok(TemplatePart::Text(text)),
                    TemplateSegment::Source(source) => {
                        self.parse(&source).map(TemplatePart::Expression)
                    }
                })
                .collect::<ExpressionResult<Vec<_>>>()
                .map(Expression::Interpolation),
        }
    }
}

/// Lexes and parses `text` without binding it.
pub fn parse_source(text: &str) -> ExpressionResult<Syntax> {
    let tokens: Vec<Token> = Tokenizer::new()
        .tokenize(text)?
        .into_iter()
        .map(|span| span.token)
        .filter(|token| !token.is_whitespace())
        .collect();
    parse_syntax(&tokens).map_err(|error| {
        tracing::debug!("parse failed for '{}': {}", text, error);
        ExpressionError::Parse {
            text: text.to_string(),
            error,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ReturnType;
    use crate::eval::{ErrorKind, Value};

    fn parser() -> ExpressionParser {
        ExpressionParser::new(Arc::new(FunctionTable::builtin()))
    }

    #[test]
    fn test_bind_operators_and_calls() {
        let expr = parser().parse("length(name) + 1").unwrap();
        assert_eq!(expr.function_name(), Some("+"));
        assert_eq!(expr.children()[0].function_name(), Some("length"));
        assert_eq!(expr.children()[1], Expression::constant(1));
        assert_eq!(expr.to_string(), "(length(name) + 1)");
    }

    #[test]
    fn test_bind_template() {
        let expr = parser().parse("`Hello ${user.name}!`").unwrap();
        assert_eq!(expr.return_type(), ReturnType::STRING);
        assert_eq!(
            expr,
            Expression::Interpolation(vec![
                TemplatePart::Text("Hello ".to_string()),
                TemplatePart::Expression(Expression::accessor("user.name")),
                TemplatePart::Text("!".to_string()),
            ])
        );
    }

    #[test]
    fn test_unknown_function() {
        let err = parser().parse("frobnicate(1)").unwrap_err();
        match err {
            ExpressionError::Bind(e) => assert_eq!(e.kind(), ErrorKind::UnknownFunction),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_static_validation_runs_at_bind_time() {
        let err = parser().parse("substring('abc')").unwrap_err();
        assert!(matches!(
            err,
            ExpressionError::Bind(EvalError::ArityOrType(_))
        ));

        let err = parser().parse("'a' * 2").unwrap_err();
        assert!(matches!(
            err,
            ExpressionError::Bind(EvalError::ArityOrType(_))
        ));
    }

    #[test]
    fn test_errors_in_nested_template_surface() {
        assert!(parser().parse("`x ${1 +}`").is_err());
    }

    #[test]
    fn test_syntax_and_lexer_errors() {
        assert!(matches!(
            parser().parse("1 2").unwrap_err(),
            ExpressionError::Parse { .. }
        ));
        assert!(matches!(
            parser().parse("a ~ b").unwrap_err(),
            ExpressionError::Tokenize(_)
        ));
        assert_eq!(
            parse_source("true").unwrap(),
            Syntax::Literal(Value::Boolean(true))
        );
    }
}

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, tag},
    character::complete::{char, digit1, none_of},
    combinator::{map, map_res, not, opt, recognize, value},
    error::{context, ErrorKind, ParseError, VerboseError},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum StringPart {
    Literal(String),
    /// Raw source of a `${...}` expression, parsed later.
    Interpolation(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Template(Vec<StringPart>),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

fn quoted(quote: char) -> impl FnMut(&str) -> ParserResult<String> {
    let normal: &'static str = if quote == '\'' { "\\'" } else { "\\\"" };
    move |input| {
        map(
            delimited(
                char(quote),
                opt(escaped_transform(
                    none_of(normal),
                    '\\',
                    alt((
                        value("\\", tag("\\")),
                        value("'", tag("'")),
                        value("\"", tag("\"")),
                        value("\n", tag("n")),
                        value("\r", tag("r")),
                        value("\t", tag("t")),
                    )),
                )),
                char(quote),
            ),
            Option::unwrap_or_default,
        )(input)
    }
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_string_literal(input: &str) -> ParserResult<Literal> {
    context(
        "string literal",
        map(alt((quoted('\''), quoted('"'))), Literal::String),
    )(input)
}

/// Body of `${...}` up to the matching close brace, skipping braces that
/// appear inside nested quotes.
fn interpolation_body(input: &str) -> ParserResult<&str> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '{' => depth += 1,
            '}' if depth == 0 => return Ok((&input[i + 1..], &input[..i])),
            '}' => depth -= 1,
            _ => {}
        }
    }
    Err(nom::Err::Failure(VerboseError::from_error_kind(
        input,
        ErrorKind::Char,
    )))
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_interpolation(input: &str) -> ParserResult<StringPart> {
    context(
        "template interpolation",
        map(preceded(tag("${"), interpolation_body), |source: &str| {
            StringPart::Interpolation(source.trim().to_string())
        }),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_template_text(input: &str) -> ParserResult<StringPart> {
    context(
        "template text",
        map(
            alt((
                escaped_transform(
                    none_of("\\`$"),
                    '\\',
                    alt((
                        value("\\", tag("\\")),
                        value("`", tag("`")),
                        value("$", tag("$")),
                        value("\n", tag("n")),
                        value("\t", tag("t")),
                    )),
                ),
                map(terminated(char('$'), not(char('{'))), |_| "$".to_string()),
            )),
            StringPart::Literal,
        ),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_template_literal(input: &str) -> ParserResult<Literal> {
    context(
        "template literal",
        map(
            delimited(
                char('`'),
                many0(alt((parse_interpolation, parse_template_text))),
                char('`'),
            ),
            |parts| Literal::Template(merge_text(parts)),
        ),
    )(input)
}

fn merge_text(parts: Vec<StringPart>) -> Vec<StringPart> {
    let mut merged: Vec<StringPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match (merged.last_mut(), part) {
            (Some(StringPart::Literal(prev)), StringPart::Literal(next)) => prev.push_str(&next),
            (_, part) => merged.push(part),
        }
    }
    merged
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_float_literal(input: &str) -> ParserResult<Literal> {
    context(
        "float literal",
        map_res(
            recognize(tuple((digit1, char('.'), digit1))),
            |s: &str| s.parse::<f64>().map(Literal::Float),
        ),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
fn parse_integer_literal(input: &str) -> ParserResult<Literal> {
    context(
        "integer literal",
        map_res(recognize(pair(digit1, not(char('.')))), |s: &str| {
            s.parse::<i64>().map(Literal::Integer)
        }),
    )(input)
}

#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((
                parse_string_literal,
                parse_template_literal,
                parse_float_literal,
                parse_integer_literal,
            )),
            Token::Literal,
        ),
    )(input)
}

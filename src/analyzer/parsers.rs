//! Expression grammar over the significant (non-whitespace) token stream.
//!
//! Operators are lowered to calls named by their symbol, array literals to
//! `createArray`, and member/index access on anything that is not a plain
//! path to `getProperty`/`element`. Precedence, loosest first:
//! `||`, `&&`, `== !=`, `< <= > >=`, `+ - &`, `* / %`, `^`, unary `! - +`.

use super::{core::*, prelude::*};
use crate::ast::{Syntax, TemplateSegment};
use crate::eval::Value;
use crate::tokenizer::{Delimiter, Literal, Operator, StringPart, Token};

/// Parses a complete expression; every token must be consumed.
#[tracing::instrument(level = "debug", skip(tokens))]
pub fn parse_syntax(tokens: &[Token]) -> Result<Syntax, ParseError> {
    let (pos, syntax) = parse_expression().parse(tokens, 0)?;
    match tokens.get(pos) {
        None => Ok(syntax),
        Some(token) => Err(ParseError::Unexpected {
            found: token.to_string(),
            position: pos,
        }),
    }
}

pub fn parse_expression() -> impl Parser<Token, Syntax> {
    with_context(lazy(parse_logical_or), "expression")
}

fn parse_logical_or() -> impl Parser<Token, Syntax> {
    binary_level(parse_logical_and, &[Operator::Or], "logical or")
}

fn parse_logical_and() -> impl Parser<Token, Syntax> {
    binary_level(parse_equality, &[Operator::And], "logical and")
}

fn parse_equality() -> impl Parser<Token, Syntax> {
    binary_level(
        parse_comparison,
        &[Operator::EqualEqual, Operator::NotEqual],
        "equality",
    )
}

fn parse_comparison() -> impl Parser<Token, Syntax> {
    binary_level(
        parse_additive,
        &[
            Operator::Less,
            Operator::LessEqual,
            Operator::Greater,
            Operator::GreaterEqual,
        ],
        "comparison",
    )
}

fn parse_additive() -> impl Parser<Token, Syntax> {
    binary_level(
        parse_multiplicative,
        &[Operator::Plus, Operator::Minus, Operator::Concat],
        "additive",
    )
}

fn parse_multiplicative() -> impl Parser<Token, Syntax> {
    binary_level(
        parse_power,
        &[Operator::Multiply, Operator::Divide, Operator::Modulo],
        "multiplicative",
    )
}

fn parse_power() -> impl Parser<Token, Syntax> {
    binary_level(parse_unary, &[Operator::Power], "power")
}

/// One left-associative precedence level: `operand (op operand)*`.
fn binary_level<F, P>(
    operand: F,
    operators: &'static [Operator],
    context: &'static str,
) -> impl Parser<Token, Syntax>
where
    F: Fn() -> P,
    P: Parser<Token, Syntax>,
{
    with_context(
        map(
            tuple2(
                operand(),
                many(tuple2(parse_operator_in(operators), operand())),
            ),
            |(first, rest)| {
                rest.into_iter()
                    .fold(first, |left, (op, right)| call(op.as_ref(), vec![left, right]))
            },
        ),
        context,
    )
}

fn parse_operator_in(operators: &'static [Operator]) -> impl Parser<Token, Operator> {
    satisfy(move |token: &Token| match token {
        Token::Operator(op) if operators.contains(op) => Some(*op),
        _ => None,
    })
}

fn parse_unary() -> impl Parser<Token, Syntax> {
    with_context(
        choice(vec![
            Box::new(map(
                preceded(operator(Operator::Not), lazy(parse_unary)),
                |operand| call("!", vec![operand]),
            )),
            Box::new(map(
                preceded(operator(Operator::Minus), lazy(parse_unary)),
                negate,
            )),
            Box::new(preceded(operator(Operator::Plus), lazy(parse_unary))),
            Box::new(parse_postfix()),
        ]),
        "unary",
    )
}

fn negate(operand: Syntax) -> Syntax {
    match operand {
        Syntax::Literal(Value::Integer(n)) => Syntax::Literal(Value::Integer(-n)),
        Syntax::Literal(Value::Float(n)) => Syntax::Literal(Value::Float(-n)),
        other => call("-", vec![Syntax::Literal(Value::Integer(0)), other]),
    }
}

enum Postfix {
    Member(String),
    Index(Syntax),
}

fn parse_postfix() -> impl Parser<Token, Syntax> {
    map(
        tuple2(parse_primary(), many(parse_postfix_operation())),
        |(base, operations)| operations.into_iter().fold(base, apply_postfix),
    )
}

fn parse_postfix_operation() -> impl Parser<Token, Postfix> {
    choice(vec![
        Box::new(map(
            preceded(operator(Operator::Dot), parse_identifier()),
            Postfix::Member,
        )),
        Box::new(map(
            delimited(
                delimiter(Delimiter::OpenBracket),
                lazy(parse_expression),
                delimiter(Delimiter::CloseBracket),
            ),
            Postfix::Index,
        )),
    ])
}

// Constant access on a path stays a path so the scope resolver sees all of it.
fn apply_postfix(base: Syntax, operation: Postfix) -> Syntax {
    match (base, operation) {
        (Syntax::Path(path), Postfix::Member(name)) => Syntax::Path(format!("{}.{}", path, name)),
        (Syntax::Path(path), Postfix::Index(Syntax::Literal(Value::Integer(i)))) if i >= 0 => {
            Syntax::Path(format!("{}[{}]", path, i))
        }
        (Syntax::Path(path), Postfix::Index(Syntax::Literal(Value::String(key))))
            if !key.contains('\'') =>
        {
            Syntax::Path(format!("{}['{}']", path, key))
        }
        (base, Postfix::Member(name)) => {
            call("getProperty", vec![base, Syntax::Literal(Value::String(name))])
        }
        (base, Postfix::Index(index)) => call("element", vec![base, index]),
    }
}

fn parse_primary() -> impl Parser<Token, Syntax> {
    with_context(
        choice(vec![
            Box::new(parse_literal()),
            Box::new(parse_array()),
            Box::new(parse_parenthesized()),
            Box::new(parse_function_call()),
            Box::new(parse_class_path()),
            Box::new(map(parse_identifier(), Syntax::Path)),
        ]),
        "primary",
    )
}

fn parse_literal() -> impl Parser<Token, Syntax> {
    satisfy(|token: &Token| match token {
        Token::Literal(literal) => Some(literal_syntax(literal)),
        _ => None,
    })
}

fn literal_syntax(literal: &Literal) -> Syntax {
    match literal {
        Literal::String(s) => Syntax::Literal(Value::String(s.clone())),
        Literal::Integer(n) => Syntax::Literal(Value::Integer(*n)),
        Literal::Float(n) => Syntax::Literal(Value::Float(*n)),
        Literal::Boolean(b) => Syntax::Literal(Value::Boolean(*b)),
        Literal::Null => Syntax::Literal(Value::Null),
        Literal::Template(parts) => Syntax::Template(
            parts
                .iter()
                .map(|part| match part {
                    StringPart::Literal(text) => TemplateSegment::Text(text.clone()),
                    StringPart::Interpolation(source) => TemplateSegment::Source(source.clone()),
                })
                .collect(),
        ),
    }
}

fn parse_array() -> impl Parser<Token, Syntax> {
    with_context(
        map(
            delimited(
                delimiter(Delimiter::OpenBracket),
                parse_arguments(),
                delimiter(Delimiter::CloseBracket),
            ),
            |items| call("createArray", items),
        ),
        "array literal",
    )
}

fn parse_parenthesized() -> impl Parser<Token, Syntax> {
    delimited(
        delimiter(Delimiter::OpenParen),
        lazy(parse_expression),
        delimiter(Delimiter::CloseParen),
    )
}

fn parse_function_call() -> impl Parser<Token, Syntax> {
    with_context(
        map(
            tuple2(
                parse_identifier(),
                delimited(
                    delimiter(Delimiter::OpenParen),
                    parse_arguments(),
                    delimiter(Delimiter::CloseParen),
                ),
            ),
            |(name, args)| Syntax::Call { name, args },
        ),
        "function call",
    )
}

fn parse_arguments() -> impl Parser<Token, Vec<Syntax>> {
    separated_list(lazy(parse_expression), delimiter(Delimiter::Comma))
}

// `%name` reads class memory; the tokenizer sees `%` as the modulo operator.
fn parse_class_path() -> impl Parser<Token, Syntax> {
    map(
        preceded(operator(Operator::Modulo), parse_identifier()),
        |name| Syntax::Path(format!("%{}", name)),
    )
}

fn parse_identifier() -> impl Parser<Token, String> {
    satisfy(|token: &Token| match token {
        Token::Identifier(name) => Some(name.clone()),
        _ => None,
    })
}

fn operator(op: Operator) -> impl Parser<Token, ()> {
    as_unit(equal(Token::Operator(op)))
}

fn delimiter(d: Delimiter) -> impl Parser<Token, ()> {
    as_unit(equal(Token::Delimiter(d)))
}

fn call(name: &str, args: Vec<Syntax>) -> Syntax {
    Syntax::Call {
        name: name.to_string(),
        args,
    }
}

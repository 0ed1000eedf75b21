use nom::{character::complete::multispace1, combinator::map, error::context};

use super::token::{ParserResult, Token};

/// Spaces, tabs and line breaks. Kept as tokens so spans stay exact; the
/// parser drops them before grammar matching.
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_whitespace(input: &str) -> ParserResult<Token> {
    context(
        "whitespace",
        map(multispace1, |ws: &str| Token::Whitespace(ws.to_string())),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace() {
        let (rest, token) = parse_whitespace(" \t\n x").unwrap();
        assert_eq!(token, Token::Whitespace(" \t\n ".to_string()));
        assert_eq!(rest, "x");
    }
}

//! Parser plumbing: located input, intermediate errors and lexical pieces.

use std::sync::Arc;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as tag_char, digit0, digit1, hex_digit1, one_of},
    combinator::{cut, opt, recognize},
    error::context,
    sequence::{pair, tuple},
    Err as NomErr, Slice,
};
use nom_locate::LocatedSpan;

use crate::error::{ParseError, ParseErrorKind};
use crate::value::Value;

/// Parser input with location tracking.
pub(crate) type InputSpan<'a> = LocatedSpan<&'a str>;

/// Result type of the internal parsers.
pub(crate) type NomResult<'a, T> = nom::IResult<InputSpan<'a>, T, SpannedError<'a>>;

/// Words that act as operators and can never be identifiers.
const KEYWORDS: [&str; 4] = ["and", "or", "not", "in"];

/// How much of the offending input an error message quotes.
const FRAGMENT_LEN: usize = 40;

/// Intermediate error carrying the position where parsing stopped; converted
/// into a [`ParseError`] once the overall parse finishes.
#[derive(Debug)]
pub(crate) struct SpannedError<'a> {
    span: InputSpan<'a>,
    kind: ParseErrorKind,
}

impl<'a> SpannedError<'a> {
    pub(crate) fn new(span: InputSpan<'a>, kind: ParseErrorKind) -> Self {
        Self { span, kind }
    }

    /// Unrecoverable failure; `alt` will not try other branches.
    pub(crate) fn fail(span: InputSpan<'a>, kind: ParseErrorKind) -> NomErr<Self> {
        NomErr::Failure(Self::new(span, kind))
    }

    pub(crate) fn into_parse_error(self) -> ParseError {
        let kind = if self.span.fragment().is_empty()
            && matches!(self.kind, ParseErrorKind::Syntax)
        {
            ParseErrorKind::Eof
        } else {
            self.kind
        };
        ParseError {
            kind,
            fragment: clip_fragment(self.span.fragment()),
            offset: self.span.location_offset(),
            line: self.span.location_line(),
            column: self.span.get_utf8_column(),
        }
    }
}

impl<'a> nom::error::ParseError<InputSpan<'a>> for SpannedError<'a> {
    fn from_error_kind(input: InputSpan<'a>, _kind: nom::error::ErrorKind) -> Self {
        Self::new(input, ParseErrorKind::Syntax)
    }

    fn append(_input: InputSpan<'a>, _kind: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl<'a> nom::error::ContextError<InputSpan<'a>> for SpannedError<'a> {
    fn add_context(input: InputSpan<'a>, context: &'static str, other: Self) -> Self {
        // The outermost context closest to the failure wins; more specific
        // kinds (literal conversions etc.) are kept as is.
        if matches!(other.kind, ParseErrorKind::Syntax) {
            Self::new(input, ParseErrorKind::Context(context))
        } else {
            other
        }
    }
}

pub(crate) fn convert_error(input: &str, err: NomErr<SpannedError<'_>>) -> ParseError {
    match err {
        NomErr::Error(spanned) | NomErr::Failure(spanned) => spanned.into_parse_error(),
        NomErr::Incomplete(_) => ParseError {
            kind: ParseErrorKind::Eof,
            fragment: "".into(),
            offset: input.len(),
            line: input.bytes().filter(|byte| *byte == b'\n').count() as u32 + 1,
            column: input.len() - input.rfind('\n').map_or(0, |pos| pos + 1) + 1,
        },
    }
}

/// Clips `text` to a single line of at most [`FRAGMENT_LEN`] bytes.
pub(crate) fn clip_fragment(text: &str) -> Arc<str> {
    let mut end = text.len().min(FRAGMENT_LEN);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let clipped = &text[..end];
    match clipped.find('\n') {
        Some(pos) => clipped[..pos].into(),
        None => clipped.into(),
    }
}

/// Zero or more whitespace characters.
pub(crate) fn ws(input: InputSpan<'_>) -> NomResult<'_, InputSpan<'_>> {
    take_while(|c: char| c.is_ascii_whitespace())(input)
}

fn ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Identifier: letters, digits and underscores, not starting with a digit
/// and not one of the operator keywords.
pub(crate) fn ident(input: InputSpan<'_>) -> NomResult<'_, InputSpan<'_>> {
    let (rest, word) = take_while1(ident_char)(input)?;
    let starts_with_digit = word
        .fragment()
        .starts_with(|c: char| c.is_ascii_digit());
    if starts_with_digit || KEYWORDS.contains(word.fragment()) {
        Err(NomErr::Error(SpannedError::new(input, ParseErrorKind::Syntax)))
    } else {
        Ok((rest, word))
    }
}

/// Matches `word` only when it is not a prefix of a longer identifier.
pub(crate) fn keyword(word: &'static str) -> impl Fn(InputSpan<'_>) -> NomResult<'_, InputSpan<'_>> {
    move |input| {
        let (rest, matched) = tag(word)(input)?;
        if rest.fragment().starts_with(ident_char) {
            Err(NomErr::Error(SpannedError::new(input, ParseErrorKind::Syntax)))
        } else {
            Ok((rest, matched))
        }
    }
}

/// Integer or float literal, including `0x` integers.
pub(crate) fn number(input: InputSpan<'_>) -> NomResult<'_, Value> {
    alt((hex_literal, decimal_literal))(input)
}

fn hex_literal(input: InputSpan<'_>) -> NomResult<'_, Value> {
    let (rest, _) = alt((tag("0x"), tag("0X")))(input)?;
    let (rest, digits) = cut(context("hex literal", hex_digit1))(rest)?;
    match i64::from_str_radix(digits.fragment(), 16) {
        Ok(value) => Ok((rest, Value::Int(value))),
        Err(err) => Err(SpannedError::fail(
            input,
            ParseErrorKind::Literal(err.into()),
        )),
    }
}

fn exponent(input: InputSpan<'_>) -> NomResult<'_, InputSpan<'_>> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(input)
}

fn decimal_literal(input: InputSpan<'_>) -> NomResult<'_, Value> {
    let (rest, text) = recognize(pair(
        alt((
            recognize(pair(digit1, opt(pair(tag_char('.'), digit0)))),
            recognize(pair(tag_char('.'), digit1)),
        )),
        opt(exponent),
    ))(input)?;
    let literal = *text.fragment();
    let is_float = literal.contains(|c| matches!(c, '.' | 'e' | 'E'));
    let parsed = if is_float {
        literal
            .parse::<f64>()
            .map(Value::Float)
            .map_err(anyhow::Error::new)
    } else {
        literal
            .parse::<i64>()
            .map(Value::Int)
            .map_err(anyhow::Error::new)
    };
    match parsed {
        Ok(value) => Ok((rest, value)),
        Err(err) => Err(SpannedError::fail(input, ParseErrorKind::Literal(err))),
    }
}

/// String literal in single or double quotes with `\n`, `\t`, `\r`, `\\`
/// and quote escapes.
pub(crate) fn string_literal(input: InputSpan<'_>) -> NomResult<'_, Value> {
    let quote = match input.fragment().chars().next() {
        Some(c @ ('"' | '\'')) => c,
        _ => {
            return Err(NomErr::Error(SpannedError::new(
                input,
                ParseErrorKind::Syntax,
            )))
        }
    };
    let mut result = String::new();
    let mut chars = input.fragment()[1..].char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => {
                let consumed = 1 + i + c.len_utf8();
                return Ok((input.slice(consumed..), Value::Str(result.into())));
            }
            '\\' => match chars.next() {
                Some((_, 'n')) => result.push('\n'),
                Some((_, 't')) => result.push('\t'),
                Some((_, 'r')) => result.push('\r'),
                Some((_, escaped @ ('\\' | '"' | '\''))) => result.push(escaped),
                _ => {
                    return Err(SpannedError::fail(
                        input,
                        ParseErrorKind::Context("string escape"),
                    ))
                }
            },
            other => result.push(other),
        }
    }
    Err(SpannedError::fail(
        input,
        ParseErrorKind::Context("unterminated string"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn span(input: &str) -> InputSpan<'_> {
        InputSpan::new(input)
    }

    #[test]
    fn identifiers_and_keywords() {
        let (rest, word) = ident(span("pt_raw + 1")).unwrap();
        assert_eq!(*word.fragment(), "pt_raw");
        assert_eq!(*rest.fragment(), " + 1");

        // Keywords are not identifiers, but identifiers may contain them.
        assert!(ident(span("and")).is_err());
        let (_, word) = ident(span("android")).unwrap();
        assert_eq!(*word.fragment(), "android");

        assert!(keyword("in")(span("in x")).is_ok());
        assert!(keyword("in")(span("inner")).is_err());
    }

    #[test]
    fn numbers() {
        assert_matches!(number(span("42")), Ok((_, Value::Int(42))));
        assert_matches!(number(span("0xff")), Ok((_, Value::Int(255))));
        assert_matches!(number(span("1.5")), Ok((_, Value::Float(x))) if x == 1.5);
        assert_matches!(number(span(".5")), Ok((_, Value::Float(x))) if x == 0.5);
        assert_matches!(number(span("2.")), Ok((_, Value::Float(x))) if x == 2.0);
        assert_matches!(number(span("1e3")), Ok((_, Value::Float(x))) if x == 1000.0);
        assert_matches!(number(span("2.5e-1")), Ok((_, Value::Float(x))) if x == 0.25);

        assert_matches!(
            number(span("99999999999999999999")),
            Err(NomErr::Failure(err)) if matches!(err.kind, ParseErrorKind::Literal(_))
        );
    }

    #[test]
    fn strings() {
        let (rest, value) = string_literal(span("\"jet\\n\" + x")).unwrap();
        assert_matches!(value, Value::Str(s) if &*s == "jet\n");
        assert_eq!(*rest.fragment(), " + x");

        let (_, value) = string_literal(span("'it''s'")).unwrap();
        assert_matches!(value, Value::Str(s) if &*s == "it");

        assert_matches!(string_literal(span("\"open")), Err(NomErr::Failure(_)));
        assert_matches!(string_literal(span("\"bad\\q\"")), Err(NomErr::Failure(_)));
    }

    #[test]
    fn fragments_are_clipped() {
        let long = "x".repeat(100);
        assert_eq!(clip_fragment(&long).len(), 40);
        assert_eq!(&*clip_fragment("a + b\nrest"), "a + b");
    }
}

//! Formula parser.
//!
//! The grammar is a conventional precedence ladder, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | 1 | `or` |
//! | 2 | `and` |
//! | 3 | `not` (prefix) |
//! | 4 | `==` `!=` `<` `<=` `>` `>=` `in` `not in` (chaining) |
//! | 5 | `\|` |
//! | 6 | `^` |
//! | 7 | `&` |
//! | 8 | `<<` `>>` |
//! | 9 | `+` `-` |
//! | 10 | `*` `/` `//` `%` |
//! | 11 | unary `-` `~` |
//! | 12 | `**` (right-associative) |
//! | 13 | calls, `.attr`, `[index]` |
//!
//! Comparisons chain as in Python: `a < b <= c` means `a < b and b <= c`
//! with `b` evaluated once per term. Only `==`, `<`, `<=` and `in` exist as
//! tree nodes; `!=`, `>`, `>=` and `not in` become negations and argument
//! swaps while parsing. Identifiers are resolved against
//! [`Builtins::standard`], so `pi` parses as a constant and `sqrt` as a
//! function value; `int`, `float` and `bool` parse into cast nodes.

mod helpers;

use std::sync::Arc;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::char as tag_char,
    combinator::{cut, map, not, opt, value},
    error::context,
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
};

use self::helpers::{
    convert_error, ident, keyword, number, string_literal, ws, InputSpan, NomResult, SpannedError,
};
use crate::ast::ops::{BinaryOp, BoolOp, UnaryOp};
use crate::ast::Expr;
use crate::builtins::{Builtins, Resolved};
use crate::error::{ParseError, ParseErrorKind};
use crate::types::ValueType;

/// Parses a complete formula into an expression tree.
///
/// # Errors
///
/// Returns an error describing the failure position when the input is not a
/// single well-formed expression.
pub fn parse_expression(input: &str) -> Result<Arc<Expr>, ParseError> {
    let span = InputSpan::new(input);
    match delimited(ws, or_level, ws)(span) {
        Ok((rest, expr)) => {
            if rest.fragment().is_empty() {
                Ok(expr)
            } else {
                Err(SpannedError::new(rest, ParseErrorKind::Leftovers).into_parse_error())
            }
        }
        Err(err) => Err(convert_error(input, err)),
    }
}

fn logical_level<'a>(
    input: InputSpan<'a>,
    op: BoolOp,
    operand: fn(InputSpan<'a>) -> NomResult<'a, Arc<Expr>>,
) -> NomResult<'a, Arc<Expr>> {
    let (rest, first) = operand(input)?;
    // Once the operator is consumed the right operand is mandatory, so `cut`
    // turns its absence into a terminal error instead of a leftover report.
    let (rest, others) = many0(preceded(
        delimited(ws, keyword(op.as_str()), ws),
        cut(operand),
    ))(rest)?;
    if others.is_empty() {
        Ok((rest, first))
    } else {
        let mut terms = Vec::with_capacity(others.len() + 1);
        terms.push(first);
        terms.extend(others);
        Ok((rest, Arc::new(Expr::Logical { op, terms })))
    }
}

fn or_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    logical_level(input, BoolOp::Or, and_level)
}

fn and_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    logical_level(input, BoolOp::And, not_level)
}

fn not_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    alt((
        map(preceded(pair(keyword("not"), ws), cut(not_level)), |inner| {
            Expr::unary(UnaryOp::Not, inner)
        }),
        comparison_level,
    ))(input)
}

/// Comparison operator as written, before desugaring.
#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

fn comparison_op(input: InputSpan<'_>) -> NomResult<'_, CmpOp> {
    alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag_char('<')),
        value(CmpOp::Gt, tag_char('>')),
        value(CmpOp::NotIn, tuple((keyword("not"), ws, keyword("in")))),
        value(CmpOp::In, keyword("in")),
    ))(input)
}

fn build_comparison(op: CmpOp, lhs: Arc<Expr>, rhs: Arc<Expr>) -> Arc<Expr> {
    match op {
        CmpOp::Eq => Expr::binary(BinaryOp::Eq, lhs, rhs),
        CmpOp::Ne => Expr::unary(UnaryOp::Not, Expr::binary(BinaryOp::Eq, lhs, rhs)),
        CmpOp::Lt => Expr::binary(BinaryOp::Lt, lhs, rhs),
        CmpOp::Le => Expr::binary(BinaryOp::Le, lhs, rhs),
        CmpOp::Gt => Expr::binary(BinaryOp::Lt, rhs, lhs),
        CmpOp::Ge => Expr::binary(BinaryOp::Le, rhs, lhs),
        CmpOp::In => Expr::binary(BinaryOp::In, lhs, rhs),
        CmpOp::NotIn => Expr::unary(UnaryOp::Not, Expr::binary(BinaryOp::In, lhs, rhs)),
    }
}

fn comparison_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    let (rest, first) = bit_or_level(input)?;
    let (rest, chain) = many0(pair(
        delimited(ws, comparison_op, ws),
        cut(bit_or_level),
    ))(rest)?;
    if chain.is_empty() {
        return Ok((rest, first));
    }
    let mut comparisons = Vec::with_capacity(chain.len());
    let mut lhs = first;
    for (op, rhs) in chain {
        comparisons.push(build_comparison(op, lhs, Arc::clone(&rhs)));
        lhs = rhs;
    }
    Ok((rest, Expr::and(comparisons)))
}

fn fold_binary<'a>(
    input: InputSpan<'a>,
    operand: fn(InputSpan<'a>) -> NomResult<'a, Arc<Expr>>,
    operator: fn(InputSpan<'a>) -> NomResult<'a, BinaryOp>,
) -> NomResult<'a, Arc<Expr>> {
    let (rest, first) = operand(input)?;
    let (rest, tail) = many0(pair(delimited(ws, operator, ws), cut(operand)))(rest)?;
    let folded = tail
        .into_iter()
        .fold(first, |lhs, (op, rhs)| Expr::binary(op, lhs, rhs));
    Ok((rest, folded))
}

fn bit_or_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, bit_xor_level, |i| {
        value(BinaryOp::BitOr, tag_char('|'))(i)
    })
}

fn bit_xor_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, bit_and_level, |i| {
        value(BinaryOp::BitXor, tag_char('^'))(i)
    })
}

fn bit_and_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, shift_level, |i| {
        value(BinaryOp::BitAnd, tag_char('&'))(i)
    })
}

fn shift_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, add_sub_level, |i| {
        alt((
            value(BinaryOp::Shl, tag("<<")),
            value(BinaryOp::Shr, tag(">>")),
        ))(i)
    })
}

fn add_sub_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, mul_div_level, |i| {
        alt((
            value(BinaryOp::Add, tag_char('+')),
            value(BinaryOp::Sub, tag_char('-')),
        ))(i)
    })
}

fn mul_div_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    fold_binary(input, unary_level, |i| {
        alt((
            value(BinaryOp::FloorDiv, tag("//")),
            value(BinaryOp::Div, tag_char('/')),
            value(BinaryOp::Rem, tag_char('%')),
            value(BinaryOp::Mul, tag_char('*')),
        ))(i)
    })
}

fn unary_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    alt((
        map(preceded(pair(tag_char('-'), ws), cut(unary_level)), |inner| {
            Expr::unary(UnaryOp::Neg, inner)
        }),
        map(preceded(pair(tag_char('~'), ws), cut(unary_level)), |inner| {
            Expr::unary(UnaryOp::BitNot, inner)
        }),
        power_level,
    ))(input)
}

/// `**` binds tighter than unary minus on its left and looser on its right,
/// so `-2 ** -3` parses as `-(2 ** (-3))`.
fn power_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    let (rest, base) = postfix_level(input)?;
    let (rest, exponent) = opt(preceded(
        delimited(ws, tag("**"), ws),
        cut(unary_level),
    ))(rest)?;
    Ok(match exponent {
        Some(exponent) => (rest, Expr::binary(BinaryOp::Pow, base, exponent)),
        None => (rest, base),
    })
}

/// Atom: either an expression or a pending conversion such as `int`, which
/// must be applied to call arguments.
enum Atom {
    Expr(Arc<Expr>),
    Cast(ValueType),
}

fn postfix_level(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    let (mut rest, atom) = atom_level(input)?;
    let mut expr = match atom {
        Atom::Expr(expr) => expr,
        Atom::Cast(ty) => {
            let (after, (args, kwargs)) = preceded(
                ws,
                cut(context("conversion call", call_arguments)),
            )(rest)?;
            if !kwargs.is_empty() || args.len() != 1 {
                return Err(SpannedError::fail(
                    input,
                    ParseErrorKind::Context("conversion with a single argument"),
                ));
            }
            rest = after;
            let mut args = args;
            Expr::cast(ty, args.remove(0))
        }
    };

    loop {
        match preceded(ws, call_arguments)(rest) {
            Ok((after, (args, kwargs))) => {
                expr = Expr::call_with_kwargs(expr, args, kwargs);
                rest = after;
                continue;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => {}
        }
        match attribute(rest) {
            Ok((after, name)) => {
                expr = Expr::attr(expr, *name.fragment());
                rest = after;
                continue;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => {}
        }
        match subscript(rest) {
            Ok((after, index)) => {
                expr = Expr::index(expr, index);
                rest = after;
            }
            Err(err @ nom::Err::Failure(_)) => return Err(err),
            Err(_) => break,
        }
    }
    Ok((rest, expr))
}

fn attribute(input: InputSpan<'_>) -> NomResult<'_, InputSpan<'_>> {
    preceded(
        tuple((ws, tag_char('.'), ws)),
        cut(context("attribute name", ident)),
    )(input)
}

fn subscript(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    preceded(
        pair(ws, tag_char('[')),
        cut(context(
            "subscript",
            delimited(ws, or_level, pair(ws, tag_char(']'))),
        )),
    )(input)
}

type CallArgs = (Vec<Arc<Expr>>, Vec<(Arc<str>, Arc<Expr>)>);

enum CallArg {
    Positional(Arc<Expr>),
    Keyword(Arc<str>, Arc<Expr>),
}

fn call_argument(input: InputSpan<'_>) -> NomResult<'_, CallArg> {
    let keyword_form = map(
        tuple((
            ident,
            delimited(ws, terminated(tag_char('='), not(tag_char('='))), ws),
            or_level,
        )),
        |(name, _, value)| CallArg::Keyword((*name.fragment()).into(), value),
    );
    alt((keyword_form, map(or_level, CallArg::Positional)))(input)
}

fn call_arguments(input: InputSpan<'_>) -> NomResult<'_, CallArgs> {
    let (rest, raw) = preceded(
        pair(tag_char('('), ws),
        cut(context(
            "call arguments",
            terminated(
                separated_list0(delimited(ws, tag_char(','), ws), call_argument),
                tuple((opt(pair(ws, tag_char(','))), ws, tag_char(')'))),
            ),
        )),
    )(input)?;

    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for item in raw {
        match item {
            CallArg::Positional(expr) => {
                if !kwargs.is_empty() {
                    return Err(SpannedError::fail(
                        input,
                        ParseErrorKind::PositionalAfterKeyword,
                    ));
                }
                args.push(expr);
            }
            CallArg::Keyword(name, expr) => kwargs.push((name, expr)),
        }
    }
    Ok((rest, (args, kwargs)))
}

fn atom_level(input: InputSpan<'_>) -> NomResult<'_, Atom> {
    alt((
        map(number, |value| Atom::Expr(Arc::new(Expr::Constant(value)))),
        map(string_literal, |value| {
            Atom::Expr(Arc::new(Expr::Constant(value)))
        }),
        map(paren_or_tuple, Atom::Expr),
        identifier_atom,
    ))(input)
}

fn identifier_atom(input: InputSpan<'_>) -> NomResult<'_, Atom> {
    let (rest, name) = ident(input)?;
    let atom = match Builtins::standard().resolve(name.fragment()) {
        Some(Resolved::Constant(value)) => Atom::Expr(Arc::new(Expr::Constant(value.clone()))),
        Some(Resolved::Cast(ty)) => Atom::Cast(*ty),
        None => Atom::Expr(Expr::symbol(*name.fragment())),
    };
    Ok((rest, atom))
}

fn paren_or_tuple(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    preceded(
        pair(tag_char('('), ws),
        cut(context("parenthesised expression", paren_body)),
    )(input)
}

fn paren_body(input: InputSpan<'_>) -> NomResult<'_, Arc<Expr>> {
    let (rest, immediate_close) = opt(tag_char(')'))(input)?;
    if immediate_close.is_some() {
        return Ok((rest, Expr::tuple(Vec::new())));
    }
    let (rest, first) = or_level(rest)?;
    let (rest, others) = many0(preceded(delimited(ws, tag_char(','), ws), or_level))(rest)?;
    let (rest, trailing_comma) = opt(pair(ws, tag_char(',')))(rest)?;
    let (rest, _) = pair(ws, tag_char(')'))(rest)?;

    if others.is_empty() && trailing_comma.is_none() {
        Ok((rest, first))
    } else {
        let mut items = Vec::with_capacity(others.len() + 1);
        items.push(first);
        items.extend(others);
        Ok((rest, Expr::tuple(items)))
    }
}

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, tag_no_case, take_while},
    character::complete::{char, digit1, multispace0, multispace1, satisfy},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use serde_json::Value;
use tracing::instrument;

use super::ast::{BinaryOperator, Expr, Function};
use super::{EngineError, EngineResult};

/// Deepest nesting accepted, counted both while descending and in the
/// height of the resulting tree.
pub const MAX_DEPTH: usize = 64;

/// Parses a complete expression; trailing input is an error.
#[instrument(level = "debug")]
pub fn parse(source: &str) -> EngineResult<Expr> {
    let expr = match all_consuming(ws(|input| parse_expression(input, 0)))(source) {
        Ok((_, expr)) => expr,
        Err(nom::Err::Failure(e)) if e.code == ErrorKind::TooLarge => {
            return Err(EngineError::Parse("expression nested too deeply".to_string()));
        }
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(EngineError::Parse(describe(source, e.input)));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(EngineError::Parse("incomplete expression".to_string()));
        }
    };
    check_arity(&expr)?;
    Ok(expr)
}

fn describe(source: &str, rest: &str) -> String {
    if rest.trim().is_empty() {
        return "unexpected end of expression".to_string();
    }
    let offset = source.len() - rest.len();
    let excerpt: String = rest.chars().take(16).collect();
    format!("unexpected input at offset {}: {:?}", offset, excerpt)
}

fn check_arity(expr: &Expr) -> EngineResult<()> {
    match expr {
        Expr::Call { function, args } => {
            if args.len() != function.arity() {
                return Err(EngineError::Parse(format!(
                    "{} expects {} argument(s), got {}",
                    function,
                    function.arity(),
                    args.len()
                )));
            }
            args.iter().try_for_each(check_arity)
        }
        Expr::Binary { left, right, .. } => {
            check_arity(left)?;
            check_arity(right)
        }
        Expr::Not(inner) | Expr::Negate(inner) => check_arity(inner),
        Expr::Literal(_) | Expr::Field(_) | Expr::Last(_) | Expr::Now | Expr::Today => Ok(()),
    }
}

fn too_deep(input: &str) -> nom::Err<Error<&str>> {
    nom::Err::Failure(Error::new(input, ErrorKind::TooLarge))
}

/// One level further down, or a hard failure past [`MAX_DEPTH`].
fn descend(input: &str, depth: usize) -> Result<usize, nom::Err<Error<&str>>> {
    if depth >= MAX_DEPTH {
        return Err(too_deep(input));
    }
    Ok(depth + 1)
}

fn bounded(input: &str, expr: Expr) -> IResult<&str, Expr> {
    if expr.height() > MAX_DEPTH {
        return Err(too_deep(input));
    }
    Ok((input, expr))
}

/// Left-folds a binary chain. The chain length is checked before the tree is
/// built.
fn fold_chain(input: &str, first: Expr, rest: Vec<(BinaryOperator, Expr)>) -> IResult<&str, Expr> {
    if rest.is_empty() {
        return Ok((input, first));
    }
    if rest.len() >= MAX_DEPTH {
        return Err(too_deep(input));
    }
    let expr = rest
        .into_iter()
        .fold(first, |left, (op, right)| Expr::binary(op, left, right));
    bounded(input, expr)
}

fn parse_expression(input: &str, depth: usize) -> IResult<&str, Expr> {
    let depth = descend(input, depth)?;
    parse_or(input, depth)
}

// .OR.
fn parse_or(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_and(input, depth)?;
    let (input, rest) = many0(pair(
        value(BinaryOperator::Or, ws(dotted("OR"))),
        |input| parse_and(input, depth),
    ))(input)?;
    fold_chain(input, first, rest)
}

// .AND.
fn parse_and(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_not(input, depth)?;
    let (input, rest) = many0(pair(
        value(BinaryOperator::And, ws(dotted("AND"))),
        |input| parse_not(input, depth),
    ))(input)?;
    fold_chain(input, first, rest)
}

// .NOT.
fn parse_not(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, not) = opt(ws(dotted("NOT")))(input)?;
    if not.is_none() {
        return parse_comparison(input, depth);
    }
    let depth = descend(input, depth)?;
    let (rest, inner) = parse_not(rest, depth)?;
    bounded(rest, Expr::Not(Box::new(inner)))
}

// =, !=, <>, <, <=, >, >=, .CONTAINS.
fn parse_comparison(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_additive(input, depth)?;
    let (input, rest) = opt(pair(
        ws(alt((
            value(BinaryOperator::NotEqual, tag("!=")),
            value(BinaryOperator::NotEqual, tag("<>")),
            value(BinaryOperator::LessThanEqual, tag("<=")),
            value(BinaryOperator::GreaterThanEqual, tag(">=")),
            value(BinaryOperator::Equal, tag("=")),
            value(BinaryOperator::LessThan, tag("<")),
            value(BinaryOperator::GreaterThan, tag(">")),
            value(BinaryOperator::Contains, dotted("CONTAINS")),
        ))),
        |input| parse_additive(input, depth),
    ))(input)?;

    match rest {
        Some((op, right)) => bounded(input, Expr::binary(op, first, right)),
        None => Ok((input, first)),
    }
}

// +, -
fn parse_additive(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_multiplicative(input, depth)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Add, char('+')),
            value(BinaryOperator::Subtract, char('-')),
        ))),
        |input| parse_multiplicative(input, depth),
    ))(input)?;
    fold_chain(input, first, rest)
}

// *, /
fn parse_multiplicative(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = parse_unary(input, depth)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(BinaryOperator::Multiply, char('*')),
            value(BinaryOperator::Divide, char('/')),
        ))),
        |input| parse_unary(input, depth),
    ))(input)?;
    fold_chain(input, first, rest)
}

fn parse_unary(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (rest, minus) = opt(ws(char('-')))(input)?;
    if minus.is_none() {
        return parse_primary(input, depth);
    }
    let depth = descend(input, depth)?;
    let (rest, inner) = parse_unary(rest, depth)?;
    bounded(rest, Expr::Negate(Box::new(inner)))
}

fn parse_primary(input: &str, depth: usize) -> IResult<&str, Expr> {
    ws(alt((
        delimited(
            char('('),
            |input| parse_expression(input, depth),
            ws(char(')')),
        ),
        parse_constant,
        map(parse_number, Expr::Literal),
        map(parse_string, |s| Expr::Literal(Value::String(s))),
        parse_last,
        |input| parse_call(input, depth),
        map(identifier, |name| Expr::Field(name.to_string())),
    )))(input)
}

// .TRUE. .FALSE. .EMPTY. .NOW. .TODAY.
fn parse_constant(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Literal(Value::Bool(true)), dotted("TRUE")),
        value(Expr::Literal(Value::Bool(false)), dotted("FALSE")),
        value(Expr::Literal(Value::Null), dotted("EMPTY")),
        value(Expr::Now, dotted("NOW")),
        value(Expr::Today, dotted("TODAY")),
    ))(input)
}

fn parse_number(input: &str) -> IResult<&str, Value> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |text: &str| {
            if text.contains('.') {
                text.parse::<f64>().map(Value::from).map_err(|e| e.to_string())
            } else {
                text.parse::<i64>().map(Value::from).map_err(|e| e.to_string())
            }
        },
    )(input)
}

fn parse_string(input: &str) -> IResult<&str, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(
                is_not("\\\""),
                '\\',
                alt((
                    value("\\", char('\\')),
                    value("\"", char('"')),
                    value("\n", char('n')),
                )),
            )),
            Option::unwrap_or_default,
        ),
        char('"'),
    )(input)
}

fn parse_last(input: &str) -> IResult<&str, Expr> {
    map(
        preceded(pair(tag_no_case("LAST"), multispace1), identifier),
        |name| Expr::Last(name.to_string()),
    )(input)
}

fn parse_call(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, (function, args)) = pair(
        map_res(identifier, str::parse::<Function>),
        delimited(
            ws(char('(')),
            separated_list0(char(','), |input| parse_expression(input, depth)),
            ws(char(')')),
        ),
    )(input)?;
    bounded(input, Expr::Call { function, args })
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

/// A dot-delimited keyword such as `.AND.`, case-insensitive.
fn dotted<'a>(name: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    recognize(tuple((char('.'), tag_no_case(name), char('.'))))
}

/// Skips surrounding whitespace, newlines included.
fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

//! 守卫与速率的文本语法解析（nom）。
//!
//! 语法（优先级由低到高）：
//!
//! ```text
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := sum (("<=" | ">=" | "==" | "!=" | "<" | ">") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | atom
//! atom    := number | "true" | "false" | place | "(" or ")"
//! ```
//!
//! 库所名通过调用方提供的解析函数映射为 [`PlaceId`]。
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0};
use nom::combinator::{all_consuming, map, map_res, opt, recognize, value};
use nom::multi::many0;
use nom::number::complete::recognize_float;
use nom::sequence::{delimited, pair, preceded};
use nom::{IResult, Parser};
use thiserror::Error;

use crate::net::expr::{ArithOp, CmpOp, Expr};
use crate::net::ids::PlaceId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unknown place '{0}' in expression")]
    UnknownPlace(String),
    #[error("unable to parse expression '{input}' near '{remaining}'")]
    Syntax { input: String, remaining: String },
}

/// Raw syntax tree with place names still unresolved.
#[derive(Debug, Clone, PartialEq)]
enum Ast {
    Number(f64),
    Bool(bool),
    Name(String),
    Neg(Box<Ast>),
    Arith(ArithOp, Box<Ast>, Box<Ast>),
    Cmp(CmpOp, Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

const KEYWORDS: &[&str] = &["and", "or", "not", "true", "false"];

/// 解析 `input`，并用 `resolve` 把库所名映射为标识符。
pub fn parse_expr<F>(input: &str, mut resolve: F) -> Result<Expr, ParseError>
where
    F: FnMut(&str) -> Option<PlaceId>,
{
    let ast = match all_consuming(delimited(multispace0, or_expr, multispace0)).parse(input) {
        Ok((_, ast)) => ast,
        Err(err) => {
            let remaining = match &err {
                nom::Err::Error(e) | nom::Err::Failure(e) => e.input.to_owned(),
                nom::Err::Incomplete(_) => String::new(),
            };
            return Err(ParseError::Syntax {
                input: input.to_owned(),
                remaining,
            });
        }
    };
    lower(ast, &mut resolve)
}

fn lower<F>(ast: Ast, resolve: &mut F) -> Result<Expr, ParseError>
where
    F: FnMut(&str) -> Option<PlaceId>,
{
    Ok(match ast {
        Ast::Number(n) => Expr::Const(n),
        Ast::Bool(b) => Expr::Bool(b),
        Ast::Name(name) => match resolve(&name) {
            Some(place) => Expr::Tokens(place),
            None => return Err(ParseError::UnknownPlace(name)),
        },
        Ast::Neg(inner) => Expr::Neg(Box::new(lower(*inner, resolve)?)),
        Ast::Not(inner) => Expr::Not(Box::new(lower(*inner, resolve)?)),
        Ast::Arith(op, l, r) => {
            Expr::Arith(op, Box::new(lower(*l, resolve)?), Box::new(lower(*r, resolve)?))
        }
        Ast::Cmp(op, l, r) => {
            Expr::Cmp(op, Box::new(lower(*l, resolve)?), Box::new(lower(*r, resolve)?))
        }
        Ast::And(l, r) => Expr::And(Box::new(lower(*l, resolve)?), Box::new(lower(*r, resolve)?)),
        Ast::Or(l, r) => Expr::Or(Box::new(lower(*l, resolve)?), Box::new(lower(*r, resolve)?)),
    })
}

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

/// 关键字后不得紧跟标识符字符，避免把 `order` 读成 `or` + `der`。
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, ident) = identifier(input)?;
        if ident == word {
            Ok((rest, ident))
        } else {
            Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    }
}

fn name(input: &str) -> IResult<&str, Ast> {
    let (rest, ident) = identifier(input)?;
    if KEYWORDS.contains(&ident) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    Ok((rest, Ast::Name(ident.to_owned())))
}

/// 仅接受十进制字面量；`inf`/`nan` 会与库所名冲突。
fn number(input: &str) -> IResult<&str, Ast> {
    map_res(recognize_float, |s: &str| s.parse::<f64>().map(Ast::Number)).parse(input)
}

fn atom(input: &str) -> IResult<&str, Ast> {
    ws(alt((
        number,
        value(Ast::Bool(true), keyword("true")),
        value(Ast::Bool(false), keyword("false")),
        name,
        delimited(char('('), or_expr, char(')')),
    )))
    .parse(input)
}

fn unary(input: &str) -> IResult<&str, Ast> {
    alt((
        map(preceded(ws(char('-')), unary), |inner| Ast::Neg(Box::new(inner))),
        atom,
    ))
    .parse(input)
}

fn fold_left(first: Ast, rest: Vec<(ArithOp, Ast)>) -> Ast {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Ast::Arith(op, Box::new(acc), Box::new(rhs))
    })
}

fn product(input: &str) -> IResult<&str, Ast> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(ArithOp::Mul, char('*')),
            value(ArithOp::Div, char('/')),
        ))),
        unary,
    ))
    .parse(input)?;
    Ok((input, fold_left(first, rest)))
}

fn sum(input: &str) -> IResult<&str, Ast> {
    let (input, first) = product(input)?;
    let (input, rest) = many0(pair(
        ws(alt((
            value(ArithOp::Add, char('+')),
            value(ArithOp::Sub, char('-')),
        ))),
        product,
    ))
    .parse(input)?;
    Ok((input, fold_left(first, rest)))
}

fn cmp_op(input: &str) -> IResult<&str, CmpOp> {
    ws(alt((
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    )))
    .parse(input)
}

fn comparison(input: &str) -> IResult<&str, Ast> {
    let (input, lhs) = sum(input)?;
    let (input, tail) = opt(pair(cmp_op, sum)).parse(input)?;
    Ok(match tail {
        Some((op, rhs)) => (input, Ast::Cmp(op, Box::new(lhs), Box::new(rhs))),
        None => (input, lhs),
    })
}

fn not_expr(input: &str) -> IResult<&str, Ast> {
    alt((
        map(preceded(ws(keyword("not")), not_expr), |inner| {
            Ast::Not(Box::new(inner))
        }),
        comparison,
    ))
    .parse(input)
}

fn and_expr(input: &str) -> IResult<&str, Ast> {
    let (input, first) = not_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("and")), not_expr)).parse(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, rhs| Ast::And(Box::new(acc), Box::new(rhs))),
    ))
}

fn or_expr(input: &str) -> IResult<&str, Ast> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(ws(keyword("or")), and_expr)).parse(input)?;
    Ok((
        input,
        rest.into_iter()
            .fold(first, |acc, rhs| Ast::Or(Box::new(acc), Box::new(rhs))),
    ))
}

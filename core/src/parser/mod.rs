//! Parser for guest programs (boot payloads, kernels, drivers)
//!
//! pest does the grammar work; [`Builder`] turns the pair tree into the AST
//! the interpreter runs. Operators other than `&&` and `||` are lowered to
//! calls of the builtin with the same name (`a + b` becomes `add(a, b)`).

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::interpreter::types::{BinaryOp, Expr, MemberAccess, Span, Stmt};

pub mod semantic_validator;


#[derive(Parser)]
#[grammar = "parser/kernel.pest"]
struct KernelParser;

/* ===================== Errors ===================== */

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Rejected by the grammar
    #[error("{0}")]
    Syntax(String, Option<Span>),
    /// Accepted by the grammar but not a well-formed tree
    #[error("{}", located(.0, .1))]
    Malformed(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::Syntax(_, span) | ParseError::Malformed(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::Syntax(msg, _) | ParseError::Malformed(msg, _) => msg,
        }
    }
}

fn located(msg: &str, span: &Option<Span>) -> String {
    match span {
        Some(span) => format!("{} at {}:{}", msg, span.line + 1, span.col + 1),
        None => msg.to_string(),
    }
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            pest::error::LineColLocation::Pos(at) | pest::error::LineColLocation::Span(at, _) => at,
        };
        let span = Span::new(0, 0, line.saturating_sub(1), col.saturating_sub(1));
        ParseError::Syntax(err.to_string(), Some(span))
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a guest program into a block statement
pub fn parse_program(source: &str) -> ParseResult<Stmt> {
    let mut pairs = KernelParser::parse(Rule::program, source)?;
    let builder = Builder::new(source);
    let program = next(&mut pairs, "program", Span::default())?;
    let span = builder.span(&program);

    let body = program
        .into_inner()
        .filter(|p| p.as_rule() == Rule::statement)
        .map(|p| builder.statement(p))
        .collect::<ParseResult<Vec<_>>>()?;
    Ok(Stmt::Block { body, span })
}

/* ===================== Pair helpers ===================== */

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_let
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_return
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_try
            | Rule::kw_catch
            | Rule::kw_yield
    )
}

/// Inner pairs, keyword tokens skipped
fn children<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

/// Next pair the grammar guarantees
fn next<'i>(
    inner: &mut impl Iterator<Item = Pair<'i, Rule>>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| ParseError::Malformed(format!("Missing {}", what), Some(span)))
}

fn unexpected(kind: &str, rule: Rule, span: Span) -> ParseError {
    ParseError::Malformed(format!("Unexpected {} rule: {:?}", kind, rule), Some(span))
}

fn operator_builtin(rule: Rule) -> Option<&'static str> {
    Some(match rule {
        Rule::op_eq => "eq",
        Rule::op_ne => "ne",
        Rule::op_lt => "lt",
        Rule::op_lte => "lte",
        Rule::op_gt => "gt",
        Rule::op_gte => "gte",
        Rule::op_add => "add",
        Rule::op_sub => "sub",
        Rule::op_mul => "mul",
        Rule::op_div => "div",
        Rule::op_mod => "mod",
        Rule::op_not => "not",
        Rule::op_neg => "neg",
        _ => return None,
    })
}

fn builtin_call(name: &str, args: Vec<Expr>, span: Span) -> Expr {
    Expr::Call {
        callee: Box::new(Expr::Ident {
            name: name.to_string(),
            span,
        }),
        args,
        span,
    }
}

/* ===================== Tree builder ===================== */

struct Builder<'s> {
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
    source: &'s str,
}

impl<'s> Builder<'s> {
    fn new(source: &'s str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Self {
            line_starts,
            source,
        }
    }

    fn span(&self, pair: &Pair<Rule>) -> Span {
        let range = pair.as_span();
        let start = range.start();
        let line = self
            .line_starts
            .partition_point(|&line_start| line_start <= start)
            .saturating_sub(1);
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let col = self
            .source
            .get(line_start..start)
            .map_or(0, |prefix| prefix.chars().count());
        Span::new(start, range.end(), line, col)
    }

    fn statement(&self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::statement => self.statement(next(&mut pair.into_inner(), "statement", span)?),
            Rule::block => self.block(pair),
            Rule::declare_stmt => {
                let mut inner = children(pair);
                let name = next(&mut inner, "variable name", span)?.as_str().to_string();
                let init = inner.next().map(|p| self.expression(p)).transpose()?;
                Ok(Stmt::Declare { name, init, span })
            }
            Rule::if_stmt => {
                let mut inner = children(pair);
                let test = self.expression(next(&mut inner, "condition", span)?)?;
                let then_s = self.statement(next(&mut inner, "then branch", span)?)?;
                let else_s = match inner.next() {
                    Some(clause) => {
                        let branch = next(&mut children(clause), "else branch", span)?;
                        Some(Box::new(self.statement(branch)?))
                    }
                    None => None,
                };
                Ok(Stmt::If {
                    test,
                    then_s: Box::new(then_s),
                    else_s,
                    span,
                })
            }
            Rule::while_stmt => {
                let mut inner = children(pair);
                let test = self.expression(next(&mut inner, "condition", span)?)?;
                let body = self.statement(next(&mut inner, "loop body", span)?)?;
                Ok(Stmt::While {
                    test,
                    body: Box::new(body),
                    span,
                })
            }
            Rule::return_stmt => {
                let value = children(pair).next().map(|p| self.expression(p)).transpose()?;
                Ok(Stmt::Return { value, span })
            }
            Rule::break_stmt => Ok(Stmt::Break { span }),
            Rule::continue_stmt => Ok(Stmt::Continue { span }),
            Rule::try_stmt => {
                let mut inner = children(pair);
                let body = self.block(next(&mut inner, "try block", span)?)?;
                let catch_var = next(&mut inner, "catch variable", span)?.as_str().to_string();
                let catch_body = self.block(next(&mut inner, "catch block", span)?)?;
                Ok(Stmt::Try {
                    body: Box::new(body),
                    catch_var,
                    catch_body: Box::new(catch_body),
                    span,
                })
            }
            Rule::assign_stmt => self.assignment(pair),
            Rule::expr_stmt => {
                let expr = self.expression(next(&mut pair.into_inner(), "expression", span)?)?;
                Ok(Stmt::Expr { expr, span })
            }
            other => Err(unexpected("statement", other, span)),
        }
    }

    fn block(&self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let body = pair
            .into_inner()
            .map(|p| self.statement(p))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Stmt::Block { body, span })
    }

    /// `name(.prop | [index])* = value`
    fn assignment(&self, pair: Pair<Rule>) -> ParseResult<Stmt> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let var = next(&mut inner, "variable name", span)?.as_str().to_string();

        let mut path = Vec::new();
        for part in inner {
            match part.as_rule() {
                Rule::assign_path_segment => {
                    let segment_span = self.span(&part);
                    let segment = next(&mut part.into_inner(), "path segment", segment_span)?;
                    path.push(match segment.as_rule() {
                        Rule::identifier => MemberAccess::Prop {
                            property: segment.as_str().to_string(),
                            span: segment_span,
                        },
                        _ => MemberAccess::Index {
                            expr: self.expression(segment)?,
                            span: segment_span,
                        },
                    });
                }
                Rule::expression => {
                    let value = self.expression(part)?;
                    return Ok(Stmt::Assign {
                        var,
                        path,
                        value,
                        span,
                    });
                }
                _ => {}
            }
        }
        Err(ParseError::Malformed(
            "Missing assigned value".to_string(),
            Some(span),
        ))
    }

    /// Left-associative chain of one precedence level
    fn binary_chain(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let mut left = self.expression(next(&mut inner, "operand", span)?)?;

        while let Some(op) = inner.next() {
            let right = self.expression(next(&mut inner, "right operand", span)?)?;
            let joined = left.span().to(right.span());

            left = match op.as_rule() {
                Rule::op_and => Expr::BinaryOp {
                    op: BinaryOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                    span: joined,
                },
                Rule::op_or => Expr::BinaryOp {
                    op: BinaryOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                    span: joined,
                },
                rule => match operator_builtin(rule) {
                    Some(name) => builtin_call(name, vec![left, right], joined),
                    None => return Err(unexpected("operator", rule, span)),
                },
            };
        }
        Ok(left)
    }

    /// Primary followed by calls, `.member` and `[index]` suffixes
    fn postfix_chain(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let mut expr = self.expression(next(&mut inner, "expression", span)?)?;

        for postfix in inner {
            let postfix_span = self.span(&postfix);
            let suffix = next(&mut postfix.into_inner(), "postfix", postfix_span)?;
            let joined = expr.span().to(postfix_span);

            expr = match suffix.as_rule() {
                Rule::call_suffix => {
                    let args = match suffix.into_inner().next() {
                        Some(list) => self.list(list)?,
                        None => vec![],
                    };
                    Expr::Call {
                        callee: Box::new(expr),
                        args,
                        span: joined,
                    }
                }
                Rule::member_access => {
                    let property = next(&mut suffix.into_inner(), "property", postfix_span)?;
                    Expr::Member {
                        object: Box::new(expr),
                        property: property.as_str().to_string(),
                        span: joined,
                    }
                }
                Rule::index_access => {
                    let index = next(&mut suffix.into_inner(), "index", postfix_span)?;
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(self.expression(index)?),
                        span: joined,
                    }
                }
                other => return Err(unexpected("postfix", other, postfix_span)),
            };
        }
        Ok(expr)
    }

    fn expression(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        match pair.as_rule() {
            Rule::expression | Rule::primary | Rule::literal => {
                self.expression(next(&mut pair.into_inner(), "expression", span)?)
            }
            Rule::yield_expr => {
                let inner = children(pair)
                    .next()
                    .map(|p| self.expression(p).map(Box::new))
                    .transpose()?;
                Ok(Expr::Yield { inner, span })
            }
            Rule::logical_or_expr
            | Rule::logical_and_expr
            | Rule::equality_expr
            | Rule::comparison_expr
            | Rule::additive_expr
            | Rule::multiplicative_expr => self.binary_chain(pair),
            Rule::unary_expr => {
                let mut inner = pair.into_inner();
                let first = next(&mut inner, "operand", span)?;
                match operator_builtin(first.as_rule()) {
                    Some(name) => {
                        let operand = self.expression(next(&mut inner, "operand", span)?)?;
                        Ok(builtin_call(name, vec![operand], span))
                    }
                    None => self.expression(first),
                }
            }
            Rule::call_expr => self.postfix_chain(pair),
            Rule::identifier => Ok(Expr::Ident {
                name: pair.as_str().to_string(),
                span,
            }),
            Rule::number => {
                let text = pair.as_str();
                let v = text.parse::<f64>().map_err(|e| {
                    ParseError::Malformed(format!("Bad number '{}': {}", text, e), Some(span))
                })?;
                Ok(Expr::LitNum { v, span })
            }
            Rule::boolean => Ok(Expr::LitBool {
                v: pair.as_str() == "true",
                span,
            }),
            Rule::string => Ok(Expr::LitStr {
                v: unescape(pair, span)?,
                span,
            }),
            Rule::null_lit => Ok(Expr::LitNull { span }),
            Rule::array_lit => {
                let elements = match pair.into_inner().next() {
                    Some(list) => self.list(list)?,
                    None => vec![],
                };
                Ok(Expr::LitList { elements, span })
            }
            Rule::object_lit => self.object(pair),
            other => Err(unexpected("expression", other, span)),
        }
    }

    fn list(&self, pair: Pair<Rule>) -> ParseResult<Vec<Expr>> {
        pair.into_inner().map(|p| self.expression(p)).collect()
    }

    fn object(&self, pair: Pair<Rule>) -> ParseResult<Expr> {
        let span = self.span(&pair);
        let mut properties = Vec::new();

        // object_lit > property_list > property
        for property in pair.into_inner().flat_map(Pair::into_inner) {
            let property_span = self.span(&property);
            let mut inner = property.into_inner();

            let key_pair = next(&mut inner, "property key", property_span)?;
            let key = match key_pair.as_rule() {
                Rule::string => unescape(key_pair, property_span)?,
                _ => key_pair.as_str().to_string(),
            };
            let value = self.expression(next(&mut inner, "property value", property_span)?)?;
            properties.push((key, value));
        }
        Ok(Expr::LitObj { properties, span })
    }
}

/// Contents of a string literal with escapes resolved
fn unescape(pair: Pair<Rule>, span: Span) -> ParseResult<String> {
    let raw = next(&mut pair.into_inner(), "string contents", span)?.as_str();

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {
                return Err(ParseError::Malformed(
                    "Unterminated escape sequence".to_string(),
                    Some(span),
                ))
            }
        }
    }
    Ok(out)
}

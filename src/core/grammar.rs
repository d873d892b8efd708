//! DC-002: Declaration grammar.
//!
//! nom combinators that turn source text into a positioned syntax tree.
//! This layer only knows the shape of the text: blocks, labels, attributes
//! and expressions. Block kinds, label counts, duplicates and function
//! names are checked when the tree is lowered into a record (see `parser`).
//!
//! ```text
//! file       = { block }
//! block      = ident { string } "{" { attribute } "}"
//! attribute  = ident "=" expression
//! expression = string | number | list | object | ident [ "(" args ")" ] { "." ident }
//! ```
//!
//! Comments (`#`, `//`, `/* */`) may appear wherever whitespace can.

use super::types::Literal;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, one_of},
    combinator::{all_consuming, cut, map, opt, recognize, value},
    error::{context, VerboseError, VerboseErrorKind},
    multi::{many0, separated_list0},
    sequence::{pair, preceded, terminated, tuple},
    IResult, Parser,
};

type PResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Deepest nesting of lists, objects and call arguments inside one
/// attribute value.
pub const MAX_NESTING: usize = 64;

// ============================================================================
// Positions and syntax tree
// ============================================================================

/// Source position, recorded as the length of input not yet consumed.
///
/// Resolved to a line and column against the full source only when an
/// error is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

impl Mark {
    fn of(input: &str) -> Self {
        Mark(input.len())
    }

    /// End of the source.
    pub fn end() -> Self {
        Mark(0)
    }

    /// Byte offset into `source`.
    pub fn offset(self, source: &str) -> usize {
        source.len().saturating_sub(self.0)
    }

    /// 1-based line and column (in characters).
    pub fn line_col(self, source: &str) -> (usize, usize) {
        let before = source.get(..self.offset(source)).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
        (line, column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Located<T> {
    pub value: T,
    pub at: Mark,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxFile {
    pub blocks: Vec<SyntaxBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxBlock {
    pub kind: Located<String>,
    pub labels: Vec<Located<String>>,
    pub body: Vec<SyntaxAttribute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxAttribute {
    pub name: Located<String>,
    pub value: SyntaxExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxExpr {
    pub at: Mark,
    pub node: SyntaxNode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxNode {
    Literal(Literal),
    Call { name: String, args: Vec<SyntaxExpr> },
    Reference(Vec<String>),
    List(Vec<SyntaxExpr>),
    Object(Vec<(Located<String>, SyntaxExpr)>),
}

/// A grammar failure with its position and a readable message.
#[derive(Debug, Clone, PartialEq)]
pub struct GrammarError {
    pub at: Mark,
    pub message: String,
}

impl GrammarError {
    fn from_verbose(err: VerboseError<&str>) -> Self {
        let Some((rest, first)) = err.errors.first() else {
            return GrammarError {
                at: Mark::end(),
                message: "invalid input".to_string(),
            };
        };
        let found = match rest.chars().next() {
            Some(c) => format!("'{}'", c.escape_default()),
            None => "end of input".to_string(),
        };
        let expected = err.errors.iter().find_map(|(_, kind)| match kind {
            VerboseErrorKind::Context(ctx) => Some(*ctx),
            _ => None,
        });
        let message = match (expected, first) {
            (Some(ctx), _) => format!("expected {}, found {}", ctx, found),
            (None, VerboseErrorKind::Char(c)) => format!("expected '{}', found {}", c, found),
            (None, _) => format!("unexpected {}", found),
        };
        GrammarError {
            at: Mark::of(rest),
            message,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a whole declaration file into a syntax tree.
pub fn parse_file(source: &str) -> Result<SyntaxFile, GrammarError> {
    match all_consuming(file)(source) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(GrammarError::from_verbose(e)),
        Err(nom::Err::Incomplete(_)) => Err(GrammarError {
            at: Mark::end(),
            message: "incomplete input".to_string(),
        }),
    }
}

/// True when `s` is a valid identifier (letter or `_`, then letters,
/// digits, `_` or `-`).
pub fn is_identifier(s: &str) -> bool {
    all_consuming(identifier)(s).is_ok()
}

/// True when `source` has a comment outside string literals.
pub fn has_comments(source: &str) -> bool {
    let mut chars = source.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' | '\n' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '#' => return true,
            '/' if matches!(chars.peek(), Some('/') | Some('*')) => return true,
            _ => {}
        }
    }
    false
}

// ============================================================================
// Whitespace and comments
// ============================================================================

fn ws(input: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((
            multispace1::<&str, VerboseError<&str>>,
            line_comment,
            block_comment,
        ))),
    )(input)
}

fn line_comment(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((tag("#"), tag("//"))),
        take_while(|c| c != '\n'),
    ))(input)
}

fn block_comment(input: &str) -> PResult<'_, &str> {
    recognize(tuple((
        tag("/*"),
        cut(context("closing '*/' of comment", take_until("*/"))),
        tag("*/"),
    )))(input)
}

// ============================================================================
// Structure
// ============================================================================

fn located<'a, T, F>(mut parser: F) -> impl FnMut(&'a str) -> PResult<'a, Located<T>>
where
    F: Parser<&'a str, T, VerboseError<&'a str>>,
{
    move |input: &'a str| {
        let at = Mark::of(input);
        let (rest, value) = parser.parse(input)?;
        Ok((rest, Located { value, at }))
    }
}

fn identifier(input: &str) -> PResult<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag("-")))),
    ))(input)
}

fn file(input: &str) -> PResult<'_, SyntaxFile> {
    let (input, blocks) = terminated(many0(preceded(ws, block)), ws)(input)?;
    Ok((input, SyntaxFile { blocks }))
}

fn block(input: &str) -> PResult<'_, SyntaxBlock> {
    let (input, kind) = located(map(identifier, String::from))(input)?;
    let (input, labels) = many0(preceded(ws, located(string_literal)))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("'{' to open block body", char('{')))(input)?;
    let (input, body) = many0(preceded(ws, attribute))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("'}' to close block", char('}')))(input)?;
    Ok((input, SyntaxBlock { kind, labels, body }))
}

fn attribute(input: &str) -> PResult<'_, SyntaxAttribute> {
    let (input, name) = located(map(identifier, String::from))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("'=' after attribute name", char('=')))(input)?;
    let (input, _) = ws(input)?;
    let (input, value) = cut(|i| expression(i, 0))(input)?;
    Ok((input, SyntaxAttribute { name, value }))
}

// ============================================================================
// Expressions
// ============================================================================

/// `depth` counts the lists, objects and argument lists enclosing `input`.
fn expression(input: &str, depth: usize) -> PResult<'_, SyntaxExpr> {
    if depth >= MAX_NESTING {
        return Err(fail(input, "value nested at most 64 levels deep"));
    }
    let at = Mark::of(input);
    let (input, node) = context(
        "expression",
        alt((
            map(string_literal, |s| SyntaxNode::Literal(Literal::String(s))),
            number,
            |i| list(i, depth),
            |i| object(i, depth),
            |i| name_expression(i, depth),
        )),
    )(input)?;
    Ok((input, SyntaxExpr { at, node }))
}

/// A name followed by call arguments or a `.`-traversal; also the
/// `true`/`false`/`null` keywords.
fn name_expression(input: &str, depth: usize) -> PResult<'_, SyntaxNode> {
    let (input, head) = identifier(input)?;
    let (input, args) = opt(|i| call_args(i, depth))(input)?;
    if let Some(args) = args {
        return Ok((
            input,
            SyntaxNode::Call {
                name: head.to_string(),
                args,
            },
        ));
    }

    let (input, tail) = many0(preceded(
        char('.'),
        cut(context("name after '.'", identifier)),
    ))(input)?;
    if tail.is_empty() {
        match head {
            "true" => return Ok((input, SyntaxNode::Literal(Literal::Bool(true)))),
            "false" => return Ok((input, SyntaxNode::Literal(Literal::Bool(false)))),
            "null" => return Ok((input, SyntaxNode::Literal(Literal::Null))),
            _ => {}
        }
    }

    let mut path = vec![head.to_string()];
    path.extend(tail.into_iter().map(String::from));
    Ok((input, SyntaxNode::Reference(path)))
}

fn call_args(input: &str, depth: usize) -> PResult<'_, Vec<SyntaxExpr>> {
    let (input, _) = char('(')(input)?;
    let (input, _) = ws(input)?;
    let (input, args) =
        separated_list0(tuple((ws, char(','), ws)), |i| expression(i, depth + 1))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(','))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("')' to close argument list", char(')')))(input)?;
    Ok((input, args))
}

fn list(input: &str, depth: usize) -> PResult<'_, SyntaxNode> {
    let (input, _) = char('[')(input)?;
    let (input, _) = ws(input)?;
    let (input, items) =
        separated_list0(tuple((ws, char(','), ws)), |i| expression(i, depth + 1))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(','))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("']' to close list", char(']')))(input)?;
    Ok((input, SyntaxNode::List(items)))
}

fn object(input: &str, depth: usize) -> PResult<'_, SyntaxNode> {
    let (input, _) = char('{')(input)?;
    let (input, entries) = many0(preceded(
        ws,
        terminated(|i| object_entry(i, depth + 1), opt(preceded(ws, char(',')))),
    ))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("'}' to close object", char('}')))(input)?;
    Ok((input, SyntaxNode::Object(entries)))
}

fn object_entry(input: &str, depth: usize) -> PResult<'_, (Located<String>, SyntaxExpr)> {
    let (input, key) = located(alt((map(identifier, String::from), string_literal)))(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("'=' after object key", alt((char('='), char(':')))))(input)?;
    let (input, _) = ws(input)?;
    let (input, value) = cut(|i| expression(i, depth))(input)?;
    Ok((input, (key, value)))
}

/// Double-quoted string with `\n \r \t \" \\` escapes. Strings may not span
/// lines. `${...}` sequences are kept as written.
fn string_literal(input: &str) -> PResult<'_, String> {
    let start = input;
    let (mut rest, _) = char('"')(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None | Some('\n') => return Err(fail(start, "closing '\"' of string")),
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => {
                let escaped = match chars.next() {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some('"') => '"',
                    Some('\\') => '\\',
                    _ => return Err(fail(rest, "valid escape sequence")),
                };
                out.push(escaped);
            }
            Some(c) => out.push(c),
        }
        rest = chars.as_str();
    }
}

fn number(input: &str) -> PResult<'_, SyntaxNode> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let is_float = text.contains(|c: char| matches!(c, '.' | 'e' | 'E'));
    let literal = match text.parse::<i64>() {
        Ok(i) if !is_float => Literal::Integer(i),
        _ => match text.parse::<f64>() {
            Ok(f) if f.is_finite() => Literal::Float(f),
            _ => return Err(fail(input, "finite number")),
        },
    };
    Ok((rest, SyntaxNode::Literal(literal)))
}

fn fail<'a>(at: &'a str, expected: &'static str) -> nom::Err<VerboseError<&'a str>> {
    nom::Err::Failure(VerboseError {
        errors: vec![(at, VerboseErrorKind::Context(expected))],
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn single_value(src: &str) -> SyntaxNode {
        let text = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", src);
        let file = parse_file(&text).unwrap();
        file.blocks[0].body[0].value.node.clone()
    }

    #[test]
    fn test_dc002_fixture_shape() {
        let src = r#"
provider "aws" {
  region = "us-west-2"
}

resource "aws_datapipeline_pipeline" "test_pipeline" {
  name = uuid()
}
"#;
        let file = parse_file(src).unwrap();
        assert_eq!(file.blocks.len(), 2);
        assert_eq!(file.blocks[0].kind.value, "provider");
        assert_eq!(file.blocks[0].labels[0].value, "aws");
        assert_eq!(file.blocks[1].labels.len(), 2);
        assert_eq!(
            file.blocks[1].body[0].value.node,
            SyntaxNode::Call {
                name: "uuid".to_string(),
                args: vec![]
            }
        );
    }

    #[test]
    fn test_dc002_empty_input() {
        assert!(parse_file("").unwrap().blocks.is_empty());
        assert!(parse_file("  # only a comment\n").unwrap().blocks.is_empty());
    }

    #[test]
    fn test_dc002_comments() {
        let src = "# hash\n// slashes\n/* block\n comment */ provider \"aws\" { /* inline */ region = \"x\" # tail\n}";
        let file = parse_file(src).unwrap();
        assert_eq!(file.blocks.len(), 1);
        assert_eq!(file.blocks[0].body.len(), 1);
    }

    #[test]
    fn test_dc002_unterminated_comment() {
        let err = parse_file("/* never closed").unwrap_err();
        assert!(err.message.contains("'*/'"), "{}", err.message);
    }

    #[test]
    fn test_dc002_literals() {
        assert_eq!(single_value("42"), SyntaxNode::Literal(Literal::Integer(42)));
        assert_eq!(single_value("-7"), SyntaxNode::Literal(Literal::Integer(-7)));
        assert_eq!(single_value("2.5"), SyntaxNode::Literal(Literal::Float(2.5)));
        assert_eq!(single_value("1e3"), SyntaxNode::Literal(Literal::Float(1000.0)));
        assert_eq!(single_value("true"), SyntaxNode::Literal(Literal::Bool(true)));
        assert_eq!(single_value("null"), SyntaxNode::Literal(Literal::Null));
    }

    #[test]
    fn test_dc002_string_escapes() {
        assert_eq!(
            single_value(r#""a\"b\\c\td""#),
            SyntaxNode::Literal(Literal::String("a\"b\\c\td".to_string()))
        );
        assert_eq!(
            single_value(r#""${var.x}""#),
            SyntaxNode::Literal(Literal::String("${var.x}".to_string()))
        );
    }

    #[test]
    fn test_dc002_reference() {
        assert_eq!(
            single_value("aws_s3_bucket.logs.arn"),
            SyntaxNode::Reference(vec![
                "aws_s3_bucket".to_string(),
                "logs".to_string(),
                "arn".to_string()
            ])
        );
    }

    #[test]
    fn test_dc002_call_with_args() {
        match single_value(r#"format("%s-%s", var.a, lower("X"),)"#) {
            SyntaxNode::Call { name, args } => {
                assert_eq!(name, "format");
                assert_eq!(args.len(), 3);
                assert!(matches!(args[2].node, SyntaxNode::Call { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_dc002_list_and_object() {
        match single_value("[1, \"two\", [3],]") {
            SyntaxNode::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected list, got {:?}", other),
        }
        match single_value("{\n    Name = \"x\"\n    \"team-id\" = 3, env: \"prod\"\n  }") {
            SyntaxNode::Object(entries) => {
                let keys: Vec<_> = entries.iter().map(|(k, _)| k.value.as_str()).collect();
                assert_eq!(keys, vec!["Name", "team-id", "env"]);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_dc002_unbalanced_block() {
        let err = parse_file("provider \"aws\" {\n  region = \"x\"\n").unwrap_err();
        assert!(err.message.contains("'}' to close block"), "{}", err.message);
        assert_eq!(err.at.line_col("provider \"aws\" {\n  region = \"x\"\n").0, 3);
    }

    #[test]
    fn test_dc002_extra_closing_brace() {
        let src = "provider \"aws\" {\n  region = \"x\"\n}\n}\n";
        let err = parse_file(src).unwrap_err();
        assert_eq!(err.at.line_col(src), (4, 1));
        assert!(err.message.contains("'}'"), "{}", err.message);
    }

    #[test]
    fn test_dc002_missing_equals() {
        let src = "provider \"aws\" {\n  region \"x\"\n}\n";
        let err = parse_file(src).unwrap_err();
        assert!(err.message.contains("'='"), "{}", err.message);
        assert_eq!(err.at.line_col(src), (2, 10));
    }

    #[test]
    fn test_dc002_unterminated_string() {
        let src = "provider \"aws\" {\n  region = \"us-west-2\n}\n";
        let err = parse_file(src).unwrap_err();
        assert!(err.message.contains("closing '\"'"), "{}", err.message);
        assert_eq!(err.at.line_col(src), (2, 12));
    }

    #[test]
    fn test_dc002_missing_expression() {
        let src = "provider \"aws\" {\n  region = )\n}\n";
        let err = parse_file(src).unwrap_err();
        assert!(err.message.contains("expected expression"), "{}", err.message);
    }

    #[test]
    fn test_dc002_bad_escape() {
        let err = parse_file("provider \"aws\" {\n  region = \"a\\qb\"\n}\n").unwrap_err();
        assert!(err.message.contains("escape"), "{}", err.message);
    }

    #[test]
    fn test_dc002_is_identifier() {
        assert!(is_identifier("test_pipeline"));
        assert!(is_identifier("_x-1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier(""));
    }

    fn nested_lists(depth: usize) -> String {
        format!("{}{}", "[".repeat(depth), "]".repeat(depth))
    }

    #[test]
    fn test_dc002_nesting_limit() {
        let text = format!(
            "resource \"t_x\" \"a\" {{\n  v = {}\n}}\n",
            nested_lists(10_000)
        );
        let err = parse_file(&text).unwrap_err();
        assert!(err.message.contains("64 levels"), "{}", err.message);

        let at_limit = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", nested_lists(MAX_NESTING));
        assert!(parse_file(&at_limit).is_ok());
        let over = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", nested_lists(MAX_NESTING + 1));
        assert!(parse_file(&over).is_err());
    }

    #[test]
    fn test_dc002_nesting_limit_mixed() {
        let deep_call = format!("{}1{}", "lower(".repeat(200), ")".repeat(200));
        let text = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", deep_call);
        assert!(parse_file(&text).is_err());

        let deep_object = format!("{}1{}", "{ k = ".repeat(200), " }".repeat(200));
        let text = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", deep_object);
        assert!(parse_file(&text).is_err());

        let mixed = format!("{}1{}", "[{ k = lower(".repeat(21), ") }]".repeat(21));
        let text = format!("resource \"t_x\" \"a\" {{\n  v = {}\n}}\n", mixed);
        assert!(parse_file(&text).is_ok());
    }

    #[test]
    fn test_dc002_has_comments() {
        assert!(has_comments("# top\nprovider \"aws\" {}"));
        assert!(has_comments("a = 1 // tail"));
        assert!(has_comments("/* x */"));
        assert!(!has_comments("url = \"http://x/#frag\""));
        assert!(!has_comments("s = \"a\\\"#\"\n"));
        assert!(!has_comments("a = 1 / 2"));
    }

    #[test]
    fn test_dc002_line_col_unicode() {
        let src = "é\nab";
        assert_eq!(Mark(1).line_col(src), (2, 2));
        assert_eq!(Mark(src.len()).line_col(src), (1, 1));
    }
}

//! Composable, recursively renderable SQL templates.
//!
//! An [`Expr`] is a template plus an ordered argument map. Rendering walks
//! the template left to right, skipping string-literal spans, and resolves
//! three token kinds:
//!
//! - `[name]` binds the argument as a query parameter
//! - `{name}` hard-escapes the argument as an identifier
//! - `{{name}}` soft-escapes it (backs off for compound/expression input)
//!
//! Unnamed tokens (`[]`, `{}`, `{{}}`) consume arguments positionally.
//! Nested expressions render through the same [`RenderContext`], so merged
//! parameter maps never collide; the context is explicit state threaded
//! through the recursion, never ambient.

use crate::error::{StoreError, StoreResult};
use crate::platform::{self, Platform};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// One argument of an expression template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprArg {
    /// A scalar, bound as a parameter (or escaped, in identifier position).
    Value(Value),
    /// A nested expression, rendered recursively.
    Expr(Box<Expr>),
    /// A raw SQL fragment, spliced verbatim. Injection-unsafe by design;
    /// callers own the content.
    Raw(String),
}

impl From<Value> for ExprArg {
    fn from(v: Value) -> Self {
        ExprArg::Value(v)
    }
}

impl From<Expr> for ExprArg {
    fn from(e: Expr) -> Self {
        ExprArg::Expr(Box::new(e))
    }
}

/// A renderable SQL template with arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    template: String,
    args: Vec<(Option<String>, ExprArg)>,
    wrap_parens: bool,
}

/// Explicit render state: the shared parameter counter and the accumulated
/// parameter map. One context lives for exactly one top-level render; nested
/// renders advance the same counter.
#[derive(Debug, Default)]
pub struct RenderContext {
    counter: usize,
    params: Vec<(String, Value)>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next sequential parameter name: `:a` .. `:z`, `:aa`, `:ab`, ...
    fn next_name(&mut self) -> String {
        let name = format!(":{}", alpha_name(self.counter));
        self.counter += 1;
        name
    }

    pub(crate) fn bind(&mut self, platform: Platform, value: Value) -> StoreResult<String> {
        let value = prepare_bind_value(platform, value)?;
        let name = self.next_name();
        self.params.push((name.clone(), value));
        Ok(name)
    }

    /// Parameters accumulated so far, in bind order.
    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    pub fn into_params(self) -> Vec<(String, Value)> {
        self.params
    }
}

/// Spreadsheet-style base-26 name: 0 -> a, 25 -> z, 26 -> aa.
fn alpha_name(mut n: usize) -> String {
    let mut bytes = Vec::new();
    loop {
        bytes.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    bytes.reverse();
    String::from_utf8(bytes).expect("ascii")
}

/// Binary values must survive text-only transports: on platforms that cannot
/// bind binary reliably they are swapped for the private text encoding.
/// A string that already carries the encoding marker is a double-encode and
/// therefore fatal.
fn prepare_bind_value(platform: Platform, value: Value) -> StoreResult<Value> {
    match value {
        Value::Bytes(bytes) if !platform.binds_binary() => {
            Ok(Value::Str(platform::encode_binary(&bytes)?))
        }
        Value::Str(s) if platform::is_encoded_binary(&s) => Err(StoreError::Encoding(
            "bound string already carries the binary-encoding marker".into(),
        )),
        other => Ok(other),
    }
}

/// A rendered statement: SQL text plus its ordered parameter map.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<(String, Value)>,
}

impl Statement {
    /// Rewrite `:name` placeholders to positional `?`, preserving a 1:1
    /// index-to-name mapping, for platforms without named-parameter support.
    /// A name appearing twice in the SQL yields two positional entries bound
    /// to the same value.
    pub fn positional(&self) -> (String, Vec<(String, Value)>) {
        let mut sql = String::with_capacity(self.sql.len());
        let mut ordered = Vec::new();
        let chars: Vec<char> = self.sql.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                let end = skip_literal(&chars, i);
                for &lc in &chars[i..end] {
                    sql.push(lc);
                }
                i = end;
                continue;
            }
            if c == ':' {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                    j += 1;
                }
                if j > i + 1 {
                    let name: String = chars[i..j].iter().collect();
                    if let Some((_, value)) = self.params.iter().find(|(n, _)| *n == name) {
                        sql.push('?');
                        ordered.push((name, value.clone()));
                        i = j;
                        continue;
                    }
                }
            }
            sql.push(c);
            i += 1;
        }
        (sql, ordered)
    }

    /// Human-readable parameter map for error context.
    pub fn describe_params(&self) -> String {
        let mut out = String::from("{");
        for (i, (name, value)) in self.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{name}: {value}");
        }
        out.push('}');
        out
    }
}

/// Advance past a single-quoted literal span starting at `start`, honoring
/// doubled-quote escapes. Returns the index just past the closing quote.
fn skip_literal(chars: &[char], start: usize) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == '\'' {
            if i + 1 < chars.len() && chars[i + 1] == '\'' {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Bind,
    HardEscape,
    SoftEscape,
}

impl Expr {
    /// Create an expression from a template.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: Vec::new(),
            wrap_parens: false,
        }
    }

    /// Convenience: an expression holding a single bound value (`[]`).
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::new("[]").push(value.into())
    }

    /// Add a named argument.
    pub fn arg(mut self, name: impl Into<String>, arg: impl Into<ExprArg>) -> Self {
        self.args.push((Some(name.into()), arg.into()));
        self
    }

    /// Add a positional argument, consumed by the next unnamed token.
    pub fn push(mut self, arg: impl Into<ExprArg>) -> Self {
        self.args.push((None, arg.into()));
        self
    }

    /// Request parentheses when this expression is nested in a parent.
    pub fn parens(mut self) -> Self {
        self.wrap_parens = true;
        self
    }

    pub fn wants_parens(&self) -> bool {
        self.wrap_parens
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Render to a complete statement with a fresh context. Rendering is
    /// referentially transparent: the same node renders identically on every
    /// call, with any context.
    pub fn render(&self, platform: Platform) -> StoreResult<Statement> {
        let mut ctx = RenderContext::new();
        let sql = self.render_into(platform, &mut ctx)?;
        Ok(Statement {
            sql,
            params: ctx.into_params(),
        })
    }

    /// Render into a shared context, advancing its parameter counter.
    pub fn render_into(&self, platform: Platform, ctx: &mut RenderContext) -> StoreResult<String> {
        let chars: Vec<char> = self.template.chars().collect();
        let mut out = String::with_capacity(self.template.len());
        let mut positional = 0usize;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            // Tokens inside literal text never match.
            if c == '\'' {
                let end = skip_literal(&chars, i);
                for &lc in &chars[i..end] {
                    out.push(lc);
                }
                i = end;
                continue;
            }

            let token = match c {
                '[' => scan_token(&chars, i, "[", "]").map(|(n, e)| (TokenKind::Bind, n, e)),
                '{' if chars.get(i + 1) == Some(&'{') => {
                    scan_token(&chars, i, "{{", "}}").map(|(n, e)| (TokenKind::SoftEscape, n, e))
                }
                '{' => scan_token(&chars, i, "{", "}").map(|(n, e)| (TokenKind::HardEscape, n, e)),
                _ => None,
            };

            let Some((kind, name, end)) = token else {
                out.push(c);
                i += 1;
                continue;
            };

            let arg = self.resolve(&name, &mut positional)?;
            let fragment = self.render_arg(kind, arg, platform, ctx)?;
            out.push_str(&fragment);
            i = end;
        }

        Ok(out)
    }

    fn resolve(&self, name: &str, positional: &mut usize) -> StoreResult<&ExprArg> {
        if name.is_empty() {
            let mut seen = 0usize;
            for (key, arg) in &self.args {
                if key.is_none() {
                    if seen == *positional {
                        *positional += 1;
                        return Ok(arg);
                    }
                    seen += 1;
                }
            }
            return Err(StoreError::unknown_tag(
                &self.template,
                format!("positional #{positional}"),
            ));
        }
        self.args
            .iter()
            .find(|(key, _)| key.as_deref() == Some(name))
            .map(|(_, arg)| arg)
            .ok_or_else(|| StoreError::unknown_tag(&self.template, name))
    }

    fn render_arg(
        &self,
        kind: TokenKind,
        arg: &ExprArg,
        platform: Platform,
        ctx: &mut RenderContext,
    ) -> StoreResult<String> {
        match (kind, arg) {
            (TokenKind::Bind, ExprArg::Value(v)) => ctx.bind(platform, v.clone()),
            (_, ExprArg::Expr(sub)) => {
                let inner = sub.render_into(platform, ctx)?;
                if sub.wrap_parens {
                    Ok(format!("({inner})"))
                } else {
                    Ok(inner)
                }
            }
            (_, ExprArg::Raw(raw)) => Ok(raw.clone()),
            (TokenKind::HardEscape, ExprArg::Value(Value::Str(s))) => {
                Ok(platform.escape_identifier(s))
            }
            (TokenKind::SoftEscape, ExprArg::Value(Value::Str(s))) => Ok(platform.escape_soft(s)),
            (_, ExprArg::Value(v)) => Err(StoreError::template(
                &self.template,
                format!("identifier token cannot take a {} value", v.type_name()),
            )),
        }
    }
}

/// Scan a token starting at `start`. The token name is `\w*` between the
/// delimiters; anything else means the delimiter was literal text.
fn scan_token(chars: &[char], start: usize, open: &str, close: &str) -> Option<(String, usize)> {
    let mut i = start + open.len();
    let mut name = String::new();
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
        name.push(chars[i]);
        i += 1;
    }
    let close_chars: Vec<char> = close.chars().collect();
    if chars.len() >= i + close_chars.len() && chars[i..i + close_chars.len()] == close_chars[..] {
        Some((name, i + close_chars.len()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_named_args_sequentially() {
        let e = Expr::new("{name} > [limit]")
            .arg("name", Value::Str("age".into()))
            .arg("limit", Value::Int(30));
        let stmt = e.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, "\"age\" > :a");
        assert_eq!(stmt.params, vec![(":a".into(), Value::Int(30))]);
    }

    #[test]
    fn positional_tokens_consume_in_order() {
        let e = Expr::new("[] + [] + []")
            .push(Value::Int(1))
            .push(Value::Int(2))
            .push(Value::Int(3));
        let stmt = e.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, ":a + :b + :c");
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn nested_expressions_share_the_counter() {
        let inner = Expr::new("[] + []")
            .push(Value::Int(2))
            .push(Value::Int(3))
            .parens();
        let outer = Expr::new("[] * [sub]")
            .push(Value::Int(10))
            .arg("sub", inner);
        let stmt = outer.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, ":a * (:b + :c)");
        let names: Vec<&str> = stmt.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![":a", ":b", ":c"]);
    }

    #[test]
    fn rendering_is_repeatable() {
        let e = Expr::new("{{col}} = [v]")
            .arg("col", Value::Str("users.name".into()))
            .arg("v", Value::Str("bob".into()));
        let first = e.render(Platform::Generic).unwrap();
        let second = e.render(Platform::Generic).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn tokens_inside_literals_are_ignored() {
        let e = Expr::new("select '[not_a_tag]' || [v]").arg("v", Value::Str("x".into()));
        let stmt = e.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, "select '[not_a_tag]' || :a");
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn escaped_quote_inside_literal_does_not_end_the_span() {
        let e = Expr::new("'it''s [not] a tag' = [v]").arg("v", Value::Int(1));
        let stmt = e.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, "'it''s [not] a tag' = :a");
    }

    #[test]
    fn soft_escape_token_backs_off() {
        let e = Expr::new("select {{f}} from t").arg("f", Value::Str("count(*)".into()));
        let stmt = e.render(Platform::Generic).unwrap();
        assert_eq!(stmt.sql, "select count(*) from t");
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let e = Expr::new("{missing}");
        let err = e.render(Platform::Generic).unwrap_err();
        assert!(matches!(err, StoreError::UnknownTag { .. }));
    }

    #[test]
    fn identifier_token_rejects_non_string_scalar() {
        let e = Expr::new("{col}").arg("col", Value::Int(5));
        assert!(matches!(
            e.render(Platform::Generic).unwrap_err(),
            StoreError::Template { .. }
        ));
    }

    #[test]
    fn alpha_names_roll_over_after_z() {
        assert_eq!(alpha_name(0), "a");
        assert_eq!(alpha_name(25), "z");
        assert_eq!(alpha_name(26), "aa");
        assert_eq!(alpha_name(27), "ab");
        assert_eq!(alpha_name(26 * 27), "aaa");
    }

    #[test]
    fn positional_rewrite_preserves_order_and_repeats() {
        let stmt = Statement {
            sql: "a = :a and (b = :b or a = :a)".into(),
            params: vec![
                (":a".into(), Value::Int(1)),
                (":b".into(), Value::Int(2)),
            ],
        };
        let (sql, ordered) = stmt.positional();
        assert_eq!(sql, "a = ? and (b = ? or a = ?)");
        let names: Vec<&str> = ordered.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![":a", ":b", ":a"]);
    }

    #[test]
    fn positional_rewrite_skips_literals() {
        let stmt = Statement {
            sql: "x = ':a' and y = :a".into(),
            params: vec![(":a".into(), Value::Int(7))],
        };
        let (sql, ordered) = stmt.positional();
        assert_eq!(sql, "x = ':a' and y = ?");
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn binary_bind_is_encoded_on_text_only_platforms() {
        let e = Expr::new("[v]").arg("v", Value::Bytes(vec![0, 255]));
        let stmt = e.render(Platform::Sqlite).unwrap();
        match &stmt.params[0].1 {
            Value::Str(s) => assert!(crate::platform::is_encoded_binary(s)),
            other => panic!("expected encoded string, got {other:?}"),
        }
        // Generic platform binds the raw bytes.
        let stmt = e.render(Platform::Generic).unwrap();
        assert!(matches!(stmt.params[0].1, Value::Bytes(_)));
    }
}

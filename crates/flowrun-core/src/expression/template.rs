//! Parameter template parsing.
//!
//! A parameter string beginning with `=` is an expression template. Inside
//! it, `{{ ... }}` segments hold JEXL source in which `$name` roots address
//! the run data (`$json`, `$node["Fetch"]`, `$parameter.limit`, ...).
//! [`rewrite`] strips the `$` sigils and records which roots, and which
//! literal keys of them, a segment touches so the evaluation context can be
//! built lazily.

use std::collections::{BTreeMap, BTreeSet};

use super::error::{ExpressionError, ExpressionErrorKind};

/// Prefix marking a parameter value as an expression.
pub const EXPRESSION_SENTINEL: char = '=';

/// Whether a raw parameter string is an expression.
pub fn is_expression(raw: &str) -> bool {
    raw.starts_with(EXPRESSION_SENTINEL)
}

/// A piece of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Expression(&'a str),
}

/// Split a template (without the leading `=`) into literal and `{{ }}` parts.
pub fn split_template(template: &str) -> Result<Vec<Segment<'_>>, ExpressionError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Literal(&rest[..open]));
        }
        let body = &rest[open + 2..];
        let close = body.find("}}").ok_or_else(|| {
            ExpressionError::new(
                ExpressionErrorKind::InvalidSyntax,
                "Unterminated expression: missing closing '}}'",
            )
        })?;
        segments.push(Segment::Expression(body[..close].trim()));
        rest = &body[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    Ok(segments)
}

/// Which parts of a root a segment reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootAccess {
    /// The root is used as a whole, or with a computed key.
    Whole,
    /// Only these literal keys are read.
    Keys(BTreeSet<String>),
}

impl RootAccess {
    fn record(&mut self, key: Option<String>) {
        match (self, key) {
            (Self::Keys(keys), Some(key)) => {
                keys.insert(key);
            }
            (this, None) => *this = Self::Whole,
            (Self::Whole, Some(_)) => {}
        }
    }

    /// Whether `key` must be present in the built root.
    pub fn wants(&self, key: &str) -> bool {
        match self {
            Self::Whole => true,
            Self::Keys(keys) => keys.contains(key),
        }
    }
}

/// A segment with `$` sigils removed plus the roots it references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub source: String,
    pub roots: BTreeMap<String, RootAccess>,
}

/// Strip `$` from root identifiers outside string literals and collect the
/// roots (and literal member keys) that the expression touches.
pub fn rewrite(expression: &str) -> Rewritten {
    let chars: Vec<char> = expression.chars().collect();
    let mut source = String::with_capacity(expression.len());
    let mut roots: BTreeMap<String, RootAccess> = BTreeMap::new();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            source.push(c);
            if c == '\\' && i + 1 < chars.len() {
                source.push(chars[i + 1]);
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                source.push(c);
                i += 1;
            }
            '$' if chars.get(i + 1).is_some_and(|n| is_ident_start(*n))
                && !(i > 0 && is_ident_char(chars[i - 1])) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let key = member_key(&chars, end);
                roots
                    .entry(name.clone())
                    .or_insert_with(|| RootAccess::Keys(BTreeSet::new()))
                    .record(key);
                source.push_str(&name);
                i = end;
            }
            _ => {
                source.push(c);
                i += 1;
            }
        }
    }

    Rewritten { source, roots }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// The literal key accessed right after a root, for `.key` or `["key"]`.
fn member_key(chars: &[char], mut i: usize) -> Option<String> {
    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    match chars.get(i)? {
        '.' => {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && is_ident_char(chars[end]) {
                end += 1;
            }
            (end > start).then(|| chars[start..end].iter().collect())
        }
        '[' => {
            let mut j = i + 1;
            while chars.get(j).is_some_and(|c| c.is_whitespace()) {
                j += 1;
            }
            let q = *chars.get(j)?;
            if q != '"' && q != '\'' {
                return None;
            }
            let mut key = String::new();
            let mut k = j + 1;
            loop {
                match chars.get(k)? {
                    '\\' => {
                        key.push(*chars.get(k + 1)?);
                        k += 2;
                    }
                    c if *c == q => break,
                    c => {
                        key.push(*c);
                        k += 1;
                    }
                }
            }
            k += 1;
            while chars.get(k).is_some_and(|c| c.is_whitespace()) {
                k += 1;
            }
            (chars.get(k) == Some(&']')).then_some(key)
        }
        _ => None,
    }
}

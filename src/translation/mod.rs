use std::borrow::Cow;
use std::collections::HashMap;

mod parsers;
mod scanner;

use parsers::{is_block_comment_end, is_block_comment_start, is_doubled, is_line_comment_start};
use scanner::{State, scan_digits, scan_ident};

use crate::error::DbError;
use crate::types::{Params, Value};

/// Placeholder syntax a backend driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamStyle {
    /// `?`
    Qmark,
    /// `%s`
    Format,
    /// `%(name)s`
    Pyformat,
    /// `:1`
    Numeric,
    /// `:name`
    Named,
    /// `$1`
    Dollar,
}

impl ParamStyle {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ParamStyle::Qmark => "qmark",
            ParamStyle::Format => "format",
            ParamStyle::Pyformat => "pyformat",
            ParamStyle::Numeric => "numeric",
            ParamStyle::Named => "named",
            ParamStyle::Dollar => "dollar",
        }
    }

    /// Whether the target style is rendered through `%` formatting, so literal `%` must be doubled.
    #[must_use]
    pub fn escapes_percent(self) -> bool {
        matches!(self, ParamStyle::Format | ParamStyle::Pyformat)
    }

    /// Whether the target style binds values by name.
    #[must_use]
    pub fn is_named(self) -> bool {
        matches!(self, ParamStyle::Named | ParamStyle::Pyformat)
    }
}

impl std::str::FromStr for ParamStyle {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qmark" => Ok(ParamStyle::Qmark),
            "format" => Ok(ParamStyle::Format),
            "pyformat" => Ok(ParamStyle::Pyformat),
            "numeric" => Ok(ParamStyle::Numeric),
            "named" => Ok(ParamStyle::Named),
            "dollar" => Ok(ParamStyle::Dollar),
            other => Err(DbError::programming(format!(
                "Unrecognized parameter style: {other}"
            ))),
        }
    }
}

/// SQL and parameters rewritten for one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundQuery<'a> {
    pub sql: Cow<'a, str>,
    /// `None` when no parameters were supplied; the SQL is then untouched.
    pub params: Option<Params>,
}

enum Key<'s> {
    Name(&'s str),
    Index(&'s str),
}

struct Collector<'p> {
    params: &'p Params,
    target: ParamStyle,
    ordered: Vec<Value>,
    numbered: Vec<String>,
    named: HashMap<String, Value>,
}

impl<'p> Collector<'p> {
    fn new(params: &'p Params, target: ParamStyle) -> Self {
        Self {
            params,
            target,
            ordered: Vec::new(),
            numbered: Vec::new(),
            named: HashMap::new(),
        }
    }

    fn lookup(&self, key: &Key<'_>) -> Result<(String, Value), DbError> {
        match (key, self.params) {
            (Key::Name(name), Params::Named(map)) => map
                .get(*name)
                .map(|v| ((*name).to_string(), v.clone()))
                .ok_or_else(|| {
                    DbError::programming(format!("Named parameter {name:?} is not defined"))
                }),
            (Key::Index(digits), Params::Positional(values)) => {
                let pos: usize = digits.parse().unwrap_or(0);
                if pos == 0 || pos > values.len() {
                    return Err(DbError::programming(format!(
                        "Positional parameter :{digits} is out of range; {} value(s) supplied",
                        values.len()
                    )));
                }
                Ok((format!("_{pos}"), values[pos - 1].clone()))
            }
            _ => Err(DbError::programming("Parameter kind does not match placeholder")),
        }
    }

    fn render(&mut self, key: &Key<'_>, out: &mut String) -> Result<(), DbError> {
        let (name, value) = self.lookup(key)?;
        match self.target {
            ParamStyle::Qmark => {
                out.push('?');
                self.ordered.push(value);
            }
            ParamStyle::Format => {
                out.push_str("%s");
                self.ordered.push(value);
            }
            ParamStyle::Pyformat => {
                out.push_str("%(");
                out.push_str(&name);
                out.push_str(")s");
                self.named.insert(name, value);
            }
            ParamStyle::Named => {
                out.push(':');
                out.push_str(&name);
                self.named.insert(name, value);
            }
            ParamStyle::Numeric | ParamStyle::Dollar => {
                let pos = match self.numbered.iter().position(|n| *n == name) {
                    Some(pos) => pos,
                    None => {
                        self.numbered.push(name);
                        self.ordered.push(value);
                        self.numbered.len() - 1
                    }
                };
                out.push(if self.target == ParamStyle::Numeric { ':' } else { '$' });
                out.push_str(&(pos + 1).to_string());
            }
        }
        Ok(())
    }

    fn finish(self) -> Params {
        if self.target.is_named() {
            Params::Named(self.named)
        } else {
            Params::Positional(self.ordered)
        }
    }
}

/// Rewrite `:name` / `:1` placeholders into the backend's `target` style.
///
/// A mapping binds `:name` placeholders; a sequence binds `:1`, `:2`, ... (1-based).
/// `::` stands for a literal colon. Quoted strings, backtick identifiers and comments
/// are copied through untouched. With no parameters (or an empty set) the SQL is
/// returned as-is, borrowed:
/// ```rust
/// use singlestoredb::prelude::*;
///
/// let params = Params::named([("id", Value::Int(7))]);
/// let bound = bind_params("select * from t where id = :id", Some(&params), ParamStyle::Qmark)?;
/// assert_eq!(bound.sql, "select * from t where id = ?");
/// assert_eq!(bound.params, Some(Params::Positional(vec![Value::Int(7)])));
/// # Ok::<(), DbError>(())
/// ```
///
/// # Errors
///
/// Returns `DbError::Programming` when a placeholder names a missing key or an
/// out-of-range position.
pub fn bind_params<'a>(
    sql: &'a str,
    params: Option<&Params>,
    target: ParamStyle,
) -> Result<BoundQuery<'a>, DbError> {
    let Some(params) = params.filter(|p| !p.is_empty()) else {
        return Ok(BoundQuery {
            sql: Cow::Borrowed(sql),
            params: None,
        });
    };

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut collector = Collector::new(params, target);
    let mut state = State::Normal;
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::Backticked,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment;
                    idx += 1;
                }
                b':' if bytes.get(idx + 1) == Some(&b':') => {
                    out.push_str(&sql[copied..=idx]);
                    idx += 2;
                    copied = idx;
                    continue;
                }
                b':' => {
                    let scanned = if params.is_named() {
                        scan_ident(bytes, idx + 1).map(|(end, name)| (end, Key::Name(name)))
                    } else {
                        scan_digits(bytes, idx + 1).map(|(end, digits)| (end, Key::Index(digits)))
                    };
                    if let Some((end, key)) = scanned {
                        out.push_str(&sql[copied..idx]);
                        collector.render(&key, &mut out)?;
                        idx = end;
                        copied = idx;
                        continue;
                    }
                }
                _ => {}
            },
            State::SingleQuoted | State::DoubleQuoted => {
                let quote = if matches!(state, State::SingleQuoted) {
                    b'\''
                } else {
                    b'"'
                };
                if b == b'\\' {
                    if bytes.get(idx + 1) != Some(&b'%') {
                        idx += 1; // backslash escape
                    }
                } else if b == quote {
                    if is_doubled(bytes, idx, quote) {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Backticked => {
                if b == b'`' {
                    if is_doubled(bytes, idx, b'`') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment => {
                if is_block_comment_end(bytes, idx) {
                    state = State::Normal;
                    idx += 1;
                }
            }
        }

        if b == b'%' && target.escapes_percent() {
            out.push_str(&sql[copied..=idx]);
            out.push('%');
            copied = idx + 1;
        }

        idx += 1;
    }

    if copied < sql.len() {
        out.push_str(&sql[copied..]);
    }

    Ok(BoundQuery {
        sql: Cow::Owned(out),
        params: Some(collector.finish()),
    })
}

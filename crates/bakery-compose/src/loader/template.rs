//! Variable interpolation in Compose values, tokenized with `nom`.
//!
//! Supported forms: `$NAME`, `${NAME}`, `${NAME:-default}`, `${NAME-default}`,
//! `${NAME:?error}`, `${NAME?error}`, `${NAME:+alternate}`, `${NAME+alternate}`
//! and `$$` for a literal dollar sign. Defaults and alternates may nest.

use bakery_common::error::{BakeError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::char,
    combinator::{opt, recognize, value},
    sequence::preceded,
};
use serde_yaml::Value;
use thiserror::Error;

use crate::env::Environment;

/// Why a template could not be expanded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `$` is not followed by a valid expression.
    #[error("invalid template")]
    Syntax,
    /// A `?`-modified variable has no value.
    #[error("required variable {name} is missing a value: {message}")]
    Required {
        /// Variable name.
        name: String,
        /// Message given after the `?` operator.
        message: String,
    },
}

/// Operator between a variable name and its argument in `${NAME<op>arg}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `:-` default when unset or empty.
    DefaultUnlessNonEmpty,
    /// `-` default when unset.
    DefaultUnlessSet,
    /// `:?` error when unset or empty.
    RequireNonEmpty,
    /// `?` error when unset.
    RequireSet,
    /// `:+` alternate when set and non-empty.
    AlternateIfNonEmpty,
    /// `+` alternate when set.
    AlternateIfSet,
}

/// A piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied as-is.
    Literal(String),
    /// A variable reference, optionally with an operator and its argument.
    Variable {
        /// Variable name.
        name: String,
        /// Operator and unexpanded argument.
        modifier: Option<(Operator, String)>,
    },
}

const fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

const fn is_name_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn name(input: &str) -> IResult<&str, &str> {
    recognize((take_while1(is_name_start), take_while(is_name_continue))).parse(input)
}

fn operator(input: &str) -> IResult<&str, Operator> {
    alt((
        value(Operator::DefaultUnlessNonEmpty, tag(":-")),
        value(Operator::RequireNonEmpty, tag(":?")),
        value(Operator::AlternateIfNonEmpty, tag(":+")),
        value(Operator::DefaultUnlessSet, tag("-")),
        value(Operator::RequireSet, tag("?")),
        value(Operator::AlternateIfSet, tag("+")),
    ))
    .parse(input)
}

/// Consumes text up to the `}` closing the current expression, honoring nested braces.
fn balanced(input: &str) -> IResult<&str, &str> {
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' if depth == 0 => return Ok((&input[idx..], &input[..idx])),
            '}' => depth -= 1,
            _ => {}
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

fn literal(input: &str) -> IResult<&str, Segment> {
    take_while1(|c: char| c != '$')
        .map(|s: &str| Segment::Literal(s.to_owned()))
        .parse(input)
}

fn escaped_dollar(input: &str) -> IResult<&str, Segment> {
    tag("$$")
        .map(|_| Segment::Literal("$".to_owned()))
        .parse(input)
}

fn unbraced(input: &str) -> IResult<&str, Segment> {
    preceded(char('$'), name)
        .map(|n: &str| Segment::Variable {
            name: n.to_owned(),
            modifier: None,
        })
        .parse(input)
}

fn braced(input: &str) -> IResult<&str, Segment> {
    let (input, _) = tag("${").parse(input)?;
    let (input, var) = name(input)?;
    let (input, closed) = opt(char('}')).parse(input)?;
    if closed.is_some() {
        return Ok((
            input,
            Segment::Variable {
                name: var.to_owned(),
                modifier: None,
            },
        ));
    }
    let (input, op) = operator(input)?;
    let (input, arg) = balanced(input)?;
    let (input, _) = char('}').parse(input)?;
    Ok((
        input,
        Segment::Variable {
            name: var.to_owned(),
            modifier: Some((op, arg.to_owned())),
        },
    ))
}

/// Splits a template into literal text and variable references.
///
/// # Errors
///
/// Returns [`TemplateError::Syntax`] if a `$` does not start a valid expression.
pub fn tokenize(input: &str) -> std::result::Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut remaining = input;
    while !remaining.is_empty() {
        let (rest, segment) = alt((literal, escaped_dollar, braced, unbraced))
            .parse(remaining)
            .map_err(|_| TemplateError::Syntax)?;
        segments.push(segment);
        remaining = rest;
    }
    Ok(segments)
}

/// Expands every variable reference in `input` against `env`.
///
/// Unset variables without an operator expand to an empty string.
///
/// # Errors
///
/// Returns an error on malformed templates or missing required variables.
pub fn interpolate(input: &str, env: &Environment) -> std::result::Result<String, TemplateError> {
    if !input.contains('$') {
        return Ok(input.to_owned());
    }
    let mut out = String::with_capacity(input.len());
    for segment in tokenize(input)? {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Variable {
                name,
                modifier: None,
            } => match env.get(&name) {
                Some(v) => out.push_str(v),
                None => {
                    tracing::warn!(variable = %name, "variable is not set, defaulting to a blank string");
                }
            },
            Segment::Variable {
                name,
                modifier: Some((op, arg)),
            } => out.push_str(&apply(&name, op, &arg, env)?),
        }
    }
    Ok(out)
}

fn apply(
    name: &str,
    op: Operator,
    arg: &str,
    env: &Environment,
) -> std::result::Result<String, TemplateError> {
    let current = env.get(name);
    let non_empty = current.filter(|v| !v.is_empty());
    match op {
        Operator::DefaultUnlessNonEmpty => match non_empty {
            Some(v) => Ok(v.clone()),
            None => interpolate(arg, env),
        },
        Operator::DefaultUnlessSet => match current {
            Some(v) => Ok(v.clone()),
            None => interpolate(arg, env),
        },
        Operator::RequireNonEmpty | Operator::RequireSet => {
            let found = if op == Operator::RequireNonEmpty {
                non_empty
            } else {
                current
            };
            match found {
                Some(v) => Ok(v.clone()),
                None => Err(TemplateError::Required {
                    name: name.to_owned(),
                    message: interpolate(arg, env)?,
                }),
            }
        }
        Operator::AlternateIfNonEmpty => match non_empty {
            Some(_) => interpolate(arg, env),
            None => Ok(String::new()),
        },
        Operator::AlternateIfSet => match current {
            Some(_) => interpolate(arg, env),
            None => Ok(String::new()),
        },
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => "?".to_owned(),
    }
}

/// Interpolates every string scalar of a parsed document in place.
///
/// Mapping keys are left untouched.
///
/// # Errors
///
/// Returns [`BakeError::Interpolation`] naming the dotted path of the offending value.
pub fn interpolate_document(doc: &mut Value, env: &Environment) -> Result<()> {
    let mut path = Vec::new();
    walk(doc, env, &mut path)
}

fn walk(node: &mut Value, env: &Environment, path: &mut Vec<String>) -> Result<()> {
    match node {
        Value::String(s) => {
            let expanded = interpolate(s, env).map_err(|e| {
                let at = path.join(".");
                let message = match e {
                    TemplateError::Syntax => format!(
                        "invalid interpolation format for {at}: \"{s}\"; you may need to escape any $ with another $"
                    ),
                    TemplateError::Required { .. } => format!("error while interpolating {at}: {e}"),
                };
                BakeError::Interpolation { message }
            })?;
            *s = expanded;
        }
        Value::Sequence(items) => {
            for (idx, item) in items.iter_mut().enumerate() {
                path.push(idx.to_string());
                walk(item, env, path)?;
                let _ = path.pop();
            }
        }
        Value::Mapping(map) => {
            for (key, item) in map.iter_mut() {
                path.push(key_label(key));
                walk(item, env, path)?;
                let _ = path.pop();
            }
        }
        Value::Tagged(tagged) => walk(&mut tagged.value, env, path)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn tokenize_mixed_template() {
        let segments = tokenize("a-$FOO-${BAR:-x}-$$").expect("should tokenize");
        assert_eq!(
            segments,
            vec![
                Segment::Literal("a-".into()),
                Segment::Variable {
                    name: "FOO".into(),
                    modifier: None,
                },
                Segment::Literal("-".into()),
                Segment::Variable {
                    name: "BAR".into(),
                    modifier: Some((Operator::DefaultUnlessNonEmpty, "x".into())),
                },
                Segment::Literal("-".into()),
                Segment::Literal("$".into()),
            ]
        );
    }

    #[test]
    fn tokenize_rejects_bare_dollar() {
        assert_eq!(tokenize("cost $5"), Err(TemplateError::Syntax));
        assert_eq!(tokenize("trailing $"), Err(TemplateError::Syntax));
        assert_eq!(tokenize("${UNCLOSED"), Err(TemplateError::Syntax));
        assert_eq!(tokenize("${A:-open"), Err(TemplateError::Syntax));
    }

    #[test]
    fn interpolate_plain_and_braced() {
        let e = env(&[("NAME", "web"), ("TAG", "1.0")]);
        assert_eq!(
            interpolate("img/$NAME:${TAG}", &e).expect("interpolate"),
            "img/web:1.0"
        );
    }

    #[test]
    fn interpolate_unset_is_blank() {
        assert_eq!(interpolate("x${NOPE}y", &env(&[])).expect("interpolate"), "xy");
    }

    #[test]
    fn interpolate_defaults() {
        let e = env(&[("EMPTY", "")]);
        assert_eq!(interpolate("${EMPTY:-d}", &e).expect("interpolate"), "d");
        assert_eq!(interpolate("${EMPTY-d}", &e).expect("interpolate"), "");
        assert_eq!(interpolate("${UNSET-d}", &e).expect("interpolate"), "d");
    }

    #[test]
    fn interpolate_nested_default() {
        let e = env(&[("INNER", "deep")]);
        assert_eq!(
            interpolate("${OUTER:-${INNER}}", &e).expect("interpolate"),
            "deep"
        );
    }

    #[test]
    fn interpolate_required() {
        let e = env(&[("EMPTY", "")]);
        let err = interpolate("${EMPTY:?must be set}", &e).unwrap_err();
        assert_eq!(
            err.to_string(),
            "required variable EMPTY is missing a value: must be set"
        );
        assert_eq!(interpolate("${EMPTY?oops}", &e).expect("interpolate"), "");
    }

    #[test]
    fn interpolate_alternates() {
        let e = env(&[("SET", "1"), ("EMPTY", "")]);
        assert_eq!(interpolate("${SET:+on}", &e).expect("interpolate"), "on");
        assert_eq!(interpolate("${EMPTY:+on}", &e).expect("interpolate"), "");
        assert_eq!(interpolate("${EMPTY+on}", &e).expect("interpolate"), "on");
        assert_eq!(interpolate("${UNSET+on}", &e).expect("interpolate"), "");
    }

    #[test]
    fn interpolate_document_reports_path() {
        let mut doc: Value =
            serde_yaml::from_str("services:\n  web:\n    image: \"bad $\"\n").expect("yaml");
        let err = interpolate_document(&mut doc, &env(&[])).unwrap_err();
        assert!(err.to_string().contains("services.web.image"), "got: {err}");
    }

    #[test]
    fn interpolate_document_leaves_keys() {
        let mut doc: Value = serde_yaml::from_str("$KEY: $VAL\n").expect("yaml");
        interpolate_document(&mut doc, &env(&[("KEY", "k"), ("VAL", "v")])).expect("interpolate");
        assert_eq!(doc.get("$KEY").and_then(Value::as_str), Some("v"));
    }
}

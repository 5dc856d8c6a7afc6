//! Template Interpolation
//!
//! Strings containing `${expr}` markers are compiled once into a
//! [`Template`] and cached process-wide by source text. Evaluating a
//! template against a reactive scope reads through the scope's tracked
//! accessors, so a template evaluated inside an effect re-runs when any
//! field it mentions changes.
//!
//! Evaluation never fails outward. A template whose expression cannot be
//! parsed, or that reads a field which does not exist, evaluates to its own
//! literal source text.

mod expr;

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, trace};

use self::expr::Expr;
use crate::error::TemplateError;
use crate::state::Reactive;

const OPEN: &str = "${";

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Expr(Expr),
}

/// A compiled template.
#[derive(Debug)]
pub struct Template {
    source: String,
    parts: Result<Vec<Part>, TemplateError>,
}

fn cache() -> &'static DashMap<String, Arc<Template>> {
    static CACHE: OnceLock<DashMap<String, Arc<Template>>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Whether `text` contains an interpolation marker.
pub fn has_markers(text: &str) -> bool {
    text.contains(OPEN)
}

/// Compile `source`, reusing the cached template for identical text.
///
/// Text without markers compiles to a constant template and is not cached.
pub fn compile(source: &str) -> Arc<Template> {
    if !has_markers(source) {
        return Arc::new(Template::constant(source));
    }
    if let Some(template) = cache().get(source) {
        trace!(source, "template cache hit");
        return Arc::clone(template.value());
    }
    let template = Arc::new(Template::parse(source));
    if let Err(err) = &template.parts {
        debug!(source, error = %err, "template does not compile; it renders literally");
    }
    Arc::clone(
        cache()
            .entry(source.to_string())
            .or_insert(template)
            .value(),
    )
}

/// Compile and evaluate in one step.
pub fn evaluate(source: &str, scope: &Reactive) -> String {
    compile(source).evaluate(scope)
}

/// Number of cached templates.
pub fn cache_len() -> usize {
    cache().len()
}

pub fn clear_cache() {
    cache().clear();
}

impl Template {
    fn constant(source: &str) -> Self {
        Self {
            source: source.to_string(),
            parts: Ok(vec![Part::Text(source.to_string())]),
        }
    }

    fn parse(source: &str) -> Self {
        Self {
            source: source.to_string(),
            parts: split(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template has no expressions.
    pub fn is_constant(&self) -> bool {
        matches!(&self.parts, Ok(parts) if parts.iter().all(|part| matches!(part, Part::Text(_))))
    }

    /// Whether compilation failed; such a template always renders literally.
    pub fn is_literal_fallback(&self) -> bool {
        self.parts.is_err()
    }

    /// Evaluate against `scope`, falling back to the source text on error.
    pub fn evaluate(&self, scope: &Reactive) -> String {
        match self.try_evaluate(scope) {
            Ok(text) => text,
            Err(err) => {
                debug!(source = %self.source, error = %err, "template fell back to literal text");
                self.source.clone()
            }
        }
    }

    pub fn try_evaluate(&self, scope: &Reactive) -> Result<String, TemplateError> {
        let parts = self.parts.as_ref().map_err(Clone::clone)?;
        let mut out = String::with_capacity(self.source.len());
        for part in parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&expr.eval(scope)?.to_string()),
            }
        }
        Ok(out)
    }
}

/// Split source into literal text and `${...}` expressions.
fn split(source: &str) -> Result<Vec<Part>, TemplateError> {
    let mut parts = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find(OPEN) {
        if start > 0 {
            parts.push(Part::Text(rest[..start].to_string()));
        }
        let body_start = start + OPEN.len();
        let body_len = expression_len(&rest[body_start..])
            .ok_or(TemplateError::Unterminated(offset + start))?;
        let body = &rest[body_start..body_start + body_len];
        parts.push(Part::Expr(expr::parse(body, offset + body_start)?));

        let consumed = body_start + body_len + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }

    if !rest.is_empty() {
        parts.push(Part::Text(rest.to_string()));
    }
    Ok(parts)
}

/// Length of an expression body up to its closing brace, skipping quoted
/// strings.
fn expression_len(body: &str) -> Option<usize> {
    let mut quote = None;
    let mut escaped = false;
    for (index, c) in body.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '}' => return Some(index),
                _ => {}
            },
        }
    }
    None
}

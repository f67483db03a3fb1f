//! Selector compilation
//!
//! Structural (CSS) queries are compiled directly. Path queries accept the
//! XPath subset that maps onto CSS:
//!
//! | XPath | CSS |
//! |-------|-----|
//! | `//a` | `a` |
//! | `//div//img`, `//ul/li` | `div img`, `ul > li` |
//! | `/html/body` | `html:root > body` |
//! | `[@href]`, `[@rel='next']` | `[href]`, `[rel="next"]` |
//! | `[contains(@class,'x')]`, `[starts-with(@src,'http')]` | `[class*="x"]`, `[src^="http"]` |
//! | `[2]`, `[last()]` | `:nth-of-type(2)`, `:last-of-type` |
//! | trailing `/@src` | read the value from `src` |
//! | trailing `/text()` | ignored |

use crate::state::{Selector, SelectorKind, SelectorPurpose};
use thiserror::Error;

/// A selector that failed to compile
#[derive(Debug, Error)]
#[error("Invalid selector '{query}': {message}")]
pub struct SelectorError {
    pub query: String,
    pub message: String,
}

/// A selector ready to run against a parsed document
#[derive(Debug, Clone)]
pub struct CompiledSelector {
    pub query: String,
    pub purpose: SelectorPurpose,
    pub selector: scraper::Selector,
    /// Attribute to read the value from, when the query names one
    pub attribute: Option<String>,
}

impl CompiledSelector {
    pub fn compile(selector: &Selector) -> Result<Self, SelectorError> {
        let error = |message: String| SelectorError {
            query: selector.query.clone(),
            message,
        };

        let (css, attribute) = match selector.kind {
            SelectorKind::Css => (selector.query.trim().to_string(), None),
            SelectorKind::Xpath => xpath_to_css(&selector.query).map_err(error)?,
        };

        let compiled = scraper::Selector::parse(&css)
            .map_err(|e| error(format!("{:?}", e)))?;

        Ok(Self {
            query: selector.query.clone(),
            purpose: selector.purpose,
            selector: compiled,
            attribute,
        })
    }
}

/// A job's selectors, compiled and grouped by purpose in declaration order
#[derive(Debug, Clone, Default)]
pub struct CompiledSelectors {
    links: Vec<CompiledSelector>,
    assets: Vec<CompiledSelector>,
    metadata: Vec<CompiledSelector>,
}

impl CompiledSelectors {
    pub fn compile(selectors: &[Selector]) -> Result<Self, SelectorError> {
        let mut compiled = Self::default();
        for selector in selectors {
            let c = CompiledSelector::compile(selector)?;
            match c.purpose {
                SelectorPurpose::Links => compiled.links.push(c),
                SelectorPurpose::Assets => compiled.assets.push(c),
                SelectorPurpose::Metadata => compiled.metadata.push(c),
            }
        }
        Ok(compiled)
    }

    pub fn links(&self) -> &[CompiledSelector] {
        &self.links
    }

    pub fn assets(&self) -> &[CompiledSelector] {
        &self.assets
    }

    pub fn metadata(&self) -> &[CompiledSelector] {
        &self.metadata
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

/// Translates a path query into a CSS selector and an optional attribute name
fn xpath_to_css(expression: &str) -> Result<(String, Option<String>), String> {
    let mut rest = expression.trim();
    if let Some(stripped) = rest.strip_suffix("/text()") {
        rest = stripped;
    }

    let mut attribute = None;
    if let Some(idx) = rest.rfind("/@") {
        let name = &rest[idx + 2..];
        if is_name(name) {
            attribute = Some(name.to_string());
            rest = &rest[..idx];
        }
    }

    if rest.is_empty() {
        return Err("empty path".to_string());
    }

    let mut css = String::new();
    let mut first = true;
    while !rest.is_empty() {
        let axis = if let Some(r) = rest.strip_prefix("//") {
            rest = r;
            Axis::Descendant
        } else if let Some(r) = rest.strip_prefix('/') {
            rest = r;
            Axis::Child
        } else if first {
            Axis::Descendant
        } else {
            return Err(format!("unexpected input at '{}'", rest));
        };

        let end = step_end(rest);
        let step = translate_step(&rest[..end])?;
        rest = &rest[end..];

        if first {
            css.push_str(&step);
            if axis == Axis::Child {
                css.push_str(":root");
            }
        } else {
            css.push_str(if axis == Axis::Child { " > " } else { " " });
            css.push_str(&step);
        }
        first = false;
    }

    Ok((css, attribute))
}

/// Byte index where the current step ends (next `/` outside brackets and quotes)
fn step_end(input: &str) -> usize {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => return i,
            _ => {}
        }
    }
    input.len()
}

fn translate_step(step: &str) -> Result<String, String> {
    let name_end = step.find('[').unwrap_or(step.len());
    let name = step[..name_end].trim();
    if name != "*" && !is_name(name) {
        return Err(format!("unsupported step '{}'", step));
    }

    let mut css = name.to_string();
    let mut rest = &step[name_end..];
    while !rest.is_empty() {
        let inner_end = predicate_end(rest).ok_or_else(|| format!("unclosed predicate in '{}'", step))?;
        let inner = &rest[1..inner_end];
        for clause in inner.split(" and ") {
            css.push_str(&translate_predicate(clause.trim())?);
        }
        rest = rest[inner_end + 1..].trim_start();
    }
    Ok(css)
}

/// Index of the `]` closing the predicate that opens at byte 0
fn predicate_end(input: &str) -> Option<usize> {
    if !input.starts_with('[') {
        return None;
    }
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn translate_predicate(clause: &str) -> Result<String, String> {
    if let Ok(n) = clause.parse::<u32>() {
        return Ok(format!(":nth-of-type({})", n));
    }
    if clause == "last()" {
        return Ok(":last-of-type".to_string());
    }

    if let Some(attr) = clause.strip_prefix('@') {
        return match attr.split_once('=') {
            None if is_name(attr.trim()) => Ok(format!("[{}]", attr.trim())),
            Some((name, value)) if is_name(name.trim()) => Ok(format!(
                "[{}=\"{}\"]",
                name.trim(),
                css_escape(&unquote(value.trim())?)
            )),
            _ => Err(format!("unsupported predicate '{}'", clause)),
        };
    }

    for (function, operator) in [("contains", "*="), ("starts-with", "^=")] {
        if let Some(args) = clause
            .strip_prefix(function)
            .and_then(|r| r.trim_start().strip_prefix('('))
            .and_then(|r| r.strip_suffix(')'))
        {
            let (name, value) = args
                .split_once(',')
                .ok_or_else(|| format!("expected two arguments in '{}'", clause))?;
            let name = name
                .trim()
                .strip_prefix('@')
                .filter(|n| is_name(n))
                .ok_or_else(|| format!("{} needs an attribute in '{}'", function, clause))?;
            return Ok(format!(
                "[{}{}\"{}\"]",
                name,
                operator,
                css_escape(&unquote(value.trim())?)
            ));
        }
    }

    Err(format!("unsupported predicate '{}'", clause))
}

fn unquote(value: &str) -> Result<String, String> {
    let quoted = (value.starts_with('\'') && value.ends_with('\''))
        || (value.starts_with('"') && value.ends_with('"'));
    if value.len() < 2 || !quoted {
        return Err(format!("expected a quoted string, got {}", value));
    }
    Ok(value[1..value.len() - 1].to_string())
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ':')
}

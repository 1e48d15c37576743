//! Route rule compilation and path matching.
//!
//! A rule string is compiled once, at registration time, into one of four shapes:
//!
//! | pattern            | shape                        | matches when                         |
//! |--------------------|------------------------------|--------------------------------------|
//! | `*.js`             | [`RuleShape::SuffixWildcard`] | the path ends with `.js`             |
//! | `/static/*`        | [`RuleShape::PrefixWildcard`] | the path starts with `/static/`      |
//! | `/users/:id/posts` | [`RuleShape::Template`]       | same segment count, literals equal   |
//! | `/hello`           | [`RuleShape::Exact`]          | the path equals `/hello`             |
//!
//! Wildcard detection runs before template detection, so a pattern is never both.
//! Template parameters use the `:name` syntax only; a `{name}` segment is a literal.
//!
//! The empty pattern does not compile to a rule: [`Rule::compile`] returns `None` and the
//! owning filter is ruleless.

use crate::request::PathParams;
use std::fmt;

/// Marks a wildcard at the start (suffix match) or at the end (prefix match) of a rule.
pub const WILDCARD: char = '*';

/// Marks a named parameter segment in a template rule.
pub const PARAM_MARKER: char = ':';

/// Path segment separator used by template rules.
pub const SEPARATOR: char = '/';

/// The matcher shape of a compiled [`Rule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleShape {
    /// No wildcard and no parameter: the path must equal the literal.
    Exact,
    /// Pattern started with `*`: the path must end with the literal.
    SuffixWildcard,
    /// Pattern ended with `*`: the path must start with the literal.
    PrefixWildcard,
    /// Pattern holds `:name` segments: segment-wise match with parameter capture.
    Template,
}

/// One segment of a template rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix(PARAM_MARKER) {
            Some(name) => Segment::Param(name.to_owned()),
            None => Segment::Literal(raw.to_owned()),
        }
    }

    /// Returns true if this segment accepts `part` at the same position.
    #[inline]
    fn accepts(&self, part: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == part,
            Segment::Param(_) => true,
        }
    }
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    shape: RuleShape,
    literal: String,
    segments: Vec<Segment>,
}

impl Rule {
    /// Compiles a pattern string.
    ///
    /// Returns `None` for the empty pattern, which stands for "no rule".
    pub fn compile(pattern: &str) -> Option<Rule> {
        if pattern.is_empty() {
            return None;
        }

        let rule = if let Some(literal) = pattern.strip_prefix(WILDCARD) {
            Rule { shape: RuleShape::SuffixWildcard, literal: literal.to_owned(), segments: Vec::new() }
        } else if let Some(literal) = pattern.strip_suffix(WILDCARD) {
            Rule { shape: RuleShape::PrefixWildcard, literal: literal.to_owned(), segments: Vec::new() }
        } else {
            let segments = pattern.split(SEPARATOR).map(Segment::parse).collect::<Vec<_>>();
            if segments.iter().any(|segment| matches!(segment, Segment::Param(_))) {
                Rule { shape: RuleShape::Template, literal: pattern.to_owned(), segments }
            } else {
                Rule { shape: RuleShape::Exact, literal: pattern.to_owned(), segments: Vec::new() }
            }
        };

        Some(rule)
    }

    pub fn shape(&self) -> RuleShape {
        self.shape
    }

    /// The fixed portion of the pattern, wildcard marker stripped.
    pub fn literal(&self) -> &str {
        &self.literal
    }

    /// Template segments; empty for every other shape.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Checks the path against this rule.
    pub fn matches(&self, path: &str) -> bool {
        match self.shape {
            RuleShape::Exact => path == self.literal,
            RuleShape::SuffixWildcard => path.ends_with(self.literal.as_str()),
            RuleShape::PrefixWildcard => path.starts_with(self.literal.as_str()),
            RuleShape::Template => self.matches_template(path),
        }
    }

    fn matches_template(&self, path: &str) -> bool {
        // count first, so a longer path never gets a partial match
        if path.split(SEPARATOR).count() != self.segments.len() {
            return false;
        }

        path.split(SEPARATOR).zip(&self.segments).all(|(part, segment)| segment.accepts(part))
    }

    /// Matches the path and collects the parameter values of a template rule.
    ///
    /// Returns `None` when the path does not match. Non template rules that match
    /// return empty params.
    pub fn captures(&self, path: &str) -> Option<PathParams> {
        if !self.matches(path) {
            return None;
        }

        let mut params = PathParams::empty();
        if self.shape == RuleShape::Template {
            for (part, segment) in path.split(SEPARATOR).zip(&self.segments) {
                if let Segment::Param(name) = segment {
                    params.push(name.clone(), part.to_owned());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shape {
            RuleShape::SuffixWildcard => write!(f, "{WILDCARD}{}", self.literal),
            RuleShape::PrefixWildcard => write!(f, "{}{WILDCARD}", self.literal),
            RuleShape::Exact | RuleShape::Template => f.write_str(&self.literal),
        }
    }
}

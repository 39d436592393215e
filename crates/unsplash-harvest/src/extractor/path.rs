// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

//! Card path expressions: the descent chain from a grid item to its image.
//!
//! Grammar:
//! ```text
//! path      := step ('/' step)* '@' attribute
//! step      := '*' ('[' name '=' quoted ']')?
//! quoted    := '"' any-char-except-quote* '"'
//! name      := [A-Za-z0-9_:-]+
//! attribute := name
//! ```
//!
//! Every step selects the first element child of the current node. A
//! bracketed predicate additionally requires an exact attribute value on
//! that child. Whitespace between tokens is ignored.

use crate::error::HarvestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Peekable;
use std::str::{CharIndices, FromStr};

/// One "first child" descent, optionally guarded by an attribute match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub require: Option<AttributeMatch>,
}

/// An exact attribute equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMatch {
    pub name: String,
    pub value: String,
}

impl PathStep {
    /// A step that accepts any first child.
    pub fn any() -> Self {
        Self { require: None }
    }

    /// A step whose first child must carry `name="value"`.
    pub fn with_attribute(name: &str, value: &str) -> Self {
        Self {
            require: Some(AttributeMatch {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// A parsed card path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CardPath {
    steps: Vec<PathStep>,
    attribute: String,
}

impl CardPath {
    pub fn new(steps: Vec<PathStep>, attribute: &str) -> Self {
        Self {
            steps,
            attribute: attribute.to_string(),
        }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Attribute read from the final node.
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }
}

impl Default for CardPath {
    /// card wrapper (photo marker) / inner wrapper / link / image, then `src`.
    fn default() -> Self {
        Self::new(
            vec![
                PathStep::with_attribute("class", "container-WSKyvi"),
                PathStep::any(),
                PathStep::any(),
                PathStep::any(),
            ],
            "src",
        )
    }
}

impl fmt::Display for CardPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                write!(f, " / ")?;
            }
            match &step.require {
                Some(m) => write!(f, "*[{}=\"{}\"]", m.name, m.value)?,
                None => write!(f, "*")?,
            }
        }
        write!(f, " @{}", self.attribute)
    }
}

impl FromStr for CardPath {
    type Err = HarvestError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser::new(expr);
        let mut steps = Vec::new();

        loop {
            parser.skip_ws();
            steps.push(parser.step()?);
            parser.skip_ws();
            match parser.peek() {
                Some('/') => {
                    parser.bump();
                }
                Some('@') => {
                    parser.bump();
                    break;
                }
                Some(c) => return Err(parser.error(format!("unexpected `{c}`"))),
                None => return Err(parser.error("missing `@attribute` terminator")),
            }
        }

        parser.skip_ws();
        let attribute = parser.name()?;
        parser.skip_ws();
        if let Some(c) = parser.peek() {
            return Err(parser.error(format!("trailing input starting at `{c}`")));
        }

        Ok(Self { steps, attribute })
    }
}

impl TryFrom<String> for CardPath {
    type Error = HarvestError;

    fn try_from(expr: String) -> Result<Self, Self::Error> {
        expr.parse()
    }
}

impl From<CardPath> for String {
    fn from(path: CardPath) -> Self {
        path.to_string()
    }
}

struct Parser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next().map(|(_, c)| c)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map(|&(i, _)| i).unwrap_or(self.src.len())
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), HarvestError> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(self.error(format!("expected `{want}`, found `{c}`"))),
            None => Err(self.error(format!("expected `{want}`, found end of input"))),
        }
    }

    fn step(&mut self) -> Result<PathStep, HarvestError> {
        self.expect('*')?;
        self.skip_ws();
        if self.peek() != Some('[') {
            return Ok(PathStep::any());
        }
        self.bump();
        self.skip_ws();
        let name = self.name()?;
        self.skip_ws();
        self.expect('=')?;
        self.skip_ws();
        let value = self.quoted()?;
        self.skip_ws();
        self.expect(']')?;
        Ok(PathStep {
            require: Some(AttributeMatch { name, value }),
        })
    }

    fn name(&mut self) -> Result<String, HarvestError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':') {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(self.error("expected a name"));
        }
        Ok(out)
    }

    fn quoted(&mut self) -> Result<String, HarvestError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn error(&mut self, reason: impl Into<String>) -> HarvestError {
        let at = self.offset();
        HarvestError::InvalidCardPath {
            expr: self.src.to_string(),
            reason: format!("{} at offset {at}", reason.into()),
        }
    }
}

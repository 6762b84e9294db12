//! Argument template for an external compressor.
//!
//! A template such as `--quality 84 {image}` is split shell-style into tokens
//! once, when the configuration is parsed. Each token is kept as a list of
//! literal and placeholder segments, so rendering a path never re-tokenizes:
//! a path with spaces stays a single argument.
//!
//! `{{` and `}}` escape literal braces. Any placeholder other than `{image}` is
//! rejected, and `{image}` must appear exactly once in the whole template.

use std::{ffi::OsString, fmt, path::Path, str::FromStr};

use crate::error::{OptimizeError, Result};

/// Name of the only placeholder a template may contain.
pub const IMAGE_PLACEHOLDER: &str = "image";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Image,
}

/// A validated compressor argument list with a single `{image}` slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorTemplate {
    raw: String,
    tokens: Vec<Vec<Segment>>,
}

impl CompressorTemplate {
    /// Parses and validates a template string.
    pub fn parse(raw: &str) -> Result<Self> {
        let words = shlex::split(raw)
            .ok_or_else(|| OptimizeError::Template(format!("unbalanced quotes in {:?}", raw)))?;

        let tokens = words
            .iter()
            .map(|word| parse_token(word))
            .collect::<Result<Vec<_>>>()?;

        let placeholders = tokens
            .iter()
            .flatten()
            .filter(|segment| **segment == Segment::Image)
            .count();
        if placeholders != 1 {
            return Err(OptimizeError::Template(format!(
                "must contain {{{}}} exactly once, found {} in {:?}",
                IMAGE_PLACEHOLDER, placeholders, raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            tokens,
        })
    }

    /// Substitutes `image` into the template, yielding the argument vector.
    pub fn render(&self, image: &Path) -> Vec<OsString> {
        self.tokens
            .iter()
            .map(|token| {
                let mut arg = OsString::new();
                for segment in token {
                    match segment {
                        Segment::Literal(text) => arg.push(text),
                        Segment::Image => arg.push(image.as_os_str()),
                    }
                }
                arg
            })
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for CompressorTemplate {
    type Err = OptimizeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for CompressorTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_token(word: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = word.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => {
                            return Err(OptimizeError::Template(format!(
                                "unterminated placeholder in {:?}",
                                word
                            )))
                        }
                    }
                }
                if name != IMAGE_PLACEHOLDER {
                    return Err(OptimizeError::Template(format!(
                        "unknown placeholder {{{}}}",
                        name
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Image);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '}' => {
                return Err(OptimizeError::Template(format!(
                    "single '}}' encountered in {:?}",
                    word
                )))
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() || segments.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

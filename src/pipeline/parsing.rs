//! Stage Response Parsing
//!
//! The materials and geocoding prompts ask the model for a two-dimensional
//! list literal such as `[["oak wood","Vermont"]]`. Nothing guarantees the
//! model complies, so every reply is parsed here before the pipeline moves on.
//!
//! Accepted item syntax: double- or single-quoted strings (backslash escapes
//! honoured) and bare tokens running up to the next `,` or `]`. Numbers are
//! bare tokens.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::types::{CoordinateEntry, MaterialEntry};

/// Soft upper bound on materials requested by the prompt.
pub const MAX_MATERIALS: usize = 5;

/// How tolerant parsing is of text around the list literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    /// The reply (minus a Markdown code fence) must be exactly one literal.
    Strict,
    /// The first `[[ ... ]]` block is extracted from surrounding prose, and
    /// coordinates may carry a degree sign and hemisphere letter.
    #[default]
    Lenient,
}

/// Why a reply could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
}

impl ParseFailure {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Stage Parsers
// ============================================================================

/// Parse the materials stage reply into (material, origin) pairs.
pub fn parse_materials(text: &str, mode: ParseMode) -> Result<Vec<MaterialEntry>, ParseFailure> {
    let rows = parse_rows(text, mode)?;
    if rows.is_empty() {
        return Err(ParseFailure::new("expected at least one material, got an empty list"));
    }
    if rows.len() > MAX_MATERIALS {
        warn!(count = rows.len(), max = MAX_MATERIALS, "Model returned more materials than requested");
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() < 2 || (mode == ParseMode::Strict && row.len() != 2) {
                return Err(ParseFailure::new(format!(
                    "row {} has {} items, expected [material, place]",
                    i + 1,
                    row.len()
                )));
            }
            let mut items = row.into_iter();
            let material = non_empty(items.next(), i, "material")?;
            let origin = non_empty(items.next(), i, "place")?;
            Ok(MaterialEntry { material, origin })
        })
        .collect()
}

/// Parse the geocoding stage reply into (place, latitude, longitude) triples.
pub fn parse_coordinates(
    text: &str,
    mode: ParseMode,
    validate_ranges: bool,
) -> Result<Vec<CoordinateEntry>, ParseFailure> {
    let rows = parse_rows(text, mode)?;
    if rows.is_empty() {
        return Err(ParseFailure::new("expected at least one place, got an empty list"));
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            if row.len() < 3 || (mode == ParseMode::Strict && row.len() != 3) {
                return Err(ParseFailure::new(format!(
                    "row {} has {} items, expected [place, latitude, longitude]",
                    i + 1,
                    row.len()
                )));
            }
            let mut items = row.into_iter();
            let place = non_empty(items.next(), i, "place")?;
            let latitude = parse_degrees(items.next(), mode, Axis::Latitude)
                .map_err(|r| ParseFailure::new(format!("row {}: {r}", i + 1)))?;
            let longitude = parse_degrees(items.next(), mode, Axis::Longitude)
                .map_err(|r| ParseFailure::new(format!("row {}: {r}", i + 1)))?;

            if validate_ranges {
                if !(-90.0..=90.0).contains(&latitude) {
                    return Err(ParseFailure::new(format!(
                        "row {}: latitude {latitude} outside [-90, 90]",
                        i + 1
                    )));
                }
                if !(-180.0..=180.0).contains(&longitude) {
                    return Err(ParseFailure::new(format!(
                        "row {}: longitude {longitude} outside [-180, 180]",
                        i + 1
                    )));
                }
            }

            Ok(CoordinateEntry {
                place,
                latitude,
                longitude,
            })
        })
        .collect()
}

fn non_empty(item: Option<Item>, row: usize, what: &str) -> Result<String, ParseFailure> {
    let text = item.map(Item::into_text).unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseFailure::new(format!("row {}: empty {what}", row + 1)));
    }
    Ok(text.to_string())
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn name(self) -> &'static str {
        match self {
            Axis::Latitude => "latitude",
            Axis::Longitude => "longitude",
        }
    }

    /// Sign for a hemisphere letter, `None` if the letter does not belong
    /// to this axis.
    fn hemisphere_sign(self, letter: char) -> Option<f64> {
        match (self, letter.to_ascii_uppercase()) {
            (Axis::Latitude, 'N') | (Axis::Longitude, 'E') => Some(1.0),
            (Axis::Latitude, 'S') | (Axis::Longitude, 'W') => Some(-1.0),
            _ => None,
        }
    }
}

fn parse_degrees(item: Option<Item>, mode: ParseMode, axis: Axis) -> Result<f64, String> {
    let raw = item.map(Item::into_text).unwrap_or_default();
    let mut text = raw.trim();

    let mut sign = 1.0;
    if mode == ParseMode::Lenient {
        if let Some(last) = text.chars().last().filter(|c| c.is_ascii_alphabetic()) {
            sign = axis
                .hemisphere_sign(last)
                .ok_or_else(|| format!("'{raw}' is not a valid {}", axis.name()))?;
            text = text[..text.len() - last.len_utf8()].trim_end();
        }
        text = text.trim_end_matches('°').trim();
    }

    let value: f64 = text
        .parse()
        .map_err(|_| format!("'{raw}' is not a valid {}", axis.name()))?;
    if !value.is_finite() {
        return Err(format!("{} '{raw}' is not finite", axis.name()));
    }
    if sign < 0.0 && value < 0.0 {
        return Err(format!("'{raw}' has both a minus sign and a hemisphere letter"));
    }
    Ok(sign * value)
}

// ============================================================================
// List Literal Parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Quoted(String),
    Bare(String),
}

impl Item {
    fn into_text(self) -> String {
        match self {
            Item::Quoted(s) | Item::Bare(s) => s,
        }
    }
}

/// Locate and parse the two-level list literal according to `mode`.
fn parse_rows(text: &str, mode: ParseMode) -> Result<Vec<Vec<Item>>, ParseFailure> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(ParseFailure::new("reply is empty"));
    }

    match (parse_literal(body), mode) {
        (Ok(rows), _) => Ok(rows),
        (Err(e), ParseMode::Strict) => Err(ParseFailure::new(format!(
            "reply is not a single list literal: {e}"
        ))),
        (Err(e), ParseMode::Lenient) => first_embedded_literal(body, e),
    }
}

/// First `[[ ... ]]` literal that parses, scanning candidate openings left
/// to right. Each candidate ends at its own balanced closing bracket, so
/// text after it (including further lists) is ignored.
fn first_embedded_literal(
    body: &str,
    whole_reply_error: String,
) -> Result<Vec<Vec<Item>>, ParseFailure> {
    let mut first_error = None;
    let mut from = 0;
    // Openings may overlap (`[ [[`), so resume one byte past each match.
    while let Some(opening) = list_opening_pattern().find_at(body, from) {
        let mut cursor = Cursor::at(body, opening.start());
        match parse_list(&mut cursor) {
            Ok(rows) => return Ok(rows),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
        from = opening.start() + 1;
    }
    Err(match first_error {
        Some(e) => ParseFailure::new(format!("embedded list literal is malformed: {e}")),
        None => ParseFailure::new(format!("no list literal found in reply ({whole_reply_error})")),
    })
}

fn list_opening_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[\s*\[").unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// Remove a surrounding Markdown code fence (```json ... ```), if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `python`, ...) on the opening line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Parse exactly one `[[...], ...]` literal spanning all of `text`.
fn parse_literal(text: &str) -> Result<Vec<Vec<Item>>, String> {
    let mut cursor = Cursor::new(text);
    let rows = parse_list(&mut cursor)?;

    cursor.skip_ws();
    if let Some(c) = cursor.peek() {
        return Err(format!("unexpected '{c}' after list at offset {}", cursor.pos));
    }
    Ok(rows)
}

/// Parse one outer list starting at the cursor, leaving the cursor just
/// past its closing bracket.
fn parse_list(cursor: &mut Cursor<'_>) -> Result<Vec<Vec<Item>>, String> {
    cursor.skip_ws();
    cursor.expect('[')?;

    let mut rows = Vec::new();
    loop {
        cursor.skip_ws();
        match cursor.peek() {
            Some(']') => {
                cursor.bump();
                break;
            }
            Some('[') => rows.push(parse_row(cursor)?),
            Some(c) => return Err(format!("expected '[' or ']' at offset {}, found '{c}'", cursor.pos)),
            None => return Err("unterminated outer list".to_string()),
        }
        cursor.skip_ws();
        match cursor.peek() {
            Some(',') => cursor.bump(),
            Some(']') => {
                cursor.bump();
                break;
            }
            Some(c) => return Err(format!("expected ',' or ']' at offset {}, found '{c}'", cursor.pos)),
            None => return Err("unterminated outer list".to_string()),
        }
    }
    Ok(rows)
}

fn parse_row(cursor: &mut Cursor<'_>) -> Result<Vec<Item>, String> {
    cursor.expect('[')?;
    let mut items = Vec::new();
    loop {
        cursor.skip_ws();
        match cursor.peek() {
            Some(']') => {
                cursor.bump();
                return Ok(items);
            }
            Some('[') => return Err(format!("lists nested deeper than two levels at offset {}", cursor.pos)),
            Some(q @ ('"' | '\'')) => items.push(Item::Quoted(cursor.quoted(q)?)),
            Some(_) => items.push(Item::Bare(cursor.bare()?)),
            None => return Err("unterminated row".to_string()),
        }
        cursor.skip_ws();
        match cursor.peek() {
            Some(',') => cursor.bump(),
            Some(']') => {
                cursor.bump();
                return Ok(items);
            }
            Some(c) => return Err(format!("expected ',' or ']' at offset {}, found '{c}'", cursor.pos)),
            None => return Err("unterminated row".to_string()),
        }
    }
}

/// Byte-offset cursor over the reply text.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self::at(text, 0)
    }

    fn at(text: &'a str, pos: usize) -> Self {
        Self { text, pos }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, want: char) -> Result<(), String> {
        match self.peek() {
            Some(c) if c == want => {
                self.bump();
                Ok(())
            }
            Some(c) => Err(format!("expected '{want}' at offset {}, found '{c}'", self.pos)),
            None => Err(format!("expected '{want}', found end of text")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String, String> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(format!("unterminated string starting at offset {start}")),
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(out);
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(c) => out.push(c),
                        None => return Err(format!("unterminated string starting at offset {start}")),
                    }
                    self.bump();
                }
                Some(c) => {
                    out.push(c);
                    self.bump();
                }
            }
        }
    }

    fn bare(&mut self) -> Result<String, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, ',' | ']' | '[') {
                break;
            }
            self.bump();
        }
        let token = self.text[start..self.pos].trim();
        if token.is_empty() {
            return Err(format!("empty item at offset {start}"));
        }
        Ok(token.to_string())
    }
}

// src/core/clustering/response.rs
//! Parsing of grouping oracle responses.
//!
//! The oracle answers in free text with a mapping literal between
//! `<GROUPED_COMPONENTS>` markers. The literal is JSON or the Python dialect
//! models tend to write (single quotes, `True`/`None`, trailing commas). It
//! is parsed, never evaluated.

use std::sync::OnceLock;
use regex::Regex;
use serde_json::{Map, Number, Value};

pub const OPEN_MARKER: &str = "<GROUPED_COMPONENTS>";
pub const CLOSE_MARKER: &str = "</GROUPED_COMPONENTS>";

const MAX_NESTING: usize = 64;

/// A module proposed by the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct ProposedGroup {
    pub name: String,
    pub description: String,
    /// Oracle's idea of where the group sits; position in the tree wins
    pub path: Vec<String>,
    pub components: Vec<String>,
}

/// Outcome of parsing one oracle response
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedGrouping {
    Parsed(Vec<ProposedGroup>),
    MissingMarkers,
    Malformed(String),
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<GROUPED_COMPONENTS>(.*?)</GROUPED_COMPONENTS>")
            .expect("Invalid grouped components regex")
    })
}

/// Text between the first open marker and the next close marker
pub fn extract_grouped_region(response: &str) -> Option<&str> {
    marker_regex()
        .captures(response)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse a full oracle response into proposed groups
pub fn parse_grouping_response(response: &str) -> ParsedGrouping {
    let Some(region) = extract_grouped_region(response) else {
        return ParsedGrouping::MissingMarkers;
    };

    let value = match parse_literal(strip_code_fence(region)) {
        Ok(value) => value,
        Err(reason) => return ParsedGrouping::Malformed(reason),
    };

    let Value::Object(modules) = value else {
        return ParsedGrouping::Malformed(format!("expected a mapping, got {}", kind_of(&value)));
    };

    let mut groups = Vec::with_capacity(modules.len());
    for (name, info) in modules {
        let Value::Object(info) = info else {
            return ParsedGrouping::Malformed(format!(
                "module '{}' should map to an object, got {}",
                name,
                kind_of(&info)
            ));
        };

        groups.push(ProposedGroup {
            description: info
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            path: string_items(info.get("path")),
            components: string_items(info.get("components")),
            name,
        });
    }

    ParsedGrouping::Parsed(groups)
}

fn string_items(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Drop a surrounding ``` fence, with or without a language tag
fn strip_code_fence(region: &str) -> &str {
    let trimmed = region.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a JSON / Python literal into a JSON value
pub fn parse_literal(text: &str) -> Result<Value, String> {
    let mut parser = LiteralParser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let value = parser.value(0)?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(format!("unexpected trailing input at offset {}", parser.pos));
    }
    Ok(value)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                // Python comment to end of line
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn consume(&mut self, expected: char) -> Result<(), String> {
        self.skip_whitespace();
        match self.peek() {
            Some(c) if c == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(format!("expected '{}' at offset {}, found '{}'", expected, self.pos, c)),
            None => Err(format!("expected '{}' but input ended", expected)),
        }
    }

    fn value(&mut self, depth: usize) -> Result<Value, String> {
        if depth > MAX_NESTING {
            return Err("literal is nested too deeply".to_string());
        }

        self.skip_whitespace();
        match self.peek() {
            Some('{') => self.mapping(depth),
            Some('[') => self.sequence(depth, ']'),
            Some('(') => self.sequence(depth, ')'),
            Some('"') | Some('\'') => self.string().map(Value::String),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.keyword(),
            Some(c) => Err(format!("unexpected '{}' at offset {}", c, self.pos)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn mapping(&mut self, depth: usize) -> Result<Value, String> {
        self.consume('{')?;
        let mut map = Map::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = match self.value(depth + 1)? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => return Err(format!("unsupported mapping key {}", other)),
            };
            self.consume(':')?;
            let value = self.value(depth + 1)?;
            map.insert(key, value);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(c) => return Err(format!("expected ',' or '}}' at offset {}, found '{}'", self.pos, c)),
                None => return Err("unterminated mapping".to_string()),
            }
        }
    }

    fn sequence(&mut self, depth: usize, close: char) -> Result<Value, String> {
        self.pos += 1;
        let mut items = Vec::new();

        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(Value::Array(items));
            }

            items.push(self.value(depth + 1)?);

            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(c) if c == close => {}
                Some(c) => {
                    return Err(format!("expected ',' or '{}' at offset {}, found '{}'", close, self.pos, c))
                }
                None => return Err("unterminated list".to_string()),
            }
        }
    }

    fn string(&mut self) -> Result<String, String> {
        let quote = self.peek().ok_or("unexpected end of input")?;
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();

        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.peek().ok_or("unterminated escape")?;
                    self.pos += 1;
                    match escaped {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        '0' => out.push('\0'),
                        'u' => out.push(self.unicode_escape()?),
                        other => out.push(other),
                    }
                }
                '\n' => return Err(format!("newline inside string starting at offset {}", start)),
                c => out.push(c),
            }
        }

        Err(format!("unterminated string starting at offset {}", start))
    }

    fn unicode_escape(&mut self) -> Result<char, String> {
        let end = self.pos + 4;
        if end > self.chars.len() {
            return Err("truncated unicode escape".to_string());
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| format!("invalid unicode escape \\u{}", hex))
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_') {
                self.pos += 1;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Number(n.into()));
        }
        text.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("invalid number '{}' at offset {}", text, start))
    }

    fn keyword(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }

        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            _ => Err(format!("unsupported identifier '{}' at offset {}", word, start)),
        }
    }
}

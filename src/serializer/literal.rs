//! Structured literal parsing for text messages
//!
//! A text message such as `(1, 2, 3)` or `{'user': 'ann', 'ids': [4, 5]}`
//! is parsed into a [`Literal`] so that it can be shipped as structured JSON
//! instead of an opaque string. Only containers (list, tuple, mapping) are
//! kept; scalars and sets leave the message as text.

use serde_json::{Map, Number, Value};
use std::fmt;

/// Nesting limit; deeper input is treated as plain text.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i128),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
    Tuple(Vec<Literal>),
    Set(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

/// A literal that parsed fine but has no JSON counterpart
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("literal is not JSON-encodable: {0}")]
pub struct NotEncodable(pub String);

impl Literal {
    /// True for the container kinds that replace the text message
    pub fn is_structured(&self) -> bool {
        matches!(self, Literal::List(_) | Literal::Tuple(_) | Literal::Dict(_))
    }

    /// Convert to JSON. Tuples become arrays; mapping keys must be scalars.
    pub fn to_json(&self) -> Result<Value, NotEncodable> {
        Ok(match self {
            Literal::None => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => {
                if let Ok(v) = i64::try_from(*i) {
                    Value::Number(v.into())
                } else if let Ok(v) = u64::try_from(*i) {
                    Value::Number(v.into())
                } else {
                    return Err(NotEncodable(format!("integer {} out of range", i)));
                }
            }
            Literal::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .ok_or_else(|| NotEncodable(format!("float {} is not finite", f)))?,
            Literal::Str(s) => Value::String(s.clone()),
            Literal::List(items) | Literal::Tuple(items) => Value::Array(
                items
                    .iter()
                    .map(Literal::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Literal::Set(_) => return Err(NotEncodable("set".to_string())),
            Literal::Dict(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key.json_key()?, value.to_json()?);
                }
                Value::Object(map)
            }
        })
    }

    fn json_key(&self) -> Result<String, NotEncodable> {
        match self {
            Literal::Str(s) => Ok(s.clone()),
            Literal::Int(i) => Ok(i.to_string()),
            Literal::Float(f) => Ok(format!("{:?}", f)),
            Literal::Bool(b) => Ok(b.to_string()),
            Literal::None => Ok("null".to_string()),
            other => Err(NotEncodable(format!("key {} must be a scalar", other))),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Literal]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::None => f.write_str("None"),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::Str(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Literal::Tuple(items) => {
                f.write_str("(")?;
                write_seq(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Literal::Set(items) if items.is_empty() => f.write_str("set()"),
            Literal::Set(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Literal::Dict(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Parse `text` as a single literal. Returns `None` on any syntax error.
pub fn parse(text: &str) -> Option<Literal> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    let value = parser.value(0)?;
    parser.skip_ws();
    if parser.pos == parser.chars.len() {
        Some(value)
    } else {
        None
    }
}

/// Parse `text` and keep the result only if it is a container
pub fn parse_structured(text: &str) -> Option<Literal> {
    parse(text).filter(Literal::is_structured)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self, depth: usize) -> Option<Literal> {
        if depth > MAX_DEPTH {
            return None;
        }
        self.skip_ws();
        match self.peek()? {
            '[' => {
                self.pos += 1;
                let (items, _) = self.sequence(']', depth)?;
                Some(Literal::List(items))
            }
            '(' => {
                self.pos += 1;
                let (mut items, trailing_comma) = self.sequence(')', depth)?;
                if items.len() == 1 && !trailing_comma {
                    items.pop()
                } else {
                    Some(Literal::Tuple(items))
                }
            }
            '{' => {
                self.pos += 1;
                self.brace(depth)
            }
            '\'' | '"' => self.string(),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            c if c.is_alphabetic() => self.name(),
            _ => None,
        }
    }

    /// Comma-separated values up to `close`; reports whether a trailing comma was seen
    fn sequence(&mut self, close: char, depth: usize) -> Option<(Vec<Literal>, bool)> {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        loop {
            if self.eat(close) {
                return Some((items, trailing_comma));
            }
            if !items.is_empty() && !trailing_comma {
                return None;
            }
            items.push(self.value(depth + 1)?);
            trailing_comma = self.eat(',');
        }
    }

    fn brace(&mut self, depth: usize) -> Option<Literal> {
        if self.eat('}') {
            return Some(Literal::Dict(Vec::new()));
        }
        let first = self.value(depth + 1)?;
        if !self.eat(':') {
            let mut items = vec![first];
            if self.eat(',') {
                let (rest, _) = self.sequence('}', depth)?;
                items.extend(rest);
            } else if !self.eat('}') {
                return None;
            }
            return Some(Literal::Set(items));
        }

        let mut entries = vec![(first, self.value(depth + 1)?)];
        loop {
            if self.eat('}') {
                return Some(Literal::Dict(entries));
            }
            if !self.eat(',') {
                return None;
            }
            if self.eat('}') {
                return Some(Literal::Dict(entries));
            }
            let key = self.value(depth + 1)?;
            if !self.eat(':') {
                return None;
            }
            entries.push((key, self.value(depth + 1)?));
        }
    }

    fn string(&mut self) -> Option<Literal> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(Literal::Str(out)),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'x' => out.push(self.hex_escape(2)?),
                    'u' => out.push(self.hex_escape(4)?),
                    other => out.push(other),
                },
                '\n' => return None,
                c => out.push(c),
            }
        }
    }

    fn hex_escape(&mut self, len: usize) -> Option<char> {
        let mut code = 0u32;
        for _ in 0..len {
            code = code * 16 + self.bump()?.to_digit(16)?;
        }
        char::from_u32(code)
    }

    fn number(&mut self) -> Option<Literal> {
        let start = self.pos;
        let negative = match self.peek() {
            Some('-') => {
                self.pos += 1;
                true
            }
            Some('+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        if let Some(radix) = self.radix_prefix() {
            self.pos += 2;
            let digits_start = self.pos;
            while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
                self.pos += 1;
            }
            let digits: String = self.chars[digits_start..self.pos]
                .iter()
                .filter(|c| **c != '_')
                .collect();
            let magnitude = i128::from_str_radix(&digits, radix).ok()?;
            return Some(Literal::Int(if negative { -magnitude } else { magnitude }));
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' => is_float = true,
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.chars.get(self.pos + 1), Some('-' | '+')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if is_float {
            return raw.parse::<f64>().ok().map(Literal::Float);
        }
        // decimal integers other than zero take no leading zeros: `01` is invalid
        let digits = raw.trim_start_matches(['-', '+']);
        if digits.len() > 1 && digits.starts_with('0') && digits.contains(|c: char| c != '0') {
            return None;
        }
        raw.parse::<i128>().ok().map(Literal::Int)
    }

    /// Radix of a `0x`, `0o` or `0b` prefix at the cursor
    fn radix_prefix(&self) -> Option<u32> {
        if self.peek() != Some('0') {
            return None;
        }
        match self.chars.get(self.pos + 1) {
            Some('x' | 'X') => Some(16),
            Some('o' | 'O') => Some(8),
            Some('b' | 'B') => Some(2),
            _ => None,
        }
    }

    fn name(&mut self) -> Option<Literal> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Literal::Bool(true)),
            "False" | "false" => Some(Literal::Bool(false)),
            "None" | "null" => Some(Literal::None),
            _ => None,
        }
    }
}

//! Parser for the column type grammar used by field mappings:
//!
//! ```text
//! TYPE := scalarName | "set<" TYPE ">" | "list<" TYPE ">"
//!       | "map<" TYPE "," TYPE ">" | "frozen<" TYPE ">"
//! ```
//!
//! `frozen<...>` is transparent and disappears from the parsed tree.

use std::fmt;
use std::str::FromStr;

use crate::common::TypeError;

/// Parsed column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSpec {
    /// Any non-generic type name, lower-cased (`text`, `uuid`, `int`, ...)
    Scalar(String),
    Set(Box<TypeSpec>),
    List(Box<TypeSpec>),
    Map(Box<TypeSpec>, Box<TypeSpec>),
}

impl TypeSpec {
    pub fn parse(input: &str) -> Result<Self, TypeError> {
        let mut parser = Parser {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        };
        let spec = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(spec)
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        TypeSpec::Scalar(name.into().to_ascii_lowercase())
    }

    pub fn set(inner: TypeSpec) -> Self {
        TypeSpec::Set(Box::new(inner))
    }

    pub fn list(inner: TypeSpec) -> Self {
        TypeSpec::List(Box::new(inner))
    }

    pub fn map(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::Map(Box::new(key), Box::new(value))
    }

    pub fn is_collection(&self) -> bool {
        !matches!(self, TypeSpec::Scalar(_))
    }
}

impl FromStr for TypeSpec {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeSpec::parse(s)
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Scalar(name) => f.write_str(name),
            TypeSpec::Set(inner) => write!(f, "set<{inner}>"),
            TypeSpec::List(inner) => write!(f, "list<{inner}>"),
            TypeSpec::Map(key, value) => write!(f, "map<{key},{value}>"),
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn parse_type(&mut self) -> Result<TypeSpec, TypeError> {
        self.skip_whitespace();
        let name = self.identifier()?;
        self.skip_whitespace();

        if !self.eat(b'<') {
            return Ok(TypeSpec::Scalar(name));
        }

        let spec = match name.as_str() {
            "frozen" => self.parse_type()?,
            "set" => TypeSpec::set(self.parse_type()?),
            "list" => TypeSpec::list(self.parse_type()?),
            "map" => {
                let key = self.parse_type()?;
                self.skip_whitespace();
                if !self.eat(b',') {
                    return Err(self.error("expected ',' between map key and value types"));
                }
                let value = self.parse_type()?;
                TypeSpec::map(key, value)
            }
            other => return Err(self.error(&format!("unknown generic type '{other}'"))),
        };

        self.skip_whitespace();
        if !self.eat(b'>') {
            return Err(self.error("expected '>'"));
        }
        Ok(spec)
    }

    fn identifier(&mut self) -> Result<String, TypeError> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a type name"));
        }
        Ok(self.input[start..self.pos].to_ascii_lowercase())
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> TypeError {
        TypeError::new(self.input, format!("{message} at offset {}", self.pos))
    }
}

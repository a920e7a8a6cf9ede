//! Property filter expressions.
//!
//! Parenthesized prefix syntax evaluated against publication properties:
//! `(key=value)` equality, `(key=*)` presence, `(&...)` conjunction,
//! `(|...)` disjunction, `(!...)` negation.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
	/// Property equals the literal value.
	Equals(String, String),
	/// Property is present, whatever its value.
	Present(String),
	/// All sub-filters match.
	And(Vec<Filter>),
	/// At least one sub-filter matches.
	Or(Vec<Filter>),
	/// The sub-filter does not match.
	Not(Box<Filter>),
}

/// Filter syntax error, reported with the byte offset of the offending input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterParseError {
	#[error("unexpected end of filter expression")]
	UnexpectedEnd,
	#[error("expected '(' at byte {0}")]
	ExpectedOpen(usize),
	#[error("expected ')' at byte {0}")]
	ExpectedClose(usize),
	#[error("empty attribute name at byte {0}")]
	EmptyKey(usize),
	#[error("missing '=' in comparison at byte {0}")]
	MissingComparator(usize),
	#[error("operator '{1}' needs at least one operand at byte {0}")]
	EmptyOperator(usize, char),
	#[error("trailing input after filter at byte {0}")]
	Trailing(usize),
}

impl Filter {
	/// Parses a filter expression, validating the syntax.
	pub fn parse(input: &str) -> Result<Self, FilterParseError> {
		let mut parser = Parser {
			bytes: input.as_bytes(),
			pos: 0,
		};
		parser.skip_ws();
		let filter = parser.filter()?;
		parser.skip_ws();
		if parser.pos != parser.bytes.len() {
			return Err(FilterParseError::Trailing(parser.pos));
		}
		Ok(filter)
	}

	/// Evaluates the filter against a property map.
	pub fn matches(&self, properties: &BTreeMap<String, String>) -> bool {
		match self {
			Self::Equals(key, value) => properties.get(key).is_some_and(|v| v == value),
			Self::Present(key) => properties.contains_key(key),
			Self::And(subs) => subs.iter().all(|f| f.matches(properties)),
			Self::Or(subs) => subs.iter().any(|f| f.matches(properties)),
			Self::Not(sub) => !sub.matches(properties),
		}
	}
}

impl FromStr for Filter {
	type Err = FilterParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl fmt::Display for Filter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Equals(key, value) => write!(f, "({key}={value})"),
			Self::Present(key) => write!(f, "({key}=*)"),
			Self::And(subs) => {
				f.write_str("(&")?;
				for sub in subs {
					write!(f, "{sub}")?;
				}
				f.write_str(")")
			}
			Self::Or(subs) => {
				f.write_str("(|")?;
				for sub in subs {
					write!(f, "{sub}")?;
				}
				f.write_str(")")
			}
			Self::Not(sub) => write!(f, "(!{sub})"),
		}
	}
}

struct Parser<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl Parser<'_> {
	fn skip_ws(&mut self) {
		while self.bytes.get(self.pos).is_some_and(u8::is_ascii_whitespace) {
			self.pos += 1;
		}
	}

	fn peek(&self) -> Option<u8> {
		self.bytes.get(self.pos).copied()
	}

	fn filter(&mut self) -> Result<Filter, FilterParseError> {
		match self.peek() {
			Some(b'(') => self.pos += 1,
			Some(_) => return Err(FilterParseError::ExpectedOpen(self.pos)),
			None => return Err(FilterParseError::UnexpectedEnd),
		}
		let filter = match self.peek() {
			Some(b'&') => {
				self.pos += 1;
				Filter::And(self.operands(b'&')?)
			}
			Some(b'|') => {
				self.pos += 1;
				Filter::Or(self.operands(b'|')?)
			}
			Some(b'!') => {
				self.pos += 1;
				self.skip_ws();
				Filter::Not(Box::new(self.filter()?))
			}
			Some(_) => self.comparison()?,
			None => return Err(FilterParseError::UnexpectedEnd),
		};
		self.skip_ws();
		match self.peek() {
			Some(b')') => self.pos += 1,
			Some(_) => return Err(FilterParseError::ExpectedClose(self.pos)),
			None => return Err(FilterParseError::UnexpectedEnd),
		}
		Ok(filter)
	}

	fn operands(&mut self, op: char) -> Result<Vec<Filter>, FilterParseError> {
		let start = self.pos;
		let mut subs = Vec::new();
		loop {
			self.skip_ws();
			match self.peek() {
				Some(b'(') => subs.push(self.filter()?),
				_ => break,
			}
		}
		if subs.is_empty() {
			return Err(FilterParseError::EmptyOperator(start, op));
		}
		Ok(subs)
	}

	fn comparison(&mut self) -> Result<Filter, FilterParseError> {
		let key_start = self.pos;
		while self
			.peek()
			.is_some_and(|b| b != b'=' && b != b')' && b != b'(')
		{
			self.pos += 1;
		}
		let key = std::str::from_utf8(&self.bytes[key_start..self.pos])
			.expect("slicing on ascii boundaries")
			.trim();
		if key.is_empty() {
			return Err(FilterParseError::EmptyKey(key_start));
		}
		match self.peek() {
			Some(b'=') => self.pos += 1,
			Some(_) => return Err(FilterParseError::MissingComparator(self.pos)),
			None => return Err(FilterParseError::UnexpectedEnd),
		}
		let value_start = self.pos;
		while self.peek().is_some_and(|b| b != b')') {
			self.pos += 1;
		}
		let value = std::str::from_utf8(&self.bytes[value_start..self.pos])
			.expect("slicing on ascii boundaries")
			.trim();
		if value == "*" {
			Ok(Filter::Present(key.to_string()))
		} else {
			Ok(Filter::Equals(key.to_string(), value.to_string()))
		}
	}
}

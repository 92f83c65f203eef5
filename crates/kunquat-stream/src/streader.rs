//! A JSON-subset pull parser over persisted-state documents.
//!
//! Grounded on `original_source/src/lib/string/Streader.c`: a cursor over
//! the input text that tracks a line number for diagnostics, reads one
//! value at a time rather than building a DOM, and can be rewound to a
//! marked position — the expression evaluator uses that to speculatively
//! parse a function argument and back out if it turns out to be followed
//! by something other than `,` or `)`.

use kunquat_core::{ErrorKind, KindedError, Tstamp};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[error("{message} (line {line})")]
pub struct StreamError {
    pub message: String,
    pub line: u32,
    pub kind: ErrorKind,
}

impl StreamError {
    fn format(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
            kind: ErrorKind::Format,
        }
    }
}

impl KindedError for StreamError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

/// A value produced by the generic [`Streader::read_value`] dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Tstamp(Tstamp),
    PatInst(i64, i64),
    List(Vec<JsonValue>),
    Dict(Vec<(String, JsonValue)>),
}

/// A saved cursor position, restorable with [`Streader::reset`].
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pos: usize,
    line: u32,
}

pub struct Streader<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
}

impl<'a> Streader<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
        }
    }

    pub fn reset(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.line = mark.line;
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c == b' ' || c == b'\t' || c == b'\r' || c == b'\n' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn err(&self, message: impl Into<String>) -> StreamError {
        StreamError::format(message, self.line)
    }

    fn expect_byte(&mut self, expected: u8) -> StreamResult<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.err(format!(
                "expected '{}', found '{}'",
                expected as char, c as char
            ))),
            None => Err(self.err(format!("expected '{}', found end of input", expected as char))),
        }
    }

    fn expect_literal(&mut self, literal: &str) -> StreamResult<()> {
        self.skip_ws();
        if self.input[self.pos..].starts_with(literal) {
            for _ in 0..literal.len() {
                self.bump();
            }
            Ok(())
        } else {
            Err(self.err(format!("expected literal `{literal}`")))
        }
    }

    /// Ensure nothing but whitespace remains — catches trailing garbage
    /// after a scalar value (`null xyz`, `42abc`, ...).
    pub fn finish(&mut self) -> StreamResult<()> {
        self.skip_ws();
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(self.err("trailing garbage after value"))
        }
    }

    pub fn read_null(&mut self) -> StreamResult<()> {
        self.expect_literal("null")
    }

    pub fn read_bool(&mut self) -> StreamResult<bool> {
        self.skip_ws();
        if self.input[self.pos..].starts_with("true") {
            for _ in 0.."true".len() {
                self.bump();
            }
            Ok(true)
        } else if self.input[self.pos..].starts_with("false") {
            for _ in 0.."false".len() {
                self.bump();
            }
            Ok(false)
        } else {
            Err(self.err("expected boolean literal"))
        }
    }

    /// Read a signed 64-bit integer, rejecting magnitude overflow instead
    /// of silently wrapping.
    pub fn read_int(&mut self) -> StreamResult<i64> {
        self.skip_ws();
        let start_line = self.line;
        let negative = self.peek() == Some(b'-');
        if negative {
            self.bump();
        }
        let digit_start = self.pos;
        let mut value: i64 = 0;
        let mut any_digit = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                any_digit = true;
                let digit = (c - b'0') as i64;
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| StreamError::format("integer overflow", start_line))?;
                self.bump();
            } else {
                break;
            }
        }
        if !any_digit {
            return Err(self.err("expected integer"));
        }
        // Reject a fractional/exponent suffix: that is a float, not an int.
        if matches!(self.peek(), Some(b'.') | Some(b'e') | Some(b'E')) {
            return Err(self.err("integer literal followed by fractional part"));
        }
        if negative && digit_start == self.pos {
            return Err(self.err("expected integer"));
        }
        Ok(if negative { -value } else { value })
    }

    /// Read an IEEE-754 double using an explicit digit-by-digit parse
    /// rather than delegating to a platform `strtod`, so the result is
    /// identical across hosts regardless of locale settings.
    pub fn read_float(&mut self) -> StreamResult<f64> {
        self.skip_ws();
        let start_line = self.line;
        let negative = self.peek() == Some(b'-');
        if negative {
            self.bump();
        }

        let mut mantissa: f64 = 0.0;
        let mut any_digit = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                mantissa = mantissa * 10.0 + (c - b'0') as f64;
                any_digit = true;
                self.bump();
            } else {
                break;
            }
        }

        let mut frac_digits = 0u32;
        if self.peek() == Some(b'.') {
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    mantissa = mantissa * 10.0 + (c - b'0') as f64;
                    frac_digits += 1;
                    any_digit = true;
                    self.bump();
                } else {
                    break;
                }
            }
        }

        if !any_digit {
            return Err(StreamError::format("expected number", start_line));
        }

        let mut value = mantissa / 10f64.powi(frac_digits as i32);

        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.bump();
            let exp_negative = match self.peek() {
                Some(b'-') => {
                    self.bump();
                    true
                }
                Some(b'+') => {
                    self.bump();
                    false
                }
                _ => false,
            };
            let mut exponent: i32 = 0;
            let mut exp_any = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    exponent = exponent * 10 + (c - b'0') as i32;
                    exp_any = true;
                    self.bump();
                } else {
                    break;
                }
            }
            if !exp_any {
                return Err(self.err("expected exponent digits"));
            }
            let exponent = if exp_negative { -exponent } else { exponent };
            value *= 10f64.powi(exponent);
        }

        Ok(if negative { -value } else { value })
    }

    /// Read a quoted string, resolving escapes. `\uXXXX` is restricted to
    /// `[U+0020, U+007E]` (printable ASCII) as the original format does not
    /// need to round-trip arbitrary Unicode through this escape.
    pub fn read_string(&mut self) -> StreamResult<String> {
        self.expect_byte(b'"')?;
        let mut out = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| self.err("unterminated string"))?;
            match c {
                b'"' => break,
                b'\\' => {
                    let esc = self
                        .bump()
                        .ok_or_else(|| self.err("unterminated escape"))?;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{0008}'),
                        b'f' => out.push('\u{000C}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let mut code: u32 = 0;
                            for _ in 0..4 {
                                let h = self
                                    .bump()
                                    .ok_or_else(|| self.err("truncated \\u escape"))?;
                                let digit = (h as char)
                                    .to_digit(16)
                                    .ok_or_else(|| self.err("invalid \\u escape digit"))?;
                                code = code * 16 + digit;
                            }
                            if !(0x20..=0x7E).contains(&code) {
                                return Err(self.err(format!(
                                    "\\u escape outside [U+0020, U+007E]: U+{code:04X}"
                                )));
                            }
                            out.push(char::from_u32(code).unwrap());
                        }
                        other => {
                            return Err(self.err(format!("invalid escape '\\{}'", other as char)))
                        }
                    }
                }
                _ => {
                    // Re-decode the UTF-8 sequence starting at this byte.
                    let start = self.pos - 1;
                    let rest = &self.input[start..];
                    let ch = rest.chars().next().unwrap();
                    let len = ch.len_utf8();
                    for _ in 1..len {
                        self.bump();
                    }
                    out.push(ch);
                }
            }
        }
        Ok(out)
    }

    /// Read a `[beats, rem]` pair.
    pub fn read_tstamp(&mut self) -> StreamResult<Tstamp> {
        self.expect_byte(b'[')?;
        let beats = self.read_int()?;
        self.expect_byte(b',')?;
        let rem = self.read_int()?;
        self.expect_byte(b']')?;
        let rem = i32::try_from(rem).map_err(|_| self.err("tstamp rem out of range"))?;
        Tstamp::try_new(beats, rem).ok_or_else(|| self.err("tstamp rem out of [0, BEAT) range"))
    }

    /// Read a `[pattern, instance]` reference.
    pub fn read_pat_inst(&mut self) -> StreamResult<(i64, i64)> {
        self.expect_byte(b'[')?;
        let pat = self.read_int()?;
        self.expect_byte(b',')?;
        let inst = self.read_int()?;
        self.expect_byte(b']')?;
        Ok((pat, inst))
    }

    /// Read a JSON-subset list, invoking `f` once per element.
    pub fn read_list<F>(&mut self, mut f: F) -> StreamResult<()>
    where
        F: FnMut(&mut Streader<'a>) -> StreamResult<()>,
    {
        self.expect_byte(b'[')?;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.bump();
            return Ok(());
        }
        loop {
            f(self)?;
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                Some(b']') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.err("expected ',' or ']'")),
            }
        }
        Ok(())
    }

    /// Read a JSON-subset dict, invoking `f` with the cursor positioned
    /// right after `key:` for each entry.
    pub fn read_dict<F>(&mut self, mut f: F) -> StreamResult<()>
    where
        F: FnMut(&mut Streader<'a>, &str) -> StreamResult<()>,
    {
        self.expect_byte(b'{')?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.bump();
            return Ok(());
        }
        loop {
            let key = self.read_string()?;
            self.expect_byte(b':')?;
            f(self, &key)?;
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                Some(b'}') => {
                    self.bump();
                    break;
                }
                _ => return Err(self.err("expected ',' or '}'")),
            }
        }
        Ok(())
    }

    /// Generic dispatch used when the schema of the next value is not
    /// known ahead of time. Two-element numeric arrays are reported as
    /// plain lists; callers that know the slot holds a `Tstamp` or a
    /// pattern-instance ref should call the targeted readers instead.
    pub fn read_value(&mut self) -> StreamResult<JsonValue> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.err("expected value, found end of input")),
            Some(b'n') => {
                self.read_null()?;
                Ok(JsonValue::Null)
            }
            Some(b't') | Some(b'f') => Ok(JsonValue::Bool(self.read_bool()?)),
            Some(b'"') => Ok(JsonValue::Str(self.read_string()?)),
            Some(b'[') => {
                let mut items = Vec::new();
                self.read_list(|s| {
                    items.push(s.read_value()?);
                    Ok(())
                })?;
                Ok(JsonValue::List(items))
            }
            Some(b'{') => {
                let mut entries = Vec::new();
                self.read_dict(|s, key| {
                    entries.push((key.to_string(), s.read_value()?));
                    Ok(())
                })?;
                Ok(JsonValue::Dict(entries))
            }
            Some(c) if c == b'-' || c.is_ascii_digit() => {
                let mark = self.mark();
                if let Ok(i) = self.read_int() {
                    return Ok(JsonValue::Int(i));
                }
                self.reset(mark);
                Ok(JsonValue::Float(self.read_float()?))
            }
            Some(c) => Err(self.err(format!("unexpected character '{}'", c as char))),
        }
    }

    /// Peek the next significant byte without consuming it (used by
    /// callers disambiguating a schema-known slot, e.g. the expression
    /// evaluator peeking for a string literal vs a number).
    pub fn peek_significant(&mut self) -> Option<u8> {
        self.skip_ws();
        self.peek()
    }

    pub(crate) fn peek_raw_at(&self, offset: usize) -> Option<u8> {
        self.peek_at(offset)
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn source(&self) -> &'a str {
        self.input
    }

    pub(crate) fn advance_to(&mut self, pos: usize) {
        while self.pos < pos {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_canonical_values() {
        assert!(Streader::new("null").read_null().is_ok());
        assert_eq!(Streader::new("true").read_bool().unwrap(), true);
        assert_eq!(Streader::new("false").read_bool().unwrap(), false);
        assert_eq!(Streader::new("-1234").read_int().unwrap(), -1234);
        assert_eq!(Streader::new("3.5").read_float().unwrap(), 3.5);
        assert_eq!(Streader::new("1.5e2").read_float().unwrap(), 150.0);
        assert_eq!(Streader::new("\"hi\"").read_string().unwrap(), "hi");
    }

    #[test]
    fn int_overflow_is_rejected() {
        let mut s = Streader::new("9223372036854775808"); // i64::MAX + 1
        assert!(s.read_int().is_err());
    }

    #[test]
    fn unicode_escape_outside_ascii_range_rejected() {
        let mut s = Streader::new("\"\\u0041\""); // 'A', allowed
        assert!(s.read_string().is_ok());
        let mut s2 = Streader::new("\"\\u00e9\""); // beyond 0x7E
        assert!(s2.read_string().is_err());
        let mut s3 = Streader::new("\"\\u0019\""); // below 0x20
        assert!(s3.read_string().is_err());
    }

    #[test]
    fn trailing_garbage_rejected() {
        let mut s = Streader::new("null garbage");
        s.read_null().unwrap();
        assert!(s.finish().is_err());

        let mut s = Streader::new("42abc");
        assert!(s.read_int().is_err());
    }

    #[test]
    fn tstamp_roundtrip() {
        let mut s = Streader::new("[16, 0]");
        let t = s.read_tstamp().unwrap();
        assert_eq!(t, Tstamp::new(16, 0));
    }

    #[test]
    fn mark_and_reset_restores_position() {
        let mut s = Streader::new("123, 456");
        let mark = s.mark();
        let first = s.read_int().unwrap();
        assert_eq!(first, 123);
        s.reset(mark);
        let again = s.read_int().unwrap();
        assert_eq!(again, 123);
    }

    #[test]
    fn list_visitor_collects_elements() {
        let mut s = Streader::new("[1, 2, 3]");
        let mut values = Vec::new();
        s.read_list(|r| {
            values.push(r.read_int()?);
            Ok(())
        })
        .unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn dict_visitor_collects_entries() {
        let mut s = Streader::new(r#"{"a": 1, "b": 2}"#);
        let mut entries = Vec::new();
        s.read_dict(|r, key| {
            entries.push((key.to_string(), r.read_int()?));
            Ok(())
        })
        .unwrap();
        assert_eq!(entries, vec![("a".to_string(), 1), ("b".to_string(), 2)]);
    }

    #[test]
    fn line_numbers_track_newlines() {
        let mut s = Streader::new("{\n  \"a\": badvalue\n}");
        let result: StreamResult<()> = s.read_dict(|r, _key| {
            r.read_null() // fails: "badvalue" isn't null
        });
        let err = result.unwrap_err();
        assert_eq!(err.line, 2);
    }
}

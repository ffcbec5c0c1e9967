//! Request header parsing for `-H "Name: Value"` flags.

use crate::error::{Error, Result};

/// Default User-Agent sent when the caller does not provide one.
pub const DEFAULT_USER_AGENT: &str = concat!("specter-probe/", env!("CARGO_PKG_VERSION"));

/// Extra request headers, unique by (case-insensitive) name.
///
/// Insertion order is kept so the wire output is predictable, but it has no
/// meaning for either HTTP version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, String)>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse every raw `Name: Value` string. A later duplicate name replaces
    /// the earlier value.
    pub fn parse_all<I, S>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut headers = Self::new();
        for line in raw {
            let (name, value) = parse_header(line.as_ref())?;
            headers.set(name, value);
        }
        Ok(headers)
    }

    /// Insert or replace a header.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse one `Name: Value` string.
///
/// Accepts `^([\w-]+):\s*(.+)`: the name is ASCII letters, digits, `_` and
/// `-`; whitespace after the colon is skipped; the value is the rest of the
/// line. Something must follow the colon, but whitespace alone is enough and
/// yields an empty value (`X-Empty:  ` sends `X-Empty: `).
pub fn parse_header(input: &str) -> Result<(String, String)> {
    let invalid = || Error::input(format!("invalid header {:?}: expected \"Name: Value\"", input));

    let (name, rest) = input.split_once(':').ok_or_else(invalid)?;
    if name.is_empty() || !name.bytes().all(is_word_byte) {
        return Err(invalid());
    }

    // `.` stops at a line break
    let rest = rest.split(['\n', '\r']).next().unwrap_or_default();
    if rest.is_empty() {
        return Err(invalid());
    }

    Ok((name.to_string(), rest.trim_start().to_string()))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

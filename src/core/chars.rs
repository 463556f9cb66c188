//! Character classes for identifier fields.
//!
//! Every class carries three byte predicates (first, interior, last) plus an
//! optional whole-capture structure check; `fqdn` is the only class with
//! structure (non-empty dot-separated labels). Inputs are 7-bit ASCII; callers
//! lower-case everything first when running case-insensitively.

use serde::Serialize;

/// The five identifier classes a `%field%` can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Alpha,
    Number,
    Alnum,
    Ident,
    Fqdn,
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

impl CharClass {
    pub fn parse(name: &str) -> Option<CharClass> {
        match name {
            "alpha" => Some(CharClass::Alpha),
            "number" => Some(CharClass::Number),
            "alnum" => Some(CharClass::Alnum),
            "ident" => Some(CharClass::Ident),
            "fqdn" => Some(CharClass::Fqdn),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CharClass::Alpha => "alpha",
            CharClass::Number => "number",
            CharClass::Alnum => "alnum",
            CharClass::Ident => "ident",
            CharClass::Fqdn => "fqdn",
        }
    }

    /// May `b` open a capture of this class?
    pub fn first(self, b: u8) -> bool {
        match self {
            CharClass::Alpha => b.is_ascii_alphabetic(),
            CharClass::Number => b.is_ascii_digit(),
            CharClass::Alnum => is_alnum(b),
            CharClass::Ident => is_alnum(b) || b == b'_',
            CharClass::Fqdn => is_alnum(b),
        }
    }

    /// May `b` appear strictly inside a capture of this class?
    pub fn interior(self, b: u8) -> bool {
        match self {
            CharClass::Alpha => b.is_ascii_alphabetic(),
            CharClass::Number => b.is_ascii_digit(),
            CharClass::Alnum => is_alnum(b),
            CharClass::Ident => is_alnum(b) || b == b'_' || b == b'-',
            CharClass::Fqdn => is_alnum(b) || b == b'-' || b == b'.',
        }
    }

    /// May `b` close a capture of this class?
    pub fn last(self, b: u8) -> bool {
        match self {
            CharClass::Fqdn => is_alnum(b),
            _ => self.first(b),
        }
    }

    /// Full membership test for a candidate capture. Empty captures never match.
    pub fn accepts(self, s: &str) -> bool {
        let bytes = s.as_bytes();
        let (first, rest) = match bytes.split_first() {
            Some(pair) => pair,
            None => return false,
        };
        let last = bytes[bytes.len() - 1];
        if !self.first(*first) || !self.last(last) {
            return false;
        }
        if rest.len() > 1 && !rest[..rest.len() - 1].iter().all(|&b| self.interior(b)) {
            return false;
        }
        match self {
            CharClass::Fqdn => fqdn_labels(s).is_some(),
            _ => true,
        }
    }
}

/// Split an fqdn capture into labels, or `None` if the structure is invalid:
/// labels must be non-empty and contain only alphanumerics and dashes.
pub fn fqdn_labels(s: &str) -> Option<Vec<&str>> {
    let labels: Vec<&str> = s.split('.').collect();
    for label in &labels {
        if label.is_empty() {
            return None;
        }
        if !label.bytes().all(|b| is_alnum(b) || b == b'-') {
            return None;
        }
    }
    Some(labels)
}

pub fn is_vowel(b: u8) -> bool {
    matches!(b.to_ascii_lowercase(), b'a' | b'e' | b'i' | b'o' | b'u')
}

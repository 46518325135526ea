//! Text probes and case policies for [`StringDictionary`].
//!
//! A probe is anything that can yield its characters: `str`, `String` or a
//! borrowed `[char]` slice. Hashing and equality both walk the folded
//! character stream, so a `&[char]` probe hashes exactly like the `str`
//! holding the same text and nothing is allocated on lookup.
//!
//! [`StringDictionary`]: crate::StringDictionary

use core::fmt;
use core::hash::{BuildHasher, Hasher};
use core::str::FromStr;

use crate::HASH_MASK;

/// Comparison policy of a dictionary, fixed at construction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CaseSensitivity {
    /// Characters compare by code point.
    #[default]
    Ordinal,
    /// Characters compare by their simple uppercase mapping, one char to one
    /// char. Characters whose uppercase form is longer (`ß`, `ﬁ`) only
    /// match themselves.
    IgnoreCase,
}

impl CaseSensitivity {
    /// Folded character stream of `chars` under this policy.
    pub fn fold<I>(self, chars: I) -> Folded<I>
    where
        I: Iterator<Item = char>,
    {
        Folded {
            chars,
            policy: self,
        }
    }

    /// Equality of two probes under this policy.
    pub fn equals<A, B>(self, a: &A, b: &B) -> bool
    where
        A: TextKey + ?Sized,
        B: TextKey + ?Sized,
    {
        match self {
            CaseSensitivity::Ordinal => a.text_chars().eq(b.text_chars()),
            CaseSensitivity::IgnoreCase => self.fold(a.text_chars()).eq(self.fold(b.text_chars())),
        }
    }

    /// 31-bit hash code of a probe under this policy.
    pub fn hash_code<T, S>(self, build: &S, key: &T) -> u32
    where
        T: TextKey + ?Sized,
        S: BuildHasher,
    {
        let mut h = build.build_hasher();
        for c in self.fold(key.text_chars()) {
            h.write_u32(c as u32);
        }
        (h.finish() as u32) & HASH_MASK
    }
}

impl fmt::Display for CaseSensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CaseSensitivity::Ordinal => "ordinal",
            CaseSensitivity::IgnoreCase => "ignore-case",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown case sensitivity: {0}")]
pub struct ParseCaseSensitivityError(String);

impl FromStr for CaseSensitivity {
    type Err = ParseCaseSensitivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinal" => Ok(CaseSensitivity::Ordinal),
            "ignore-case" | "ignore_case" => Ok(CaseSensitivity::IgnoreCase),
            _ => Err(ParseCaseSensitivityError(s.to_owned())),
        }
    }
}

/// Character stream folded through a [`CaseSensitivity`].
#[derive(Clone)]
pub struct Folded<I> {
    chars: I,
    policy: CaseSensitivity,
}

impl<I> Iterator for Folded<I>
where
    I: Iterator<Item = char>,
{
    type Item = char;

    #[inline]
    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        Some(match self.policy {
            CaseSensitivity::Ordinal => c,
            CaseSensitivity::IgnoreCase => simple_uppercase(c),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chars.size_hint()
    }
}

/// Uppercase of `c` when it is a single char, otherwise `c` itself.
#[inline]
fn simple_uppercase(c: char) -> char {
    if c.is_ascii() {
        return c.to_ascii_uppercase();
    }
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}

/// A borrowed view of text usable as a dictionary probe.
pub trait TextKey {
    type Chars<'a>: Iterator<Item = char>
    where
        Self: 'a;

    fn text_chars(&self) -> Self::Chars<'_>;

    /// Owned rendering, only built for error messages.
    fn to_text(&self) -> String {
        self.text_chars().collect()
    }
}

impl TextKey for str {
    type Chars<'a> = core::str::Chars<'a>;

    #[inline]
    fn text_chars(&self) -> Self::Chars<'_> {
        self.chars()
    }

    fn to_text(&self) -> String {
        self.to_owned()
    }
}

impl TextKey for String {
    type Chars<'a> = core::str::Chars<'a>;

    #[inline]
    fn text_chars(&self) -> Self::Chars<'_> {
        self.chars()
    }

    fn to_text(&self) -> String {
        self.clone()
    }
}

impl TextKey for [char] {
    type Chars<'a> = core::iter::Copied<core::slice::Iter<'a, char>>;

    #[inline]
    fn text_chars(&self) -> Self::Chars<'_> {
        self.iter().copied()
    }
}

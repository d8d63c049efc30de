//! Interned names.

use std::fmt::{Debug, Display};
use std::sync::OnceLock;

use lasso::ThreadedRodeo;

/// An interned identifier.
///
/// Names are `u32` indices into a process-wide interner, so equality and
/// hashing never touch the underlying string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(u32);

// SAFETY: `Name` wraps a `u32`, and `try_from_usize` rejects values that do not fit.
unsafe impl lasso::Key for Name {
    fn into_usize(self) -> usize {
        self.0 as usize
    }

    fn try_from_usize(int: usize) -> Option<Self> {
        u32::try_from(int).ok().map(Name)
    }
}

fn interner() -> &'static ThreadedRodeo<Name> {
    static INTERNER: OnceLock<ThreadedRodeo<Name>> = OnceLock::new();
    INTERNER.get_or_init(ThreadedRodeo::new)
}

impl Name {
    /// Interns `s`, returning the existing name if it was seen before.
    pub fn new(s: impl AsRef<str>) -> Self {
        interner().get_or_intern(s.as_ref())
    }

    /// Returns the name if `s` has already been interned.
    pub fn get(s: &str) -> Option<Self> {
        interner().get(s)
    }

    /// The string this name was interned from.
    pub fn as_str(self) -> &'static str {
        interner().resolve(&self)
    }

    /// Returns `true` if this is the empty name.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.as_str().is_empty()
    }

    /// The raw interner index.
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&String> for Name {
    fn from(value: &String) -> Self {
        Self::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let a = Name::new("vdd");
        let b = Name::new(String::from("vdd"));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "vdd");
        assert_ne!(a, Name::new("vss"));
        assert!(Name::new("").is_empty());
    }
}

//! # Label Compiler
//!
//! Immutable builder that merges process-wide default labels or annotations
//! with call-site overrides.

use std::collections::BTreeMap;

/// Metadata map compiler
///
/// `defaults` returns a new compiler and never mutates the receiver, so one
/// compiler can be shared by every reconciler instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compiler {
    defaults: BTreeMap<String, String>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new compiler with `defaults` merged over the existing defaults
    #[must_use]
    pub fn defaults<I, K, V>(&self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut merged = self.defaults.clone();
        merged.extend(defaults.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self { defaults: merged }
    }

    /// Defaults merged with `overrides`; overrides win on collision
    pub fn compile<I, K, V>(&self, overrides: I) -> BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut compiled = self.defaults.clone();
        compiled.extend(overrides.into_iter().map(|(k, v)| (k.into(), v.into())));
        compiled
    }
}

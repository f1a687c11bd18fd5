//! Placeholder vault.
//!
//! Lets a rewrite pass hand-cook a markdown fragment and park it behind an
//! opaque key, so later passes that only expect HTML (and would happily
//! mangle `> quote` lines or `[u]` tags) never see it. The protocol is
//! create, store any number of times, apply exactly once, discard.

use miette::Diagnostic;
use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;

/// Length of a generated key.
pub const KEY_LEN: usize = 32;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// A stored key never reached `apply`: some pass between `store` and
    /// `apply` dropped or split it.
    #[error("{} placeholder(s) were lost before the vault was drained", keys.len())]
    #[diagnostic(
        code(ferry_core::vault::orphaned),
        help("A rewrite pass running after the placeholder was stored removed it; check pass ordering")
    )]
    Orphaned {
        keys: Vec<String>,
        /// Output with every surviving key restored.
        text: String,
    },
}

/// Per-body store of protected fragments.
#[derive(Debug, Default)]
pub struct PlaceholderVault {
    entries: Vec<(String, String)>,
}

impl PlaceholderVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `literal` to a fresh key and return the key to splice into the text.
    pub fn store(&mut self, literal: impl Into<String>) -> String {
        let key = generate_key();
        self.entries.push((key.clone(), literal.into()));
        key
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Restore the keys found in `text` and forget them, leaving every other
    /// binding for [`apply`](Self::apply).
    ///
    /// For a pass that is about to re-template a fragment line by line: a key
    /// hiding a multi-line literal would otherwise miss the new prefix.
    pub fn expand(&mut self, text: &str) -> String {
        let mut out = text.to_string();
        let mut index = self.entries.len();
        while index > 0 {
            index -= 1;
            if out.contains(&self.entries[index].0) {
                let (key, literal) = self.entries.remove(index);
                out = out.replace(&key, &literal);
            }
        }
        out
    }

    /// Restore every stored literal and clear the vault.
    ///
    /// Keys are replaced newest first: a literal stored later may contain keys
    /// stored earlier (a quote wrapping an underline), and those must be
    /// restored inside the re-inserted literal too. Any key that never shows up
    /// is reported as [`VaultError::Orphaned`].
    pub fn apply(&mut self, text: &str) -> Result<String, VaultError> {
        let mut out = text.to_string();
        let mut orphaned = Vec::new();

        for (key, literal) in self.entries.drain(..).rev() {
            if out.contains(&key) {
                out = out.replace(&key, &literal);
            } else {
                orphaned.push(key);
            }
        }

        if orphaned.is_empty() {
            Ok(out)
        } else {
            Err(VaultError::Orphaned {
                keys: orphaned,
                text: out,
            })
        }
    }
}

fn generate_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_keys_are_fixed_length_alphanumeric() {
        let mut vault = PlaceholderVault::new();
        let a = vault.store("x");
        let b = vault.store("x");
        assert_eq!(a.len(), KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_apply_restores_and_clears() {
        let mut vault = PlaceholderVault::new();
        let key = vault.store("[u]under[/u]");
        let text = format!("before {key} after {key}");

        let out = vault.apply(&text).unwrap();
        assert_eq!(out, "before [u]under[/u] after [u]under[/u]");
        assert!(vault.is_empty());

        // A drained vault leaves text alone.
        assert_eq!(vault.apply(&text).unwrap(), text);
    }

    #[test]
    fn test_nested_literals() {
        let mut vault = PlaceholderVault::new();
        let inner = vault.store("[u]x[/u]");
        let outer = vault.store(format!("\n> quoted {inner}\n"));

        let out = vault.apply(&format!("a{outer}b")).unwrap();
        assert_eq!(out, "a\n> quoted [u]x[/u]\nb");
    }

    #[test]
    fn test_expand_restores_only_present_keys() {
        let mut vault = PlaceholderVault::new();
        let inner = vault.store("[u]x[/u]");
        let quote = vault.store(format!("\n[quote]\n{inner}\n[/quote]\n"));
        let other = vault.store("```code```");

        let expanded = vault.expand(&format!("see {quote}"));
        assert_eq!(expanded, "see \n[quote]\n[u]x[/u]\n[/quote]\n");
        assert_eq!(vault.len(), 1);

        let out = vault.apply(&format!("{expanded} {other}")).unwrap();
        assert!(out.ends_with(" ```code```"));
    }

    #[test]
    fn test_orphaned_key_is_reported() {
        let mut vault = PlaceholderVault::new();
        let kept = vault.store("kept");
        let lost = vault.store("lost");

        let err = vault.apply(&format!("only {kept}")).unwrap_err();
        match err {
            VaultError::Orphaned { keys, text } => {
                assert_eq!(keys, vec![lost]);
                assert_eq!(text, "only kept");
            }
        }
    }

    proptest! {
        #[test]
        fn prop_drain_leaves_no_keys(
            segments in proptest::collection::vec(("[^\\x00]{0,20}", "[^\\x00]{0,20}"), 0..8)
        ) {
            let mut vault = PlaceholderVault::new();
            let mut text = String::new();
            let mut expected = String::new();
            let mut keys = Vec::new();

            for (plain, literal) in &segments {
                let key = vault.store(literal.clone());
                text.push_str(plain);
                text.push_str(&key);
                expected.push_str(plain);
                expected.push_str(literal);
                keys.push(key);
            }

            let out = vault.apply(&text).unwrap();
            prop_assert_eq!(&out, &expected);
            for key in &keys {
                prop_assert!(!out.contains(key.as_str()));
            }
        }
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! DOM element id assignment for script elements.
//!
//! By default a descriptor's element id is `<prefix><descriptor id>`
//! (`c15t-script-<id>`).  When anonymisation is requested the id is an opaque
//! token drawn from a [`TokenSource`], memoised per descriptor id for the
//! lifetime of the owning loader, so a script keeps the same element id across
//! unmount / remount while the id reveals nothing about the vendor.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;

use hashbrown::{HashMap, HashSet};

/// Draw attempts before a colliding token is disambiguated with a counter.
const MAX_DRAWS: usize = 8;

/// Supplies fresh opaque tokens for anonymised element ids.
///
/// Tokens must be valid HTML ids and must not be derived from the descriptor
/// id.
pub trait TokenSource {
    /// Produce the next token.
    fn next_token(&mut self) -> String;
}

/// Random tokens: `"s"` followed by 12 lowercase alphanumerics.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::element_id::{RandomTokens, TokenSource};
///
/// let mut tokens = RandomTokens::seeded(7);
/// let token = tokens.next_token();
/// assert_eq!(token.len(), 13);
/// assert!(token.starts_with('s'));
/// ```
#[cfg(feature = "std")]
pub struct RandomTokens {
    rng: rand::rngs::StdRng,
}

#[cfg(feature = "std")]
impl RandomTokens {
    const CHARSET: &'static [u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    const LEN: usize = 12;

    /// Tokens seeded from OS entropy.
    pub fn new() -> Self {
        use rand::SeedableRng;
        Self { rng: rand::rngs::StdRng::from_entropy() }
    }

    /// Deterministic tokens for tests and benchmarks.
    pub fn seeded(seed: u64) -> Self {
        use rand::SeedableRng;
        Self { rng: rand::rngs::StdRng::seed_from_u64(seed) }
    }
}

#[cfg(feature = "std")]
impl Default for RandomTokens {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TokenSource for RandomTokens {
    fn next_token(&mut self) -> String {
        use rand::Rng;
        let mut token = String::with_capacity(Self::LEN + 1);
        token.push('s');
        for _ in 0..Self::LEN {
            let index = self.rng.gen_range(0..Self::CHARSET.len());
            token.push(Self::CHARSET[index] as char);
        }
        token
    }
}

/// Resolves descriptor ids to element ids for one loader.
pub struct ElementIds {
    prefix: String,
    anonymized: HashMap<String, String>,
    issued: HashSet<String>,
    tokens: Box<dyn TokenSource>,
}

impl ElementIds {
    /// Create a resolver using `prefix` for plain ids and `tokens` for
    /// anonymised ones.
    pub fn new(prefix: impl Into<String>, tokens: Box<dyn TokenSource>) -> Self {
        Self {
            prefix: prefix.into(),
            anonymized: HashMap::new(),
            issued: HashSet::new(),
            tokens,
        }
    }

    /// The element id for `descriptor_id`.
    ///
    /// With `anonymize` the first call draws a token and later calls return
    /// the same one.
    pub fn resolve(&mut self, descriptor_id: &str, anonymize: bool) -> String {
        if !anonymize {
            return format!("{}{}", self.prefix, descriptor_id);
        }
        if let Some(token) = self.anonymized.get(descriptor_id) {
            return token.clone();
        }

        let token = self.draw_unique();
        self.issued.insert(token.clone());
        self.anonymized.insert(descriptor_id.into(), token.clone());
        token
    }

    /// The memoised anonymous id for `descriptor_id`, if one was issued.
    pub fn anonymized(&self, descriptor_id: &str) -> Option<&str> {
        self.anonymized.get(descriptor_id).map(String::as_str)
    }

    fn draw_unique(&mut self) -> String {
        let mut token = self.tokens.next_token();
        for _ in 1..MAX_DRAWS {
            if !self.issued.contains(&token) {
                return token;
            }
            token = self.tokens.next_token();
        }
        if self.issued.contains(&token) {
            token = format!("{}-{}", token, self.issued.len());
        }
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Always hands out the same token.
    struct Stuck;

    impl TokenSource for Stuck {
        fn next_token(&mut self) -> String {
            "sfixed".into()
        }
    }

    #[test]
    fn plain_ids_use_the_prefix() {
        let mut ids = ElementIds::new("c15t-script-", Box::new(Stuck));
        assert_eq!(ids.resolve("gtag", false), "c15t-script-gtag");
        assert_eq!(ids.anonymized("gtag"), None);
    }

    #[test]
    #[cfg(feature = "std")]
    fn anonymous_ids_are_memoised_per_descriptor() {
        let mut ids = ElementIds::new("c15t-script-", Box::new(RandomTokens::seeded(1)));
        let first = ids.resolve("gtag", true);
        assert_eq!(ids.resolve("gtag", true), first);
        assert!(!first.contains("gtag"));
        assert_ne!(ids.resolve("pixel", true), first);
    }

    #[test]
    fn colliding_tokens_are_disambiguated() {
        let mut ids = ElementIds::new("c15t-script-", Box::new(Stuck));
        let first = ids.resolve("a", true);
        let second = ids.resolve("b", true);
        assert_eq!(first, "sfixed");
        assert_ne!(first, second);
        assert!(second.starts_with("sfixed-"));
    }
}

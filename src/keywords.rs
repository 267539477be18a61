//! Keyword index — canonical keyword set and the shared, reloadable holder.
//!
//! `KeywordSet` is immutable once built. `KeywordIndex` publishes the
//! current set behind an `Arc`; a reload builds a fresh set off to the side
//! and swaps the pointer, so a matcher only ever sees a complete set.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use aho_corasick::AhoCorasick;
use tracing::{debug, info, warn};

use crate::normalize::normalize;

/// Immutable set of canonical keywords with a substring automaton.
#[derive(Debug, Default)]
pub struct KeywordSet {
    /// Canonical keywords in first-seen order, deduplicated.
    words: Vec<String>,
    lookup: HashSet<String>,
    /// `None` when the set is empty or the automaton could not be built;
    /// matching then falls back to a linear scan.
    automaton: Option<AhoCorasick>,
}

impl KeywordSet {
    /// Build a set from raw keywords.
    ///
    /// Each entry is trimmed and normalized; entries that are blank or
    /// normalize to nothing are skipped, duplicates merge.
    pub fn build<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words = Vec::new();
        let mut lookup = HashSet::new();
        let mut skipped = 0usize;

        for entry in raw {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let canonical = normalize(trimmed);
            if canonical.is_empty() {
                skipped += 1;
                continue;
            }
            if lookup.insert(canonical.clone()) {
                words.push(canonical);
            }
        }

        if skipped > 0 {
            debug!(skipped, "Keywords with no canonical form were skipped");
        }

        let automaton = if words.is_empty() {
            None
        } else {
            match AhoCorasick::new(&words) {
                Ok(ac) => Some(ac),
                Err(e) => {
                    warn!(error = %e, "Keyword automaton build failed, using linear scan");
                    None
                }
            }
        };

        Self {
            words,
            lookup,
            automaton,
        }
    }

    /// An empty set (matches nothing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether any keyword occurs in `text` after normalization.
    pub fn matches(&self, text: &str) -> bool {
        self.matches_canonical(&normalize(text))
    }

    /// Whether any keyword occurs in already-canonical text.
    pub fn matches_canonical(&self, canonical: &str) -> bool {
        self.find_canonical(canonical).is_some()
    }

    /// A keyword found in `text`, if any. Used for logging which word fired.
    pub fn find(&self, text: &str) -> Option<&str> {
        self.find_canonical(&normalize(text))
    }

    fn find_canonical(&self, canonical: &str) -> Option<&str> {
        if canonical.is_empty() || self.words.is_empty() {
            return None;
        }
        match &self.automaton {
            Some(ac) => ac
                .find(canonical)
                .map(|m| self.words[m.pattern().as_usize()].as_str()),
            None => self
                .words
                .iter()
                .filter_map(|w| canonical.find(w.as_str()).map(|pos| (pos, w)))
                .min_by_key(|(pos, _)| *pos)
                .map(|(_, w)| w.as_str()),
        }
    }

    /// Whether `keyword` (raw or canonical) is in the set.
    pub fn contains(&self, keyword: &str) -> bool {
        self.lookup.contains(&normalize(keyword))
    }

    /// Canonical keywords in first-seen order.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Shared keyword state: many readers, rare whole-set replacement.
pub struct KeywordIndex {
    current: RwLock<Arc<KeywordSet>>,
}

impl KeywordIndex {
    /// Create an index publishing `set`.
    pub fn new(set: KeywordSet) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Arc::new(set)),
        })
    }

    /// The currently published set.
    pub fn snapshot(&self) -> Arc<KeywordSet> {
        // The guarded value is a plain Arc; a poisoned lock still holds a complete set.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Publish a new set, returning the one it replaced.
    pub fn replace(&self, set: KeywordSet) -> Arc<KeywordSet> {
        let next = Arc::new(set);
        let count = next.len();
        let previous = {
            let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *guard, next)
        };
        info!(
            keywords = count,
            previous = previous.len(),
            "Keyword set replaced"
        );
        previous
    }

    /// Match `text` against the current set.
    pub fn matches(&self, text: &str) -> bool {
        self.snapshot().matches(text)
    }

    /// Number of keywords in the current set.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn matches_obfuscated_keyword() {
        let set = KeywordSet::build(["kill"]);
        assert!(set.matches("You should k!ll yourself"));
        assert!(set.matches("K I L L"));
        assert!(set.matches("ｋｉｌｌ"));
    }

    #[test]
    fn substring_over_match_is_intentional() {
        let set = KeywordSet::build(["kill"]);
        assert!(set.matches("skilled worker"));
    }

    #[test]
    fn empty_text_never_matches() {
        let set = KeywordSet::build(["kill"]);
        assert!(!set.matches(""));
        assert!(!set.matches("   !!! "));
    }

    #[test]
    fn empty_set_matches_nothing() {
        let set = KeywordSet::empty();
        assert!(set.is_empty());
        assert!(!set.matches("anything at all"));
        assert!(!set.matches(""));
    }

    #[test]
    fn blank_and_symbol_only_entries_are_skipped() {
        let set = KeywordSet::build(["", "   ", "???", "🙂", "  spam  "]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.words(), ["spam"]);
        assert!(!set.matches("?"));
    }

    #[test]
    fn duplicates_merge_by_canonical_form() {
        let set = KeywordSet::build(["Kill", "k1ll", "KILL", "k-i-l-l", "idiot"]);
        assert_eq!(set.len(), 2);
        assert!(set.contains("kill"));
        assert!(set.contains("1d10t"));
    }

    #[test]
    fn keywords_are_normalized_at_build() {
        let set = KeywordSet::build(["h4te"]);
        assert!(set.matches("so much HATE"));
    }

    #[test]
    fn find_reports_earliest_keyword() {
        let set = KeywordSet::build(["troll", "idiot"]);
        assert_eq!(set.find("you idiot troll"), Some("idiot"));
        assert_eq!(set.find("nice day"), None);
    }

    #[test]
    fn clean_text_does_not_match() {
        let set = KeywordSet::build(["kill", "idiot"]);
        assert!(!set.matches("Have a wonderful evening"));
    }

    #[test]
    fn index_replace_swaps_whole_set() {
        let index = KeywordIndex::new(KeywordSet::build(["alpha"]));
        assert!(index.matches("alpha"));

        let old = index.replace(KeywordSet::build(["beta"]));
        assert!(old.matches("alpha"));
        assert!(!index.matches("alpha"));
        assert!(index.matches("beta"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn snapshot_outlives_replace() {
        let index = KeywordIndex::new(KeywordSet::build(["alpha"]));
        let snap = index.snapshot();
        index.replace(KeywordSet::empty());
        assert!(snap.matches("alpha"));
        assert!(index.is_empty());
    }

    #[test]
    fn concurrent_readers_never_see_partial_sets() {
        // Old set: alphaone + alphatwo. New set: betaone + betatwo.
        // A reader that sees exactly one word of a pair observed a mix.
        let old = ["alphaone", "alphatwo"];
        let new = ["betaone", "betatwo"];
        let index = KeywordIndex::new(KeywordSet::build(old));
        let done = Arc::new(AtomicBool::new(false));
        let start = Arc::new(Barrier::new(5));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                let done = Arc::clone(&done);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    let mut observations = 0u32;
                    while !done.load(Ordering::Acquire) || observations < 100 {
                        let set = index.snapshot();
                        let a = (set.matches("alphaone"), set.matches("alphatwo"));
                        let b = (set.matches("betaone"), set.matches("betatwo"));
                        let is_old = a == (true, true) && b == (false, false);
                        let is_new = a == (false, false) && b == (true, true);
                        assert!(is_old || is_new, "observed a mixed keyword set");
                        observations += 1;
                    }
                })
            })
            .collect();

        start.wait();
        for i in 0..200 {
            let words = if i % 2 == 0 { new } else { old };
            index.replace(KeywordSet::build(words));
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().expect("reader panicked");
        }
    }
}

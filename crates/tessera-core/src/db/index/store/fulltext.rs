use crate::{
    config::FullTextConfig,
    db::{
        index::{
            kind::IndexKind,
            key::{IndexKey, KeyRange},
            store::{IndexEntry, IndexOps, StoreError, TreeStore},
        },
        record::RecordId,
    },
    value::Value,
};
use std::collections::BTreeSet;

///
/// FullTextStore
///
/// Word index over text keys. A put splits the text into words and indexes
/// the record under each; lookups take a single word.
///

#[derive(Debug)]
pub struct FullTextStore {
    config: FullTextConfig,
    words: TreeStore,
}

impl FullTextStore {
    #[must_use]
    pub const fn new(config: FullTextConfig) -> Self {
        Self {
            config,
            words: TreeStore::new(false, 1),
        }
    }

    /// Word keys of a text key; non-text keys contribute nothing.
    #[must_use]
    pub fn words(&self, key: &IndexKey) -> Vec<IndexKey> {
        let Some(Value::Text(text)) = key.first() else {
            return Vec::new();
        };

        let words: BTreeSet<String> = text
            .split(|c| self.config.separators.contains(c))
            .map(|w| self.fold_case(w))
            .filter(|w| w.chars().count() >= self.config.min_word_length)
            .filter(|w| {
                !self
                    .config
                    .stop_words
                    .iter()
                    .any(|stop| stop.eq_ignore_ascii_case(w))
            })
            .collect();

        words.into_iter().map(IndexKey::simple).collect()
    }

    #[must_use]
    pub fn normalize(&self, key: &IndexKey) -> IndexKey {
        match key.first() {
            Some(Value::Text(word)) => IndexKey::simple(self.fold_case(word.trim())),
            _ => key.clone(),
        }
    }

    fn fold_case(&self, word: &str) -> String {
        if self.config.ignore_case {
            word.to_lowercase()
        } else {
            word.to_string()
        }
    }
}

impl IndexOps for FullTextStore {
    fn put(&mut self, key: IndexKey, rid: RecordId) -> Result<(), StoreError> {
        for word in self.words(&key) {
            self.words.put(word, rid)?;
        }

        Ok(())
    }

    fn remove(&mut self, key: &IndexKey, rid: Option<RecordId>) -> bool {
        let mut removed = false;
        for word in self.words(key) {
            removed |= self.words.remove(&word, rid);
        }

        removed
    }

    fn get(&self, key: &IndexKey) -> BTreeSet<RecordId> {
        self.words.get(&self.normalize(key))
    }

    fn entries_between(
        &self,
        _range: &KeyRange,
        _ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        Err(StoreError::Unsupported {
            kind: IndexKind::FullText,
            op: "range scans",
        })
    }

    fn entries_for_keys(
        &self,
        keys: &[IndexKey],
        ascending: bool,
    ) -> Result<Vec<IndexEntry>, StoreError> {
        let normalized: Vec<IndexKey> = keys.iter().map(|k| self.normalize(k)).collect();
        self.words.entries_for_keys(&normalized, ascending)
    }

    fn clear(&mut self) {
        self.words.clear();
    }

    fn replace(&mut self, key: IndexKey, rids: BTreeSet<RecordId>) {
        self.words.replace(key, rids);
    }

    fn len(&self) -> usize {
        self.words.len()
    }

    fn key_count(&self) -> usize {
        self.words.key_count()
    }
}

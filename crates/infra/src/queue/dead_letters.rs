//! Process-local dead-letter store

use async_trait::async_trait;
use parking_lot::Mutex;
use syncbridge_core::DeadLetterStore;
use syncbridge_domain::{DeadLetter, Result};

/// Dead letters kept in memory and exposed over HTTP for manual repair.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    letters: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn store(&self, letter: DeadLetter) -> Result<()> {
        self.letters.lock().push(letter);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DeadLetter>> {
        Ok(self.letters.lock().clone())
    }

    async fn find_by_source_id(&self, source_id: &str) -> Result<Option<DeadLetter>> {
        Ok(self
            .letters
            .lock()
            .iter()
            .rev()
            .find(|letter| letter.message.mapping.source_id == source_id)
            .cloned())
    }

    async fn remove_by_source_id(&self, source_id: &str) -> Result<usize> {
        let mut letters = self.letters.lock();
        let before = letters.len();
        letters.retain(|letter| letter.message.mapping.source_id != source_id);
        Ok(before - letters.len())
    }
}

#[cfg(test)]
mod tests {
    use syncbridge_domain::{Mapping, MappingRetryMessage, TargetId};

    use super::*;

    fn letter(source_id: &str, target_id: i64) -> DeadLetter {
        let message = MappingRetryMessage::new(Mapping::source_created(
            source_id,
            TargetId::Numeric(target_id),
        ));
        DeadLetter::new(message, "exhausted")
    }

    #[tokio::test]
    async fn stores_and_lists_in_arrival_order() {
        let store = InMemoryDeadLetterStore::new();
        for source_id in ["a-1", "a-2"] {
            let message =
                MappingRetryMessage::new(Mapping::source_created(source_id, TargetId::Numeric(1)));
            store.store(DeadLetter::new(message, "exhausted")).await.expect("store");
        }

        let letters = store.list().await.expect("list");
        assert_eq!(store.len(), 2);
        assert_eq!(letters[0].message.mapping.source_id, "a-1");
        assert_eq!(letters[1].message.mapping.source_id, "a-2");
    }

    #[tokio::test]
    async fn find_returns_the_latest_letter_for_a_source() {
        let store = InMemoryDeadLetterStore::new();
        store.store(letter("a-1", 1)).await.expect("store");
        store.store(letter("a-2", 2)).await.expect("store");
        store.store(letter("a-1", 3)).await.expect("store");

        let found = store.find_by_source_id("a-1").await.expect("find").expect("letter");
        assert_eq!(found.message.mapping.target_id, TargetId::Numeric(3));
        assert!(store.find_by_source_id("a-9").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn remove_clears_only_the_named_source() {
        let store = InMemoryDeadLetterStore::new();
        store.store(letter("a-1", 1)).await.expect("store");
        store.store(letter("a-2", 2)).await.expect("store");
        store.store(letter("a-1", 3)).await.expect("store");

        assert_eq!(store.remove_by_source_id("a-1").await.expect("remove"), 2);
        assert_eq!(store.remove_by_source_id("a-1").await.expect("remove"), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list().await.expect("list")[0].message.mapping.source_id, "a-2");
    }
}

//! In-memory implementation of the persistence boundary.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use trading::{Entity, QueryFilter, Repository, Result};

/// Keeps entities in a map keyed by [`Entity::entity_id`].
///
/// Saving an entity with a known id replaces the stored copy. When `capacity` is set the
/// oldest entities (by [`Entity::recorded_at`]) are evicted first.
pub struct InMemoryRepository<T: Entity> {
    entities: RwLock<HashMap<String, T>>,
    capacity: Option<usize>,
}

impl<T: Entity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            capacity: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            capacity: Some(capacity.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored entity, oldest first.
    pub fn all(&self) -> Vec<T> {
        let mut items: Vec<T> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        items.sort_by_key(|e| e.recorded_at());
        items
    }
}

impl<T: Entity> Repository<T> for InMemoryRepository<T> {
    fn save(&self, entity: T) -> Result<()> {
        let mut entities = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        entities.insert(entity.entity_id(), entity);

        if let Some(capacity) = self.capacity {
            while entities.len() > capacity {
                let oldest = entities
                    .iter()
                    .min_by_key(|(_, e)| e.recorded_at())
                    .map(|(id, _)| id.clone());
                match oldest {
                    Some(id) => {
                        entities.remove(&id);
                    }
                    None => break,
                }
            }
        }
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Option<T> {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn query_latest(&self, filter: &QueryFilter) -> Vec<T> {
        let mut items: Vec<T> = self
            .entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| filter.matches(*e))
            .cloned()
            .collect();
        items.sort_by_key(|e| std::cmp::Reverse(e.recorded_at()));
        if let Some(limit) = filter.limit {
            items.truncate(limit);
        }
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use trading::Signal;

    fn signal_at(symbol: &str, minutes_ago: i64) -> Signal {
        Signal::buy(symbol, 100.0, Utc::now() - Duration::minutes(minutes_ago))
    }

    #[test]
    fn test_find_by_id_found_and_not_found() {
        let repo = InMemoryRepository::new();
        let s = signal_at("A", 0);
        let id = s.id.to_string();
        repo.save(s).unwrap();

        assert!(repo.find_by_id(&id).is_some());
        assert!(repo.find_by_id("missing").is_none());
    }

    #[test]
    fn test_query_latest_orders_newest_first() {
        let repo = InMemoryRepository::new();
        repo.save(signal_at("OLD", 30)).unwrap();
        repo.save(signal_at("NEW", 1)).unwrap();
        repo.save(signal_at("MID", 10)).unwrap();

        let latest = repo.query_latest(&QueryFilter::latest(2));
        let symbols: Vec<&str> = latest.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NEW", "MID"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let repo = InMemoryRepository::with_capacity(2);
        repo.save(signal_at("OLD", 30)).unwrap();
        repo.save(signal_at("MID", 10)).unwrap();
        repo.save(signal_at("NEW", 1)).unwrap();

        let all: Vec<String> = repo.all().into_iter().map(|s| s.symbol).collect();
        assert_eq!(all, vec!["MID".to_string(), "NEW".to_string()]);
    }
}

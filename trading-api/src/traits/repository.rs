use crate::error::Result;
use chrono::{DateTime, Utc};

/// Something that can be stored by a [`Repository`].
pub trait Entity: Clone + Send + Sync + 'static {
    /// Stable identifier. Saving an entity with an existing id replaces it.
    fn entity_id(&self) -> String;

    /// Time used to order results of [`Repository::query_latest`].
    fn recorded_at(&self) -> DateTime<Utc>;

    /// Owner used for filtering, if the entity has one.
    fn owner(&self) -> Option<String> {
        None
    }
}

/// Filters for [`Repository::query_latest`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub limit: Option<usize>,
    pub owner: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

impl QueryFilter {
    pub fn latest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches<T: Entity>(&self, entity: &T) -> bool {
        if let Some(owner) = &self.owner {
            if entity.owner().as_deref() != Some(owner.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entity.recorded_at() < since {
                return false;
            }
        }
        true
    }
}

/// Narrow persistence boundary.
pub trait Repository<T: Entity>: Send + Sync {
    fn save(&self, entity: T) -> Result<()>;

    fn find_by_id(&self, id: &str) -> Option<T>;

    /// Most recent entities first, after applying `filter`.
    fn query_latest(&self, filter: &QueryFilter) -> Vec<T>;
}

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::model::{Criteria, ManagerId};
use crate::store::{SlotStore, StorageError};

/// Finds the sales managers qualified for a query.
pub struct Matcher {
    store: Arc<dyn SlotStore>,
}

impl Matcher {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    /// Every manager satisfying all of `criteria` at once. An empty set is a
    /// normal answer; a failed read never yields a partial one.
    pub async fn match_managers(
        &self,
        criteria: &Criteria,
    ) -> Result<BTreeSet<ManagerId>, StorageError> {
        let ids = self.store.match_managers(criteria).await?;
        Ok(ids.into_iter().collect())
    }
}

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::models::QueryRecord;

/// Per-user analysis history. Every lookup is scoped to the owner, so a
/// foreign id behaves exactly like an unknown one.
#[derive(Clone, Default)]
pub struct QueryStore {
    inner: Arc<RwLock<HashMap<Uuid, QueryRecord>>>,
}

impl QueryStore {
    pub fn insert(&self, record: QueryRecord) {
        self.inner.write().insert(record.id, record);
    }

    pub fn get(&self, user_id: &str, id: Uuid) -> Option<QueryRecord> {
        self.inner.read().get(&id).filter(|r| r.user_id == user_id).cloned()
    }

    /// Newest first.
    pub fn list(&self, user_id: &str) -> Vec<QueryRecord> {
        let mut records: Vec<QueryRecord> = self
            .inner
            .read()
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn delete(&self, user_id: &str, id: Uuid) -> bool {
        let mut guard = self.inner.write();
        match guard.get(&id) {
            Some(record) if record.user_id == user_id => {
                guard.remove(&id);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RenderedReport;
    use crate::report::ReportSummary;
    use chrono::{Duration, Utc};

    fn record(user: &str, minutes_ago: i64) -> QueryRecord {
        QueryRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            image_url: format!("https://cdn.example/{minutes_ago}.png"),
            analysis_result: RenderedReport(format!("Item {minutes_ago}\n")),
            summary: ReportSummary::default(),
            model: "fake-vision".into(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn lists_newest_first_for_the_owner_only() {
        let store = QueryStore::default();
        let old = record("alice", 30);
        let new = record("alice", 1);
        let other = record("bob", 0);
        store.insert(old.clone());
        store.insert(new.clone());
        store.insert(other);

        let ids: Vec<Uuid> = store.list("alice").iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![new.id, old.id]);
        assert_eq!(store.list("carol").len(), 0);
    }

    #[test]
    fn get_and_delete_are_owner_scoped() {
        let store = QueryStore::default();
        let rec = record("alice", 5);
        store.insert(rec.clone());

        assert!(store.get("bob", rec.id).is_none());
        assert!(!store.delete("bob", rec.id));
        assert_eq!(store.get("alice", rec.id).map(|r| r.image_url), Some(rec.image_url.clone()));

        assert!(store.delete("alice", rec.id));
        assert!(store.get("alice", rec.id).is_none());
        assert!(!store.delete("alice", rec.id));
    }
}

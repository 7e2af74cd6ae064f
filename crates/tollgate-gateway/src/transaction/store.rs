//! Bounded in-memory transaction store.

use super::types::{HttpRequestRecord, HttpResponseRecord, HttpTransaction};
use crate::contract::ValidationFinding;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Default)]
struct Entries {
    by_id: HashMap<String, HttpTransaction>,
    order: VecDeque<String>,
}

/// Latest snapshot per transaction id. The oldest ids are evicted once `limit` is reached.
pub struct TransactionStore {
    entries: RwLock<Entries>,
    limit: usize,
}

impl TransactionStore {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            limit: limit.max(1),
        }
    }

    /// Upsert the request half. Last write wins.
    pub fn record_request(
        &self,
        id: &str,
        request: HttpRequestRecord,
        findings: Vec<ValidationFinding>,
    ) -> HttpTransaction {
        self.upsert(id, |txn| {
            txn.request = Some(request);
            txn.request_validation = findings;
        })
    }

    /// Upsert the response half. Last write wins.
    pub fn record_response(
        &self,
        id: &str,
        response: HttpResponseRecord,
        findings: Vec<ValidationFinding>,
    ) -> HttpTransaction {
        self.upsert(id, |txn| {
            txn.response = Some(response);
            txn.response_validation = findings;
        })
    }

    fn upsert(&self, id: &str, apply: impl FnOnce(&mut HttpTransaction)) -> HttpTransaction {
        let mut entries = self.entries.write();
        if !entries.by_id.contains_key(id) {
            while entries.order.len() >= self.limit {
                if let Some(oldest) = entries.order.pop_front() {
                    entries.by_id.remove(&oldest);
                    debug!(id = %oldest, "Evicted transaction");
                }
            }
            entries.order.push_back(id.to_string());
        }
        let txn = entries
            .by_id
            .entry(id.to_string())
            .or_insert_with(|| HttpTransaction {
                id: id.to_string(),
                ..Default::default()
            });
        apply(txn);
        txn.clone()
    }

    pub fn get(&self, id: &str) -> Option<HttpTransaction> {
        self.entries.read().by_id.get(id).cloned()
    }

    /// Every stored transaction, oldest first.
    pub fn all(&self) -> Vec<HttpTransaction> {
        let entries = self.entries.read();
        entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

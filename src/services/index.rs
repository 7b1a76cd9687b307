// src/services/index.rs
//! Field index over one session table. Forward map answers
//! field -> value -> session id -> run ids; the reverse map remembers
//! what was indexed per session so unindexing needs no event access.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::models::Session;

type ForwardIndex = HashMap<String, HashMap<String, HashMap<String, HashSet<String>>>>;

#[derive(Default)]
struct IndexState {
    forward: ForwardIndex,
    reverse: HashMap<String, Vec<(String, String)>>,
}

pub struct SessionIndex {
    keys: Vec<String>,
    state: RwLock<IndexState>,
}

impl SessionIndex {
    pub fn new(keys: Vec<String>) -> Self {
        SessionIndex {
            keys,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Indexes every run of the session under each configured key.
    /// Both maps mutate under one write lock so they never disagree.
    pub async fn index_session(&self, session: &Session) {
        if self.keys.is_empty() {
            return;
        }
        let mut state = self.state.write().await;
        for run in &session.runs {
            let run_id = run.cd.run_id.clone();
            for key in &self.keys {
                let value = run.event.index_value(key);
                state
                    .forward
                    .entry(key.clone())
                    .or_default()
                    .entry(value.clone())
                    .or_default()
                    .entry(session.session_id.clone())
                    .or_default()
                    .insert(run_id.clone());
                let entry = state.reverse.entry(session.session_id.clone()).or_default();
                if !entry.contains(&(key.clone(), value.clone())) {
                    entry.push((key.clone(), value));
                }
            }
        }
    }

    /// Drops every forward entry recorded for the session, pruning
    /// empty map levels on the way out.
    pub async fn unindex_session(&self, session_id: &str) {
        let mut state = self.state.write().await;
        let Some(pairs) = state.reverse.remove(session_id) else {
            return;
        };
        for (key, value) in pairs {
            let Some(by_value) = state.forward.get_mut(&key) else {
                continue;
            };
            if let Some(by_id) = by_value.get_mut(&value) {
                by_id.remove(session_id);
                if by_id.is_empty() {
                    by_value.remove(&value);
                }
            }
            if by_value.is_empty() {
                state.forward.remove(&key);
            }
        }
    }

    /// Intersects candidate sets for each resolvable filter key and
    /// returns the matching ids together with the filters that could
    /// not be answered from the index (caller compares those directly).
    pub async fn matching_ids(
        &self,
        filters: &HashMap<String, String>,
    ) -> (HashMap<String, HashSet<String>>, HashMap<String, String>) {
        let mut matches: Option<HashMap<String, HashSet<String>>> = None;
        let mut unresolved = HashMap::new();
        let state = self.state.read().await;

        for (key, value) in filters {
            if !self.keys.contains(key) {
                unresolved.insert(key.clone(), value.clone());
                continue;
            }
            let candidates: HashMap<String, HashSet<String>> = state
                .forward
                .get(key)
                .and_then(|by_value| by_value.get(value))
                .map(|by_id| {
                    by_id
                        .iter()
                        .map(|(id, runs)| (id.clone(), runs.clone()))
                        .collect()
                })
                .unwrap_or_default();

            matches = Some(match matches {
                None => candidates,
                Some(prev) => {
                    let mut next = HashMap::new();
                    for (id, runs) in prev {
                        if let Some(other_runs) = candidates.get(&id) {
                            let common: HashSet<String> =
                                runs.intersection(other_runs).cloned().collect();
                            if !common.is_empty() {
                                next.insert(id, common);
                            }
                        }
                    }
                    next
                }
            });
            if matches.as_ref().map(|m| m.is_empty()).unwrap_or(false) {
                // no candidate survives, no point checking further keys
                return (HashMap::new(), unresolved);
            }
        }

        (matches.unwrap_or_default(), unresolved)
    }

    pub async fn is_empty(&self) -> bool {
        let state = self.state.read().await;
        state.forward.is_empty() && state.reverse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::fields;
    use crate::models::{Event, SessionRun};

    fn session(id: &str, account: &str, runs: &[&str]) -> Session {
        let mut s = Session {
            session_id: id.to_string(),
            tenant: "cgrates.org".to_string(),
            ..Default::default()
        };
        for run_id in runs {
            let mut run = SessionRun::default();
            run.cd.run_id = run_id.to_string();
            run.event.set_str(fields::ACCOUNT, account);
            run.event.set_str(fields::ORIGIN_ID, id);
            s.runs.push(run);
        }
        s
    }

    fn index_keys() -> Vec<String> {
        vec![fields::ACCOUNT.to_string(), fields::ORIGIN_ID.to_string()]
    }

    #[tokio::test]
    async fn test_index_and_match() {
        let index = SessionIndex::new(index_keys());
        index.index_session(&session("s1", "1001", &["*default"])).await;
        index
            .index_session(&session("s2", "1001", &["*default", "*derived"]))
            .await;
        index.index_session(&session("s3", "1002", &["*default"])).await;

        let mut filters = HashMap::new();
        filters.insert(fields::ACCOUNT.to_string(), "1001".to_string());
        let (matches, unresolved) = index.matching_ids(&filters).await;
        assert!(unresolved.is_empty());
        assert_eq!(matches.len(), 2);
        assert_eq!(matches["s2"].len(), 2);

        filters.insert(fields::ORIGIN_ID.to_string(), "s2".to_string());
        let (matches, _) = index.matching_ids(&filters).await;
        assert_eq!(matches.len(), 1);
        assert!(matches.contains_key("s2"));
    }

    #[tokio::test]
    async fn test_unresolved_filters_are_reported() {
        let index = SessionIndex::new(index_keys());
        index.index_session(&session("s1", "1001", &["*default"])).await;

        let mut filters = HashMap::new();
        filters.insert(fields::ACCOUNT.to_string(), "1001".to_string());
        filters.insert(fields::DESTINATION.to_string(), "+51".to_string());
        let (matches, unresolved) = index.matching_ids(&filters).await;
        assert_eq!(matches.len(), 1);
        assert_eq!(unresolved.len(), 1);
        assert!(unresolved.contains_key(fields::DESTINATION));
    }

    #[tokio::test]
    async fn test_missing_field_indexed_as_sentinel() {
        let index = SessionIndex::new(vec![fields::DESTINATION.to_string()]);
        index.index_session(&session("s1", "1001", &["*default"])).await;

        let mut filters = HashMap::new();
        filters.insert(fields::DESTINATION.to_string(), "N/A".to_string());
        let (matches, _) = index.matching_ids(&filters).await;
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_unindex_prunes_all_levels() {
        let index = SessionIndex::new(index_keys());
        index.index_session(&session("s1", "1001", &["*default"])).await;
        assert!(!index.is_empty().await);

        index.unindex_session("s1").await;
        assert!(index.is_empty().await);

        // unindexing twice is harmless
        index.unindex_session("s1").await;
    }

    #[tokio::test]
    async fn test_no_filters_matches_nothing() {
        let index = SessionIndex::new(index_keys());
        index.index_session(&session("s1", "1001", &["*default"])).await;
        let (matches, unresolved) = index.matching_ids(&HashMap::new()).await;
        assert!(matches.is_empty());
        assert!(unresolved.is_empty());
    }
}

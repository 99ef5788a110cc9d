//! Routing table: registrations indexed by update kind, then priority group.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::bot::UpdateKind;
use crate::filters::BoxedFilter;

use super::Handler;

/// One filter and handler, bound at plugin load and immutable afterwards.
pub struct Registration {
    pub kind: UpdateKind,
    pub group: i32,
    /// Name of the plugin that bound it.
    pub owner: Arc<str>,
    pub name: String,
    pub filter: Option<BoxedFilter>,
    pub handler: Arc<dyn Handler>,
    seq: u64,
}

impl Registration {
    pub fn new(
        kind: UpdateKind,
        group: i32,
        owner: Arc<str>,
        name: impl Into<String>,
        filter: Option<BoxedFilter>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            kind,
            group,
            owner,
            name: name.into(),
            filter,
            handler,
            seq: 0,
        }
    }
}

type Groups = BTreeMap<i32, Vec<Arc<Registration>>>;

#[derive(Default)]
pub struct Router {
    table: RwLock<HashMap<UpdateKind, Groups>>,
    next_seq: AtomicU64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append registrations, keeping insertion order within each group.
    pub fn insert(&self, registrations: Vec<Registration>) {
        let mut table = self.table.write();
        for mut registration in registrations {
            registration.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Bound {:?} handler '{}' of {} in group {}",
                registration.kind,
                registration.name,
                registration.owner,
                registration.group
            );
            table
                .entry(registration.kind)
                .or_default()
                .entry(registration.group)
                .or_default()
                .push(Arc::new(registration));
        }
    }

    /// Drop every registration bound by `owner`. Returns how many went.
    pub fn remove_owner(&self, owner: &str) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        for groups in table.values_mut() {
            for registrations in groups.values_mut() {
                let before = registrations.len();
                registrations.retain(|r| &*r.owner != owner);
                removed += before - registrations.len();
            }
            groups.retain(|_, registrations| !registrations.is_empty());
        }
        removed
    }

    /// Candidates for an incoming update, by ascending group, each group in
    /// insertion order.
    pub fn candidates(&self, incoming: UpdateKind) -> Vec<(i32, Vec<Arc<Registration>>)> {
        let table = self.table.read();
        let mut merged: Groups = BTreeMap::new();
        for (kind, groups) in table.iter() {
            if !kind.accepts(incoming) {
                continue;
            }
            for (group, registrations) in groups {
                merged
                    .entry(*group)
                    .or_default()
                    .extend(registrations.iter().cloned());
            }
        }
        drop(table);

        merged
            .into_iter()
            .map(|(group, mut registrations)| {
                registrations.sort_by_key(|r| r.seq);
                (group, registrations)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table
            .read()
            .values()
            .flat_map(|groups| groups.values())
            .map(Vec::len)
            .sum()
    }
}

//! Staff roster: globally privileged users split into ranks.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use mongodb::bson::{doc, Document};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::database::DocumentStore;
use crate::error::ConfigError;

pub const STAFF_COLLECTION: &str = "STAFF";

/// Staff ranks, ordered so a higher rank satisfies every lower requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Sudo,
    Dev,
    Owner,
}

impl Rank {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Dev => "dev",
            Self::Owner => "owner",
        }
    }
}

impl FromStr for Rank {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sudo" => Ok(Self::Sudo),
            "dev" => Ok(Self::Dev),
            "owner" => Ok(Self::Owner),
            other => Err(ConfigError::UnknownRank(other.to_string())),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct Members {
    dev: HashSet<u64>,
    sudo: HashSet<u64>,
}

/// Read-mostly roster. The owner comes from configuration and is fixed.
#[derive(Debug)]
pub struct StaffRoster {
    owner: u64,
    members: RwLock<Members>,
}

impl StaffRoster {
    pub fn new(owner: u64) -> Self {
        Self {
            owner,
            members: RwLock::new(Members::default()),
        }
    }

    /// Load dev and sudo members from the `STAFF` collection.
    ///
    /// Documents look like `{ _id: <user>, rank: "dev" | "sudo" }`; anything
    /// else is skipped with a warning.
    pub async fn load(owner: u64, store: &dyn DocumentStore) -> Result<Self> {
        let roster = Self::new(owner);
        for document in store.find_many(STAFF_COLLECTION, doc! {}).await? {
            match parse_entry(&document) {
                Some((user, rank)) if user != owner => {
                    roster.insert(user, rank);
                }
                Some(_) => {}
                None => warn!("Skipping malformed staff entry: {}", document),
            }
        }
        info!("Staff roster loaded: {} members besides owner", roster.len());
        Ok(roster)
    }

    /// Owner first, then dev, then sudo.
    pub fn rank_of(&self, user_id: u64) -> Option<Rank> {
        if user_id == self.owner {
            return Some(Rank::Owner);
        }
        let members = self.members.read();
        if members.dev.contains(&user_id) {
            Some(Rank::Dev)
        } else if members.sudo.contains(&user_id) {
            Some(Rank::Sudo)
        } else {
            None
        }
    }

    pub fn is_staff(&self, user_id: u64) -> bool {
        self.rank_of(user_id).is_some()
    }

    /// Whether the user holds `rank` or a higher one.
    pub fn has_rank(&self, user_id: u64, rank: Rank) -> bool {
        self.rank_of(user_id).is_some_and(|held| held >= rank)
    }

    /// Add or move a user. The owner's rank cannot change.
    pub fn insert(&self, user_id: u64, rank: Rank) -> bool {
        if user_id == self.owner || rank == Rank::Owner {
            return false;
        }
        let mut members = self.members.write();
        members.dev.remove(&user_id);
        members.sudo.remove(&user_id);
        match rank {
            Rank::Dev => members.dev.insert(user_id),
            Rank::Sudo => members.sudo.insert(user_id),
            Rank::Owner => false,
        }
    }

    pub fn remove(&self, user_id: u64) -> bool {
        let mut members = self.members.write();
        let dev = members.dev.remove(&user_id);
        let sudo = members.sudo.remove(&user_id);
        dev || sudo
    }

    /// `(user, rank)` pairs, owner first, then by rank and id.
    pub fn list(&self) -> Vec<(u64, Rank)> {
        let members = self.members.read();
        let mut listed: Vec<(u64, Rank)> = members
            .dev
            .iter()
            .map(|id| (*id, Rank::Dev))
            .chain(members.sudo.iter().map(|id| (*id, Rank::Sudo)))
            .collect();
        listed.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        listed.insert(0, (self.owner, Rank::Owner));
        listed
    }

    fn len(&self) -> usize {
        let members = self.members.read();
        members.dev.len() + members.sudo.len()
    }
}

fn parse_entry(document: &Document) -> Option<(u64, Rank)> {
    let user = document
        .get_i64("_id")
        .ok()
        .or_else(|| document.get_i32("_id").ok().map(i64::from))?;
    let rank = document.get_str("rank").ok()?.parse().ok()?;
    Some((u64::try_from(user).ok()?, rank))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;

    #[test]
    fn test_rank_order() {
        let roster = StaffRoster::new(1);
        roster.insert(2, Rank::Dev);
        roster.insert(3, Rank::Sudo);

        assert_eq!(roster.rank_of(1), Some(Rank::Owner));
        assert_eq!(roster.rank_of(2), Some(Rank::Dev));
        assert_eq!(roster.rank_of(3), Some(Rank::Sudo));
        assert_eq!(roster.rank_of(4), None);

        assert!(roster.has_rank(1, Rank::Dev));
        assert!(roster.has_rank(2, Rank::Dev));
        assert!(!roster.has_rank(3, Rank::Dev));
        assert!(roster.has_rank(3, Rank::Sudo));
        assert!(!roster.has_rank(2, Rank::Owner));
    }

    #[test]
    fn test_owner_is_fixed() {
        let roster = StaffRoster::new(1);
        assert!(!roster.insert(1, Rank::Sudo));
        assert!(!roster.insert(5, Rank::Owner));
        assert!(!roster.remove(1));
        assert_eq!(roster.rank_of(1), Some(Rank::Owner));
    }

    #[test]
    fn test_unknown_rank_is_config_error() {
        assert!(matches!(
            "admin".parse::<Rank>(),
            Err(ConfigError::UnknownRank(r)) if r == "admin"
        ));
        assert_eq!("DEV".parse::<Rank>().unwrap(), Rank::Dev);
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let store = MemoryStore::new();
        store
            .update_one(STAFF_COLLECTION, doc! { "_id": 20_i64 }, doc! { "$set": { "rank": "dev" } }, true)
            .await
            .unwrap();
        store
            .update_one(STAFF_COLLECTION, doc! { "_id": 30_i64 }, doc! { "$set": { "rank": "sudo" } }, true)
            .await
            .unwrap();
        store
            .update_one(STAFF_COLLECTION, doc! { "_id": 40_i64 }, doc! { "$set": { "rank": "janitor" } }, true)
            .await
            .unwrap();

        let roster = StaffRoster::load(10, &store).await.unwrap();
        assert_eq!(
            roster.list(),
            vec![(10, Rank::Owner), (20, Rank::Dev), (30, Rank::Sudo)]
        );
    }
}

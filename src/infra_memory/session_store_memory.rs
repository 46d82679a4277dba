use crate::domain_port::{SessionStore, StoreError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Slot {
    Text(String),
    Members(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Stored {
    slot: Slot,
    expires_at: Instant,
}

impl Stored {
    fn new(slot: Slot, ttl: Duration) -> Self {
        Stored {
            slot,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Single-process [`SessionStore`] with lazy expiry. Conditional writes take
/// the shard lock for the key, which makes `put_if_absent` atomic.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: DashMap<String, Stored>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys. Handy for asserting that nothing was written.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<Stored> {
        let now = Instant::now();
        let stored = self.entries.get(key).map(|e| e.value().clone())?;
        if stored.is_live(now) {
            Some(stored)
        } else {
            self.entries.remove_if(key, |_, v| !v.is_live(now));
            None
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Backend(format!("WRONGTYPE value at {}", key))
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_owned(), Stored::new(Slot::Text(value.to_owned()), ttl));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let fresh = Stored::new(Slot::Text(value.to_owned()), ttl);
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(Instant::now()) {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.live(key).map(|s| s.slot) {
            None => Ok(None),
            Some(Slot::Text(value)) => Ok(Some(value)),
            Some(Slot::Members(_)) => Err(wrong_type(key)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self
            .entries
            .remove_if(key, |_, stored| matches!(stored.slot, Slot::Text(_)))
        {
            Some((_, stored)) if !stored.is_live(Instant::now()) => Ok(None),
            Some((_, Stored { slot: Slot::Text(value), .. })) => Ok(Some(value)),
            Some(_) => Ok(None),
            None if self.live(key).is_some() => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.live(key).is_some())
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        Ok(self
            .live(key)
            .map(|s| s.expires_at.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero()))
    }

    async fn add_to_set(
        &self,
        set_key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        match self.entries.entry(set_key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                if !stored.is_live(now) {
                    stored.slot = Slot::Members(HashSet::new());
                }
                match &mut stored.slot {
                    Slot::Members(members) => {
                        members.insert(member.to_owned());
                    }
                    Slot::Text(_) => return Err(wrong_type(set_key)),
                }
                stored.expires_at = now + ttl;
                Ok(())
            }
            Entry::Vacant(vacant) => {
                let members = HashSet::from([member.to_owned()]);
                vacant.insert(Stored::new(Slot::Members(members), ttl));
                Ok(())
            }
        }
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(mut stored) = self.entries.get_mut(set_key) {
            match &mut stored.slot {
                Slot::Members(members) => {
                    members.remove(member);
                }
                Slot::Text(_) => return Err(wrong_type(set_key)),
            }
        }
        Ok(())
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        match self.live(set_key).map(|s| s.slot) {
            None => Ok(Vec::new()),
            Some(Slot::Members(members)) => Ok(members.into_iter().collect()),
            Some(Slot::Text(_)) => Err(wrong_type(set_key)),
        }
    }
}

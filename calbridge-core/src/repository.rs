//! Entity stores on both sides of a sync.
//!
//! The change detection that drives a sync pass compares the version stamps
//! returned here; the stores themselves only guarantee that a stale version
//! never overwrites a newer one.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::MappingConfiguration;
use crate::error::{CalBridgeError, CalBridgeResult, HostError};
use crate::event::CalendarEvent;
use crate::host::{HostCalendarItem, HostItemHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityVersion<I, V> {
    pub id: I,
    pub version: V,
}

pub trait EntityRepository {
    type Id;
    type Version;
    type Entity;

    /// Versions of the given ids that still exist.
    fn get_versions(&self, ids: &[Self::Id])
    -> CalBridgeResult<Vec<EntityVersion<Self::Id, Self::Version>>>;

    /// Versions of every entity in scope, plus the `known_ids` that still exist.
    fn get_all(
        &self,
        known_ids: &[Self::Id],
    ) -> CalBridgeResult<Vec<EntityVersion<Self::Id, Self::Version>>>;

    fn get(&self, ids: &[Self::Id]) -> CalBridgeResult<Vec<(Self::Id, Self::Entity)>>;

    fn create<F>(&self, initializer: F) -> CalBridgeResult<EntityVersion<Self::Id, Self::Version>>
    where
        F: FnOnce(&mut Self::Entity) -> CalBridgeResult<()>;

    /// Apply `modifier` to `entity` and store it, unless the stored version no
    /// longer equals `version`. Returns None on such a conflict.
    fn try_update<F>(
        &self,
        id: &Self::Id,
        version: &Self::Version,
        entity: Self::Entity,
        modifier: F,
    ) -> CalBridgeResult<Option<Self::Version>>
    where
        F: FnOnce(&mut Self::Entity) -> CalBridgeResult<()>;

    /// Delete the entity if its stored version equals `version`.
    fn try_delete(&self, id: &Self::Id, version: &Self::Version) -> CalBridgeResult<bool>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Host items keyed by entry id, versioned by last-modified time.
pub struct InMemoryHostRepository {
    items: Mutex<BTreeMap<String, HostCalendarItem>>,
    config: MappingConfiguration,
    local_tz_id: String,
}

impl InMemoryHostRepository {
    pub fn new(config: MappingConfiguration, local_tz_id: impl Into<String>) -> Self {
        Self {
            items: Mutex::new(BTreeMap::new()),
            config,
            local_tz_id: local_tz_id.into(),
        }
    }

    /// Store `item` as is, e.g. when seeding from a file.
    pub fn insert(&self, mut item: HostCalendarItem) -> EntityVersion<String, DateTime<Utc>> {
        item.mark_materialized();
        let version = EntityVersion {
            id: item.entry_id.clone(),
            version: item.last_modified,
        };
        lock(&self.items).insert(item.entry_id.clone(), item);
        version
    }

    /// Mutable access to a stored item whose saves go back into this repository.
    pub fn handle(&self, id: &str) -> CalBridgeResult<RepositoryItemHandle<'_>> {
        let item = lock(&self.items)
            .get(id)
            .cloned()
            .ok_or_else(|| CalBridgeError::NotFound(id.to_string()))?;
        Ok(RepositoryItemHandle {
            repository: self,
            item,
        })
    }

    /// Whether the category filter selects `item`.
    fn in_scope(&self, item: &HostCalendarItem) -> bool {
        if !self.config.use_category_as_filter {
            return true;
        }
        let filter = self.config.filter_category_name.trim();
        let tagged = item
            .category_list(&self.config.category_separator)
            .iter()
            .any(|c| c.eq_ignore_ascii_case(filter));
        tagged != self.config.invert_category_filter
    }

    fn store(&self, mut item: HostCalendarItem) -> DateTime<Utc> {
        let mut items = lock(&self.items);
        let now = Utc::now();
        let version = match items.get(&item.entry_id) {
            Some(previous) if previous.last_modified >= now => {
                previous.last_modified + Duration::microseconds(1)
            }
            _ => now,
        };
        item.last_modified = version;
        item.mark_materialized();
        items.insert(item.entry_id.clone(), item);
        version
    }
}

impl EntityRepository for InMemoryHostRepository {
    type Id = String;
    type Version = DateTime<Utc>;
    type Entity = HostCalendarItem;

    fn get_versions(&self, ids: &[String]) -> CalBridgeResult<Vec<EntityVersion<String, DateTime<Utc>>>> {
        let items = lock(&self.items);
        Ok(ids
            .iter()
            .filter_map(|id| items.get(id))
            .map(|item| EntityVersion {
                id: item.entry_id.clone(),
                version: item.last_modified,
            })
            .collect())
    }

    fn get_all(&self, known_ids: &[String]) -> CalBridgeResult<Vec<EntityVersion<String, DateTime<Utc>>>> {
        let items = lock(&self.items);
        Ok(items
            .values()
            .filter(|item| self.in_scope(item) || known_ids.contains(&item.entry_id))
            .map(|item| EntityVersion {
                id: item.entry_id.clone(),
                version: item.last_modified,
            })
            .collect())
    }

    fn get(&self, ids: &[String]) -> CalBridgeResult<Vec<(String, HostCalendarItem)>> {
        let items = lock(&self.items);
        Ok(ids
            .iter()
            .filter_map(|id| items.get(id).map(|item| (id.clone(), item.clone())))
            .collect())
    }

    fn create<F>(&self, initializer: F) -> CalBridgeResult<EntityVersion<String, DateTime<Utc>>>
    where
        F: FnOnce(&mut HostCalendarItem) -> CalBridgeResult<()>,
    {
        let now = Utc::now().naive_utc();
        let mut item = HostCalendarItem::new(
            Uuid::new_v4().simple().to_string(),
            now,
            now,
            self.local_tz_id.clone(),
        );
        initializer(&mut item)?;
        let id = item.entry_id.clone();
        let version = self.store(item);
        Ok(EntityVersion { id, version })
    }

    fn try_update<F>(
        &self,
        id: &String,
        version: &DateTime<Utc>,
        mut entity: HostCalendarItem,
        modifier: F,
    ) -> CalBridgeResult<Option<DateTime<Utc>>>
    where
        F: FnOnce(&mut HostCalendarItem) -> CalBridgeResult<()>,
    {
        let current = lock(&self.items).get(id).map(|item| item.last_modified);
        match current {
            None => return Err(CalBridgeError::NotFound(id.clone())),
            Some(current) if current != *version => {
                tracing::debug!(%id, "host item changed since it was read");
                return Ok(None);
            }
            Some(_) => {}
        }
        modifier(&mut entity)?;
        entity.entry_id = id.clone();
        Ok(Some(self.store(entity)))
    }

    fn try_delete(&self, id: &String, version: &DateTime<Utc>) -> CalBridgeResult<bool> {
        let mut items = lock(&self.items);
        match items.get(id) {
            Some(item) if item.last_modified == *version => {
                items.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Handle whose saves persist into an [`InMemoryHostRepository`].
pub struct RepositoryItemHandle<'a> {
    repository: &'a InMemoryHostRepository,
    item: HostCalendarItem,
}

impl HostItemHandle for RepositoryItemHandle<'_> {
    fn item(&self) -> &HostCalendarItem {
        &self.item
    }

    fn item_mut(&mut self) -> &mut HostCalendarItem {
        &mut self.item
    }

    fn save_and_reload(&mut self) -> CalBridgeResult<()> {
        let id = self.item.entry_id.clone();
        if !lock(&self.repository.items).contains_key(&id) {
            return Err(HostError::Save(format!("item '{id}' no longer exists")).into());
        }
        self.repository.store(self.item.clone());
        self.item = lock(&self.repository.items)
            .get(&id)
            .cloned()
            .ok_or_else(|| HostError::Save(format!("item '{id}' vanished while saving")))?;
        Ok(())
    }
}

/// Remote event groups keyed by UID, versioned by an opaque etag.
#[derive(Default)]
pub struct InMemoryRemoteRepository {
    groups: Mutex<BTreeMap<String, (String, Vec<CalendarEvent>)>>,
}

impl InMemoryRemoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn new_etag() -> String {
        Uuid::new_v4().simple().to_string()
    }
}

fn group_uid(events: &[CalendarEvent]) -> CalBridgeResult<String> {
    let uid = events
        .first()
        .map(|e| e.uid.clone())
        .ok_or_else(|| CalBridgeError::IcsGenerate("cannot store an empty event group".into()))?;
    if events.iter().any(|e| e.uid != uid) {
        return Err(CalBridgeError::IcsGenerate(format!(
            "event group '{uid}' mixes several UIDs"
        )));
    }
    Ok(uid)
}

impl EntityRepository for InMemoryRemoteRepository {
    type Id = String;
    type Version = String;
    type Entity = Vec<CalendarEvent>;

    fn get_versions(&self, ids: &[String]) -> CalBridgeResult<Vec<EntityVersion<String, String>>> {
        let groups = lock(&self.groups);
        Ok(ids
            .iter()
            .filter_map(|id| {
                groups.get(id).map(|(etag, _)| EntityVersion {
                    id: id.clone(),
                    version: etag.clone(),
                })
            })
            .collect())
    }

    fn get_all(&self, _known_ids: &[String]) -> CalBridgeResult<Vec<EntityVersion<String, String>>> {
        Ok(lock(&self.groups)
            .iter()
            .map(|(id, (etag, _))| EntityVersion {
                id: id.clone(),
                version: etag.clone(),
            })
            .collect())
    }

    fn get(&self, ids: &[String]) -> CalBridgeResult<Vec<(String, Vec<CalendarEvent>)>> {
        let groups = lock(&self.groups);
        Ok(ids
            .iter()
            .filter_map(|id| groups.get(id).map(|(_, events)| (id.clone(), events.clone())))
            .collect())
    }

    fn create<F>(&self, initializer: F) -> CalBridgeResult<EntityVersion<String, String>>
    where
        F: FnOnce(&mut Vec<CalendarEvent>) -> CalBridgeResult<()>,
    {
        let mut events = Vec::new();
        initializer(&mut events)?;
        let uid = group_uid(&events)?;

        let mut groups = lock(&self.groups);
        if groups.contains_key(&uid) {
            return Err(CalBridgeError::IcsGenerate(format!(
                "an event group with UID '{uid}' already exists"
            )));
        }
        let etag = Self::new_etag();
        groups.insert(uid.clone(), (etag.clone(), events));
        Ok(EntityVersion { id: uid, version: etag })
    }

    fn try_update<F>(
        &self,
        id: &String,
        version: &String,
        mut entity: Vec<CalendarEvent>,
        modifier: F,
    ) -> CalBridgeResult<Option<String>>
    where
        F: FnOnce(&mut Vec<CalendarEvent>) -> CalBridgeResult<()>,
    {
        modifier(&mut entity)?;
        if group_uid(&entity)? != *id {
            return Err(CalBridgeError::IcsGenerate(format!(
                "event group no longer carries UID '{id}'"
            )));
        }

        let mut groups = lock(&self.groups);
        let Some((etag, events)) = groups.get_mut(id) else {
            return Err(CalBridgeError::NotFound(id.clone()));
        };
        if etag != version {
            return Ok(None);
        }
        *etag = Self::new_etag();
        *events = entity;
        Ok(Some(etag.clone()))
    }

    fn try_delete(&self, id: &String, version: &String) -> CalBridgeResult<bool> {
        let mut groups = lock(&self.groups);
        match groups.get(id) {
            Some((etag, _)) if etag == version => {
                groups.remove(id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

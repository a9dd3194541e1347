//! In-process storage backends
//!
//! Used by `--dry-run` and by tests. Both keep counters of every call so
//! idempotence can be asserted, and can be told to fail specific operations.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use super::{CreateOutcome, KeyedStore, ObjectStore, TableState};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Default)]
struct ObjectState {
    exists: bool,
    location_constraint: Option<String>,
    objects: BTreeMap<String, StoredObject>,
    creates: u32,
    puts: u32,
    fail_probe: bool,
    fail_create: bool,
    fail_puts: bool,
    /// Probe says absent; create finds it already made by someone else
    race_on_create: bool,
}

#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    state: Mutex<ObjectState>,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Mutex::new(ObjectState::default()),
        }
    }

    /// Start with the bucket already present
    pub fn existing(bucket: impl Into<String>) -> Self {
        let store = Self::new(bucket);
        store.with_state(|s| s.exists = true);
        store
    }

    pub fn fail_probe(&self) {
        self.with_state(|s| s.fail_probe = true);
    }

    pub fn fail_create(&self) {
        self.with_state(|s| s.fail_create = true);
    }

    pub fn fail_puts(&self) {
        self.with_state(|s| s.fail_puts = true);
    }

    /// Let another writer create the bucket between probe and create
    pub fn race_on_create(&self) {
        self.with_state(|s| s.race_on_create = true);
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.with_state(|s| s.objects.get(key).cloned())
    }

    pub fn object_count(&self) -> usize {
        self.with_state(|s| s.objects.len())
    }

    /// Successful bucket creations
    pub fn creates(&self) -> u32 {
        self.with_state(|s| s.creates)
    }

    /// Successful object writes
    pub fn puts(&self) -> u32 {
        self.with_state(|s| s.puts)
    }

    pub fn location_constraint(&self) -> Option<String> {
        self.with_state(|s| s.location_constraint.clone())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut ObjectState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        self.with_state(|s| {
            if s.fail_probe {
                return Err(StoreError::new("HeadBucket", "access denied"));
            }
            if s.race_on_create {
                return Ok(false);
            }
            Ok(s.exists)
        })
    }

    async fn create_bucket(
        &self,
        location_constraint: Option<&str>,
    ) -> Result<CreateOutcome, StoreError> {
        self.with_state(|s| {
            if s.fail_create {
                return Err(StoreError::new("CreateBucket", "invalid location constraint"));
            }
            if s.race_on_create {
                s.race_on_create = false;
                s.exists = true;
                return Ok(CreateOutcome::AlreadyExists);
            }
            if s.exists {
                return Ok(CreateOutcome::AlreadyExists);
            }
            s.exists = true;
            s.creates += 1;
            s.location_constraint = location_constraint.map(str::to_string);
            Ok(CreateOutcome::Created)
        })
    }

    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        self.with_state(|s| {
            if s.fail_puts {
                return Err(StoreError::new("PutObject", "service unavailable"));
            }
            if !s.exists {
                return Err(StoreError::new("PutObject", "no such bucket"));
            }
            s.puts += 1;
            s.objects.insert(
                key.to_string(),
                StoredObject {
                    body,
                    content_type: content_type.to_string(),
                },
            );
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
struct KeyedState {
    table: Option<TableState>,
    items: BTreeMap<String, Map<String, Value>>,
    creates: u32,
    puts: u32,
    /// Status checks that still report `Creating` after a create
    pending_polls: u32,
    fail_probe: bool,
    race_on_create: bool,
    failing_keys: HashSet<String>,
}

#[derive(Debug)]
pub struct MemoryKeyedStore {
    table: String,
    state: Mutex<KeyedState>,
}

impl MemoryKeyedStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            state: Mutex::new(KeyedState::default()),
        }
    }

    /// Start with an active table
    pub fn existing(table: impl Into<String>) -> Self {
        let store = Self::new(table);
        store.with_state(|s| s.table = Some(TableState::Active));
        store
    }

    /// After creation, report `Creating` for this many status checks
    pub fn with_creation_delay(self, polls: u32) -> Self {
        self.with_state(|s| s.pending_polls = polls);
        self
    }

    pub fn fail_probe(&self) {
        self.with_state(|s| s.fail_probe = true);
    }

    /// Let another writer create the table between probe and create.
    /// The table then goes through `Creating` as usual.
    pub fn race_on_create(&self) {
        self.with_state(|s| s.race_on_create = true);
    }

    /// Make every upsert for `key` fail
    pub fn fail_key(&self, key: impl Into<String>) {
        self.with_state(|s| {
            s.failing_keys.insert(key.into());
        });
    }

    pub fn item(&self, key: &str) -> Option<Map<String, Value>> {
        self.with_state(|s| s.items.get(key).cloned())
    }

    pub fn items(&self) -> BTreeMap<String, Map<String, Value>> {
        self.with_state(|s| s.items.clone())
    }

    pub fn len(&self) -> usize {
        self.with_state(|s| s.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Successful table creations
    pub fn creates(&self) -> u32 {
        self.with_state(|s| s.creates)
    }

    /// Successful upserts
    pub fn puts(&self) -> u32 {
        self.with_state(|s| s.puts)
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut KeyedState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

#[async_trait]
impl KeyedStore for MemoryKeyedStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn describe_table(&self) -> Result<Option<TableState>, StoreError> {
        self.with_state(|s| {
            if s.fail_probe {
                return Err(StoreError::new("DescribeTable", "access denied"));
            }
            if s.race_on_create {
                return Ok(None);
            }
            if s.table == Some(TableState::Creating) {
                if s.pending_polls == 0 {
                    s.table = Some(TableState::Active);
                } else {
                    s.pending_polls -= 1;
                }
            }
            Ok(s.table.clone())
        })
    }

    async fn create_table(&self) -> Result<CreateOutcome, StoreError> {
        self.with_state(|s| {
            if s.race_on_create {
                s.race_on_create = false;
                s.table = Some(TableState::Creating);
                return Ok(CreateOutcome::AlreadyExists);
            }
            if s.table.is_some() {
                return Ok(CreateOutcome::AlreadyExists);
            }
            s.table = Some(TableState::Creating);
            s.creates += 1;
            Ok(CreateOutcome::Created)
        })
    }

    async fn put_item(&self, item: Map<String, Value>) -> Result<(), StoreError> {
        self.with_state(|s| {
            if s.table != Some(TableState::Active) {
                return Err(StoreError::new("PutItem", "table not active"));
            }
            let key = match item.get("id") {
                Some(Value::String(id)) => id.clone(),
                _ => return Err(StoreError::new("PutItem", "missing string key 'id'")),
            };
            if s.failing_keys.contains(&key) {
                return Err(StoreError::new("PutItem", "provisioned throughput exceeded"));
            }
            s.puts += 1;
            s.items.insert(key, item);
            Ok(())
        })
    }
}

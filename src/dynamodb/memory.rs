use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use async_trait::async_trait;
use super::backend::*;

#[derive(Debug)]
struct MemoryTable {
    description: TableDescription,
    primary_key: Option<String>,
    sort_key: Option<String>,
    rows: BTreeMap<(String, String), Item>,
    competing_writes: Vec<Item>,
}

/// In-process `TableBackend` with DynamoDB's paging and conditional-write
/// behaviour, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: Mutex<HashMap<String, MemoryTable>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table with an arbitrary description, as if created out of band.
    pub fn insert_table(&self, table_name: &str, description: TableDescription) {
        let key_named = |key_type: KeyType| {
            description
                .key_schema
                .as_ref()
                .and_then(|schema| schema.iter().find(|k| k.key_type == key_type))
                .map(|k| k.attribute_name.clone())
        };
        let table = MemoryTable {
            primary_key: key_named(KeyType::Hash),
            sort_key: key_named(KeyType::Range),
            description,
            rows: BTreeMap::new(),
            competing_writes: Vec::new(),
        };
        self.lock().insert(table_name.to_string(), table);
    }

    pub fn contains_table(&self, table_name: &str) -> bool {
        self.lock().contains_key(table_name)
    }

    /// The next put on `table_name` finds `item` already written, as if
    /// another invocation wrote it between this one's read and its write.
    pub fn interleave_write(&self, table_name: &str, item: Item) {
        if let Some(table) = self.lock().get_mut(table_name) {
            table.competing_writes.push(item);
        }
    }

    pub fn item_count(&self, table_name: &str) -> usize {
        self.lock().get(table_name).map_or(0, |t| t.rows.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryTable>> {
        // a panic while holding the lock cannot leave a table half-written
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_table<T>(
        &self,
        table_name: &str,
        f: impl FnOnce(&mut MemoryTable) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut tables = self.lock();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| BackendError::TableNotFound(table_name.to_string()))?;
        f(table)
    }
}

impl MemoryTable {
    fn key_of(&self, item: &Item) -> Result<(String, String), BackendError> {
        let attr = |name: &Option<String>| {
            name.as_ref()
                .and_then(|n| item.get(n))
                .cloned()
                .ok_or_else(|| BackendError::Service("item is missing a key attribute".to_string()))
        };
        Ok((attr(&self.primary_key)?, attr(&self.sort_key)?))
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn create_table(&self, request: CreateTableRequest) -> Result<(), BackendError> {
        if self.contains_table(&request.table_name) {
            return Err(BackendError::Service(format!(
                "Table already exists: {}",
                request.table_name
            )));
        }
        self.insert_table(
            &request.table_name,
            TableDescription::composite_string(&request.primary_key, &request.sort_key),
        );
        Ok(())
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, BackendError> {
        self.with_table(table_name, |t| Ok(t.description.clone()))
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<PutOutcome, BackendError> {
        self.with_table(&request.table_name, |t| {
            for item in std::mem::take(&mut t.competing_writes) {
                let key = t.key_of(&item)?;
                t.rows.insert(key, item);
            }
            let key = t.key_of(&request.item)?;
            if request.if_absent.is_some() && t.rows.contains_key(&key) {
                return Ok(PutOutcome::ConditionFailed);
            }
            t.rows.insert(key, request.item);
            Ok(PutOutcome::Written)
        })
    }

    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError> {
        self.with_table(table_name, |t| {
            let key = t.key_of(&key)?;
            Ok(t.rows.get(&key).cloned())
        })
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError> {
        self.with_table(table_name, |t| {
            let key = t.key_of(&key)?;
            Ok(t.rows.remove(&key))
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage, BackendError> {
        self.with_table(&request.table_name, |t| {
            let start = match &request.exclusive_start_key {
                Some(start) => Some(t.key_of(start)?),
                None => None,
            };
            let limit = request.limit.map_or(usize::MAX, |l| l as usize);
            let items: Vec<Item> = t
                .rows
                .iter()
                .filter(|((pk, _), _)| *pk == request.primary_key_value)
                .filter(|(key, _)| start.as_ref().map_or(true, |s| *key > s))
                .take(limit)
                .map(|(_, item)| item.clone())
                .collect();
            // Like DynamoDB: a full page always reports where it stopped,
            // even when nothing follows.
            let last_evaluated_key = if items.len() == limit {
                items.last().map(|item| {
                    let mut key = Item::new();
                    for name in [&t.primary_key, &t.sort_key].into_iter().flatten() {
                        if let Some(v) = item.get(name) {
                            key.insert(name.clone(), v.clone());
                        }
                    }
                    key
                })
            } else {
                None
            };
            Ok(QueryPage {
                items,
                last_evaluated_key,
            })
        })
    }

    async fn delete_table(&self, table_name: &str) -> Result<(), BackendError> {
        self.lock()
            .remove(table_name)
            .map(|_| ())
            .ok_or_else(|| BackendError::TableNotFound(table_name.to_string()))
    }
}

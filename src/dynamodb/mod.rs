//! Bookkeeping table keyed by (primary key, sort key), both strings.
//!
//! Custom resources record every secondary resource they create under
//! `(physical_id, purpose)` so that retried Creates reuse it and Deletes can
//! find everything to tear down. This is not a general data store: values are
//! flat string maps and the only read patterns are point lookups and "all rows
//! under one physical id".
mod backend;
mod aws;
mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use crate::tag::Tag;

pub use backend::{
    AttributeDefinition,
    AttributeType,
    BackendError,
    CreateTableRequest,
    Item,
    KeySchemaElement,
    KeyType,
    PutItemRequest,
    PutOutcome,
    QueryPage,
    QueryRequest,
    TableBackend,
    TableDescription,
};
pub use self::aws::DynamoDbBackend;
pub use memory::MemoryBackend;

/// Attributes of one record, key attributes excluded.
pub type Attributes = HashMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("Could not get KeySchema for Table '{0}'")]
    MissingKeySchema(String),
    #[error("Could not get AttributeDefinitions for Table '{0}'")]
    MissingAttributeDefinitions(String),
    #[error("Could not find PrimaryKey of Table '{0}'")]
    MissingPrimaryKey(String),
    #[error("Could not find SortKey of Table '{0}'")]
    MissingSortKey(String),
    #[error("PrimaryKey '{key}' of Table '{table}' must be string type")]
    PrimaryKeyNotString { table: String, key: String },
    #[error("SortKey '{key}' of Table '{table}' must be string type")]
    SortKeyNotString { table: String, key: String },
    #[error("Query page limit must be at least 1")]
    ZeroPageLimit,
    #[error("Attempt to {0} on deleted table")]
    TableDeleted(&'static str),
    #[error("{operation} on Table '{table}' failed: {source}")]
    Backend {
        operation: &'static str,
        table: String,
        source: BackendError,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutItemArgs {
    pub primary_key_value: String,
    pub sort_key_value: String,
    pub attributes: Attributes,
    /// Overwrite an existing record at the same key. Off by default so an
    /// earlier record (and the resource it points at) is never orphaned.
    pub allow_overwrite: bool,
}

impl PutItemArgs {
    pub fn new(primary_key_value: impl Into<String>, sort_key_value: impl Into<String>) -> Self {
        PutItemArgs {
            primary_key_value: primary_key_value.into(),
            sort_key_value: sort_key_value.into(),
            attributes: Attributes::new(),
            allow_overwrite: false,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn allow_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }
}

/// Checks a table's key schema: one string HASH key and one string RANGE key.
/// Returns `(primary_key, sort_key)` attribute names.
pub fn validate_key_schema(
    table_name: &str,
    description: &TableDescription,
) -> Result<(String, String), TableError> {
    let key_schema = description
        .key_schema
        .as_ref()
        .ok_or_else(|| TableError::MissingKeySchema(table_name.to_string()))?;
    let attribute_definitions = description
        .attribute_definitions
        .as_ref()
        .ok_or_else(|| TableError::MissingAttributeDefinitions(table_name.to_string()))?;

    let key_named = |key_type: KeyType| {
        key_schema
            .iter()
            .find(|k| k.key_type == key_type)
            .map(|k| k.attribute_name.clone())
    };
    let primary_key = key_named(KeyType::Hash)
        .ok_or_else(|| TableError::MissingPrimaryKey(table_name.to_string()))?;
    let sort_key = key_named(KeyType::Range)
        .ok_or_else(|| TableError::MissingSortKey(table_name.to_string()))?;

    let is_string = |name: &str| {
        attribute_definitions
            .iter()
            .any(|d| d.attribute_name == name && d.attribute_type == AttributeType::String)
    };
    if !is_string(&primary_key) {
        return Err(TableError::PrimaryKeyNotString {
            table: table_name.to_string(),
            key: primary_key,
        });
    }
    if !is_string(&sort_key) {
        return Err(TableError::SortKeyNotString {
            table: table_name.to_string(),
            key: sort_key,
        });
    }
    Ok((primary_key, sort_key))
}

#[derive(Clone, Debug)]
pub struct CompositeStringIndexTable {
    backend: Arc<dyn TableBackend>,
    // None once delete_table() has succeeded
    table_name: Option<String>,
    primary_key: String,
    sort_key: String,
}

impl CompositeStringIndexTable {
    /// Creates a new table with the given key attribute names.
    pub async fn create_new(
        backend: Arc<dyn TableBackend>,
        name: &str,
        primary_key_name: &str,
        sort_key_name: &str,
        tags: Vec<Tag>,
    ) -> Result<Self, TableError> {
        info!("creating table {}", name);
        backend
            .create_table(CreateTableRequest {
                table_name: name.to_string(),
                primary_key: primary_key_name.to_string(),
                sort_key: sort_key_name.to_string(),
                tags,
            })
            .await
            .map_err(|source| TableError::Backend {
                operation: "CreateTable",
                table: name.to_string(),
                source,
            })?;
        Ok(CompositeStringIndexTable {
            backend,
            table_name: Some(name.to_string()),
            primary_key: primary_key_name.to_string(),
            sort_key: sort_key_name.to_string(),
        })
    }

    /// Attaches to an existing table after checking its key schema.
    pub async fn from_existing(backend: Arc<dyn TableBackend>, name: &str) -> Result<Self, TableError> {
        let description = backend
            .describe_table(name)
            .await
            .map_err(|source| TableError::Backend {
                operation: "DescribeTable",
                table: name.to_string(),
                source,
            })?;
        let (primary_key, sort_key) = validate_key_schema(name, &description)?;
        debug!("attached to table {} ({}, {})", name, &primary_key, &sort_key);
        Ok(CompositeStringIndexTable {
            backend,
            table_name: Some(name.to_string()),
            primary_key,
            sort_key,
        })
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    fn live_table(&self, operation: &'static str) -> Result<&str, TableError> {
        self.table_name
            .as_deref()
            .ok_or(TableError::TableDeleted(operation))
    }

    fn backend_error(&self, operation: &'static str, table: &str) -> impl FnOnce(BackendError) -> TableError {
        let table = table.to_string();
        move |source| TableError::Backend {
            operation,
            table,
            source,
        }
    }

    fn key(&self, primary_key_value: &str, sort_key_value: &str) -> Item {
        let mut key = Item::new();
        key.insert(self.primary_key.clone(), primary_key_value.to_string());
        key.insert(self.sort_key.clone(), sort_key_value.to_string());
        key
    }

    fn strip_keys(&self, mut item: Item) -> Attributes {
        item.remove(&self.primary_key);
        item.remove(&self.sort_key);
        item
    }

    /// Writes a record. Returns `false` when a record already exists at the
    /// key and `allow_overwrite` is off; nothing is written in that case.
    pub async fn put_item(&self, args: PutItemArgs) -> Result<bool, TableError> {
        let table = self.live_table("PutItem")?;
        let mut item = args.attributes;
        item.extend(self.key(&args.primary_key_value, &args.sort_key_value));
        let if_absent = if args.allow_overwrite {
            None
        } else {
            Some((self.primary_key.clone(), self.sort_key.clone()))
        };
        let outcome = self
            .backend
            .put_item(PutItemRequest {
                table_name: table.to_string(),
                item,
                if_absent,
            })
            .await
            .map_err(self.backend_error("PutItem", table))?;
        match outcome {
            PutOutcome::Written => Ok(true),
            PutOutcome::ConditionFailed => {
                debug!(
                    "record ({}, {}) already exists in {}; not overwritten",
                    &args.primary_key_value, &args.sort_key_value, table
                );
                Ok(false)
            }
        }
    }

    pub async fn get_item(
        &self,
        primary_key_value: &str,
        sort_key_value: &str,
    ) -> Result<Option<Attributes>, TableError> {
        let table = self.live_table("GetItem")?;
        let item = self
            .backend
            .get_item(table, self.key(primary_key_value, sort_key_value))
            .await
            .map_err(self.backend_error("GetItem", table))?;
        Ok(item.map(|i| self.strip_keys(i)))
    }

    /// Returns whether a record was actually removed.
    pub async fn delete_item(&self, primary_key_value: &str, sort_key_value: &str) -> Result<bool, TableError> {
        let table = self.live_table("DeleteItem")?;
        let deleted = self
            .backend
            .delete_item(table, self.key(primary_key_value, sort_key_value))
            .await
            .map_err(self.backend_error("DeleteItem", table))?;
        Ok(deleted.is_some())
    }

    /// All records under `primary_key_value`, keyed by sort key value.
    /// Follows pagination until the backend reports no further pages.
    /// A page limit of zero is rejected, as DynamoDB does.
    pub async fn query(
        &self,
        primary_key_value: &str,
        page_limit: Option<u32>,
    ) -> Result<HashMap<String, Attributes>, TableError> {
        let table = self.live_table("Query")?;
        if page_limit == Some(0) {
            return Err(TableError::ZeroPageLimit);
        }
        let mut records = HashMap::new();
        let mut exclusive_start_key = None;
        loop {
            let page = self
                .backend
                .query(QueryRequest {
                    table_name: table.to_string(),
                    primary_key: self.primary_key.clone(),
                    primary_key_value: primary_key_value.to_string(),
                    limit: page_limit,
                    exclusive_start_key,
                })
                .await
                .map_err(self.backend_error("Query", table))?;
            for item in page.items {
                if let Some(sort_value) = item.get(&self.sort_key).cloned() {
                    records.insert(sort_value, self.strip_keys(item));
                }
            }
            match page.last_evaluated_key {
                Some(key) => exclusive_start_key = Some(key),
                None => break,
            }
        }
        Ok(records)
    }

    /// Deletes the table. Deleting a table that is already gone succeeds.
    pub async fn delete_table(&mut self) -> Result<(), TableError> {
        let table = match &self.table_name {
            Some(table) => table.clone(),
            None => return Ok(()),
        };
        match self.backend.delete_table(&table).await {
            Ok(()) => info!("deleted table {}", &table),
            Err(BackendError::TableNotFound(_)) => info!("table {} was already deleted", &table),
            Err(source) => {
                return Err(TableError::Backend {
                    operation: "DeleteTable",
                    table,
                    source,
                })
            }
        }
        self.table_name = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "resources";

    async fn new_table(backend: &Arc<MemoryBackend>) -> CompositeStringIndexTable {
        CompositeStringIndexTable::create_new(backend.clone(), TABLE, "PhysicalId", "CustomResource", vec![])
            .await
            .unwrap()
    }

    fn schema_with(
        key_schema: Option<Vec<(&str, KeyType)>>,
        attributes: Option<Vec<(&str, AttributeType)>>,
    ) -> TableDescription {
        TableDescription {
            key_schema: key_schema.map(|ks| {
                ks.into_iter()
                    .map(|(name, key_type)| KeySchemaElement {
                        attribute_name: name.to_string(),
                        key_type,
                    })
                    .collect()
            }),
            attribute_definitions: attributes.map(|ads| {
                ads.into_iter()
                    .map(|(name, attribute_type)| AttributeDefinition {
                        attribute_name: name.to_string(),
                        attribute_type,
                    })
                    .collect()
            }),
        }
    }

    async fn from_existing_with(description: TableDescription) -> Result<CompositeStringIndexTable, TableError> {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert_table(TABLE, description);
        CompositeStringIndexTable::from_existing(backend, TABLE).await
    }

    #[tokio::test]
    async fn from_existing_accepts_composite_string_table() {
        let table = from_existing_with(TableDescription::composite_string("PK", "SK"))
            .await
            .unwrap();
        assert_eq!(table.primary_key(), "PK");
        assert_eq!(table.sort_key(), "SK");
        assert_eq!(table.table_name(), Some(TABLE));
    }

    #[tokio::test]
    async fn from_existing_requires_key_schema() {
        let err = from_existing_with(schema_with(None, Some(vec![("PK", AttributeType::String)])))
            .await
            .unwrap_err();
        assert_eq!(err, TableError::MissingKeySchema(TABLE.to_string()));
        assert!(err.to_string().contains("KeySchema"));
    }

    #[tokio::test]
    async fn from_existing_requires_attribute_definitions() {
        let err = from_existing_with(schema_with(Some(vec![("PK", KeyType::Hash)]), None))
            .await
            .unwrap_err();
        assert_eq!(err, TableError::MissingAttributeDefinitions(TABLE.to_string()));
        assert!(err.to_string().contains("AttributeDefinitions"));
    }

    #[tokio::test]
    async fn from_existing_requires_hash_key() {
        let err = from_existing_with(schema_with(
            Some(vec![("SK", KeyType::Range)]),
            Some(vec![("SK", AttributeType::String)]),
        ))
        .await
        .unwrap_err();
        assert_eq!(err, TableError::MissingPrimaryKey(TABLE.to_string()));
        assert!(err.to_string().contains("PrimaryKey"));
    }

    #[tokio::test]
    async fn from_existing_requires_range_key() {
        let err = from_existing_with(schema_with(
            Some(vec![("PK", KeyType::Hash)]),
            Some(vec![("PK", AttributeType::String)]),
        ))
        .await
        .unwrap_err();
        assert_eq!(err, TableError::MissingSortKey(TABLE.to_string()));
        assert!(err.to_string().contains("SortKey"));
    }

    #[tokio::test]
    async fn from_existing_requires_string_primary_key() {
        let err = from_existing_with(schema_with(
            Some(vec![("PK", KeyType::Hash), ("SK", KeyType::Range)]),
            Some(vec![("PK", AttributeType::Number), ("SK", AttributeType::String)]),
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, TableError::PrimaryKeyNotString { ref key, .. } if key == "PK"));
        assert!(err.to_string().contains("PrimaryKey 'PK'"));
        assert!(err.to_string().contains("must be string type"));
    }

    #[tokio::test]
    async fn from_existing_requires_string_sort_key() {
        let err = from_existing_with(schema_with(
            Some(vec![("PK", KeyType::Hash), ("SK", KeyType::Range)]),
            Some(vec![("PK", AttributeType::String), ("SK", AttributeType::Binary)]),
        ))
        .await
        .unwrap_err();
        assert!(matches!(err, TableError::SortKeyNotString { ref key, .. } if key == "SK"));
        assert!(err.to_string().contains("SortKey 'SK'"));
        assert!(err.to_string().contains("must be string type"));
    }

    #[tokio::test]
    async fn from_existing_on_missing_table_fails() {
        let backend = Arc::new(MemoryBackend::new());
        let err = CompositeStringIndexTable::from_existing(backend, "nope").await.unwrap_err();
        assert!(matches!(
            err,
            TableError::Backend { source: BackendError::TableNotFound(_), .. }
        ));
    }

    #[tokio::test]
    async fn create_new_fails_when_backend_fails() {
        let backend = Arc::new(MemoryBackend::new());
        new_table(&backend).await;
        let err = CompositeStringIndexTable::create_new(backend, TABLE, "A", "B", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TableError::Backend { operation: "CreateTable", .. }));
    }

    #[tokio::test]
    async fn put_refuses_to_overwrite_by_default() {
        let backend = Arc::new(MemoryBackend::new());
        let table = new_table(&backend).await;

        let first = PutItemArgs::new("id", "Certificate").attribute("ARN", "arn:one");
        assert!(table.put_item(first).await.unwrap());

        let second = PutItemArgs::new("id", "Certificate").attribute("ARN", "arn:two");
        assert!(!table.put_item(second.clone()).await.unwrap());
        let stored = table.get_item("id", "Certificate").await.unwrap().unwrap();
        assert_eq!(stored.get("ARN").map(String::as_str), Some("arn:one"));

        assert!(table.put_item(second.allow_overwrite(true)).await.unwrap());
        let stored = table.get_item("id", "Certificate").await.unwrap().unwrap();
        assert_eq!(stored.get("ARN").map(String::as_str), Some("arn:two"));
    }

    #[tokio::test]
    async fn get_strips_keys_and_reports_absence() {
        let backend = Arc::new(MemoryBackend::new());
        let table = new_table(&backend).await;
        table
            .put_item(PutItemArgs::new("id", "Private Key").attribute("ARN", "arn:key"))
            .await
            .unwrap();

        let attrs = table.get_item("id", "Private Key").await.unwrap().unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["ARN"], "arn:key");
        assert_eq!(table.get_item("id", "Certificate").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_item_reports_whether_anything_was_removed() {
        let backend = Arc::new(MemoryBackend::new());
        let table = new_table(&backend).await;
        table
            .put_item(PutItemArgs::new("id", "Certificate").attribute("ARN", "arn"))
            .await
            .unwrap();

        assert!(table.delete_item("id", "Certificate").await.unwrap());
        assert!(!table.delete_item("id", "Certificate").await.unwrap());
        assert!(!table.delete_item("other", "Certificate").await.unwrap());
    }

    #[tokio::test]
    async fn query_collects_every_page() {
        let backend = Arc::new(MemoryBackend::new());
        let table = new_table(&backend).await;
        for i in 0..20 {
            table
                .put_item(PutItemArgs::new("id", format!("key-{:02}", i)).attribute("ARN", format!("arn:{}", i)))
                .await
                .unwrap();
        }
        table
            .put_item(PutItemArgs::new("other", "key-00").attribute("ARN", "arn:other"))
            .await
            .unwrap();

        for page_limit in [None, Some(1), Some(3), Some(7), Some(20), Some(50)] {
            let records = table.query("id", page_limit).await.unwrap();
            assert_eq!(records.len(), 20, "page limit {:?}", page_limit);
            for i in 0..20 {
                let attrs = &records[&format!("key-{:02}", i)];
                assert_eq!(attrs["ARN"], format!("arn:{}", i));
                assert!(!attrs.contains_key("PhysicalId"));
                assert!(!attrs.contains_key("CustomResource"));
            }
        }
        assert!(table.query("missing", Some(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_rejects_zero_page_limit() {
        let backend = Arc::new(MemoryBackend::new());
        let table = new_table(&backend).await;
        table
            .put_item(PutItemArgs::new("id", "key").attribute("ARN", "arn"))
            .await
            .unwrap();
        assert_eq!(table.query("id", Some(0)).await.unwrap_err(), TableError::ZeroPageLimit);
        assert_eq!(table.query("id", Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleted_table_rejects_everything_but_another_delete() {
        let backend = Arc::new(MemoryBackend::new());
        let mut table = new_table(&backend).await;
        table.delete_table().await.unwrap();
        assert!(!backend.contains_table(TABLE));
        assert_eq!(table.table_name(), None);

        let put = table.put_item(PutItemArgs::new("id", "k")).await.unwrap_err();
        assert_eq!(put, TableError::TableDeleted("PutItem"));
        assert!(put.to_string().contains("deleted table"));
        assert_eq!(table.get_item("id", "k").await.unwrap_err(), TableError::TableDeleted("GetItem"));
        assert_eq!(table.delete_item("id", "k").await.unwrap_err(), TableError::TableDeleted("DeleteItem"));
        assert_eq!(table.query("id", None).await.unwrap_err(), TableError::TableDeleted("Query"));

        table.delete_table().await.unwrap();
    }

    #[tokio::test]
    async fn deleting_a_table_removed_elsewhere_succeeds() {
        let backend = Arc::new(MemoryBackend::new());
        let mut table = new_table(&backend).await;
        let mut other_handle = table.clone();
        other_handle.delete_table().await.unwrap();

        table.delete_table().await.unwrap();
        assert_eq!(table.table_name(), None);
    }
}

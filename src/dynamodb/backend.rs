use std::collections::HashMap;
use async_trait::async_trait;
use thiserror::Error;
use crate::tag::Tag;

/// A stored row: attribute name to string value, key attributes included.
pub type Item = HashMap<String, String>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("table '{0}' does not exist")]
    TableNotFound(String),
    #[error("{0}")]
    Service(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: AttributeType,
}

/// What `DescribeTable` reports about a table's keys. `None` means the
/// service omitted the field entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TableDescription {
    pub key_schema: Option<Vec<KeySchemaElement>>,
    pub attribute_definitions: Option<Vec<AttributeDefinition>>,
}

impl TableDescription {
    /// A description of a table keyed by two string attributes.
    pub fn composite_string(primary_key: &str, sort_key: &str) -> Self {
        TableDescription {
            key_schema: Some(vec![
                KeySchemaElement {
                    attribute_name: primary_key.to_string(),
                    key_type: KeyType::Hash,
                },
                KeySchemaElement {
                    attribute_name: sort_key.to_string(),
                    key_type: KeyType::Range,
                },
            ]),
            attribute_definitions: Some(vec![
                AttributeDefinition {
                    attribute_name: primary_key.to_string(),
                    attribute_type: AttributeType::String,
                },
                AttributeDefinition {
                    attribute_name: sort_key.to_string(),
                    attribute_type: AttributeType::String,
                },
            ]),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub primary_key: String,
    pub sort_key: String,
    pub tags: Vec<Tag>,
}

#[derive(Clone, Debug)]
pub struct PutItemRequest {
    pub table_name: String,
    pub item: Item,
    /// When set, the write only happens if neither key attribute exists yet.
    pub if_absent: Option<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    ConditionFailed,
}

#[derive(Clone, Debug)]
pub struct QueryRequest {
    pub table_name: String,
    pub primary_key: String,
    pub primary_key_value: String,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Item>,
}

#[derive(Clone, Debug, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Item>,
}

/// The handful of table operations the bookkeeping table needs.
#[async_trait]
pub trait TableBackend: Send + Sync + std::fmt::Debug {
    async fn create_table(&self, request: CreateTableRequest) -> Result<(), BackendError>;

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, BackendError>;

    async fn put_item(&self, request: PutItemRequest) -> Result<PutOutcome, BackendError>;

    /// `key` holds exactly the two key attributes.
    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError>;

    /// Returns the deleted item, if there was one.
    async fn delete_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError>;

    async fn query(&self, request: QueryRequest) -> Result<QueryPage, BackendError>;

    async fn delete_table(&self, table_name: &str) -> Result<(), BackendError>;
}

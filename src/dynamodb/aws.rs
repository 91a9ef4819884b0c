use std::collections::HashMap;
use async_trait::async_trait;
use aws_sdk_dynamodb as dynamodb;
use dynamodb::error::SdkError;
use dynamodb::operation::delete_table::DeleteTableError;
use dynamodb::operation::describe_table::DescribeTableError;
use dynamodb::operation::put_item::PutItemError;
use dynamodb::types::{
    AttributeValue,
    BillingMode,
    KeyType as DynamoKeyType,
    ReturnValue,
    ScalarAttributeType,
};
use tracing::debug;
use super::backend::*;

/// `TableBackend` over Amazon DynamoDB.
#[derive(Clone, Debug)]
pub struct DynamoDbBackend {
    client: dynamodb::Client,
}

impl DynamoDbBackend {
    pub fn new(client: dynamodb::Client) -> Self {
        DynamoDbBackend { client }
    }
}

fn service_error<E: std::fmt::Display>(operation: &str, e: E) -> BackendError {
    BackendError::Service(format!("{} failed; {}", operation, e))
}

fn to_attribute_map(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter()
        .map(|(k, v)| (k, AttributeValue::S(v)))
        .collect()
}

// Flat string view of an item; non-scalar attributes are dropped.
fn from_attribute_map(item: &HashMap<String, AttributeValue>) -> Item {
    item.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                AttributeValue::S(s) => s.clone(),
                AttributeValue::N(n) => n.clone(),
                AttributeValue::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.clone(), value))
        })
        .collect()
}

#[async_trait]
impl TableBackend for DynamoDbBackend {
    async fn create_table(&self, request: CreateTableRequest) -> Result<(), BackendError> {
        let definition = |name: &str| {
            dynamodb::types::AttributeDefinition::builder()
                .attribute_name(name)
                .attribute_type(ScalarAttributeType::S)
                .build()
                .map_err(|e| service_error("CreateTable", e))
        };
        let key = |name: &str, key_type: DynamoKeyType| {
            dynamodb::types::KeySchemaElement::builder()
                .attribute_name(name)
                .key_type(key_type)
                .build()
                .map_err(|e| service_error("CreateTable", e))
        };
        let tags = request
            .tags
            .iter()
            .map(|t| {
                dynamodb::types::Tag::builder()
                    .key(&t.key)
                    .value(&t.value)
                    .build()
                    .map_err(|e| service_error("CreateTable", e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .create_table()
            .table_name(&request.table_name)
            .attribute_definitions(definition(&request.primary_key)?)
            .attribute_definitions(definition(&request.sort_key)?)
            .key_schema(key(&request.primary_key, DynamoKeyType::Hash)?)
            .key_schema(key(&request.sort_key, DynamoKeyType::Range)?)
            .billing_mode(BillingMode::PayPerRequest)
            .set_tags(if tags.is_empty() { None } else { Some(tags) })
            .send()
            .await
            .map_err(|e| service_error("CreateTable", e.into_service_error()))?;
        Ok(())
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, BackendError> {
        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::ServiceError(ref service_err)
                    if matches!(service_err.err(), DescribeTableError::ResourceNotFoundException(_)) =>
                {
                    BackendError::TableNotFound(table_name.to_string())
                }
                e => service_error("DescribeTable", e.into_service_error()),
            })?;

        let table = output
            .table()
            .ok_or_else(|| BackendError::TableNotFound(table_name.to_string()))?;

        let key_schema = Some(table.key_schema())
            .filter(|schema| !schema.is_empty())
            .map(|schema| {
                schema
                    .iter()
                    .filter_map(|k| {
                        let key_type = match k.key_type() {
                            DynamoKeyType::Hash => KeyType::Hash,
                            DynamoKeyType::Range => KeyType::Range,
                            _ => return None,
                        };
                        Some(KeySchemaElement {
                            attribute_name: k.attribute_name().to_string(),
                            key_type,
                        })
                    })
                    .collect()
            });

        let attribute_definitions = Some(table.attribute_definitions())
            .filter(|defs| !defs.is_empty())
            .map(|defs| {
                defs.iter()
                    .filter_map(|d| {
                        let attribute_type = match d.attribute_type() {
                            ScalarAttributeType::S => AttributeType::String,
                            ScalarAttributeType::N => AttributeType::Number,
                            ScalarAttributeType::B => AttributeType::Binary,
                            _ => return None,
                        };
                        Some(AttributeDefinition {
                            attribute_name: d.attribute_name().to_string(),
                            attribute_type,
                        })
                    })
                    .collect()
            });

        Ok(TableDescription {
            key_schema,
            attribute_definitions,
        })
    }

    async fn put_item(&self, request: PutItemRequest) -> Result<PutOutcome, BackendError> {
        let mut put = self
            .client
            .put_item()
            .table_name(&request.table_name)
            .set_item(Some(to_attribute_map(request.item)));
        if let Some((primary_key, sort_key)) = &request.if_absent {
            put = put
                .condition_expression("attribute_not_exists(#PK) and attribute_not_exists(#SK)")
                .expression_attribute_names("#PK", primary_key)
                .expression_attribute_names("#SK", sort_key);
        }
        match put.send().await {
            Ok(_) => Ok(PutOutcome::Written),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), PutItemError::ConditionalCheckFailedException(_)) =>
            {
                debug!("conditional put rejected on {}", &request.table_name);
                Ok(PutOutcome::ConditionFailed)
            }
            Err(e) => Err(service_error("PutItem", e.into_service_error())),
        }
    }

    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError> {
        let output = self
            .client
            .get_item()
            .table_name(table_name)
            .set_key(Some(to_attribute_map(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| service_error("GetItem", e.into_service_error()))?;
        Ok(output.item().map(from_attribute_map))
    }

    async fn delete_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, BackendError> {
        let output = self
            .client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(to_attribute_map(key)))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| service_error("DeleteItem", e.into_service_error()))?;
        Ok(output
            .attributes()
            .filter(|attrs| !attrs.is_empty())
            .map(from_attribute_map))
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryPage, BackendError> {
        let output = self
            .client
            .query()
            .table_name(&request.table_name)
            .key_condition_expression("#PK = :PKV")
            .expression_attribute_names("#PK", &request.primary_key)
            .expression_attribute_values(":PKV", AttributeValue::S(request.primary_key_value.clone()))
            .consistent_read(true)
            .set_limit(request.limit.map(|l| l.min(i32::MAX as u32) as i32))
            .set_exclusive_start_key(request.exclusive_start_key.map(to_attribute_map))
            .send()
            .await
            .map_err(|e| service_error("Query", e.into_service_error()))?;

        Ok(QueryPage {
            items: output.items().iter().map(from_attribute_map).collect(),
            last_evaluated_key: output
                .last_evaluated_key()
                .filter(|key| !key.is_empty())
                .map(from_attribute_map),
        })
    }

    async fn delete_table(&self, table_name: &str) -> Result<(), BackendError> {
        match self.client.delete_table().table_name(table_name).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), DeleteTableError::ResourceNotFoundException(_)) =>
            {
                Err(BackendError::TableNotFound(table_name.to_string()))
            }
            Err(e) => Err(service_error("DeleteTable", e.into_service_error())),
        }
    }
}

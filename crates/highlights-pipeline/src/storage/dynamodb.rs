//! DynamoDB keyed store backend

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
        ScalarAttributeType, TableStatus,
    },
    Client,
};
use highlights_common::types::ID_FIELD;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, instrument};

use super::{CreateOutcome, KeyedStore, TableState};
use crate::error::StoreError;

#[derive(Clone)]
pub struct DynamoKeyedStore {
    client: Client,
    table: String,
}

impl DynamoKeyedStore {
    pub fn new(sdk_config: &SdkConfig, table: impl Into<String>) -> Self {
        Self {
            client: Client::new(sdk_config),
            table: table.into(),
        }
    }
}

fn sdk_error<E>(operation: &'static str, err: E) -> StoreError
where
    E: std::error::Error,
{
    StoreError::new(operation, DisplayErrorContext(err).to_string())
}

#[async_trait]
impl KeyedStore for DynamoKeyedStore {
    fn table(&self) -> &str {
        &self.table
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn describe_table(&self) -> Result<Option<TableState>, StoreError> {
        match self.client.describe_table().table_name(&self.table).send().await {
            Ok(output) => {
                let state = match output.table().and_then(|t| t.table_status()) {
                    Some(TableStatus::Active) => TableState::Active,
                    Some(TableStatus::Creating) => TableState::Creating,
                    Some(other) => TableState::Other(other.as_str().to_string()),
                    None => TableState::Other("unknown".to_string()),
                };
                debug!(state = ?state, "Described table");
                Ok(Some(state))
            },
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .map(|e| e.is_resource_not_found_exception())
                    .unwrap_or(false);

                if not_found {
                    Ok(None)
                } else {
                    Err(sdk_error("DescribeTable", err))
                }
            },
        }
    }

    #[instrument(skip(self), fields(table = %self.table))]
    async fn create_table(&self) -> Result<CreateOutcome, StoreError> {
        let key_schema = KeySchemaElement::builder()
            .attribute_name(ID_FIELD)
            .key_type(KeyType::Hash)
            .build()
            .map_err(|e| StoreError::new("CreateTable", e))?;

        let attribute = AttributeDefinition::builder()
            .attribute_name(ID_FIELD)
            .attribute_type(ScalarAttributeType::S)
            .build()
            .map_err(|e| StoreError::new("CreateTable", e))?;

        let result = self
            .client
            .create_table()
            .table_name(&self.table)
            .key_schema(key_schema)
            .attribute_definitions(attribute)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_resource_in_use_exception() => Ok(CreateOutcome::AlreadyExists),
                _ => Err(sdk_error("CreateTable", err)),
            },
        }
    }

    async fn put_item(&self, item: Map<String, Value>) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(&item)))
            .send()
            .await
            .map_err(|err| sdk_error("PutItem", err))?;

        Ok(())
    }
}

/// Convert a JSON object into a DynamoDB item
pub fn to_item(fields: &Map<String, Value>) -> HashMap<String, AttributeValue> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), to_attribute_value(value)))
        .collect()
}

pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(to_attribute_value).collect()),
        Value::Object(fields) => AttributeValue::M(to_item(fields)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() {
        assert_eq!(to_attribute_value(&json!("Dunk")), AttributeValue::S("Dunk".into()));
        assert_eq!(to_attribute_value(&json!(3)), AttributeValue::N("3".into()));
        assert_eq!(to_attribute_value(&json!(1.5)), AttributeValue::N("1.5".into()));
        assert_eq!(to_attribute_value(&json!(true)), AttributeValue::Bool(true));
        assert_eq!(to_attribute_value(&json!(null)), AttributeValue::Null(true));
    }

    #[test]
    fn test_nested_record() {
        let record = json!({
            "id": "abc",
            "fetch_date": "2024-05-01",
            "league": {"name": "NCAA", "tags": ["college", 1]}
        });

        let item = to_item(record.as_object().unwrap());
        assert_eq!(item["id"], AttributeValue::S("abc".into()));

        let league = item["league"].as_m().unwrap();
        assert_eq!(league["name"], AttributeValue::S("NCAA".into()));
        assert_eq!(
            league["tags"],
            AttributeValue::L(vec![
                AttributeValue::S("college".into()),
                AttributeValue::N("1".into())
            ])
        );
    }
}

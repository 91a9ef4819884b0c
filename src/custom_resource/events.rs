use serde_derive::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
    #[serde(other)]
    Unknown,
}

/// A CloudFormation custom resource request, with the resource properties
/// left untyped until the handler validates them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderRequest {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub resource_type: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Value>,
}

impl ProviderRequest {
    /// The resource properties, with an absent or `null` payload read as `{}`.
    pub fn properties(&self) -> Value {
        match &self.resource_properties {
            Value::Null => Value::Object(Default::default()),
            v => v.clone(),
        }
    }

    /// The properties before an Update, read like [`Self::properties`].
    pub fn old_properties(&self) -> Option<Value> {
        self.old_resource_properties.as_ref().map(|v| match v {
            Value::Null => Value::Object(Default::default()),
            v => v.clone(),
        })
    }
}

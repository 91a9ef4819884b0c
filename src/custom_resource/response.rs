use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use super::events::ProviderRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// The body CloudFormation expects at the request's `ResponseURL`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProviderResponse {
    pub status: ResponseStatus,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_echo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ProviderResponseBuilder {
    status: ResponseStatus,
    reason: Option<String>,
    physical_resource_id: String,
    stack_id: String,
    request_id: String,
    logical_resource_id: String,
    no_echo: Option<bool>,
    data: Option<Value>,
}

impl ProviderResponseBuilder {
    /// Starts a response echoing the request's identifiers. The physical id
    /// defaults to the one in the request, or its logical id when absent.
    pub fn from_event_ref(event: &ProviderRequest) -> Self {
        ProviderResponseBuilder {
            status: ResponseStatus::Failed,
            reason: None,
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| event.logical_resource_id.clone()),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            no_echo: None,
            data: None,
        }
    }

    pub fn status(mut self, status: ResponseStatus) -> Self {
        self.status = status;
        self
    }

    pub fn reason(mut self, reason: String) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn physical_resource_id(mut self, physical_resource_id: String) -> Self {
        self.physical_resource_id = physical_resource_id;
        self
    }

    pub fn no_echo(mut self, no_echo: bool) -> Self {
        self.no_echo = Some(no_echo);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn build(self) -> ProviderResponse {
        ProviderResponse {
            status: self.status,
            reason: self.reason.unwrap_or_else(|| match self.status {
                ResponseStatus::Success => "Ok".to_string(),
                ResponseStatus::Failed => "Unknown failure".to_string(),
            }),
            physical_resource_id: self.physical_resource_id,
            stack_id: self.stack_id,
            request_id: self.request_id,
            logical_resource_id: self.logical_resource_id,
            no_echo: self.no_echo,
            data: self.data,
        }
    }
}

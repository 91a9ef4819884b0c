use std::time::Duration;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use crate::digest::sha256_json;
use super::events::{ProviderRequest, RequestType};
use super::response::{ProviderResponse, ProviderResponseBuilder, ResponseStatus};

/// Time kept back from the Lambda deadline to report a timeout.
pub const DEADLINE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
#[error("Input did not pass validation check: {0}")]
pub struct ValidationError(pub String);

/// A CloudFormation custom resource.
///
/// Create and Update both run [`CustomResource::do_create`] under the
/// physical id derived from the resource properties, so an Update with new
/// properties provisions a new resource and CloudFormation deletes the old
/// one afterwards. `do_create` must be safe to repeat for one physical id and
/// `do_delete` must treat anything already gone as deleted.
#[async_trait]
pub trait CustomResource: Send + Sync {
    type Properties: DeserializeOwned + Send + Sync;
    type Data: Serialize + Send;

    /// Decodes the untyped `ResourceProperties` before any side effect.
    fn validate_input(&self, properties: &Value) -> Result<Self::Properties, ValidationError> {
        serde_json::from_value(properties.clone()).map_err(|e| ValidationError(e.to_string()))
    }

    async fn do_create(&self, physical_id: &str, properties: Self::Properties) -> anyhow::Result<Self::Data>;

    async fn do_delete(&self, physical_id: &str, properties: Self::Properties) -> anyhow::Result<()>;
}

pub fn physical_id(event: &ProviderRequest) -> String {
    sha256_json(&event.properties())
}

enum Outcome {
    Data(Value),
    Deleted,
    Unchanged,
}

// An Update whose properties hash to the id it already has changes nothing.
fn is_unchanged_update(physical_id: &str, event: &ProviderRequest) -> bool {
    event.request_type == RequestType::Update
        && event.physical_resource_id.as_deref() == Some(physical_id)
        && event.old_properties().map(|old| sha256_json(&old)).as_deref() == Some(physical_id)
}

async fn dispatch<R>(resource: &R, physical_id: &str, event: &ProviderRequest) -> anyhow::Result<Outcome>
where
    R: CustomResource + ?Sized,
{
    if event.request_type == RequestType::Unknown {
        anyhow::bail!("Unknown request type");
    }
    let properties = match resource.validate_input(&event.properties()) {
        Ok(properties) => properties,
        // Create validates before any side effect, so a resource whose
        // properties never validated has nothing to delete.
        Err(e) if event.request_type == RequestType::Delete => {
            warn!("{}; nothing to delete for {}", &e, physical_id);
            return Ok(Outcome::Deleted);
        }
        Err(e) => return Err(e.into()),
    };
    match event.request_type {
        RequestType::Update if is_unchanged_update(physical_id, event) => {
            info!("Properties of {} are unchanged, skipping update", physical_id);
            Ok(Outcome::Unchanged)
        }
        RequestType::Create | RequestType::Update => {
            let data = resource.do_create(physical_id, properties).await?;
            Ok(Outcome::Data(serde_json::to_value(data)?))
        }
        RequestType::Delete => {
            resource.do_delete(physical_id, properties).await?;
            Ok(Outcome::Deleted)
        }
        RequestType::Unknown => anyhow::bail!("Unknown request type"),
    }
}

/// Runs one lifecycle event to a terminal response. `remaining` is the time
/// left before the invocation is killed; the domain action gets that minus
/// [`DEADLINE_MARGIN`].
pub async fn handle_event<R>(resource: &R, event: &ProviderRequest, remaining: Option<Duration>) -> ProviderResponse
where
    R: CustomResource + ?Sized,
{
    let physical_id = physical_id(event);
    info!(
        "{:?} {} ({}) as {}",
        event.request_type, &event.logical_resource_id, &event.resource_type, &physical_id
    );

    let outcome = match remaining {
        Some(remaining) => {
            let budget = remaining.saturating_sub(DEADLINE_MARGIN);
            match tokio::time::timeout(budget, dispatch(resource, &physical_id, event)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow::anyhow!(
                    "Timed out after {} ms before the Lambda deadline",
                    budget.as_millis()
                )),
            }
        }
        None => dispatch(resource, &physical_id, event).await,
    };

    // CloudFormation only needs the id it already knows back on Delete.
    let response_id = match event.request_type {
        RequestType::Delete => event
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| physical_id.clone()),
        _ => physical_id.clone(),
    };
    let builder = ProviderResponseBuilder::from_event_ref(event).physical_resource_id(response_id);

    match outcome {
        Ok(Outcome::Data(data)) => {
            let builder = builder.status(ResponseStatus::Success);
            match data {
                Value::Null => builder.build(),
                data => builder.data(data).build(),
            }
        }
        Ok(Outcome::Deleted) | Ok(Outcome::Unchanged) => builder.status(ResponseStatus::Success).build(),
        Err(e) => {
            if e.is::<ValidationError>() {
                warn!("{}", &e);
            } else {
                error!("{:?} failed: {:#}", event.request_type, &e);
            }
            builder
                .status(ResponseStatus::Failed)
                .reason(format!("{:#}", e))
                .build()
        }
    }
}

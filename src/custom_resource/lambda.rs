use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use lambda_runtime::{service_fn, Error as LambdaError, LambdaEvent};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info};
use super::events::ProviderRequest;
use super::provider::{handle_event, CustomResource};
use super::response::{ProviderResponse, ResponseStatus};

/// Uploads the response to the presigned `ResponseURL`. The URL is signed
/// without a content type, so the header is sent empty.
pub async fn send_response(
    http: &reqwest::Client,
    response_url: &str,
    response: &ProviderResponse,
) -> Result<(), reqwest::Error> {
    let body = serde_json::to_vec(response).unwrap_or_default();
    debug!("sending {} byte response", body.len());
    http.put(response_url)
        .header(CONTENT_TYPE, "")
        .body(body)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

fn remaining_time(deadline_ms: u64) -> Option<Duration> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    Some(Duration::from_millis(deadline_ms).saturating_sub(now))
}

/// FAILED response for a payload that did not decode as a request, built
/// from whatever identifiers it still carries. `None` without a `ResponseURL`.
fn malformed_request_response(payload: &Value, reason: String) -> Option<(String, ProviderResponse)> {
    let field = |name: &str| payload.get(name).and_then(Value::as_str).map(str::to_string);
    let response_url = field("ResponseURL")?;
    let logical_resource_id = field("LogicalResourceId").unwrap_or_default();
    let response = ProviderResponse {
        status: ResponseStatus::Failed,
        reason,
        physical_resource_id: field("PhysicalResourceId").unwrap_or_else(|| logical_resource_id.clone()),
        stack_id: field("StackId").unwrap_or_default(),
        request_id: field("RequestId").unwrap_or_default(),
        logical_resource_id,
        no_echo: None,
        data: None,
    };
    Some((response_url, response))
}

async fn handle_invocation<R>(
    resource: &R,
    http: &reqwest::Client,
    event: LambdaEvent<Value>,
) -> Result<Value, LambdaError>
where
    R: CustomResource + ?Sized,
{
    let request = match ProviderRequest::deserialize(&event.payload) {
        Ok(request) => request,
        Err(e) => {
            error!("Malformed custom resource request: {}", &e);
            let reason = format!("Malformed request: {}", &e);
            if let Some((url, response)) = malformed_request_response(&event.payload, reason) {
                send_response(http, &url, &response).await?;
            }
            return Err(e.into());
        }
    };
    let remaining = remaining_time(event.context.deadline);
    let response = handle_event(resource, &request, remaining).await;
    info!(
        "{:?} {}: {:?}",
        request.request_type, &request.logical_resource_id, response.status
    );
    send_response(http, &request.response_url, &response).await?;
    Ok(serde_json::to_value(&response)?)
}

/// Serves `resource` on the Lambda runtime until the process is stopped.
pub async fn run<R>(resource: R) -> Result<(), LambdaError>
where
    R: CustomResource + 'static,
{
    let resource = Arc::new(resource);
    let http = reqwest::Client::new();
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let resource = resource.clone();
        let http = http.clone();
        async move { handle_invocation(resource.as_ref(), &http, event).await }
    }))
    .await
}

use std::sync::Arc;
use anyhow::Context;
use async_trait::async_trait;
use rfdk_custom_resource::custom_resource::{CustomResource, ValidationError};
use rfdk_custom_resource::secrets::{read_certificate_data, SecretsStore};
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use crate::deadline_client::{
    DeadlineClient,
    DeadlineClientOptions,
    Protocol,
    DEFAULT_RETRIES,
    DEFAULT_RETRY_WAIT_MS,
};
use crate::event_plugin_requests::EventPluginRequests;
use crate::spot_settings::{
    convert_fleet_configurations,
    convert_plugin_settings,
    security_settings,
    PluginSettingsInput,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProperties {
    pub hostname: String,
    pub port: String,
    pub protocol: Protocol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate_arn: Option<String>,
}

impl ConnectionProperties {
    pub fn port(&self) -> Result<u16, String> {
        self.port
            .trim()
            .parse()
            .map_err(|_| format!("connection.port must be a TCP port, got '{}'", &self.port))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SepConfiguratorProperties {
    pub connection: ConnectionProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_fleet_request_configurations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_plugin_configurations: Option<PluginSettingsInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_pools: Option<Vec<String>>,
}

/// Configures the Spot Event Plugin on a render queue. Nothing is created
/// that needs cleaning up, so Delete does nothing.
#[derive(Clone, Debug)]
pub struct SpotEventPluginConfigurator {
    secrets: Arc<dyn SecretsStore>,
    retries: u32,
    retry_wait_ms: u64,
}

impl SpotEventPluginConfigurator {
    pub fn new(secrets: Arc<dyn SecretsStore>) -> Self {
        SpotEventPluginConfigurator {
            secrets,
            retries: DEFAULT_RETRIES,
            retry_wait_ms: DEFAULT_RETRY_WAIT_MS,
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_wait_ms: u64) -> Self {
        self.retries = retries;
        self.retry_wait_ms = retry_wait_ms;
        self
    }

    async fn requests(&self, connection: &ConnectionProperties) -> anyhow::Result<EventPluginRequests> {
        let ca_pem = match &connection.ca_certificate_arn {
            Some(arn) => Some(
                read_certificate_data(self.secrets.as_ref(), arn)
                    .await
                    .context("Failed to read the render queue CA certificate")?,
            ),
            None => None,
        };
        let client = DeadlineClient::new(DeadlineClientOptions {
            ca_pem,
            retries: self.retries,
            retry_wait_ms: self.retry_wait_ms,
            ..DeadlineClientOptions::new(
                connection.hostname.clone(),
                connection.port().map_err(anyhow::Error::msg)?,
                connection.protocol,
            )
        })?;
        Ok(EventPluginRequests::new(client))
    }
}

#[async_trait]
impl CustomResource for SpotEventPluginConfigurator {
    type Properties = SepConfiguratorProperties;
    type Data = ();

    fn validate_input(&self, properties: &Value) -> Result<Self::Properties, ValidationError> {
        let props: SepConfiguratorProperties =
            serde_json::from_value(properties.clone()).map_err(|e| ValidationError(e.to_string()))?;
        props.connection.port().map_err(ValidationError)?;
        if let Some(settings) = &props.spot_plugin_configurations {
            convert_plugin_settings(settings).map_err(|e| ValidationError(e.to_string()))?;
        }
        if let Some(configs) = &props.spot_fleet_request_configurations {
            convert_fleet_configurations(configs).map_err(|e| ValidationError(e.to_string()))?;
        }
        Ok(props)
    }

    async fn do_create(&self, _physical_id: &str, props: SepConfiguratorProperties) -> anyhow::Result<()> {
        let requests = self.requests(&props.connection).await?;

        if let Some(pools) = &props.deadline_pools {
            requests.add_pools(pools).await.context("Failed to add Deadline pools")?;
        }
        if let Some(groups) = &props.deadline_groups {
            requests.add_groups(groups).await.context("Failed to add Deadline groups")?;
        }
        if let Some(configs) = &props.spot_fleet_request_configurations {
            let converted = convert_fleet_configurations(configs)?;
            requests
                .save_server_data(&serde_json::to_string(&converted)?)
                .await
                .context("Failed to save spot fleet request with configuration")?;
        }
        if let Some(settings) = &props.spot_plugin_configurations {
            let mut dl_init = convert_plugin_settings(settings)?;
            dl_init.extend(security_settings());
            requests
                .configure_plugin(&dl_init)
                .await
                .context("Failed to save Spot Event Plugin Configurations")?;
        }
        info!("Spot Event Plugin configured on {}", &props.connection.hostname);
        Ok(())
    }

    async fn do_delete(&self, _physical_id: &str, _props: SepConfiguratorProperties) -> anyhow::Result<()> {
        // Plugin configuration is left in place for the render queue.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfdk_custom_resource::custom_resource::{handle_event, ProviderRequest, ResponseStatus};
    use rfdk_custom_resource::secrets::MemorySecretsStore;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event(request_type: &str, properties: Value) -> ProviderRequest {
        serde_json::from_value(json!({
            "RequestType": request_type,
            "ResponseURL": "https://example.com/response",
            "StackId": "stack",
            "RequestId": "request",
            "ResourceType": "Custom::RFDK_ConfigureSpotEventPlugin",
            "LogicalResourceId": "SEP",
            "ResourceProperties": properties
        }))
        .unwrap()
    }

    fn configurator() -> SpotEventPluginConfigurator {
        SpotEventPluginConfigurator::new(Arc::new(MemorySecretsStore::new())).with_retries(2, 10)
    }

    fn connection(server: &MockServer) -> Value {
        json!({
            "hostname": server.address().ip().to_string(),
            "port": server.address().port().to_string(),
            "protocol": "HTTP"
        })
    }

    async fn accept(server: &MockServer, route: &str, body: Value) {
        Mock::given(method("POST"))
            .and(path(route))
            .and(body_partial_json(body))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ServerData": []})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn create_configures_everything_in_order() {
        let server = MockServer::start().await;
        accept(&server, "/db/settings/collections/pools/save", json!({"Pool": ["pool1"]})).await;
        accept(&server, "/db/settings/collections/groups/save", json!({"Group": ["group_name1"]})).await;
        accept(&server, "/rcs/v1/describeServerData", json!({"ServerData": ["event.plugin.spot"]})).await;
        accept(&server, "/rcs/v1/putServerData", json!({"ConcurrencyToken": ""})).await;
        accept(
            &server,
            "/db/plugins/event/config/save",
            json!({"DlInit": [
                {"Key": "State", "Value": "Global Enabled"},
                {"Key": "StrictHardCap", "Value": true},
                {"Key": "UseLocalCredentials", "Value": true},
                {"Key": "NamedProfile", "Value": ""}
            ]}),
        )
        .await;

        let response = handle_event(
            &configurator(),
            &event(
                "Create",
                json!({
                    "connection": connection(&server),
                    "spotFleetRequestConfigurations": {"group_name1": {"TargetCapacity": "1"}},
                    "spotPluginConfigurations": {"state": "Global Enabled", "strictHardCap": "true"},
                    "deadlineGroups": ["group_name1"],
                    "deadlinePools": ["pool1"]
                }),
            ),
            None,
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Success, "{}", response.reason);
        assert!(response.data.is_none());

        let paths: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "/db/settings/collections/pools/save",
                "/db/settings/collections/groups/save",
                "/rcs/v1/describeServerData",
                "/rcs/v1/putServerData",
                "/db/plugins/event/config/save",
            ]
        );
        let put: Value = server.received_requests().await.unwrap()[3].body_json().unwrap();
        let config: Value = serde_json::from_str(put["ServerData"][0]["ServerDataDictionary"]["Config"].as_str().unwrap()).unwrap();
        assert_eq!(config, json!({"group_name1": {"TargetCapacity": 1}}));
    }

    #[tokio::test]
    async fn unavailable_render_queue_fails_create() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let response = handle_event(
            &configurator(),
            &event("Create", json!({"connection": connection(&server), "deadlinePools": ["p"]})),
            None,
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.reason.starts_with("Failed to add Deadline pools"));
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn invalid_settings_fail_validation() {
        let response = handle_event(
            &configurator(),
            &event(
                "Create",
                json!({
                    "connection": {"hostname": "rq", "port": "4433", "protocol": "HTTPS"},
                    "spotPluginConfigurations": {"idleShutdown": "later"}
                }),
            ),
            None,
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.reason.contains("IdleShutdown must be a number"));

        let bad_port = handle_event(
            &configurator(),
            &event("Create", json!({"connection": {"hostname": "rq", "port": "http", "protocol": "HTTP"}})),
            None,
        )
        .await;
        assert!(bad_port.reason.contains("connection.port"));
    }

    #[tokio::test]
    async fn delete_touches_nothing() {
        let server = MockServer::start().await;
        let response = handle_event(
            &configurator(),
            &event("Delete", json!({"connection": connection(&server)})),
            None,
        )
        .await;
        assert_eq!(response.status, ResponseStatus::Success);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}

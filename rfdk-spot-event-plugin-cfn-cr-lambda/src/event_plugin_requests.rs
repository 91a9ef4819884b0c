use serde_json::{json, Value};
use tracing::info;
use crate::deadline_client::{DeadlineClient, DeadlineError};
use crate::spot_settings::PluginSetting;

/// Server data entry holding the spot fleet request configurations.
pub const SERVER_DATA_ID: &str = "event.plugin.spot";

const DESCRIBE_SERVER_DATA: &str = "/rcs/v1/describeServerData";
const PUT_SERVER_DATA: &str = "/rcs/v1/putServerData";
const SAVE_PLUGIN_CONFIG: &str = "/db/plugins/event/config/save";
const SAVE_GROUPS: &str = "/db/settings/collections/groups/save";
const SAVE_POOLS: &str = "/db/settings/collections/pools/save";

/// Deadline requests that configure the Spot Event Plugin.
#[derive(Clone, Debug)]
pub struct EventPluginRequests {
    client: DeadlineClient,
}

impl EventPluginRequests {
    pub fn new(client: DeadlineClient) -> Self {
        EventPluginRequests { client }
    }

    /// Adds groups to Deadline, keeping any that already exist.
    pub async fn add_groups(&self, groups: &[String]) -> Result<(), DeadlineError> {
        if groups.is_empty() {
            return Ok(());
        }
        info!("adding groups {:?}", groups);
        self.client
            .post_request(SAVE_GROUPS, &json!({"Group": groups, "OverwriteGroups": false}))
            .await?;
        Ok(())
    }

    /// Adds pools to Deadline, keeping any that already exist.
    pub async fn add_pools(&self, pools: &[String]) -> Result<(), DeadlineError> {
        if pools.is_empty() {
            return Ok(());
        }
        info!("adding pools {:?}", pools);
        self.client
            .post_request(SAVE_POOLS, &json!({"Pool": pools, "OverwritePools": false}))
            .await?;
        Ok(())
    }

    /// Token of the plugin's server data entry; empty when there is none yet.
    /// Entries for other ids are ignored.
    pub async fn concurrency_token(&self) -> Result<String, DeadlineError> {
        let response = self
            .client
            .post_request(DESCRIBE_SERVER_DATA, &json!({"ServerData": [SERVER_DATA_ID]}))
            .await?;
        let unexpected = |message: &str| DeadlineError::UnexpectedResponse {
            path: DESCRIBE_SERVER_DATA.to_string(),
            message: message.to_string(),
        };
        let entries = response
            .get("ServerData")
            .and_then(Value::as_array)
            .ok_or_else(|| unexpected("missing ServerData list"))?;
        let entry = entries
            .iter()
            .find(|entry| entry.get("ID").and_then(Value::as_str) == Some(SERVER_DATA_ID));
        match entry {
            None => Ok(String::new()),
            Some(entry) => entry
                .get("ConcurrencyToken")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| unexpected("server data entry has no ConcurrencyToken")),
        }
    }

    /// Stores `config` as the plugin's server data, echoing the current
    /// concurrency token so a concurrent writer is not overwritten.
    pub async fn save_server_data(&self, config: &str) -> Result<(), DeadlineError> {
        let token = self.concurrency_token().await?;
        info!("saving server data configuration");
        self.client
            .post_request(
                PUT_SERVER_DATA,
                &json!({
                    "ServerData": [{
                        "ID": SERVER_DATA_ID,
                        "ServerDataDictionary": {"Config": config},
                    }],
                    "ConcurrencyToken": token,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn configure_plugin(&self, settings: &[PluginSetting]) -> Result<(), DeadlineError> {
        info!("saving plugin configuration {:?}", settings);
        self.client
            .post_request(
                SAVE_PLUGIN_CONFIG,
                &json!({
                    "ID": "spot",
                    "DebugLogging": false,
                    "DlInit": settings,
                    "Icon": null,
                    "Limits": [],
                    "Meta": [],
                    "Name": "Spot",
                    "PluginEnabled": 1,
                }),
            )
            .await?;
        Ok(())
    }
}

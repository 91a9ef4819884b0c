//! Conversion of CloudFormation's all-string properties into the typed JSON
//! the Spot Event Plugin expects.
use serde_derive::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{key} must be a boolean, got '{value}'")]
    NotBoolean { key: String, value: String },
    #[error("{key} must be a number, got '{value}'")]
    NotNumber { key: String, value: String },
}

/// Plugin settings as the construct passes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettingsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_instance_status: Option<String>,
    #[serde(rename = "deleteEC2SpotInterruptedWorkers", default, skip_serializing_if = "Option::is_none")]
    pub delete_ec2_spot_interrupted_workers: Option<String>,
    #[serde(rename = "deleteSEPTerminatedWorkers", default, skip_serializing_if = "Option::is_none")]
    pub delete_sep_terminated_workers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_shutdown: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_job_task_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_resource_tracker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_instances_started_per_cycle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_hard_cap: Option<String>,
}

/// One entry of the plugin's `DlInit` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PluginSetting {
    pub key: String,
    pub value: Value,
}

impl PluginSetting {
    pub fn new(key: &str, value: Value) -> Self {
        PluginSetting {
            key: key.to_string(),
            value,
        }
    }
}

pub fn to_bool(key: &str, value: &str) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(SettingsError::NotBoolean {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

pub fn to_int(key: &str, value: &str) -> Result<i64, SettingsError> {
    value.trim().parse().map_err(|_| SettingsError::NotNumber {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn to_number(key: &str, value: &str) -> Result<Number, SettingsError> {
    if let Ok(i) = to_int(key, value) {
        return Ok(Number::from(i));
    }
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| SettingsError::NotNumber {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Plugin settings in the plugin's own key names, with typed values.
/// Settings left unset are omitted so the plugin keeps its defaults.
pub fn convert_plugin_settings(input: &PluginSettingsInput) -> Result<Vec<PluginSetting>, SettingsError> {
    let mut settings = Vec::new();
    let mut text = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            settings.push(PluginSetting::new(key, Value::String(v.clone())));
        }
    };
    text("AWSInstanceStatus", &input.aws_instance_status);
    text("Logging", &input.logging_level);
    text("PreJobTaskMode", &input.pre_job_task_mode);
    text("Region", &input.region);
    text("State", &input.state);

    let booleans = [
        ("DeleteInterruptedSlaves", &input.delete_ec2_spot_interrupted_workers),
        ("DeleteTerminatedSlaves", &input.delete_sep_terminated_workers),
        ("ResourceTracker", &input.enable_resource_tracker),
        ("StrictHardCap", &input.strict_hard_cap),
    ];
    for (key, value) in booleans {
        if let Some(v) = value {
            settings.push(PluginSetting::new(key, Value::Bool(to_bool(key, v)?)));
        }
    }

    let integers = [
        ("IdleShutdown", &input.idle_shutdown),
        ("StaggerInstances", &input.maximum_instances_started_per_cycle),
    ];
    for (key, value) in integers {
        if let Some(v) = value {
            settings.push(PluginSetting::new(key, Value::from(to_int(key, v)?)));
        }
    }
    Ok(settings)
}

/// The plugin always authenticates with the render queue host's own role.
pub fn security_settings() -> Vec<PluginSetting> {
    vec![
        PluginSetting::new("UseLocalCredentials", Value::Bool(true)),
        PluginSetting::new("NamedProfile", Value::String(String::new())),
    ]
}

const NUMBER_FIELDS: &[&str] = &[
    "TargetCapacity",
    "WeightedCapacity",
    "Priority",
    "Iops",
    "VolumeSize",
    "DeviceIndex",
    "Throughput",
];

const BOOLEAN_FIELDS: &[&str] = &[
    "ReplaceUnhealthyInstances",
    "TerminateInstancesWithExpiration",
    "AssociatePublicIpAddress",
    "DeleteOnTermination",
    "Encrypted",
    "Enabled",
    "EbsOptimized",
];

fn convert_value(key: Option<&str>, value: Value) -> Result<Value, SettingsError> {
    match value {
        Value::Object(map) => {
            let mut converted = Map::new();
            for (k, v) in map {
                let v = convert_value(Some(&k), v)?;
                converted.insert(k, v);
            }
            Ok(Value::Object(converted))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|v| convert_value(key, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::String(s) => match key {
            Some(k) if NUMBER_FIELDS.contains(&k) => Ok(Value::Number(to_number(k, &s)?)),
            Some(k) if BOOLEAN_FIELDS.contains(&k) => Ok(Value::Bool(to_bool(k, &s)?)),
            _ => Ok(Value::String(s)),
        },
        other => Ok(other),
    }
}

/// Spot fleet request configurations keyed by Deadline group, with the
/// numeric and boolean fields CloudFormation stringified turned back.
pub fn convert_fleet_configurations(configurations: &Value) -> Result<Value, SettingsError> {
    convert_value(None, configurations.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plugin_settings_are_typed() {
        let input: PluginSettingsInput = serde_json::from_value(json!({
            "awsInstanceStatus": "Disabled",
            "deleteEC2SpotInterruptedWorkers": "true",
            "deleteSEPTerminatedWorkers": "FALSE",
            "enableResourceTracker": "true",
            "idleShutdown": "10",
            "loggingLevel": "Standard",
            "maximumInstancesStartedPerCycle": "50",
            "preJobTaskMode": "Conservative",
            "region": "us-west-2",
            "state": "Global Enabled",
            "strictHardCap": "false"
        }))
        .unwrap();
        let settings = convert_plugin_settings(&input).unwrap();
        let by_key: Map<String, Value> = settings.into_iter().map(|s| (s.key, s.value)).collect();
        assert_eq!(
            Value::Object(by_key),
            json!({
                "AWSInstanceStatus": "Disabled",
                "DeleteInterruptedSlaves": true,
                "DeleteTerminatedSlaves": false,
                "IdleShutdown": 10,
                "Logging": "Standard",
                "PreJobTaskMode": "Conservative",
                "Region": "us-west-2",
                "ResourceTracker": true,
                "StaggerInstances": 50,
                "State": "Global Enabled",
                "StrictHardCap": false
            })
        );
    }

    #[test]
    fn unset_plugin_settings_are_omitted() {
        let input = PluginSettingsInput {
            state: Some("Disabled".to_string()),
            ..Default::default()
        };
        assert_eq!(
            convert_plugin_settings(&input).unwrap(),
            vec![PluginSetting::new("State", json!("Disabled"))]
        );
    }

    #[test]
    fn bad_plugin_values_name_the_setting() {
        let input = PluginSettingsInput {
            idle_shutdown: Some("soon".to_string()),
            ..Default::default()
        };
        assert_eq!(
            convert_plugin_settings(&input).unwrap_err().to_string(),
            "IdleShutdown must be a number, got 'soon'"
        );
    }

    #[test]
    fn fleet_configuration_fields_are_typed() {
        let converted = convert_fleet_configurations(&json!({
            "group_name1": {
                "AllocationStrategy": "capacityOptimized",
                "IamFleetRole": "arn:aws:iam::123456789012:role/fleet",
                "TargetCapacity": "2",
                "ReplaceUnhealthyInstances": "true",
                "TerminateInstancesWithExpiration": "true",
                "LaunchTemplateConfigs": [{
                    "LaunchTemplateSpecification": {"Version": "$Latest"},
                    "Overrides": [{"WeightedCapacity": "1.5", "Priority": "1", "SubnetId": "subnet-1"}]
                }],
                "TagSpecifications": [{"ResourceType": "spot-fleet-request", "Tags": [{"Key": "k", "Value": "true"}]}]
            }
        }))
        .unwrap();
        let group = &converted["group_name1"];
        assert_eq!(group["TargetCapacity"], json!(2));
        assert_eq!(group["ReplaceUnhealthyInstances"], json!(true));
        let overrides = &group["LaunchTemplateConfigs"][0]["Overrides"][0];
        assert_eq!(overrides["WeightedCapacity"], json!(1.5));
        assert_eq!(overrides["Priority"], json!(1));
        assert_eq!(overrides["SubnetId"], json!("subnet-1"));
        assert_eq!(group["LaunchTemplateConfigs"][0]["LaunchTemplateSpecification"]["Version"], json!("$Latest"));
        assert_eq!(group["TagSpecifications"][0]["Tags"][0]["Value"], json!("true"));
    }

    #[test]
    fn security_settings_use_local_credentials() {
        assert_eq!(
            serde_json::to_value(security_settings()).unwrap(),
            json!([{"Key": "UseLocalCredentials", "Value": true}, {"Key": "NamedProfile", "Value": ""}])
        );
    }
}

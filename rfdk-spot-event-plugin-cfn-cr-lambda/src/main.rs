use std::sync::Arc;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager as secretsmanager;
use lambda_runtime::Error as LambdaError;
use rfdk_custom_resource::config::HandlerSettings;
use rfdk_custom_resource::custom_resource::run;
use rfdk_custom_resource::secrets::SecretsManagerStore;
use rfdk_spot_event_plugin_cfn_cr_lambda::SpotEventPluginConfigurator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    let settings = HandlerSettings::from_env();
    tracing_subscriber::fmt()
        .with_max_level(settings.log_level())
        .without_time() //disabled because CloudWatch will add ingest time.
        .init();

    info!("Lambda bootstrap invoked");

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let secrets = Arc::new(SecretsManagerStore::new(secretsmanager::Client::new(&aws_config)));

    run(SpotEventPluginConfigurator::new(secrets)).await
}

use std::sync::Arc;
use aws_config::BehaviorVersion;
use aws_sdk_acm as acm;
use aws_sdk_dynamodb as dynamodb;
use aws_sdk_secretsmanager as secretsmanager;
use lambda_runtime::Error as LambdaError;
use rfdk_acm_cfn_cr_lambda::acm::AcmClient;
use rfdk_acm_cfn_cr_lambda::AcmCertificateImporter;
use rfdk_custom_resource::config::HandlerSettings;
use rfdk_custom_resource::custom_resource::run;
use rfdk_custom_resource::dynamodb::{CompositeStringIndexTable, DynamoDbBackend};
use rfdk_custom_resource::secrets::SecretsManagerStore;
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
    let backend = Arc::new(DynamoDbBackend::new(dynamodb::Client::new(&aws_config)));
    let table = CompositeStringIndexTable::from_existing(backend, settings.require_table_name()?).await?;
    let secrets = Arc::new(SecretsManagerStore::new(secretsmanager::Client::new(&aws_config)));
    let acm_client = Arc::new(AcmClient::new(acm::Client::new(&aws_config)));

    run(AcmCertificateImporter::new(table, secrets, acm_client, settings.debug)).await
}

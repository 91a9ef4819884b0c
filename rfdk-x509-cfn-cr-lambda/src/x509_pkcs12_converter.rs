use aws_config::BehaviorVersion;
use lambda_runtime::Error as LambdaError;
use rfdk_custom_resource::config::HandlerSettings;
use rfdk_custom_resource::custom_resource::run;
use rfdk_x509_cfn_cr_lambda::{X509Common, X509ToPkcs12};
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
    let common = X509Common::connect(&aws_config, &settings).await?;

    run(X509ToPkcs12::new(common)).await
}

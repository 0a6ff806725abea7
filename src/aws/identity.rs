use super::sdk_failure;
use anyhow::{anyhow, Result};
use aws_config::SdkConfig;
use tracing::{debug, warn};

/// Who is calling, and where. Used to build resource ARNs.
#[derive(Clone, Debug, PartialEq)]
pub struct AwsInfo {
    pub account_id: String,
    pub partition: String,
    pub user_arn: String,
    pub region: String,
    pub account_alias: Option<String>,
}

impl AwsInfo {
    /// Last segment of the caller ARN.
    pub fn user_name(&self) -> &str {
        self.user_arn.rsplit(':').next().unwrap_or(&self.user_arn)
    }

    pub fn cluster_arn(&self, cluster_id: &str) -> String {
        format!(
            "arn:{}:rds:{}:{}:cluster:{}",
            self.partition, self.region, self.account_id, cluster_id
        )
    }

    pub fn secret_arn(&self, secret_name: &str) -> String {
        format!(
            "arn:{}:secretsmanager:{}:{}:secret:{}",
            self.partition, self.region, self.account_id, secret_name
        )
    }
}

/// Partition field of an ARN (`aws`, `aws-cn`, ...).
pub fn partition_of(arn: &str) -> Result<&str> {
    let mut fields = arn.split(':');
    match (fields.next(), fields.next()) {
        (Some("arn"), Some(partition)) if !partition.is_empty() => Ok(partition),
        _ => Err(anyhow!("Malformed caller ARN '{}'", arn)),
    }
}

/// Resolve the caller through STS, plus the account alias when IAM allows listing it.
pub async fn caller_identity(config: &SdkConfig) -> Result<AwsInfo> {
    let region = config
        .region()
        .map(|region| region.to_string())
        .ok_or_else(|| anyhow!("No AWS region configured; pass --region or set AWS_REGION"))?;

    let sts = aws_sdk_sts::Client::new(config);
    let identity = sts
        .get_caller_identity()
        .send()
        .await
        .map_err(|err| sdk_failure("Failed to get caller identity", err))?;

    let account_id = identity
        .account()
        .ok_or_else(|| anyhow!("Caller identity has no account id"))?
        .to_string();
    let user_arn = identity
        .arn()
        .ok_or_else(|| anyhow!("Caller identity has no ARN"))?
        .to_string();
    let partition = partition_of(&user_arn)?.to_string();

    let iam = aws_sdk_iam::Client::new(config);
    let account_alias = match iam.list_account_aliases().send().await {
        Ok(output) => output.account_aliases().first().cloned(),
        Err(err) => {
            warn!("{}", sdk_failure("Could not list account aliases", err));
            None
        }
    };

    debug!(%account_id, %user_arn, "resolved caller identity");

    Ok(AwsInfo {
        account_id,
        partition,
        user_arn,
        region,
        account_alias,
    })
}

/*!
 * AWS session setup
 *
 * Shared SDK configuration, caller identity, and discovery of the cluster
 * and secret the shell connects with.
 */

pub mod identity;
pub mod select;

pub use identity::{caller_identity, AwsInfo};
pub use select::{select_cluster, select_secret};

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_rdsdata::config::Region;
use aws_sdk_rdsdata::error::DisplayErrorContext;

/// Load SDK configuration, overriding the environment's profile and region when given.
pub async fn load_config(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

fn sdk_failure<E: std::error::Error>(action: &str, err: E) -> anyhow::Error {
    anyhow::anyhow!("{}: {}", action, DisplayErrorContext(err))
}

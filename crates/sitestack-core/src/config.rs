//! Stack configuration
//!
//! Every resolution sets the provider settings and the caller's values on the
//! stack. Caller values live under stack-qualified keys (`<stack>:bucketName`)
//! so they can be read back with [`spec_from_config`].

use crate::spec::ResourceSpec;
use serde::{Deserialize, Serialize};
use sitestack_engine::{ConfigMap, ConfigValue};

pub const PROFILE_KEY: &str = "aws:profile";
pub const REGION_KEY: &str = "aws:region";
pub const BUCKET_NAME_KEY: &str = "bucketName";
pub const CUSTOM_MESSAGE_KEY: &str = "customMessage";

pub const DEFAULT_PROFILE: &str = "dev";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Cloud provider settings shared by every stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub profile: String,
    pub region: String,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// `<stack>:<key>`
pub fn stack_key(stack: &str, key: &str) -> String {
    format!("{}:{}", stack, key)
}

/// Configuration applied to `stack` before any lifecycle verb
pub fn stack_config(settings: &ProviderSettings, stack: &str, spec: &ResourceSpec) -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert(PROFILE_KEY.to_string(), ConfigValue::plain(&settings.profile));
    config.insert(REGION_KEY.to_string(), ConfigValue::plain(&settings.region));
    config.insert(
        stack_key(stack, BUCKET_NAME_KEY),
        ConfigValue::plain(&spec.bucket_name),
    );
    config.insert(
        stack_key(stack, CUSTOM_MESSAGE_KEY),
        ConfigValue::plain(&spec.custom_message),
    );
    config
}

/// Read the caller's values back out of a stack's configuration
pub fn spec_from_config(config: &ConfigMap, stack: &str) -> Option<ResourceSpec> {
    let bucket_name = config.get(&stack_key(stack, BUCKET_NAME_KEY))?;
    let custom_message = config.get(&stack_key(stack, CUSTOM_MESSAGE_KEY))?;
    Some(ResourceSpec::new(
        bucket_name.value.clone(),
        custom_message.value.clone(),
    ))
}

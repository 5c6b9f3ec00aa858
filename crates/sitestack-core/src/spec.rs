//! Caller-supplied desired state
//!
//! The wire format is camelCase JSON:
//!
//! ```json
//! {"bucketName": "my-bucket", "customMessage": "hi"}
//! ```

use crate::error::{LifecycleError, Result};
use serde::{Deserialize, Serialize};
use sitestack_engine::StackIdentity;
use std::net::Ipv4Addr;

/// Desired website bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    pub bucket_name: String,
    pub custom_message: String,
}

impl ResourceSpec {
    pub fn new(bucket_name: impl Into<String>, custom_message: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            custom_message: custom_message.into(),
        }
    }

    /// Reject a spec that the provider would refuse anyway
    pub fn validate(&self) -> Result<()> {
        validate_bucket_name(&self.bucket_name).map_err(LifecycleError::InvalidSpec)
    }
}

/// S3 bucket naming rules
pub fn validate_bucket_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("bucket name must not be empty".to_string());
    }
    if !(3..=63).contains(&name.len()) {
        return Err(format!(
            "bucket name '{}' must be between 3 and 63 characters long",
            name
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(format!(
            "bucket name '{}' contains invalid character '{}'",
            name, c
        ));
    }

    let alphanumeric = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alphanumeric(name.chars().next()) || !alphanumeric(name.chars().last()) {
        return Err(format!(
            "bucket name '{}' must begin and end with a letter or number",
            name
        ));
    }
    if name.contains("..") {
        return Err(format!(
            "bucket name '{}' must not contain two adjacent periods",
            name
        ));
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return Err(format!(
            "bucket name '{}' must not be formatted as an IP address",
            name
        ));
    }
    if name.starts_with("xn--") || name.ends_with("-s3alias") {
        return Err(format!("bucket name '{}' uses a reserved prefix or suffix", name));
    }
    Ok(())
}

/// Project and stack names end up in directory names and config keys
pub fn validate_identity(identity: &StackIdentity) -> Result<()> {
    for (what, value) in [("project", &identity.project), ("stack", &identity.stack)] {
        if value.is_empty() {
            return Err(LifecycleError::InvalidSpec(format!(
                "{} name must not be empty",
                what
            )));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(LifecycleError::InvalidSpec(format!(
                "{} name '{}' contains invalid character '{}'",
                what, value, c
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_camel_case() {
        let spec: ResourceSpec =
            serde_json::from_str(r#"{"bucketName":"my-bucket","customMessage":"hi"}"#).unwrap();
        assert_eq!(spec, ResourceSpec::new("my-bucket", "hi"));

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["bucketName"], "my-bucket");
        assert_eq!(json["customMessage"], "hi");
    }

    #[test]
    fn test_capitalized_keys_do_not_bind() {
        let result =
            serde_json::from_str::<ResourceSpec>(r#"{"BucketName":"b","CustomMessage":"m"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_bucket_name_is_invalid() {
        let err = ResourceSpec::new("", "hi").validate().unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidSpec(_)));
        assert_eq!(
            err.to_string(),
            "invalid specification: bucket name must not be empty"
        );
    }

    #[test]
    fn test_bucket_name_rules() {
        for valid in ["my-bucket", "abc", "site.example.com", "a1-b2"] {
            assert!(validate_bucket_name(valid).is_ok(), "{valid}");
        }
        for invalid in [
            "ab",
            "My-Bucket",
            "under_score",
            "-leading",
            "trailing-",
            "two..dots",
            "192.168.1.1",
            "xn--punycode",
            "name-s3alias",
        ] {
            assert!(validate_bucket_name(invalid).is_err(), "{invalid}");
        }
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_empty_message_is_allowed() {
        assert!(ResourceSpec::new("my-bucket", "").validate().is_ok());
    }

    #[test]
    fn test_identity_validation() {
        assert!(validate_identity(&StackIdentity::new("sitestack", "dev")).is_ok());
        assert!(validate_identity(&StackIdentity::new("", "dev")).is_err());
        assert!(validate_identity(&StackIdentity::new("site/stack", "dev")).is_err());
    }
}

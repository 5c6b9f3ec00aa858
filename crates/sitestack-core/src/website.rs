//! Static website resource graph
//!
//! A pure mapping from a [`ResourceSpec`] to the [`ResourceGraph`] handed to
//! the provisioning engine:
//!
//! ```text
//! site-bucket ──► index
//!     │
//!     ├─────────► public-access-block
//!     │                   │ depends_on
//!     └─────────► bucketPolicy
//! ```

use crate::spec::ResourceSpec;
use serde_json::json;
use sitestack_engine::{GraphError, Resource, ResourceGraph, escape_literal, reference};

/// Logical name of the bucket resource
pub const BUCKET: &str = "site-bucket";
/// Logical name of the index object
pub const INDEX: &str = "index";
/// Logical name of the public access exception
pub const ACCESS_BLOCK: &str = "public-access-block";
/// Logical name of the bucket policy
pub const POLICY: &str = "bucketPolicy";

/// Output holding the website endpoint
pub const WEBSITE_URL_OUTPUT: &str = "websiteUrl";

pub const INDEX_DOCUMENT: &str = "index.html";
const INDEX_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Index page embedding the caller's message as-is
pub fn index_html(message: &str) -> String {
    format!(
        r#"<html><head>
  <title>S3 Automation</title><meta charset="UTF-8">
 </head>
 <body><p>Hello, thanks for being part of this!</p><p>Made with ❤️ with <a href="https://pulumi.com">Pulumi</a></p><p>Your custom message is = {} </p>
 </body></html>
"#,
        message
    )
}

/// Public read policy for every object in the bucket
fn public_read_policy(bucket: &Resource) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": "*",
            "Action": ["s3:GetObject"],
            "Resource": [format!("arn:aws:s3:::{}/*", bucket.reference("id"))],
        }],
    })
    .to_string()
}

/// Declare the bucket website for `spec`
pub fn bucket_website(spec: &ResourceSpec) -> Result<ResourceGraph, GraphError> {
    let bucket = Resource::new(
        BUCKET,
        "aws:s3:Bucket",
        json!({
            "bucket": spec.bucket_name,
            "website": { "indexDocument": INDEX_DOCUMENT },
        }),
    );

    let index = Resource::new(
        INDEX,
        "aws:s3:BucketObject",
        json!({
            "bucket": bucket.reference("id"),
            "key": INDEX_DOCUMENT,
            "content": escape_literal(&index_html(&spec.custom_message)),
            "contentType": INDEX_CONTENT_TYPE,
        }),
    );

    let access_block = Resource::new(
        ACCESS_BLOCK,
        "aws:s3:BucketPublicAccessBlock",
        json!({
            "bucket": bucket.reference("id"),
            "blockPublicAcls": false,
        }),
    );

    let policy = Resource::new(
        POLICY,
        "aws:s3:BucketPolicy",
        json!({
            "bucket": bucket.reference("id"),
            "policy": public_read_policy(&bucket),
        }),
    )
    .depends_on(&access_block);

    let mut graph = ResourceGraph::new();
    graph.add(bucket)?;
    graph.add(index)?;
    graph.add(access_block)?;
    graph.add(policy)?;
    graph.export(WEBSITE_URL_OUTPUT, reference(BUCKET, "websiteEndpoint"));
    graph.validate()?;
    Ok(graph)
}

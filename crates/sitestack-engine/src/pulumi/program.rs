//! Pulumi YAML program rendering
//!
//! Turns a [`ResourceGraph`] into a `Pulumi.yaml` project file with
//! `runtime: yaml`. `${name.attr}` interpolations and `$$` escapes are
//! already Pulumi YAML syntax and pass through untouched; explicit edges
//! become `options.dependsOn` entries.

use crate::error::Result;
use crate::graph::ResourceGraph;
use serde::Serialize;
use std::collections::BTreeMap;

pub const PROJECT_FILE: &str = "Pulumi.yaml";

#[derive(Debug, Serialize)]
struct ProjectFile<'a> {
    name: &'a str,
    runtime: &'static str,
    description: String,
    resources: BTreeMap<&'a str, ResourceBlock<'a>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<&'a str, &'a str>,
}

#[derive(Debug, Serialize)]
struct ResourceBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    properties: &'a serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ResourceOptions>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceOptions {
    depends_on: Vec<String>,
}

/// Render the project file for `project`
pub fn render(project: &str, program: &ResourceGraph) -> Result<String> {
    program.validate()?;

    let resources = program
        .resources()
        .iter()
        .map(|r| {
            let options = (!r.depends_on.is_empty()).then(|| ResourceOptions {
                depends_on: r.depends_on.iter().map(|d| format!("${{{}}}", d)).collect(),
            });
            (
                r.name.as_str(),
                ResourceBlock {
                    kind: &r.kind,
                    properties: &r.properties,
                    options,
                },
            )
        })
        .collect();

    let outputs = program
        .outputs()
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let file = ProjectFile {
        name: project,
        runtime: "yaml",
        description: format!("{} (generated by sitestack)", project),
        resources,
        outputs,
    };
    Ok(serde_yaml::to_string(&file)?)
}

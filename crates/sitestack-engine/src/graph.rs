//! Declarative resource graph
//!
//! A [`ResourceGraph`] is the desired state handed to a provisioning engine:
//! an ordered list of resources, the dependency edges between them, and the
//! named outputs the engine exports after a successful `up`.
//!
//! Properties may refer to attributes of other resources with `${name.attr}`
//! interpolations. Every reference is also an implicit dependency edge, so
//! engines never need to know the resource types to schedule them.
//!
//! `$$` is a literal `$`, the same escape Pulumi YAML uses. Caller-supplied
//! text goes through [`escape_literal`] so it is never read as a reference.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

// Matches either an escaped `$$` (no captures) or a `${name.attr}` reference
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z0-9_-]+)(?:\.([A-Za-z0-9_.]+))?\}")
        .expect("valid reference pattern")
});

/// Resource graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("resource declared twice: {0}")]
    DuplicateResource(String),

    #[error("resource {resource} depends on undeclared resource {dependency}")]
    UnknownDependency {
        resource: String,
        dependency: String,
    },

    #[error("dependency cycle between: {0}")]
    DependencyCycle(String),

    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),
}

/// Build a `${resource.attribute}` interpolation
pub fn reference(resource: &str, attribute: &str) -> String {
    format!("${{{resource}.{attribute}}}")
}

/// Escape `text` so every `$` in it stays literal
pub fn escape_literal(text: &str) -> String {
    text.replace('$', "$$")
}

/// A single declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Logical name, unique within the graph
    pub name: String,

    /// Provider type token (e.g. "aws:s3:Bucket")
    #[serde(rename = "type")]
    pub kind: String,

    /// Input properties, possibly containing `${name.attr}` references
    pub properties: Value,

    /// Explicit dependency edges
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, properties: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            properties,
            depends_on: Vec::new(),
        }
    }

    /// Add an explicit dependency on another resource
    pub fn depends_on(mut self, other: &Resource) -> Self {
        if !self.depends_on.contains(&other.name) {
            self.depends_on.push(other.name.clone());
        }
        self
    }

    /// Interpolation for one of this resource's attributes
    pub fn reference(&self, attribute: &str) -> String {
        reference(&self.name, attribute)
    }

    /// Resources named by `${...}` references in the properties
    pub fn referenced_resources(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_references(&self.properties, &mut names);
        names
    }

    /// Explicit and implicit dependencies combined
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = self.referenced_resources();
        deps.extend(self.depends_on.iter().cloned());
        deps
    }
}

/// Desired state: resources plus exported outputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    resources: Vec<Resource>,

    /// Output name -> expression (usually a single `${name.attr}`)
    outputs: BTreeMap<String, String>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource. Logical names must be unique.
    pub fn add(&mut self, resource: Resource) -> Result<(), GraphError> {
        if self.get(&resource.name).is_some() {
            return Err(GraphError::DuplicateResource(resource.name));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Bind an exported output to an expression
    pub fn export(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        self.outputs.insert(name.into(), expression.into());
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn outputs(&self) -> &BTreeMap<String, String> {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check that every edge and output points at a declared resource and
    /// that the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.apply_order()?;

        for expression in self.outputs.values() {
            let mut names = BTreeSet::new();
            collect_references(&Value::String(expression.clone()), &mut names);
            if let Some(missing) = names.into_iter().find(|n| self.get(n).is_none()) {
                return Err(GraphError::UnresolvedReference(missing));
            }
        }
        Ok(())
    }

    /// Topological order in which resources can be created.
    ///
    /// Independent resources keep their declaration order, so the result is
    /// stable across calls.
    pub fn apply_order(&self) -> Result<Vec<&Resource>, GraphError> {
        for resource in &self.resources {
            for dependency in resource.dependencies() {
                if self.get(&dependency).is_none() {
                    return Err(GraphError::UnknownDependency {
                        resource: resource.name.clone(),
                        dependency,
                    });
                }
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(self.resources.len());

        while order.len() < self.resources.len() {
            let next = self.resources.iter().find(|r| {
                !placed.contains(r.name.as_str())
                    && r.dependencies().iter().all(|d| placed.contains(d.as_str()))
            });

            match next {
                Some(resource) => {
                    placed.insert(resource.name.as_str());
                    order.push(resource);
                }
                None => {
                    let stuck: Vec<&str> = self
                        .resources
                        .iter()
                        .map(|r| r.name.as_str())
                        .filter(|n| !placed.contains(n))
                        .collect();
                    return Err(GraphError::DependencyCycle(stuck.join(", ")));
                }
            }
        }

        Ok(order)
    }
}

fn collect_references(value: &Value, names: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in REFERENCE.captures_iter(s) {
                if let Some(name) = caps.get(1) {
                    names.insert(name.as_str().to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, names)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, names)),
        _ => {}
    }
}

/// Substitute every `${name.attr}` in `value` using `lookup`.
///
/// A string that is exactly one reference is replaced by the referenced
/// value itself, keeping its JSON type. References embedded in longer strings
/// are interpolated as text, and `$$` escapes come out as a literal `$`.
pub fn resolve_value<F>(value: &Value, lookup: &F) -> Result<Value, GraphError>
where
    F: Fn(&str, Option<&str>) -> Option<Value>,
{
    match value {
        Value::String(s) => resolve_str(s, lookup),
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, v) in map {
                resolved.insert(key.clone(), resolve_value(v, lookup)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_str<F>(s: &str, lookup: &F) -> Result<Value, GraphError>
where
    F: Fn(&str, Option<&str>) -> Option<Value>,
{
    let lookup_caps = |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        let attribute = caps.get(2).map(|m| m.as_str());
        lookup(name, attribute).ok_or_else(|| GraphError::UnresolvedReference(caps[0].to_string()))
    };

    match REFERENCE.captures(s) {
        Some(caps) if caps.get(1).is_some() && caps[0].len() == s.len() => {
            return lookup_caps(&caps);
        }
        Some(_) => {}
        None => return Ok(Value::String(s.to_string())),
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in REFERENCE.captures_iter(s) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&s[last..whole.start()]);
        if caps.get(1).is_none() {
            out.push('$');
        } else {
            match lookup_caps(&caps)? {
                Value::String(text) => out.push_str(&text),
                other => out.push_str(&other.to_string()),
            }
        }
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket() -> Resource {
        Resource::new("bucket", "aws:s3:Bucket", json!({ "bucket": "b" }))
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add(bucket()).unwrap();
        let err = graph.add(bucket()).unwrap_err();
        assert_eq!(err, GraphError::DuplicateResource("bucket".to_string()));
    }

    #[test]
    fn test_references_are_implicit_dependencies() {
        let bucket = bucket();
        let object = Resource::new(
            "object",
            "aws:s3:BucketObject",
            json!({ "bucket": bucket.reference("id") }),
        );
        assert_eq!(
            object.dependencies().into_iter().collect::<Vec<_>>(),
            vec!["bucket".to_string()]
        );
    }

    #[test]
    fn test_apply_order_follows_explicit_edges() {
        let bucket = bucket();
        let gate = Resource::new("gate", "aws:s3:BucketPublicAccessBlock", json!({}));
        let policy = Resource::new("policy", "aws:s3:BucketPolicy", json!({})).depends_on(&gate);

        // policy is declared before the resource it depends on
        let mut graph = ResourceGraph::new();
        graph.add(bucket).unwrap();
        graph.add(policy).unwrap();
        graph.add(gate).unwrap();

        let order: Vec<&str> = graph
            .apply_order()
            .unwrap()
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(order, vec!["bucket", "gate", "policy"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = ResourceGraph::new();
        graph
            .add(Resource::new("a", "t", json!({ "x": "${ghost.id}" })))
            .unwrap();
        assert!(matches!(
            graph.apply_order(),
            Err(GraphError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = ResourceGraph::new();
        graph
            .add(Resource::new("a", "t", json!({ "x": "${b.id}" })))
            .unwrap();
        graph
            .add(Resource::new("b", "t", json!({ "x": "${a.id}" })))
            .unwrap();
        assert!(matches!(graph.validate(), Err(GraphError::DependencyCycle(_))));
    }

    #[test]
    fn test_output_must_reference_declared_resource() {
        let mut graph = ResourceGraph::new();
        graph.add(bucket()).unwrap();
        graph.export("url", "${nope.websiteEndpoint}");
        assert_eq!(
            graph.validate(),
            Err(GraphError::UnresolvedReference("nope".to_string()))
        );
    }

    #[test]
    fn test_resolve_whole_and_embedded_references() {
        let lookup = |name: &str, attr: Option<&str>| match (name, attr) {
            ("bucket", Some("id")) => Some(json!("my-bucket")),
            ("bucket", Some("size")) => Some(json!(3)),
            _ => None,
        };

        let resolved = resolve_value(
            &json!({
                "bucket": "${bucket.id}",
                "size": "${bucket.size}",
                "arn": "arn:aws:s3:::${bucket.id}/*",
                "plain": "no refs",
            }),
            &lookup,
        )
        .unwrap();

        assert_eq!(resolved["bucket"], json!("my-bucket"));
        assert_eq!(resolved["size"], json!(3));
        assert_eq!(resolved["arn"], json!("arn:aws:s3:::my-bucket/*"));
        assert_eq!(resolved["plain"], json!("no refs"));
    }

    #[test]
    fn test_escaped_text_is_not_a_reference() {
        let escaped = escape_literal("price is ${price} for ${bucket.id} and $${x}");
        assert_eq!(escaped, "price is $${price} for $${bucket.id} and $$$${x}");

        let resource = Resource::new("a", "t", json!({ "content": escaped }));
        assert!(resource.dependencies().is_empty());

        let lookup = |_: &str, _: Option<&str>| Some(json!("leaked"));
        let resolved = resolve_value(&resource.properties, &lookup).unwrap();
        assert_eq!(
            resolved["content"],
            json!("price is ${price} for ${bucket.id} and $${x}")
        );
    }

    #[test]
    fn test_escape_next_to_reference() {
        let lookup = |_: &str, _: Option<&str>| Some(json!("my-bucket"));
        let value = json!(format!("{}/{}", escape_literal("${x}"), reference("bucket", "id")));
        assert_eq!(
            resolve_value(&value, &lookup).unwrap(),
            json!("${x}/my-bucket")
        );
    }

    #[test]
    fn test_resolve_missing_reference() {
        let lookup = |_: &str, _: Option<&str>| None;
        let err = resolve_value(&json!("x-${a.b}"), &lookup).unwrap_err();
        assert_eq!(err, GraphError::UnresolvedReference("${a.b}".to_string()));
    }
}

//! Partition key schemas and key extraction from documents.
//!
//! A schema is an ordered sequence of paths, each a sequence of property
//! names describing where one partition key component lives inside a
//! document. Partition keys may be hierarchical (several paths) and sparse:
//! a path whose intermediate or terminal property is absent contributes a
//! typed `None` component instead of failing the resolution.

use crate::error::{Result, RoutingError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One partition key path: an ordered sequence of property names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyPath {
    tokens: Vec<String>,
}

impl PartitionKeyPath {
    /// Parse a `/a/b/c` style path.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.strip_prefix('/').ok_or_else(|| {
            RoutingError::MalformedSchema(format!("path {:?} must start with '/'", path))
        })?;
        if trimmed.is_empty() {
            return Err(RoutingError::MalformedSchema("empty path".into()).into());
        }
        let tokens: Vec<String> = trimmed.split('/').map(str::to_owned).collect();
        if tokens.iter().any(String::is_empty) {
            return Err(
                RoutingError::MalformedSchema(format!("path {:?} has an empty token", path))
                    .into(),
            );
        }
        Ok(Self { tokens })
    }

    /// Build a path from pre-split tokens.
    pub fn from_tokens(tokens: Vec<String>) -> Result<Self> {
        if tokens.is_empty() || tokens.iter().any(String::is_empty) {
            return Err(RoutingError::MalformedSchema("empty path token".into()).into());
        }
        Ok(Self { tokens })
    }

    /// The property names along this path.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl std::fmt::Display for PartitionKeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token)?;
        }
        Ok(())
    }
}

/// Ordered partition key paths for a container. Immutable once read from
/// container metadata; cached with the same coalescing discipline as the
/// range map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeySchema {
    paths: Vec<PartitionKeyPath>,
}

impl PartitionKeySchema {
    /// Build a schema from parsed paths.
    pub fn new(paths: Vec<PartitionKeyPath>) -> Result<Self> {
        if paths.is_empty() {
            return Err(RoutingError::MalformedSchema("schema has no paths".into()).into());
        }
        Ok(Self { paths })
    }

    /// Build a schema from `/a/b` style path strings.
    pub fn parse<S: AsRef<str>>(paths: &[S]) -> Result<Self> {
        let parsed = paths
            .iter()
            .map(|p| PartitionKeyPath::parse(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Self::new(parsed)
    }

    /// The schema's paths, in component order.
    pub fn paths(&self) -> &[PartitionKeyPath] {
        &self.paths
    }
}

/// One resolved partition key component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionKeyComponent {
    String(String),
    /// All numeric leaves are carried as double precision.
    Number(f64),
    Bool(bool),
    Null,
    /// The path's property was absent from the document.
    None,
}

impl std::fmt::Display for PartitionKeyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKeyComponent::String(s) => write!(f, "{:?}", s),
            PartitionKeyComponent::Number(n) => write!(f, "{}", n),
            PartitionKeyComponent::Bool(b) => write!(f, "{}", b),
            PartitionKeyComponent::Null => write!(f, "null"),
            PartitionKeyComponent::None => write!(f, "none"),
        }
    }
}

/// A composite partition key value: one component per schema path, in path
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionKeyValue {
    components: Vec<PartitionKeyComponent>,
}

impl PartitionKeyValue {
    /// Build a value from components.
    pub fn new(components: Vec<PartitionKeyComponent>) -> Self {
        Self { components }
    }

    /// Convenience constructor for a single string component.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(vec![PartitionKeyComponent::String(value.into())])
    }

    /// Convenience constructor for a single numeric component.
    pub fn number(value: f64) -> Self {
        Self::new(vec![PartitionKeyComponent::Number(value)])
    }

    /// The resolved components, in path order.
    pub fn components(&self) -> &[PartitionKeyComponent] {
        &self.components
    }
}

impl std::fmt::Display for PartitionKeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", component)?;
        }
        write!(f, "]")
    }
}

/// Extract the partition key for `document` according to `schema`.
///
/// Each path is walked token by token; an absent intermediate or terminal
/// property yields [`PartitionKeyComponent::None`]. An array or object at a
/// leaf is a fatal client error, never retried.
pub fn resolve_partition_key(
    document: &Value,
    schema: &PartitionKeySchema,
) -> Result<PartitionKeyValue> {
    let mut components = Vec::with_capacity(schema.paths().len());
    for path in schema.paths() {
        components.push(resolve_component(document, path)?);
    }
    Ok(PartitionKeyValue::new(components))
}

fn resolve_component(document: &Value, path: &PartitionKeyPath) -> Result<PartitionKeyComponent> {
    let mut cursor = document;
    for token in path.tokens() {
        match cursor.get(token) {
            Some(next) => cursor = next,
            None => return Ok(PartitionKeyComponent::None),
        }
    }
    match cursor {
        Value::String(s) => Ok(PartitionKeyComponent::String(s.clone())),
        Value::Number(n) => match n.as_f64() {
            Some(v) => Ok(PartitionKeyComponent::Number(v)),
            None => Err(RoutingError::UnsupportedComponent {
                path: path.to_string(),
                kind: "non-finite number",
            }
            .into()),
        },
        Value::Bool(b) => Ok(PartitionKeyComponent::Bool(*b)),
        Value::Null => Ok(PartitionKeyComponent::Null),
        Value::Array(_) => Err(RoutingError::UnsupportedComponent {
            path: path.to_string(),
            kind: "array",
        }
        .into()),
        Value::Object(_) => Err(RoutingError::UnsupportedComponent {
            path: path.to_string(),
            kind: "object",
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn test_path_parsing() {
        let path = PartitionKeyPath::parse("/tenant/region").unwrap();
        assert_eq!(path.tokens(), &["tenant".to_string(), "region".to_string()]);
        assert_eq!(path.to_string(), "/tenant/region");

        assert!(PartitionKeyPath::parse("tenant").is_err());
        assert!(PartitionKeyPath::parse("/").is_err());
        assert!(PartitionKeyPath::parse("/a//b").is_err());
    }

    #[test]
    fn test_schema_requires_paths() {
        assert!(PartitionKeySchema::new(Vec::new()).is_err());
        assert!(PartitionKeySchema::parse(&["/tenant"]).is_ok());
    }

    #[test]
    fn test_simple_string_key() {
        let schema = PartitionKeySchema::parse(&["/tenant"]).unwrap();
        let doc = json!({"tenant": "acme", "id": 1});
        let pk = resolve_partition_key(&doc, &schema).unwrap();
        assert_eq!(
            pk.components(),
            &[PartitionKeyComponent::String("acme".into())]
        );
    }

    #[test]
    fn test_sparse_path_yields_none_component() {
        let schema = PartitionKeySchema::parse(&["/tenant", "/region"]).unwrap();
        let doc = json!({"tenant": "acme"});
        let pk = resolve_partition_key(&doc, &schema).unwrap();
        assert_eq!(
            pk.components(),
            &[
                PartitionKeyComponent::String("acme".into()),
                PartitionKeyComponent::None,
            ]
        );
    }

    #[test]
    fn test_absent_intermediate_property_is_none() {
        let schema = PartitionKeySchema::parse(&["/address/city"]).unwrap();
        let doc = json!({"name": "no address here"});
        let pk = resolve_partition_key(&doc, &schema).unwrap();
        assert_eq!(pk.components(), &[PartitionKeyComponent::None]);
    }

    #[test]
    fn test_nested_path_resolution() {
        let schema = PartitionKeySchema::parse(&["/address/city"]).unwrap();
        let doc = json!({"address": {"city": "Reykjavik"}});
        let pk = resolve_partition_key(&doc, &schema).unwrap();
        assert_eq!(
            pk.components(),
            &[PartitionKeyComponent::String("Reykjavik".into())]
        );
    }

    #[test]
    fn test_supported_leaf_kinds() {
        let schema =
            PartitionKeySchema::parse(&["/count", "/active", "/deleted_at"]).unwrap();
        let doc = json!({"count": 42, "active": true, "deleted_at": null});
        let pk = resolve_partition_key(&doc, &schema).unwrap();
        assert_eq!(
            pk.components(),
            &[
                PartitionKeyComponent::Number(42.0),
                PartitionKeyComponent::Bool(true),
                PartitionKeyComponent::Null,
            ]
        );
    }

    #[test]
    fn test_array_leaf_is_fatal() {
        let schema = PartitionKeySchema::parse(&["/tags"]).unwrap();
        let doc = json!({"tags": ["a", "b"]});
        let err = resolve_partition_key(&doc, &schema).unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::UnsupportedComponent { kind: "array", .. })
        ));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_object_leaf_is_fatal() {
        let schema = PartitionKeySchema::parse(&["/owner"]).unwrap();
        let doc = json!({"owner": {"id": 7}});
        let err = resolve_partition_key(&doc, &schema).unwrap_err();
        assert!(matches!(
            err,
            Error::Routing(RoutingError::UnsupportedComponent { kind: "object", .. })
        ));
    }
}

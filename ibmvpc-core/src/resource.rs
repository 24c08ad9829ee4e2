//! Resource - Representing resources, their state and their identifiers

use std::collections::HashMap;
use std::fmt;

/// Separator used when joining nested resource IDs into one identifier
pub const ID_SEPARATOR: char = '/';

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "is_vpn_gateway_connection")
    pub resource_type: String,
    /// Resource name (local label chosen by the caller)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Desired state declared by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// Get a string attribute
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    /// Get a boolean attribute
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    /// Get an integer attribute
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_int)
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider identifier, possibly compound (e.g., "r006-gw/r006-conn")
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }
}

/// Errors produced when parsing a compound identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("Unexpected format of ID '{id}': expected {expected} segments ({format}), got {actual}")]
    WrongSegmentCount {
        id: String,
        format: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unexpected format of ID '{id}': segment {index} ({part}) is empty")]
    EmptySegment {
        id: String,
        index: usize,
        part: String,
    },
}

/// Identifier built from one or more `/`-separated resource IDs
///
/// A network interface on a bare metal server is addressed as
/// `<server_id>/<nic_id>`, a load balancer listener policy rule as
/// `<lb_id>/<listener_id>/<policy_id>/<rule_id>`, and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompoundId {
    segments: Vec<String>,
}

impl CompoundId {
    /// Build an identifier from its segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse `id` expecting exactly one segment per entry in `parts`
    ///
    /// `parts` names each segment (e.g. `["bare_metal_server", "network_interface"]`)
    /// and is only used for error messages.
    pub fn parse(id: &str, parts: &[&str]) -> Result<Self, IdError> {
        let segments: Vec<&str> = id.split(ID_SEPARATOR).collect();
        if segments.len() != parts.len() {
            return Err(IdError::WrongSegmentCount {
                id: id.to_string(),
                format: parts.join(&ID_SEPARATOR.to_string()),
                expected: parts.len(),
                actual: segments.len(),
            });
        }

        if let Some(index) = segments.iter().position(|s| s.is_empty()) {
            return Err(IdError::EmptySegment {
                id: id.to_string(),
                index,
                part: parts[index].to_string(),
            });
        }

        Ok(Self::new(segments))
    }

    /// Parse `id` into exactly `N` named segments
    ///
    /// ```
    /// use ibmvpc_core::resource::CompoundId;
    ///
    /// let [gateway, connection] =
    ///     CompoundId::split("r006-gw/r006-conn", ["vpn_gateway", "connection"]).unwrap();
    /// assert_eq!(gateway, "r006-gw");
    /// assert_eq!(connection, "r006-conn");
    /// ```
    pub fn split<const N: usize>(id: &str, parts: [&str; N]) -> Result<[String; N], IdError> {
        let parsed = Self::parse(id, &parts)?;
        parsed
            .segments
            .try_into()
            .map_err(|segments: Vec<String>| IdError::WrongSegmentCount {
                id: id.to_string(),
                format: parts.join(&ID_SEPARATOR.to_string()),
                expected: N,
                actual: segments.len(),
            })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Get the segment at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for CompoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(&ID_SEPARATOR.to_string()))
    }
}

/// Join IDs into a compound identifier string
pub fn join_id(segments: &[&str]) -> String {
    CompoundId::new(segments.iter().copied()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_id_round_trip() {
        let id = join_id(&["r006-lb", "r006-listener", "r006-policy", "r006-rule"]);
        assert_eq!(id, "r006-lb/r006-listener/r006-policy/r006-rule");

        let parsed = CompoundId::parse(&id, &["lb", "listener", "policy", "rule"]).unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.get(0), Some("r006-lb"));
        assert_eq!(parsed.get(3), Some("r006-rule"));
        assert_eq!(parsed.to_string(), id);
    }

    #[test]
    fn test_compound_id_single_segment() {
        let parsed = CompoundId::parse("r006-server", &["bare_metal_server"]).unwrap();
        assert_eq!(parsed.segments(), &["r006-server".to_string()]);
    }

    #[test]
    fn test_compound_id_wrong_segment_count() {
        let err = CompoundId::parse("a/b/c", &["server", "nic"]).unwrap_err();
        assert_eq!(
            err,
            IdError::WrongSegmentCount {
                id: "a/b/c".to_string(),
                format: "server/nic".to_string(),
                expected: 2,
                actual: 3,
            }
        );

        assert!(CompoundId::parse("a", &["server", "nic"]).is_err());
    }

    #[test]
    fn test_compound_id_empty_segment() {
        let err = CompoundId::parse("a//c", &["lb", "listener", "policy"]).unwrap_err();
        match err {
            IdError::EmptySegment { index, part, .. } => {
                assert_eq!(index, 1);
                assert_eq!(part, "listener");
            }
            _ => panic!("Expected EmptySegment error"),
        }

        assert!(CompoundId::parse("", &["server"]).is_err());
        assert!(CompoundId::parse("server/", &["server", "nic"]).is_err());
    }

    #[test]
    fn test_compound_id_split() {
        let [server, nic, fip] = CompoundId::split(
            "r006-server/r006-nic/r006-fip",
            ["bare_metal_server", "network_interface", "floating_ip"],
        )
        .unwrap();
        assert_eq!(server, "r006-server");
        assert_eq!(nic, "r006-nic");
        assert_eq!(fip, "r006-fip");

        assert!(CompoundId::split("r006-server", ["bare_metal_server", "network_interface"]).is_err());
    }

    #[test]
    fn test_compound_id_error_message() {
        let err = CompoundId::parse("only-one", &["gateway", "connection"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexpected format of ID 'only-one': expected 2 segments (gateway/connection), got 1"
        );
    }

    #[test]
    fn test_resource_attribute_getters() {
        let resource = Resource::new("is_vpn_gateway_connection", "conn")
            .with_attribute("name", Value::from("conn-1"))
            .with_attribute("admin_state_up", Value::Bool(true))
            .with_attribute("interval", Value::Int(30));

        assert_eq!(resource.get_str("name"), Some("conn-1"));
        assert_eq!(resource.get_bool("admin_state_up"), Some(true));
        assert_eq!(resource.get_int("interval"), Some(30));
        assert_eq!(resource.get_str("interval"), None);
        assert!(!resource.is_data_source());
    }

    #[test]
    fn test_state_builders() {
        let id = ResourceId::new("is_floating_ips", "all");
        let state = State::not_found(id.clone());
        assert!(!state.exists);
        assert!(state.identifier.is_none());

        let state = State::existing(id, HashMap::new()).with_identifier("a/b");
        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("a/b"));
    }
}

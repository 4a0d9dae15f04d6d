use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const DOMAIN_LABEL: &str = "Domain";
pub const ADDRESS_LABEL: &str = "IP";
pub const ROUTES_TO: &str = "ROUTES_TO";

/// Free-form attributes carried alongside the typed ones.
pub type Properties = Map<String, Value>;

/// Natural key of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    Domain(String),
    Address(String),
}

impl NodeKey {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeKey::Domain(_) => "domain",
            NodeKey::Address(_) => "address",
        }
    }

    pub fn key(&self) -> &str {
        match self {
            NodeKey::Domain(name) => name,
            NodeKey::Address(address) => address,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NodeKey::Domain(_) => DOMAIN_LABEL,
            NodeKey::Address(_) => ADDRESS_LABEL,
        }
    }

    pub fn from_parts(kind: &str, key: String) -> Option<Self> {
        match kind {
            "domain" => Some(NodeKey::Domain(key)),
            "address" => Some(NodeKey::Address(key)),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label(), self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomainNode {
    pub name: String,
    pub target_ip: Option<String>,
    pub last_analyzed: Option<DateTime<Utc>>,
    pub hop_count: Option<i64>,
    /// Patched into the stored map on upsert; a `null` value removes the key.
    pub extra: Properties,
}

impl DomainNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddressNode {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Patched into the stored map on upsert; a `null` value removes the key.
    pub extra: Properties,
}

impl AddressNode {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Domain(DomainNode),
    Address(AddressNode),
}

impl GraphNode {
    pub fn key(&self) -> NodeKey {
        match self {
            GraphNode::Domain(d) => NodeKey::Domain(d.name.clone()),
            GraphNode::Address(a) => NodeKey::Address(a.address.clone()),
        }
    }
}

/// Directed `ROUTES_TO` edge, identified by `(source, target, hop_number)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteEdge {
    pub source: NodeKey,
    pub target: String,
    pub hop_number: u32,
    pub timestamp: Option<DateTime<Utc>>,
    /// Domains whose path crossed this edge at this position, each at most once.
    pub domains: Vec<String>,
    pub extra: Properties,
}

impl RouteEdge {
    pub fn new(source: NodeKey, target: impl Into<String>, hop_number: u32) -> Self {
        Self {
            source,
            target: target.into(),
            hop_number,
            timestamp: None,
            domains: Vec::new(),
            extra: Properties::new(),
        }
    }

    pub fn target_key(&self) -> NodeKey {
        NodeKey::Address(self.target.clone())
    }

    /// Add `domain` to the domain set unless it is already present.
    pub fn add_domain(&mut self, domain: &str) -> bool {
        if self.domains.iter().any(|d| d == domain) {
            return false;
        }
        self.domains.push(domain.to_string());
        true
    }
}

//! JSON export and import of the whole graph.
//!
//! The document lists every node as `{id, labels, properties}` and every
//! relationship as `{id, type, properties, start, end}`. Ids are assigned by
//! the exporter and only correlate entries within one document. Timestamps
//! are written as RFC 3339 strings.
//!
//! Import merges properties the same way the store does: unknown keys are
//! added to the node's extra attributes, and a `null` value clears the
//! attribute instead of storing a null. Each node may appear once per
//! document and each id may be used once.

use crate::data::GraphStore;
use crate::error::CodecError;
use crate::model::{
    ADDRESS_LABEL, AddressNode, DOMAIN_LABEL, DomainNode, GraphNode, NodeKey, Properties,
    ROUTES_TO, RouteEdge,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, CodecError>;

/// Property name reserved for the import correlation id.
pub const IMPORT_ID: &str = "import_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub nodes: Vec<NodeRecord>,
    pub relationships: Vec<RelationshipRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Value,
    pub labels: Vec<String>,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: Value,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub properties: Properties,
    pub start: Value,
    pub end: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportSummary {
    pub nodes: usize,
    pub relationships: usize,
}

pub fn export_graph(store: &mut GraphStore) -> Result<GraphDocument> {
    let mut ids: HashMap<NodeKey, u64> = HashMap::new();
    let mut nodes = Vec::new();

    for (id, node) in (0u64..).zip(store.all_nodes()?) {
        ids.insert(node.key(), id);
        let (label, properties) = match &node {
            GraphNode::Domain(d) => (DOMAIN_LABEL, domain_properties(d)),
            GraphNode::Address(a) => (ADDRESS_LABEL, address_properties(a)),
        };
        nodes.push(NodeRecord {
            id: Value::from(id),
            labels: vec![label.to_string()],
            properties,
        });
    }

    let mut relationships = Vec::new();
    for (id, edge) in (0u64..).zip(store.all_edges()?) {
        let endpoint = |key: &NodeKey| {
            ids.get(key).copied().ok_or_else(|| CodecError::UnknownEndpoint {
                relationship: id.to_string(),
                node: key.to_string(),
            })
        };
        let start = endpoint(&edge.source)?;
        let end = endpoint(&edge.target_key())?;

        relationships.push(RelationshipRecord {
            id: Value::from(id),
            rel_type: ROUTES_TO.to_string(),
            properties: edge_properties(&edge),
            start: Value::from(start),
            end: Value::from(end),
        });
    }

    debug!(
        "Exported {} nodes and {} relationships",
        nodes.len(),
        relationships.len()
    );
    Ok(GraphDocument {
        nodes,
        relationships,
    })
}

pub fn export_to_file(store: &mut GraphStore, path: &Path) -> Result<GraphDocument> {
    let document = export_graph(store)?;
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &document)?;
    writer.flush()?;
    info!("Exported graph database to {}", path.display());
    Ok(document)
}

/// Merge a document into the store.
///
/// Nodes are upserted by natural key and tagged with their document id, edges
/// are resolved through those tags, and the tags are removed before commit.
/// The import runs in one transaction, so a failure leaves neither partial
/// data nor tags behind.
pub fn import_graph(store: &mut GraphStore, document: &GraphDocument) -> Result<ImportSummary> {
    let tx = store.transaction()?;
    tx.clear_import_tags()?;

    let mut seen_keys = HashSet::new();
    let mut seen_ids = HashSet::new();
    for record in &document.nodes {
        let key = node_key(record)?;
        let id = correlation_id(&record.id);
        if !seen_ids.insert(id.clone()) {
            return Err(CodecError::Malformed(format!(
                "node id {} is used more than once",
                record.id
            )));
        }
        if !seen_keys.insert(key.clone()) {
            return Err(CodecError::Malformed(format!(
                "node {} is listed more than once (again as id {})",
                key, record.id
            )));
        }

        match &key {
            NodeKey::Domain(name) => {
                let mut node = tx.domain(name)?.unwrap_or_else(|| DomainNode::new(name));
                merge_domain_properties(&mut node, &record.properties)?;
                tx.upsert_domain(&node)?;
            }
            NodeKey::Address(address) => {
                let mut node = tx
                    .address(address)?
                    .unwrap_or_else(|| AddressNode::new(address));
                merge_address_properties(&mut node, &record.properties)?;
                tx.upsert_address(&node)?;
            }
        }
        tx.tag_import(&key, &id)?;
    }

    for record in &document.relationships {
        if record.rel_type != ROUTES_TO {
            return Err(CodecError::UnsupportedRelationship(record.rel_type.clone()));
        }

        let resolve = |id: &Value| -> Result<NodeKey> {
            tx.find_imported(&correlation_id(id))?
                .ok_or_else(|| CodecError::UnknownEndpoint {
                    relationship: record.id.to_string(),
                    node: id.to_string(),
                })
        };
        let source = resolve(&record.start)?;
        let NodeKey::Address(target) = resolve(&record.end)? else {
            return Err(CodecError::Malformed(format!(
                "relationship {} must end at an {} node",
                record.id, ADDRESS_LABEL
            )));
        };

        let hop_number = record
            .properties
            .get("hop_number")
            .and_then(as_integer)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| n >= 1)
            .ok_or_else(|| {
                CodecError::Malformed(format!(
                    "relationship {} needs a positive integer `hop_number`",
                    record.id
                ))
            })?;

        let mut edge = RouteEdge::new(source, target, hop_number);
        merge_edge_properties(&mut edge, &record.properties, &record.id)?;
        tx.upsert_edge(&edge)?;
    }

    let cleared = tx.clear_import_tags()?;
    tx.commit()?;
    debug!("Cleared {} import correlation tags", cleared);

    Ok(ImportSummary {
        nodes: document.nodes.len(),
        relationships: document.relationships.len(),
    })
}

pub fn import_from_file(store: &mut GraphStore, path: &Path) -> Result<ImportSummary> {
    let reader = BufReader::new(File::open(path)?);
    let document: GraphDocument = serde_json::from_reader(reader)?;
    let summary = import_graph(store, &document)?;
    info!(
        "Imported {} nodes and {} relationships from {}",
        summary.nodes,
        summary.relationships,
        path.display()
    );
    Ok(summary)
}

fn correlation_id(id: &Value) -> String {
    id.to_string()
}

fn node_key(record: &NodeRecord) -> Result<NodeKey> {
    let has = |label: &str| record.labels.iter().any(|l| l == label);
    let key_property = |name: &str| -> Result<String> {
        record
            .properties
            .get(name)
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CodecError::Malformed(format!(
                    "node {} needs a string `{}` property",
                    record.id, name
                ))
            })
    };

    if has(DOMAIN_LABEL) {
        Ok(NodeKey::Domain(key_property("name")?))
    } else if has(ADDRESS_LABEL) {
        Ok(NodeKey::Address(key_property("address")?))
    } else {
        Err(CodecError::UnsupportedLabel(record.labels.clone()))
    }
}

fn domain_properties(node: &DomainNode) -> Properties {
    let mut props = node.extra.clone();
    props.insert("name".into(), Value::from(node.name.clone()));
    insert_opt(&mut props, "target_ip", node.target_ip.clone().map(Value::from));
    insert_opt(&mut props, "last_analyzed", node.last_analyzed.map(timestamp_value));
    insert_opt(&mut props, "hop_count", node.hop_count.map(Value::from));
    props
}

fn address_properties(node: &AddressNode) -> Properties {
    let mut props = node.extra.clone();
    props.insert("address".into(), Value::from(node.address.clone()));
    insert_opt(&mut props, "latitude", node.latitude.map(Value::from));
    insert_opt(&mut props, "longitude", node.longitude.map(Value::from));
    insert_opt(&mut props, "city", node.city.clone().map(Value::from));
    insert_opt(&mut props, "country", node.country.clone().map(Value::from));
    insert_opt(&mut props, "isp", node.isp.clone().map(Value::from));
    insert_opt(&mut props, "last_seen", node.last_seen.map(timestamp_value));
    props
}

fn edge_properties(edge: &RouteEdge) -> Properties {
    let mut props = edge.extra.clone();
    props.insert("hop_number".into(), Value::from(edge.hop_number));
    insert_opt(&mut props, "timestamp", edge.timestamp.map(timestamp_value));
    props.insert("domains".into(), Value::from(edge.domains.clone()));
    props
}

fn insert_opt(props: &mut Properties, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        props.insert(key.to_string(), value);
    }
}

fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::from(at.to_rfc3339())
}

// Known properties land in typed fields, a `null` clears them. Everything
// else is merged verbatim into `extra`.

fn merge_domain_properties(node: &mut DomainNode, props: &Properties) -> Result<()> {
    for (key, value) in props {
        match key.as_str() {
            "name" | IMPORT_ID => {}
            "target_ip" => node.target_ip = text(key, value)?,
            "last_analyzed" => node.last_analyzed = timestamp(key, value)?,
            "hop_count" => node.hop_count = integer(key, value)?,
            _ => {
                node.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn merge_address_properties(node: &mut AddressNode, props: &Properties) -> Result<()> {
    for (key, value) in props {
        match key.as_str() {
            "address" | IMPORT_ID => {}
            "latitude" => node.latitude = float(key, value)?,
            "longitude" => node.longitude = float(key, value)?,
            "city" => node.city = text(key, value)?,
            "country" => node.country = text(key, value)?,
            "isp" => node.isp = text(key, value)?,
            "last_seen" => node.last_seen = timestamp(key, value)?,
            _ => {
                node.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn merge_edge_properties(edge: &mut RouteEdge, props: &Properties, id: &Value) -> Result<()> {
    for (key, value) in props {
        match key.as_str() {
            "hop_number" => {}
            "timestamp" => edge.timestamp = timestamp(key, value)?,
            "domains" => {
                let Some(items) = value.as_array() else {
                    return Err(CodecError::Malformed(format!(
                        "relationship {} has a non-array `domains`",
                        id
                    )));
                };
                for item in items {
                    let domain = item.as_str().ok_or_else(|| {
                        CodecError::Malformed(format!(
                            "relationship {} has a non-string domain",
                            id
                        ))
                    })?;
                    edge.add_domain(domain);
                }
            }
            _ => {
                edge.extra.insert(key.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn malformed(key: &str, expected: &str, value: &Value) -> CodecError {
    CodecError::Malformed(format!("`{}` should be {}, got {}", key, expected, value))
}

fn text(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        other => Err(malformed(key, "a string", other)),
    }
}

fn float(key: &str, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| malformed(key, "a number", value)),
        other => Err(malformed(key, "a number", other)),
    }
}

fn integer(key: &str, value: &Value) -> Result<Option<i64>> {
    match value {
        Value::Null => Ok(None),
        other => as_integer(other)
            .map(Some)
            .ok_or_else(|| malformed(key, "an integer", other)),
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn timestamp(key: &str, value: &Value) -> Result<Option<DateTime<Utc>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|at| Some(at.with_timezone(&Utc)))
            .map_err(|_| malformed(key, "an RFC 3339 timestamp", value)),
        other => Err(malformed(key, "an RFC 3339 timestamp", other)),
    }
}

// Tests for the graph store

use chrono::{TimeZone, Utc};
use hopmap_core::data::{GraphStore, StoreLocation};
use hopmap_core::error::StoreError;
use hopmap_core::model::{AddressNode, DomainNode, GraphNode, NodeKey, RouteEdge};
use serde_json::json;
use tempfile::TempDir;

fn create_test_store() -> (TempDir, GraphStore) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let store = GraphStore::new(&db_path);
    (temp_dir, store)
}

fn domain_key(name: &str) -> NodeKey {
    NodeKey::Domain(name.to_string())
}

fn address_key(addr: &str) -> NodeKey {
    NodeKey::Address(addr.to_string())
}

// ============================================================================
// Store Lifecycle Tests
// ============================================================================

#[test]
fn test_store_connects_lazily() {
    let (temp_dir, mut store) = create_test_store();
    let db_path = temp_dir.path().join("test.db");

    assert!(!store.is_connected());
    assert!(!db_path.exists());

    store.stats().unwrap();
    assert!(store.is_connected());
    assert!(db_path.exists());
}

#[test]
fn test_store_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("dir").join("graph.db");
    let mut store = GraphStore::new(&db_path);

    store.upsert_domain(&DomainNode::new("example.com")).unwrap();
    assert!(db_path.exists());
}

#[test]
fn test_close_and_reconnect_keeps_data() {
    let (_temp_dir, mut store) = create_test_store();
    store.upsert_domain(&DomainNode::new("example.com")).unwrap();

    store.close().unwrap();
    assert!(!store.is_connected());

    assert!(store.domain("example.com").unwrap().is_some());
    assert!(store.is_connected());
}

#[test]
fn test_close_without_connection_is_noop() {
    let mut store = GraphStore::in_memory();
    assert!(store.close().is_ok());
    assert_eq!(store.location(), &StoreLocation::Memory);
}

// ============================================================================
// Node Upsert Tests
// ============================================================================

#[test]
fn test_domain_upsert_overwrites_attributes() {
    let mut store = GraphStore::in_memory();

    let mut first = DomainNode::new("example.com");
    first.target_ip = Some("1.1.1.1".into());
    first.hop_count = Some(5);
    store.upsert_domain(&first).unwrap();

    let mut second = DomainNode::new("example.com");
    second.target_ip = Some("2.2.2.2".into());
    second.hop_count = Some(3);
    store.upsert_domain(&second).unwrap();

    let stored = store.domain("example.com").unwrap().unwrap();
    assert_eq!(stored.target_ip.as_deref(), Some("2.2.2.2"));
    assert_eq!(stored.hop_count, Some(3));
    assert_eq!(store.stats().unwrap().domains, 1);
}

#[test]
fn test_address_upsert_last_write_wins() {
    let mut store = GraphStore::in_memory();

    let mut located = AddressNode::new("8.8.8.8");
    located.latitude = Some(37.4);
    located.longitude = Some(-122.1);
    located.city = Some("Mountain View".into());
    store.upsert_address(&located).unwrap();

    let mut failed = AddressNode::new("8.8.8.8");
    failed.city = Some("Unknown".into());
    store.upsert_address(&failed).unwrap();

    let stored = store.address("8.8.8.8").unwrap().unwrap();
    assert_eq!(stored.latitude, None);
    assert_eq!(stored.longitude, None);
    assert_eq!(stored.city.as_deref(), Some("Unknown"));
    assert_eq!(store.stats().unwrap().addresses, 1);
}

#[test]
fn test_extra_properties_merge() {
    let mut store = GraphStore::in_memory();

    let mut node = AddressNode::new("10.0.0.1");
    node.extra.insert("asn".into(), json!("AS64500"));
    node.extra.insert("rtt_ms".into(), json!(4.2));
    store.upsert_address(&node).unwrap();

    let mut update = AddressNode::new("10.0.0.1");
    update.extra.insert("rtt_ms".into(), json!(null));
    update.extra.insert("label".into(), json!("gateway"));
    store.upsert_address(&update).unwrap();

    let stored = store.address("10.0.0.1").unwrap().unwrap();
    assert_eq!(stored.extra.get("asn"), Some(&json!("AS64500")));
    assert_eq!(stored.extra.get("label"), Some(&json!("gateway")));
    assert!(!stored.extra.contains_key("rtt_ms"));
}

#[test]
fn test_timestamps_round_trip() {
    let mut store = GraphStore::in_memory();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

    let mut node = DomainNode::new("example.com");
    node.last_analyzed = Some(at);
    store.upsert_domain(&node).unwrap();

    let stored = store.domain("example.com").unwrap().unwrap();
    assert_eq!(stored.last_analyzed, Some(at));
}

// ============================================================================
// Edge Upsert Tests
// ============================================================================

#[test]
fn test_edge_requires_existing_target() {
    let mut store = GraphStore::in_memory();
    store.upsert_domain(&DomainNode::new("example.com")).unwrap();

    let edge = RouteEdge::new(domain_key("example.com"), "10.0.0.1", 1);
    assert!(matches!(
        store.upsert_edge(&edge),
        Err(StoreError::Sqlite(_))
    ));
}

#[test]
fn test_edge_requires_existing_source() {
    let mut store = GraphStore::in_memory();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();

    let from_domain = RouteEdge::new(domain_key("ghost.example"), "10.0.0.1", 1);
    assert!(matches!(
        store.upsert_edge(&from_domain),
        Err(StoreError::InvalidRecord(_))
    ));

    let from_address = RouteEdge::new(address_key("10.0.0.9"), "10.0.0.1", 2);
    assert!(matches!(
        store.upsert_edge(&from_address),
        Err(StoreError::InvalidRecord(_))
    ));

    assert_eq!(store.stats().unwrap().routes, 0);
    assert!(hopmap_core::codec::export_graph(&mut store).is_ok());
}

#[test]
fn test_edge_rejects_hop_zero() {
    let mut store = GraphStore::in_memory();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();

    let edge = RouteEdge::new(domain_key("example.com"), "10.0.0.1", 0);
    assert!(matches!(
        store.upsert_edge(&edge),
        Err(StoreError::InvalidRecord(_))
    ));
}

#[test]
fn test_edge_domain_set_is_idempotent() {
    let mut store = GraphStore::in_memory();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.2")).unwrap();

    for domain in ["a.example", "a.example", "b.example", "a.example"] {
        let mut edge = RouteEdge::new(address_key("10.0.0.1"), "10.0.0.2", 2);
        edge.add_domain(domain);
        store.upsert_edge(&edge).unwrap();
    }

    let edge = store
        .edge(&address_key("10.0.0.1"), "10.0.0.2", 2)
        .unwrap()
        .unwrap();
    assert_eq!(edge.domains, vec!["a.example", "b.example"]);
    assert_eq!(store.stats().unwrap().routes, 1);
}

#[test]
fn test_edge_identity_includes_hop_number() {
    let mut store = GraphStore::in_memory();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.2")).unwrap();

    let mut at_two = RouteEdge::new(address_key("10.0.0.1"), "10.0.0.2", 2);
    at_two.add_domain("a.example");
    let mut at_three = RouteEdge::new(address_key("10.0.0.1"), "10.0.0.2", 3);
    at_three.add_domain("b.example");
    store.upsert_edge(&at_two).unwrap();
    store.upsert_edge(&at_three).unwrap();

    assert_eq!(store.stats().unwrap().routes, 2);
    let two = store.edge(&address_key("10.0.0.1"), "10.0.0.2", 2).unwrap().unwrap();
    let three = store.edge(&address_key("10.0.0.1"), "10.0.0.2", 3).unwrap().unwrap();
    assert_eq!(two.domains, vec!["a.example"]);
    assert_eq!(three.domains, vec!["b.example"]);
}

#[test]
fn test_edge_timestamp_refreshed_only_when_given() {
    let mut store = GraphStore::in_memory();
    store.upsert_domain(&DomainNode::new("example.com")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    let first = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    let mut edge = RouteEdge::new(domain_key("example.com"), "10.0.0.1", 1);
    edge.timestamp = Some(first);
    store.upsert_edge(&edge).unwrap();

    edge.timestamp = None;
    store.upsert_edge(&edge).unwrap();
    let stored = store.edge(&domain_key("example.com"), "10.0.0.1", 1).unwrap().unwrap();
    assert_eq!(stored.timestamp, Some(first));

    edge.timestamp = Some(second);
    store.upsert_edge(&edge).unwrap();
    let stored = store.edge(&domain_key("example.com"), "10.0.0.1", 1).unwrap().unwrap();
    assert_eq!(stored.timestamp, Some(second));
}

// ============================================================================
// Transaction Tests
// ============================================================================

#[test]
fn test_dropped_transaction_rolls_back() {
    let mut store = GraphStore::in_memory();
    {
        let tx = store.transaction().unwrap();
        tx.upsert_domain(&DomainNode::new("example.com")).unwrap();
        tx.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    }
    assert!(store.domain("example.com").unwrap().is_none());
    assert_eq!(store.stats().unwrap().addresses, 0);
}

#[test]
fn test_import_tags() {
    let mut store = GraphStore::in_memory();
    let tx = store.transaction().unwrap();
    tx.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();

    tx.tag_import(&address_key("10.0.0.1"), "7").unwrap();
    assert_eq!(tx.find_imported("7").unwrap(), Some(address_key("10.0.0.1")));
    assert_eq!(tx.find_imported("8").unwrap(), None);

    assert!(tx.tag_import(&domain_key("missing.example"), "9").is_err());

    assert_eq!(tx.clear_import_tags().unwrap(), 1);
    assert_eq!(tx.find_imported("7").unwrap(), None);
    tx.commit().unwrap();
}

// ============================================================================
// Read Tests
// ============================================================================

#[test]
fn test_all_nodes_orders_domains_first() {
    let mut store = GraphStore::in_memory();
    store.upsert_address(&AddressNode::new("10.0.0.2")).unwrap();
    store.upsert_domain(&DomainNode::new("b.example")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    store.upsert_domain(&DomainNode::new("a.example")).unwrap();

    let keys: Vec<NodeKey> = store.all_nodes().unwrap().iter().map(GraphNode::key).collect();
    assert_eq!(
        keys,
        vec![
            domain_key("a.example"),
            domain_key("b.example"),
            address_key("10.0.0.1"),
            address_key("10.0.0.2"),
        ]
    );
}

#[test]
fn test_all_edges_in_insertion_order() {
    let mut store = GraphStore::in_memory();
    store.upsert_domain(&DomainNode::new("example.com")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.1")).unwrap();
    store.upsert_address(&AddressNode::new("10.0.0.2")).unwrap();
    store
        .upsert_edge(&RouteEdge::new(address_key("10.0.0.1"), "10.0.0.2", 2))
        .unwrap();
    store
        .upsert_edge(&RouteEdge::new(domain_key("example.com"), "10.0.0.1", 1))
        .unwrap();

    let edges = store.all_edges().unwrap();
    assert_eq!(edges.len(), 2);
    assert_eq!(edges[0].hop_number, 2);
    assert_eq!(edges[1].source, domain_key("example.com"));
}

use crate::error::StoreError;
use crate::map::RouteMap;
use crate::model::{AddressNode, DomainNode, GraphNode, NodeKey, Properties, RouteEdge};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub domains: usize,
    pub addresses: usize,
    pub routes: usize,
}

/// Persistent topology graph backed by SQLite.
///
/// The connection is opened on first use and released by [`GraphStore::close`];
/// any later call reconnects. All writes go through upsert-by-key, there is no
/// delete operation.
pub struct GraphStore {
    location: StoreLocation,
    conn: Option<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS domains (
    name TEXT PRIMARY KEY,
    target_ip TEXT,
    last_analyzed TEXT,
    hop_count INTEGER,
    extra TEXT NOT NULL DEFAULT '{}',
    import_id TEXT
);

CREATE TABLE IF NOT EXISTS addresses (
    address TEXT PRIMARY KEY,
    latitude REAL,
    longitude REAL,
    city TEXT,
    country TEXT,
    isp TEXT,
    last_seen TEXT,
    extra TEXT NOT NULL DEFAULT '{}',
    import_id TEXT
);

CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_kind TEXT NOT NULL CHECK(source_kind IN ('domain', 'address')),
    source_key TEXT NOT NULL,
    target_address TEXT NOT NULL,
    hop_number INTEGER NOT NULL CHECK(hop_number >= 1),
    timestamp TEXT,
    domains TEXT NOT NULL DEFAULT '[]',  -- JSON array, each domain at most once
    extra TEXT NOT NULL DEFAULT '{}',

    FOREIGN KEY(target_address) REFERENCES addresses(address),
    UNIQUE(source_kind, source_key, target_address, hop_number)
);

CREATE INDEX IF NOT EXISTS idx_routes_source ON routes(source_kind, source_key);
CREATE INDEX IF NOT EXISTS idx_routes_target ON routes(target_address);
CREATE INDEX IF NOT EXISTS idx_domains_import ON domains(import_id);
CREATE INDEX IF NOT EXISTS idx_addresses_import ON addresses(import_id);
";

impl GraphStore {
    pub fn new(path: &Path) -> Self {
        Self {
            location: StoreLocation::File(path.to_path_buf()),
            conn: None,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::Memory,
            conn: None,
        }
    }

    pub fn with_location(location: StoreLocation) -> Self {
        Self {
            location,
            conn: None,
        }
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Release the connection. Closing an in-memory store discards its contents.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            info!("Closed graph store");
        }
        Ok(())
    }

    fn connection(&mut self) -> Result<&mut Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => open_connection(&self.location)?,
        };
        Ok(self.conn.insert(conn))
    }

    /// Start a transaction; upserts made through it apply together on commit
    /// and are rolled back if it is dropped.
    pub fn transaction(&mut self) -> Result<GraphTransaction<'_>> {
        let conn = self.connection()?;
        Ok(GraphTransaction {
            tx: conn.transaction()?,
        })
    }

    pub fn upsert_domain(&mut self, node: &DomainNode) -> Result<()> {
        upsert_domain_on(self.connection()?, node)
    }

    pub fn upsert_address(&mut self, node: &AddressNode) -> Result<()> {
        upsert_address_on(self.connection()?, node)
    }

    pub fn upsert_edge(&mut self, edge: &RouteEdge) -> Result<()> {
        upsert_edge_on(self.connection()?, edge)
    }

    pub fn domain(&mut self, name: &str) -> Result<Option<DomainNode>> {
        domain_on(self.connection()?, name)
    }

    pub fn address(&mut self, address: &str) -> Result<Option<AddressNode>> {
        address_on(self.connection()?, address)
    }

    pub fn edge(
        &mut self,
        source: &NodeKey,
        target: &str,
        hop_number: u32,
    ) -> Result<Option<RouteEdge>> {
        edge_on(self.connection()?, source, target, hop_number)
    }

    /// Every node, domains first, each group ordered by key.
    pub fn all_nodes(&mut self) -> Result<Vec<GraphNode>> {
        let conn = self.connection()?;
        let mut nodes = Vec::new();

        let mut stmt = conn.prepare(
            "SELECT name, target_ip, last_analyzed, hop_count, extra FROM domains ORDER BY name",
        )?;
        for node in stmt.query_map([], domain_from_row)? {
            nodes.push(GraphNode::Domain(node?));
        }

        let mut stmt = conn.prepare(
            "SELECT address, latitude, longitude, city, country, isp, last_seen, extra
             FROM addresses ORDER BY address",
        )?;
        for node in stmt.query_map([], address_from_row)? {
            nodes.push(GraphNode::Address(node?));
        }

        Ok(nodes)
    }

    /// Every edge in insertion order.
    pub fn all_edges(&mut self) -> Result<Vec<RouteEdge>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT source_kind, source_key, target_address, hop_number, timestamp, domains, extra
             FROM routes ORDER BY id",
        )?;
        let edges = stmt
            .query_map([], edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Snapshot of the graph from which domain-to-terminal paths are enumerated.
    pub fn all_paths(&mut self) -> Result<RouteMap> {
        let nodes = self.all_nodes()?;
        let edges = self.all_edges()?;
        Ok(RouteMap::new(nodes, edges))
    }

    pub fn stats(&mut self) -> Result<StoreStats> {
        let conn = self.connection()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            domains: count("domains")?,
            addresses: count("addresses")?,
            routes: count("routes")?,
        })
    }
}

/// A set of upserts applied atomically.
pub struct GraphTransaction<'a> {
    tx: Transaction<'a>,
}

impl GraphTransaction<'_> {
    pub fn upsert_domain(&self, node: &DomainNode) -> Result<()> {
        upsert_domain_on(&self.tx, node)
    }

    pub fn upsert_address(&self, node: &AddressNode) -> Result<()> {
        upsert_address_on(&self.tx, node)
    }

    pub fn upsert_edge(&self, edge: &RouteEdge) -> Result<()> {
        upsert_edge_on(&self.tx, edge)
    }

    pub fn domain(&self, name: &str) -> Result<Option<DomainNode>> {
        domain_on(&self.tx, name)
    }

    pub fn address(&self, address: &str) -> Result<Option<AddressNode>> {
        address_on(&self.tx, address)
    }

    /// Attach a temporary import correlation id to an existing node.
    pub fn tag_import(&self, key: &NodeKey, import_id: &str) -> Result<()> {
        let sql = match key {
            NodeKey::Domain(_) => "UPDATE domains SET import_id = ?1 WHERE name = ?2",
            NodeKey::Address(_) => "UPDATE addresses SET import_id = ?1 WHERE address = ?2",
        };
        let updated = self.tx.execute(sql, params![import_id, key.key()])?;
        if updated == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "cannot tag missing node {}",
                key
            )));
        }
        Ok(())
    }

    pub fn find_imported(&self, import_id: &str) -> Result<Option<NodeKey>> {
        let domain: Option<String> = self
            .tx
            .query_row(
                "SELECT name FROM domains WHERE import_id = ?1 LIMIT 1",
                [import_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(name) = domain {
            return Ok(Some(NodeKey::Domain(name)));
        }

        let address: Option<String> = self
            .tx
            .query_row(
                "SELECT address FROM addresses WHERE import_id = ?1 LIMIT 1",
                [import_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(address.map(NodeKey::Address))
    }

    pub fn clear_import_tags(&self) -> Result<usize> {
        let domains = self.tx.execute(
            "UPDATE domains SET import_id = NULL WHERE import_id IS NOT NULL",
            [],
        )?;
        let addresses = self.tx.execute(
            "UPDATE addresses SET import_id = NULL WHERE import_id IS NOT NULL",
            [],
        )?;
        Ok(domains + addresses)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

fn open_connection(location: &StoreLocation) -> Result<Connection> {
    let conn = match location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        }
        StoreLocation::Memory => Connection::open_in_memory()?,
    };

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    conn.execute_batch(SCHEMA)?;

    match location {
        StoreLocation::File(path) => info!("Opened graph store at {}", path.display()),
        StoreLocation::Memory => info!("Opened in-memory graph store"),
    }
    Ok(conn)
}

fn upsert_domain_on(conn: &Connection, node: &DomainNode) -> Result<()> {
    conn.execute(
        "INSERT INTO domains (name, target_ip, last_analyzed, hop_count, extra)
         VALUES (?1, ?2, ?3, ?4, json_patch('{}', ?5))
         ON CONFLICT(name) DO UPDATE SET
             target_ip = excluded.target_ip,
             last_analyzed = excluded.last_analyzed,
             hop_count = excluded.hop_count,
             extra = json_patch(domains.extra, ?5)",
        params![
            &node.name,
            &node.target_ip,
            node.last_analyzed,
            node.hop_count,
            Value::Object(node.extra.clone()),
        ],
    )?;
    debug!("Upserted domain {}", node.name);
    Ok(())
}

fn upsert_address_on(conn: &Connection, node: &AddressNode) -> Result<()> {
    conn.execute(
        "INSERT INTO addresses (address, latitude, longitude, city, country, isp, last_seen, extra)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, json_patch('{}', ?8))
         ON CONFLICT(address) DO UPDATE SET
             latitude = excluded.latitude,
             longitude = excluded.longitude,
             city = excluded.city,
             country = excluded.country,
             isp = excluded.isp,
             last_seen = excluded.last_seen,
             extra = json_patch(addresses.extra, ?8)",
        params![
            &node.address,
            node.latitude,
            node.longitude,
            &node.city,
            &node.country,
            &node.isp,
            node.last_seen,
            Value::Object(node.extra.clone()),
        ],
    )?;
    debug!("Upserted address {}", node.address);
    Ok(())
}

/// Insert the edge, or fold it into the existing one with the same identity.
/// Both endpoints must already be stored. On update,
/// domains are added once each, the timestamp is refreshed when given and
/// extra properties are patched in.
fn upsert_edge_on(conn: &Connection, edge: &RouteEdge) -> Result<()> {
    if edge.hop_number == 0 {
        return Err(StoreError::InvalidRecord(format!(
            "hop number must start at 1 for {} -> {}",
            edge.source, edge.target
        )));
    }

    if !node_exists_on(conn, &edge.source)? {
        return Err(StoreError::InvalidRecord(format!(
            "route source {} does not exist",
            edge.source
        )));
    }

    match edge_on(conn, &edge.source, &edge.target, edge.hop_number)? {
        Some(mut existing) => {
            for domain in &edge.domains {
                existing.add_domain(domain);
            }
            conn.execute(
                "UPDATE routes SET
                     timestamp = COALESCE(?1, timestamp),
                     domains = ?2,
                     extra = json_patch(extra, ?3)
                 WHERE source_kind = ?4 AND source_key = ?5
                   AND target_address = ?6 AND hop_number = ?7",
                params![
                    edge.timestamp,
                    Value::from(existing.domains),
                    Value::Object(edge.extra.clone()),
                    edge.source.kind(),
                    edge.source.key(),
                    &edge.target,
                    edge.hop_number,
                ],
            )?;
        }
        None => {
            let mut fresh = RouteEdge::new(edge.source.clone(), edge.target.clone(), edge.hop_number);
            for domain in &edge.domains {
                fresh.add_domain(domain);
            }
            conn.execute(
                "INSERT INTO routes (source_kind, source_key, target_address, hop_number, timestamp, domains, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, json_patch('{}', ?7))",
                params![
                    edge.source.kind(),
                    edge.source.key(),
                    &edge.target,
                    edge.hop_number,
                    edge.timestamp,
                    Value::from(fresh.domains),
                    Value::Object(edge.extra.clone()),
                ],
            )?;
        }
    }

    debug!(
        "Upserted route {} -> {} at hop {}",
        edge.source, edge.target, edge.hop_number
    );
    Ok(())
}

fn node_exists_on(conn: &Connection, key: &NodeKey) -> Result<bool> {
    let sql = match key {
        NodeKey::Domain(_) => "SELECT EXISTS(SELECT 1 FROM domains WHERE name = ?1)",
        NodeKey::Address(_) => "SELECT EXISTS(SELECT 1 FROM addresses WHERE address = ?1)",
    };
    let exists: bool = conn.query_row(sql, [key.key()], |row| row.get(0))?;
    Ok(exists)
}

fn domain_on(conn: &Connection, name: &str) -> Result<Option<DomainNode>> {
    let node = conn
        .query_row(
            "SELECT name, target_ip, last_analyzed, hop_count, extra FROM domains WHERE name = ?1",
            [name],
            domain_from_row,
        )
        .optional()?;
    Ok(node)
}

fn address_on(conn: &Connection, address: &str) -> Result<Option<AddressNode>> {
    let node = conn
        .query_row(
            "SELECT address, latitude, longitude, city, country, isp, last_seen, extra
             FROM addresses WHERE address = ?1",
            [address],
            address_from_row,
        )
        .optional()?;
    Ok(node)
}

fn edge_on(
    conn: &Connection,
    source: &NodeKey,
    target: &str,
    hop_number: u32,
) -> Result<Option<RouteEdge>> {
    let edge = conn
        .query_row(
            "SELECT source_kind, source_key, target_address, hop_number, timestamp, domains, extra
             FROM routes
             WHERE source_kind = ?1 AND source_key = ?2 AND target_address = ?3 AND hop_number = ?4",
            params![source.kind(), source.key(), target, hop_number],
            edge_from_row,
        )
        .optional()?;
    Ok(edge)
}

fn domain_from_row(row: &Row<'_>) -> rusqlite::Result<DomainNode> {
    Ok(DomainNode {
        name: row.get(0)?,
        target_ip: row.get(1)?,
        last_analyzed: row.get(2)?,
        hop_count: row.get(3)?,
        extra: into_properties(row.get(4)?),
    })
}

fn address_from_row(row: &Row<'_>) -> rusqlite::Result<AddressNode> {
    Ok(AddressNode {
        address: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        city: row.get(3)?,
        country: row.get(4)?,
        isp: row.get(5)?,
        last_seen: row.get(6)?,
        extra: into_properties(row.get(7)?),
    })
}

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<RouteEdge> {
    let kind: String = row.get(0)?;
    let source = NodeKey::from_parts(&kind, row.get(1)?)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(0, "source_kind".into(), Type::Text))?;
    let domains = match row.get::<_, Value>(5)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };

    Ok(RouteEdge {
        source,
        target: row.get(2)?,
        hop_number: row.get(3)?,
        timestamp: row.get(4)?,
        domains,
        extra: into_properties(row.get(6)?),
    })
}

fn into_properties(value: Value) -> Properties {
    match value {
        Value::Object(map) => map,
        _ => Properties::new(),
    }
}

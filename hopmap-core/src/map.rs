// Domain-to-terminal path enumeration over a snapshot of the graph

use crate::model::{AddressNode, GraphNode, NodeKey, RouteEdge};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopRecord {
    pub address: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<&AddressNode> for HopRecord {
    fn from(node: &AddressNode) -> Self {
        Self {
            address: node.address.clone(),
            city: node.city.clone(),
            country: node.country.clone(),
            isp: node.isp.clone(),
            latitude: node.latitude,
            longitude: node.longitude,
        }
    }
}

/// One chain from a domain to a terminal address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathRecord {
    pub domain: String,
    pub target_ip: Option<String>,
    pub hops: Vec<HopRecord>,
}

impl PathRecord {
    /// Number of nodes on the path, the domain included.
    pub fn length(&self) -> usize {
        self.hops.len() + 1
    }

    pub fn terminal(&self) -> Option<&HopRecord> {
        self.hops.last()
    }
}

/// Immutable view of the topology graph. An address is terminal when no edge
/// leaves it.
pub struct RouteMap {
    graph: DiGraph<GraphNode, u32>,
    domains: Vec<NodeIndex>,
}

impl RouteMap {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<RouteEdge>) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<NodeKey, NodeIndex> = HashMap::new();
        let mut domains = Vec::new();

        for node in nodes {
            let key = node.key();
            let is_domain = matches!(node, GraphNode::Domain(_));
            let idx = graph.add_node(node);
            if is_domain {
                domains.push(idx);
            }
            index.insert(key, idx);
        }

        for edge in edges {
            match (index.get(&edge.source), index.get(&edge.target_key())) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, edge.hop_number);
                }
                _ => warn!(
                    "Skipping route {} -> {} with a missing endpoint",
                    edge.source, edge.target
                ),
            }
        }

        Self { graph, domains }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_terminal(&self, address: &str) -> bool {
        self.graph.node_indices().any(|idx| {
            matches!(&self.graph[idx], GraphNode::Address(a) if a.address == address)
                && self.is_terminal_index(idx)
        })
    }

    /// Lazily enumerate every simple path from a domain to a terminal address,
    /// shortest first. Each call starts a fresh enumeration.
    pub fn paths(&self) -> Paths<'_> {
        let queue = self.domains.iter().map(|&idx| vec![idx]).collect();
        Paths { map: self, queue }
    }

    fn is_terminal_index(&self, idx: NodeIndex) -> bool {
        matches!(self.graph[idx], GraphNode::Address(_))
            && self
                .graph
                .neighbors_directed(idx, Direction::Outgoing)
                .next()
                .is_none()
    }

    fn record(&self, chain: &[NodeIndex]) -> Option<PathRecord> {
        let (first, rest) = chain.split_first()?;
        let GraphNode::Domain(domain) = &self.graph[*first] else {
            return None;
        };
        let hops = rest
            .iter()
            .filter_map(|&idx| match &self.graph[idx] {
                GraphNode::Address(a) => Some(HopRecord::from(a)),
                GraphNode::Domain(_) => None,
            })
            .collect();
        Some(PathRecord {
            domain: domain.name.clone(),
            target_ip: domain.target_ip.clone(),
            hops,
        })
    }
}

/// Breadth-first walk over partial chains, so records come out ordered by
/// length.
pub struct Paths<'a> {
    map: &'a RouteMap,
    queue: VecDeque<Vec<NodeIndex>>,
}

impl Iterator for Paths<'_> {
    type Item = PathRecord;

    fn next(&mut self) -> Option<PathRecord> {
        while let Some(chain) = self.queue.pop_front() {
            let Some(&last) = chain.last() else {
                continue;
            };

            // Parallel edges at different hop numbers lead to the same node
            let mut seen = HashSet::new();
            for next in self.map.graph.neighbors_directed(last, Direction::Outgoing) {
                if chain.contains(&next) || !seen.insert(next) {
                    continue;
                }
                let mut longer = chain.clone();
                longer.push(next);
                self.queue.push_back(longer);
            }

            if chain.len() > 1
                && self.map.is_terminal_index(last)
                && let Some(record) = self.map.record(&chain)
            {
                return Some(record);
            }
        }
        None
    }
}

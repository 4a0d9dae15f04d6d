use crate::data::{GraphStore, Result};
use crate::model::{AddressNode, DomainNode, NodeKey, Properties, RouteEdge};
use chrono::{DateTime, Utc};
use hopmap_scanner::GeoLocation;
use hopmap_scanner::geolocation::UNKNOWN;
use std::net::Ipv4Addr;
use tracing::info;

/// A hop address with its location, if the lookup succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedHop {
    pub address: Ipv4Addr,
    pub location: Option<GeoLocation>,
}

impl EnrichedHop {
    pub fn new(address: Ipv4Addr, location: Option<GeoLocation>) -> Self {
        Self { address, location }
    }

    pub fn unlocated(address: Ipv4Addr) -> Self {
        Self {
            address,
            location: None,
        }
    }
}

/// The upserts a path turns into, in the order they are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPlan {
    pub domain: DomainNode,
    pub steps: Vec<(AddressNode, RouteEdge)>,
}

/// One domain's discovered path, ready to be merged into the graph as
/// `Domain -> hop1 -> hop2 -> ... -> hopN` with hop numbers starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredPath {
    pub domain: String,
    pub target: Ipv4Addr,
    pub hops: Vec<EnrichedHop>,
}

impl DiscoveredPath {
    pub fn new(domain: impl Into<String>, target: Ipv4Addr, hops: Vec<EnrichedHop>) -> Self {
        Self {
            domain: domain.into(),
            target,
            hops,
        }
    }

    pub fn plan(&self, at: DateTime<Utc>) -> PathPlan {
        let domain = DomainNode {
            name: self.domain.clone(),
            target_ip: Some(self.target.to_string()),
            last_analyzed: Some(at),
            hop_count: Some(self.hops.len() as i64),
            extra: Properties::new(),
        };

        let mut steps = Vec::with_capacity(self.hops.len());
        let mut previous = NodeKey::Domain(self.domain.clone());
        for (i, hop) in self.hops.iter().enumerate() {
            let address = address_node(hop, at);
            let mut edge = RouteEdge::new(previous, address.address.clone(), i as u32 + 1);
            edge.timestamp = Some(at);
            edge.add_domain(&self.domain);

            previous = NodeKey::Address(address.address.clone());
            steps.push((address, edge));
        }

        PathPlan { domain, steps }
    }

    /// Apply the whole chain in a single transaction. On error nothing from
    /// this call is kept.
    pub fn commit(&self, store: &mut GraphStore, at: DateTime<Utc>) -> Result<usize> {
        let plan = self.plan(at);
        let tx = store.transaction()?;

        tx.upsert_domain(&plan.domain)?;
        for (address, edge) in &plan.steps {
            tx.upsert_address(address)?;
            tx.upsert_edge(edge)?;
        }
        tx.commit()?;

        info!(
            "Stored network path for {} with {} hops",
            self.domain,
            plan.steps.len()
        );
        Ok(plan.steps.len())
    }

    pub fn commit_now(&self, store: &mut GraphStore) -> Result<usize> {
        self.commit(store, Utc::now())
    }
}

fn address_node(hop: &EnrichedHop, at: DateTime<Utc>) -> AddressNode {
    let location = hop.location.as_ref();
    AddressNode {
        address: hop.address.to_string(),
        latitude: location.and_then(|l| l.latitude),
        longitude: location.and_then(|l| l.longitude),
        city: Some(location.map_or(UNKNOWN, |l| l.city.as_str()).to_string()),
        country: location.map(|l| l.country.clone()),
        isp: location.map(|l| l.isp.clone()),
        last_seen: Some(at),
        extra: Properties::new(),
    }
}

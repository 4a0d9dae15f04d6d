use crate::config::Config;
use crate::data::GraphStore;
use crate::error::{AnalysisError, StoreError};
use crate::path::{DiscoveredPath, EnrichedHop};
use hopmap_scanner::{GeoLocator, Resolver, Traceroute};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{info, warn};

/// Options for a batch of domain analyses
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainOutcome {
    /// The path was merged into the graph.
    Stored { hops: usize },
    /// The domain was recorded with an empty path.
    NoPath,
    /// Nothing was stored for the domain.
    Skipped(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub outcomes: Vec<(String, DomainOutcome)>,
}

impl AnalysisSummary {
    pub fn stored(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Stored { .. }))
    }

    pub fn no_path(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::NoPath))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, DomainOutcome::Skipped(_)))
    }

    fn count(&self, pred: impl Fn(&DomainOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Drives resolution, hop discovery, enrichment and storage for one domain at
/// a time. Hops are enriched in discovery order so the geolocation rate limit
/// and the hop numbering both follow the traceroute output.
pub struct Analyzer {
    resolver: Resolver,
    tracer: Traceroute,
    locator: GeoLocator,
    store: GraphStore,
}

impl Analyzer {
    pub fn new(
        resolver: Resolver,
        tracer: Traceroute,
        locator: GeoLocator,
        store: GraphStore,
    ) -> Self {
        Self {
            resolver,
            tracer,
            locator,
            store,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Resolver::new(),
            config.tracer(),
            config.locator(),
            config.store(),
        )
    }

    pub fn store(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    /// Analyze every domain in order. A failure only skips that domain.
    pub async fn analyze_domains(
        &mut self,
        domains: &[String],
        options: AnalysisOptions,
    ) -> AnalysisSummary {
        let spinner = if options.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} [{pos}/{len}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_length(domains.len() as u64);
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut summary = AnalysisSummary::default();
        for domain in domains {
            spinner.set_message(format!("Tracing {}", domain));

            let outcome = match self.analyze_domain(domain).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Skipping {}: {}", domain, e);
                    DomainOutcome::Skipped(e.to_string())
                }
            };
            if outcome == DomainOutcome::NoPath {
                warn!("No path found for {}", domain);
            }

            summary.outcomes.push((domain.clone(), outcome));
            spinner.inc(1);
        }

        spinner.finish_and_clear();
        info!(
            "Analyzed {} domains: {} stored, {} without a path, {} skipped",
            domains.len(),
            summary.stored(),
            summary.no_path(),
            summary.skipped()
        );
        summary
    }

    pub async fn analyze_domain(&mut self, domain: &str) -> Result<DomainOutcome, AnalysisError> {
        info!("Analyzing {}", domain);
        let target = self
            .resolver
            .resolve(domain)
            .await
            .ok_or_else(|| AnalysisError::Resolution(domain.to_string()))?;

        // Timeouts and tool failures leave the domain with an empty path
        let hops = match self.tracer.discover(target).await {
            Ok(hops) => hops,
            Err(source) => {
                let e = AnalysisError::Discovery {
                    domain: domain.to_string(),
                    source,
                };
                warn!("{}", e);
                Vec::new()
            }
        };

        self.record_path(domain, target, &hops).await
    }

    /// Enrich `hops` and merge the resulting chain into the store.
    pub async fn record_path(
        &mut self,
        domain: &str,
        target: Ipv4Addr,
        hops: &[Ipv4Addr],
    ) -> Result<DomainOutcome, AnalysisError> {
        let mut enriched = Vec::with_capacity(hops.len());
        for &hop in hops {
            let location = self.locator.locate(hop).await;
            enriched.push(EnrichedHop::new(hop, location));
        }

        let path = DiscoveredPath::new(domain, target, enriched);
        let stored = path
            .commit_now(&mut self.store)
            .map_err(|source| AnalysisError::Commit {
                domain: domain.to_string(),
                source,
            })?;

        Ok(match stored {
            0 => DomainOutcome::NoPath,
            hops => DomainOutcome::Stored { hops },
        })
    }

    /// Release the HTTP client and the store connection.
    pub fn close(&mut self) -> Result<(), StoreError> {
        self.locator.close();
        self.store.close()
    }
}

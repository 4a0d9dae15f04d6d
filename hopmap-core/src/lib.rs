pub mod analyze;
pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod map;
pub mod model;
pub mod path;
pub mod report;

pub use analyze::{AnalysisOptions, AnalysisSummary, Analyzer, DomainOutcome};
pub use codec::{GraphDocument, export_graph, import_graph};
pub use config::Config;
pub use data::{GraphStore, StoreLocation};
pub use error::{AnalysisError, CodecError, ConfigError, StoreError};
pub use map::{PathRecord, RouteMap};
pub use model::{AddressNode, DomainNode, GraphNode, NodeKey, RouteEdge};
pub use path::{DiscoveredPath, EnrichedHop};

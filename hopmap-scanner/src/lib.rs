pub mod error;
pub mod geolocation;
pub mod hops;
pub mod resolver;
pub mod traceroute;

pub use error::ScanError;
pub use geolocation::{GeoLocation, GeoLocator};
pub use hops::{is_valid_hop, parse_hops};
pub use resolver::Resolver;
pub use traceroute::Traceroute;

pub mod handlers;

pub use handlers::{load_domains_from_file, load_domains_from_source, parse_domain_line};

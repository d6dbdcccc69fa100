pub mod authority;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod error;
pub mod executor;
pub mod graph;
pub mod lookup;
pub mod manifest;
pub mod reader;
pub mod resolver;
pub mod variant;

pub use authority::{AuthorityFilter, FilterOutcome};
pub use config::LookupConfig;
pub use error::{GeocodeError, Result};
pub use executor::GeocodeResult;
pub use lookup::{GeocodeLookup, Stage};
pub use resolver::{JoinPath, ResolveOptions};
pub use variant::VariantPolicy;

//! Types library for the instrument price aggregator
//!
//! This library provides the value types shared by every stage of the
//! aggregation pipeline, so that parsing, enrichment, aggregation and
//! persistence agree on one definition of an observation.
//!
//! # Version
//! v1.0.0
//!
//! # Modules
//! - `ids`: Instrument identifiers
//! - `numeric`: Exact decimal parsing and division context
//! - `record`: Price observations and the fixed line format
//! - `errors`: Parse error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod record;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::record::*;
    pub use crate::errors::*;
}

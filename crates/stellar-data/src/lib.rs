//! Data-driven catalog loading for Stellar.
//!
//! Buildings, research topics, units and balance overrides are read from
//! RON, JSON or TOML files in a directory, cross-referenced by name, and
//! resolved into a frozen [`stellar_core::catalog::Catalog`].
//!
//! ```text
//! data/
//!   buildings.ron    required
//!   research.ron     required
//!   units.ron        required
//!   balance.toml     optional
//! ```

pub mod loader;
pub mod resolve;
pub mod schema;

pub use loader::DataLoadError;
pub use resolve::{GameData, build_catalog, load_catalog, load_game_data};

//! tileorm: typed models over Tile38 geospatial objects.
//!
//! A model is a serde struct that derives [`TileModel`]. Field attributes declare which
//! field is the object's identifier, which one namespaces its collection key, which one
//! carries its geometry, and how the remaining fields are stored.
//!
//! ```ignore
//! use tileorm::{Lookup, Model, Point, TileModel, Tile38Config, Tile38Store};
//!
//! #[derive(Debug, serde::Serialize, serde::Deserialize, TileModel)]
//! pub struct Truck {
//!     #[tile(identifier)]
//!     pub id: i64,
//!     #[tile(group)]
//!     pub group: String,
//!     #[tile(point)]
//!     pub location: Point,
//!     pub field: Option<String>,
//! }
//!
//! let store = Tile38Store::connect(&Tile38Config::from_env()).await?;
//! Truck::create(&store, truck).await?;
//! let truck = Truck::get(&store, Lookup::new(1).group("foo")).await?;
//! ```

extern crate self as tileorm;

pub mod config;
pub mod errors;
pub mod fields;
pub mod geometry;
pub mod keys;
pub mod registry;
pub mod repository;
pub mod runtime;
pub mod schema;

pub use config::Tile38Config;
pub use errors::*;
pub use fields::{FieldKind, FieldRole, FieldSpec, ScalarType};
pub use geometry::{Bounds, GeoHash, Point};
pub use repository::{Lookup, Model, Repo};
pub use runtime::{MemoryStore, Store, Tile38Store};
pub use schema::Schema;
pub use tileorm_macros::TileModel;

// Re-export redis so users don't need to depend on a specific redis version
pub use redis;
pub use redis::aio::ConnectionManager;

// Re-export inventory for auto-registration in the model derive macro
pub use inventory;

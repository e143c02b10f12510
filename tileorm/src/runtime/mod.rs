pub mod commands;
pub mod executor;
pub mod memory;

pub use commands::{
    GeometryPayload, GeometryShape, ReadRequest, StoredGeometry, StoredObject, WriteCommand, build_write, parse_read,
    read_request,
};
pub use executor::{NULL_MARKER, Store, Tile38Store};
pub use memory::MemoryStore;

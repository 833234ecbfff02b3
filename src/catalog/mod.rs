pub mod models;
pub mod schema;
pub mod store;

pub use models::{
    Artist, BacklogEntry, EntityKind, Genre, Label, MetadataStatus, MixKind, Track,
};
pub use store::{CatalogStore, SqliteCatalogStore};

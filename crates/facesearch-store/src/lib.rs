//! facesearch-store: Persistence collaborators.
//!
//! [`FaceStore`] keeps face records (embedding + source locator) in SQLite;
//! [`ObjectStore`] keeps the uploaded image bytes.

pub mod faces;
pub mod objects;

pub use faces::{FaceStore, SqliteFaceStore, StoreError};
pub use objects::{clean_directory, object_key, LocalObjectStore, ObjectInfo, ObjectStore, ObjectStoreError};

//! Built-in format handlers.
//!
//! These cover the formats the framework can decode without an external
//! decoder: JSON documents, WAV sounds (other audio containers are kept as
//! opaque payloads for the embedding's decoder) and raw binary blobs.
//! Embeddings register their own handlers with `ResourceSystem::add_loader`
//! before issuing loads.

pub mod blob;
pub mod json;
pub mod sound;

pub use self::blob::{BlobLoader, ResourceBlob};
pub use self::json::{JsonLoader, ResourceJson};
pub use self::sound::{SoundLoader, ResourceSound};

//! The durable object and metadata store for a single `pxobj` node.
//!
//! A [`Store`] owns a data directory exclusively: one JSON metadata document
//! describing buckets, objects, and access keys, plus a tree of content
//! files under `objects/<bucket>/<id>`. Metadata mutations are atomic via
//! write-temp-then-rename; readers and writers share a single
//! readers-writer lock with writers exclusive.

mod model;
mod persistence;
mod store;

pub use model::{AccessKey, BucketState, Document, ObjectRecord, validate_bucket_name};
pub use store::{ListObjectsPage, Store};

//! S3 XML serialization for the `pxobj` object daemon.
//!
//! This crate provides the XML layer for the daemon's narrow S3 surface:
//! bucket listing, object listing, and error responses. There is no
//! deserializer: the daemon's mutating requests carry raw bodies or JSON
//! (admin API), never XML request bodies.
//!
//! # Key components
//!
//! - [`S3Serialize`] trait and [`to_xml`] function for serializing response bodies
//! - [`error_to_xml`] for formatting S3 error responses as XML
//!
//! # S3 XML conventions
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Timestamps: RFC 3339 (`2006-02-03T16:45:09.000Z`)
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

pub mod error;
pub mod serialize;

pub use error::{XmlError, error_to_xml};
pub use serialize::{Bucket, ListAllMyBucketsResult, ListBucketResult, Object, Owner, S3Serialize, S3_NAMESPACE, to_xml};

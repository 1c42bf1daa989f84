//! S3 XML serialization: converting the daemon's listing types to the S3
//! REST XML wire format.
//!
//! Only the element shapes this daemon's S3 Handler actually emits are
//! covered: `ListAllMyBucketsResult` and `ListBucketResult` (the v2 listing
//! page). There is no `CommonPrefixes` support since the store does not
//! implement delimiter-based listing.
//!
//! - Namespace: `http://s3.amazonaws.com/doc/2006-03-01/`
//! - Timestamps: RFC 3339 (`2006-02-03T16:45:09.000Z`)
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::error::XmlError;

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for serializing a response type as the child elements of the root
/// XML element. The root element name and namespace are handled by
/// [`to_xml`].
pub trait S3Serialize {
    /// Serialize this value as XML child elements into the given writer.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a value as a complete S3-compatible XML document: declaration,
/// namespaced root element, and the value's serialized content.
///
/// # Errors
///
/// Returns [`XmlError`] if serialization fails.
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer.create_element(tag).write_text_content(BytesText::new(text))?;
    Ok(())
}

fn write_timestamp<W: Write>(writer: &mut Writer<W>, tag: &str, value: &DateTime<Utc>) -> io::Result<()> {
    write_text_element(writer, tag, &format_timestamp(value))
}

/// Format a `DateTime<Utc>` as RFC 3339 with millisecond precision and a `Z` suffix.
#[must_use]
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// The bucket owner. This daemon has no user/account concept beyond access
/// keys, so the owner's `id` and `display_name` are both set to the
/// requesting access key.
#[derive(Debug, Clone)]
pub struct Owner {
    /// The owner identifier (the requesting access key).
    pub id: String,
    /// The owner display name (also the requesting access key).
    pub display_name: String,
}

impl S3Serialize for Owner {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Owner").write_inner_content(|w| {
            write_text_element(w, "ID", &self.id)?;
            write_text_element(w, "DisplayName", &self.display_name)?;
            Ok(())
        })?;
        Ok(())
    }
}

/// A single bucket entry in a `ListAllMyBucketsResult`.
#[derive(Debug, Clone)]
pub struct Bucket {
    /// The bucket name.
    pub name: String,
    /// When the bucket was created.
    pub creation_date: DateTime<Utc>,
}

impl S3Serialize for Bucket {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Bucket").write_inner_content(|w| {
            write_text_element(w, "Name", &self.name)?;
            write_timestamp(w, "CreationDate", &self.creation_date)?;
            Ok(())
        })?;
        Ok(())
    }
}

/// The response body for `GET /` (list buckets), scoped to the requesting
/// credential's single bound bucket.
#[derive(Debug, Clone)]
pub struct ListAllMyBucketsResult {
    /// The requesting credential, rendered as the owner.
    pub owner: Owner,
    /// The bucket(s) visible to this credential.
    pub buckets: Vec<Bucket>,
}

impl S3Serialize for ListAllMyBucketsResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        self.owner.serialize_xml(writer)?;
        writer.create_element("Buckets").write_inner_content(|w| {
            for bucket in &self.buckets {
                bucket.serialize_xml(w)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// A single object entry (`<Contents>`) in a `ListBucketResult`.
#[derive(Debug, Clone)]
pub struct Object {
    /// The object key.
    pub key: String,
    /// When the object was last written.
    pub last_modified: DateTime<Utc>,
    /// The quoted hex-SHA256 ETag.
    pub etag: String,
    /// The object size in bytes.
    pub size: u64,
}

impl S3Serialize for Object {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Contents").write_inner_content(|w| {
            write_text_element(w, "Key", &self.key)?;
            write_timestamp(w, "LastModified", &self.last_modified)?;
            write_text_element(w, "ETag", &self.etag)?;
            write_text_element(w, "Size", &self.size.to_string())?;
            Ok(())
        })?;
        Ok(())
    }
}

/// The response body for `GET /<bucket>?list-type=2`.
#[derive(Debug, Clone)]
pub struct ListBucketResult {
    /// The bucket name.
    pub name: String,
    /// The prefix filter that was applied, if any.
    pub prefix: String,
    /// The number of keys in this page.
    pub key_count: usize,
    /// The effective `max-keys` used for this page.
    pub max_keys: usize,
    /// Whether more keys remain beyond this page.
    pub is_truncated: bool,
    /// The continuation token supplied by the caller, if any.
    pub continuation_token: Option<String>,
    /// The token to resume from, if `is_truncated`.
    pub next_continuation_token: Option<String>,
    /// The page of objects.
    pub contents: Vec<Object>,
}

impl S3Serialize for ListBucketResult {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Name", &self.name)?;
        write_text_element(writer, "Prefix", &self.prefix)?;
        write_text_element(writer, "KeyCount", &self.key_count.to_string())?;
        write_text_element(writer, "MaxKeys", &self.max_keys.to_string())?;
        write_text_element(writer, "IsTruncated", if self.is_truncated { "true" } else { "false" })?;
        if let Some(ref token) = self.continuation_token {
            write_text_element(writer, "ContinuationToken", token)?;
        }
        if let Some(ref token) = self.next_continuation_token {
            write_text_element(writer, "NextContinuationToken", token)?;
        }
        for object in &self.contents {
            object.serialize_xml(writer)?;
        }
        Ok(())
    }
}

//! Canonical request construction for AWS Signature Version 4.
//!
//! This module implements the canonical request format as specified by AWS:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Each component is normalized according to the AWS specification to ensure
//! deterministic signature computation.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

/// The set of characters that must be percent-encoded in URI path segments
/// and query string keys/values. Per the SigV4 spec, all characters except
/// unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) must be encoded.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the full canonical request string from its components.
#[must_use]
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(uri);
    let canonical_query = build_canonical_query_string(query_string);
    let canonical_headers = build_canonical_headers(headers, signed_headers);
    let signed_headers_str = build_signed_headers_string(signed_headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical URI by URI-encoding each path segment individually.
///
/// Forward slashes (`/`) are preserved. Empty paths are normalized to `/`.
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            // Decode first to normalize, then re-encode for a consistent
            // canonical form regardless of how the client encoded it.
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            uri_encode(&decoded)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string per the AWS rule: percent-encode each
/// key and value with the standard unreserved-character set, then replace
/// `+` with `%20`, `*` with `%2A`, and `%7E` with `~`; sort entries
/// lexicographically by encoded key, then encoded value.
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| {
            let (k, v) = param.split_once('=').unwrap_or((param, ""));
            (aws_query_encode(k), aws_query_encode(v))
        })
        .collect();

    pairs.sort();

    pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

/// Apply the AWS query-component percent-encoding rule to a single
/// (already-decoded-by-the-transport) key or value.
fn aws_query_encode(component: &str) -> String {
    let decoded = percent_decode_str(component).decode_utf8_lossy();
    utf8_percent_encode(&decoded, URI_ENCODE_SET)
        .to_string()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Build the canonical headers string from the request headers.
///
/// Only headers listed in `signed_headers` are included. Header names are
/// lowercased, values are trimmed and internal whitespace runs collapsed to
/// a single space. Headers are sorted by name. The result does not include
/// a trailing newline; [`build_canonical_request`] adds the blank line.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let lower_name = name.to_lowercase();
        let trimmed_value = collapse_whitespace(value.trim());
        header_map
            .entry(lower_name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    let mut sorted_signed: Vec<&str> = signed_headers.to_vec();
    sorted_signed.sort_unstable();

    sorted_signed
        .iter()
        .filter_map(|name| header_map.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the signed headers string as a semicolon-separated, sorted list of
/// lowercase header names.
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();
    sorted.join(";")
}

fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}

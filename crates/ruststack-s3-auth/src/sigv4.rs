//! AWS Signature Version 4 verification.
//!
//! This module implements the core SigV4 signature verification flow:
//!
//! 1. Parse the `Authorization` header to extract the algorithm, credential scope,
//!    signed headers, and provided signature.
//! 2. Resolve the access key to its secret, bound bucket, and read-only flag.
//! 3. Reconstruct the canonical request from the HTTP request parts.
//! 4. Build the string to sign from the timestamp, credential scope, and canonical request hash.
//! 5. Derive the signing key using HMAC-SHA256 from the secret key and credential scope components.
//! 6. Compute the expected signature and compare it to the provided signature using
//!    constant-time comparison.
//!
//! The main entry point is [`verify_sigv4`].

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::build_canonical_request;
use crate::credentials::CredentialProvider;
use crate::error::AuthError;

/// The only algorithm supported by this implementation.
const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The only service supported by this implementation.
const SUPPORTED_SERVICE: &str = "s3";

/// Literal used as the payload hash when `X-Amz-Content-Sha256` is absent.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

type HmacSha256 = Hmac<Sha256>;

/// The result of a successful SigV4 verification.
#[derive(Debug, Clone)]
pub struct AuthResult {
    /// The access key ID that signed the request.
    pub access_key_id: String,
    /// The bucket this access key is bound to.
    pub bucket: String,
    /// Whether this access key may only perform read operations.
    pub read_only: bool,
}

/// Parsed components of an AWS SigV4 `Authorization` header.
#[derive(Debug, Clone)]
struct ParsedAuth {
    access_key_id: String,
    date: String,
    region: String,
    service: String,
    signed_headers: Vec<String>,
    signature: String,
}

/// Parse an AWS SigV4 `Authorization` header value into its components.
fn parse_authorization_header(header: &str) -> Result<ParsedAuth, AuthError> {
    let (algorithm, rest) = header.split_once(' ').ok_or(AuthError::InvalidAuthHeader)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let credential = credential.ok_or(AuthError::InvalidAuthHeader)?;
    let signed_headers = signed_headers.ok_or(AuthError::InvalidAuthHeader)?;
    let signature = signature.ok_or(AuthError::InvalidAuthHeader)?;

    // accessKey/date/region/service/aws4_request
    let cred_parts: Vec<&str> = credential.splitn(5, '/').collect();
    if cred_parts.len() != 5 || cred_parts[4] != "aws4_request" {
        return Err(AuthError::InvalidCredential);
    }
    if cred_parts[3] != SUPPORTED_SERVICE {
        return Err(AuthError::UnsupportedService(cred_parts[3].to_owned()));
    }

    Ok(ParsedAuth {
        access_key_id: cred_parts[0].to_owned(),
        date: cred_parts[1].to_owned(),
        region: cred_parts[2].to_owned(),
        service: cred_parts[3].to_owned(),
        signed_headers: signed_headers.split(';').map(ToOwned::to_owned).collect(),
        signature: signature.to_owned(),
    })
}

/// Build the SigV4 string to sign.
fn build_string_to_sign(timestamp: &str, credential_scope: &str, canonical_request_hash: &str) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using the standard HMAC-SHA256 chain.
fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Verify an AWS SigV4-signed HTTP request.
///
/// `body_hash` must be the value of `X-Amz-Content-Sha256` if present, or
/// [`UNSIGNED_PAYLOAD`] otherwise; callers compute that before calling this
/// function since streaming bodies should not be buffered just to hash them
/// when the header is already present.
///
/// # Errors
///
/// Returns an [`AuthError`] for any parsing, lookup, or verification failure.
/// Callers should map every variant to a single opaque `AccessDenied`
/// response, per the SigV4 specification.
pub fn verify_sigv4(
    parts: &http::request::Parts,
    body_hash: &str,
    credential_provider: &dyn CredentialProvider,
) -> Result<AuthResult, AuthError> {
    let auth_header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let parsed = parse_authorization_header(auth_header)?;

    let credential = credential_provider.resolve(&parsed.access_key_id)?;

    let timestamp = extract_header_value(parts, "x-amz-date")?;

    debug!(
        access_key_id = %parsed.access_key_id,
        region = %parsed.region,
        "verifying SigV4 signature"
    );

    let method = parts.method.as_str();
    let uri = parts.uri.path();
    let query = parts.uri.query().unwrap_or("");

    let signed_header_refs: Vec<&str> = parsed.signed_headers.iter().map(String::as_str).collect();
    let header_pairs: Vec<(&str, &str)> = collect_signed_headers(parts, &signed_header_refs)?;

    let canonical_request =
        build_canonical_request(method, uri, query, &header_pairs, &signed_header_refs, body_hash);

    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));

    let credential_scope = format!("{}/{}/{}/aws4_request", parsed.date, parsed.region, parsed.service);
    let string_to_sign = build_string_to_sign(&timestamp, &credential_scope, &canonical_hash);

    let signing_key =
        derive_signing_key(&credential.secret_key, &parsed.date, &parsed.region, &parsed.service);
    let expected_signature = compute_signature(&signing_key, &string_to_sign);

    if parsed.signature.as_bytes().ct_eq(expected_signature.as_bytes()).into() {
        Ok(AuthResult {
            access_key_id: parsed.access_key_id,
            bucket: credential.bucket,
            read_only: credential.read_only,
        })
    } else {
        Err(AuthError::SignatureDoesNotMatch)
    }
}

fn extract_header_value(parts: &http::request::Parts, name: &str) -> Result<String, AuthError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| AuthError::MissingHeader(name.to_owned()))?
        .to_str()
        .map(ToOwned::to_owned)
        .map_err(|_| AuthError::MissingHeader(name.to_owned()))
}

/// Collect the name/value pairs for the signed headers. `host` is taken
/// from the request's authority rather than a literal header, per the
/// canonical request rules.
fn collect_signed_headers<'a>(
    parts: &'a http::request::Parts,
    signed_headers: &[&'a str],
) -> Result<Vec<(&'a str, &'a str)>, AuthError> {
    let mut result = Vec::with_capacity(signed_headers.len());

    for &name in signed_headers {
        if name == "host" {
            if let Some(authority) = parts.uri.authority() {
                result.push(("host", authority.as_str()));
                continue;
            }
        }
        let value = parts
            .headers
            .get(name)
            .ok_or_else(|| AuthError::MissingHeader(name.to_owned()))?
            .to_str()
            .map_err(|_| AuthError::MissingHeader(name.to_owned()))?;
        result.push((name, value));
    }

    Ok(result)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the SHA-256 hash of a payload, hex-encoded. Convenience for
/// building the `x-amz-content-sha256` header value in tests and clients.
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, StaticCredentialProvider};

    const TEST_ACCESS_KEY: &str = "PXAAAAAAAAAAAAAAAAAA";
    const TEST_SECRET_KEY: &str = "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY";

    fn test_provider(bucket: &str, read_only: bool) -> StaticCredentialProvider {
        StaticCredentialProvider::new(vec![(
            TEST_ACCESS_KEY.to_owned(),
            Credential {
                secret_key: TEST_SECRET_KEY.to_owned(),
                bucket: bucket.to_owned(),
                read_only,
            },
        )])
    }

    #[test]
    fn test_should_derive_signing_key_of_correct_length() {
        let key = derive_signing_key(TEST_SECRET_KEY, "20130524", "us-east-1", "s3");
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn test_should_parse_authorization_header() {
        let header = "AWS4-HMAC-SHA256 \
            Credential=PXAAAAAAAAAAAAAAAAAA/20130524/us-east-1/s3/aws4_request,\
            SignedHeaders=host;range;x-amz-content-sha256;x-amz-date,\
            Signature=f0e8bdb87c964420e857bd35b5d6ed310bd44f0170aba48dd91039c6036bdb41";

        let parsed = parse_authorization_header(header).unwrap();
        assert_eq!(parsed.access_key_id, "PXAAAAAAAAAAAAAAAAAA");
        assert_eq!(parsed.date, "20130524");
        assert_eq!(parsed.region, "us-east-1");
        assert_eq!(parsed.service, "s3");
    }

    #[test]
    fn test_should_reject_unsupported_algorithm() {
        let header = "AWS4-HMAC-SHA512 Credential=PXKEY/20130524/us-east-1/s3/aws4_request,\
            SignedHeaders=host,Signature=abc";
        assert!(matches!(
            parse_authorization_header(header),
            Err(AuthError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_should_reject_non_s3_service() {
        let header = "AWS4-HMAC-SHA256 Credential=PXKEY/20130524/us-east-1/ec2/aws4_request,\
            SignedHeaders=host,Signature=abc";
        assert!(matches!(
            parse_authorization_header(header),
            Err(AuthError::UnsupportedService(_))
        ));
    }

    #[test]
    fn test_should_reject_invalid_credential_format() {
        let header =
            "AWS4-HMAC-SHA256 Credential=PXKEY/20130524/us-east-1,SignedHeaders=host,Signature=abc";
        assert!(matches!(
            parse_authorization_header(header),
            Err(AuthError::InvalidCredential)
        ));
    }

    #[test]
    fn test_should_verify_sigv4_and_return_bucket_scope() {
        let provider = test_provider("demo", false);
        let empty_hash = hash_payload(b"");

        let signed_headers = ["host", "x-amz-content-sha256", "x-amz-date"];
        let (mut parts, _body) = http::Request::builder()
            .method("GET")
            .uri("http://h:9000/demo")
            .header("host", "h:9000")
            .header("x-amz-content-sha256", &empty_hash)
            .header("x-amz-date", "20130524T000000Z")
            .body(())
            .unwrap()
            .into_parts();

        let header_pairs: Vec<(&str, &str)> = collect_signed_headers(&parts, &signed_headers).unwrap();
        let canonical =
            build_canonical_request("GET", "/demo", "", &header_pairs, &signed_headers, &empty_hash);
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        let sts = build_string_to_sign("20130524T000000Z", "20130524/us-east-1/s3/aws4_request", &hash);
        let key = derive_signing_key(TEST_SECRET_KEY, "20130524", "us-east-1", "s3");
        let sig = compute_signature(&key, &sts);

        let auth_value = format!(
            "AWS4-HMAC-SHA256 Credential={TEST_ACCESS_KEY}/20130524/us-east-1/s3/aws4_request,\
             SignedHeaders=host;x-amz-content-sha256;x-amz-date,Signature={sig}"
        );
        parts.headers.insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_str(&auth_value).unwrap(),
        );

        let result = verify_sigv4(&parts, &empty_hash, &provider).unwrap();
        assert_eq!(result.access_key_id, TEST_ACCESS_KEY);
        assert_eq!(result.bucket, "demo");
        assert!(!result.read_only);
    }

    #[test]
    fn test_should_fail_sigv4_with_wrong_key() {
        let provider = StaticCredentialProvider::new(vec![(
            TEST_ACCESS_KEY.to_owned(),
            Credential {
                secret_key: "WRONG_SECRET_KEY".to_owned(),
                bucket: "demo".to_owned(),
                read_only: false,
            },
        )]);
        let empty_hash = hash_payload(b"");

        let auth_value = format!(
            "AWS4-HMAC-SHA256 Credential={TEST_ACCESS_KEY}/20130524/us-east-1/s3/aws4_request,\
             SignedHeaders=host;x-amz-content-sha256;x-amz-date,\
             Signature=0000000000000000000000000000000000000000000000000000000000000000"
        );

        let (parts, _body) = http::Request::builder()
            .method("GET")
            .uri("http://h:9000/demo")
            .header("host", "h:9000")
            .header("x-amz-content-sha256", &empty_hash)
            .header("x-amz-date", "20130524T000000Z")
            .header(http::header::AUTHORIZATION, &auth_value)
            .body(())
            .unwrap()
            .into_parts();

        let result = verify_sigv4(&parts, &empty_hash, &provider);
        assert!(matches!(result, Err(AuthError::SignatureDoesNotMatch)));
    }

    #[test]
    fn test_should_fail_sigv4_with_missing_auth_header() {
        let provider = test_provider("demo", false);
        let empty_hash = hash_payload(b"");

        let (parts, _body) = http::Request::builder()
            .method("GET")
            .uri("http://example.com/")
            .header("host", "example.com")
            .body(())
            .unwrap()
            .into_parts();

        let result = verify_sigv4(&parts, &empty_hash, &provider);
        assert!(matches!(result, Err(AuthError::MissingAuthHeader)));
    }

    #[test]
    fn test_should_fail_sigv4_with_unknown_access_key() {
        let provider = StaticCredentialProvider::new(vec![]);
        let empty_hash = hash_payload(b"");

        let auth_value = "AWS4-HMAC-SHA256 Credential=UNKNOWN/20130524/us-east-1/s3/aws4_request,\
             SignedHeaders=host;x-amz-date,Signature=abc123"
            .to_owned();

        let (parts, _body) = http::Request::builder()
            .method("GET")
            .uri("http://example.com/")
            .header("host", "example.com")
            .header("x-amz-date", "20130524T000000Z")
            .header(http::header::AUTHORIZATION, &auth_value)
            .body(())
            .unwrap()
            .into_parts();

        let result = verify_sigv4(&parts, &empty_hash, &provider);
        assert!(matches!(result, Err(AuthError::AccessKeyNotFound(_))));
    }

    #[test]
    fn test_should_hash_empty_payload() {
        assert_eq!(
            hash_payload(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

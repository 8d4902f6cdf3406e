//! AWS Signature Version 4
//!
//! Two request shapes are needed:
//! - a presigned `GET` carrying the action and its parameters in the query
//!   string (single messages)
//! - a `POST` with a JSON body and an `Authorization` header (batches)
//!
//! Signing follows the usual four steps: canonical request, string to sign,
//! derived key (`AWS4`+secret → date → region → service → `aws4_request`),
//! hex HMAC signature.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::{DeliveryError, DeliveryResult};

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const ISO_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const DATE_FORMAT: &str = "%Y%m%d";
const TERMINATOR: &str = "aws4_request";

/// Lifetime of a presigned URL, in seconds
pub const PRESIGN_EXPIRES_SECS: u32 = 30;

/// Method of a signed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully signed request, ready to hand to an HTTP client
#[derive(Debug, Clone, PartialEq)]
pub struct SignedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Characters SigV4 leaves unescaped: `A-Z a-z 0-9 - . _ ~`
const AWS_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Percent-encode everything but the unreserved set, with uppercase hex
pub fn aws_escape(value: &str) -> String {
    utf8_percent_encode(value, AWS_UNRESERVED).to_string()
}

fn hmac(key: &[u8], data: &str) -> DeliveryResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| DeliveryError::Signing(e.to_string()))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Derive the per-day signing key
pub fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> DeliveryResult<Vec<u8>> {
    let date_key = hmac(format!("AWS4{}", secret).as_bytes(), date)?;
    let region_key = hmac(&date_key, region)?;
    let service_key = hmac(&region_key, service)?;
    hmac(&service_key, TERMINATOR)
}

/// Canonical request: verb, path, query, headers, signed header list and
/// payload hash, one per line. Header names must already be lowercase.
fn canonical_request(
    method: HttpMethod,
    path: &str,
    query: &str,
    headers: &BTreeMap<String, String>,
    payload: &str,
) -> String {
    let mut out = format!("{}\n/{}\n{}\n", method, path, query);
    for (name, value) in headers {
        out.push_str(&format!("{}:{}\n", name, value.trim()));
    }
    out.push('\n');
    out.push_str(&signed_headers(headers));
    out.push('\n');
    out.push_str(&sha256_hex(payload));
    out
}

fn signed_headers(headers: &BTreeMap<String, String>) -> String {
    headers.keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

/// Signs requests for one service with one set of credentials
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    service: String,
}

impl Signer {
    pub fn new(credentials: Credentials, service: impl Into<String>) -> Self {
        Self {
            credentials,
            service: service.into(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    fn scope(&self, now: DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/{}",
            now.format(DATE_FORMAT),
            self.credentials.region,
            self.service,
            TERMINATOR
        )
    }

    fn signature(&self, now: DateTime<Utc>, canonical: &str) -> DeliveryResult<String> {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            now.format(ISO_FORMAT),
            self.scope(now),
            sha256_hex(canonical)
        );
        let key = signing_key(
            &self.credentials.secret_key,
            &now.format(DATE_FORMAT).to_string(),
            &self.credentials.region,
            &self.service,
        )?;
        Ok(hex::encode(hmac(&key, &string_to_sign)?))
    }

    /// Presigned `GET` for `action`, parameters sorted by name
    pub fn presigned_get(
        &self,
        action: &str,
        params: &BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> DeliveryResult<SignedRequest> {
        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.credentials.host.clone());

        let mut query = format!("Action={}", action);
        for (name, value) in params {
            query.push_str(&format!("&{}={}", aws_escape(name), aws_escape(value)));
        }
        query.push_str(&format!("&X-Amz-Algorithm={}", ALGORITHM));
        query.push_str(&format!(
            "&X-Amz-Credential={}",
            aws_escape(&format!("{}/{}", self.credentials.access_key, self.scope(now)))
        ));
        query.push_str(&format!("&X-Amz-Date={}", now.format(ISO_FORMAT)));
        query.push_str(&format!("&X-Amz-Expires={}", PRESIGN_EXPIRES_SECS));
        query.push_str(&format!("&X-Amz-SignedHeaders={}", signed_headers(&headers)));

        let canonical = canonical_request(HttpMethod::Get, &self.credentials.endpoint, &query, &headers, "");
        let signature = self.signature(now, &canonical)?;

        Ok(SignedRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}://{}/{}?{}&X-Amz-Signature={}",
                self.credentials.scheme, self.credentials.host, self.credentials.endpoint, query, signature
            ),
            headers: Vec::new(),
            body: None,
        })
    }

    /// JSON `POST` for `action`, signed through the `Authorization` header
    pub fn signed_post(&self, action: &str, body: String, now: DateTime<Utc>) -> DeliveryResult<SignedRequest> {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/x-amz-json-1.0".to_string());
        headers.insert("host".to_string(), self.credentials.host.clone());
        headers.insert("x-amz-date".to_string(), now.format(ISO_FORMAT).to_string());
        headers.insert(
            "x-amz-target".to_string(),
            format!("Amazon{}.{}", self.service.to_uppercase(), action),
        );

        let canonical = canonical_request(HttpMethod::Post, "", "", &headers, &body);
        let signature = self.signature(now, &canonical)?;
        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key,
            self.scope(now),
            signed_headers(&headers),
            signature
        );

        let mut request_headers: Vec<(String, String)> =
            headers.into_iter().filter(|(name, _)| name != "host").collect();
        request_headers.push(("authorization".to_string(), authorization));

        Ok(SignedRequest {
            method: HttpMethod::Post,
            url: format!("{}://{}/", self.credentials.scheme, self.credentials.host),
            headers: request_headers,
            body: Some(body),
        })
    }
}

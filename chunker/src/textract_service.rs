//! AWS Textract `DetectDocumentText` as an [`OcrProvider`].
//!
//! Requests use the JSON 1.1 protocol and are signed with
//! [AWS Signature Version 4](https://docs.aws.amazon.com/general/latest/gr/sigv4_signing.html)
//! using `hmac` + `sha2`, so no AWS SDK is needed.

use crate::blocks::{Block, DetectDocumentTextResponse};
use crate::capabilities::OcrProvider;
use crate::config::Config;
use crate::error::IngestError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::json;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SERVICE: &str = "textract";
const TARGET: &str = "Textract.DetectDocumentText";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

pub struct TextractService {
    client: Client,
    credentials: AwsCredentials,
    region: String,
    host: String,
    url: String,
}

impl TextractService {
    pub fn new(config: &Config) -> Result<Self, IngestError> {
        let access_key_id = config.aws_access_key_id.clone().ok_or_else(|| {
            IngestError::Config("AWS_ACCESS_KEY_ID environment variable not set".to_string())
        })?;
        let secret_access_key = config.aws_secret_access_key.clone().ok_or_else(|| {
            IngestError::Config("AWS_SECRET_ACCESS_KEY environment variable not set".to_string())
        })?;

        // Custom endpoints (LocalStack etc.) keep their own scheme.
        let (host, url) = match &config.textract_endpoint {
            Some(endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string();
                (host, format!("{}/", endpoint))
            }
            None => {
                let host = format!("{}.{}.amazonaws.com", SERVICE, config.aws_region);
                let url = format!("https://{}/", host);
                (host, url)
            }
        };

        Ok(Self {
            client: config.http_client()?,
            credentials: AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: config.aws_session_token.clone(),
            },
            region: config.aws_region.clone(),
            host,
            url,
        })
    }

    fn sign(&self, body: &[u8], now: DateTime<Utc>) -> Vec<(String, String)> {
        sign_request(&self.credentials, &self.region, &self.host, body, now)
    }
}

#[async_trait]
impl OcrProvider for TextractService {
    async fn detect_blocks(&self, bytes: &[u8], mime_type: &str) -> Result<Vec<Block>> {
        log::info!(
            "Textract DetectDocumentText: {} bytes ({})",
            bytes.len(),
            mime_type
        );

        let body = json!({
            "Document": {
                "Bytes": base64::engine::general_purpose::STANDARD.encode(bytes)
            }
        })
        .to_string();

        let headers = self.sign(body.as_bytes(), Utc::now());
        let mut request = self.client.post(&self.url);
        for (name, value) in headers {
            if name != "host" {
                request = request.header(name, value);
            }
        }

        let response = request
            .body(body)
            .send()
            .await
            .context("Textract request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Textract API error ({}): {}", status, error_text);
        }

        let parsed: DetectDocumentTextResponse = response
            .json()
            .await
            .context("Textract returned malformed blocks")?;

        log::info!("Textract returned {} blocks", parsed.blocks.len());
        Ok(parsed.blocks)
    }
}

/// Produces the headers for a signed `DetectDocumentText` POST, `Authorization` included.
fn sign_request(
    creds: &AwsCredentials,
    region: &str,
    host: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Vec<(String, String)> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(body);

    let mut headers = vec![
        ("content-type".to_string(), CONTENT_TYPE.to_string()),
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
        ("x-amz-target".to_string(), TARGET.to_string()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "POST\n/\n\n{}\n{}\n{}",
        canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date_stamp, region, SERVICE);
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    headers.push((
        "authorization".to_string(),
        format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            creds.access_key_id, credential_scope, signed_headers, signature
        ),
    ));
    headers
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

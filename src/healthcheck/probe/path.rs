//! HTTP path checks against the container's network address.
//!
//! Retries live in [`HttpClient`] rather than the shared retry helper: one
//! `get` call makes up to `retries + 1` requests, pausing `wait` between them,
//! and retries on transport errors and non-2xx responses.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};

use super::{ProbeError, ProbeOutcome};
use crate::healthcheck::{DefinitionError, Healthcheck, Scheme};
use crate::healthcheck::probe::ProbeContext;
use crate::runtime::ContainerState;

/// The request a path check makes, borrowed from its [`ProbeKind`](crate::healthcheck::ProbeKind).
#[derive(Debug, Clone, Copy)]
pub struct PathTarget<'a> {
    pub path: &'a str,
    pub port: u16,
    pub scheme: Scheme,
    pub content: Option<&'a str>,
    pub headers: &'a [(String, String)],
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

pub struct HttpClient {
    client: reqwest::Client,
    retry_count: u32,
    retry_wait: Duration,
}

impl HttpClient {
    pub fn new(
        retry_count: u32,
        retry_wait: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().no_proxy();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            retry_count,
            retry_wait,
        })
    }

    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, reqwest::Error> {
        let mut retries = 0;
        loop {
            let result = self.fetch(url, headers).await;
            let retry = match &result {
                Ok(response) => !response.status.is_success(),
                Err(_) => true,
            };
            if !retry || retries >= self.retry_count {
                return result;
            }

            retries += 1;
            match &result {
                Ok(response) => log::debug!("GET {} returned {}, retry {}", url, response.status, retries),
                Err(e) => log::debug!("GET {} failed: {}, retry {}", url, e, retries),
            }
            tokio::time::sleep(self.retry_wait).await;
        }
    }

    async fn fetch(&self, url: &str, headers: &HeaderMap) -> Result<HttpResponse, reqwest::Error> {
        let response = self.client.get(url).headers(headers.clone()).send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

pub async fn run(
    check: &Healthcheck,
    target: &PathTarget<'_>,
    container: &ContainerState,
    context: &ProbeContext,
) -> ProbeOutcome {
    let ip_address = match &context.ip_address {
        Some(ip) => ip.as_str(),
        None => match container.ip_address(&context.network) {
            Some(ip) => ip,
            None => {
                return ProbeError::from(DefinitionError::UnknownNetwork {
                    container: container.id.clone(),
                    network: context.network.clone(),
                })
                .into();
            }
        },
    };

    let headers = match request_headers(&context.headers, target.headers) {
        Ok(headers) => headers,
        Err(e) => return ProbeError::from(e).into(),
    };

    let host = if ip_address.contains(':') {
        format!("[{ip_address}]")
    } else {
        ip_address.to_string()
    };
    let url = format!(
        "{}://{}:{}{}",
        target.scheme.as_str(),
        host,
        target.port,
        target.path
    );

    let client = match HttpClient::new(check.retries(), check.wait, check.timeout) {
        Ok(client) => client,
        Err(e) => return ProbeError::from(e).into(),
    };

    let response = match client.get(&url, &headers).await {
        Ok(response) => response,
        Err(e) => return ProbeError::from(e).into(),
    };

    if !response.status.is_success() {
        return ProbeOutcome::failed(
            response.body,
            vec![ProbeError::Status(response.status.as_u16())],
        );
    }

    if let Some(content) = target.content {
        if !contains(&response.body, content.as_bytes()) {
            return ProbeOutcome::failed(
                response.body,
                vec![ProbeError::MissingContent(content.to_string())],
            );
        }
    }

    ProbeOutcome::passed(response.body)
}

/// Context headers first, then the check's own, then `Accept: */*`.
fn request_headers(
    context: &[(String, String)],
    check: &[(String, String)],
) -> Result<HeaderMap, DefinitionError> {
    let mut headers = HeaderMap::new();
    for (name, value) in context.iter().chain(check) {
        let invalid = || DefinitionError::InvalidHeader(format!("{name}: {value}"));
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        headers.insert(name, value);
    }
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    Ok(headers)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

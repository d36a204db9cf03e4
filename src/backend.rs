use std::fmt;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::config::{Config, ContractVersion};
use crate::logging::log_request;
use crate::params::ParameterSet;
use crate::retry::{is_retryable_http_error, is_retryable_network_error, retry_async_when, RetryConfig};
use crate::series::{Diagrams, StartState};

/// The simulation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /get_start`: stored parameters and the series computed from them.
    async fn get_start(&self) -> Result<StartState>;
    /// `GET /get_data?<params>`: series recomputed for `params`.
    async fn get_data(&self, params: &ParameterSet) -> Result<Diagrams>;
}

/// Failure worth another attempt (connect/timeout, 5xx, 408, 429).
#[derive(Debug)]
struct Transient(String);

impl fmt::Display for Transient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Transient {}

/// Parse a base URL so that relative joins append instead of replacing
/// the last path segment.
pub fn parse_base(url: &str) -> Result<Url> {
    let mut base = Url::parse(url).with_context(|| format!("invalid base url {:?}", url))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base)
}

pub struct HttpBackend {
    client: Client,
    base: Url,
    contract: ContractVersion,
    retry: RetryConfig,
}

impl HttpBackend {
    pub fn new(client: Client, base: Url, contract: ContractVersion, retry: RetryConfig) -> Self {
        Self {
            client,
            base,
            contract,
            retry,
        }
    }

    pub fn from_config(cfg: &Config, client: Client) -> Result<Self> {
        Ok(Self::new(client, parse_base(&cfg.backend_url)?, cfg.contract, cfg.retry()))
    }

    pub fn start_url(&self) -> Result<Url> {
        Ok(self.base.join("get_start")?)
    }

    pub fn data_url(&self, params: &ParameterSet) -> Result<Url> {
        let mut url = self.base.join("get_data")?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in params.query_pairs(self.contract) {
                query.append_pair(name, &value);
            }
        }
        Ok(url)
    }

    async fn fetch_json(&self, url: &Url) -> Result<Value> {
        let resp = match self.client.get(url.clone()).send().await {
            Ok(resp) => resp,
            Err(e) if is_retryable_network_error(&e) => return Err(Transient(e.to_string()).into()),
            Err(e) => return Err(e.into()),
        };
        let status = resp.status();
        if !status.is_success() {
            let msg = format!("GET {} returned {}", url.path(), status);
            if is_retryable_http_error(status.as_u16()) {
                return Err(Transient(msg).into());
            }
            bail!(msg);
        }
        resp.json::<Value>()
            .await
            .with_context(|| format!("decoding response of {}", url.path()))
    }

    async fn fetch_with_retry(&self, name: &str, url: &Url) -> Result<Value> {
        retry_async_when(&self.retry, name, || self.fetch_json(url), |e| e.is::<Transient>()).await
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get_start(&self) -> Result<StartState> {
        let url = self.start_url()?;
        log_request("/get_start", None);
        let body = self.fetch_with_retry("get_start", &url).await?;
        StartState::from_json(&body, self.contract)
    }

    async fn get_data(&self, params: &ParameterSet) -> Result<Diagrams> {
        let url = self.data_url(params)?;
        log_request("/get_data", Some(&params.digest()));
        let body = self.fetch_with_retry("get_data", &url).await?;
        Diagrams::from_json(&body, self.contract)
    }
}

/// Loopback HTTP server that answers every request with one fixed status.
#[cfg(test)]
pub(crate) mod status_server {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    /// Returns the server's base URL and a count of requests it has seen.
    pub(crate) async fn serve(status: &'static str) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut chunk = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&chunk[..n]),
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (Url::parse(&format!("http://{}/", addr)).unwrap(), hits)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::params::ParamField;

    fn quick_retries() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
        }
    }

    fn backend(contract: ContractVersion) -> HttpBackend {
        HttpBackend::new(
            Client::new(),
            parse_base("http://localhost:8080/pv").unwrap(),
            contract,
            RetryConfig::none(),
        )
    }

    #[test]
    fn test_base_keeps_prefix() {
        let b = backend(ContractVersion::Extended);
        assert_eq!(b.start_url().unwrap().as_str(), "http://localhost:8080/pv/get_start");
    }

    #[test]
    fn test_data_url_encodes_every_parameter() {
        let params = ParameterSet::new()
            .with(ParamField::Year, "2024")
            .with(ParamField::PanelEastAzm, "-10")
            .with(ParamField::KGain, "1 & 2");
        let url = backend(ContractVersion::Extended).data_url(&params).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs.len(), 15);
        assert_eq!(pairs[0], ("year".to_string(), "2024".to_string()));
        assert!(pairs.contains(&("panel_east_azm".to_string(), "-10".to_string())));
        assert!(pairs.contains(&("k_gain".to_string(), "1 & 2".to_string())));
        assert!(pairs.contains(&("stop_elv".to_string(), String::new())));
    }

    #[test]
    fn test_legacy_data_url_has_no_sun_path() {
        let url = backend(ContractVersion::Legacy).data_url(&ParameterSet::new()).unwrap();
        assert_eq!(url.query_pairs().count(), 11);
        assert!(!url.query().unwrap_or("").contains("start_azm"));
    }

    #[tokio::test]
    async fn test_unreachable_backend_fails() {
        let b = HttpBackend::new(
            Client::new(),
            parse_base("http://127.0.0.1:9").unwrap(),
            ContractVersion::Extended,
            RetryConfig::none(),
        );
        assert!(b.get_start().await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_backend_is_retried() {
        let (base, hits) = status_server::serve("503 Service Unavailable").await;
        let b = HttpBackend::new(Client::new(), base, ContractVersion::Extended, quick_retries());
        let err = b.get_start().await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_not_found_is_final() {
        let (base, hits) = status_server::serve("404 Not Found").await;
        let b = HttpBackend::new(Client::new(), base, ContractVersion::Extended, quick_retries());
        let err = b.get_data(&ParameterSet::new()).await.unwrap_err();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(err.to_string().contains("404"));
    }
}

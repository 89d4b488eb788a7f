use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::messages::{snapshot_fields, AuthStatus, ScannerRequest, ScannerResponse, SnapshotRow};
use super::ScanCapability;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::{QuoteSnapshot, ScanItem, ScanParams};

/// REST client for the brokerage Client Portal gateway.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    connected: AtomicBool,
}

impl GatewayClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        // The gateway ships a self-signed certificate on localhost.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.gateway_timeout_secs))
            .danger_accept_invalid_certs(cfg.gateway_accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.gateway_url.trim_end_matches('/').to_string(),
            connected: AtomicBool::new(false),
        })
    }

    /// Verify the gateway has an authenticated brokerage session.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to gateway at {}", self.base_url);

        let status: AuthStatus = self
            .get_json("/iserver/auth/status", &[])
            .await
            .map_err(|e| AppError::NotConnected(e.to_string()))?;

        if !status.is_ready() {
            let reason = status.message.unwrap_or_else(|| {
                format!(
                    "authenticated={} connected={} competing={}",
                    status.authenticated, status.connected, status.competing
                )
            });
            return Err(AppError::NotConnected(reason));
        }

        self.connected.store(true, Ordering::SeqCst);
        info!("Gateway session established");
        Ok(())
    }

    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Disconnected from gateway");
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let resp = self.http.get(self.url(path)).query(query).send().await?;
        Self::decode(path, resp).await
    }

    async fn decode<T: DeserializeOwned>(path: &str, resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ExternalCall(format!("{path} returned {status}: {body}")));
        }
        Ok(resp.json::<T>().await?)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AppError::NotConnected("no gateway session".to_string()))
        }
    }
}

#[async_trait]
impl ScanCapability for GatewayClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn scan(&self, params: &ScanParams) -> Result<Vec<ScanItem>> {
        self.ensure_connected()?;

        let body = ScannerRequest::from(params);
        debug!(scan_code = %body.scan_type, filters = body.filter.len(), "Submitting scanner request");

        let path = "/iserver/scanner/run";
        let resp = self.http.post(self.url(path)).json(&body).send().await?;
        let parsed: ScannerResponse = Self::decode(path, resp).await?;

        Ok(parsed.contracts.into_iter().map(ScanItem::from).collect())
    }

    async fn snapshot(&self, contract_ids: &[i64]) -> Result<Vec<QuoteSnapshot>> {
        self.ensure_connected()?;
        if contract_ids.is_empty() {
            return Ok(Vec::new());
        }

        let conids = contract_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let rows: Vec<SnapshotRow> = self
            .get_json(
                "/iserver/marketdata/snapshot",
                &[("conids", conids), ("fields", snapshot_fields())],
            )
            .await?;

        if rows.len() < contract_ids.len() {
            warn!(
                requested = contract_ids.len(),
                received = rows.len(),
                "Snapshot missing some contracts"
            );
        }
        Ok(rows.into_iter().map(QuoteSnapshot::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn client() -> GatewayClient {
        let cfg = Config::from_vars(|_| None).expect("default config");
        GatewayClient::new(&cfg).expect("client")
    }

    #[test]
    fn starts_disconnected() {
        let c = client();
        assert!(!c.is_connected());
        c.disconnect();
        assert!(!c.is_connected());
    }

    #[test]
    fn url_joins_without_double_slash() {
        let cfg = Config::from_vars(|k| (k == "GATEWAY_URL").then(|| "https://gw:5000/v1/api/".to_string()))
            .expect("config");
        let c = GatewayClient::new(&cfg).unwrap();
        assert_eq!(c.url("/iserver/auth/status"), "https://gw:5000/v1/api/iserver/auth/status");
    }

    #[tokio::test]
    async fn calls_require_a_session() {
        let c = client();
        let params = ScanParams::default();
        assert!(matches!(c.scan(&params).await, Err(AppError::NotConnected(_))));
        assert!(matches!(c.snapshot(&[1]).await, Err(AppError::NotConnected(_))));
    }
}

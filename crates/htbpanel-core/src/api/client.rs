//! Lab REST API v4 client.
//!
//! Uses reqwest with bearer-token default headers. Bulk listings are paced
//! by `SyncConfig::request_delay_ms` to stay under the platform rate limit.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use super::LabApi;
use super::types::{
    ActiveMachine, ConnectionStatus, FlagResponse, Info, MachineProfile, MachineRecord, Page,
    ServersResponse, TagBatch, TagRecord, UserInfoPayload, VpnRecord,
};
use crate::config::{ApiConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::models::{ActiveBox, ActiveVpn, MachineAction, UserInfo};

/// Lab REST API v4 client.
#[derive(Debug, Clone)]
pub struct HtbClient {
    http: reqwest::Client,
    base_url: String,
    page_size: u32,
    request_delay: Duration,
}

impl HtbClient {
    /// Create a new client authenticated with `token`.
    pub fn new(api: &ApiConfig, sync: &SyncConfig, token: &str) -> Result<Self> {
        if api.base_url.is_empty() {
            return Err(Error::Config("api.base_url is empty".into()));
        }
        if token.is_empty() {
            return Err(Error::Config("API token is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);
        let agent = HeaderValue::from_str(&api.user_agent)
            .map_err(|_| Error::Config("Invalid user agent".into()))?;
        headers.insert(USER_AGENT, agent);

        // reqwest is built with rustls-no-provider; `Err` means a provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(api.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            page_size: sync.page_size.max(1),
            request_delay: Duration::from_millis(sync.request_delay_ms),
        })
    }

    /// Build the URL for an API path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Percent-encode a single path segment (machine names may contain spaces).
    pub(crate) fn encode_segment(segment: &str) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(segment.len());
        for b in segment.bytes() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
                out.push(b as char);
            } else {
                let _ = write!(out, "%{b:02X}");
            }
        }
        out
    }

    /// Parse a response body, mapping shape mismatches to `MalformedResponse`.
    pub(crate) fn parse_body<T: DeserializeOwned>(path: &str, body: &str) -> Result<T> {
        serde_json::from_str(body)
            .map_err(|e| Error::MalformedResponse(format!("{path}: {e}")))
    }

    async fn pause(&self) {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }
    }

    /// Send a request and return its status and body text.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(u16, String)> {
        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok((status.as_u16(), body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        debug!(path, "GET");
        let (status, body) = self.send(self.http.get(self.api_url(path))).await?;
        check_status(status, &body)?;
        Self::parse_body(path, &body)
    }

    async fn post(&self, path: &str, body: Option<&impl Serialize>) -> Result<(u16, String)> {
        debug!(path, "POST");
        let mut request = self.http.post(self.api_url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    async fn machine_page(&self, path: &str) -> Result<Page<MachineRecord>> {
        self.get_json(path).await
    }
}

fn check_status(status: u16, body: &str) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(Error::RequestFailed {
        status,
        body: body.to_string(),
    })
}

impl LabApi for HtbClient {
    async fn fetch_user_info(&self) -> Result<UserInfo> {
        let info: Info<UserInfoPayload> = self.get_json("/user/info").await?;
        Ok(info.info.into())
    }

    async fn fetch_playable_machines(&self) -> Result<Vec<MachineRecord>> {
        let page = self
            .machine_page(&format!("/machine/paginated?per_page={}", self.page_size))
            .await?;
        info!(count = page.data.len(), "Fetched playable machines");
        Ok(page.data)
    }

    async fn fetch_retired_machines(&self) -> Result<Vec<MachineRecord>> {
        let path = |page: u32| {
            format!(
                "/machine/list/retired/paginated?per_page={}&page={page}",
                self.page_size
            )
        };

        let first = self.machine_page(&path(1)).await?;
        let last_page = first.meta.as_ref().map_or(1, |m| m.last_page);
        let mut total = first.data;

        for page in 2..=last_page {
            self.pause().await;
            let next = self.machine_page(&path(page)).await?;
            debug!(page, last_page, count = next.data.len(), "Fetched retired page");
            total.extend(next.data);
        }

        info!(count = total.len(), pages = last_page, "Fetched retired machines");
        Ok(total)
    }

    async fn fetch_vpns(&self) -> Result<Vec<VpnRecord>> {
        let resp: ServersResponse = self
            .get_json("/connections/servers?product=release_arena")
            .await?;
        Ok(resp.data.servers())
    }

    async fn fetch_tags(&self, machine_ids: &[i64]) -> Result<TagBatch> {
        let mut batch = TagBatch::default();
        for (idx, id) in machine_ids.iter().enumerate() {
            if idx > 0 {
                self.pause().await;
            }
            let tags: Info<Vec<TagRecord>> = self.get_json(&format!("/machine/tags/{id}")).await?;
            debug!(machine_id = *id, count = tags.info.len(), "Fetched machine tags");
            batch.push_machine(*id, tags.info);
        }
        info!(
            machines = machine_ids.len(),
            tags = batch.tags.len(),
            "Fetched machine tags"
        );
        Ok(batch)
    }

    async fn fetch_active_box(&self) -> Result<Option<ActiveBox>> {
        let active: Info<Option<ActiveMachine>> = self.get_json("/machine/active").await?;
        let Some(active) = active.info else {
            return Ok(None);
        };

        let profile: Info<MachineProfile> = self
            .get_json(&format!(
                "/machine/profile/{}",
                Self::encode_segment(&active.name)
            ))
            .await?;
        if profile.info.id != active.id {
            return Err(Error::MalformedResponse(format!(
                "profile for {} returned machine {}",
                active.id, profile.info.id
            )));
        }
        Ok(Some(profile.info.into_active_box(active.ip)))
    }

    async fn fetch_active_vpn(&self) -> Result<ActiveVpn> {
        let servers: ServersResponse = self
            .get_json("/connections/servers?product=release_arena")
            .await?;
        let status: Vec<ConnectionStatus> = self.get_json("/connection/status").await?;
        Ok(servers.data.active_vpn(&status))
    }

    async fn machine_action(&self, action: MachineAction, machine_id: i64) -> Result<()> {
        let (status, body) = match action {
            MachineAction::Start => {
                self.post(&format!("/machine/play/{machine_id}"), None::<&()>)
                    .await?
            }
            MachineAction::Stop => self.post("/machine/stop", None::<&()>).await?,
            MachineAction::Reset => {
                self.post("/vm/reset", Some(&json!({ "machine_id": machine_id })))
                    .await?
            }
        };
        check_status(status, &body)?;
        info!(%action, machine_id, "Machine action accepted");
        Ok(())
    }

    async fn submit_flag(&self, machine_id: i64, flag: &str) -> Result<FlagResponse> {
        let path = "/machine/own";
        let (status, body) = self
            .post(path, Some(&json!({ "id": machine_id, "flag": flag })))
            .await?;
        if check_status(status, &body).is_ok() {
            return Self::parse_body(path, &body);
        }
        // Wrong flags come back as a client error carrying a message.
        match Self::parse_body::<FlagResponse>(path, &body) {
            Ok(resp) if resp.is_incorrect() => Ok(resp),
            _ => Err(Error::RequestFailed { status, body }),
        }
    }
}

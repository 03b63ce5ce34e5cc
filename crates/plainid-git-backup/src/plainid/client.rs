use std::sync::Mutex;
use std::time::{Duration, Instant};

use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::PlainIdConfig;
use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

use super::model::{
    ApplicationDescriptor, ApplicationListing, ApplicationSummary, AssetType, DataItem, DataList,
    EnvironmentInfo, IdentityInfo, PaaGroup, PolicyListing, PolicySummary, TokenResponse,
    WorkspaceInfo,
};
use super::paging::Page;
use super::{ConfigSource, Inventory};

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_REGO: &str = "text/plain;language=rego";
const TOKEN_PATH: &str = "/api/1.0/api-key/token";
// Refresh the bearer token this long before the server says it expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(30);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PlainIdClient {
    base_url: String,
    client_id: String,
    client_secret: String,
    http: reqwest::blocking::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PlainIdClient {
    pub fn new(cfg: &PlainIdConfig) -> Result<Self> {
        let base_url = cfg.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::config("plainid.base_url is required"));
        }
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::fetch(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            client_id: cfg.client_id.trim().to_string(),
            client_secret: cfg.client_secret.trim().to_string(),
            http,
            token: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<String> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| Error::msg("PlainID token cache lock poisoned"))?;
        if let Some(t) = slot.as_ref()
            && t.expires_at > Instant::now() + TOKEN_EXPIRY_SLACK
        {
            return Ok(t.value.clone());
        }

        tracing::debug!(url = %self.url(TOKEN_PATH), "requesting PlainID access token");
        let res = self
            .http
            .post(self.url(TOKEN_PATH))
            .header(ACCEPT, ACCEPT_JSON)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .map_err(|e| Error::fetch(format!("token request failed: {e}")))?;
        let status = res.status();
        let body = res
            .bytes()
            .map_err(|e| Error::fetch(format!("failed to read token response: {e}")))?;
        if !status.is_success() {
            return Err(Error::fetch(format!(
                "token request failed with status {status}: {}",
                body_text(&body)
            )));
        }
        let tok: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::fetch(format!("failed to parse token response: {e}")))?;
        let ttl = tok
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        *slot = Some(CachedToken {
            value: tok.access_token.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(tok.access_token)
    }

    fn get_bytes(&self, path: &str, query: &[(&str, &str)], accept: &str) -> Result<Vec<u8>> {
        let token = self.bearer()?;
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let mut req = self.http.get(&url).header(ACCEPT, accept).bearer_auth(token);
        if !query.is_empty() {
            req = req.query(query);
        }
        let res = req
            .send()
            .map_err(|e| Error::fetch(format!("GET {path} failed: {e}")))?;
        let status = res.status();
        let body = res
            .bytes()
            .map_err(|e| Error::fetch(format!("failed to read response of GET {path}: {e}")))?;
        if !status.is_success() {
            return Err(Error::fetch(format!(
                "GET {path} failed with status {status}: {}",
                body_text(&body)
            )));
        }
        Ok(body.to_vec())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let body = self.get_bytes(path, query, ACCEPT_JSON)?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::fetch(format!("failed to parse response of GET {path}: {e}")))
    }
}

fn body_text(body: &[u8]) -> String {
    sanitize_log_line(String::from_utf8_lossy(body).trim())
}

impl Inventory for PlainIdClient {
    fn list_environments(&self) -> Result<Vec<EnvironmentInfo>> {
        let out: DataList<EnvironmentInfo> = self
            .get_json("/env-mgmt/environment", &[])
            .map_err(|e| e.context("list environments"))?;
        Ok(out.data)
    }

    fn list_workspaces(&self, env_id: &str) -> Result<Vec<WorkspaceInfo>> {
        let path = format!("/env-mgmt/1.0-int.1/authorization-workspaces/{env_id}");
        let out: DataList<WorkspaceInfo> = self
            .get_json(&path, &[("offset", "0"), ("limit", "100")])
            .map_err(|e| e.context(format!("list workspaces of environment {env_id}")))?;
        Ok(out.data)
    }

    fn list_identities(&self, env_id: &str) -> Result<Vec<IdentityInfo>> {
        let path = format!("/env-mgmt/1.0/identity-workspaces/{env_id}");
        let out: DataList<IdentityInfo> = self
            .get_json(&path, &[("offset", "0"), ("limit", "100")])
            .map_err(|e| e.context(format!("list identities of environment {env_id}")))?;
        Ok(out.data)
    }
}

impl ConfigSource for PlainIdClient {
    fn fetch_identity_template(&self, env_id: &str, identity_id: &str) -> Result<Vec<u8>> {
        let path = format!("/api/1.0/identity-templates/{env_id}/{identity_id}");
        self.get_bytes(&path, &[], ACCEPT_JSON)
            .map_err(|e| e.context(format!("fetch identity template {identity_id}")))
    }

    fn fetch_paa_groups(&self, env_id: &str) -> Result<Vec<PaaGroup>> {
        let path = format!("/api/1.0/paa-groups/{env_id}");
        let mut groups: DataList<PaaGroup> = self
            .get_json(&path, &[("limit", "10000"), ("detailed", "true")])
            .map_err(|e| e.context(format!("list PAA groups of environment {env_id}")))?;
        for group in &mut groups.data {
            let sources: DataList<Value> = self
                .get_json(
                    &format!("{path}/{}/sources", group.id),
                    &[("limit", "1000"), ("detailed", "true")],
                )
                .map_err(|e| e.context(format!("fetch sources of PAA group {}", group.id)))?;
            let views: DataList<Value> = self
                .get_json(&format!("{path}/{}/views", group.id), &[])
                .map_err(|e| e.context(format!("fetch views of PAA group {}", group.id)))?;
            group.sources = sources.data;
            group.views = views.data;
        }
        Ok(groups.data)
    }

    fn fetch_asset_template_ids(&self, ws_id: &str) -> Result<Vec<String>> {
        let out: DataList<AssetType> = self
            .get_json(
                "/internal-assets/4.0/asset-types",
                &[("offset", "0"), ("limit", "50"), ("filter[ownerId]", ws_id)],
            )
            .map_err(|e| e.context(format!("list asset templates of workspace {ws_id}")))?;
        Ok(out.data.into_iter().map(|a| a.external_id).collect())
    }

    fn fetch_asset_template(&self, env_id: &str, template_id: &str) -> Result<Vec<u8>> {
        let path = format!("/api/1.0/asset-templates/{env_id}/{template_id}");
        self.get_bytes(&path, &[], ACCEPT_JSON)
            .map_err(|e| e.context(format!("fetch asset template {template_id}")))
    }

    fn list_applications_page(
        &self,
        env_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<ApplicationSummary>> {
        let path = format!("/policy-mgmt/1.0/applications/{env_id}");
        let (offset_s, limit_s) = (offset.to_string(), limit.to_string());
        let out: ApplicationListing = self
            .get_json(
                &path,
                &[("detailed", "true"), ("limit", limit_s.as_str()), ("offset", offset_s.as_str())],
            )
            .map_err(|e| e.context(format!("list applications of environment {env_id}")))?;
        Ok(Page::new(out.data, out.total))
    }

    fn fetch_application(&self, env_id: &str, app_id: &str) -> Result<ApplicationDescriptor> {
        let path = format!("/api/1.0/applications/{env_id}/{app_id}");
        let out: DataItem<ApplicationDescriptor> = self
            .get_json(&path, &[])
            .map_err(|e| e.context(format!("fetch application {app_id}")))?;
        Ok(out.data)
    }

    fn list_policies_page(
        &self,
        env_id: &str,
        app_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Page<PolicySummary>> {
        let path = format!("/policy-mgmt/1.0/policies/{env_id}");
        let (offset_s, limit_s) = (offset.to_string(), limit.to_string());
        let out: PolicyListing = self
            .get_json(
                &path,
                &[("filter[appId]", app_id), ("limit", limit_s.as_str()), ("offset", offset_s.as_str())],
            )
            .map_err(|e| e.context(format!("list policies of application {app_id}")))?;
        Ok(Page::new(out.data, out.meta.total))
    }

    fn fetch_policy(&self, env_id: &str, ws_id: &str, policy_id: &str) -> Result<Vec<u8>> {
        let path = format!("/api/2.0/policies/{env_id}");
        self.get_bytes(
            &path,
            &[
                ("filter[authWsId]", ws_id),
                ("filter[id]", policy_id),
                ("extendedSchema", "true"),
            ],
            ACCEPT_REGO,
        )
        .map_err(|e| e.context(format!("fetch policy {policy_id}")))
    }

    fn fetch_api_mapper_set(&self, env_id: &str, app_id: &str) -> Result<Vec<u8>> {
        let path = format!("/api/1.0/api-mapper-sets/{env_id}/{app_id}");
        self.get_bytes(&path, &[], ACCEPT_JSON)
            .map_err(|e| e.context(format!("fetch API mapper set of application {app_id}")))
    }
}

/// Longhorn REST 客户端
///
/// 基于 reqwest 实现 [`LonghornApi`]

use async_trait::async_trait;
use common::models::{
    BackupGetRequest, Collection, CreateVolumeRequest, PvCreateRequest, PvcCreateRequest,
    RecurringJobAddRequest,
};
use common::{Backup, BackupVolume, Error, Result, Volume};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::api::LonghornApi;

const USER_AGENT: &str = concat!("longhorn-restorer/", env!("CARGO_PKG_VERSION"));

/// 构造 [`LonghornClient`]
#[derive(Debug, Default)]
pub struct LonghornClientBuilder {
    accept_invalid_certs: bool,
}

impl LonghornClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 跳过 TLS 证书校验，只对这个客户端生效
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn build(self, base_url: &str) -> Result<LonghornClient> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "Longhorn URL must be http(s): {}",
                base_url
            )));
        }

        if self.accept_invalid_certs {
            warn!("TLS certificate verification disabled for {}", base_url);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(LonghornClient { http, base_url })
    }
}

#[derive(Debug, Clone)]
pub struct LonghornClient {
    http: reqwest::Client,
    base_url: String,
}

impl LonghornClient {
    pub fn builder() -> LonghornClientBuilder {
        LonghornClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn action_url(&self, collection: &str, id: &str, action: &str) -> String {
        format!("{}/{}/{}?action={}", self.base_url, collection, id, action)
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error("GET", &url, e))?;
        decode("GET", &url, response).await
    }

    /// 404 视为资源不存在
    async fn get_optional<T: DeserializeOwned>(&self, url: String) -> Result<Option<T>> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error("GET", &url, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode("GET", &url, response).await.map(Some)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: String, body: &B) -> Result<T> {
        debug!("POST {}", url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error("POST", &url, e))?;
        decode("POST", &url, response).await
    }
}

fn request_error(method: &str, url: &str, err: reqwest::Error) -> Error {
    Error::Request(format!("{} {}: {}", method, url, err))
}

/// 非 2xx 状态连同响应体一起转成错误
async fn decode<T: DeserializeOwned>(method: &str, url: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Request(format!(
            "{} {} returned {}: {}",
            method,
            url,
            status,
            body.trim()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| request_error(method, url, e))?;
    let value = serde_json::from_slice(&bytes)
        .inspect_err(|e| warn!("{} {}: invalid response body: {}", method, url, e))?;
    Ok(value)
}

#[async_trait]
impl LonghornApi for LonghornClient {
    async fn get_volume(&self, name: &str) -> Result<Option<Volume>> {
        self.get_optional(self.url(&format!("volumes/{}", name))).await
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>> {
        let collection: Collection<Volume> = self.get(self.url("volumes")).await?;
        Ok(collection.data)
    }

    async fn get_backup_volume(&self, name: &str) -> Result<Option<BackupVolume>> {
        self.get_optional(self.url(&format!("backupvolumes/{}", name))).await
    }

    async fn list_backup_volumes(&self) -> Result<Vec<BackupVolume>> {
        let collection: Collection<BackupVolume> = self.get(self.url("backupvolumes")).await?;
        Ok(collection.data)
    }

    async fn get_backup(&self, backup_volume: &str, backup_name: &str) -> Result<Backup> {
        let body = BackupGetRequest {
            name: backup_name.to_string(),
        };
        self.post(self.action_url("backupvolumes", backup_volume, "backupGet"), &body)
            .await
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume> {
        self.post(self.url("volumes"), request).await
    }

    async fn add_recurring_job_group(&self, volume: &str, group: &str) -> Result<()> {
        let body = RecurringJobAddRequest {
            name: group.to_string(),
            is_group: true,
        };
        let _: serde_json::Value = self
            .post(self.action_url("volumes", volume, "recurringJobAdd"), &body)
            .await?;
        Ok(())
    }

    async fn create_pv(&self, volume: &str, pv_name: &str, fs_type: &str) -> Result<()> {
        let body = PvCreateRequest {
            pv_name: pv_name.to_string(),
            fs_type: fs_type.to_string(),
        };
        let _: serde_json::Value = self
            .post(self.action_url("volumes", volume, "pvCreate"), &body)
            .await?;
        Ok(())
    }

    async fn create_pvc(&self, volume: &str, namespace: &str, pvc_name: &str) -> Result<()> {
        let body = PvcCreateRequest {
            namespace: namespace.to_string(),
            pvc_name: pvc_name.to_string(),
        };
        let _: serde_json::Value = self
            .post(self.action_url("volumes", volume, "pvcCreate"), &body)
            .await?;
        Ok(())
    }
}

use reqwest::{header::ACCEPT, Url};

use super::{raw::resolve_url, Manifest, ManifestProvider};
use crate::{HttpClient, ShizukuError, ShizukuResult};

pub const DEFAULT_MANIFEST_PATH: &str = "/manifest/{id}";

/// Loads JSON manifests from `<base-url><manifest-path>`, where `{id}` in the
/// path is replaced by the media id.
#[derive(Clone)]
pub struct HttpManifestProvider {
    client: HttpClient,
    base_url: Url,
    manifest_path: String,
}

impl HttpManifestProvider {
    pub fn new(client: HttpClient, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            manifest_path: DEFAULT_MANIFEST_PATH.to_string(),
        }
    }

    pub fn with_manifest_path(mut self, manifest_path: impl Into<String>) -> Self {
        self.manifest_path = manifest_path.into();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn manifest_url(&self, media_id: &str) -> ShizukuResult<Url> {
        resolve_url(&self.base_url, &self.manifest_path.replace("{id}", media_id))
    }
}

impl ManifestProvider for HttpManifestProvider {
    async fn manifest(&self, media_id: &str) -> ShizukuResult<Manifest> {
        let url = self.manifest_url(media_id)?;
        tracing::debug!(%url, "Fetching manifest");

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ShizukuError::ManifestFetchError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!("Error body: {body}");
            }
            return Err(ShizukuError::HttpError(status));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ShizukuError::ManifestFetchError(e.to_string()))?;
        let manifest = Manifest::from_json(&data, &self.base_url)?;
        tracing::info!(
            "Manifest of {media_id} loaded: {} video tier(s), {} audio tier(s)",
            manifest.video.representations.len(),
            manifest.audio.representations.len()
        );

        Ok(manifest)
    }
}

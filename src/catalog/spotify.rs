//! Spotify Web API client.
//!
//! Uses the client-credentials flow; the access token is cached and
//! refreshed shortly before it expires.

use super::models::{TrackCandidate, TrackSource};
use super::{CatalogClient, CatalogError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Refresh the token this long before its advertised expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

pub struct SpotifyClient {
    client: Client,
    base_url: String,
    auth_url: String,
    client_id: String,
    client_secret: String,
    market: String,
    timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl SpotifyClient {
    pub fn new(
        base_url: impl Into<String>,
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        market: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            market: market.into(),
            timeout,
            token: Mutex::new(None),
        }
    }

    /// Get a valid access token, refreshing the cached one if needed.
    async fn access_token(&self) -> Result<String, CatalogError> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting new catalog access token");
        let response = self
            .client
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CatalogError::Timeout
                } else {
                    CatalogError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            CatalogError::InvalidResponse(format!("Failed to parse token response: {}", e))
        })?;

        let expires_in = Duration::from_secs(token.expires_in);
        let expires_at = Instant::now() + expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN);
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackCandidate>, CatalogError> {
        let token = self.access_token().await?;
        let url = format!("{}/search", self.base_url);

        debug!(query = %query, limit, "Searching catalog");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&token)
            .query(&[
                ("q", query),
                ("type", "track"),
                ("market", self.market.as_str()),
                ("limit", &limit.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CatalogError::Timeout
                } else {
                    CatalogError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CatalogError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Auth(body));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            CatalogError::InvalidResponse(format!("Failed to parse search response: {}", e))
        })?;

        Ok(map_tracks(body))
    }
}

fn map_tracks(body: SearchResponse) -> Vec<TrackCandidate> {
    body.tracks
        .map(|t| t.items)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| {
            let artist = item.artists.into_iter().next()?.name;
            let link = item.external_urls.spotify?;
            Some(TrackCandidate {
                title: item.name,
                artist,
                external_id: item.id,
                external_link: link,
                popularity_score: item.popularity,
                source: TrackSource::CatalogSearch,
            })
        })
        .collect()
}

// Spotify API types

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TracksPage>,
}

#[derive(Debug, Deserialize)]
struct TracksPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
    #[serde(default)]
    popularity: u32,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ExternalUrls {
    spotify: Option<String>,
}

use axum::{
    extract::{ConnectInfo, Query, State},
    http::header::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use super::client_ip::{extract_client_ip, extract_origin};
use crate::models::{NewOpenEvent, Region};
use crate::recorder::EventRecorder;
use crate::region::{classify, RegionResolver};

pub struct AppState {
    pub resolver: RegionResolver,
    pub recorder: Arc<EventRecorder>,
    pub trust_proxy_headers: bool,
}

/// Query parameters of an open request; missing values are empty
#[derive(Debug, Default, PartialEq, Eq)]
pub struct OpenQuery {
    pub channel_id: String,
    pub app_name: String,
}

impl OpenQuery {
    /// Take the first `channelId` and `appName` values; repeats and unknown
    /// keys are ignored so a query string never rejects the request.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut channel_id = None;
        let mut app_name = None;
        for (key, value) in pairs {
            match key.as_str() {
                "channelId" if channel_id.is_none() => channel_id = Some(value),
                "appName" if app_name.is_none() => app_name = Some(value),
                _ => {}
            }
        }
        Self {
            channel_id: channel_id.unwrap_or_default(),
            app_name: app_name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenResponse {
    pub code: i32,
    pub msg: String,
    pub data: Region,
    pub is_china_county: bool,
    pub is_china_inland: bool,
    /// Carries the inland value, kept for existing clients
    pub is_china: bool,
}

/// Resolve the caller's region and record the open in the background.
///
/// The response never waits for, or reflects, the recording outcome.
pub async fn open_app(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Json<OpenResponse> {
    let query = OpenQuery::from_pairs(pairs);
    let origin = extract_origin(&headers);
    let ip = extract_client_ip(&headers, addr.ip(), state.trust_proxy_headers);
    let region = state.resolver.resolve(&ip);
    let classification = classify(&region);

    if !query.channel_id.is_empty() && !query.app_name.is_empty() {
        info!(
            channel_id = %query.channel_id,
            app_name = %query.app_name,
            ip = %ip,
            region = ?region,
            is_china = classification.is_country_china,
            is_china_inland = classification.is_china_inland,
            "Open request"
        );

        let event = NewOpenEvent {
            channel_id: query.channel_id,
            app_name: query.app_name,
            ip,
            region: region.clone(),
            origin,
            is_country_china: classification.is_country_china,
            is_china_inland: classification.is_china_inland,
            created_at: Utc::now().timestamp(),
        };
        state.recorder.spawn(event);
    }

    Json(OpenResponse {
        code: 0,
        msg: "success".to_string(),
        data: region,
        is_china_county: classification.is_country_china,
        is_china_inland: classification.is_china_inland,
        is_china: classification.is_china_inland,
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "OK" }))
}

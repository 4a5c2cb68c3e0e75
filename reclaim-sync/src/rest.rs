//! HTTP implementation of the backend gateway.

use async_trait::async_trait;
use reclaim_core::{
    Assignment, Booking, BookingDraft, ConfigError, DashboardStats, DeliveryAssignmentRequest,
    DeliveryStatus, Gateway, GatewayError, MutationAck, Pickup, PointsBalance, RecordId,
    RedeemRequest, ReclaimResult, Resource,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::SyncConfig;

/// Error envelope emitted by the backend (`{"detail": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    detail: serde_json::Value,
}

/// Gateway talking to the backend over REST with a bearer token.
#[derive(Debug, Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    auth_header: HeaderMap,
}

impl RestGateway {
    pub fn new(config: &SyncConfig) -> ReclaimResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| GatewayError::Transport {
                path: config.api_base_url.clone(),
                reason: e.to_string(),
            })?;

        let auth_header = build_auth_headers(&config.auth.bearer_token)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T>(&self, path: &str) -> ReclaimResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(url)
            .headers(self.auth_header.clone())
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        self.parse_response(path, response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> ReclaimResult<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        self.parse_response(path, response).await
    }

    /// POST with parameters in the query string and no body.
    async fn post_query<T, Q>(&self, path: &str, query: &Q) -> ReclaimResult<T>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .headers(self.auth_header.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| transport(path, e))?;
        self.parse_response(path, response).await
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> ReclaimResult<T> {
        let status = response.status();
        let text = response.text().await.map_err(|e| transport(path, e))?;
        if !status.is_success() {
            return Err(error_for_status(path, status, &text).into());
        }

        // Mutation endpoints may answer with an empty body.
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| {
            GatewayError::InvalidResponse {
                path: path.to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn assignments(&self) -> ReclaimResult<Vec<Assignment>> {
        self.get_json(Resource::Assignments.path()).await
    }

    async fn pickups(&self) -> ReclaimResult<Vec<Pickup>> {
        self.get_json(Resource::Pickups.path()).await
    }

    async fn dashboard(&self) -> ReclaimResult<DashboardStats> {
        self.get_json(Resource::Dashboard.path()).await
    }

    async fn bookings(&self) -> ReclaimResult<Vec<Booking>> {
        self.get_json(Resource::Bookings.path()).await
    }

    async fn points_balance(&self) -> ReclaimResult<PointsBalance> {
        self.get_json(Resource::PointsBalance.path()).await
    }

    async fn update_status(
        &self,
        booking_id: RecordId,
        status: DeliveryStatus,
    ) -> ReclaimResult<MutationAck> {
        self.post_query(
            "/delivery/update-status",
            &[
                ("booking_id", booking_id.to_string()),
                ("status", status.as_str().to_string()),
            ],
        )
        .await
    }

    async fn assign_delivery(
        &self,
        request: DeliveryAssignmentRequest,
    ) -> ReclaimResult<MutationAck> {
        self.post_json("/admin/assign-delivery", &request).await
    }

    async fn create_booking(&self, draft: &BookingDraft) -> ReclaimResult<MutationAck> {
        self.post_json("/bookings", draft).await
    }

    async fn redeem_points(&self, request: RedeemRequest) -> ReclaimResult<MutationAck> {
        self.post_json("/points/redeem", &request).await
    }
}

fn transport(path: &str, err: reqwest::Error) -> GatewayError {
    GatewayError::Transport {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

/// Map a non-success response to a gateway error, unwrapping the backend's
/// `detail` envelope when present.
fn error_for_status(path: &str, status: StatusCode, text: &str) -> GatewayError {
    if status == StatusCode::UNAUTHORIZED {
        return GatewayError::Unauthorized {
            path: path.to_string(),
        };
    }

    let body = match serde_json::from_str::<ErrorEnvelope>(text) {
        Ok(ErrorEnvelope {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(envelope) => envelope.detail.to_string(),
        Err(_) => text.to_string(),
    };
    GatewayError::Status {
        path: path.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn build_auth_headers(token: &str) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    let value = format!("Bearer {}", token.trim());
    headers.insert(
        HeaderName::from_static("authorization"),
        HeaderValue::from_str(&value).map_err(|e| ConfigError::InvalidValue {
            field: "auth.bearer_token",
            reason: e.to_string(),
        })?,
    );
    Ok(headers)
}

/// Tenant discovery against the provider's connections endpoint
use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// An organisation the signed-in user has connected to this client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Connection id, used to disconnect the tenant
    pub id: Uuid,
    #[serde(default)]
    pub auth_event_id: Option<Uuid>,
    /// Value for the `xero-tenant-id` header on API calls
    pub tenant_id: Uuid,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tenant_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tenant_name: String,
    #[serde(rename = "createdDateUtc", with = "provider_datetime")]
    pub created_at_utc: DateTime<Utc>,
    #[serde(rename = "updatedDateUtc", with = "provider_datetime")]
    pub updated_at_utc: DateTime<Utc>,
}

/// Client for the connections endpoint
#[derive(Debug, Clone)]
pub struct TenantClient {
    http: reqwest::Client,
    connections_endpoint: String,
}

impl TenantClient {
    pub fn new(http: reqwest::Client, connections_endpoint: impl Into<String>) -> Self {
        Self {
            http,
            connections_endpoint: connections_endpoint.into(),
        }
    }

    /// List the tenants reachable with `access_token`
    ///
    /// An empty list is a valid answer: the user may have connected no
    /// organisation yet.
    pub async fn list_tenants(&self, access_token: &str) -> Result<Vec<Tenant>> {
        let response = self
            .http
            .get(&self.connections_endpoint)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::TenantDiscovery(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::TenantDiscovery(e.to_string()))?;

        if !status.is_success() {
            return Err(AuthError::TenantDiscovery(format!(
                "connections endpoint returned {}: {}",
                status,
                truncate(&body)
            )));
        }

        let tenants: Vec<Tenant> = serde_json::from_str(&body)
            .map_err(|e| AuthError::TenantDiscovery(format!("malformed connections list: {}", e)))?;

        info!(count = tenants.len(), "Discovered tenants");
        Ok(tenants)
    }

    /// Remove one connection so the token no longer reaches that tenant
    pub async fn disconnect(&self, access_token: &str, connection_id: Uuid) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.connections_endpoint.trim_end_matches('/'),
            connection_id
        );

        let response = self
            .http
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::TenantDiscovery(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                debug!(%connection_id, "Disconnected tenant");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(AuthError::TenantDiscovery(format!(
                "connection {} not found",
                connection_id
            ))),
            status => Err(AuthError::TenantDiscovery(format!(
                "connections endpoint returned {} for disconnect",
                status
            ))),
        }
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Connections timestamps come without an offset; they are UTC
mod provider_datetime {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp {:?}", raw)))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Some(with_offset.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    }
}

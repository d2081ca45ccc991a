use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::FetchError;
use crate::types::{ListingDetails, ListingSnapshot, OpenHouse};

/// Per-request cap so a stalled fetch cannot overrun the poll interval.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fields requested via `$select` — the tracked snapshot fields plus the
/// detail fields the message templates need.
const SELECT_FIELDS: &str = "ListingId,StandardStatus,ListPrice,ModificationTimestamp,\
UnparsedFirstLineAddress,City,StateOrProvince,PostalCode,\
ListAgentName,ListAgentMobilePhone,BedsTotal,BathsTotal,OpenHouse";

/// Listings not yet closed are the only ones worth watching.
const ACTIVE_FILTER: &str = "StandardStatus ne 'Closed'";

/// Response envelope: `{"D": {"Success": ..., "Results": [...]}}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "D")]
    d: Body,
}

#[derive(Debug, Deserialize)]
struct Body {
    #[serde(rename = "Success", default)]
    success: bool,
    #[serde(rename = "Message")]
    message: Option<String>,
    #[serde(rename = "Results", default)]
    results: Vec<RawListing>,
}

/// One listing record as returned by the replication API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawListing {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "StandardFields")]
    pub standard_fields: StandardFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StandardFields {
    #[serde(rename = "ListingId")]
    pub listing_id: Option<String>,
    #[serde(rename = "StandardStatus")]
    pub standard_status: String,
    #[serde(rename = "ListPrice")]
    pub list_price: f64,
    #[serde(rename = "ModificationTimestamp")]
    pub modification_timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "UnparsedFirstLineAddress")]
    pub address: Option<String>,
    #[serde(rename = "City")]
    pub city: Option<String>,
    #[serde(rename = "StateOrProvince")]
    pub state: Option<String>,
    #[serde(rename = "PostalCode")]
    pub postal_code: Option<String>,
    #[serde(rename = "ListAgentName")]
    pub agent_name: Option<String>,
    #[serde(rename = "ListAgentMobilePhone")]
    pub agent_phone: Option<String>,
    #[serde(rename = "BedsTotal")]
    pub beds: Option<u32>,
    #[serde(rename = "BathsTotal")]
    pub baths: Option<f64>,
    #[serde(rename = "OpenHouse")]
    pub open_house: Option<RawOpenHouse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOpenHouse {
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "StartTime")]
    pub start_time: String,
    #[serde(rename = "EndTime")]
    pub end_time: String,
}

impl RawListing {
    /// The tracked-field snapshot for change comparison, keyed by the
    /// record's resource id.
    pub fn snapshot(&self) -> ListingSnapshot {
        let f = &self.standard_fields;
        ListingSnapshot {
            listing_id: self.id.clone(),
            status: f.standard_status.clone(),
            price: f.list_price.round() as i64,
            modified_at: f.modification_timestamp,
            open_house: f.open_house.as_ref().map(|oh| OpenHouse {
                date: oh.date.clone(),
                start_time: oh.start_time.clone(),
                end_time: oh.end_time.clone(),
            }),
        }
    }

    /// The human-facing fields for message templates.
    pub fn details(&self) -> ListingDetails {
        let f = &self.standard_fields;
        ListingDetails {
            listing_id: f.listing_id.clone().unwrap_or_else(|| self.id.clone()),
            address: f.address.clone().unwrap_or_else(|| "Address unavailable".to_string()),
            city: f.city.clone().unwrap_or_default(),
            state: f.state.clone().unwrap_or_default(),
            zip: f.postal_code.clone().unwrap_or_default(),
            price: f.list_price.round() as i64,
            agent_name: f.agent_name.clone().unwrap_or_else(|| "Unknown agent".to_string()),
            agent_phone: f.agent_phone.clone(),
            beds: f.beds,
            baths: f.baths,
        }
    }
}

/// Thin client over the Spark replication API.
pub struct SparkClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    page_size: usize,
}

impl SparkClient {
    pub fn new(base_url: &str, access_token: &str, page_size: usize) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            page_size,
        })
    }

    /// Fetch every non-closed listing, fully draining pagination before
    /// returning. The detector needs a complete set per cycle; a partial
    /// page would read as listings having vanished.
    pub async fn fetch_active_listings(&self) -> Result<Vec<RawListing>, FetchError> {
        let url = format!("{}/listings", self.base_url);
        let mut all = Vec::new();
        let mut skiptoken: Option<String> = None;

        loop {
            let top = self.page_size.to_string();
            let mut params: Vec<(&str, &str)> = vec![
                ("$top", top.as_str()),
                ("$orderby", "ModificationTimestamp desc"),
                ("$filter", ACTIVE_FILTER),
                ("$select", SELECT_FIELDS),
            ];
            if let Some(token) = skiptoken.as_deref() {
                params.push(("$skiptoken", token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&params)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Status { status, body });
            }

            let envelope: Envelope = response
                .json()
                .await
                .map_err(|e| FetchError::Malformed(e.to_string()))?;
            if !envelope.d.success {
                return Err(FetchError::Malformed(
                    envelope
                        .d
                        .message
                        .unwrap_or_else(|| "API reported failure".to_string()),
                ));
            }

            let page = envelope.d.results;
            let count = page.len();
            skiptoken = page.last().map(|listing| listing.id.clone());
            all.extend(page);

            if count < self.page_size {
                break;
            }
        }

        debug!("Fetched {} active listings", all.len());
        Ok(all)
    }
}

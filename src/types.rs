use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The subset of listing fields tracked for change comparison.
///
/// One snapshot per listing id; `modified_at` is monotonic per source
/// refresh (the API orders by `ModificationTimestamp desc`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: String,
    pub status: String,
    /// List price in whole dollars.
    pub price: i64,
    pub modified_at: DateTime<Utc>,
    pub open_house: Option<OpenHouse>,
}

/// Open-house schedule as delivered by the API. Compared structurally;
/// the date/time strings are opaque to the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenHouse {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

/// A detected change between two snapshots of the same listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ChangeEvent {
    StatusChanged { old: String, new: String },
    PriceChanged { old: i64, new: i64 },
    OpenHouseAdded { details: OpenHouse },
}

impl ChangeEvent {
    /// Short label used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::StatusChanged { .. } => "status_changed",
            ChangeEvent::PriceChanged { .. } => "price_changed",
            ChangeEvent::OpenHouseAdded { .. } => "open_house_added",
        }
    }
}

/// Human-facing listing fields consumed by the message templates.
///
/// Extracted from the same fetched record as the snapshot, so a cycle needs
/// no secondary per-listing detail request.
#[derive(Debug, Clone, Serialize)]
pub struct ListingDetails {
    pub listing_id: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    /// Current list price in whole dollars.
    pub price: i64,
    pub agent_name: String,
    pub agent_phone: Option<String>,
    pub beds: Option<u32>,
    pub baths: Option<f64>,
}

/// Outbound notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Slack,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Slack => write!(f, "slack"),
            Channel::Sms => write!(f, "sms"),
        }
    }
}

/// Per-channel delivery result for one dispatched event.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub channel: Channel,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One dispatched change event, emitted as a JSON line by the reporter.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub timestamp: String,
    pub listing_id: String,
    #[serde(flatten)]
    pub event: ChangeEvent,
    pub deliveries: Vec<DeliveryRecord>,
}

/// Summary of one completed poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub timestamp: String,
    /// Listings returned by the fetch (all pages).
    pub listings_fetched: usize,
    /// Listings seen for the first time this cycle (baselined, no events).
    pub new_listings: usize,
    /// Change events dispatched this cycle.
    pub events_dispatched: usize,
    /// Individual channel deliveries that failed.
    pub notify_failures: usize,
}

/// Polling status reported by `GET /polling-status`.
#[derive(Debug, Clone, Serialize)]
pub struct PollStatus {
    pub polling_enabled: bool,
    pub poll_interval_secs: u64,
    pub tracked_listings: usize,
    pub last_poll: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub events_dispatched: u64,
}

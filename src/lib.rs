pub mod api;
pub mod config;
pub mod detector;
pub mod error;
pub mod notify;
pub mod poller;
pub mod reporter;
pub mod store;
pub mod types;
pub mod web;

/// Spark MLS replication API base URL (v1, bearer-token auth)
pub const SPARK_API_BASE: &str = "https://replication.sparkapi.com/v1";

/// Twilio REST API base URL (basic auth, form-encoded bodies)
pub const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

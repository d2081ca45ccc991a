//! Probe: Spark replication listings endpoint
//!
//! Hits GET {SPARK_API_BASE}/listings and documents:
//! - Response envelope shape (D.Success / D.Results)
//! - Field selection ($select) behavior
//! - Pagination ($top / $skiptoken)
//! - Latency over multiple requests
//!
//! Requires SPARK_ACCESS_TOKEN in the environment (or .env).

use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::Value;
use spark_listing_monitor::SPARK_API_BASE;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let token = std::env::var("SPARK_ACCESS_TOKEN").context("SPARK_ACCESS_TOKEN not set")?;

    let client = reqwest::Client::new();
    let base_url = format!("{SPARK_API_BASE}/listings");

    println!("=== Probe: Spark listings ===");
    println!();

    // 1. Small fetch, default fields
    println!("--- 1. Fetch 3 listings (no $select) ---");
    let start = Instant::now();
    let resp = client
        .get(&base_url)
        .bearer_auth(&token)
        .query(&[("$top", "3")])
        .send()
        .await?;
    let latency = start.elapsed();
    let status = resp.status();
    let body: Value = resp.json().await?;
    println!("Status: {status}");
    println!("Latency: {latency:?}");

    println!("Envelope keys:");
    if let Some(obj) = body.as_object() {
        for key in obj.keys() {
            println!("  - {key}");
        }
    }
    let results = body.pointer("/D/Results").and_then(|v| v.as_array());
    match results {
        Some(arr) => {
            println!("Result count: {}", arr.len());
            if let Some(first) = arr.first() {
                println!("\nSample listing (first):");
                println!("{}", serde_json::to_string_pretty(first)?);
            }
        }
        None => {
            println!("No D.Results array:");
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    println!();

    // 2. Field selection
    println!("--- 2. $select=ListingId,StandardStatus,ListPrice,ModificationTimestamp ---");
    let resp = client
        .get(&base_url)
        .bearer_auth(&token)
        .query(&[
            ("$top", "2"),
            (
                "$select",
                "ListingId,StandardStatus,ListPrice,ModificationTimestamp",
            ),
        ])
        .send()
        .await?;
    let body: Value = resp.json().await?;
    if let Some(arr) = body.pointer("/D/Results").and_then(|v| v.as_array()) {
        for listing in arr {
            if let Some(fields) = listing.get("StandardFields").and_then(|v| v.as_object()) {
                let keys: Vec<&String> = fields.keys().collect();
                println!("  StandardFields keys: {keys:?}");
            }
        }
    }
    println!();

    // 3. Pagination via $skiptoken
    println!("--- 3. Pagination: $top=2, then $skiptoken=<last Id> ---");
    let resp = client
        .get(&base_url)
        .bearer_auth(&token)
        .query(&[("$top", "2"), ("$select", "ListingId")])
        .send()
        .await?;
    let body: Value = resp.json().await?;
    let last_id = body
        .pointer("/D/Results")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.last())
        .and_then(|listing| listing.get("Id"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    match last_id {
        Some(token_id) => {
            println!("  Last Id of page 1: {token_id}");
            let resp = client
                .get(&base_url)
                .bearer_auth(&token)
                .query(&[
                    ("$top", "2"),
                    ("$select", "ListingId"),
                    ("$skiptoken", token_id.as_str()),
                ])
                .send()
                .await?;
            let body: Value = resp.json().await?;
            let count = body
                .pointer("/D/Results")
                .and_then(|v| v.as_array())
                .map(|a| a.len())
                .unwrap_or(0);
            println!("  Page 2 returned {count} listings");
        }
        None => println!("  Page 1 empty, skipping continuation"),
    }
    println!();

    // 4. Latency over 5 requests
    println!("--- 4. Latency over 5 requests ($top=1) ---");
    let mut latencies = Vec::new();
    for i in 0..5 {
        let start = Instant::now();
        let _body = client
            .get(&base_url)
            .bearer_auth(&token)
            .query(&[("$top", "1"), ("$select", "ListingId")])
            .send()
            .await?
            .text()
            .await?;
        let latency = start.elapsed();
        println!("  Request {}: {latency:?}", i + 1);
        latencies.push(latency);
    }
    let avg = latencies.iter().sum::<std::time::Duration>() / latencies.len() as u32;
    println!("  Average: {avg:?}");
    println!();

    println!("=== Probe Complete ===");
    Ok(())
}

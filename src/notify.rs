use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::TWILIO_API_BASE;
use crate::config::{NotificationsConfig, SlackConfig, TwilioConfig};
use crate::error::NotifyError;
use crate::types::{Channel, ChangeEvent, DeliveryRecord, ListingDetails};

/// Per-request cap for notification deliveries.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(15);

/// Slack incoming-webhook channel: one Block Kit payload per event.
pub struct SlackChannel {
    http: reqwest::Client,
    webhook_url: String,
}

impl SlackChannel {
    pub fn new(http: reqwest::Client, config: &SlackConfig) -> Self {
        Self {
            http,
            webhook_url: config.webhook_url.clone(),
        }
    }

    pub async fn send(
        &self,
        event: &ChangeEvent,
        details: &ListingDetails,
    ) -> Result<(), NotifyError> {
        let payload = slack_payload(event, details);
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }
        debug!("Delivered {} to Slack", event.kind());
        Ok(())
    }
}

/// Twilio SMS channel: one templated text per event.
pub struct SmsChannel {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
    to_number: String,
}

impl SmsChannel {
    pub fn new(http: reqwest::Client, config: &TwilioConfig) -> Self {
        Self {
            http,
            api_base: TWILIO_API_BASE.to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            to_number: config.to_number.clone(),
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    pub async fn send(
        &self,
        event: &ChangeEvent,
        details: &ListingDetails,
    ) -> Result<(), NotifyError> {
        let body = sms_body(event, details);
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        );
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", self.to_number.as_str()),
                ("From", self.from_number.as_str()),
                ("Body", body.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }
        debug!("Delivered {} via SMS", event.kind());
        Ok(())
    }
}

/// Fans each change event out to every configured channel.
pub struct Dispatcher {
    slack: Option<SlackChannel>,
    sms: Option<SmsChannel>,
}

impl Dispatcher {
    pub fn from_config(config: &NotificationsConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build()?;
        Ok(Self {
            slack: config
                .slack
                .as_ref()
                .map(|c| SlackChannel::new(http.clone(), c)),
            sms: config
                .twilio
                .as_ref()
                .map(|c| SmsChannel::new(http.clone(), c)),
        })
    }

    pub fn channel_count(&self) -> usize {
        usize::from(self.slack.is_some()) + usize::from(self.sms.is_some())
    }

    /// Deliver one event on all channels, awaiting every send. A failure on
    /// one channel never suppresses the other; failures are logged and
    /// recorded, not retried.
    pub async fn dispatch(
        &self,
        listing_id: &str,
        event: &ChangeEvent,
        details: &ListingDetails,
    ) -> Vec<DeliveryRecord> {
        let slack_send = async {
            match &self.slack {
                Some(channel) => Some(channel.send(event, details).await),
                None => None,
            }
        };
        let sms_send = async {
            match &self.sms {
                Some(channel) => Some(channel.send(event, details).await),
                None => None,
            }
        };
        let (slack_result, sms_result) = tokio::join!(slack_send, sms_send);

        let mut records = Vec::new();
        for (channel, result) in [(Channel::Slack, slack_result), (Channel::Sms, sms_result)] {
            let Some(result) = result else { continue };
            match result {
                Ok(()) => records.push(DeliveryRecord {
                    channel,
                    ok: true,
                    error: None,
                }),
                Err(e) => {
                    warn!("[{listing_id}] {channel} delivery failed for {}: {e}", event.kind());
                    records.push(DeliveryRecord {
                        channel,
                        ok: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        records
    }
}

// ── message templates ──────────────────────────────────────────────

/// `1234567` → `"$1,234,567"`.
fn format_dollars(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

/// Signed delta, e.g. `+$25,000` / `-$25,000`.
fn format_delta(delta: i64) -> String {
    if delta >= 0 {
        format!("+{}", format_dollars(delta))
    } else {
        format!("-{}", format_dollars(-delta))
    }
}

fn percent_change(old: i64, new: i64) -> String {
    if old == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}", (new - old) as f64 / old as f64 * 100.0)
}

fn agent_field(details: &ListingDetails) -> String {
    format!(
        "{}\n{}",
        details.agent_name,
        details.agent_phone.as_deref().unwrap_or("No phone")
    )
}

fn property_field(details: &ListingDetails) -> String {
    format!(
        "{}\n{}, {} {}",
        details.address, details.city, details.state, details.zip
    )
}

fn slack_payload(event: &ChangeEvent, details: &ListingDetails) -> serde_json::Value {
    match event {
        ChangeEvent::StatusChanged { old, new } => json!({
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": "🏠 Listing Status Change Alert!" }
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Listing Agent:*\n{}", agent_field(details)) },
                        { "type": "mrkdwn", "text": format!("*Status Change:*\n{old} → {new}") }
                    ]
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Property:*\n{}", property_field(details)) },
                        { "type": "mrkdwn", "text": format!("*Price:* {}", format_dollars(details.price)) }
                    ]
                }
            ]
        }),
        ChangeEvent::PriceChanged { old, new } => {
            let direction = if new > old {
                "⬆️ Price Increase"
            } else {
                "⬇️ Price Reduction"
            };
            json!({
                "blocks": [
                    {
                        "type": "header",
                        "text": { "type": "plain_text", "text": format!("{direction} Alert!") }
                    },
                    {
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Listing Agent:*\n{}", agent_field(details)) },
                            {
                                "type": "mrkdwn",
                                "text": format!(
                                    "*Price Change:*\n{} → {}\n{}% ({})",
                                    format_dollars(*old),
                                    format_dollars(*new),
                                    percent_change(*old, *new),
                                    format_delta(new - old)
                                )
                            }
                        ]
                    },
                    {
                        "type": "section",
                        "fields": [
                            { "type": "mrkdwn", "text": format!("*Property:*\n{}", property_field(details)) }
                        ]
                    }
                ]
            })
        }
        ChangeEvent::OpenHouseAdded { details: open_house } => json!({
            "blocks": [
                {
                    "type": "header",
                    "text": { "type": "plain_text", "text": "📅 New Open House Alert!" }
                },
                {
                    "type": "section",
                    "fields": [
                        {
                            "type": "mrkdwn",
                            "text": format!(
                                "*Open House:*\n{}\n{} - {}",
                                open_house.date, open_house.start_time, open_house.end_time
                            )
                        },
                        { "type": "mrkdwn", "text": format!("*Listing Agent:*\n{}", agent_field(details)) }
                    ]
                },
                {
                    "type": "section",
                    "fields": [
                        { "type": "mrkdwn", "text": format!("*Property:*\n{}", property_field(details)) },
                        { "type": "mrkdwn", "text": format!("*Price:* {}", format_dollars(details.price)) }
                    ]
                }
            ]
        }),
    }
}

fn sms_body(event: &ChangeEvent, details: &ListingDetails) -> String {
    let agent_lines = format!(
        "Agent: {}\nPhone: {}",
        details.agent_name,
        details.agent_phone.as_deref().unwrap_or("N/A")
    );
    match event {
        ChangeEvent::StatusChanged { old, new } => format!(
            "🏠 STATUS CHANGE\n{}, {}\n{old} → {new}\n{}\n{agent_lines}",
            details.address,
            details.city,
            format_dollars(details.price),
        ),
        ChangeEvent::PriceChanged { old, new } => format!(
            "💰 PRICE UPDATE\n{}, {}\n{} → {}\n({}%, {})\n{agent_lines}",
            details.address,
            details.city,
            format_dollars(*old),
            format_dollars(*new),
            percent_change(*old, *new),
            format_delta(new - old),
        ),
        ChangeEvent::OpenHouseAdded { details: open_house } => {
            let size = match (details.beds, details.baths) {
                (Some(beds), Some(baths)) => format!(" | {beds}bd {baths}ba"),
                _ => String::new(),
            };
            format!(
                "📅 OPEN HOUSE\n{}, {}\n{}, {}-{}\n{}{size}\n{agent_lines}",
                details.address,
                details.city,
                open_house.date,
                open_house.start_time,
                open_house.end_time,
                format_dollars(details.price),
            )
        }
    }
}

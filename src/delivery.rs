use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Transport that hands a rendered report to one recipient.
///
/// Implementations report failure per call; the caller records each outcome
/// and keeps going with the remaining recipients.
pub trait ReportSender: Send + Sync {
    fn send(&self, recipient: &str, subject: &str, html: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "SENT",
            DeliveryStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SENT" => Some(DeliveryStatus::Sent),
            "FAILED" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// One recorded delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryRecord {
    pub id: i64,
    pub run_id: i64,
    pub recipient: String,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Outcome of delivering one run to a set of recipients.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub run_id: i64,
    pub sent: u32,
    pub failed: u32,
    pub records: Vec<DeliveryRecord>,
}

impl DeliveryReport {
    pub fn from_records(run_id: i64, records: Vec<DeliveryRecord>) -> Self {
        let sent = records
            .iter()
            .filter(|r| r.status == DeliveryStatus::Sent)
            .count() as u32;
        let failed = records.len() as u32 - sent;
        Self {
            run_id,
            sent,
            failed,
            records,
        }
    }
}

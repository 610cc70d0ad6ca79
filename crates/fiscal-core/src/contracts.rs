use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_CLIENT_NAME: &str = "Client";
pub const TRADE_NAME_FIELD: &str = "trade_name";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::Offline
    }
}

impl Connectivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connectivity::Online => "online",
            Connectivity::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FiscalDayPhase {
    Unknown,
    Open,
    CloseInitiated,
    Closed,
}

impl Default for FiscalDayPhase {
    fn default() -> Self {
        Self::Unknown
    }
}

impl FiscalDayPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FiscalDayPhase::Unknown => "UNKNOWN",
            FiscalDayPhase::Open => "OPEN",
            FiscalDayPhase::CloseInitiated => "CLOSE_INITIATED",
            FiscalDayPhase::Closed => "CLOSED",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FiscalDayPhase::Unknown => "UNKNOWN",
            FiscalDayPhase::Open => "OPEN",
            FiscalDayPhase::CloseInitiated => "CLOSE INITIATED",
            FiscalDayPhase::Closed => "CLOSED",
        }
    }

    /// Maps whatever the bridge reports into a phase. Unrecognized values land on
    /// `Unknown` rather than failing the whole status payload.
    pub fn from_reported(raw: &str) -> Self {
        raw.parse().unwrap_or(FiscalDayPhase::Unknown)
    }
}

impl fmt::Display for FiscalDayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FiscalDayPhase {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "UNKNOWN" => Ok(FiscalDayPhase::Unknown),
            "OPEN" | "OPENED" | "FISCALDAYOPENED" => Ok(FiscalDayPhase::Open),
            "CLOSE_INITIATED" | "FISCALDAYCLOSEINITIATED" => Ok(FiscalDayPhase::CloseInitiated),
            "CLOSED" | "FISCALDAYCLOSED" => Ok(FiscalDayPhase::Closed),
            other => Err(format!("Unknown fiscal day phase: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DayCommand {
    OpenDay,
    CloseDay,
    Sync,
}

impl DayCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            DayCommand::OpenDay => "open-day",
            DayCommand::CloseDay => "close-day",
            DayCommand::Sync => "sync",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            DayCommand::OpenDay => "/open-day",
            DayCommand::CloseDay => "/close-day",
            DayCommand::Sync => "/sync",
        }
    }

    /// Phase the console shows right after the bridge acknowledges the command.
    pub fn optimistic_phase(&self) -> Option<FiscalDayPhase> {
        match self {
            DayCommand::OpenDay => Some(FiscalDayPhase::Open),
            DayCommand::CloseDay => Some(FiscalDayPhase::CloseInitiated),
            DayCommand::Sync => None,
        }
    }
}

impl fmt::Display for DayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw `/status` body. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StatusPayload {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub online: Option<bool>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub fiscal_day_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub fiscal_day_open: Option<bool>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub watcher_running: Option<bool>,
}

impl StatusPayload {
    pub fn reported_phase(&self) -> FiscalDayPhase {
        if let Some(raw) = self.fiscal_day_status.as_deref() {
            return FiscalDayPhase::from_reported(raw);
        }
        match self.fiscal_day_open {
            Some(true) => FiscalDayPhase::Open,
            Some(false) => FiscalDayPhase::Closed,
            None => FiscalDayPhase::Unknown,
        }
    }

    pub fn into_report(self) -> StatusReport {
        StatusReport {
            upstream_online: self.online,
            phase: self.reported_phase(),
            watcher_running: self.watcher_running.unwrap_or(false),
        }
    }
}

/// Status after coercion into console types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub upstream_online: Option<bool>,
    pub phase: FiscalDayPhase,
    pub watcher_running: bool,
}

/// Body returned by `/open-day`, `/close-day` and `/sync`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CommandAck {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
}

impl CommandAck {
    pub fn accepted(message: Option<&str>) -> Self {
        Self {
            success: true,
            message: message.map(str::to_string),
        }
    }

    pub fn rejected(message: Option<&str>) -> Self {
        Self {
            success: false,
            message: message.map(str::to_string),
        }
    }

    pub fn server_message(&self) -> Option<&str> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|message| !message.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Signed,
    Sent,
    Excluded,
}

impl Default for Disposition {
    fn default() -> Self {
        Self::Signed
    }
}

impl Disposition {
    pub const ALL: [Disposition; 3] = [Disposition::Signed, Disposition::Sent, Disposition::Excluded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Signed => "signed",
            Disposition::Sent => "sent",
            Disposition::Excluded => "excluded",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Disposition::Signed => "Signed",
            Disposition::Sent => "Sent",
            Disposition::Excluded => "Excluded",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Disposition::Signed => Disposition::Sent,
            Disposition::Sent => Disposition::Excluded,
            Disposition::Excluded => Disposition::Signed,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_lowercase();
        match normalized.as_str() {
            "signed" => Ok(Disposition::Signed),
            "sent" => Ok(Disposition::Sent),
            "excluded" => Ok(Disposition::Excluded),
            other => Err(format!("Unknown disposition: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawReceipt {
    #[serde(default, deserialize_with = "lenient_text")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub date: Option<String>,
}

/// One element of the `/queue` array as the bridge sends it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawQueueItem {
    #[serde(default)]
    pub receipt: Option<RawReceipt>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub pdf_path: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueItem {
    pub sequence_index: usize,
    pub invoice_number: String,
    pub amount: f64,
    pub occurred_at: DateTime<Utc>,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

impl QueueItem {
    pub fn from_raw(sequence_index: usize, raw: RawQueueItem, polled_at: DateTime<Utc>) -> Self {
        let receipt = raw.receipt.unwrap_or_default();
        let invoice_number = receipt
            .invoice_number
            .unwrap_or_else(|| format!("INV-{}", sequence_index + 1));
        let amount = receipt
            .total
            .filter(|total| total.is_finite())
            .unwrap_or(0.0);
        let occurred_at = receipt
            .date
            .as_deref()
            .and_then(parse_occurred_at)
            .unwrap_or(polled_at);
        let disposition = raw
            .status
            .as_deref()
            .and_then(|status| status.parse().ok())
            .unwrap_or_default();
        Self {
            sequence_index,
            invoice_number,
            amount,
            occurred_at,
            disposition,
            pdf_path: raw.pdf_path,
        }
    }
}

/// Maps a `/queue` body into positional queue items. The top level must be an
/// array; individual items that fail to parse fall back to all-default fields.
pub fn map_queue(body: Value, polled_at: DateTime<Utc>) -> Result<Vec<QueueItem>, String> {
    let items = match body {
        Value::Array(items) => items,
        other => return Err(format!("expected queue array, found {}", value_kind(&other))),
    };
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let raw = serde_json::from_value::<RawQueueItem>(item).unwrap_or_default();
            QueueItem::from_raw(index, raw, polled_at)
        })
        .collect())
}

pub fn parse_occurred_at(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `/get-config` body. Field order follows key order for stable display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    fields: BTreeMap<String, Value>,
}

impl ConfigSnapshot {
    pub fn from_value(body: Value) -> Result<Self, String> {
        match body {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(format!("expected config object, found {}", value_kind(&other))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn trade_name(&self) -> Option<&str> {
        self.fields
            .get(TRADE_NAME_FIELD)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Accepts strings and numbers; empty strings and anything else become `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    Ok(match val {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_bool(deserializer)?.unwrap_or(false))
}

//! Statement record types: page ranges, raw provider payloads and the typed
//! transactions they are folded into.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::coerce::{coerce_amount, collapse_whitespace};

/// A contiguous, 1-based, inclusive range of pages handled by one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
    /// Position of this range in the partition; results are stored by it.
    pub index: usize,
}

impl PageRange {
    pub fn new(start: usize, end: usize, index: usize) -> Self {
        Self { start, end, index }
    }

    /// Number of pages covered by this range.
    pub fn page_count(&self) -> usize {
        self.end + 1 - self.start
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pages {}-{}", self.start, self.end)
    }
}

/// One unit of extraction work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionJob {
    pub range: PageRange,
    /// Only the job covering page 1 is asked for account header metadata.
    pub is_first: bool,
}

impl ExtractionJob {
    pub fn new(range: PageRange) -> Self {
        Self {
            range,
            is_first: range.start == 1,
        }
    }
}

/// A loosely typed JSON scalar as returned by the generative service.
///
/// Models are not consistent about quoting numbers, so every field that we
/// coerce later is decoded through this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Scalar {
    /// Render the value as text. Integral numbers lose their fractional part so
    /// that account numbers such as `2034567890` survive intact.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Scalar::Number(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Flag(b) => *b,
            Scalar::Number(n) => *n != 0.0,
            Scalar::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// A transaction-like record exactly as the provider emitted it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub date: Option<Scalar>,
    #[serde(default)]
    pub description: Option<Scalar>,
    #[serde(default)]
    pub amount: Option<Scalar>,
    #[serde(default)]
    pub balance: Option<Scalar>,
}

impl RawTransaction {
    /// Convert into a typed credit, or `None` when the record has no usable
    /// date or amount.
    pub fn normalize(&self) -> Option<Transaction> {
        let date = self.date.as_ref()?.to_text().trim().to_string();
        if date.is_empty() {
            return None;
        }

        let amount = coerce_amount(self.amount.as_ref()?)?;
        if amount == 0.0 {
            return None;
        }

        let description = self
            .description
            .as_ref()
            .map(|d| collapse_whitespace(&d.to_text()))
            .unwrap_or_default();

        Some(Transaction {
            date,
            description,
            amount,
            balance: self.balance.as_ref().and_then(coerce_amount),
            kind: TransactionType::Credit,
        })
    }
}

/// Payload returned for one extraction job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChunkResult {
    #[serde(default, deserialize_with = "truthy_flag")]
    pub is_not_bank_statement: bool,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub account_name: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub account_number: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient_scalar")]
    pub bank_name: Option<Scalar>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub transactions: Vec<RawTransaction>,
}

fn truthy_flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(lenient_scalar(d)?.is_some_and(|v| v.is_truthy()))
}

// Header values that are not scalars (objects, arrays) are treated as absent.
fn lenient_scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Scalar>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(serde_json::from_value::<Scalar>(value).ok())
}

// A `transactions` value that is not an array counts as no records; records
// that are not objects of scalars are dropped rather than failing the chunk.
fn lenient_records<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<RawTransaction>, D::Error> {
    let serde_json::Value::Array(values) = serde_json::Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(values
        .into_iter()
        .filter_map(|v| serde_json::from_value::<RawTransaction>(v).ok())
        .collect())
}

/// Direction of a retained transaction. Only credits are ever kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "credit")]
    Credit,
}

/// A credit (inflow) row from a bank statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Date as printed, usually DD/MM/YYYY
    pub date: String,
    pub description: String,
    pub amount: f64,
    /// Running balance after the row; `None` when the column was absent or unreadable
    pub balance: Option<f64>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
}

impl Transaction {
    pub fn credit(
        date: impl Into<String>,
        description: impl Into<String>,
        amount: f64,
        balance: Option<f64>,
    ) -> Self {
        Self {
            date: date.into(),
            description: description.into(),
            amount,
            balance,
            kind: TransactionType::Credit,
        }
    }
}

/// Final, merged view of a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub account_name: String,
    pub account_number: String,
    pub bank_name: String,
    pub start_date: String,
    pub end_date: String,
    pub transactions: Vec<Transaction>,
    pub total_credits: f64,
}

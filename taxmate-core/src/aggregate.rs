//! Folding per-chunk extraction payloads into one statement result.
//!
//! Rules, applied in chunk-index order:
//! - any chunk flagging `isNotBankStatement` fails the whole run
//! - header fields come from the first chunk with a real value
//! - transactions are concatenated, cleaned, then deduplicated on
//!   `(date, description, amount, balance)` since adjacent page ranges can
//!   repeat rows near the seam
//! - the result is sorted by parsed date and summarised

use std::collections::HashSet;
use thiserror::Error;

use crate::dates::parse_statement_date;
use crate::statement::{AggregateResult, RawChunkResult, Scalar, Transaction};

const PLACEHOLDER: &str = "...";
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("The document you uploaded does not appear to be a valid bank statement.")]
    NotABankStatement,
}

/// Merge chunk results into a single [`AggregateResult`].
///
/// The not-a-statement check runs only once every chunk is in hand, because
/// the signal may come from any page.
pub fn aggregate(chunks: &[RawChunkResult]) -> Result<AggregateResult, AggregateError> {
    if chunks.iter().any(|c| c.is_not_bank_statement) {
        return Err(AggregateError::NotABankStatement);
    }

    let mut out = AggregateResult::default();
    let mut transactions = Vec::new();

    for chunk in chunks {
        merge_header(&mut out.account_name, chunk.account_name.as_ref());
        merge_header(&mut out.account_number, chunk.account_number.as_ref());
        merge_header(&mut out.bank_name, chunk.bank_name.as_ref());

        transactions.extend(chunk.transactions.iter().filter_map(|t| t.normalize()));
    }

    out.transactions = dedupe(transactions);
    summarize(&mut out);
    Ok(out)
}

// "N/A" is accepted as a value but yields to any later real one.
fn merge_header(current: &mut String, candidate: Option<&Scalar>) {
    let Some(candidate) = candidate else { return };
    let value = candidate.to_text();
    let value = value.trim();
    if value.is_empty() || value == PLACEHOLDER {
        return;
    }
    if current.is_empty() || current == NOT_AVAILABLE {
        *current = value.to_string();
    }
}

type DedupeKey = (String, String, u64, Option<u64>);

fn dedupe_key(t: &Transaction) -> DedupeKey {
    (
        t.date.clone(),
        t.description.clone(),
        t.amount.to_bits(),
        t.balance.map(f64::to_bits),
    )
}

/// Drop repeated rows, keeping the first occurrence. Idempotent.
pub fn dedupe(transactions: Vec<Transaction>) -> Vec<Transaction> {
    let mut seen: HashSet<DedupeKey> = HashSet::with_capacity(transactions.len());
    transactions
        .into_iter()
        .filter(|t| seen.insert(dedupe_key(t)))
        .collect()
}

/// Sort ascending by parsed date and fill in the date range and total.
fn summarize(result: &mut AggregateResult) {
    result
        .transactions
        .sort_by_key(|t| parse_statement_date(&t.date));

    if let (Some(first), Some(last)) = (result.transactions.first(), result.transactions.last()) {
        result.start_date = first.date.clone();
        result.end_date = last.date.clone();
    }
    result.total_credits = result.transactions.iter().map(|t| t.amount).sum();
}

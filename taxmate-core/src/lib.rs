//! taxmate-core: statement data model, value coercion and result aggregation.

pub mod aggregate;
pub mod coerce;
pub mod dates;
pub mod events;
pub mod statement;

pub use aggregate::{aggregate, dedupe, AggregateError};
pub use coerce::{coerce_amount, collapse_whitespace, parse_amount_text};
pub use dates::{parse_statement_date, try_parse_statement_date};
pub use events::{PipelineEvent, TerminalEvent};
pub use statement::{
    AggregateResult, ExtractionJob, PageRange, RawChunkResult, RawTransaction, Scalar,
    Transaction, TransactionType,
};

//! conciliar-finance: statement merging, counterparty suggestions, category
//! mapping and the financial summary.

pub mod categories;
pub mod identify;
pub mod matcher;
pub mod merger;
pub mod summary;

pub use categories::{CategoryMapper, CategorySession, LabelRemoval};
pub use identify::{AutoIdentifyReport, Identifier};
pub use matcher::{
    Confidence, NarrationMatcher, PrefixMatcher, Suggestion, TokenSetMatcher, confidence_of, lookup_keys, suggest,
    suggest_with,
};
pub use merger::{MergeOutput, Merger, PublishReport, StatementFile, publish_records, render_merged};
pub use summary::{CategorySummary, FinancialSummary, summarize, write_csv};

//! conciliar-ingest: bank statement text parsing, identity hints and statement naming.

pub mod identity;
pub mod naming;
pub mod parsers;
pub mod types;

pub use identity::IdentityExtractor;
pub use naming::{file_name_date, statement_file_name, strip_excluded_lines};
pub use parsers::{StatementParser, detect_layout, parse_statement_text};
pub use types::{AmountColumn, IdentityHint, Layout, ParserOptions};

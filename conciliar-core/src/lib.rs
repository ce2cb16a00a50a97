//! conciliar-core: data model, money parsing, fingerprinting and store contracts
//! shared by the statement reconciliation crates.

pub mod category;
pub mod counterparty;
pub mod error;
pub mod fingerprint;
pub mod history;
pub mod memory;
pub mod money;
pub mod record;
pub mod store;

pub use category::{CategoryMetadata, UNCATEGORIZED};
pub use counterparty::{Associate, CounterpartyEntity, CounterpartyKind, OtherParty, Registry, Student};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, normalize_field};
pub use history::IdentificationHistoryEntry;
pub use memory::{MemoryBlobStore, MemoryRecordStore};
pub use money::{format_br_amount, parse_amount_with_direction, parse_br_amount};
pub use record::{Direction, Identification, StoredRecord, TaxIdKind, TransactionRecord, digits_only};
pub use store::{BlobEntry, BlobStore, Filter, MERGED_STATEMENT, METADATA_DOCUMENT, OrderBy, RecordStore, Row};

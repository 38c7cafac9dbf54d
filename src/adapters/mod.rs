// Adapters layer: concrete implementations for external systems (reference store, run ledger, csv framing).

pub mod csv_rows;
pub mod memory_ledger;
pub mod memory_store;
pub mod reference_import;

pub use memory_ledger::{InMemoryRunLedger, LedgerSnapshot};
pub use memory_store::InMemoryReferenceStore;

//! Chapter sync records: reads, new-chapter inserts, local edits, and reconciliation.

mod read;
mod write;

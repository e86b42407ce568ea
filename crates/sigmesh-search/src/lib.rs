//! # sigmesh-search
//!
//! Per-tenant signal index backed by Postgres + pgvector. One table per
//! tenant (`{prefix}_{tenant}`) holding one document per enriched
//! activity, with an HNSW index over the quantized embedding column.
//!
//! [`SignalIndexer`] is the write path: it gates on full enrichment,
//! converts activities to documents, and writes one document per
//! activity; write errors surface to the caller so transient ones can be
//! routed to the enrichment retry path.

pub mod index;
pub mod indexer;
pub mod tenant;

pub use index::PgSignalIndex;
pub use indexer::SignalIndexer;
pub use tenant::index_name;

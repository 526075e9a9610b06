//! Storage Layer
//!
//! SQLite persistence for decoded frames. [`FrameStore`] owns the single
//! writer connection used by the batch writer; [`QueryService`] reads and
//! prunes stored rows through its own pool.

mod error;
mod query;
mod schema;
mod store;

pub use error::{QueryError, StorageError};
pub use query::{
    Condition, DeleteRequest, Fields, Pagination, QueryRequest, QueryResponse, QueryService,
    QueryStatus, RowFilter, SortSpec, TimeRange,
};
pub use schema::{TableSchema, TABLES};
pub use store::{FrameStore, FrameTransaction, StoreOptions};

pub mod event;
pub mod matcher;
pub mod memory_store;
pub mod notify;
pub mod query;
pub mod registry;
pub mod report;
pub mod store;

#[cfg(feature = "sqlite")]
pub mod sqlite_store;

pub use event::*;
pub use matcher::*;
pub use memory_store::*;
pub use notify::*;
pub use query::*;
pub use registry::*;
pub use report::*;
pub use store::*;

#[cfg(feature = "sqlite")]
pub use sqlite_store::SqliteReportStore;

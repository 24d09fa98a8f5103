// File: src/lib.rs
pub mod config;
pub mod error;
pub mod list;
pub mod logging;
pub mod model;
pub mod remote;
pub mod session;

pub use error::{SyncError, WriteOp};
pub use list::{LiveList, RollbackToken};
pub use model::{ChangeEvent, Filter, Item, ItemId, StreamEvent};
pub use remote::{ChangeStream, FileCollection, MemoryCollection, RemoteCollection};
pub use session::{Session, SessionContext, SessionEvent, SessionHandle, Snapshot};

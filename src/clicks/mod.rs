mod memory;
mod model;
mod remote;
mod state;
mod store;

pub use memory::InMemoryClickRemote;
pub use model::{ClickKey, ClickRecord, RejectedRow, RemoteClickRow};
pub use remote::ClickRemote;
pub use state::{ReloadState, ReloadStatus};
pub use store::{ClickStateStore, ClickStoreConfig, ClickStoreSnapshot, LoadOutcome, LoadSummary};

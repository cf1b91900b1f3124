pub mod click;

pub use click::{ClickStatistics, StoredClick};

pub mod carry_forward;
pub mod config;
pub mod error;
pub mod json_bridge;
pub mod lifecycle;
pub mod schema;
pub mod store;

pub use carry_forward::CarryReport;
pub use config::{BlockStore, Config, DATA_DIR_ENV, resolve_data_dir, validate_workspace_id};
pub use error::{Result, StoreError};
pub use lifecycle::{DeleteReport, DestroyReport, NewBlock, Placement};
pub use store::Store;

pub mod backend;
pub mod queries;
pub mod schema;
pub mod source_impl;

pub use backend::DuckDbBackend;
pub use queries::rollups::RollupRecord;

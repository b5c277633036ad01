pub mod cache;
pub mod compactor;
pub mod console;
pub mod engine;
pub mod import;
pub mod limits;
pub mod model;
pub mod observability;
pub mod settings;
pub mod store;
pub mod tables;
pub mod wal;

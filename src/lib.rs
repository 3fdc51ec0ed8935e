#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod consts;
pub mod errors;
pub mod lock;
pub mod metrics;

// Blob storage backend (append-only data/history logs + in-memory index)
pub mod blob; // src/blob/{mod,disk,log,index,scan,write,read,backend}.rs

// Cross-replica recovery engine (merge/dc coordinators, worker pool, monitor)
pub mod recovery; // src/recovery/{mod,record,route,client,scratch,diff,...}.rs

// Утилиты (now_ts, time-spec parsing, id hex helpers)
pub mod util; // src/util/mod.rs

// Удобные реэкспорты
pub use blob::backend::BlobBackend;
pub use blob::{composite_key, Id, IdRange, Kind};
pub use config::BlobConfig;
pub use errors::{BlobError, BlobResult};

//! Ingestion pipeline: request validation, the background store worker and
//! the actor that schedules it.

pub mod duplication;
pub mod files;
pub mod path_rules;
pub mod storable_service;
pub mod store_actor;
pub mod store_worker;

pub use path_rules::StorageLayout;
pub use storable_service::StorableService;
pub use store_actor::{StoreHandle, StoreQueue};
pub use store_worker::StoreWorker;

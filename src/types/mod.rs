pub mod storable;

pub use storable::{
    CadType, Page, StorableKind, StorableObjectDataUpdateRequest, StorableObjectRequest,
    StorageStatus, StoreTask,
};

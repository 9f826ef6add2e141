pub mod models;
pub mod repository;
pub mod store;

pub use models::{
    is_reserved_account, Account, Channel, Message, DELETED_ID, EVERYONE_ID, EVERYONE_LABEL,
    GLOBAL_CHANNEL_ID,
};
pub use repository::{Document, Filter, Repository};
pub use store::{DocumentRepository, DocumentStore};

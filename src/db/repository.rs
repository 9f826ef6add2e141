use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppResult;

/// An entity stored as a document in the shared container.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Discriminator written to the document's `type` field; scopes every
    /// query to one logical collection.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
}

/// Predicate over stored entities, for filtered queries and bulk deletes.
pub type Filter<'f, T> = dyn for<'a> Fn(&'a T) -> bool + Send + Sync + 'f;

#[async_trait]
pub trait Repository<T: Document>: Send + Sync {
    /// Fails with `AlreadyExists` when the id is taken.
    async fn create_new(&self, entity: T) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<T>>;

    async fn get_all(&self) -> AppResult<Vec<T>>;

    async fn query(&self, filter: &Filter<'_, T>) -> AppResult<Vec<T>>;

    /// Fails with `NotFound` when there is nothing to replace.
    async fn replace(&self, id: Uuid, entity: T) -> AppResult<()>;

    /// Returns whether a document was removed.
    async fn delete_item(&self, id: Uuid) -> AppResult<bool>;

    /// Returns the number of removed documents.
    async fn delete_where(&self, filter: &Filter<'_, T>) -> AppResult<usize>;
}

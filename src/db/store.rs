use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::repository::{Document, Filter, Repository};
use crate::error::{AppError, AppResult};

const TYPE_FIELD: &str = "type";

type Container = Arc<RwLock<HashMap<Uuid, Value>>>;

/// In-process document container shared by all entity kinds. Documents are
/// JSON objects keyed by id and tagged with their kind.
#[derive(Clone, Default)]
pub struct DocumentStore {
    documents: Container,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repository<T: Document>(&self) -> DocumentRepository<T> {
        DocumentRepository {
            documents: self.documents.clone(),
            _kind: PhantomData,
        }
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

/// Typed view over the documents of one kind.
pub struct DocumentRepository<T> {
    documents: Container,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Document> DocumentRepository<T> {
    fn to_document(entity: &T) -> AppResult<Value> {
        let mut value = serde_json::to_value(entity)?;
        match value.as_object_mut() {
            Some(object) => {
                object.insert(TYPE_FIELD.to_string(), Value::String(T::KIND.to_string()));
                Ok(value)
            }
            None => Err(AppError::Storage(format!(
                "{} does not serialize to a JSON object",
                T::KIND
            ))),
        }
    }

    fn is_own_kind(document: &Value) -> bool {
        document.get(TYPE_FIELD).and_then(Value::as_str) == Some(T::KIND)
    }

    fn from_document(document: &Value) -> AppResult<T> {
        Ok(serde_json::from_value(document.clone())?)
    }

    fn matching(
        documents: &HashMap<Uuid, Value>,
        filter: &Filter<'_, T>,
    ) -> AppResult<Vec<T>> {
        let mut entities = Vec::new();
        for document in documents.values().filter(|d| Self::is_own_kind(d)) {
            let entity = Self::from_document(document)?;
            if filter(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

#[async_trait]
impl<T: Document> Repository<T> for DocumentRepository<T> {
    async fn create_new(&self, entity: T) -> AppResult<()> {
        let document = Self::to_document(&entity)?;
        let mut documents = self.documents.write().await;

        if documents.contains_key(&entity.id()) {
            return Err(AppError::AlreadyExists(format!(
                "{} with id {}",
                T::KIND,
                entity.id()
            )));
        }

        documents.insert(entity.id(), document);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<T>> {
        let documents = self.documents.read().await;
        match documents.get(&id) {
            Some(document) if Self::is_own_kind(document) => Ok(Some(Self::from_document(document)?)),
            _ => Ok(None),
        }
    }

    async fn get_all(&self) -> AppResult<Vec<T>> {
        self.query(&|_: &T| true).await
    }

    async fn query(&self, filter: &Filter<'_, T>) -> AppResult<Vec<T>> {
        let documents = self.documents.read().await;
        Self::matching(&documents, filter)
    }

    async fn replace(&self, id: Uuid, entity: T) -> AppResult<()> {
        if entity.id() != id {
            return Err(AppError::InvalidOperation(format!(
                "Cannot replace {} {} with a document whose id is {}",
                T::KIND,
                id,
                entity.id()
            )));
        }

        let document = Self::to_document(&entity)?;
        let mut documents = self.documents.write().await;

        match documents.get_mut(&id) {
            Some(existing) if Self::is_own_kind(existing) => {
                *existing = document;
                Ok(())
            }
            _ => Err(AppError::not_found(T::KIND, id)),
        }
    }

    async fn delete_item(&self, id: Uuid) -> AppResult<bool> {
        let mut documents = self.documents.write().await;
        if documents.get(&id).is_some_and(Self::is_own_kind) {
            documents.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn delete_where(&self, filter: &Filter<'_, T>) -> AppResult<usize> {
        let mut documents = self.documents.write().await;
        let doomed: Vec<Uuid> = Self::matching(&documents, filter)?
            .iter()
            .map(|entity| entity.id())
            .collect();

        for id in &doomed {
            documents.remove(id);
        }
        Ok(doomed.len())
    }
}

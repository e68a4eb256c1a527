use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::entity::{CursorEntity, DocumentMetaEntity};
use crate::executor::Executor;
use crate::protocol::{DriverError, DriverResult, Request, Verb};

/// Handle on one tenant/fabric pair. Thin parameter builders over the
/// executor; all recovery behavior lives below this layer.
pub struct Fabric {
    executor: Arc<Executor>,
    tenant: String,
    name: String,
}

impl Fabric {
    pub(crate) fn new(executor: Arc<Executor>, tenant: String, name: String) -> Self {
        Self {
            executor,
            tenant,
            name,
        }
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn request(&self, verb: Verb, path: String) -> Request {
        Request::new(self.tenant.clone(), self.name.clone(), verb, path)
    }

    pub async fn create_document<T: Serialize>(
        &self,
        collection: &str,
        document: &T,
    ) -> DriverResult<DocumentMetaEntity> {
        let body = self.executor.serialization().serialize(document)?;
        let request = self
            .request(Verb::Post, format!("/_api/document/{}", collection))
            .body(body);
        self.executor
            .execute_internal(request)
            .await?
            .ok_or_else(|| DriverError::Protocol("document create returned no body".to_string()))
    }

    /// Fetches a document. An absent document is `Ok(None)`.
    pub async fn document<T: DeserializeOwned>(
        &self,
        collection: &str,
        key: &str,
    ) -> DriverResult<Option<T>> {
        let request = self.request(Verb::Get, format!("/_api/document/{}/{}", collection, key));
        self.executor.execute(request).await
    }

    pub async fn replace_document<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        document: &T,
    ) -> DriverResult<DocumentMetaEntity> {
        let body = self.executor.serialization().serialize(document)?;
        let request = self
            .request(Verb::Put, format!("/_api/document/{}/{}", collection, key))
            .body(body);
        self.executor
            .execute_internal(request)
            .await?
            .ok_or_else(|| DriverError::Protocol("document replace returned no body".to_string()))
    }

    /// Partial update; only the supplied fields change.
    pub async fn update_document<T: Serialize>(
        &self,
        collection: &str,
        key: &str,
        document: &T,
    ) -> DriverResult<DocumentMetaEntity> {
        let body = self.executor.serialization().serialize(document)?;
        let request = self
            .request(Verb::Patch, format!("/_api/document/{}/{}", collection, key))
            .body(body);
        self.executor
            .execute_internal(request)
            .await?
            .ok_or_else(|| DriverError::Protocol("document update returned no body".to_string()))
    }

    /// Deletes a document. Deleting an absent document is `Ok(None)`.
    pub async fn delete_document(
        &self,
        collection: &str,
        key: &str,
    ) -> DriverResult<Option<DocumentMetaEntity>> {
        let request = self.request(
            Verb::Delete,
            format!("/_api/document/{}/{}", collection, key),
        );
        self.executor.execute_internal(request).await
    }

    /// Ships a query with its bind parameters and decodes the result batch
    /// into the caller's type.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        bind_vars: Option<HashMap<String, Value>>,
    ) -> DriverResult<Vec<T>> {
        #[derive(Serialize)]
        struct CursorBody<'a> {
            query: &'a str,
            #[serde(rename = "bindVars", skip_serializing_if = "Option::is_none")]
            bind_vars: Option<HashMap<String, Value>>,
        }

        let body = self
            .executor
            .serialization()
            .serialize(&CursorBody { query, bind_vars })?;
        let request = self.request(Verb::Post, "/_api/cursor".to_string()).body(body);
        let cursor: CursorEntity = self
            .executor
            .execute_internal(request)
            .await?
            .ok_or_else(|| DriverError::Protocol("cursor returned no body".to_string()))?;
        cursor
            .result
            .into_iter()
            .map(|value| self.executor.serialization().custom_from_value(value))
            .collect()
    }
}

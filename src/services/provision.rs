//! Collection provisioning, run once per process start.

use tracing::{info, warn};

use super::vector_store::VectorStore;
use crate::error::PipelineError;
use crate::utils::{RetryConfig, with_retry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    AlreadyExisted,
    Created,
}

/// Make sure the target collection exists.
///
/// Safe to run on every startup. The existence check is retried on
/// transient errors; any final failure is fatal for the pipeline.
pub async fn ensure_collection(
    store: &dyn VectorStore,
    retry: &RetryConfig,
) -> Result<Provisioned, PipelineError> {
    let exists = check_exists(store, retry).await?;
    if exists {
        info!(collection = store.collection(), "collection already exists");
        return Ok(Provisioned::AlreadyExisted);
    }

    match store.create_collection().await {
        Ok(()) => {
            info!(collection = store.collection(), "created collection");
            Ok(Provisioned::Created)
        }
        Err(create_error) => {
            // Another process may have created it between check and create.
            if check_exists(store, retry).await? {
                warn!(
                    collection = store.collection(),
                    error = %create_error,
                    "collection appeared concurrently"
                );
                Ok(Provisioned::AlreadyExisted)
            } else {
                Err(PipelineError::Provisioning(create_error))
            }
        }
    }
}

async fn check_exists(store: &dyn VectorStore, retry: &RetryConfig) -> Result<bool, PipelineError> {
    with_retry(retry, || store.collection_exists())
        .await
        .into_result()
        .map_err(PipelineError::Provisioning)
}

//! Qdrant vector store backend implementation.

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, Query, QueryPointsBuilder,
    Sample, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};

use super::VectorStore;
use crate::error::VectorStoreError;
use crate::models::{
    CandidateRecord, ScoredRecord, StoredPoint, VectorStoreConfig, record_from_payload,
};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: u64,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig, dimension: u64) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension,
        })
    }

    pub fn dimension(&self) -> u64 {
        self.dimension
    }
}

fn to_point_struct(point: StoredPoint) -> PointStruct {
    PointStruct::new(point.id, point.vector, point.payload)
}

fn is_not_found(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("not found") || msg.contains("doesn't exist")
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<(), VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        Ok(())
    }

    async fn point_count(&self) -> Result<Option<u64>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => Ok(Some(
                info.result.map_or(0, |r| r.points_count.unwrap_or(0)),
            )),
            Err(e) => {
                let msg = e.to_string();
                if is_not_found(&msg) {
                    Ok(None)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }

    async fn upsert_points(&self, points: Vec<StoredPoint>) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = points.into_iter().map(to_point_struct).collect();
        let upsert = UpsertPointsBuilder::new(&self.collection, points).wait(true);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        query_vector: Vec<f32>,
        limit: u64,
        min_score: Option<f32>,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, limit).with_payload(true);

        if let Some(score) = min_score {
            search_builder = search_builder.score_threshold(score);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(results
            .result
            .into_iter()
            .map(|point| ScoredRecord {
                record: record_from_payload(&point.payload),
                score: point.score,
            })
            .collect())
    }

    async fn find_by_record_id(
        &self,
        record_id: &str,
    ) -> Result<Option<CandidateRecord>, VectorStoreError> {
        let scroll = ScrollPointsBuilder::new(&self.collection)
            .filter(Filter::must([Condition::matches("id", record_id.to_string())]))
            .limit(1)
            .with_payload(true)
            .with_vectors(false);

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(response
            .result
            .first()
            .map(|point| record_from_payload(&point.payload)))
    }

    async fn sample(&self, limit: u64) -> Result<Vec<CandidateRecord>, VectorStoreError> {
        let query = QueryPointsBuilder::new(&self.collection)
            .query(Query::new_sample(Sample::Random))
            .limit(limit)
            .with_payload(true);

        let response = self
            .client
            .query(query)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(response
            .result
            .iter()
            .map(|point| record_from_payload(&point.payload))
            .collect())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_backend_from_config() {
        let config = VectorStoreConfig::default();
        let backend = QdrantBackend::new(&config, 768).unwrap();
        assert_eq!(backend.collection(), "papers");
        assert_eq!(backend.dimension(), 768);
    }

    #[test]
    fn test_point_struct_carries_payload() {
        let record = CandidateRecord::new("2401.00001", "quantum computing advances");
        let point = StoredPoint::from_record(&record, vec![0.5; 3]);

        let point_struct = to_point_struct(point);
        assert!(point_struct.id.is_some());
        assert!(point_struct.vectors.is_some());
        assert!(point_struct.payload.contains_key("summary"));
        assert!(point_struct.payload.contains_key("primaryCategory"));
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Collection `papers` doesn't exist!"));
        assert!(is_not_found("status: NotFound, message: Not found"));
        assert!(!is_not_found("connection refused"));
    }
}

// src/vector/mod.rs

//! Qdrant-backed vector index.
//!
//! Two logical collections:
//! - `sessions`: legacy single dense vector, cosine distance.
//! - `sessions_hybrid`: named vectors (`dense` cosine + `sparse` BM25);
//!   sessions and document chunks share it, split by `payload.type`.
//!
//! INVARIANT: every payload carries `tenant_id`. Writes without one are
//! rejected at this boundary, not defaulted.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
    Distance, FieldType, Filter, PointId, PointStruct, ScrollPointsBuilder, SearchPointsBuilder,
    SparseIndices, SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder, Vectors, VectorsConfigBuilder, value::Kind,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::embeddings::sparse::SparseVector;
use crate::error::{HivemindError, Result};

pub const LEGACY_COLLECTION: &str = "sessions";
pub const HYBRID_COLLECTION: &str = "sessions_hybrid";
pub const DENSE_VECTOR: &str = "dense";
pub const SPARSE_VECTOR: &str = "sparse";

/// A point returned by search or scroll.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: serde_json::Value,
}

impl SearchHit {
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn payload_i64(&self, key: &str) -> Option<i64> {
        self.payload.get(key).and_then(|v| v.as_i64())
    }

    pub fn message_ids(&self) -> Vec<i64> {
        self.payload
            .get("message_ids")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_i64()).collect())
            .unwrap_or_default()
    }
}

pub struct VectorIndex {
    client: Qdrant,
    dense_dim: u64,
}

impl VectorIndex {
    pub async fn connect(url: &str, api_key: Option<&str>, dense_dim: usize) -> Result<Self> {
        let mut builder = Qdrant::from_url(url).skip_compatibility_check();
        if let Some(key) = api_key {
            builder = builder.api_key(key.to_string());
        }
        let client = builder
            .build()
            .map_err(|e| HivemindError::upstream("vector_index", e))?;

        let index = Self {
            client,
            dense_dim: dense_dim as u64,
        };
        index.ensure_collections().await?;
        Ok(index)
    }

    async fn ensure_collections(&self) -> Result<()> {
        self.ensure_legacy().await?;
        self.ensure_hybrid().await?;
        Ok(())
    }

    async fn ensure_legacy(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(LEGACY_COLLECTION)
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        if exists {
            return Ok(());
        }

        info!("Creating vector collection: {}", LEGACY_COLLECTION);
        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(LEGACY_COLLECTION)
                    .vectors_config(VectorParamsBuilder::new(self.dense_dim, Distance::Cosine)),
            )
            .await;
        self.tolerate_already_exists(result, LEGACY_COLLECTION)?;
        self.create_payload_indexes(LEGACY_COLLECTION).await;
        Ok(())
    }

    async fn ensure_hybrid(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(HYBRID_COLLECTION)
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        if exists {
            return Ok(());
        }

        info!("Creating vector collection: {}", HYBRID_COLLECTION);
        let mut dense_config = VectorsConfigBuilder::default();
        dense_config.add_named_vector_params(
            DENSE_VECTOR,
            VectorParamsBuilder::new(self.dense_dim, Distance::Cosine),
        );
        let mut sparse_config = SparseVectorsConfigBuilder::default();
        sparse_config.add_named_vector_params(SPARSE_VECTOR, SparseVectorParamsBuilder::default());

        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(HYBRID_COLLECTION)
                    .vectors_config(dense_config)
                    .sparse_vectors_config(sparse_config),
            )
            .await;
        self.tolerate_already_exists(result, HYBRID_COLLECTION)?;
        self.create_payload_indexes(HYBRID_COLLECTION).await;
        Ok(())
    }

    /// Another process may create the collection between our exists check and
    /// the create call.
    fn tolerate_already_exists<T>(
        &self,
        result: std::result::Result<T, qdrant_client::QdrantError>,
        collection: &str,
    ) -> Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => {
                debug!("Collection {} already exists", collection);
                Ok(())
            }
            Err(e) => Err(HivemindError::upstream("vector_index", e)),
        }
    }

    async fn create_payload_indexes(&self, collection: &str) {
        let fields = [
            ("tenant_id", FieldType::Integer),
            ("channel_id", FieldType::Integer),
            ("source_type", FieldType::Keyword),
        ];
        for (field, field_type) in fields {
            if let Err(e) = self
                .client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    collection, field, field_type,
                ))
                .await
            {
                warn!("Payload index on {}.{} failed: {}", collection, field, e);
            }
        }
    }

    fn require_tenant(payload: &HashMap<String, QdrantValue>) -> Result<()> {
        let present = payload
            .get("tenant_id")
            .and_then(|v| v.kind.as_ref())
            .is_some_and(|k| matches!(k, Kind::IntegerValue(_)));
        if !present {
            return Err(HivemindError::Isolation(
                "vector payload missing integer tenant_id".to_string(),
            ));
        }
        Ok(())
    }

    /// Upsert into the legacy dense collection. Returns once acknowledged.
    pub async fn upsert_dense(
        &self,
        point_id: &str,
        dense: Vec<f32>,
        payload: HashMap<String, QdrantValue>,
    ) -> Result<()> {
        Self::require_tenant(&payload)?;
        let point = PointStruct::new(point_id.to_string(), dense, payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(LEGACY_COLLECTION, vec![point]).wait(true))
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        debug!("Upserted dense point {}", point_id);
        Ok(())
    }

    /// Upsert into the hybrid collection with named dense + sparse vectors.
    /// The sparse vector is omitted when empty.
    pub async fn upsert_hybrid(
        &self,
        point_id: &str,
        dense: Vec<f32>,
        sparse: Option<&SparseVector>,
        payload: HashMap<String, QdrantValue>,
    ) -> Result<()> {
        Self::require_tenant(&payload)?;

        let mut vectors = qdrant_client::qdrant::NamedVectors::default()
            .add_vector(DENSE_VECTOR, qdrant_client::qdrant::Vector::new_dense(dense));
        if let Some(sv) = sparse {
            if !sv.is_empty() {
                vectors = vectors.add_vector(
                    SPARSE_VECTOR,
                    qdrant_client::qdrant::Vector::new_sparse(
                        sv.indices.clone(),
                        sv.values.clone(),
                    ),
                );
            }
        }

        let point = PointStruct::new(point_id.to_string(), Vectors::from(vectors), payload);
        self.client
            .upsert_points(UpsertPointsBuilder::new(HYBRID_COLLECTION, vec![point]).wait(true))
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        debug!("Upserted hybrid point {}", point_id);
        Ok(())
    }

    /// Build the mandatory tenant filter plus optional channel/source filters.
    /// Channel semantics are any-of the provided list.
    pub fn tenant_filter(
        tenant_id: i64,
        channel_ids: Option<&[i64]>,
        source_types: Option<&[String]>,
    ) -> Filter {
        let mut must = vec![Condition::matches("tenant_id", tenant_id)];
        if let Some(channels) = channel_ids {
            if !channels.is_empty() {
                must.push(Condition::matches("channel_id", channels.to_vec()));
            }
        }
        if let Some(types) = source_types {
            if !types.is_empty() {
                must.push(Condition::matches("source_type", types.to_vec()));
            }
        }
        Filter::must(must)
    }

    /// Dense search against the legacy collection with a score cut-off.
    pub async fn search_dense(
        &self,
        dense: Vec<f32>,
        filter: Filter,
        limit: u64,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(LEGACY_COLLECTION, dense, limit)
                    .filter(filter)
                    .score_threshold(score_threshold)
                    .with_payload(true),
            )
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        Ok(response.result.into_iter().map(scored_to_hit).collect())
    }

    /// Dense prefetch against the hybrid collection's named `dense` vector.
    pub async fn search_hybrid_dense(
        &self,
        dense: Vec<f32>,
        filter: Filter,
        limit: u64,
    ) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(HYBRID_COLLECTION, dense, limit)
                    .vector_name(DENSE_VECTOR)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        Ok(response.result.into_iter().map(scored_to_hit).collect())
    }

    /// Sparse prefetch against the hybrid collection's named `sparse` vector.
    pub async fn search_hybrid_sparse(
        &self,
        sparse: &SparseVector,
        filter: Filter,
        limit: u64,
    ) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(HYBRID_COLLECTION, sparse.values.clone(), limit)
                    .vector_name(SPARSE_VECTOR)
                    .sparse_indices(SparseIndices {
                        data: sparse.indices.clone(),
                    })
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        Ok(response.result.into_iter().map(scored_to_hit).collect())
    }

    pub async fn delete_points(&self, collection: &str, point_ids: &[String]) -> Result<()> {
        if point_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<PointId> = point_ids.iter().map(|id| PointId::from(id.clone())).collect();
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(ids).wait(true))
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        debug!("Deleted {} points from {}", point_ids.len(), collection);
        Ok(())
    }

    pub async fn delete_by_filter(&self, collection: &str, filter: Filter) -> Result<()> {
        self.client
            .delete_points(DeletePointsBuilder::new(collection).points(filter).wait(true))
            .await
            .map_err(|e| HivemindError::upstream("vector_index", e))?;
        Ok(())
    }

    /// Scroll every point of a tenant in a collection (id + payload).
    /// Used by the purge path and the orphan sweep.
    pub async fn scroll_tenant(
        &self,
        collection: &str,
        tenant_id: i64,
    ) -> Result<Vec<SearchHit>> {
        let mut all = Vec::new();
        let mut offset: Option<PointId> = None;
        let batch: u32 = 100;

        loop {
            let mut builder = ScrollPointsBuilder::new(collection)
                .filter(Filter::must([Condition::matches("tenant_id", tenant_id)]))
                .limit(batch)
                .with_payload(true)
                .with_vectors(false);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| HivemindError::upstream("vector_index", e))?;

            if response.result.is_empty() {
                break;
            }

            let count = response.result.len();
            for point in response.result {
                let id = point
                    .id
                    .as_ref()
                    .map(point_id_to_string)
                    .unwrap_or_default();
                all.push(SearchHit {
                    id,
                    score: 0.0,
                    payload: payload_to_json(point.payload),
                });
            }

            offset = response.next_page_offset;
            if offset.is_none() || count < batch as usize {
                break;
            }
        }

        Ok(all)
    }

    pub async fn health_check(&self) -> bool {
        match self.client.collection_exists(HYBRID_COLLECTION).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Vector index health check failed: {}", e);
                false
            }
        }
    }
}

fn point_id_to_string(id: &PointId) -> String {
    match &id.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u.clone(),
        None => String::new(),
    }
}

fn scored_to_hit(point: qdrant_client::qdrant::ScoredPoint) -> SearchHit {
    let id = point.id.as_ref().map(point_id_to_string).unwrap_or_default();
    SearchHit {
        id,
        score: point.score,
        payload: payload_to_json(point.payload),
    }
}

fn payload_to_json(payload: HashMap<String, QdrantValue>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in payload {
        map.insert(key, qdrant_value_to_json(value));
    }
    serde_json::Value::Object(map)
}

fn qdrant_value_to_json(value: QdrantValue) -> serde_json::Value {
    match value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => json!(b),
        Some(Kind::IntegerValue(i)) => json!(i),
        Some(Kind::DoubleValue(d)) => json!(d),
        Some(Kind::StringValue(s)) => json!(s),
        Some(Kind::ListValue(list)) => serde_json::Value::Array(
            list.values.into_iter().map(qdrant_value_to_json).collect(),
        ),
        Some(Kind::StructValue(s)) => {
            let mut map = serde_json::Map::new();
            for (k, v) in s.fields {
                map.insert(k, qdrant_value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Payload builder for session points; keeps the mandatory keys in one place.
pub fn session_payload(
    tenant_id: i64,
    channel_id: i64,
    session_id: &str,
    message_ids: &[i64],
    participant_ids: &[i64],
    start_time: &str,
    end_time: &str,
    preview: &str,
) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert("tenant_id".to_string(), tenant_id.into());
    payload.insert("channel_id".to_string(), channel_id.into());
    payload.insert("type".to_string(), "chat".into());
    payload.insert("source_type".to_string(), "chat".into());
    payload.insert("session_id".to_string(), session_id.to_string().into());
    payload.insert("message_ids".to_string(), id_list(message_ids));
    payload.insert("message_count".to_string(), (message_ids.len() as i64).into());
    payload.insert("participant_ids".to_string(), id_list(participant_ids));
    payload.insert("start_time".to_string(), start_time.to_string().into());
    payload.insert("end_time".to_string(), end_time.to_string().into());
    payload.insert(
        "content".to_string(),
        crate::util::truncate_chars(preview, 1000).into(),
    );
    payload
}

/// Payload builder for document-chunk points.
pub fn chunk_payload(
    tenant_id: i64,
    channel_id: i64,
    attachment_id: i64,
    chunk_id: &str,
    chunk_index: i64,
    source_type: &str,
    parent_file: &str,
    heading_context: Option<&str>,
    text: &str,
) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = HashMap::new();
    payload.insert("tenant_id".to_string(), tenant_id.into());
    payload.insert("channel_id".to_string(), channel_id.into());
    payload.insert("type".to_string(), "document".into());
    payload.insert("source_type".to_string(), source_type.to_string().into());
    payload.insert("attachment_id".to_string(), attachment_id.into());
    payload.insert("chunk_id".to_string(), chunk_id.to_string().into());
    payload.insert("chunk_index".to_string(), chunk_index.into());
    payload.insert("parent_file".to_string(), parent_file.to_string().into());
    if let Some(heading) = heading_context {
        payload.insert("heading_context".to_string(), heading.to_string().into());
    }
    payload.insert(
        "text".to_string(),
        crate::util::truncate_chars(text, 1000).into(),
    );
    payload
}

fn id_list(ids: &[i64]) -> QdrantValue {
    QdrantValue {
        kind: Some(Kind::ListValue(qdrant_client::qdrant::ListValue {
            values: ids
                .iter()
                .map(|id| QdrantValue {
                    kind: Some(Kind::IntegerValue(*id)),
                })
                .collect(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_payload_always_carries_tenant() {
        let payload = session_payload(42, 7, "s-1", &[1, 2], &[100], "a", "b", "preview");
        assert!(VectorIndex::require_tenant(&payload).is_ok());
        assert!(matches!(
            payload.get("tenant_id").and_then(|v| v.kind.as_ref()),
            Some(Kind::IntegerValue(42))
        ));
    }

    #[test]
    fn missing_tenant_is_an_isolation_error() {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("channel_id".to_string(), 7i64.into());
        let err = VectorIndex::require_tenant(&payload).unwrap_err();
        assert!(matches!(err, HivemindError::Isolation(_)));

        // A string tenant_id is also rejected: the filter key is integer-typed.
        payload.insert("tenant_id".to_string(), "42".to_string().into());
        assert!(VectorIndex::require_tenant(&payload).is_err());
    }

    #[test]
    fn preview_is_capped_at_1000_chars() {
        let long = "x".repeat(5000);
        let payload = session_payload(1, 1, "s", &[], &[], "a", "b", &long);
        match payload.get("content").and_then(|v| v.kind.as_ref()) {
            Some(Kind::StringValue(s)) => assert_eq!(s.chars().count(), 1000),
            other => panic!("unexpected content kind: {other:?}"),
        }
    }
}

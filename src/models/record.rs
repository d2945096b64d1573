//! Bibliographic records as they arrive on the queue.

use serde::{Deserialize, Deserializer, Serialize};

/// An ordered batch of records; the atomic unit of queue delivery.
pub type Batch = Vec<CandidateRecord>;

/// A bibliographic entry published by the upstream fetcher.
///
/// Records are immutable once decoded. `id` is the natural identifier and is
/// not guaranteed to be unique across re-fetches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub updated: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub published: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,

    /// Abstract text; the input to the embedding model.
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub authors: Vec<Author>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub links: Vec<Link>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub primary_category: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub categories: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, deserialize_with = "null_as_default")]
    pub href: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub rel: String,

    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub media_type: String,
}

impl CandidateRecord {
    /// Create a record with only an identifier and abstract.
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            ..Default::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the category labels; the first becomes the primary category.
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        if let Some(first) = categories.first() {
            self.primary_category = first.clone();
        }
        self.categories = categories;
        self
    }

    /// True when the abstract has nothing to embed.
    pub fn has_blank_summary(&self) -> bool {
        crate::utils::is_blank(&self.summary)
    }
}

/// Decode one queue message body into a batch.
///
/// Upstream producers serialize absent lists as `null`; those decode as empty.
pub fn decode_batch(body: &[u8]) -> Result<Batch, serde_json::Error> {
    serde_json::from_slice(body)
}

/// Deserialize `null` as the type's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

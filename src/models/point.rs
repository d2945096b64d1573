//! Vector store points and the attribute bag layout.

use std::collections::HashMap;

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{ListValue, Struct, Value};
use uuid::Uuid;

use super::record::{Author, CandidateRecord, Link};

/// Attribute bag stored alongside each vector.
pub type Payload = HashMap<String, Value>;

/// A point ready for upsert: surrogate id, vector, attribute bag.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Freshly minted per point; never the record's natural id.
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

impl StoredPoint {
    /// Build a point for `record`, minting a new surrogate id.
    pub fn from_record(record: &CandidateRecord, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            vector,
            payload: record_to_payload(record),
        }
    }

    /// Natural record identifier carried in the payload.
    pub fn record_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(as_str)
    }
}

/// Flatten a record into the store's structured-value representation.
///
/// Scalars are stored verbatim, authors as `{name}` structs, links as
/// `{href, rel, type}` structs, categories as plain strings.
pub fn record_to_payload(record: &CandidateRecord) -> Payload {
    let mut payload = Payload::new();
    payload.insert("id".to_string(), record.id.clone().into());
    payload.insert("updated".to_string(), record.updated.clone().into());
    payload.insert("published".to_string(), record.published.clone().into());
    payload.insert("title".to_string(), record.title.clone().into());
    payload.insert("summary".to_string(), record.summary.clone().into());
    payload.insert("comment".to_string(), record.comment.clone().into());
    payload.insert(
        "primaryCategory".to_string(),
        record.primary_category.clone().into(),
    );
    if let Some(ref doi) = record.doi {
        payload.insert("doi".to_string(), doi.clone().into());
    }
    if let Some(ref journal_ref) = record.journal_ref {
        payload.insert("journalRef".to_string(), journal_ref.clone().into());
    }

    let authors = record
        .authors
        .iter()
        .map(|author| struct_value([("name", author.name.clone())]))
        .collect();
    payload.insert("authors".to_string(), list_value(authors));

    let links = record
        .links
        .iter()
        .map(|link| {
            struct_value([
                ("href", link.href.clone()),
                ("rel", link.rel.clone()),
                ("type", link.media_type.clone()),
            ])
        })
        .collect();
    payload.insert("links".to_string(), list_value(links));

    let categories = record
        .categories
        .iter()
        .map(|category| Value::from(category.clone()))
        .collect();
    payload.insert("categories".to_string(), list_value(categories));

    payload
}

/// Rebuild a record from a stored attribute bag. Missing keys decode as empty.
pub fn record_from_payload(payload: &Payload) -> CandidateRecord {
    let string = |key: &str| payload.get(key).and_then(as_str).unwrap_or_default().to_string();
    let optional = |key: &str| {
        payload
            .get(key)
            .and_then(as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let authors = list_items(payload.get("authors"))
        .filter_map(as_struct)
        .filter_map(|fields| fields.get("name").and_then(as_str))
        .filter(|name| !name.is_empty())
        .map(|name| Author {
            name: name.to_string(),
        })
        .collect();

    let links = list_items(payload.get("links"))
        .filter_map(as_struct)
        .map(|fields| {
            let field = |key: &str| {
                fields
                    .get(key)
                    .and_then(as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Link {
                href: field("href"),
                rel: field("rel"),
                media_type: field("type"),
            }
        })
        .collect();

    let categories = list_items(payload.get("categories"))
        .filter_map(as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    CandidateRecord {
        id: string("id"),
        updated: string("updated"),
        published: string("published"),
        title: string("title"),
        summary: string("summary"),
        authors,
        comment: string("comment"),
        links,
        primary_category: string("primaryCategory"),
        categories,
        doi: optional("doi"),
        journal_ref: optional("journalRef"),
    }
}

fn struct_value<const N: usize>(fields: [(&str, String); N]) -> Value {
    let fields = fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::from(value)))
        .collect();
    Value {
        kind: Some(Kind::StructValue(Struct { fields })),
    }
}

fn list_value(values: Vec<Value>) -> Value {
    Value {
        kind: Some(Kind::ListValue(ListValue { values })),
    }
}

fn as_str(value: &Value) -> Option<&str> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn as_struct(value: &Value) -> Option<&HashMap<String, Value>> {
    match &value.kind {
        Some(Kind::StructValue(s)) => Some(&s.fields),
        _ => None,
    }
}

fn list_items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    let values: &[Value] = match value.map(|v| &v.kind) {
        Some(Some(Kind::ListValue(list))) => &list.values,
        _ => &[],
    };
    values.iter()
}

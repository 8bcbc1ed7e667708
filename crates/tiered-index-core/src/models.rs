//! Record model shared by every collection.
//!
//! Each of the six record kinds lives in its own collection and carries a
//! text payload plus a flat JSON metadata object. Typed views over those
//! records are expressed as [`Typed<M>`] where `M` is the kind's metadata
//! schema, so one generic accessor serves every collection.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Flat key/value metadata attached to a record.
pub type Metadata = Map<String, Value>;

/// The six collections of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Group,
    Paper,
    Chunk,
    Relationship,
    CommunityReport,
    Summary,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Group,
        RecordKind::Paper,
        RecordKind::Chunk,
        RecordKind::Relationship,
        RecordKind::CommunityReport,
        RecordKind::Summary,
    ];

    /// Stable collection name used by storage backends.
    pub fn collection_name(self) -> &'static str {
        match self {
            RecordKind::Group => "group",
            RecordKind::Paper => "paper",
            RecordKind::Chunk => "chunk",
            RecordKind::Relationship => "relationship",
            RecordKind::CommunityReport => "community_report",
            RecordKind::Summary => "summary",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for RecordKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "group" => Ok(RecordKind::Group),
            "paper" => Ok(RecordKind::Paper),
            "chunk" => Ok(RecordKind::Chunk),
            "relationship" => Ok(RecordKind::Relationship),
            "community_report" | "report" => Ok(RecordKind::CommunityReport),
            "summary" => Ok(RecordKind::Summary),
            other => Err(anyhow!(
                "Unknown record kind: '{}'. Use group, paper, chunk, relationship, report, or summary.",
                other
            )),
        }
    }
}

/// Per-collection record identifier.
///
/// Rendered and persisted as a decimal string. Identifiers start at 1;
/// [`RecordId::NOT_FOUND`] (`"0"`) is the sentinel stored when a
/// cross-reference could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordId(u64);

impl RecordId {
    pub const NOT_FOUND: RecordId = RecordId(0);

    pub const fn new(value: u64) -> Self {
        RecordId(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_not_found(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(RecordId)
    }
}

impl From<u64> for RecordId {
    fn from(value: u64) -> Self {
        RecordId(value)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(RecordId(n)),
        }
    }
}

/// A stored record as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: RecordKind,
    pub id: RecordId,
    pub content: String,
    pub metadata: Metadata,
}

impl Record {
    /// String value of a metadata key, if present and a string.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Identifier stored under a metadata key (string or number form).
    pub fn meta_id(&self, key: &str) -> Option<RecordId> {
        match self.metadata.get(key)? {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(RecordId),
            _ => None,
        }
    }

    /// Owning group, for kinds that carry one.
    pub fn group_id(&self) -> Option<RecordId> {
        self.meta_id(GROUP_ID_KEY)
    }
}

/// Metadata key that scopes a record to a tenant.
pub const GROUP_ID_KEY: &str = "group_id";

/// Metadata schema of one record kind.
pub trait RecordMeta: Serialize + DeserializeOwned + Clone {
    const KIND: RecordKind;
}

/// A record decoded into its kind's metadata schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Typed<M> {
    pub id: RecordId,
    pub content: String,
    pub meta: M,
}

impl<M: RecordMeta> Typed<M> {
    /// Decode a raw record, failing on kind mismatch or malformed metadata.
    pub fn decode(record: &Record) -> Result<Self, serde_json::Error> {
        if record.kind != M::KIND {
            return Err(de::Error::custom(format!(
                "expected a {} record, found {}",
                M::KIND,
                record.kind
            )));
        }
        let meta = serde_json::from_value(Value::Object(record.metadata.clone()))?;
        Ok(Typed {
            id: record.id,
            content: record.content.clone(),
            meta,
        })
    }
}

/// Encode a metadata schema into the flat map stored by backends.
pub fn encode_meta<M: Serialize>(meta: &M) -> Result<Metadata, serde_json::Error> {
    match serde_json::to_value(meta)? {
        Value::Object(map) => Ok(map),
        other => Err(de::Error::custom(format!(
            "metadata must encode to an object, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    pub group_name: String,
}

impl RecordMeta for GroupMeta {
    const KIND: RecordKind = RecordKind::Group;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMeta {
    pub paper_name: String,
    pub group_id: RecordId,
    /// SHA-256 hex digest of the paper text.
    pub hash: String,
}

impl RecordMeta for PaperMeta {
    const KIND: RecordKind = RecordKind::Paper;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub paper_id: RecordId,
    pub group_id: RecordId,
    /// Cleaned rendering of the chunk; empty when none was supplied.
    #[serde(default)]
    pub denoising_chunk: String,
    #[serde(default)]
    pub sub_chunks: Vec<String>,
}

impl RecordMeta for ChunkMeta {
    const KIND: RecordKind = RecordKind::Chunk;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMeta {
    pub source_entity_name: String,
    pub target_entity_name: String,
    pub relationship_description: String,
    pub relationship_strength: f64,
    /// Owning chunk, or [`RecordId::NOT_FOUND`] when it could not be resolved.
    pub chunk_id: RecordId,
}

impl RecordMeta for RelationshipMeta {
    const KIND: RecordKind = RecordKind::Relationship;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityReportMeta {
    pub group_id: RecordId,
    pub chunk_id_list: Vec<RecordId>,
}

impl RecordMeta for CommunityReportMeta {
    const KIND: RecordKind = RecordKind::CommunityReport;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMeta {
    pub group_id: RecordId,
    /// Base chunk ids when `from_base_chunk`, otherwise child summary ids.
    #[serde(rename = "chunk_id_list")]
    pub children: Vec<RecordId>,
    pub from_base_chunk: bool,
    pub root_summary: bool,
}

impl RecordMeta for SummaryMeta {
    const KIND: RecordKind = RecordKind::Summary;
}

pub type Group = Typed<GroupMeta>;
pub type Paper = Typed<PaperMeta>;
pub type Chunk = Typed<ChunkMeta>;
pub type Relationship = Typed<RelationshipMeta>;
pub type CommunityReport = Typed<CommunityReportMeta>;
pub type Summary = Typed<SummaryMeta>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_id_accepts_string_and_number() {
        let a: RecordId = serde_json::from_value(json!("42")).unwrap();
        let b: RecordId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_value(a).unwrap(), json!("42"));
    }

    #[test]
    fn test_record_id_ordering_is_numeric() {
        let mut ids: Vec<RecordId> = ["10", "2", "1"].iter().map(|s| s.parse().unwrap()).collect();
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["1", "2", "10"]);
    }

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!("report".parse::<RecordKind>().unwrap(), RecordKind::CommunityReport);
        assert_eq!(" Chunk ".parse::<RecordKind>().unwrap(), RecordKind::Chunk);
        assert!("entity".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_summary_meta_uses_chunk_id_list_key() {
        let meta = SummaryMeta {
            group_id: RecordId::new(1),
            children: vec![RecordId::new(3), RecordId::new(4)],
            from_base_chunk: true,
            root_summary: false,
        };
        let map = encode_meta(&meta).unwrap();
        assert_eq!(map.get("chunk_id_list"), Some(&json!(["3", "4"])));
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let record = Record {
            kind: RecordKind::Paper,
            id: RecordId::new(1),
            content: "x".to_string(),
            metadata: encode_meta(&GroupMeta {
                group_name: "x".to_string(),
            })
            .unwrap(),
        };
        assert!(Group::decode(&record).is_err());
    }

    #[test]
    fn test_chunk_meta_defaults_optional_fields() {
        let record = Record {
            kind: RecordKind::Chunk,
            id: RecordId::new(7),
            content: "text".to_string(),
            metadata: json!({"paper_id": "1", "group_id": "2"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let chunk = Chunk::decode(&record).unwrap();
        assert!(chunk.meta.denoising_chunk.is_empty());
        assert!(chunk.meta.sub_chunks.is_empty());
        assert_eq!(record.group_id(), Some(RecordId::new(2)));
    }
}

//! `mnemos-types` – the memory object model.
//!
//! A [`MemoryObject`] is the unit the rest of the workspace stores and ranks.
//! It bundles three modalities under one identity:
//!
//! - [`StructuredRecord`] – *what it is*: category, name, function, aliases,
//!   constraints and open metadata.
//! - [`SemanticRecord`] – *how people talk about it*: free-text expressions
//!   and language hints.
//! - [`VisualRecord`] – *where it is*: human-annotated image regions.
//!
//! Every sub-record carries the same [`MemoryId`]. The id is minted once by
//! [`MemoryObject::create`] and there is no API to change it afterwards.
//!
//! # Timestamps
//!
//! All timestamps are UTC truncated to microseconds and encoded as RFC 3339
//! with six fractional digits (see [`format_timestamp`]), so a value written
//! to storage and read back compares equal to the original.
//!
//! # Example
//!
//! ```rust
//! use mnemos_types::{BoundingBox, EntityType, MemoryObject, NewMemory, VisualAnnotation};
//!
//! let mut memory = MemoryObject::create(
//!     NewMemory::new("Volume Button", EntityType::DeviceComponent).device("speaker"),
//! );
//! memory.attach_visual(VisualAnnotation::new("img_001", BoundingBox::new(0.1, 0.2, 0.3, 0.4)));
//!
//! assert_eq!(memory.structured.base.id(), memory.id());
//! assert_eq!(memory.visuals()[0].base.id(), memory.id());
//! ```

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Open key/value metadata attached to structured and visual records.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while parsing or rehydrating model values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("Unknown source tag: {0}")]
    UnknownSource(String),

    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    #[error("Sub-record identity {found} does not match memory {expected}")]
    IdentityMismatch { expected: String, found: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamps
// ─────────────────────────────────────────────────────────────────────────────

/// Current UTC time at the storage precision (microseconds).
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render `ts` as RFC 3339 with exactly six fractional digits and a `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 timestamp into UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ModelError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| ModelError::InvalidTimestamp {
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

/// `#[serde(with = "timestamp")]` adapter using [`format_timestamp`].
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Clamp a confidence value into `[0.0, 1.0]`. `NaN` becomes `0.0`.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryId
// ─────────────────────────────────────────────────────────────────────────────

/// Identity shared by a memory object and all of its sub-records.
///
/// Rendered as `mem_` followed by 12 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(String);

impl MemoryId {
    pub const PREFIX: &'static str = "mem";

    fn generate() -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}", Self::PREFIX, &hex[..12]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for MemoryId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MemoryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tags
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a structured memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Concept,
    DeviceComponent,
    SoftwareSpec,
    Rule,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Concept => "concept",
            EntityType::DeviceComponent => "device_component",
            EntityType::SoftwareSpec => "software_spec",
            EntityType::Rule => "rule",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concept" => Ok(EntityType::Concept),
            "device_component" => Ok(EntityType::DeviceComponent),
            "software_spec" => Ok(EntityType::SoftwareSpec),
            "rule" => Ok(EntityType::Rule),
            other => Err(ModelError::UnknownEntityType(other.to_string())),
        }
    }
}

/// Where a piece of knowledge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    #[default]
    Text,
    Image,
    Mixed,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Text => "text",
            Source::Image => "image",
            Source::Mixed => "mixed",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Source::Text),
            "image" => Ok(Source::Image),
            "mixed" => Ok(Source::Mixed),
            other => Err(ModelError::UnknownSource(other.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BaseAttributes
// ─────────────────────────────────────────────────────────────────────────────

/// Attributes common to every sub-record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseAttributes {
    id: MemoryId,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    confidence: f64,
    pub source: Source,
}

impl BaseAttributes {
    fn new(id: MemoryId, source: Source) -> Self {
        let ts = now();
        Self {
            id,
            created_at: ts,
            updated_at: ts,
            confidence: 1.0,
            source,
        }
    }

    pub fn id(&self) -> &MemoryId {
        &self.id
    }

    /// Confidence in `[0.0, 1.0]`.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Set the confidence, clamping out-of-range values.
    pub fn set_confidence(&mut self, value: f64) {
        self.confidence = clamp_confidence(value);
    }

    /// Mark the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sub-records
// ─────────────────────────────────────────────────────────────────────────────

/// Defines *what* a memory is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(flatten)]
    pub base: BaseAttributes,
    pub entity_type: EntityType,
    pub name: String,
    pub function: String,
    pub description: String,
    pub device: Option<String>,
    pub domain: Option<String>,
    pub aliases: Vec<String>,
    pub constraints: Vec<String>,
    pub metadata: Metadata,
}

/// Free-text expressions used for search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticRecord {
    #[serde(flatten)]
    pub base: BaseAttributes,
    pub texts: Vec<String>,
    /// Reserved for a future similarity search.
    pub embedding: Option<Vec<f32>>,
    pub language_hints: Vec<String>,
}

/// Normalized `[x, y, w, h]` region of an image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self([x, y, w, h])
    }

    pub fn x(&self) -> f64 {
        self.0[0]
    }

    pub fn y(&self) -> f64 {
        self.0[1]
    }

    pub fn width(&self) -> f64 {
        self.0[2]
    }

    pub fn height(&self) -> f64 {
        self.0[3]
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x, y, w, h] = self.0;
        write!(f, "[{x:.3}, {y:.3}, {w:.3}, {h:.3}]")
    }
}

/// A human-annotated region of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualRecord {
    #[serde(flatten)]
    pub base: BaseAttributes,
    pub image_id: String,
    pub bbox: BoundingBox,
    pub view_angle: Option<String>,
    /// Reserved for a future visual similarity search.
    pub visual_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Input for [`MemoryObject::attach_visual`].
#[derive(Debug, Clone, PartialEq)]
pub struct VisualAnnotation {
    pub image_id: String,
    pub bbox: BoundingBox,
    pub view_angle: Option<String>,
    pub confidence: f64,
    pub metadata: Metadata,
}

impl VisualAnnotation {
    pub fn new(image_id: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            image_id: image_id.into(),
            bbox,
            view_angle: None,
            confidence: 1.0,
            metadata: Metadata::new(),
        }
    }

    pub fn view_angle(mut self, angle: impl Into<String>) -> Self {
        self.view_angle = Some(angle.into());
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryObject
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for [`MemoryObject::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemory {
    pub name: String,
    pub entity_type: EntityType,
    pub source: Source,
    pub device: Option<String>,
    pub domain: Option<String>,
}

impl NewMemory {
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            name: name.into(),
            entity_type,
            source: Source::default(),
            device: None,
            domain: None,
        }
    }

    pub fn source(mut self, source: Source) -> Self {
        self.source = source;
        self
    }

    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// A complete memory: one structured record, one semantic record and any
/// number of visual records, all sharing [`MemoryObject::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryObject {
    id: MemoryId,
    pub structured: StructuredRecord,
    pub semantic: SemanticRecord,
    visuals: Vec<VisualRecord>,
    usage_count: u64,
    #[serde(with = "timestamp")]
    last_accessed_at: DateTime<Utc>,
}

impl MemoryObject {
    /// Mint a new identity and build empty structured and semantic shells.
    pub fn create(new: NewMemory) -> Self {
        let id = MemoryId::generate();
        let structured = StructuredRecord {
            base: BaseAttributes::new(id.clone(), new.source),
            entity_type: new.entity_type,
            name: new.name,
            function: String::new(),
            description: String::new(),
            device: new.device,
            domain: new.domain,
            aliases: Vec::new(),
            constraints: Vec::new(),
            metadata: Metadata::new(),
        };
        let semantic = SemanticRecord {
            base: BaseAttributes::new(id.clone(), new.source),
            texts: Vec::new(),
            embedding: None,
            language_hints: Vec::new(),
        };
        Self {
            id,
            structured,
            semantic,
            visuals: Vec::new(),
            usage_count: 0,
            last_accessed_at: now(),
        }
    }

    /// Reassemble an object from stored parts. Storage decoding only; new
    /// memories come from [`MemoryObject::create`].
    ///
    /// Every sub-record must carry `id`; otherwise
    /// [`ModelError::IdentityMismatch`] is returned.
    #[doc(hidden)]
    pub fn from_parts(
        id: MemoryId,
        structured: StructuredRecord,
        semantic: SemanticRecord,
        visuals: Vec<VisualRecord>,
        usage_count: u64,
        last_accessed_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        let sub_ids = std::iter::once(structured.base.id())
            .chain(std::iter::once(semantic.base.id()))
            .chain(visuals.iter().map(|v| v.base.id()));
        for found in sub_ids {
            if *found != id {
                return Err(ModelError::IdentityMismatch {
                    expected: id.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(Self {
            id,
            structured,
            semantic,
            visuals,
            usage_count,
            last_accessed_at,
        })
    }

    pub fn id(&self) -> &MemoryId {
        &self.id
    }

    pub fn visuals(&self) -> &[VisualRecord] {
        &self.visuals
    }

    /// Mutable access to existing visual records. Records cannot be added or
    /// removed through this slice.
    pub fn visuals_mut(&mut self) -> &mut [VisualRecord] {
        &mut self.visuals
    }

    pub fn has_visual(&self) -> bool {
        !self.visuals.is_empty()
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Append a visual record stamped with this memory's identity.
    pub fn attach_visual(&mut self, annotation: VisualAnnotation) -> &VisualRecord {
        let mut base = BaseAttributes::new(self.id.clone(), Source::Image);
        base.set_confidence(annotation.confidence);
        self.visuals.push(VisualRecord {
            base,
            image_id: annotation.image_id,
            bbox: annotation.bbox,
            view_angle: annotation.view_angle,
            visual_embedding: None,
            metadata: annotation.metadata,
        });
        &self.visuals[self.visuals.len() - 1]
    }

    /// Count one use of this memory.
    pub fn record_use(&mut self) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_accessed_at = now();
    }

    /// Keep the higher usage count and the later access time of the two copies.
    pub fn merge_usage_from(&mut self, other: &MemoryObject) {
        self.usage_count = self.usage_count.max(other.usage_count);
        self.last_accessed_at = self.last_accessed_at.max(other.last_accessed_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume_button() -> MemoryObject {
        MemoryObject::create(NewMemory::new("Volume Button", EntityType::DeviceComponent))
    }

    #[test]
    fn memory_id_has_prefix_and_twelve_hex_digits() {
        let memory = volume_button();
        let id = memory.id().as_str();
        let (prefix, hex) = id.split_once('_').unwrap();
        assert_eq!(prefix, "mem");
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn create_mints_distinct_ids() {
        assert_ne!(volume_button().id(), volume_button().id());
    }

    #[test]
    fn create_shares_identity_across_sub_records() {
        let memory = MemoryObject::create(
            NewMemory::new("Router", EntityType::DeviceComponent)
                .source(Source::Mixed)
                .device("wifi-6")
                .domain("network"),
        );
        assert_eq!(memory.structured.base.id(), memory.id());
        assert_eq!(memory.semantic.base.id(), memory.id());
        assert_eq!(memory.structured.base.source, Source::Mixed);
        assert_eq!(memory.structured.device.as_deref(), Some("wifi-6"));
        assert_eq!(memory.structured.domain.as_deref(), Some("network"));
        assert_eq!(memory.usage_count(), 0);
        assert!(!memory.has_visual());
    }

    #[test]
    fn attach_visual_stamps_owner_identity() {
        let mut memory = volume_button();
        let record = memory.attach_visual(
            VisualAnnotation::new("img_1", BoundingBox::new(0.1, 0.1, 0.2, 0.2))
                .view_angle("front")
                .confidence(1.7),
        ).clone();
        assert_eq!(record.base.id(), memory.id());
        assert_eq!(record.base.source, Source::Image);
        assert_eq!(record.base.confidence(), 1.0);
        assert!(memory.has_visual());
    }

    #[test]
    fn record_use_increments_usage() {
        let mut memory = volume_button();
        let before = memory.last_accessed_at();
        memory.record_use();
        memory.record_use();
        assert_eq!(memory.usage_count(), 2);
        assert!(memory.last_accessed_at() >= before);
    }

    #[test]
    fn merge_usage_keeps_newer_counters() {
        let mut fresh = volume_button();
        let mut stale = fresh.clone();
        fresh.record_use();
        fresh.record_use();
        stale.structured.function = "adjusts volume".into();
        stale.merge_usage_from(&fresh);
        assert_eq!(stale.usage_count(), 2);
        assert_eq!(stale.last_accessed_at(), fresh.last_accessed_at());
        assert_eq!(stale.structured.function, "adjusts volume");

        // An older copy never lowers the counters.
        let older = volume_button();
        fresh.merge_usage_from(&older);
        assert_eq!(fresh.usage_count(), 2);
    }

    #[test]
    fn confidence_is_clamped() {
        let mut memory = volume_button();
        memory.structured.base.set_confidence(-3.0);
        assert_eq!(memory.structured.base.confidence(), 0.0);
        memory.structured.base.set_confidence(0.42);
        assert_eq!(memory.structured.base.confidence(), 0.42);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn timestamps_use_six_fractional_digits() {
        let ts = now();
        let raw = format_timestamp(&ts);
        assert!(raw.ends_with('Z'));
        let fraction = raw.split('.').nth(1).unwrap();
        assert_eq!(fraction.len(), "123456Z".len());
        assert_eq!(parse_timestamp(&raw).unwrap(), ts);
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, ModelError::InvalidTimestamp { .. }));
    }

    #[test]
    fn entity_type_parses_snake_case_tags() {
        for tag in ["concept", "device_component", "software_spec", "rule"] {
            let parsed: EntityType = tag.parse().unwrap();
            assert_eq!(parsed.to_string(), tag);
        }
        assert_eq!(
            "gadget".parse::<EntityType>().unwrap_err(),
            ModelError::UnknownEntityType("gadget".into())
        );
        assert!("video".parse::<Source>().is_err());
    }

    #[test]
    fn structured_record_json_roundtrip() {
        let mut memory = volume_button();
        memory.structured.aliases = vec!["vol".into(), "볼륨".into()];
        memory
            .structured
            .metadata
            .insert("color".into(), serde_json::json!("black"));
        let json = serde_json::to_string(&memory.structured).unwrap();
        assert!(json.contains("\"entity_type\":\"device_component\""));
        let back: StructuredRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, memory.structured);
    }

    #[test]
    fn from_parts_rejects_foreign_sub_record() {
        let a = volume_button();
        let b = volume_button();
        let err = MemoryObject::from_parts(
            a.id().clone(),
            a.structured.clone(),
            b.semantic.clone(),
            Vec::new(),
            0,
            now(),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::IdentityMismatch { .. }));
    }

    #[test]
    fn from_parts_accepts_matching_records() {
        let mut a = volume_button();
        a.attach_visual(VisualAnnotation::new("img", BoundingBox::default()));
        let rebuilt = MemoryObject::from_parts(
            a.id().clone(),
            a.structured.clone(),
            a.semantic.clone(),
            a.visuals().to_vec(),
            a.usage_count(),
            a.last_accessed_at(),
        )
        .unwrap();
        assert_eq!(rebuilt, a);
    }
}

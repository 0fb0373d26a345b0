//! Build metadata document and its tagged JSON codec.
//!
//! The sidecar (`build-meta.json`) records which files came from which
//! upstream release so later runs can decide whether re-download and
//! re-extraction are needed. Typed values are wire-tagged:
//!
//! ```json
//! {"__class__": "rtlsdrlib.BuildType", "value": "windows|w64|static"}
//! ```
//!
//! [`MetaCodec`] is an explicit codec object over a closed set of types.
//! Callers that need the sidecar format take a codec value; there is no
//! process-wide registry.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::build_file::{BuildFile, FileType};
use crate::build_type::BuildType;
use crate::error::ParseError;
use crate::DT_FMT;

/// Wire tags for the closed type set.
const CLASS_BUILD_TYPE: &str = "rtlsdrlib.BuildType";
const CLASS_FILE_TYPE: &str = "rtlsdrlib.FileType";
const CLASS_PATH: &str = "rtlsdrlib.Path";
const CLASS_BUILD_FILE: &str = "rtlsdrlib.BuildFile";
const CLASS_DATETIME: &str = "rtlsdrlib.datetime";

/// Sidecar decode/encode failures.
#[derive(Error, Debug)]
pub enum MetaError {
    /// The document is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A `__class__` tag names a type outside the closed set.
    #[error("Unknown __class__ tag: {0:?}")]
    UnknownClass(String),

    /// A tagged value failed to parse back into its type.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A timestamp did not match the sidecar's fixed pattern.
    #[error("Bad timestamp {0:?} (expected {DT_FMT})")]
    Timestamp(String),

    /// A required field is absent or has the wrong JSON shape.
    #[error("Malformed sidecar entry: {0}")]
    Malformed(String),
}

/// Remote identity and placed files for one harvested asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMeta {
    /// Release tag name (e.g. `v2.0.2`).
    pub tag_name: String,
    /// Human-facing release URL.
    pub release_url: String,
    /// Numeric release id.
    pub release_id: u64,
    /// Release creation timestamp, when the API supplied one.
    pub created: Option<DateTime<Utc>>,
    /// Release publication timestamp, when the API supplied one.
    pub published: Option<DateTime<Utc>>,
    /// Classified build type of the asset.
    pub asset_type: BuildType,
    /// Asset name as reported upstream.
    pub asset_name: String,
    /// Download URL the files came from.
    pub asset_url: String,
    /// Whether the persisted identity matched the remote on the last run.
    pub metadata_matches: bool,
    /// Whether the last run rewrote the placed files.
    pub files_updated: bool,
    /// Files placed from this asset.
    pub build_files: Vec<BuildFile>,
}

/// The whole sidecar document, keyed by asset name.
pub type BuildMeta = BTreeMap<String, AssetMeta>;

/// Tagged JSON codec for the sidecar document.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaCodec;

impl MetaCodec {
    /// Serialize a document to pretty JSON.
    pub fn to_string(self, meta: &BuildMeta) -> Result<String, MetaError> {
        Ok(serde_json::to_string_pretty(&self.encode_document(meta))?)
    }

    /// Parse a document from JSON text.
    ///
    /// # Errors
    ///
    /// [`MetaError`] on malformed JSON, unknown `__class__` tags, or
    /// values that fail to parse back into their types.
    pub fn from_str(self, text: &str) -> Result<BuildMeta, MetaError> {
        let value: Value = serde_json::from_str(text)?;
        self.decode_document(&value)
    }

    /// Encode a document to a JSON value.
    pub fn encode_document(self, meta: &BuildMeta) -> Value {
        let map: Map<String, Value> = meta
            .iter()
            .map(|(name, asset)| (name.clone(), self.encode_asset(asset)))
            .collect();
        Value::Object(map)
    }

    /// Decode a document from a JSON value.
    pub fn decode_document(self, value: &Value) -> Result<BuildMeta, MetaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetaError::Malformed("document root must be an object".into()))?;
        let mut meta = BuildMeta::new();
        for (name, entry) in obj {
            meta.insert(name.clone(), self.decode_asset(entry)?);
        }
        Ok(meta)
    }

    /// Encode one asset entry.
    pub fn encode_asset(self, asset: &AssetMeta) -> Value {
        json!({
            "tag_name": asset.tag_name,
            "release_url": asset.release_url,
            "release_id": asset.release_id,
            "created": asset.created.map_or(Value::Null, |dt| self.encode_datetime(dt)),
            "published": asset.published.map_or(Value::Null, |dt| self.encode_datetime(dt)),
            "asset_type": self.encode_build_type(asset.asset_type),
            "asset_name": asset.asset_name,
            "asset_url": asset.asset_url,
            "metadata_matches": asset.metadata_matches,
            "files_updated": asset.files_updated,
            "build_files": asset.build_files.iter()
                .map(|f| self.encode_build_file(f))
                .collect::<Vec<_>>(),
        })
    }

    /// Decode one asset entry.
    pub fn decode_asset(self, value: &Value) -> Result<AssetMeta, MetaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetaError::Malformed("asset entry must be an object".into()))?;

        let str_field = |key: &str| -> Result<String, MetaError> {
            obj.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| MetaError::Malformed(format!("missing string field {key:?}")))
        };

        let build_files = match obj.get("build_files") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| self.decode_build_file(item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(MetaError::Malformed("build_files must be an array".into()));
            }
        };

        Ok(AssetMeta {
            tag_name: str_field("tag_name")?,
            release_url: str_field("release_url")?,
            release_id: obj
                .get("release_id")
                .and_then(Value::as_u64)
                .ok_or_else(|| MetaError::Malformed("missing numeric release_id".into()))?,
            created: self.decode_optional_datetime(obj.get("created"))?,
            published: self.decode_optional_datetime(obj.get("published"))?,
            asset_type: match obj.get("asset_type") {
                Some(v) => self.decode_build_type(v)?,
                None => BuildType::UNKNOWN,
            },
            asset_name: str_field("asset_name")?,
            asset_url: str_field("asset_url")?,
            metadata_matches: obj
                .get("metadata_matches")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            files_updated: obj
                .get("files_updated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            build_files,
        })
    }

    /// Encode a build type as a tagged value.
    pub fn encode_build_type(self, t: BuildType) -> Value {
        json!({"__class__": CLASS_BUILD_TYPE, "value": t.to_str()})
    }

    /// Encode a file type as a tagged value.
    pub fn encode_file_type(self, t: FileType) -> Value {
        json!({"__class__": CLASS_FILE_TYPE, "value": t.as_str()})
    }

    /// Encode a path as a tagged value.
    pub fn encode_path(self, p: &std::path::Path) -> Value {
        json!({"__class__": CLASS_PATH, "value": p.display().to_string()})
    }

    /// Encode a timestamp with the fixed sidecar pattern.
    pub fn encode_datetime(self, dt: DateTime<Utc>) -> Value {
        json!({"__class__": CLASS_DATETIME, "value": dt.format(DT_FMT).to_string()})
    }

    /// Encode a build file as a tagged field map.
    pub fn encode_build_file(self, f: &BuildFile) -> Value {
        json!({
            "__class__": CLASS_BUILD_FILE,
            "build_type": self.encode_build_type(f.build_type),
            "file_type": self.encode_file_type(f.file_type),
            "filename": self.encode_path(&f.filename),
            "is_symlink": f.is_symlink,
            "symlink_target": f.symlink_target.as_ref()
                .map_or(Value::Null, |t| self.encode_path(t)),
        })
    }

    /// Decode a tagged build type.
    pub fn decode_build_type(self, value: &Value) -> Result<BuildType, MetaError> {
        let s = self.tagged_value(value, CLASS_BUILD_TYPE)?;
        Ok(BuildType::from_str(s)?)
    }

    /// Decode a tagged file type.
    pub fn decode_file_type(self, value: &Value) -> Result<FileType, MetaError> {
        let s = self.tagged_value(value, CLASS_FILE_TYPE)?;
        Ok(s.parse()?)
    }

    /// Decode a tagged path.
    pub fn decode_path(self, value: &Value) -> Result<PathBuf, MetaError> {
        Ok(PathBuf::from(self.tagged_value(value, CLASS_PATH)?))
    }

    /// Decode a tagged timestamp.
    pub fn decode_datetime(self, value: &Value) -> Result<DateTime<Utc>, MetaError> {
        let s = self.tagged_value(value, CLASS_DATETIME)?;
        let naive = NaiveDateTime::parse_from_str(s, DT_FMT)
            .map_err(|_| MetaError::Timestamp(s.to_string()))?;
        Ok(naive.and_utc())
    }

    fn decode_optional_datetime(
        self,
        value: Option<&Value>,
    ) -> Result<Option<DateTime<Utc>>, MetaError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(v) => Ok(Some(self.decode_datetime(v)?)),
        }
    }

    /// Decode a tagged build file, re-anchoring any symlink target next to
    /// the owning file.
    pub fn decode_build_file(self, value: &Value) -> Result<BuildFile, MetaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetaError::Malformed("build file must be an object".into()))?;
        self.check_class(obj, CLASS_BUILD_FILE)?;

        let build_type = self.decode_build_type(
            obj.get("build_type")
                .ok_or_else(|| MetaError::Malformed("missing build_type".into()))?,
        )?;
        let file_type = self.decode_file_type(
            obj.get("file_type")
                .ok_or_else(|| MetaError::Malformed("missing file_type".into()))?,
        )?;
        let filename = self.decode_path(
            obj.get("filename")
                .ok_or_else(|| MetaError::Malformed("missing filename".into()))?,
        )?;
        let is_symlink = obj
            .get("is_symlink")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let symlink_target = match obj.get("symlink_target") {
            None | Some(Value::Null) => None,
            Some(v) => Some(self.decode_path(v)?),
        };

        if is_symlink && symlink_target.is_none() {
            return Err(MetaError::Malformed(format!(
                "symlink entry {} has no target",
                filename.display()
            )));
        }

        let mut file = BuildFile {
            build_type,
            file_type,
            filename,
            is_symlink,
            symlink_target,
        };
        file.reanchor_symlink();
        Ok(file)
    }

    fn check_class(self, obj: &Map<String, Value>, expected: &str) -> Result<(), MetaError> {
        let class = obj
            .get("__class__")
            .and_then(Value::as_str)
            .ok_or_else(|| MetaError::Malformed("missing __class__ tag".into()))?;
        if class == expected {
            Ok(())
        } else {
            Err(MetaError::UnknownClass(class.to_string()))
        }
    }

    fn tagged_value<'a>(self, value: &'a Value, expected: &str) -> Result<&'a str, MetaError> {
        let obj = value
            .as_object()
            .ok_or_else(|| MetaError::Malformed("tagged value must be an object".into()))?;
        self.check_class(obj, expected)?;
        obj.get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| MetaError::Malformed("tagged value missing \"value\"".into()))
    }
}

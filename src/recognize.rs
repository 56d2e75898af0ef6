//! Object recognition: decoding file bytes into the identities they carry.

use serde::Deserialize;
use serde_json::Value;

use crate::content::ContentType;
use crate::error::DecodeError;
use crate::identity::{GroupKind, ObjectId, ObjectKey};

/// One decoded document and the identity it declares.
#[derive(Debug, Clone)]
pub struct RecognizedObject {
	pub id: ObjectId,
	/// The decoded document body, untyped.
	pub document: Value,
}

/// Decodes file bytes of a known content type into the sequence of objects
/// stored in the file. A file may hold zero, one, or many documents.
pub trait ObjectRecognizer: Send + Sync + 'static {
	fn recognize(
		&self,
		content: &[u8],
		content_type: ContentType,
	) -> Result<Vec<RecognizedObject>, DecodeError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypeMeta {
	#[serde(default)]
	api_version: String,
	#[serde(default)]
	kind: String,
	#[serde(default)]
	metadata: ObjectMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
	#[serde(default)]
	name: String,
	#[serde(default)]
	namespace: Option<String>,
}

/// Default recognizer for Kubernetes-style manifests: reads `apiVersion`,
/// `kind` and `metadata` from every document. YAML files may contain
/// multiple `---`-separated documents; JSON files hold a single document.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeMetaRecognizer;

impl TypeMetaRecognizer {
	fn recognize_value(value: Value) -> Result<RecognizedObject, DecodeError> {
		let meta: TypeMeta = serde_json::from_value(value.clone())?;
		if meta.api_version.is_empty() {
			return Err(DecodeError::MissingField("apiVersion"));
		}
		if meta.kind.is_empty() {
			return Err(DecodeError::MissingField("kind"));
		}
		if meta.metadata.name.is_empty() {
			return Err(DecodeError::MissingField("metadata.name"));
		}

		let group_kind = GroupKind::from_api_version(&meta.api_version, meta.kind);
		let key = ObjectKey {
			namespace: meta.metadata.namespace.filter(|ns| !ns.is_empty()),
			name: meta.metadata.name,
		};

		Ok(RecognizedObject {
			id: ObjectId::new(group_kind, key),
			document: value,
		})
	}
}

impl ObjectRecognizer for TypeMetaRecognizer {
	fn recognize(
		&self,
		content: &[u8],
		content_type: ContentType,
	) -> Result<Vec<RecognizedObject>, DecodeError> {
		match content_type {
			ContentType::Yaml => {
				let mut objects = Vec::new();
				for document in serde_yaml::Deserializer::from_slice(content) {
					let value = Value::deserialize(document)
						.map_err(DecodeError::Yaml)?;
					// Empty documents between separators decode to null.
					if value.is_null() {
						continue;
					}
					objects.push(Self::recognize_value(value)?);
				}
				Ok(objects)
			}
			ContentType::Json => {
				let value: Value = serde_json::from_slice(content)?;
				if value.is_null() {
					return Ok(Vec::new());
				}
				Ok(vec![Self::recognize_value(value)?])
			}
		}
	}
}

//! The resource kind registry: the seam between the language core and the
//! configuration-management engine's resource implementations.
//!
//! The registry answers, per kind: which language field names exist and at
//! what type, how a language field name maps onto the engine's struct
//! field, and which fields can send or receive values along edges. The
//! default registry ships two kinds, `test` and `noop`, which exercise
//! every output path; real providers register through the same trait.
//!
//! Exported resources travel between hosts as base64-wrapped binary blobs;
//! [`b64_to_res`] and [`res_to_b64`] are the codec.

use ahash::AHashMap;
use base64::Engine as _;
use indexmap::IndexMap;

use crate::{
    errors::{LangError, LangResult},
    output::Resource,
    span::SrcSpan,
    types::Type,
};

/// Per-kind facts the language core needs about resources.
pub trait KindRegistry: std::fmt::Debug {
    /// True when `kind` names a known resource kind.
    fn is_kind(&self, kind: &str) -> bool;

    /// Language field name to field type, in declaration order.
    fn field_types(&self, kind: &str) -> Option<IndexMap<String, Type>>;

    /// Language field name to the engine-side struct field name.
    fn field_struct_name(&self, kind: &str, lang_field: &str) -> Option<String>;

    /// Sendable fields and their types; `None` when the kind cannot send.
    fn sends(&self, kind: &str) -> Option<IndexMap<String, Type>>;

    /// Receivable fields and their types; `None` when the kind cannot recv.
    fn recvs(&self, kind: &str) -> Option<IndexMap<String, Type>>;

    /// Creates an empty named resource of the kind.
    fn new_resource(&self, kind: &str, name: &str) -> LangResult<Resource>;
}

/// Static description of one kind in the default registry.
#[derive(Debug, Clone)]
struct KindSpec {
    /// lang field name -> (struct field name, type)
    fields: IndexMap<String, (String, Type)>,
    sends: IndexMap<String, Type>,
    recvs: IndexMap<String, Type>,
}

/// Table-backed registry with the built-in `test` and `noop` kinds.
#[derive(Debug)]
pub struct DefaultKinds {
    kinds: AHashMap<String, KindSpec>,
}

impl DefaultKinds {
    pub fn new() -> Self {
        let mut kinds = AHashMap::new();

        let mut test_fields = IndexMap::new();
        test_fields.insert("stringptr".to_owned(), ("string_ptr".to_owned(), Type::Str));
        test_fields.insert("int64ptr".to_owned(), ("int64_ptr".to_owned(), Type::Int));
        test_fields.insert("boolptr".to_owned(), ("bool_ptr".to_owned(), Type::Bool));
        test_fields.insert("floatptr".to_owned(), ("float_ptr".to_owned(), Type::Float));
        test_fields.insert("out".to_owned(), ("out".to_owned(), Type::Str));
        test_fields.insert("in".to_owned(), ("input".to_owned(), Type::Str));
        test_fields.insert("code".to_owned(), ("code".to_owned(), Type::Int));
        test_fields.insert("level".to_owned(), ("level".to_owned(), Type::Int));
        let mut test_sends = IndexMap::new();
        test_sends.insert("out".to_owned(), Type::Str);
        test_sends.insert("code".to_owned(), Type::Int);
        let mut test_recvs = IndexMap::new();
        test_recvs.insert("in".to_owned(), Type::Str);
        test_recvs.insert("level".to_owned(), Type::Int);
        kinds.insert(
            "test".to_owned(),
            KindSpec {
                fields: test_fields,
                sends: test_sends,
                recvs: test_recvs,
            },
        );

        kinds.insert(
            "noop".to_owned(),
            KindSpec {
                fields: IndexMap::new(),
                sends: IndexMap::new(),
                recvs: IndexMap::new(),
            },
        );

        Self { kinds }
    }
}

impl Default for DefaultKinds {
    fn default() -> Self {
        Self::new()
    }
}

impl KindRegistry for DefaultKinds {
    fn is_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    fn field_types(&self, kind: &str) -> Option<IndexMap<String, Type>> {
        let spec = self.kinds.get(kind)?;
        Some(spec.fields.iter().map(|(n, (_, t))| (n.clone(), t.clone())).collect())
    }

    fn field_struct_name(&self, kind: &str, lang_field: &str) -> Option<String> {
        let spec = self.kinds.get(kind)?;
        spec.fields.get(lang_field).map(|(s, _)| s.clone())
    }

    fn sends(&self, kind: &str) -> Option<IndexMap<String, Type>> {
        let spec = self.kinds.get(kind)?;
        (!spec.sends.is_empty()).then(|| spec.sends.clone())
    }

    fn recvs(&self, kind: &str) -> Option<IndexMap<String, Type>> {
        let spec = self.kinds.get(kind)?;
        (!spec.recvs.is_empty()).then(|| spec.recvs.clone())
    }

    fn new_resource(&self, kind: &str, name: &str) -> LangResult<Resource> {
        if !self.is_kind(kind) {
            return Err(LangError::output(
                format!("unknown resource kind `{kind}`"),
                SrcSpan::default(),
            ));
        }
        Ok(Resource::new(kind, name))
    }
}

/// A resource exported by another host, as carried on the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportedResource {
    /// The exporting host.
    pub host: String,
    pub res: Resource,
}

/// Decodes a collected exported-resource blob.
pub fn b64_to_res(blob: &str) -> LangResult<ExportedResource> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob)
        .map_err(|e| LangError::output(format!("invalid exported resource encoding: {e}"), SrcSpan::default()))?;
    postcard::from_bytes(&bytes)
        .map_err(|e| LangError::output(format!("invalid exported resource payload: {e}"), SrcSpan::default()))
}

/// Encodes an exported resource for the wire. The inverse of
/// [`b64_to_res`]; hosts use it when publishing exports.
pub fn res_to_b64(res: &ExportedResource) -> LangResult<String> {
    let bytes = postcard::to_allocvec(res)
        .map_err(|e| LangError::output(format!("exported resource encoding failed: {e}"), SrcSpan::default()))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_knows_test_and_noop() {
        let reg = DefaultKinds::new();
        assert!(reg.is_kind("test"));
        assert!(reg.is_kind("noop"));
        assert!(!reg.is_kind("mystery"));
    }

    #[test]
    fn lang_field_maps_to_struct_field() {
        let reg = DefaultKinds::new();
        assert_eq!(reg.field_struct_name("test", "stringptr").as_deref(), Some("string_ptr"));
        assert_eq!(reg.field_struct_name("test", "nope"), None);
    }

    #[test]
    fn noop_is_neither_sendable_nor_recvable() {
        let reg = DefaultKinds::new();
        assert!(reg.sends("noop").is_none());
        assert!(reg.recvs("noop").is_none());
    }

    #[test]
    fn exported_resource_survives_the_wire() {
        let exported = ExportedResource {
            host: "h1".to_owned(),
            res: Resource::new("test", "t1"),
        };
        let blob = res_to_b64(&exported).expect("encode");
        assert_eq!(b64_to_res(&blob).expect("decode"), exported);
    }

    #[test]
    fn garbage_blob_is_an_output_error() {
        assert!(matches!(b64_to_res("!!!"), Err(LangError::Output { .. })));
    }
}

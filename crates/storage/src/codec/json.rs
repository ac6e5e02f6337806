//! JSON field codec.

use timetravel_core::Fields;

use super::traits::{CodecError, FieldCodec};

/// Encodes field maps as JSON objects: `{"hello":"x"}`.
///
/// Keys are written in sorted order, so equal maps produce equal text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCodec;

impl FieldCodec for JsonCodec {
    fn encode(&self, fields: &Fields) -> Result<String, CodecError> {
        serde_json::to_string(fields).map_err(|e| CodecError::EncodeError(e.to_string()))
    }

    fn decode(&self, data: &str) -> Result<Fields, CodecError> {
        serde_json::from_str(data).map_err(|e| CodecError::DecodeError(e.to_string()))
    }

    fn codec_id(&self) -> &str {
        "json"
    }
}

//! Field-map codec abstraction.
//!
//! Persistent tables store a record's field map as one opaque text column.
//! The codec decides how a map becomes that text and back; the rest of the
//! system only relies on the round trip being exact.
//!
//! # Usage
//!
//! ```ignore
//! use timetravel_storage::codec::{FieldCodec, JsonCodec};
//!
//! let codec = JsonCodec;
//! let encoded = codec.encode(&fields)?;
//! let decoded = codec.decode(&encoded)?;
//!
//! assert_eq!(fields, decoded);
//! ```

mod json;
mod traits;

pub use json::JsonCodec;
pub use traits::{CodecError, FieldCodec};

/// Get a codec by its identifier.
///
/// # Known Codecs
///
/// - `"json"`: JSON object encoding
pub fn get_codec(codec_id: &str) -> Result<Box<dyn FieldCodec>, CodecError> {
    match codec_id {
        "json" => Ok(Box::new(JsonCodec)),
        _ => Err(CodecError::UnknownCodec(codec_id.to_string())),
    }
}

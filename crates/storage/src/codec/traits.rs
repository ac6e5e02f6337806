//! Field codec trait definitions.

use timetravel_core::{Error, Fields};

/// Field-map codec trait.
///
/// Every field map written by a persistent table goes through the codec,
/// which turns it into the opaque `data` column and back.
///
/// # Round-trip Guarantee
///
/// `decode(encode(f))` must reproduce `f` exactly, including empty-string
/// values and the absence of keys. `encode` must also be deterministic:
/// conditional writes compare stored text against a fresh encoding of the
/// map that was read.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync` to allow concurrent encoding/decoding
/// from multiple threads.
pub trait FieldCodec: Send + Sync {
    /// Encode a field map for storage.
    fn encode(&self, fields: &Fields) -> Result<String, CodecError>;

    /// Decode a stored field map.
    ///
    /// Returns an error if the data is not a valid encoding (corruption).
    fn decode(&self, data: &str) -> Result<Fields, CodecError>;

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Decoding failed (invalid format, corruption).
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::UnknownCodec(id) => Error::invalid_input(format!("unknown codec {:?}", id)),
            other => Error::storage_with("field codec failure", other),
        }
    }
}

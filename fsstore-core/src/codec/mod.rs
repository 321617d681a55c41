//! Codec (§4.2): translates between an in-memory [`Document`] and its
//! on-disk representation.
//!
//! Two codecs exist, one per storage mode. Encoding is a pure function from
//! `Document` to a list of file bodies - the transaction engine is the only
//! thing that ever writes those into a staging directory, so staging,
//! commit markers and atomic rename stay in one place (§4.3). Decoding reads
//! an already-finalized, non-staging directory or flat file back into
//! memory; it never writes.

pub mod directory;
pub mod flat;

/// The body of a single file to be written for a document, as produced by
/// the directory codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileBody {
    Text(String),
    Bytes(Vec<u8>),
}

/// A file name (relative to the document's directory) paired with its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub body: FileBody,
}

impl StagedFile {
    pub fn text(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self { name: name.into(), body: FileBody::Text(body.into()) }
    }

    pub fn bytes(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self { name: name.into(), body: FileBody::Bytes(body) }
    }
}

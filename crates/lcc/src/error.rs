use std::io;

/// Everything that can go wrong while reading an LCC scene.
///
/// All variants are fatal for the load that produced them. Numeric
/// degeneracies inside a record are never reported here; they are clamped
/// where they occur.
#[derive(Debug, thiserror::Error)]
pub enum LccError {
    /// A metadata field is missing, malformed or inconsistent.
    #[error("invalid LCC metadata: {0}")]
    Format(String),

    /// The requested LOD level does not exist.
    #[error("LOD level {level} out of range (scene has {levels} levels)")]
    LevelOutOfRange { level: usize, levels: usize },

    /// The supplied buffer does not cover the bytes a record needs.
    #[error("truncated LCC data: need bytes up to {needed}, buffer ends at {available}")]
    Truncated { needed: u64, available: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LccError {
    #[cold]
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        LccError::Format(msg.into())
    }
}

impl From<serde_json::Error> for LccError {
    fn from(err: serde_json::Error) -> Self {
        LccError::Format(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LccError>;

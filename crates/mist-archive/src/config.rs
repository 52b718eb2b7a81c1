use serde::{Deserialize, Serialize};

/// How entries are compressed inside a backup bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Stored,
    #[default]
    Deflated,
}

impl Compression {
    pub(crate) fn method(self) -> zip::CompressionMethod {
        match self {
            Self::Stored => zip::CompressionMethod::Stored,
            Self::Deflated => zip::CompressionMethod::Deflated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub compression: Compression,
    /// Largest decompressed entry accepted on restore.
    pub max_entry_size: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Deflated,
            max_entry_size: 256 * 1024 * 1024,
        }
    }
}

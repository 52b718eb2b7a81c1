use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use mist_archive::ArchiveConfig;
use mist_db::MistConfig;

/// Settings read from the `--config` file. Store settings sit at the top
/// level; backup settings under `[archive]`.
#[derive(Debug, Default)]
pub struct Settings {
    pub db: MistConfig,
    pub archive: ArchiveConfig,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ArchiveSection {
    archive: ArchiveConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in config {}", path.display()))
    }

    fn parse(text: &str) -> anyhow::Result<Self> {
        let db = MistConfig::from_toml_str(text)?;
        let section: ArchiveSection = toml::from_str(text)?;
        Ok(Self {
            db,
            archive: section.archive,
        })
    }
}

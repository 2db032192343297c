//! Machine configuration from a JSON file or the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use cpld_link::Link;
use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::error::HostError;
use crate::host::Host;
use crate::models::{MemoryProfile, ModelId, UnknownProfile};
use crate::store::StoreKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid image '{0}' (expected <file>@<offset>)")]
    ImageSpec(String),

    #[error(transparent)]
    UnknownProfile(#[from] UnknownProfile),

    #[error(transparent)]
    Host(#[from] HostError),
}

const fn default_speed() -> u8 {
    1
}

const fn default_lookahead() -> bool {
    true
}

/// An image to load into the store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageConfig {
    pub path: PathBuf,
    #[serde(default = "default_kind")]
    pub kind: StoreKind,
    #[serde(default)]
    pub offset: u32,
}

const fn default_kind() -> StoreKind {
    StoreKind::Rom
}

impl ImageConfig {
    /// Parse `file@offset`; the offset is hex with `0x` or decimal and
    /// defaults to 0.
    pub fn parse(spec: &str, kind: StoreKind) -> Result<Self, ConfigError> {
        let (path, offset) = match spec.rsplit_once('@') {
            Some((path, offset)) => (path, parse_offset(offset)?),
            None => (spec, 0),
        };
        if path.is_empty() {
            return Err(ConfigError::ImageSpec(spec.to_string()));
        }
        Ok(Self {
            path: PathBuf::from(path),
            kind,
            offset,
        })
    }
}

fn parse_offset(text: &str) -> Result<u32, ConfigError> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => u32::from_str(text),
    };
    parsed.map_err(|_| ConfigError::ImageSpec(text.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    #[serde(default)]
    pub model: Option<ModelId>,
    #[serde(default)]
    pub profile: MemoryProfile,
    #[serde(default = "default_speed")]
    pub speed: u8,
    #[serde(default = "default_lookahead")]
    pub lookahead: bool,
    #[serde(default)]
    pub images: Vec<ImageConfig>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            model: None,
            profile: MemoryProfile::default(),
            speed: default_speed(),
            lookahead: default_lookahead(),
            images: Vec::new(),
        }
    }
}

impl MachineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Configure a stopped host: lookahead, speed, model, then images.
    pub fn apply<L: Link + 'static>(&self, host: &Host<L>) -> Result<(), ConfigError> {
        host.set_lookahead(self.lookahead);
        host.set_speed_multiplier(self.speed);
        if let Some(model) = self.model {
            host.select_model(model, self.profile)?;
        }
        for image in &self.images {
            let bytes = fs::read(&image.path).map_err(|source| ConfigError::Io {
                path: image.path.clone(),
                source,
            })?;
            host.load_image(image.kind, image.offset, &bytes)?;
            info!("{} -> {} {:#X}", image.path.display(), image.kind, image.offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_specs() {
        let image = ImageConfig::parse("roms/1z-013a.rom@0xE800", StoreKind::Rom).unwrap();
        assert_eq!(image.path, PathBuf::from("roms/1z-013a.rom"));
        assert_eq!(image.offset, 0xE800);
        assert_eq!(ImageConfig::parse("a.bin@4096", StoreKind::Ram).unwrap().offset, 4096);
        assert_eq!(ImageConfig::parse("a.bin", StoreKind::Ram).unwrap().offset, 0);
        assert!(matches!(
            ImageConfig::parse("a.bin@zz", StoreKind::Rom),
            Err(ConfigError::ImageSpec(_))
        ));
        assert!(ImageConfig::parse("@0x10", StoreKind::Rom).is_err());
    }

    #[test]
    fn json_defaults_and_fields() {
        let config = MachineConfig::from_json(
            r#"{"model": "mz2000", "profile": "physical",
                "images": [{"path": "ipl.rom", "offset": 0}]}"#,
        )
        .unwrap();
        assert_eq!(config.model, Some(ModelId::Mz2000));
        assert_eq!(config.profile, MemoryProfile::Physical);
        assert_eq!(config.speed, 1);
        assert!(config.lookahead);
        assert_eq!(config.images[0].kind, StoreKind::Rom);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            MachineConfig::from_json(r#"{"modle": "pcw"}"#),
            Err(ConfigError::Json(_))
        ));
    }
}

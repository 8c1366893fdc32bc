// SPDX-License-Identifier: GPL-3.0-only

//! Installer settings
//!
//! Settings are INI files read in layers: the packaged defaults first, then
//! an OEM override. A later layer replaces single keys, not whole sections.
//! Keys are looked up in `[General]` first and then in the section-less
//! block at the top of the file. Every typed read has a fallback, so a
//! missing key is never an error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use configparser::ini::Ini;
use serde::Serialize;
use tracing::{debug, info};

use partman_types::{FsType, MEBIBYTE};

use crate::error::{Result, SysError};

/// Overrides the settings file search when set
pub const SETTINGS_ENV: &str = "PARTMAN_SETTINGS";

pub const DEFAULT_SETTINGS_FILE: &str = "/usr/share/partman/settings.ini";
pub const OEM_SETTINGS_FILE: &str = "/etc/partman/oem/settings.ini";

/// Applies when `partition_minimum_size` is unset or zero
pub const FALLBACK_MINIMUM_SIZE: u64 = 100 * MEBIBYTE;

pub const KEY_DEFAULT_FS: &str = "partition_default_fs";
pub const KEY_BOOT_SPACE: &str = "partition_default_boot_space";
pub const KEY_EFI_SPACE: &str = "partition_default_efi_space";
pub const KEY_MINIMUM_SIZE: &str = "partition_minimum_size";

// configparser lowercases section names.
const SECTIONS: [&str; 2] = ["general", "default"];

type Sections = HashMap<String, HashMap<String, Option<String>>>;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    sections: Sections,
    sources: Vec<PathBuf>,
}

/// Partition defaults resolved from the settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionDefaults {
    pub default_filesystem: FsType,
    pub boot_space_bytes: u64,
    pub efi_space_bytes: u64,
    pub minimum_size_bytes: u64,
}

impl Settings {
    /// Layered load. Files that do not exist are skipped.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut settings = Self::default();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                debug!("settings file {:?} not present, skipping", path);
                continue;
            }
            let content = std::fs::read_to_string(path)?;
            settings.merge(parse(&content).map_err(|reason| SysError::SettingsParse {
                path: path.to_path_buf(),
                reason,
            })?);
            settings.sources.push(path.to_path_buf());
        }
        info!("loaded settings from {:?}", settings.sources);
        Ok(settings)
    }

    /// The settings file named by `PARTMAN_SETTINGS`, or the packaged
    /// defaults with the OEM override on top
    pub fn system() -> Result<Self> {
        match std::env::var_os(SETTINGS_ENV) {
            Some(path) => Self::load(&[PathBuf::from(path)]),
            None => Self::load(&[DEFAULT_SETTINGS_FILE, OEM_SETTINGS_FILE]),
        }
    }

    pub fn from_content(content: &str) -> Result<Self> {
        let mut settings = Self::default();
        settings.merge(parse(content).map_err(|reason| SysError::SettingsParse {
            path: PathBuf::new(),
            reason,
        })?);
        Ok(settings)
    }

    /// Files that contributed, in load order
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    fn merge(&mut self, layer: Sections) {
        for (section, values) in layer {
            self.sections.entry(section).or_default().extend(values);
        }
    }

    fn raw(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        SECTIONS.iter().find_map(|section| {
            self.sections
                .get(*section)
                .and_then(|values| values.get(&key))
                .and_then(|value| value.as_deref())
        })
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.raw(key).is_some_and(|value| {
            matches!(
                value.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            )
        })
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.raw(key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn get_string(&self, key: &str) -> String {
        self.raw(key)
            .map(|value| value.trim().trim_matches('"').to_string())
            .unwrap_or_default()
    }

    /// `;`-separated list; empty items are dropped
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.raw(key)
            .map(|value| {
                value
                    .split(';')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Filesystem preselected for new partitions, ext4 when unset or unknown
    pub fn default_filesystem(&self) -> FsType {
        match FsType::parse(&self.get_string(KEY_DEFAULT_FS)) {
            FsType::Empty | FsType::Unknown => FsType::Ext4,
            fs => fs,
        }
    }

    pub fn boot_space_bytes(&self) -> u64 {
        mebibytes(self.get_int(KEY_BOOT_SPACE))
    }

    pub fn efi_space_bytes(&self) -> u64 {
        mebibytes(self.get_int(KEY_EFI_SPACE))
    }

    pub fn minimum_partition_size(&self) -> u64 {
        match mebibytes(self.get_int(KEY_MINIMUM_SIZE)) {
            0 => FALLBACK_MINIMUM_SIZE,
            size => size,
        }
    }

    pub fn partition_defaults(&self) -> PartitionDefaults {
        PartitionDefaults {
            default_filesystem: self.default_filesystem(),
            boot_space_bytes: self.boot_space_bytes(),
            efi_space_bytes: self.efi_space_bytes(),
            minimum_size_bytes: self.minimum_partition_size(),
        }
    }
}

fn parse(content: &str) -> std::result::Result<Sections, String> {
    let mut ini = Ini::new();
    // `;` separates list items, so only `#` starts a comment.
    ini.set_comment_symbols(&['#']);
    ini.read(content.to_string())
}

fn mebibytes(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0).saturating_mul(MEBIBYTE)
}

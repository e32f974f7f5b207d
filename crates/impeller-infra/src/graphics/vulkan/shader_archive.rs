// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A multi-shader archive mapping `(name, stage)` to bytecode.

use impeller_core::renderer::{ShaderError, ShaderStage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

const ARCHIVE_MAGIC: [u8; 4] = *b"IPSA";
const ARCHIVE_VERSION: u32 = 1;

/// Errors produced while reading or writing a shader archive.
#[derive(Debug, Error)]
pub enum ShaderArchiveError {
    /// The blob could not be encoded.
    #[error("Could not encode shader archive: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// The blob could not be decoded.
    #[error("Could not decode shader archive: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    /// The blob does not start with the archive magic.
    #[error("Blob is not a shader archive")]
    BadMagic,
    /// The blob was written by an incompatible version.
    #[error("Unsupported shader archive version {0}")]
    UnsupportedVersion(u32),
    /// Two entries share a name and stage.
    #[error("Duplicate shader archive entry '{name}' ({stage})")]
    DuplicateEntry {
        /// The entry name.
        name: String,
        /// The entry stage.
        stage: ShaderStage,
    },
}

impl From<ShaderArchiveError> for ShaderError {
    fn from(error: ShaderArchiveError) -> Self {
        ShaderError::ArchiveDecode(error.to_string())
    }
}

#[derive(Serialize, Deserialize)]
struct ArchiveEntry {
    name: String,
    stage: ShaderStage,
    code: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct ArchiveBlob {
    magic: [u8; 4],
    version: u32,
    entries: Vec<ArchiveEntry>,
}

/// Shader bytecode keyed by entry point name and stage.
#[derive(Debug, Clone, Default)]
pub struct ShaderArchive {
    entries: BTreeMap<(String, ShaderStage), Arc<[u8]>>,
}

impl ShaderArchive {
    /// An empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces one shader.
    pub fn add_shader(
        &mut self,
        name: impl Into<String>,
        stage: ShaderStage,
        code: impl Into<Arc<[u8]>>,
    ) -> &mut Self {
        self.entries.insert((name.into(), stage), code.into());
        self
    }

    /// Looks up a shader.
    pub fn get(&self, name: &str, stage: ShaderStage) -> Option<&Arc<[u8]>> {
        self.entries.get(&(name.to_string(), stage))
    }

    /// Iterates over `(name, stage, code)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, ShaderStage, &Arc<[u8]>)> {
        self.entries
            .iter()
            .map(|((name, stage), code)| (name.as_str(), *stage, code))
    }

    /// The number of shaders.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive holds no shader.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the archive.
    pub fn encode(&self) -> Result<Vec<u8>, ShaderArchiveError> {
        let blob = ArchiveBlob {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            entries: self
                .entries
                .iter()
                .map(|((name, stage), code)| ArchiveEntry {
                    name: name.clone(),
                    stage: *stage,
                    code: code.to_vec(),
                })
                .collect(),
        };
        Ok(bincode::serde::encode_to_vec(&blob, bincode::config::standard())?)
    }

    /// Parses an archive produced by [`ShaderArchive::encode`].
    ///
    /// ## Errors
    /// * `ShaderArchiveError::BadMagic` or `UnsupportedVersion` - If the blob
    ///   is not an archive this build understands.
    /// * `ShaderArchiveError::DuplicateEntry` - If a `(name, stage)` repeats.
    pub fn decode(bytes: &[u8]) -> Result<Self, ShaderArchiveError> {
        let (blob, _): (ArchiveBlob, _) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if blob.magic != ARCHIVE_MAGIC {
            return Err(ShaderArchiveError::BadMagic);
        }
        if blob.version != ARCHIVE_VERSION {
            return Err(ShaderArchiveError::UnsupportedVersion(blob.version));
        }

        let mut entries = BTreeMap::new();
        for entry in blob.entries {
            let key = (entry.name, entry.stage);
            if entries.contains_key(&key) {
                let (name, stage) = key;
                return Err(ShaderArchiveError::DuplicateEntry { name, stage });
            }
            entries.insert(key, Arc::from(entry.code));
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_survives_encoding() {
        // --- 1. ARRANGE ---
        let mut archive = ShaderArchive::new();
        archive
            .add_shader("solid_fill", ShaderStage::Vertex, vec![1u8, 2, 3, 4])
            .add_shader("solid_fill", ShaderStage::Fragment, vec![5u8, 6, 7, 8]);

        // --- 2. ACT ---
        let decoded = ShaderArchive::decode(&archive.encode().unwrap()).unwrap();

        // --- 3. ASSERT ---
        assert_eq!(decoded.len(), 2);
        assert_eq!(
            decoded.get("solid_fill", ShaderStage::Fragment).map(|c| c.to_vec()),
            Some(vec![5, 6, 7, 8])
        );
        assert!(decoded.get("solid_fill", ShaderStage::Compute).is_none());
    }

    #[test]
    fn test_foreign_blob_is_rejected() {
        let blob = ArchiveBlob {
            magic: *b"NOPE",
            version: ARCHIVE_VERSION,
            entries: Vec::new(),
        };
        let bytes = bincode::serde::encode_to_vec(&blob, bincode::config::standard()).unwrap();
        assert!(matches!(ShaderArchive::decode(&bytes), Err(ShaderArchiveError::BadMagic)));
        assert!(ShaderArchive::decode(&[0xff; 3]).is_err(), "Garbage must not decode");
    }

    #[test]
    fn test_duplicate_entries_are_rejected() {
        let entry = || ArchiveEntry {
            name: "blend".into(),
            stage: ShaderStage::Fragment,
            code: vec![0; 4],
        };
        let blob = ArchiveBlob {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            entries: vec![entry(), entry()],
        };
        let bytes = bincode::serde::encode_to_vec(&blob, bincode::config::standard()).unwrap();
        let error = ShaderArchive::decode(&bytes).unwrap_err();
        assert!(matches!(error, ShaderArchiveError::DuplicateEntry { .. }));
        assert!(matches!(ShaderError::from(error), ShaderError::ArchiveDecode(_)));
    }
}

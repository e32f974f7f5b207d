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

//! The driver pipeline cache and its on-disk copy.
//!
//! The file is the driver's cache blob prefixed with a header naming the
//! device that produced it. A file written for another device, by another
//! build, or damaged on disk is discarded and the cache starts empty.

use super::create_info::GraphicsPipelineDescriptionVK;
use super::device_holder::{with_device, DeviceHolderVK};
use super::driver::VkResult;
use ash::vk;
use impeller_core::validation_log;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use thiserror::Error;

/// The cache file name inside the cache directory.
pub const PIPELINE_CACHE_FILE_NAME: &str = "impeller.pipeline_cache";

const CACHE_MAGIC: [u8; 8] = *b"IMPLRPSO";
const CACHE_ABI_VERSION: u32 = 1;

/// Errors of the on-disk pipeline cache.
#[derive(Debug, Error)]
pub enum PipelineCacheError {
    /// Reading or writing the file failed.
    #[error("Pipeline cache I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The header could not be encoded.
    #[error("Could not encode the pipeline cache header: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    /// The header could not be decoded.
    #[error("Could not decode the pipeline cache header: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    /// The file is not a pipeline cache.
    #[error("Pipeline cache has an unknown magic number")]
    BadMagic,
    /// The file was written by an incompatible build.
    #[error("Pipeline cache ABI {found} does not match {expected}")]
    AbiMismatch {
        /// The ABI in the file.
        found: u32,
        /// The ABI of this build.
        expected: u32,
    },
    /// The file was written for another device or driver.
    #[error("Pipeline cache was written for another device: {0}")]
    DeviceMismatch(String),
    /// The payload is shorter or longer than the header says.
    #[error("Pipeline cache payload has {found} bytes, expected {expected}")]
    SizeMismatch {
        /// Bytes after the header.
        found: u64,
        /// Bytes the header announces.
        expected: u64,
    },
    /// The payload does not match its digest.
    #[error("Pipeline cache payload is corrupt")]
    DigestMismatch,
    /// The driver failed.
    #[error("Driver error: {0}")]
    Driver(#[from] vk::Result),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CacheHeader {
    magic: [u8; 8],
    abi: u32,
    vendor_id: u32,
    device_id: u32,
    driver_version: u32,
    uuid: [u8; 16],
    payload_size: u64,
    digest: [u8; 32],
}

impl CacheHeader {
    fn new(properties: &vk::PhysicalDeviceProperties, payload: &[u8]) -> Self {
        Self {
            magic: CACHE_MAGIC,
            abi: CACHE_ABI_VERSION,
            vendor_id: properties.vendor_id,
            device_id: properties.device_id,
            driver_version: properties.driver_version,
            uuid: properties.pipeline_cache_uuid,
            payload_size: payload.len() as u64,
            digest: *blake3::hash(payload).as_bytes(),
        }
    }

    fn check(
        &self,
        properties: &vk::PhysicalDeviceProperties,
        payload: &[u8],
    ) -> Result<(), PipelineCacheError> {
        if self.magic != CACHE_MAGIC {
            return Err(PipelineCacheError::BadMagic);
        }
        if self.abi != CACHE_ABI_VERSION {
            return Err(PipelineCacheError::AbiMismatch {
                found: self.abi,
                expected: CACHE_ABI_VERSION,
            });
        }
        if self.vendor_id != properties.vendor_id
            || self.device_id != properties.device_id
            || self.driver_version != properties.driver_version
            || self.uuid != properties.pipeline_cache_uuid
        {
            return Err(PipelineCacheError::DeviceMismatch(format!(
                "vendor {:#x} device {:#x} driver {}",
                self.vendor_id, self.device_id, self.driver_version
            )));
        }
        if self.payload_size != payload.len() as u64 {
            return Err(PipelineCacheError::SizeMismatch {
                found: payload.len() as u64,
                expected: self.payload_size,
            });
        }
        if self.digest != *blake3::hash(payload).as_bytes() {
            return Err(PipelineCacheError::DigestMismatch);
        }
        Ok(())
    }
}

/// Prefixes the driver blob with a header for `properties`.
fn encode_cache_file(
    properties: &vk::PhysicalDeviceProperties,
    payload: &[u8],
) -> Result<Vec<u8>, PipelineCacheError> {
    let header = CacheHeader::new(properties, payload);
    let mut bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())?;
    bytes.extend_from_slice(payload);
    Ok(bytes)
}

/// Returns the driver blob if the file was written for `properties`.
fn decode_cache_file<'a>(
    properties: &vk::PhysicalDeviceProperties,
    bytes: &'a [u8],
) -> Result<&'a [u8], PipelineCacheError> {
    let (header, consumed): (CacheHeader, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    let payload = &bytes[consumed..];
    header.check(properties, payload)?;
    Ok(payload)
}

/// Writes `bytes` to a sibling file and renames it over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PipelineCacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, bytes)?;
    if let Err(error) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(error.into());
    }
    Ok(())
}

/// The driver pipeline cache of one device.
///
/// Pipeline creation only takes the read lock, so compilations proceed in
/// parallel. Persisting takes the write lock to serialize a stable snapshot.
#[derive(Debug)]
pub struct PipelineCacheVK {
    device: Weak<DeviceHolderVK>,
    properties: vk::PhysicalDeviceProperties,
    cache_path: Option<PathBuf>,
    cache: RwLock<vk::PipelineCache>,
}

impl PipelineCacheVK {
    /// Creates the cache, seeded from `cache_directory` if a usable file is
    /// there.
    ///
    /// ## Errors
    /// * `PipelineCacheError::Driver` - If not even an empty cache could be
    ///   created. A bad file alone never fails construction.
    pub fn new(
        device: &Arc<DeviceHolderVK>,
        cache_directory: Option<&Path>,
    ) -> Result<Self, PipelineCacheError> {
        let driver = device.driver();
        let properties = driver.physical_device_properties();
        let cache_path = cache_directory.map(|dir| dir.join(PIPELINE_CACHE_FILE_NAME));

        let initial = cache_path
            .as_deref()
            .and_then(|path| Self::read_cache_file(path, &properties))
            .unwrap_or_default();

        let cache = match driver.create_pipeline_cache(device.device(), &initial) {
            Ok(cache) => cache,
            Err(error) if !initial.is_empty() => {
                validation_log!("Driver rejected the pipeline cache ({error}). Starting empty.");
                driver.create_pipeline_cache(device.device(), &[])?
            }
            Err(error) => return Err(error.into()),
        };
        log::info!(
            "Pipeline cache created with {} bytes of seed data (file: {:?}).",
            initial.len(),
            cache_path
        );

        Ok(Self {
            device: Arc::downgrade(device),
            properties,
            cache_path,
            cache: RwLock::new(cache),
        })
    }

    fn read_cache_file(path: &Path, properties: &vk::PhysicalDeviceProperties) -> Option<Vec<u8>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                log::debug!("No pipeline cache at {}.", path.display());
                return None;
            }
            Err(error) => {
                validation_log!("Could not read pipeline cache {}: {error}", path.display());
                return None;
            }
        };
        match decode_cache_file(properties, &bytes) {
            Ok(payload) => Some(payload.to_vec()),
            Err(error) => {
                validation_log!("Discarding pipeline cache {}: {error}", path.display());
                None
            }
        }
    }

    /// Where the cache is persisted, if anywhere.
    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    /// Creates a graphics pipeline through the cache.
    pub fn create_pipeline(
        &self,
        info: &GraphicsPipelineDescriptionVK,
    ) -> VkResult<(vk::Pipeline, vk::PipelineCreationFeedback)> {
        let device = self.device.upgrade().ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        device.driver().create_graphics_pipeline(device.device(), *cache, info)
    }

    /// Writes the current cache contents to disk, replacing the previous
    /// file atomically. Does nothing without a cache directory.
    pub fn persist_to_disk(&self) -> Result<(), PipelineCacheError> {
        let Some(path) = &self.cache_path else {
            return Ok(());
        };
        let device = self.device.upgrade().ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        let payload = {
            let cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            device.driver().get_pipeline_cache_data(device.device(), *cache)?
        };
        let bytes = encode_cache_file(&self.properties, &payload)?;
        write_atomically(path, &bytes)?;
        log::debug!(
            "Persisted {} bytes of pipeline cache to {}.",
            bytes.len(),
            path.display()
        );
        Ok(())
    }
}

impl Drop for PipelineCacheVK {
    fn drop(&mut self) {
        let cache = *self.cache.get_mut().unwrap_or_else(PoisonError::into_inner);
        with_device(&self.device, |device| {
            device.driver().destroy_pipeline_cache(device.device(), cache);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::software_driver::{DeviceProfile, SoftwareDriver};
    use crate::graphics::vulkan::driver::VulkanDriver;

    fn properties() -> vk::PhysicalDeviceProperties {
        SoftwareDriver::default().physical_device_properties()
    }

    #[test]
    fn test_header_accepts_its_own_device() {
        let payload = b"driver cache bytes".to_vec();
        let bytes = encode_cache_file(&properties(), &payload).unwrap();
        assert_eq!(decode_cache_file(&properties(), &bytes).unwrap(), payload.as_slice());
    }

    #[test]
    fn test_header_rejects_another_device() {
        let bytes = encode_cache_file(&properties(), b"payload").unwrap();
        let mut other = DeviceProfile::default().properties;
        other.device_id += 1;
        assert!(matches!(
            decode_cache_file(&other, &bytes),
            Err(PipelineCacheError::DeviceMismatch(_))
        ));
    }

    #[test]
    fn test_flipped_payload_byte_is_detected() {
        // --- 1. ARRANGE ---
        let mut bytes = encode_cache_file(&properties(), &[7u8; 64]).unwrap();

        // --- 2. ACT ---
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        // --- 3. ASSERT ---
        assert!(matches!(
            decode_cache_file(&properties(), &bytes),
            Err(PipelineCacheError::DigestMismatch)
        ));
    }

    #[test]
    fn test_truncated_file_is_rejected() {
        let bytes = encode_cache_file(&properties(), &[1u8; 32]).unwrap();
        let truncated = &bytes[..bytes.len() - 4];
        assert!(matches!(
            decode_cache_file(&properties(), truncated),
            Err(PipelineCacheError::SizeMismatch { found: 28, expected: 32 })
        ));
    }

    #[test]
    fn test_atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(PIPELINE_CACHE_FILE_NAME);

        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert!(
            !path.with_extension("tmp").exists(),
            "The temporary file should be renamed away"
        );
    }
}

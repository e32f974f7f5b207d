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

//! Configuration for creating a rendering context.

use std::path::PathBuf;

/// How long the process-wide graphics instance is kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InstanceRetention {
    /// The instance is destroyed with the last context that uses it.
    #[default]
    ReleaseWithLastContext,
    /// The instance is created once and lives until process exit. Some
    /// drivers misbehave when unloaded and reloaded in the same process.
    KeepAliveForProcess,
}

/// Known driver bugs to work around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Workarounds {
    /// Subpass self-dependencies crash or misrender on this driver.
    /// Disables framebuffer fetch.
    pub input_attachment_self_dependency_broken: bool,
    /// Never back device-transient textures with memoryless storage.
    pub disable_memoryless_textures: bool,
}

/// Settings used when creating a context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    /// Number of pipeline compilation worker threads.
    pub worker_count: usize,
    /// Where the pipeline cache is persisted. `None` disables persistence.
    pub cache_directory: Option<PathBuf>,
    /// Enables driver validation layers when available.
    pub enable_validation: bool,
    /// Lifetime policy of the process-wide instance.
    pub instance_retention: InstanceRetention,
    /// Driver workarounds.
    pub workarounds: Workarounds,
    /// Descriptor sets per backing pool of a descriptor pool.
    pub max_sets_per_pool: u32,
    /// The size of one block of the host-visible buffer pool, in bytes.
    pub buffer_pool_block_size: u64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get().clamp(1, 4))
                .unwrap_or(2),
            cache_directory: None,
            enable_validation: cfg!(debug_assertions),
            instance_retention: InstanceRetention::ReleaseWithLastContext,
            workarounds: Workarounds::default(),
            max_sets_per_pool: 64,
            buffer_pool_block_size: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ContextSettings::default();
        assert!(settings.worker_count >= 1);
        assert!(settings.cache_directory.is_none());
        assert!(!settings.workarounds.input_attachment_self_dependency_broken);
        assert_eq!(
            settings.instance_retention,
            InstanceRetention::ReleaseWithLastContext
        );
    }
}

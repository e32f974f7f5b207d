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

//! # Impeller Infra
//!
//! Concrete backends for the contracts defined in `impeller-core`.
//!
//! The only backend is the Vulkan family one, written against the
//! [`VulkanDriver`](graphics::vulkan::VulkanDriver) entry points.
//! [`AshDriver`](graphics::vulkan::AshDriver) implements them on the system
//! Vulkan loader. The `software-driver` feature adds a deterministic
//! `SoftwareDriver` that runs the backend entirely on the host.

#![warn(missing_docs)]

pub mod graphics;

pub use graphics::vulkan::ContextVK;

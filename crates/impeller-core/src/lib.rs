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

//! # Impeller Core
//!
//! Foundational crate containing the numeric primitives, descriptors, traits
//! and interface contracts shared by every rendering backend.

#![warn(missing_docs)]

pub mod math;
pub mod memory;
pub mod renderer;
pub mod task;
pub mod validation;

pub use task::{ConcurrentTaskRunner, TaskRunner};

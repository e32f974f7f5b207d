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

//! Retires submitted work once the GPU is done with it.
//!
//! Every submission hands its fence and a release callback to the waiter. A
//! background thread waits on the fences in submission order, destroys each
//! one and then runs its callback, which drops the objects the submission
//! used.

use super::device_holder::DeviceHolderVK;
use ash::vk;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

type ReleaseCallback = Box<dyn FnOnce() + Send + 'static>;

struct WaitRequest {
    fence: vk::Fence,
    on_signaled: ReleaseCallback,
}

/// Waits on submission fences on a dedicated thread.
///
/// The thread keeps the device alive until [`terminate`](Self::terminate)
/// returns.
#[derive(Debug)]
pub struct FenceWaiterVK {
    device: Weak<DeviceHolderVK>,
    sender: Mutex<Option<flume::Sender<WaitRequest>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<AtomicUsize>,
}

impl FenceWaiterVK {
    /// Starts the waiter thread.
    ///
    /// ## Errors
    /// Returns the OS error if the thread could not be spawned.
    pub fn new(device: &Arc<DeviceHolderVK>) -> std::io::Result<Self> {
        let (sender, receiver) = flume::unbounded::<WaitRequest>();
        let pending = Arc::new(AtomicUsize::new(0));

        let thread_device = device.clone();
        let thread_pending = pending.clone();
        let thread = thread::Builder::new()
            .name("impeller.fence_waiter".to_string())
            .spawn(move || {
                log::debug!("Fence waiter started.");
                // Ends once every sender is gone and the queue is drained.
                while let Ok(request) = receiver.recv() {
                    retire(&thread_device, request);
                    thread_pending.fetch_sub(1, Ordering::AcqRel);
                }
                log::debug!("Fence waiter stopped.");
            })?;

        Ok(Self {
            device: Arc::downgrade(device),
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            pending,
        })
    }

    /// Runs `on_signaled` once `fence` signals, then forgets the fence.
    ///
    /// After [`terminate`](Self::terminate) the wait happens on the calling
    /// thread.
    pub fn add_fence(&self, fence: vk::Fence, on_signaled: impl FnOnce() + Send + 'static) {
        let request = WaitRequest {
            fence,
            on_signaled: Box::new(on_signaled),
        };
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            log::debug!("Fence waiter terminated, waiting for {fence:?} inline.");
            self.retire_inline(request);
            return;
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        if let Err(flume::SendError(request)) = sender.send(request) {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            self.retire_inline(request);
        }
    }

    fn retire_inline(&self, request: WaitRequest) {
        match self.device.upgrade() {
            Some(device) => retire(&device, request),
            // The fence went away with its device.
            None => (request.on_signaled)(),
        }
    }

    /// The number of fences not yet retired.
    pub fn pending_fences(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Retires every queued fence and stops the thread. Idempotent.
    pub fn terminate(&self) {
        // Dropping the sender lets the thread drain the queue and exit.
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());
        let thread = self.thread.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                log::error!("Fence waiter thread panicked.");
            }
        }
    }
}

impl Drop for FenceWaiterVK {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn retire(device: &DeviceHolderVK, request: WaitRequest) {
    let driver = device.driver();
    if let Err(error) = driver.wait_for_fence(device.device(), request.fence) {
        log::error!("Waiting for fence {:?} failed: {error}", request.fence);
    }
    driver.destroy_fence(device.device(), request.fence);
    (request.on_signaled)();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::vulkan::driver::{VulkanDriver, KHR_SWAPCHAIN};
    use crate::graphics::vulkan::instance::InstanceRegistry;
    use crate::graphics::vulkan::software_driver::SoftwareDriver;
    use impeller_core::renderer::InstanceRetention;
    use std::sync::atomic::AtomicBool;

    fn setup() -> (Arc<SoftwareDriver>, Arc<DeviceHolderVK>) {
        let driver = Arc::new(SoftwareDriver::default());
        let dyn_driver: Arc<dyn VulkanDriver> = driver.clone();
        let instance = InstanceRegistry::new().acquire(
            &dyn_driver,
            false,
            InstanceRetention::ReleaseWithLastContext,
        );
        let device = Arc::new(DeviceHolderVK::create(instance, &[KHR_SWAPCHAIN]).unwrap());
        (driver, device)
    }

    fn submit(device: &DeviceHolderVK) -> (vk::CommandBuffer, vk::Fence) {
        let driver = device.driver();
        let command_buffer = driver.allocate_command_buffer(device.device()).unwrap();
        let fence = driver.queue_submit(device.device(), command_buffer).unwrap();
        (command_buffer, fence)
    }

    #[test]
    fn test_callback_runs_after_the_fence_signals() {
        // --- 1. ARRANGE ---
        let (driver, device) = setup();
        let waiter = FenceWaiterVK::new(&device).unwrap();
        let (command_buffer, fence) = submit(&device);
        let released = Arc::new(AtomicBool::new(false));

        // --- 2. ACT ---
        let weak_device = Arc::downgrade(&device);
        let flag = released.clone();
        waiter.add_fence(fence, move || {
            if let Some(device) = weak_device.upgrade() {
                device.driver().free_command_buffer(device.device(), command_buffer);
            }
            flag.store(true, Ordering::Release);
        });
        waiter.terminate();

        // --- 3. ASSERT ---
        assert!(released.load(Ordering::Acquire));
        assert_eq!(waiter.pending_fences(), 0);
        let stats = driver.stats();
        assert_eq!(stats.fences_waited, 1);
        assert_eq!(stats.objects_destroyed_in_flight, 0);
        assert_eq!(driver.pending_submissions(), 0);
    }

    #[test]
    fn test_fences_added_after_terminate_are_waited_inline() {
        let (driver, device) = setup();
        let waiter = FenceWaiterVK::new(&device).unwrap();
        waiter.terminate();
        let (_command_buffer, fence) = submit(&device);
        let released = Arc::new(AtomicBool::new(false));

        let flag = released.clone();
        waiter.add_fence(fence, move || flag.store(true, Ordering::Release));

        assert!(released.load(Ordering::Acquire), "The callback must run before returning");
        assert_eq!(driver.stats().fences_waited, 1);
    }

    #[test]
    fn test_terminate_drains_every_queued_fence() {
        // --- 1. ARRANGE ---
        let (driver, device) = setup();
        let waiter = FenceWaiterVK::new(&device).unwrap();
        let retired = Arc::new(AtomicUsize::new(0));

        // --- 2. ACT ---
        for _ in 0..8 {
            let (_command_buffer, fence) = submit(&device);
            let retired = retired.clone();
            waiter.add_fence(fence, move || {
                retired.fetch_add(1, Ordering::AcqRel);
            });
        }
        waiter.terminate();
        waiter.terminate();

        // --- 3. ASSERT ---
        assert_eq!(retired.load(Ordering::Acquire), 8);
        assert_eq!(driver.stats().fences_waited, 8);
        assert_eq!(driver.pending_submissions(), 0);
    }
}

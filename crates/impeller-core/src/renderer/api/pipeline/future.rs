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

//! A shared, single-assignment handle to a pipeline that is being compiled.
//!
//! [`pipeline_promise`] creates a connected [`PipelinePromise`] and
//! [`PipelineFuture`]. The promise is fulfilled exactly once, with either the
//! realized pipeline or `None` on failure. Every clone of the future
//! observes the same value.
//!
//! A future can be consumed three ways: [`PipelineFuture::wait`] blocks the
//! calling thread, [`PipelineFuture::try_get`] polls without blocking, and
//! the [`std::future::Future`] implementation integrates with executors.

use crate::renderer::traits::Pipeline;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// The value a pipeline future resolves to. `None` means compilation failed
/// or the feature is unavailable.
pub type PipelineResult = Option<Arc<dyn Pipeline>>;

enum Slot {
    Pending(Vec<Waker>),
    Ready(PipelineResult),
}

struct Shared {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking waiter cannot leave the slot half-written.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The read side: a clonable handle resolving to a [`PipelineResult`].
#[derive(Clone)]
pub struct PipelineFuture {
    shared: Arc<Shared>,
}

/// The write side: fulfills the connected futures.
#[derive(Clone)]
pub struct PipelinePromise {
    shared: Arc<Shared>,
}

/// Creates a connected promise and future.
pub fn pipeline_promise() -> (PipelinePromise, PipelineFuture) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending(Vec::new())),
        ready: Condvar::new(),
    });
    (
        PipelinePromise {
            shared: shared.clone(),
        },
        PipelineFuture { shared },
    )
}

impl PipelineFuture {
    /// A future that is already resolved to `value`.
    pub fn ready(value: PipelineResult) -> Self {
        let (promise, future) = pipeline_promise();
        promise.fulfill(value);
        future
    }

    /// Returns `true` once the promise has been fulfilled.
    pub fn is_ready(&self) -> bool {
        matches!(*self.shared.lock(), Slot::Ready(_))
    }

    /// Returns the value if the promise has been fulfilled, without blocking.
    pub fn try_get(&self) -> Option<PipelineResult> {
        match &*self.shared.lock() {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Blocks the calling thread until the promise is fulfilled.
    pub fn wait(&self) -> PipelineResult {
        let mut slot = self.shared.lock();
        loop {
            if let Slot::Ready(value) = &*slot {
                return value.clone();
            }
            slot = self
                .shared
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`PipelineFuture::wait`], but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PipelineResult> {
        let slot = self.shared.lock();
        let (slot, _) = self
            .shared
            .ready
            .wait_timeout_while(slot, timeout, |s| matches!(s, Slot::Pending(_)))
            .unwrap_or_else(PoisonError::into_inner);
        match &*slot {
            Slot::Ready(value) => Some(value.clone()),
            Slot::Pending(_) => None,
        }
    }

    /// Returns `true` if both handles observe the same promise.
    pub fn same_as(&self, other: &PipelineFuture) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Future for PipelineFuture {
    type Output = PipelineResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.shared.lock();
        match &mut *slot {
            Slot::Ready(value) => Poll::Ready(value.clone()),
            Slot::Pending(wakers) => {
                if !wakers.iter().any(|w| w.will_wake(cx.waker())) {
                    wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

impl fmt::Debug for PipelineFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl PipelinePromise {
    /// Fulfills the promise.
    ///
    /// Only the first call has an effect; later calls return `false` and
    /// leave the stored value untouched.
    pub fn fulfill(&self, value: PipelineResult) -> bool {
        let wakers = {
            let mut slot = self.shared.lock();
            match std::mem::replace(&mut *slot, Slot::Ready(None)) {
                Slot::Pending(wakers) => {
                    *slot = Slot::Ready(value);
                    wakers
                }
                ready @ Slot::Ready(_) => {
                    *slot = ready;
                    return false;
                }
            }
        };
        self.shared.ready.notify_all();
        for waker in wakers {
            waker.wake();
        }
        true
    }

    /// Returns `true` once the promise has been fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.shared.lock(), Slot::Ready(_))
    }
}

impl fmt::Debug for PipelinePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePromise")
            .field("fulfilled", &self.is_fulfilled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::pipeline::PipelineDescriptor;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::Wake;
    use std::thread;

    #[derive(Debug)]
    struct FakePipeline {
        descriptor: PipelineDescriptor,
    }

    impl Pipeline for FakePipeline {
        fn descriptor(&self) -> &PipelineDescriptor {
            &self.descriptor
        }
        fn is_valid(&self) -> bool {
            true
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn fake() -> Arc<dyn Pipeline> {
        Arc::new(FakePipeline {
            descriptor: PipelineDescriptor::new(),
        })
    }

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fulfill_is_idempotent() {
        let (promise, future) = pipeline_promise();
        let pipeline = fake();

        assert!(promise.fulfill(Some(pipeline.clone())));
        assert!(!promise.fulfill(None), "Second fulfillment must be ignored");

        let value = future.wait().expect("pipeline");
        assert!(Arc::ptr_eq(&value, &pipeline));
    }

    #[test]
    fn wait_blocks_until_fulfilled_on_another_thread() {
        let (promise, future) = pipeline_promise();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let future = future.clone();
                thread::spawn(move || future.wait().is_some())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        assert!(!future.is_ready());
        promise.fulfill(Some(fake()));

        for waiter in waiters {
            assert!(waiter.join().unwrap());
        }
    }

    #[test]
    fn ready_future_resolves_immediately() {
        let future = PipelineFuture::ready(None);
        assert!(future.is_ready());
        assert_eq!(future.try_get().map(|v| v.is_none()), Some(true));
    }

    #[test]
    fn wait_timeout_expires_when_pending() {
        let (_promise, future) = pipeline_promise();
        assert!(future.wait_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn poll_registers_waker_and_wakes_on_fulfill() {
        let (promise, mut future) = pipeline_promise();
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut future).poll(&mut cx).is_pending());
        promise.fulfill(None);

        assert_eq!(counter.0.load(Ordering::SeqCst), 1, "Waker registered once");
        assert!(matches!(Pin::new(&mut future).poll(&mut cx), Poll::Ready(None)));
    }

    #[test]
    fn clones_share_state() {
        let (_promise, future) = pipeline_promise();
        let other = future.clone();
        assert!(future.same_as(&other));
        assert!(!future.same_as(&PipelineFuture::ready(None)));
    }
}

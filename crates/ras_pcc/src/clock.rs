//! Time Source
//!
//! PCC command completion polling and the subspace timing limits need a monotonic time source and a way to wait.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::time::Duration;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// Monotonic time source.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for `duration`.
    fn stall(&self, duration: Duration);
}

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "std"))] {
        /// Clock backed by the operating system monotonic clock.
        pub struct StdClock {
            origin: std::time::Instant,
        }

        impl StdClock {
            pub fn new() -> Self {
                Self { origin: std::time::Instant::now() }
            }
        }

        impl Default for StdClock {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Clock for StdClock {
            fn now(&self) -> Duration {
                self.origin.elapsed()
            }

            fn stall(&self, duration: Duration) {
                std::thread::sleep(duration);
            }
        }
    }
}

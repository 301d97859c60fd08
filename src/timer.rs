use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// A callback scheduled on the local executor. Dropping the timer cancels it.
///
/// Every timer lives on a `tokio::task::LocalSet`; creating one outside of it panics.
pub struct Timer {
	handle: AbortHandle,
}

impl Timer {
	pub fn after(delay: Duration, func: impl FnOnce() + 'static) -> Self {
		let handle = tokio::task::spawn_local(async move {
			tokio::time::sleep(delay).await;
			func();
		})
		.abort_handle();

		Timer { handle }
	}

	/// Runs `func` every `period` until it returns `false`.
	pub fn every(period: Duration, mut func: impl FnMut() -> bool + 'static) -> Self {
		let handle = tokio::task::spawn_local(async move {
			loop {
				tokio::time::sleep(period).await;
				if !func() {
					break;
				}
			}
		})
		.abort_handle();

		Timer { handle }
	}
}

impl Drop for Timer {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

pub(crate) fn spawn(future: impl Future<Output = ()> + 'static) {
	drop(tokio::task::spawn_local(future));
}

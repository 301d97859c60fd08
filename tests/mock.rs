#![allow(dead_code)]

use std::cell::{RefCell, RefMut};
use std::future::Future;
use std::rc::Rc;

use mockall::*;
use tokio::task::LocalSet;

#[automock]
pub trait Spy {
	fn trigger(&self, value: u64);
	fn seen(&self, label: String);
}

#[derive(Clone)]
pub struct SharedMock(Rc<RefCell<MockSpy>>);

impl SharedMock {
	pub fn new() -> SharedMock {
		SharedMock(Rc::new(RefCell::new(MockSpy::new())))
	}

	pub fn get(&self) -> RefMut<'_, MockSpy> {
		self.0.borrow_mut()
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_test_writer()
		.with_max_level(tracing::Level::DEBUG)
		.try_init();
}

/// Runs `future` on a local set, where caches and timers live.
pub async fn local<F: Future>(future: F) -> F::Output {
	init_tracing();
	LocalSet::new().run_until(future).await
}

/// Lets spawned drivers and pushes run to completion.
pub async fn flush() {
	for _ in 0..16 {
		tokio::task::yield_now().await;
	}
}

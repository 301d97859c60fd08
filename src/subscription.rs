use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::time::Instant;

use crate::timer::Timer;

/// Cleanup returned by an effect.
pub type Teardown = Box<dyn FnOnce()>;

pub type Equality<S> = Rc<dyn Fn(&S, &S) -> bool>;

/// Keeps a listener or an effect registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
	cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
	pub(crate) fn new(cancel: impl FnOnce() + 'static) -> Self {
		Subscription {
			cancel: Some(Box::new(cancel)),
		}
	}

	pub fn cancel(self) {
		drop(self)
	}

	/// Leaves the listener registered for as long as the store lives.
	pub fn forget(mut self) {
		self.cancel = None;
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(cancel) = self.cancel.take() {
			cancel()
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("active", &self.cancel.is_some())
			.finish()
	}
}

pub struct SubscribeOptions<S> {
	/// Deliver the current value right away.
	pub run_now: bool,
	pub throttle: Option<Duration>,
	pub debounce: Option<Duration>,
	/// Skip deliveries that are equal to the last delivered value.
	/// `None` delivers on every notification; `subscribe` and
	/// `subscribe_selector` compare with `PartialEq`.
	pub equals: Option<Equality<S>>,
	/// Label used in logs.
	pub tag: Option<&'static str>,
}

impl<S> Default for SubscribeOptions<S> {
	fn default() -> Self {
		SubscribeOptions {
			run_now: true,
			throttle: None,
			debounce: None,
			equals: None,
			tag: None,
		}
	}
}

impl<S> Clone for SubscribeOptions<S> {
	fn clone(&self) -> Self {
		SubscribeOptions {
			run_now: self.run_now,
			throttle: self.throttle,
			debounce: self.debounce,
			equals: self.equals.clone(),
			tag: self.tag,
		}
	}
}

impl<S: 'static> SubscribeOptions<S> {
	pub fn run_now(mut self, run_now: bool) -> Self {
		self.run_now = run_now;
		self
	}

	pub fn throttle(mut self, period: Duration) -> Self {
		self.throttle = Some(period);
		self
	}

	pub fn debounce(mut self, period: Duration) -> Self {
		self.debounce = Some(period);
		self
	}

	pub fn equals(mut self, equals: impl Fn(&S, &S) -> bool + 'static) -> Self {
		self.equals = Some(Rc::new(equals));
		self
	}

	pub fn strict(self) -> Self
	where
		S: PartialEq,
	{
		self.equals(|a, b| a == b)
	}

	pub fn tag(mut self, tag: &'static str) -> Self {
		self.tag = Some(tag);
		self
	}

	/// Puts the rate limiting configured in these options in front of `listener`.
	pub(crate) fn wrap(&self, listener: impl Fn(&S) + 'static) -> Rc<dyn Fn(&S)>
	where
		S: Clone,
	{
		let mut listener: Rc<dyn Fn(&S)> = Rc::new(listener);
		if let Some(period) = self.debounce {
			listener = debounced(listener, period);
		}
		if let Some(period) = self.throttle {
			listener = throttled(listener, period);
		}
		listener
	}
}

fn debounced<S: Clone + 'static>(listener: Rc<dyn Fn(&S)>, period: Duration) -> Rc<dyn Fn(&S)> {
	let slot: Rc<RefCell<Option<Timer>>> = Rc::new(RefCell::new(None));

	Rc::new(move |value: &S| {
		let value = value.clone();
		let listener = listener.clone();
		let weak = Rc::downgrade(&slot);

		let timer = Timer::after(period, move || {
			if let Some(slot) = weak.upgrade() {
				let _fired = slot.borrow_mut().take();
			}
			listener(&value)
		});

		*slot.borrow_mut() = Some(timer);
	})
}

struct Throttle<S> {
	last: Cell<Option<Instant>>,
	pending: RefCell<Option<S>>,
	timer: RefCell<Option<Timer>>,
}

fn throttled<S: Clone + 'static>(listener: Rc<dyn Fn(&S)>, period: Duration) -> Rc<dyn Fn(&S)> {
	let state = Rc::new(Throttle {
		last: Cell::new(None),
		pending: RefCell::new(None),
		timer: RefCell::new(None),
	});

	Rc::new(move |value: &S| {
		let now = Instant::now();
		let elapsed = state.last.get().map(|last| now.duration_since(last));
		let waiting = state.timer.borrow().is_some();

		if !waiting && elapsed.map_or(true, |elapsed| elapsed >= period) {
			state.last.set(Some(now));
			listener(value);
			return;
		}

		*state.pending.borrow_mut() = Some(value.clone());
		if waiting {
			return;
		}

		let wait = period.saturating_sub(elapsed.unwrap_or_default());
		let weak = Rc::downgrade(&state);
		let listener = listener.clone();

		let timer = Timer::after(wait, move || {
			let Some(state) = weak.upgrade() else {
				return;
			};
			let _fired = state.timer.borrow_mut().take();
			let pending = state.pending.borrow_mut().take();
			if let Some(value) = pending {
				state.last.set(Some(Instant::now()));
				listener(&value);
			}
		});

		*state.timer.borrow_mut() = Some(timer);
	})
}

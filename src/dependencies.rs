use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::Addr;
use crate::store::Store;
use crate::subscription::Subscription;
use crate::tracked::Tracked;

/// Something a computation can be based on and that can be told to start over.
pub(crate) trait Invalidate {
	fn invalidate(&self, recursive: bool);
	fn clear(&self, recursive: bool);
}

pub(crate) type Listen = Box<dyn Fn(Rc<dyn Fn()>) -> Subscription>;

/// One store read during a computation.
pub struct Dependency {
	pub(crate) addr: Addr,
	check: Box<dyn Fn() -> bool>,
	listen: Listen,
	source: Weak<dyn Invalidate>,
}

impl Dependency {
	pub(crate) fn on_store<U>(store: &Store<U>, tracked: Tracked<U>) -> Self
	where
		U: Clone + 'static,
	{
		let source = store.clone();
		let target = store.clone();

		Dependency {
			addr: store.addr(),
			check: Box::new(move || match source.try_get() {
				Ok(value) => tracked.equals(&value),
				Err(_) => false,
			}),
			listen: Box::new(move |callback| target.on_change(callback)),
			source: store.as_invalidate(),
		}
	}

	pub(crate) fn custom(
		addr: Addr,
		check: impl Fn() -> bool + 'static,
		listen: Listen,
		source: Weak<dyn Invalidate>,
	) -> Self {
		Dependency {
			addr,
			check: Box::new(check),
			listen,
			source,
		}
	}

	pub fn is_valid(&self) -> bool {
		(self.check)()
	}
}

pub(crate) type BasedOn = Rc<SmallVec<[Dependency; 4]>>;

/// The reads behind the current value of a computation, and the
/// subscriptions that report changes to them while someone is listening.
pub struct Dependencies {
	based_on: BasedOn,
	subscriptions: SmallVec<[Subscription; 4]>,
	valid: bool,
}

impl Default for Dependencies {
	fn default() -> Self {
		Dependencies::new()
	}
}

impl Dependencies {
	/// Nothing has been computed yet.
	pub fn new() -> Self {
		Dependencies {
			based_on: Rc::new(SmallVec::new()),
			subscriptions: SmallVec::new(),
			valid: false,
		}
	}

	/// A value that does not depend on anything, like one that was set by hand.
	pub fn pinned() -> Self {
		Dependencies {
			valid: true,
			..Dependencies::new()
		}
	}

	pub(crate) fn computed(based_on: SmallVec<[Dependency; 4]>) -> Self {
		Dependencies {
			based_on: Rc::new(based_on),
			subscriptions: SmallVec::new(),
			valid: true,
		}
	}

	pub fn len(&self) -> usize {
		self.based_on.len()
	}

	pub fn is_empty(&self) -> bool {
		self.based_on.is_empty()
	}

	/// The current reads, or `None` when the value must be recomputed anyway.
	pub(crate) fn snapshot(&self) -> Option<BasedOn> {
		self.valid.then(|| self.based_on.clone())
	}

	pub(crate) fn are_valid(based_on: &[Dependency]) -> bool {
		based_on.iter().all(Dependency::is_valid)
	}

	pub fn is_listening(&self) -> bool {
		!self.subscriptions.is_empty()
	}

	pub(crate) fn based_on(&self) -> BasedOn {
		self.based_on.clone()
	}

	pub(crate) fn listen_to(
		based_on: &[Dependency],
		callback: &Rc<dyn Fn()>,
	) -> SmallVec<[Subscription; 4]> {
		based_on
			.iter()
			.map(|dependency| (dependency.listen)(callback.clone()))
			.collect()
	}

	pub(crate) fn set_subscriptions(&mut self, subscriptions: SmallVec<[Subscription; 4]>) {
		self.subscriptions = subscriptions;
	}

	/// Hands back the subscriptions so the caller can drop them outside of any borrow.
	pub(crate) fn unlisten(&mut self) -> SmallVec<[Subscription; 4]> {
		std::mem::take(&mut self.subscriptions)
	}

	pub fn invalidate(&mut self) {
		self.valid = false;
	}

	/// Installs `next` and returns the previous set. Dropping the previous set
	/// after `next` is listening keeps shared sources subscribed throughout.
	pub(crate) fn swap(&mut self, next: Dependencies) -> Dependencies {
		std::mem::replace(self, next)
	}

	pub(crate) fn sources(based_on: &[Dependency]) -> SmallVec<[Rc<dyn Invalidate>; 4]> {
		based_on
			.iter()
			.filter_map(|dependency| dependency.source.upgrade())
			.collect()
	}
}

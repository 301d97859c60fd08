use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::addr::Addr;
use crate::dependencies::{Dependencies, Dependency, Invalidate};
use crate::error::Error;
use crate::store::Store;
use crate::subscription::Subscription;
use crate::tracked::Tracked;

/// Helpers handed to a computation. Every store read through an
/// `Evaluation` becomes a dependency of the computation.
pub struct Evaluation {
	inner: RefCell<EvaluationInner>,
}

impl AsRef<Evaluation> for Evaluation {
	fn as_ref(&self) -> &Evaluation {
		self
	}
}

#[derive(Default)]
struct EvaluationInner {
	trackers: BTreeMap<Addr, Rc<dyn Any>>,
	dependencies: SmallVec<[Dependency; 4]>,
}

impl Default for Evaluation {
	fn default() -> Self {
		Evaluation::new()
	}
}

impl Evaluation {
	pub fn new() -> Self {
		Evaluation {
			inner: RefCell::new(EvaluationInner::default()),
		}
	}

	/// Reads the whole value of `store`.
	///
	/// # Panics
	///
	/// Panics with [`Error::CircularReference`] if `store` is the one being computed.
	pub fn use_store<U>(&self, store: &Store<U>) -> U
	where
		U: Clone + PartialEq + 'static,
	{
		self.track(store).get()
	}

	pub fn try_use<U>(&self, store: &Store<U>) -> Result<U, Error>
	where
		U: Clone + PartialEq + 'static,
	{
		Ok(self.try_track(store)?.get())
	}

	/// Returns a read tracker over the value of `store`. Only the parts read
	/// through the tracker decide whether a change to `store` matters.
	pub fn track<U>(&self, store: &Store<U>) -> Tracked<U>
	where
		U: Clone + 'static,
	{
		match self.try_track(store) {
			Ok(tracked) => tracked,
			Err(error) => panic!("{}", error),
		}
	}

	pub fn try_track<U>(&self, store: &Store<U>) -> Result<Tracked<U>, Error>
	where
		U: Clone + 'static,
	{
		let addr = store.addr();
		if let Some(tracked) = self.tracker::<U>(addr) {
			return Ok(tracked);
		}

		let tracked = Tracked::new(store.try_get()?);

		let mut inner = self.inner.borrow_mut();
		inner.trackers.insert(addr, Rc::new(tracked.clone()));
		inner
			.dependencies
			.push(Dependency::on_store(store, tracked.clone()));

		Ok(tracked)
	}

	pub fn len(&self) -> usize {
		self.inner.borrow().dependencies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub(crate) fn depends_on(&self, dependency: Dependency) {
		let mut inner = self.inner.borrow_mut();
		if inner.dependencies.iter().all(|d| d.addr != dependency.addr) {
			inner.dependencies.push(dependency);
		}
	}

	/// Subscribes `callback` to every dependency recorded from `start` on.
	pub(crate) fn listen_from(
		&self,
		start: usize,
		callback: &Rc<dyn Fn()>,
	) -> SmallVec<[Subscription; 4]> {
		let inner = self.inner.borrow();
		Dependencies::listen_to(&inner.dependencies[start.min(inner.dependencies.len())..], callback)
	}

	pub(crate) fn is_valid(&self) -> bool {
		Dependencies::are_valid(&self.inner.borrow().dependencies)
	}

	pub(crate) fn sources(&self) -> SmallVec<[Rc<dyn Invalidate>; 4]> {
		Dependencies::sources(&self.inner.borrow().dependencies)
	}

	pub(crate) fn take(self) -> SmallVec<[Dependency; 4]> {
		self.inner.into_inner().dependencies
	}

	fn tracker<U: 'static>(&self, addr: Addr) -> Option<Tracked<U>> {
		let inner = self.inner.borrow();
		inner
			.trackers
			.get(&addr)
			.and_then(|tracked| tracked.downcast_ref::<Tracked<U>>())
			.cloned()
	}
}

use std::future::Future;
use std::rc::Weak;

use crate::cache::{Cache, CacheBody};
use crate::cache_state::Status;
use crate::store::Store;
use crate::subscription::Teardown;
use crate::timer;
use crate::tracked::Tracked;

/// Handed to a cache function for one run.
///
/// Everything done through the context belongs to that run. Once the cache
/// starts another run, is invalidated or cleared, pushes are dropped with a
/// warning and reads are no longer tracked.
pub struct CacheContext<T, E> {
	cache: Weak<CacheBody<T, E>>,
	generation: u64,
}

impl<T, E> Clone for CacheContext<T, E> {
	fn clone(&self) -> Self {
		CacheContext {
			cache: self.cache.clone(),
			generation: self.generation,
		}
	}
}

impl<T, E> CacheContext<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	pub(crate) fn new(cache: Weak<CacheBody<T, E>>, generation: u64) -> Self {
		CacheContext { cache, generation }
	}

	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// `false` once the run was superseded.
	pub fn is_current(&self) -> bool {
		self.cache
			.upgrade()
			.map_or(false, |cache| cache.is_current(self.generation))
	}

	/// Reads the whole value of `store`. Any change to it invalidates the cache.
	pub fn use_store<U>(&self, store: &Store<U>) -> U
	where
		U: Clone + PartialEq + 'static,
	{
		self.track(store).get()
	}

	/// Returns a read tracker over `store`. The cache is invalidated only when
	/// something read through the tracker changes.
	pub fn track<U>(&self, store: &Store<U>) -> Tracked<U>
	where
		U: Clone + 'static,
	{
		match self.cache.upgrade() {
			Some(cache) => cache.track(self.generation, store),
			None => Tracked::new(store.get()),
		}
	}

	/// Awaits `other` and invalidates this cache once `other` holds a
	/// different result than the one returned here.
	pub fn use_cache<U, F>(&self, other: &Cache<U, F>) -> impl Future<Output = Result<U, F>> + 'static
	where
		U: Clone + PartialEq + 'static,
		F: Clone + PartialEq + 'static,
	{
		let promise = other.get();
		let context = self.clone();
		let other = other.clone();

		async move {
			let result = promise.await;
			let expected = match &result {
				Ok(value) => Status::Value(value.clone()),
				Err(error) => Status::Error(error.clone()),
			};
			if let Some(cache) = context.cache.upgrade() {
				cache.depend_on(context.generation, other.dependency(expected));
			}
			result
		}
	}

	/// Publishes `value` before (or after) the run settles.
	pub fn update_value(&self, value: T) {
		self.push(Ok(value))
	}

	/// Publishes a value derived from the current one.
	pub fn update_value_with(&self, func: impl FnOnce(Option<&T>) -> T) {
		let current = self.cache.upgrade().and_then(|cache| cache.current_value());
		self.push(Ok(func(current.as_ref())))
	}

	/// Publishes the outcome of `future` when it completes, unless the run
	/// was superseded by then.
	pub fn update_value_future(&self, future: impl Future<Output = Result<T, E>> + 'static) {
		let context = self.clone();
		timer::spawn(async move {
			let result = future.await;
			context.push(result);
		});
	}

	pub fn update_error(&self, error: E) {
		self.push(Err(error))
	}

	/// Opens a push channel. `func` receives a [`Sink`] and returns the
	/// teardown that runs when the run is superseded, the channel is closed,
	/// or the cache is dropped.
	pub fn connect<D>(&self, func: impl FnOnce(Sink<T, E>) -> D)
	where
		D: FnOnce() + 'static,
	{
		let Some(cache) = self.cache.upgrade() else {
			return;
		};

		if !cache.is_current(self.generation) {
			tracing::warn!(generation = self.generation, "connect from a superseded computation ignored");
			return;
		}

		let teardown = func(Sink {
			cache: self.cache.clone(),
			generation: self.generation,
		});
		cache.open_connection(self.generation, Box::new(teardown) as Teardown);
	}

	fn push(&self, result: Result<T, E>) {
		let accepted = self
			.cache
			.upgrade()
			.map_or(false, |cache| cache.push(self.generation, result));

		if !accepted {
			tracing::warn!(generation = self.generation, "update from a superseded computation ignored");
		}
	}
}

/// Write end of a connection opened with [`CacheContext::connect`].
pub struct Sink<T, E> {
	cache: Weak<CacheBody<T, E>>,
	generation: u64,
}

impl<T, E> Clone for Sink<T, E> {
	fn clone(&self) -> Self {
		Sink {
			cache: self.cache.clone(),
			generation: self.generation,
		}
	}
}

impl<T, E> Sink<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	/// Returns `false` if the value was dropped because the run is over.
	pub fn update_value(&self, value: T) -> bool {
		self.push(Ok(value))
	}

	pub fn update_error(&self, error: E) -> bool {
		self.push(Err(error))
	}

	pub fn is_current(&self) -> bool {
		self.cache
			.upgrade()
			.map_or(false, |cache| cache.is_current(self.generation))
	}

	/// Runs the teardown and marks the cache as no longer connected.
	pub fn close(&self) {
		if let Some(cache) = self.cache.upgrade() {
			cache.close_connection(self.generation);
		}
	}

	fn push(&self, result: Result<T, E>) -> bool {
		let accepted = self
			.cache
			.upgrade()
			.map_or(false, |cache| cache.push(self.generation, result));

		if !accepted {
			tracing::debug!(generation = self.generation, "push to a closed connection ignored");
		}
		accepted
	}
}

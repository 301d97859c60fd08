//! Asynchronous cached values.
//!
//! A [`Cache`] wraps an async function and remembers the promise of its last
//! run. Every run gets a generation number; whatever a run leaves behind
//! (its result, value pushes, connections, dependency subscriptions, the
//! expiry timer) is tied to that generation and ignored once a newer run,
//! an invalidation or a clear has replaced it.

use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use smallvec::SmallVec;

use crate::addr::Addr;
use crate::cache_state::{CacheState, Status};
use crate::context::CacheContext;
use crate::dependencies::{Dependency, Invalidate};
use crate::evaluation::Evaluation;
use crate::options::{CacheOptions, GetOptions, InvalidateAfter, Update};
use crate::resource_group::{AsResource, Resource};
use crate::store::Store;
use crate::subscription::{SubscribeOptions, Subscription, Teardown};
use crate::timer::{self, Timer};
use crate::tracked::Tracked;

/// The eventual result of a cache computation. Clones share one result.
pub type Promise<T, E> = Shared<LocalBoxFuture<'static, Result<T, E>>>;

pub(crate) type Func<T, E> = Box<dyn Fn(CacheContext<T, E>) -> LocalBoxFuture<'static, Result<T, E>>>;

pub(crate) fn resolved<T, E>(result: Result<T, E>) -> Promise<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	futures::future::ready(result).boxed_local().shared()
}

pub struct Cache<T, E> {
	pub(crate) body: Rc<CacheBody<T, E>>,
}

pub struct WeakCache<T, E> {
	body: Weak<CacheBody<T, E>>,
}

pub struct CacheBody<T, E> {
	name: &'static str,
	func: Func<T, E>,
	state: Store<CacheState<T, E>>,
	revision: Store<u64>,
	invalidate_after: Option<InvalidateAfter<T, E>>,
	invalidate_on_activation: bool,
	clear_on_invalidate: bool,
	inner: RefCell<CacheInner<T, E>>,
	activation: RefCell<Option<Subscription>>,
	this: Weak<CacheBody<T, E>>,
}

struct CacheInner<T, E> {
	generation: u64,
	promise: Option<Promise<T, E>>,
	stale_promise: Option<Promise<T, E>>,
	/// The computation of the current generation has not settled yet.
	running: bool,
	/// `promise` holds a settled result; `Some(true)` when it is a value.
	resolved: Option<bool>,
	evaluation: Option<Rc<Evaluation>>,
	subscriptions: SmallVec<[Subscription; 4]>,
	connection: Option<Teardown>,
	invalidation: Option<Timer>,
}

/// What a generation leaves behind once it is replaced.
struct Retired {
	evaluation: Option<Rc<Evaluation>>,
	subscriptions: SmallVec<[Subscription; 4]>,
	connection: Option<Teardown>,
	invalidation: Option<Timer>,
}

impl Retired {
	// must run outside of any borrow of the cache
	fn release(self) {
		drop(self.invalidation);
		drop(self.subscriptions);
		drop(self.evaluation);
		if let Some(teardown) = self.connection {
			teardown();
		}
	}
}

/// Listener panics caught while the cache updates itself. They are
/// rethrown from a fresh local task once the update is complete.
#[derive(Default)]
struct Deferred {
	payload: Option<Box<dyn Any + Send>>,
}

impl Deferred {
	fn run(&mut self, func: impl FnOnce()) {
		if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(func)) {
			self.payload.get_or_insert(payload);
		}
	}

	fn finish(self) {
		if let Some(payload) = self.payload {
			timer::spawn(async move {
				panic::resume_unwind(payload);
			});
		}
	}
}

impl<T, E> CacheInner<T, E> {
	fn new() -> Self {
		CacheInner {
			generation: 0,
			promise: None,
			stale_promise: None,
			running: false,
			resolved: None,
			evaluation: None,
			subscriptions: SmallVec::new(),
			connection: None,
			invalidation: None,
		}
	}

	fn retire(&mut self) -> Retired {
		self.generation += 1;
		self.running = false;
		Retired {
			evaluation: self.evaluation.take(),
			subscriptions: std::mem::take(&mut self.subscriptions),
			connection: self.connection.take(),
			invalidation: self.invalidation.take(),
		}
	}
}

impl<T, E> Clone for Cache<T, E> {
	fn clone(&self) -> Self {
		Cache {
			body: self.body.clone(),
		}
	}
}

impl<T, E> Clone for WeakCache<T, E> {
	fn clone(&self) -> Self {
		WeakCache {
			body: self.body.clone(),
		}
	}
}

impl<T, E> WeakCache<T, E> {
	pub fn upgrade(&self) -> Option<Cache<T, E>> {
		self.body.upgrade().map(|body| Cache { body })
	}
}

impl<T, E> Cache<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	/// Creates a cache around `func` and enrolls it in the resource group of
	/// `options`, or in the registry's default group.
	///
	/// Nothing runs until the cache is read or subscribed to.
	pub fn new<F, Fut>(func: F, options: CacheOptions<T, E>) -> Self
	where
		F: Fn(CacheContext<T, E>) -> Fut + 'static,
		Fut: Future<Output = Result<T, E>> + 'static,
	{
		let cache = Cache::from_func(
			Box::new(move |cx: CacheContext<T, E>| func(cx).boxed_local()),
			&options,
		);
		options.registry.enroll(
			&cache,
			options.resource_group.as_ref(),
			options.invalidate_on_window_focus,
		);
		cache
	}

	pub(crate) fn from_func(func: Func<T, E>, options: &CacheOptions<T, E>) -> Self {
		let body = Rc::new_cyclic(|this| CacheBody {
			name: options.name,
			func,
			state: Store::new_with_name(options.name, CacheState::pending()),
			revision: Store::new_with_name(options.name, 0),
			invalidate_after: options.invalidate_after.clone(),
			invalidate_on_activation: options.invalidate_on_activation,
			clear_on_invalidate: options.clear_on_invalidate,
			inner: RefCell::new(CacheInner::new()),
			activation: RefCell::new(None),
			this: this.clone(),
		});
		body.install_activation();
		Cache { body }
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	/// Returns the current promise, starting a computation if there is none.
	pub fn get(&self) -> Promise<T, E> {
		self.body.get_with(GetOptions::default())
	}

	pub fn get_with(&self, options: GetOptions) -> Promise<T, E> {
		self.body.get_with(options)
	}

	pub fn state(&self) -> CacheState<T, E> {
		self.body.state.get()
	}

	/// The store behind [`Cache::state`], for use in computed stores.
	pub fn state_store(&self) -> &Store<CacheState<T, E>> {
		&self.body.state
	}

	/// Bumped whenever a new value or error arrives, and on clear.
	pub fn revision(&self) -> u64 {
		self.body.revision.get()
	}

	pub fn is_active(&self) -> bool {
		self.body.state.is_active()
	}

	/// Calls `listener` with the current state and after every change.
	///
	/// Subscribing activates the cache: a computation starts if there is no
	/// current promise. The subscription keeps the cache alive.
	pub fn subscribe(&self, listener: impl Fn(&CacheState<T, E>) + 'static) -> Subscription
	where
		T: PartialEq,
		E: PartialEq,
	{
		self.subscribe_with(CacheState::clone, listener, SubscribeOptions::default().strict())
	}

	pub fn subscribe_selector<S>(
		&self,
		selector: impl Fn(&CacheState<T, E>) -> S + 'static,
		listener: impl Fn(&S) + 'static,
	) -> Subscription
	where
		S: Clone + PartialEq + 'static,
	{
		self.subscribe_with(selector, listener, SubscribeOptions::default().strict())
	}

	pub fn subscribe_with<S>(
		&self,
		selector: impl Fn(&CacheState<T, E>) -> S + 'static,
		listener: impl Fn(&S) + 'static,
		options: SubscribeOptions<S>,
	) -> Subscription
	where
		S: Clone + 'static,
	{
		let subscription = self.body.state.subscribe_with(selector, listener, options);
		let cache = self.clone();
		Subscription::new(move || {
			drop(subscription);
			drop(cache);
		})
	}

	/// Marks the value stale. An active cache starts a background update.
	pub fn invalidate(&self) {
		self.body.invalidate_cache(false)
	}

	/// Invalidates the stores and caches the last computation read, then this one.
	pub fn invalidate_recursive(&self) {
		self.body.invalidate_cache(true)
	}

	/// Forgets the value and every promise. An active cache starts over.
	pub fn clear(&self) {
		self.body.clear_cache(false)
	}

	pub fn clear_recursive(&self) {
		self.body.clear_cache(true)
	}

	pub fn downgrade(&self) -> WeakCache<T, E> {
		WeakCache {
			body: Rc::downgrade(&self.body),
		}
	}

	/// A dependency that holds as long as this cache still reports `expected`.
	pub(crate) fn dependency(&self, expected: Status<T, E>) -> Dependency
	where
		T: PartialEq,
		E: PartialEq,
	{
		let state = self.body.state.clone();
		let target = self.body.state.clone();
		Dependency::custom(
			Addr::of(&self.body),
			move || state.get().status == expected,
			Box::new(move |callback| target.on_change(callback)),
			self.body.this.clone() as Weak<dyn Invalidate>,
		)
	}
}

impl<T, E> CacheBody<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn install_activation(&self) {
		let weak = self.this.clone();
		let subscription = self.state.add_effect(
			move || {
				if let Some(this) = weak.upgrade() {
					this.activated();
				}

				let weak = weak.clone();
				Box::new(move || {
					if let Some(this) = weak.upgrade() {
						this.deactivated();
					}
				}) as Teardown
			},
			None,
		);
		*self.activation.borrow_mut() = Some(subscription);
	}

	fn activated(&self) {
		let has_content = {
			let inner = self.inner.borrow();
			inner.promise.is_some() || inner.stale_promise.is_some()
		};

		if has_content && self.invalidate_on_activation {
			tracing::debug!(cache = self.name, "invalidating on activation");
			self.invalidate_cache(false);
		} else if !self.dependencies_hold() {
			tracing::debug!(cache = self.name, "dependency changed while inactive");
			self.invalidate_cache(false);
		} else {
			// reads made while inactive were not listened to
			let (generation, evaluation) = {
				let inner = self.inner.borrow();
				(inner.generation, inner.evaluation.clone())
			};
			if let Some(evaluation) = evaluation {
				self.listen(generation, &evaluation, 0);
			}
		}

		drop(self.get_with(GetOptions::default()));
	}

	fn deactivated(&self) {
		let subscriptions = std::mem::take(&mut self.inner.borrow_mut().subscriptions);
		drop(subscriptions);
	}

	/// Whether everything the current computation read still looks the same.
	/// Only consulted while inactive, when nothing listens to the dependencies.
	fn dependencies_hold(&self) -> bool {
		let evaluation = self.inner.borrow().evaluation.clone();
		evaluation.map_or(true, |evaluation| evaluation.is_valid())
	}

	fn get_with(&self, options: GetOptions) -> Promise<T, E> {
		if !self.state.is_active() && !self.dependencies_hold() {
			tracing::debug!(cache = self.name, "dependency changed while inactive");
			self.invalidate_cache(false);
		}

		let (current, previous) = {
			let inner = self.inner.borrow();
			let current = inner.promise.clone();
			let previous = current.clone().or_else(|| inner.stale_promise.clone());
			(current, previous)
		};

		match (options.update, current, previous) {
			(Update::WhenStale, Some(promise), _) | (Update::WhenMissing, _, Some(promise)) => promise,
			(_, _, previous) => {
				let promise = self.start(previous.clone());
				match previous {
					Some(previous) if options.background_update => previous,
					_ => promise,
				}
			}
		}
	}

	fn start(&self, previous: Option<Promise<T, E>>) -> Promise<T, E> {
		let (generation, retired) = {
			let mut inner = self.inner.borrow_mut();
			let retired = inner.retire();
			if previous.is_some() {
				inner.stale_promise = previous;
			}
			inner.promise = None;
			inner.resolved = None;
			inner.running = true;
			inner.evaluation = Some(Rc::new(Evaluation::new()));
			(inner.generation, retired)
		};
		retired.release();

		tracing::debug!(cache = self.name, generation, "computing");

		let context = CacheContext::new(self.this.clone(), generation);
		let promise = (self.func)(context).shared();
		{
			// a value pushed while the computation was being set up wins
			let mut inner = self.inner.borrow_mut();
			if inner.generation == generation && inner.resolved.is_none() {
				inner.promise = Some(promise.clone());
			}
		}

		self.spawn_driver(generation, promise.clone());

		let connected = self.is_connected();
		if self.is_current(generation) {
			let mut deferred = Deferred::default();
			deferred.run(|| {
				self.state
					.update(|state| state.clone().updating(true).connected(connected))
			});
			deferred.finish();
		}

		promise
	}

	fn spawn_driver(&self, generation: u64, promise: Promise<T, E>) {
		let weak = self.this.clone();
		timer::spawn(async move {
			let result = promise.await;
			if let Some(this) = weak.upgrade() {
				this.settle(generation, result);
			}
		});
	}

	fn settle(&self, generation: u64, result: Result<T, E>) {
		{
			let mut inner = self.inner.borrow_mut();
			if inner.generation != generation {
				tracing::debug!(cache = self.name, generation, "dropping result of a superseded computation");
				return;
			}
			if inner.resolved.is_some() {
				inner.promise = Some(resolved(result.clone()));
			}
			inner.running = false;
			inner.resolved = Some(result.is_ok());
			inner.stale_promise = None;
		}

		tracing::debug!(cache = self.name, generation, ok = result.is_ok(), "settled");
		self.apply(generation, CacheState::settled(result), false);
	}

	/// Publishes a value or error pushed by the computation of `generation`.
	/// Returns `false` if that computation was superseded.
	pub(crate) fn push(&self, generation: u64, result: Result<T, E>) -> bool {
		let is_updating = {
			let mut inner = self.inner.borrow_mut();
			if inner.generation != generation {
				return false;
			}
			inner.resolved = Some(result.is_ok());
			inner.promise = Some(resolved(result.clone()));
			inner.stale_promise = None;
			inner.running
		};

		self.apply(generation, CacheState::settled(result), is_updating);
		true
	}

	fn apply(&self, generation: u64, state: CacheState<T, E>, is_updating: bool) {
		let state = state.updating(is_updating).connected(self.is_connected());
		let mut deferred = Deferred::default();
		deferred.run(|| self.state.set(state));
		deferred.run(|| self.revision.update(|revision| revision + 1));
		self.schedule_invalidation(generation);
		deferred.finish();
	}

	fn schedule_invalidation(&self, generation: u64) {
		let Some(after) = self.invalidate_after.as_ref() else {
			return;
		};

		let timer = after.delay_for(&self.state.get()).map(|delay| {
			let weak = self.this.clone();
			Timer::after(delay, move || {
				if let Some(this) = weak.upgrade() {
					this.expire(generation);
				}
			})
		});

		let previous = {
			let mut inner = self.inner.borrow_mut();
			if inner.generation != generation {
				return;
			}
			std::mem::replace(&mut inner.invalidation, timer)
		};
		drop(previous);
	}

	fn expire(&self, generation: u64) {
		if !self.is_current(generation) {
			return;
		}
		tracing::debug!(cache = self.name, generation, "value expired");
		self.invalidate_cache(false);
	}

	pub(crate) fn invalidate_cache(&self, recursive: bool) {
		if self.clear_on_invalidate {
			return self.clear_cache(recursive);
		}

		let (retired, sources) = {
			let mut inner = self.inner.borrow_mut();
			let sources = match (&inner.evaluation, recursive) {
				(Some(evaluation), true) => evaluation.sources(),
				_ => SmallVec::new(),
			};
			let retired = inner.retire();
			// a pending or failed promise leaves the last good one in place
			let promise = inner.promise.take();
			if inner.resolved == Some(true) {
				inner.stale_promise = promise;
			}
			inner.resolved = None;
			(retired, sources)
		};
		retired.release();

		tracing::debug!(cache = self.name, recursive, "invalidated");
		let mut deferred = Deferred::default();
		deferred.run(|| {
			self.state
				.update(|state| state.clone().stale().updating(false).connected(false))
		});

		for source in sources {
			deferred.run(|| source.invalidate(true));
		}

		if self.state.is_active() {
			deferred.run(|| drop(self.get_with(GetOptions::background())));
		}
		deferred.finish();
	}

	pub(crate) fn clear_cache(&self, recursive: bool) {
		let (retired, sources) = {
			let mut inner = self.inner.borrow_mut();
			let sources = match (&inner.evaluation, recursive) {
				(Some(evaluation), true) => evaluation.sources(),
				_ => SmallVec::new(),
			};
			let retired = inner.retire();
			inner.promise = None;
			inner.stale_promise = None;
			inner.resolved = None;
			(retired, sources)
		};
		retired.release();

		tracing::debug!(cache = self.name, recursive, "cleared");
		let mut deferred = Deferred::default();
		deferred.run(|| self.state.set(CacheState::pending()));
		deferred.run(|| self.revision.update(|revision| revision + 1));

		for source in sources {
			deferred.run(|| source.clear(true));
		}

		if self.state.is_active() {
			deferred.run(|| drop(self.get_with(GetOptions::default())));
		}
		deferred.finish();
	}

	pub(crate) fn is_current(&self, generation: u64) -> bool {
		self.inner.borrow().generation == generation
	}

	fn is_connected(&self) -> bool {
		self.inner.borrow().connection.is_some()
	}

	pub(crate) fn current_value(&self) -> Option<T> {
		self.state.get().get_value().cloned()
	}

	fn evaluation_for(&self, generation: u64) -> Option<Rc<Evaluation>> {
		let inner = self.inner.borrow();
		if inner.generation != generation {
			return None;
		}
		inner.evaluation.clone()
	}

	/// Reads `store` on behalf of the computation of `generation`.
	pub(crate) fn track<U>(&self, generation: u64, store: &Store<U>) -> Tracked<U>
	where
		U: Clone + 'static,
	{
		let Some(evaluation) = self.evaluation_for(generation) else {
			tracing::debug!(cache = self.name, generation, "read from a superseded computation is not tracked");
			return Tracked::new(store.get());
		};

		let start = evaluation.len();
		let tracked = evaluation.track(store);
		self.listen(generation, &evaluation, start);
		tracked
	}

	pub(crate) fn depend_on(&self, generation: u64, dependency: Dependency) {
		let Some(evaluation) = self.evaluation_for(generation) else {
			return;
		};

		let start = evaluation.len();
		evaluation.depends_on(dependency);
		self.listen(generation, &evaluation, start);
	}

	/// Subscribes to the reads from `start` on. Dependencies are only
	/// listened to while the cache is active.
	fn listen(&self, generation: u64, evaluation: &Evaluation, start: usize) {
		if evaluation.len() == start || !self.state.is_active() {
			return;
		}

		let subscriptions = evaluation.listen_from(start, &self.on_dependency_change(generation));
		let leftover = {
			let mut inner = self.inner.borrow_mut();
			if inner.generation == generation {
				inner.subscriptions.extend(subscriptions);
				None
			} else {
				Some(subscriptions)
			}
		};
		drop(leftover);
	}

	fn on_dependency_change(&self, generation: u64) -> Rc<dyn Fn()> {
		let weak = self.this.clone();
		Rc::new(move || {
			if let Some(this) = weak.upgrade() {
				this.dependency_changed(generation);
			}
		})
	}

	fn dependency_changed(&self, generation: u64) {
		let Some(evaluation) = self.evaluation_for(generation) else {
			return;
		};

		if evaluation.is_valid() {
			tracing::trace!(cache = self.name, "dependency changed outside of what was read");
			return;
		}

		tracing::debug!(cache = self.name, generation, "dependency changed");
		self.invalidate_cache(false);
	}

	pub(crate) fn open_connection(&self, generation: u64, teardown: Teardown) {
		let (previous, opened) = {
			let mut inner = self.inner.borrow_mut();
			if inner.generation == generation {
				(inner.connection.replace(teardown), true)
			} else {
				(Some(teardown), false)
			}
		};

		if let Some(previous) = previous {
			previous();
		}

		if opened {
			tracing::debug!(cache = self.name, generation, "connected");
			let mut deferred = Deferred::default();
			deferred.run(|| self.state.update(|state| state.clone().connected(true)));
			deferred.finish();
		} else {
			tracing::warn!(cache = self.name, generation, "connect from a superseded computation ignored");
		}
	}

	pub(crate) fn close_connection(&self, generation: u64) {
		let teardown = {
			let mut inner = self.inner.borrow_mut();
			if inner.generation != generation {
				return;
			}
			inner.connection.take()
		};

		if let Some(teardown) = teardown {
			teardown();
			tracing::debug!(cache = self.name, generation, "disconnected");
			let mut deferred = Deferred::default();
			deferred.run(|| self.state.update(|state| state.clone().connected(false)));
			deferred.finish();
		}
	}
}

impl<T, E> Invalidate for CacheBody<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn invalidate(&self, recursive: bool) {
		self.invalidate_cache(recursive)
	}

	fn clear(&self, recursive: bool) {
		self.clear_cache(recursive)
	}
}

impl<T, E> Resource for CacheBody<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn invalidate_all(&self) {
		self.invalidate_cache(false)
	}

	fn clear_all(&self) {
		self.clear_cache(false)
	}
}

impl<T, E> AsResource for Cache<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn as_resource(&self) -> Weak<dyn Resource> {
		Rc::downgrade(&self.body) as Weak<dyn Resource>
	}
}

impl<T, E> Drop for CacheBody<T, E> {
	fn drop(&mut self) {
		if let Some(teardown) = self.inner.get_mut().connection.take() {
			teardown();
		}
	}
}

impl<T, E> std::fmt::Debug for Cache<T, E>
where
	T: std::fmt::Debug + Clone + 'static,
	E: std::fmt::Debug + Clone + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Cache")
			.field("name", &self.body.name)
			.field("generation", &self.body.inner.borrow().generation)
			.field("state", &self.body.state.get())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::rc::Rc;

	use tokio::task::LocalSet;

	use super::*;
	use crate::registry::Registry;

	fn options() -> CacheOptions<u32, String> {
		CacheOptions::from_registry(&Rc::new(Registry::new()))
	}

	async fn flush() {
		for _ in 0..8 {
			tokio::task::yield_now().await;
		}
	}

	#[tokio::test(start_paused = true)]
	async fn stale_promise_keeps_the_last_value() {
		LocalSet::new()
			.run_until(async {
				let runs = Rc::new(Cell::new(0));
				let cache = Cache::new(
					{
						let runs = runs.clone();
						move |_| {
							runs.set(runs.get() + 1);
							let run = runs.get();
							async move {
								if run == 2 {
									Err("boom".to_string())
								} else {
									Ok(run)
								}
							}
						}
					},
					options(),
				);

				assert_eq!(cache.get().await, Ok(1));
				flush().await;

				cache.invalidate();
				assert!(cache.body.inner.borrow().stale_promise.is_some());

				// a failed result is never kept as stale
				assert_eq!(cache.get().await, Err("boom".to_string()));
				flush().await;
				cache.invalidate();
				let stale = cache.body.inner.borrow().stale_promise.clone();
				assert!(stale.is_none());

				// a pending run leaves the previous one in place
				assert_eq!(cache.get().await, Ok(3));
				flush().await;
				cache.invalidate();
				drop(cache.get());
				cache.invalidate();
				let stale = cache.body.inner.borrow().stale_promise.clone();
				assert_eq!(stale.expect("stale promise").await, Ok(3));
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn pushes_from_old_generations_are_ignored() {
		LocalSet::new()
			.run_until(async {
				let cache = Cache::new(|_| async { Ok(1) }, options());
				assert_eq!(cache.get().await, Ok(1));
				flush().await;

				let stale_generation = cache.body.inner.borrow().generation;
				cache.invalidate();

				assert!(!cache.body.push(stale_generation, Ok(99)));
				assert_eq!(cache.state().get_value(), Some(&1));
			})
			.await;
	}
}

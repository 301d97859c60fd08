use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::Duration;

use smallvec::SmallVec;

use crate::addr::Addr;
use crate::dependencies::{Dependencies, Invalidate};
use crate::error::Error;
use crate::evaluation::Evaluation;
use crate::subscription::{SubscribeOptions, Subscription, Teardown};
use crate::timer::Timer;

/// A reactive value.
///
/// A store either holds a value that is replaced with [`Store::set`], or
/// computes it lazily from other stores ([`Store::computed`]). Listeners are
/// notified on every change; effects run while the store has at least one
/// subscriber.
pub struct Store<T> {
	pub(crate) body: Rc<StoreBody<T>>,
}

pub struct WeakStore<T> {
	body: Weak<StoreBody<T>>,
}

pub(crate) type Compute<T> = Box<dyn Fn(&Evaluation) -> T>;

pub struct StoreBody<T> {
	pub(crate) name: &'static str,
	pub(crate) value: RefCell<Option<T>>,
	pub(crate) func: Option<Compute<T>>,
	pub(crate) computing: Cell<bool>,
	pub(crate) dependencies: RefCell<Dependencies>,
	token: Cell<u64>,
	inner: RefCell<StoreInner<T>>,
	pub(crate) this: Weak<StoreBody<T>>,
}

struct StoreInner<T> {
	next_id: u64,
	subscribers: usize,
	listeners: BTreeMap<u64, Rc<Listener<T>>>,
	effects: BTreeMap<u64, EffectEntry>,
}

struct Listener<T> {
	active: Cell<bool>,
	tag: Option<&'static str>,
	callback: Rc<dyn Fn(&T)>,
}

struct EffectEntry {
	effect: Rc<dyn Fn() -> Teardown>,
	retain: Option<Duration>,
	handle: Option<Teardown>,
	timer: Option<Timer>,
}

impl<T> Clone for Store<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Clone for WeakStore<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> WeakStore<T> {
	pub fn upgrade(&self) -> Option<Store<T>> {
		self.body.upgrade().map(|body| Store { body })
	}
}

impl<T> Default for Store<T>
where
	T: Default + Clone + 'static,
{
	fn default() -> Self {
		Store::new(Default::default())
	}
}

impl<T> Store<T>
where
	T: Clone + 'static,
{
	pub fn new(value: T) -> Self {
		Self::new_with_name("<unnamed>", value)
	}

	pub fn new_with_name(name: &'static str, value: T) -> Self {
		Store {
			body: Rc::new_cyclic(|this| StoreBody::new(name, Some(value), None, this.clone())),
		}
	}

	/// A store whose value is computed from other stores on first read and
	/// recomputed when something it read changes.
	pub fn computed(func: impl Fn(&Evaluation) -> T + 'static) -> Self {
		Self::computed_with_name("<computed>", func)
	}

	pub fn computed_with_name(name: &'static str, func: impl Fn(&Evaluation) -> T + 'static) -> Self {
		let body = Rc::new_cyclic(|this| {
			StoreBody::new(name, None, Some(Box::new(func) as Compute<T>), this.clone())
		});
		body.install_connection();
		Store { body }
	}

	pub fn map<R, F>(&self, func: F) -> Store<R>
	where
		T: PartialEq,
		R: Clone + 'static,
		F: Fn(&T) -> R + 'static,
	{
		let source = self.clone();
		Store::computed(move |cx| func(&cx.use_store(&source)))
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	/// Returns the current value, computing it first if needed.
	///
	/// # Panics
	///
	/// Panics with [`Error::CircularReference`] if called from inside the
	/// computation of this store.
	pub fn get(&self) -> T {
		match self.body.try_get() {
			Ok(value) => value,
			Err(error) => panic!("{}", error),
		}
	}

	pub fn try_get(&self) -> Result<T, Error> {
		self.body.try_get()
	}

	pub fn set(&self, value: T) {
		self.body.set(value)
	}

	pub fn update(&self, func: impl FnOnce(&T) -> T) {
		let next = func(&self.get());
		self.body.set(next)
	}

	/// Drops the computed value so that the next read computes it again.
	/// Plain value stores are left untouched.
	pub fn invalidate(&self) {
		self.body.invalidate_computation()
	}

	pub fn is_active(&self) -> bool {
		self.body.is_active()
	}

	/// Calls `listener` with the current value and then after every change.
	/// A notification that carries an equal value is skipped.
	pub fn subscribe(&self, listener: impl Fn(&T) + 'static) -> Subscription
	where
		T: PartialEq,
	{
		self.subscribe_with(T::clone, listener, SubscribeOptions::default().strict())
	}

	/// Calls `listener` whenever the selected part of the value changes.
	pub fn subscribe_selector<S>(
		&self,
		selector: impl Fn(&T) -> S + 'static,
		listener: impl Fn(&S) + 'static,
	) -> Subscription
	where
		S: Clone + PartialEq + 'static,
	{
		self.subscribe_with(selector, listener, SubscribeOptions::default().strict())
	}

	pub fn subscribe_with<S>(
		&self,
		selector: impl Fn(&T) -> S + 'static,
		listener: impl Fn(&S) + 'static,
		options: SubscribeOptions<S>,
	) -> Subscription
	where
		S: Clone + 'static,
	{
		let deliver = options.wrap(listener);
		let selector = Rc::new(selector);
		let last: Rc<RefCell<Option<S>>> = Rc::new(RefCell::new(None));
		let equals = options.equals.clone();

		let callback: Rc<dyn Fn(&T)> = Rc::new({
			let selector = selector.clone();
			let last = last.clone();
			move |value: &T| {
				let next = selector(value);
				{
					let mut last = last.borrow_mut();
					if let (Some(prev), Some(equals)) = (last.as_ref(), equals.as_ref()) {
						if equals(prev, &next) {
							return;
						}
					}
					*last = Some(next.clone());
				}
				deliver(&next);
			}
		});

		let subscription = self.body.add_listener(callback.clone(), options.tag);

		match self.body.try_get() {
			Ok(value) if options.run_now => callback(&value),
			Ok(value) => *last.borrow_mut() = Some(selector(&value)),
			Err(error) => tracing::error!(store = self.body.name, %error, "cannot read initial value"),
		}

		subscription
	}

	/// Registers a lifecycle hook that is on while the store has subscribers.
	///
	/// The effect runs when the first subscriber arrives, or right away if
	/// the store is already active. Its teardown runs when the last
	/// subscriber leaves, or `retain` later if nobody subscribes again in
	/// between. Dropping the returned subscription removes the effect.
	pub fn add_effect(
		&self,
		effect: impl Fn() -> Teardown + 'static,
		retain: Option<Duration>,
	) -> Subscription {
		let id = self.body.insert_effect(Rc::new(effect), retain);
		let weak = self.body.this.clone();
		Subscription::new(move || {
			if let Some(body) = weak.upgrade() {
				body.remove_effect(id)
			}
		})
	}

	pub fn downgrade(&self) -> WeakStore<T> {
		WeakStore {
			body: Rc::downgrade(&self.body),
		}
	}

	pub(crate) fn addr(&self) -> Addr {
		Addr::of(&self.body)
	}

	pub(crate) fn on_change(&self, callback: Rc<dyn Fn()>) -> Subscription {
		self.body
			.add_listener(Rc::new(move |_: &T| callback()), Some("dependency"))
	}

	pub(crate) fn as_invalidate(&self) -> Weak<dyn Invalidate> {
		self.body.this.clone() as Weak<dyn Invalidate>
	}
}

impl<T> StoreBody<T>
where
	T: Clone + 'static,
{
	fn new(
		name: &'static str,
		value: Option<T>,
		func: Option<Compute<T>>,
		this: Weak<StoreBody<T>>,
	) -> Self {
		StoreBody {
			name,
			value: RefCell::new(value),
			func,
			computing: Cell::new(false),
			dependencies: RefCell::new(Dependencies::new()),
			token: Cell::new(0),
			inner: RefCell::new(StoreInner {
				next_id: 0,
				subscribers: 0,
				listeners: BTreeMap::new(),
				effects: BTreeMap::new(),
			}),
			this,
		}
	}

	pub(crate) fn try_get(&self) -> Result<T, Error> {
		if self.func.is_some() {
			return self.refresh();
		}

		match self.value.borrow().as_ref() {
			Some(value) => Ok(value.clone()),
			None => unreachable!("value store without a value"),
		}
	}

	pub(crate) fn set(&self, value: T) {
		*self.value.borrow_mut() = Some(value);

		if self.func.is_some() {
			let previous = self.dependencies.borrow_mut().swap(Dependencies::pinned());
			drop(previous);
		}

		self.notify();
	}

	pub(crate) fn is_active(&self) -> bool {
		self.inner.borrow().subscribers > 0
	}

	/// Delivers the current value to every listener.
	///
	/// Each pass takes a fresh token. A listener that updates this store
	/// starts a nested pass, and the outer pass stops as soon as it notices
	/// its token was replaced. A panicking listener does not keep the others
	/// from being called; the first panic is resumed once the pass is over.
	pub(crate) fn notify(&self) {
		let token = self.token.get().wrapping_add(1);
		self.token.set(token);

		let listeners: SmallVec<[Rc<Listener<T>>; 4]> =
			self.inner.borrow().listeners.values().cloned().collect();
		if listeners.is_empty() {
			return;
		}

		let Some(value) = self.value.borrow().clone() else {
			return;
		};

		let mut failure = None;
		for listener in listeners {
			if self.token.get() != token {
				tracing::trace!(store = self.name, "notification superseded");
				break;
			}

			if !listener.active.get() {
				continue;
			}

			let result = panic::catch_unwind(AssertUnwindSafe(|| (listener.callback)(&value)));
			if let Err(payload) = result {
				tracing::error!(
					store = self.name,
					tag = listener.tag.unwrap_or("<untagged>"),
					"listener panicked"
				);
				failure.get_or_insert(payload);
			}
		}

		if let Some(payload) = failure {
			panic::resume_unwind(payload);
		}
	}

	fn add_listener(self: &Rc<Self>, callback: Rc<dyn Fn(&T)>, tag: Option<&'static str>) -> Subscription {
		let first = {
			let mut inner = self.inner.borrow_mut();
			inner.subscribers += 1;
			inner.subscribers == 1
		};

		// Effects start before the listener is registered, so whatever they
		// change is part of the initial value rather than a notification.
		if first {
			self.activate();
		}

		let id = {
			let mut inner = self.inner.borrow_mut();
			let id = inner.next_id;
			inner.next_id += 1;
			inner.listeners.insert(
				id,
				Rc::new(Listener {
					active: Cell::new(true),
					tag,
					callback,
				}),
			);
			id
		};

		let body = self.clone();
		Subscription::new(move || body.remove_listener(id))
	}

	fn remove_listener(&self, id: u64) {
		let last = {
			let mut inner = self.inner.borrow_mut();
			match inner.listeners.remove(&id) {
				Some(listener) => {
					listener.active.set(false);
					inner.subscribers -= 1;
					inner.subscribers == 0
				}
				None => false,
			}
		};

		if last {
			self.deactivate();
		}
	}

	fn activate(&self) {
		let pending: SmallVec<[u64; 4]> = {
			let mut inner = self.inner.borrow_mut();
			inner
				.effects
				.iter_mut()
				.filter_map(|(id, entry)| {
					// a resubscribe during retention keeps the running effect
					entry.timer = None;
					entry.handle.is_none().then_some(*id)
				})
				.collect()
		};

		tracing::trace!(store = self.name, effects = pending.len(), "activated");

		for id in pending {
			self.start_effect(id);
		}
	}

	fn deactivate(&self) {
		let mut teardowns: SmallVec<[Teardown; 4]> = SmallVec::new();

		{
			let mut inner = self.inner.borrow_mut();
			for (id, entry) in inner.effects.iter_mut() {
				if entry.handle.is_none() {
					continue;
				}

				match entry.retain {
					Some(retain) if !retain.is_zero() => {
						if entry.timer.is_none() {
							let weak = self.this.clone();
							let id = *id;
							entry.timer = Some(Timer::after(retain, move || {
								if let Some(body) = weak.upgrade() {
									body.expire_effect(id);
								}
							}));
						}
					}
					_ => teardowns.extend(entry.handle.take()),
				}
			}
		}

		tracing::trace!(store = self.name, "deactivated");

		for teardown in teardowns {
			teardown();
		}
	}

	pub(crate) fn insert_effect(&self, effect: Rc<dyn Fn() -> Teardown>, retain: Option<Duration>) -> u64 {
		let (id, active) = {
			let mut inner = self.inner.borrow_mut();
			let id = inner.next_id;
			inner.next_id += 1;
			inner.effects.insert(
				id,
				EffectEntry {
					effect,
					retain,
					handle: None,
					timer: None,
				},
			);
			(id, inner.subscribers > 0)
		};

		if active {
			self.start_effect(id);
		}

		id
	}

	fn start_effect(&self, id: u64) {
		let effect = match self.inner.borrow().effects.get(&id) {
			Some(entry) => entry.effect.clone(),
			None => return,
		};

		let handle = effect();

		let leftover = {
			let mut guard = self.inner.borrow_mut();
			let inner = &mut *guard;
			match inner.effects.get_mut(&id) {
				Some(entry) if inner.subscribers > 0 && entry.handle.is_none() => {
					entry.handle = Some(handle);
					None
				}
				_ => Some(handle),
			}
		};

		// the store went idle or the effect was removed while it was starting
		if let Some(teardown) = leftover {
			teardown();
		}
	}

	fn expire_effect(&self, id: u64) {
		let teardown = {
			let mut inner = self.inner.borrow_mut();
			if inner.subscribers > 0 {
				return;
			}
			match inner.effects.get_mut(&id) {
				Some(entry) => {
					entry.timer = None;
					entry.handle.take()
				}
				None => None,
			}
		};

		if let Some(teardown) = teardown {
			tracing::trace!(store = self.name, effect = id, "retention elapsed");
			teardown();
		}
	}

	fn remove_effect(&self, id: u64) {
		let entry = self.inner.borrow_mut().effects.remove(&id);
		if let Some(EffectEntry {
			handle: Some(teardown),
			..
		}) = entry
		{
			teardown();
		}
	}
}

impl<T> Drop for StoreBody<T> {
	fn drop(&mut self) {
		let inner = self.inner.get_mut();
		let teardowns: SmallVec<[Teardown; 4]> = inner
			.effects
			.values_mut()
			.filter_map(|entry| entry.handle.take())
			.collect();

		for teardown in teardowns {
			teardown();
		}
	}
}

impl<T> Debug for Store<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Store")
			.field("name", &self.body.name)
			.field("value", &self.body.value.borrow())
			.finish()
	}
}

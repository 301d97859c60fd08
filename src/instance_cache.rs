use std::cell::RefCell;
use std::hash::Hash;
use std::rc::{Rc, Weak};
use std::time::Duration;

use fxhash::FxHashMap;
use smallvec::SmallVec;
use tokio::time::Instant;

use crate::cache::{Cache, WeakCache};
use crate::hashed::{self, Hashed};
use crate::store::{Store, WeakStore};
use crate::timer::Timer;

/// A strong handle that can be downgraded to a weak one and back.
pub trait WeakHandle: Clone {
	type Weak: Clone;

	fn downgrade(&self) -> Self::Weak;
	fn upgrade(weak: &Self::Weak) -> Option<Self>;
}

impl<T> WeakHandle for Rc<T> {
	type Weak = Weak<T>;

	fn downgrade(&self) -> Weak<T> {
		Rc::downgrade(self)
	}

	fn upgrade(weak: &Weak<T>) -> Option<Self> {
		weak.upgrade()
	}
}

impl<T> WeakHandle for Store<T>
where
	T: Clone + 'static,
{
	type Weak = WeakStore<T>;

	fn downgrade(&self) -> WeakStore<T> {
		Store::downgrade(self)
	}

	fn upgrade(weak: &WeakStore<T>) -> Option<Self> {
		weak.upgrade()
	}
}

impl<T, E> WeakHandle for Cache<T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	type Weak = WeakCache<T, E>;

	fn downgrade(&self) -> WeakCache<T, E> {
		Cache::downgrade(self)
	}

	fn upgrade(weak: &WeakCache<T, E>) -> Option<Self> {
		weak.upgrade()
	}
}

/// A pool of instances built per argument key.
///
/// An instance is held strongly while it keeps being asked for, and only
/// weakly once `cache_time` passed without a [`get`](InstanceCache::get).
/// A weakly held instance that is still alive elsewhere is handed out (and
/// held strongly) again; a dead one is rebuilt. Without a `cache_time` the
/// pool never lets go of its instances.
pub struct InstanceCache<A, V: WeakHandle> {
	body: Rc<PoolBody<A, V>>,
}

struct PoolBody<A, V: WeakHandle> {
	factory: Box<dyn Fn(&A) -> V>,
	key: Box<dyn Fn(&A) -> u64>,
	/// Tells apart argument lists that share a key. Without it the key alone
	/// picks the entry.
	same_args: Option<Box<dyn Fn(&A, &A) -> bool>>,
	cache_time: Option<Duration>,
	entries: RefCell<FxHashMap<u64, SmallVec<[Entry<A, V>; 1]>>>,
	sweeper: RefCell<Option<Timer>>,
}

struct Entry<A, V: WeakHandle> {
	args: Hashed<A>,
	last_touched: Instant,
	strong: Option<V>,
	weak: V::Weak,
}

impl<A, V: WeakHandle> Entry<A, V> {
	fn value(&self) -> Option<V> {
		self.strong.clone().or_else(|| V::upgrade(&self.weak))
	}
}

impl<A, V: WeakHandle> Clone for InstanceCache<A, V> {
	fn clone(&self) -> Self {
		InstanceCache {
			body: self.body.clone(),
		}
	}
}

impl<A, V> InstanceCache<A, V>
where
	A: Clone + 'static,
	V: WeakHandle + 'static,
{
	/// A pool keyed by the hash of the arguments. Argument lists that hash
	/// alike but are not equal get separate instances.
	pub fn new(factory: impl Fn(&A) -> V + 'static, cache_time: Option<Duration>) -> Self
	where
		A: Hash + Eq,
	{
		Self::build(
			Box::new(factory),
			Box::new(|args: &A| hashed::key_of(args)),
			Some(Box::new(|a: &A, b: &A| a == b)),
			cache_time,
		)
	}

	/// A pool keyed by `key`. Argument lists with the same key share an instance.
	pub fn with_key(
		factory: impl Fn(&A) -> V + 'static,
		key: impl Fn(&A) -> u64 + 'static,
		cache_time: Option<Duration>,
	) -> Self {
		Self::build(Box::new(factory), Box::new(key), None, cache_time)
	}

	fn build(
		factory: Box<dyn Fn(&A) -> V>,
		key: Box<dyn Fn(&A) -> u64>,
		same_args: Option<Box<dyn Fn(&A, &A) -> bool>>,
		cache_time: Option<Duration>,
	) -> Self {
		InstanceCache {
			body: Rc::new(PoolBody {
				factory,
				key,
				same_args,
				cache_time: cache_time.filter(|time| !time.is_zero()),
				entries: RefCell::new(FxHashMap::default()),
				sweeper: RefCell::new(None),
			}),
		}
	}

	pub fn get(&self, args: A) -> V {
		let args = Hashed::with_key(args, |args| (self.body.key)(args));
		let now = Instant::now();

		{
			let mut entries = self.body.entries.borrow_mut();
			let entry = entries.get_mut(&args.hash).and_then(|bucket| {
				bucket
					.iter_mut()
					.find(|entry| self.body.is_match(entry, &args.value))
			});
			if let Some(entry) = entry {
				if let Some(value) = entry.value() {
					entry.last_touched = now;
					entry.strong = Some(value.clone());
					return value;
				}
			}
		}

		let value = (self.body.factory)(&args.value);
		tracing::trace!(key = args.hash, "instance created");

		let dead = {
			let mut entries = self.body.entries.borrow_mut();
			let bucket = entries.entry(args.hash).or_default();
			// an entry whose instance is gone is replaced in place
			let dead = bucket
				.iter()
				.position(|entry| self.body.is_match(entry, &args.value))
				.map(|index| bucket.remove(index));
			bucket.push(Entry {
				weak: value.downgrade(),
				strong: Some(value.clone()),
				last_touched: now,
				args,
			});
			dead
		};
		drop(dead);

		self.start_sweeping();
		value
	}

	/// Instances that are still reachable.
	pub fn values(&self) -> Vec<V> {
		self.body
			.entries
			.borrow()
			.values()
			.flatten()
			.filter_map(Entry::value)
			.collect()
	}

	pub fn entries(&self) -> Vec<(A, V)> {
		self.body
			.entries
			.borrow()
			.values()
			.flatten()
			.filter_map(|entry| Some((entry.args.value.clone(), entry.value()?)))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.values().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Stops the periodic sweep. Instances are no longer demoted to weak.
	pub fn stop(&self) {
		let sweeper = self.body.sweeper.borrow_mut().take();
		drop(sweeper);
	}

	fn start_sweeping(&self) {
		let Some(cache_time) = self.body.cache_time else {
			return;
		};

		if self.body.sweeper.borrow().is_some() {
			return;
		}

		let weak = Rc::downgrade(&self.body);
		let timer = Timer::every(cache_time, move || match weak.upgrade() {
			Some(body) => {
				body.sweep(cache_time);
				true
			}
			None => false,
		});
		*self.body.sweeper.borrow_mut() = Some(timer);
	}
}

impl<A, V: WeakHandle> PoolBody<A, V> {
	fn is_match(&self, entry: &Entry<A, V>, args: &A) -> bool {
		match &self.same_args {
			Some(same_args) => same_args(&entry.args.value, args),
			None => true,
		}
	}

	fn sweep(&self, cache_time: Duration) {
		let now = Instant::now();

		// demoted handles are dropped after the borrow ends
		let mut released = Vec::new();
		let mut entries = self.entries.borrow_mut();
		for entry in entries.values_mut().flatten() {
			if now.duration_since(entry.last_touched) >= cache_time {
				released.extend(entry.strong.take());
			}
		}
		drop(entries);
		let demoted = released.len();
		drop(released);

		let mut entries = self.entries.borrow_mut();
		let mut removed = 0;
		entries.retain(|_, bucket| {
			let before = bucket.len();
			bucket.retain(|entry| entry.strong.is_some() || V::upgrade(&entry.weak).is_some());
			removed += before - bucket.len();
			!bucket.is_empty()
		});

		tracing::trace!(demoted, removed, "instance pool swept");
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::hash::Hasher;

	use tokio::task::LocalSet;

	use super::*;

	fn counting_pool(cache_time: Option<Duration>) -> (InstanceCache<u32, Rc<u32>>, Rc<Cell<u32>>) {
		let built = Rc::new(Cell::new(0));
		let pool = InstanceCache::new(
			{
				let built = built.clone();
				move |args: &u32| {
					built.set(built.get() + 1);
					Rc::new(*args)
				}
			},
			cache_time,
		);
		(pool, built)
	}

	#[test]
	fn without_cache_time_instances_are_kept() {
		let (pool, built) = counting_pool(None);

		let a = pool.get(1);
		drop(a);
		let b = pool.get(1);
		assert_eq!(*b, 1);
		assert_eq!(built.get(), 1);

		pool.get(2);
		assert_eq!(pool.len(), 2);
	}

	#[test]
	fn custom_keys_share_instances() {
		let pool: InstanceCache<(u32, &'static str), Rc<u32>> =
			InstanceCache::with_key(
				|args: &(u32, &'static str)| Rc::new(args.0),
				|args: &(u32, &'static str)| u64::from(args.0),
				None,
			);

		let a = pool.get((1, "a"));
		let b = pool.get((1, "b"));
		assert!(Rc::ptr_eq(&a, &b));
		assert_eq!(pool.entries()[0].0, (1, "a"));
	}

	#[derive(Clone, PartialEq, Eq, Debug)]
	struct Colliding(u32);

	impl Hash for Colliding {
		fn hash<H: Hasher>(&self, state: &mut H) {
			state.write_u8(0)
		}
	}

	#[test]
	fn colliding_hashes_keep_their_own_instances() {
		let pool = InstanceCache::new(|args: &Colliding| Rc::new(args.0), None);

		let a = pool.get(Colliding(1));
		let b = pool.get(Colliding(2));
		assert_eq!((*a, *b), (1, 2));
		assert!(Rc::ptr_eq(&a, &pool.get(Colliding(1))));
		assert_eq!(pool.len(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn unused_instances_are_rebuilt_after_cache_time() {
		LocalSet::new()
			.run_until(async {
				let (pool, built) = counting_pool(Some(Duration::from_secs(1)));

				let a = pool.get(1);
				let b = pool.get(1);
				assert!(Rc::ptr_eq(&a, &b));
				drop((a, b));

				tokio::time::sleep(Duration::from_millis(2100)).await;
				assert!(pool.is_empty());

				pool.get(1);
				assert_eq!(built.get(), 2);
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn live_instances_are_handed_out_again() {
		LocalSet::new()
			.run_until(async {
				let (pool, built) = counting_pool(Some(Duration::from_secs(1)));

				let held = pool.get(1);
				tokio::time::sleep(Duration::from_millis(2100)).await;

				let again = pool.get(1);
				assert!(Rc::ptr_eq(&held, &again));
				assert_eq!(built.get(), 1);
			})
			.await;
	}

	#[tokio::test(start_paused = true)]
	async fn stop_ends_the_sweep() {
		LocalSet::new()
			.run_until(async {
				let (pool, built) = counting_pool(Some(Duration::from_secs(1)));

				drop(pool.get(1));
				pool.stop();
				tokio::time::sleep(Duration::from_secs(5)).await;

				pool.get(1);
				assert_eq!(built.get(), 1);
			})
			.await;
	}
}

use std::future::Future;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use futures::future::FutureExt;

use crate::cache::Cache;
use crate::context::CacheContext;
use crate::instance_cache::InstanceCache;
use crate::options::CacheOptions;
use crate::resource_group::{AsResource, Resource};

/// Builds one [`Cache`] per distinct argument, pooled in an [`InstanceCache`].
///
/// `clear_unused_after` of the options is the pool's cache time. The factory,
/// rather than each instance, joins the resource group, so invalidating the
/// group reaches every live instance.
pub fn create_cache<A, T, E, F, Fut>(func: F, options: CacheOptions<T, E>) -> CacheFactory<A, T, E>
where
	A: Hash + Eq + Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
	F: Fn(CacheContext<T, E>, A) -> Fut + 'static,
	Fut: Future<Output = Result<T, E>> + 'static,
{
	let cache_time = options.clear_unused_after;
	with_pool(func, options, |build| InstanceCache::new(build, cache_time))
}

/// Like [`create_cache`], but arguments with the same `key` share one cache.
pub fn create_cache_with_key<A, T, E, F, Fut>(
	func: F,
	key: impl Fn(&A) -> u64 + 'static,
	options: CacheOptions<T, E>,
) -> CacheFactory<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
	F: Fn(CacheContext<T, E>, A) -> Fut + 'static,
	Fut: Future<Output = Result<T, E>> + 'static,
{
	let cache_time = options.clear_unused_after;
	with_pool(func, options, |build| InstanceCache::with_key(build, key, cache_time))
}

type Build<A, T, E> = Box<dyn Fn(&A) -> Cache<T, E>>;

fn with_pool<A, T, E, F, Fut>(
	func: F,
	options: CacheOptions<T, E>,
	pool: impl FnOnce(Build<A, T, E>) -> InstanceCache<A, Cache<T, E>>,
) -> CacheFactory<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
	F: Fn(CacheContext<T, E>, A) -> Fut + 'static,
	Fut: Future<Output = Result<T, E>> + 'static,
{
	let func = Rc::new(func);
	let instance_options = options.clone();

	let pool = pool(Box::new(move |args: &A| {
		let func = func.clone();
		let args = args.clone();
		Cache::from_func(
			Box::new(move |cx: CacheContext<T, E>| (*func)(cx, args.clone()).boxed_local()),
			&instance_options,
		)
	}));

	let factory = CacheFactory {
		body: Rc::new(FactoryBody {
			name: options.name,
			pool,
		}),
	};

	options.registry.enroll(
		&factory,
		options.resource_group.as_ref(),
		options.invalidate_on_window_focus,
	);

	factory
}

pub struct CacheFactory<A, T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	body: Rc<FactoryBody<A, T, E>>,
}

struct FactoryBody<A, T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	name: &'static str,
	pool: InstanceCache<A, Cache<T, E>>,
}

impl<A, T, E> Clone for CacheFactory<A, T, E>
where
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn clone(&self) -> Self {
		CacheFactory {
			body: self.body.clone(),
		}
	}
}

impl<A, T, E> CacheFactory<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
{
	pub fn name(&self) -> &'static str {
		self.body.name
	}

	/// The cache for `args`, built on first use.
	pub fn get(&self, args: A) -> Cache<T, E> {
		self.body.pool.get(args)
	}

	pub fn instances(&self) -> Vec<Cache<T, E>> {
		self.body.pool.values()
	}

	pub fn entries(&self) -> Vec<(A, Cache<T, E>)> {
		self.body.pool.entries()
	}

	pub fn invalidate_all(&self) {
		self.body.invalidate_where(|_| true)
	}

	pub fn invalidate_all_where(&self, filter: impl Fn(&A) -> bool) {
		self.body.invalidate_where(filter)
	}

	pub fn clear_all(&self) {
		self.body.clear_where(|_| true)
	}

	pub fn clear_all_where(&self, filter: impl Fn(&A) -> bool) {
		self.body.clear_where(filter)
	}

	/// Stops demoting unused instances.
	pub fn stop(&self) {
		self.body.pool.stop()
	}
}

impl<A, T, E> FactoryBody<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn invalidate_where(&self, filter: impl Fn(&A) -> bool) {
		let matching: Vec<_> = self
			.pool
			.entries()
			.into_iter()
			.filter(|(args, _)| filter(args))
			.collect();

		tracing::debug!(factory = self.name, instances = matching.len(), "invalidating instances");
		for (_, cache) in matching {
			cache.invalidate();
		}
	}

	fn clear_where(&self, filter: impl Fn(&A) -> bool) {
		let matching: Vec<_> = self
			.pool
			.entries()
			.into_iter()
			.filter(|(args, _)| filter(args))
			.collect();

		tracing::debug!(factory = self.name, instances = matching.len(), "clearing instances");
		for (_, cache) in matching {
			cache.clear();
		}
	}
}

impl<A, T, E> Resource for FactoryBody<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn invalidate_all(&self) {
		self.invalidate_where(|_| true)
	}

	fn clear_all(&self) {
		self.clear_where(|_| true)
	}
}

impl<A, T, E> AsResource for CacheFactory<A, T, E>
where
	A: Clone + 'static,
	T: Clone + 'static,
	E: Clone + 'static,
{
	fn as_resource(&self) -> Weak<dyn Resource> {
		Rc::downgrade(&self.body) as Weak<dyn Resource>
	}
}

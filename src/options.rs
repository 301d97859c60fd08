use std::rc::Rc;
use std::time::Duration;

use crate::cache_state::CacheState;
use crate::registry::Registry;
use crate::resource_group::ResourceGroup;

/// When [`Cache::get_with`](crate::Cache::get_with) starts a new computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Update {
	/// Only when there is no promise at all, not even a stale one.
	WhenMissing,
	/// When there is no current promise.
	#[default]
	WhenStale,
	/// Always.
	Force,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
	pub update: Update,
	/// When a new computation starts, answer with the previous promise
	/// instead of waiting for the new one.
	pub background_update: bool,
}

impl GetOptions {
	pub fn update(mut self, update: Update) -> Self {
		self.update = update;
		self
	}

	pub fn background() -> Self {
		GetOptions {
			update: Update::WhenStale,
			background_update: true,
		}
	}

	pub fn force() -> Self {
		GetOptions {
			update: Update::Force,
			background_update: false,
		}
	}
}

/// Delay after which a settled cache invalidates itself.
pub enum InvalidateAfter<T, E> {
	Fixed(Duration),
	/// Decided from the state right after each update. `None` disables the timer.
	Dynamic(Rc<dyn Fn(&CacheState<T, E>) -> Option<Duration>>),
}

impl<T, E> Clone for InvalidateAfter<T, E> {
	fn clone(&self) -> Self {
		match self {
			InvalidateAfter::Fixed(delay) => InvalidateAfter::Fixed(*delay),
			InvalidateAfter::Dynamic(func) => InvalidateAfter::Dynamic(func.clone()),
		}
	}
}

impl<T, E> InvalidateAfter<T, E> {
	pub fn dynamic(func: impl Fn(&CacheState<T, E>) -> Option<Duration> + 'static) -> Self {
		InvalidateAfter::Dynamic(Rc::new(func))
	}

	pub(crate) fn delay_for(&self, state: &CacheState<T, E>) -> Option<Duration> {
		match self {
			InvalidateAfter::Fixed(delay) => Some(*delay),
			InvalidateAfter::Dynamic(func) => func(state),
		}
	}
}

impl<T, E> std::fmt::Debug for InvalidateAfter<T, E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			InvalidateAfter::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
			InvalidateAfter::Dynamic(_) => f.write_str("Dynamic(..)"),
		}
	}
}

pub struct CacheOptions<T, E> {
	pub name: &'static str,
	pub invalidate_after: Option<InvalidateAfter<T, E>>,
	pub invalidate_on_window_focus: bool,
	pub invalidate_on_activation: bool,
	/// Turn every invalidation into a clear.
	pub clear_on_invalidate: bool,
	/// For factories: how long an instance nobody asked for stays strongly held.
	pub clear_unused_after: Option<Duration>,
	/// Group to join instead of the registry's default group.
	pub resource_group: Option<ResourceGroup>,
	pub registry: Rc<Registry>,
}

impl<T, E> Clone for CacheOptions<T, E> {
	fn clone(&self) -> Self {
		CacheOptions {
			name: self.name,
			invalidate_after: self.invalidate_after.clone(),
			invalidate_on_window_focus: self.invalidate_on_window_focus,
			invalidate_on_activation: self.invalidate_on_activation,
			clear_on_invalidate: self.clear_on_invalidate,
			clear_unused_after: self.clear_unused_after,
			resource_group: self.resource_group.clone(),
			registry: self.registry.clone(),
		}
	}
}

impl<T, E> Default for CacheOptions<T, E> {
	fn default() -> Self {
		CacheOptions::from_registry(&Registry::current())
	}
}

impl<T, E> CacheOptions<T, E> {
	/// Options seeded with the defaults of `registry`. Caches built from them
	/// join that registry's groups.
	pub fn from_registry(registry: &Rc<Registry>) -> Self {
		let defaults = registry.defaults();
		CacheOptions {
			name: "<cache>",
			invalidate_after: defaults.invalidate_after.map(InvalidateAfter::Fixed),
			invalidate_on_window_focus: defaults.invalidate_on_window_focus,
			invalidate_on_activation: defaults.invalidate_on_activation,
			clear_on_invalidate: defaults.clear_on_invalidate,
			clear_unused_after: defaults.clear_unused_after,
			resource_group: None,
			registry: registry.clone(),
		}
	}

	pub fn name(mut self, name: &'static str) -> Self {
		self.name = name;
		self
	}

	pub fn invalidate_after(mut self, delay: Duration) -> Self {
		self.invalidate_after = Some(InvalidateAfter::Fixed(delay));
		self
	}

	pub fn invalidate_after_with(
		mut self,
		func: impl Fn(&CacheState<T, E>) -> Option<Duration> + 'static,
	) -> Self {
		self.invalidate_after = Some(InvalidateAfter::dynamic(func));
		self
	}

	pub fn invalidate_on_window_focus(mut self, enabled: bool) -> Self {
		self.invalidate_on_window_focus = enabled;
		self
	}

	pub fn invalidate_on_activation(mut self, enabled: bool) -> Self {
		self.invalidate_on_activation = enabled;
		self
	}

	pub fn clear_on_invalidate(mut self, enabled: bool) -> Self {
		self.clear_on_invalidate = enabled;
		self
	}

	pub fn clear_unused_after(mut self, delay: Option<Duration>) -> Self {
		self.clear_unused_after = delay;
		self
	}

	pub fn resource_group(mut self, group: &ResourceGroup) -> Self {
		self.resource_group = Some(group.clone());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::registry::CacheDefaults;

	#[test]
	fn options_start_from_registry_defaults() {
		let registry = Rc::new(Registry::new());
		registry.set_defaults(CacheDefaults {
			invalidate_after: Some(Duration::from_secs(5)),
			clear_on_invalidate: true,
			..CacheDefaults::default()
		});

		let options = CacheOptions::<u32, ()>::from_registry(&registry);
		assert!(options.clear_on_invalidate);
		assert!(!options.invalidate_on_window_focus);
		let delay = options
			.invalidate_after
			.as_ref()
			.and_then(|after| after.delay_for(&CacheState::pending()));
		assert_eq!(delay, Some(Duration::from_secs(5)));

		let options = options.clear_on_invalidate(false);
		assert!(!options.clear_on_invalidate);
	}

	#[test]
	fn dynamic_delay_sees_the_state() {
		let after = InvalidateAfter::<u32, ()>::dynamic(|state| {
			state.get_value().map(|v| Duration::from_millis(u64::from(*v)))
		});
		assert_eq!(after.delay_for(&CacheState::pending()), None);
		assert_eq!(after.delay_for(&CacheState::value(20)), Some(Duration::from_millis(20)));
	}
}

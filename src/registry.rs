use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::resource_group::{AsResource, ResourceGroup};

/// Defaults applied to every [`CacheOptions`](crate::CacheOptions) built from a registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheDefaults {
	pub invalidate_after: Option<Duration>,
	pub invalidate_on_window_focus: bool,
	pub invalidate_on_activation: bool,
	pub clear_on_invalidate: bool,
	pub clear_unused_after: Option<Duration>,
}

/// Process-wide state shared by caches: the default resource group, the
/// caches that follow window focus, and default options.
///
/// Each thread gets one registry, created on first use by
/// [`Registry::current`]. A registry can also be built by hand and handed to
/// [`CacheOptions::from_registry`](crate::CacheOptions::from_registry).
pub struct Registry {
	all_resources: ResourceGroup,
	focus_resources: ResourceGroup,
	defaults: RefCell<CacheDefaults>,
}

thread_local! {
	static REGISTRY: Rc<Registry> = Rc::new(Registry::new());
}

impl Default for Registry {
	fn default() -> Self {
		Registry::new()
	}
}

impl Registry {
	pub fn new() -> Self {
		Registry {
			all_resources: ResourceGroup::new_with_name("all resources"),
			focus_resources: ResourceGroup::new_with_name("window focus"),
			defaults: RefCell::new(CacheDefaults::default()),
		}
	}

	pub fn current() -> Rc<Registry> {
		REGISTRY.with(Rc::clone)
	}

	/// Every cache created without an explicit resource group.
	pub fn all_resources(&self) -> &ResourceGroup {
		&self.all_resources
	}

	pub fn focus_resources(&self) -> &ResourceGroup {
		&self.focus_resources
	}

	/// Invalidates every cache created with `invalidate_on_window_focus`.
	pub fn notify_window_focus(&self) {
		tracing::debug!("window focused");
		self.focus_resources.invalidate_all();
	}

	pub fn defaults(&self) -> CacheDefaults {
		self.defaults.borrow().clone()
	}

	pub fn set_defaults(&self, defaults: CacheDefaults) {
		*self.defaults.borrow_mut() = defaults;
	}

	pub(crate) fn enroll(
		&self,
		resource: &impl AsResource,
		group: Option<&ResourceGroup>,
		follow_focus: bool,
	) {
		group.unwrap_or(&self.all_resources).add(resource);
		if follow_focus {
			self.focus_resources.add(resource);
		}
	}
}

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::WeakAddr;

/// Anything that can be invalidated or cleared in bulk.
pub trait Resource {
	fn invalidate_all(&self);
	fn clear_all(&self);
}

/// Gives out the weak reference a [`ResourceGroup`] stores.
pub trait AsResource {
	fn as_resource(&self) -> Weak<dyn Resource>;
}

impl<R: Resource + 'static> AsResource for Rc<R> {
	fn as_resource(&self) -> Weak<dyn Resource> {
		Rc::downgrade(self) as Weak<dyn Resource>
	}
}

/// A weakly held set of resources.
///
/// Membership never keeps a resource alive. Members that were dropped are
/// pruned whenever the group is touched, so bulk operations only ever reach
/// live members.
#[derive(Clone)]
pub struct ResourceGroup {
	body: Rc<GroupBody>,
}

struct GroupBody {
	name: &'static str,
	members: RefCell<BTreeSet<WeakAddr<dyn Resource>>>,
}

impl Default for ResourceGroup {
	fn default() -> Self {
		ResourceGroup::new()
	}
}

impl ResourceGroup {
	pub fn new() -> Self {
		Self::new_with_name("<group>")
	}

	pub fn new_with_name(name: &'static str) -> Self {
		ResourceGroup {
			body: Rc::new(GroupBody {
				name,
				members: RefCell::new(BTreeSet::new()),
			}),
		}
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	pub fn add(&self, resource: &impl AsResource) {
		self.add_weak(resource.as_resource())
	}

	pub fn add_weak(&self, resource: Weak<dyn Resource>) {
		let mut members = self.body.members.borrow_mut();
		members.retain(|member| member.strong_count() > 0);
		members.insert(WeakAddr::new(resource));
	}

	pub fn remove(&self, resource: &impl AsResource) {
		let resource = WeakAddr::new(resource.as_resource());
		self.body.members.borrow_mut().remove(&resource);
	}

	pub fn invalidate_all(&self) {
		let members = self.live();
		tracing::debug!(group = self.body.name, members = members.len(), "invalidate all");
		for member in members {
			member.invalidate_all();
		}
	}

	pub fn clear_all(&self) {
		let members = self.live();
		tracing::debug!(group = self.body.name, members = members.len(), "clear all");
		for member in members {
			member.clear_all();
		}
	}

	/// Number of live members.
	pub fn len(&self) -> usize {
		self.live().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	// Members are upgraded before any of them runs, so a member may add to
	// or remove from the group while being invalidated.
	fn live(&self) -> SmallVec<[Rc<dyn Resource>; 8]> {
		let mut members = self.body.members.borrow_mut();
		members.retain(|member| member.strong_count() > 0);
		members.iter().filter_map(|member| member.upgrade()).collect()
	}
}

impl Resource for ResourceGroup {
	fn invalidate_all(&self) {
		ResourceGroup::invalidate_all(self)
	}

	fn clear_all(&self) {
		ResourceGroup::clear_all(self)
	}
}

impl std::fmt::Debug for ResourceGroup {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceGroup")
			.field("name", &self.body.name)
			.field("members", &self.body.members.borrow().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;

	use super::*;

	#[derive(Default)]
	struct Counter {
		invalidated: Cell<u32>,
		cleared: Cell<u32>,
	}

	impl Resource for Counter {
		fn invalidate_all(&self) {
			self.invalidated.set(self.invalidated.get() + 1);
		}

		fn clear_all(&self) {
			self.cleared.set(self.cleared.get() + 1);
		}
	}

	#[test]
	fn reaches_live_members_only() {
		let group = ResourceGroup::new();
		let kept = Rc::new(Counter::default());
		let dropped = Rc::new(Counter::default());

		group.add(&kept);
		group.add(&dropped);
		group.add(&kept);
		assert_eq!(group.len(), 2);

		let observer = Rc::downgrade(&dropped);
		drop(dropped);
		assert!(observer.upgrade().is_none());
		assert_eq!(group.len(), 1);

		group.invalidate_all();
		group.clear_all();
		assert_eq!(kept.invalidated.get(), 1);
		assert_eq!(kept.cleared.get(), 1);
	}

	#[test]
	fn membership_does_not_keep_alive() {
		let group = ResourceGroup::new();
		let member = Rc::new(Counter::default());
		group.add(&member);

		let weak = Rc::downgrade(&member);
		drop(member);
		assert!(weak.upgrade().is_none());
		assert!(group.is_empty());
	}

	#[test]
	fn groups_nest() {
		let outer = ResourceGroup::new();
		let inner = Rc::new(ResourceGroup::new());
		let member = Rc::new(Counter::default());

		inner.add(&member);
		outer.add(&inner);
		outer.invalidate_all();

		assert_eq!(member.invalidated.get(), 1);
	}
}

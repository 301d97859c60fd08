use std::cmp::Ordering;
use std::ops::Deref;
use std::rc::{Rc, Weak};

/// Pointer identity of a shared allocation, independent of its type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Addr(usize);

impl Addr {
	pub fn of<T: ?Sized>(ptr: &Rc<T>) -> Self {
		Addr(Rc::as_ptr(ptr) as *const () as usize)
	}

	pub fn of_weak<T: ?Sized>(ptr: &Weak<T>) -> Self {
		Addr(Weak::as_ptr(ptr) as *const () as usize)
	}
}

pub struct WeakAddr<T: ?Sized> {
	ptr: Weak<T>,
}

impl<T: ?Sized> WeakAddr<T> {
	pub fn new(ptr: Weak<T>) -> Self {
		WeakAddr { ptr }
	}

	pub fn addr(&self) -> Addr {
		Addr::of_weak(&self.ptr)
	}
}

impl<T: ?Sized> Clone for WeakAddr<T> {
	fn clone(&self) -> Self {
		WeakAddr {
			ptr: self.ptr.clone(),
		}
	}
}

impl<T: ?Sized> Deref for WeakAddr<T> {
	type Target = Weak<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for WeakAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl<T: ?Sized> Eq for WeakAddr<T> {}

impl<T: ?Sized> Ord for WeakAddr<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr().cmp(&other.addr())
	}
}

impl<T: ?Sized> PartialOrd for WeakAddr<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T: ?Sized> std::fmt::Debug for WeakAddr<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("WeakAddr").field(&self.addr()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn weak_addr_follows_allocation() {
		let a = Rc::new(1);
		let b = Rc::new(1);

		assert_eq!(WeakAddr::new(Rc::downgrade(&a)), WeakAddr::new(Rc::downgrade(&a)));
		assert_ne!(WeakAddr::new(Rc::downgrade(&a)), WeakAddr::new(Rc::downgrade(&b)));
		assert_eq!(Addr::of(&a), WeakAddr::new(Rc::downgrade(&a)).addr());
	}
}

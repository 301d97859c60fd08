//! Read tracking over plain values.
//!
//! A [`Tracked`] wraps a snapshot of a value and records every read made
//! through it. [`Tracked::equals`] later replays those reads against a
//! candidate value, so two values that only differ in parts nobody looked at
//! compare equal.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use smallvec::SmallVec;

type Check<T> = Box<dyn Fn(&T) -> bool>;

pub struct Tracked<T> {
	value: Rc<T>,
	checks: Rc<RefCell<SmallVec<[Check<T>; 2]>>>,
}

impl<T> Clone for Tracked<T> {
	fn clone(&self) -> Self {
		Tracked {
			value: self.value.clone(),
			checks: self.checks.clone(),
		}
	}
}

impl<T: 'static> Tracked<T> {
	pub fn new(value: T) -> Self {
		Tracked {
			value: Rc::new(value),
			checks: Rc::new(RefCell::new(SmallVec::new())),
		}
	}

	/// Reads the whole value.
	pub fn get(&self) -> T
	where
		T: Clone + PartialEq,
	{
		let value = self.value.clone();
		self.record(move |candidate| candidate == &*value);
		(*self.value).clone()
	}

	/// Reads a projection of the value. Only the projection takes part in
	/// later comparisons.
	pub fn read<S>(&self, func: impl Fn(&T) -> S + 'static) -> S
	where
		S: Clone + PartialEq + 'static,
	{
		let seen = func(&self.value);
		let expected = seen.clone();
		self.record(move |candidate| func(candidate) == expected);
		seen
	}

	/// Descends into a part of the value. Reads made through the returned
	/// tracker are replayed against the same part of a candidate.
	pub fn field<S>(&self, func: impl Fn(&T) -> &S + 'static) -> Tracked<S>
	where
		S: Clone + 'static,
	{
		let child = Tracked::new(func(&self.value).clone());
		let checks = child.checks.clone();
		self.record(move |candidate| {
			let part = func(candidate);
			checks.borrow().iter().all(|check| check(part))
		});
		child
	}

	/// Looks at the value without recording a read.
	pub fn peek(&self) -> &T {
		&self.value
	}

	pub fn equals(&self, candidate: &T) -> bool {
		self.checks.borrow().iter().all(|check| check(candidate))
	}

	pub fn reads(&self) -> usize {
		self.checks.borrow().len()
	}

	fn record(&self, check: impl Fn(&T) -> bool + 'static) {
		self.checks.borrow_mut().push(Box::new(check));
	}
}

impl<T: Debug> Debug for Tracked<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tracked")
			.field("value", &self.value)
			.field("reads", &self.checks.borrow().len())
			.finish()
	}
}

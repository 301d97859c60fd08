//! The computed side of [`Store`](crate::Store).
//!
//! A computed store keeps the [`Dependencies`] of its last computation: one
//! check per store it read, comparing only what was actually read. Reads
//! validate those checks and reuse the cached value when they all hold.
//! While the store has subscribers it also listens to its dependencies and
//! recomputes (and notifies) as soon as one of them changes in a way the
//! computation could observe.

use std::cell::Cell;
use std::rc::Rc;

use crate::dependencies::{Dependencies, Invalidate};
use crate::error::Error;
use crate::evaluation::Evaluation;
use crate::store::StoreBody;
use crate::subscription::Teardown;

struct Computing<'a> {
	flag: &'a Cell<bool>,
}

impl<'a> Computing<'a> {
	fn enter(flag: &'a Cell<bool>) -> Self {
		flag.set(true);
		Computing { flag }
	}
}

impl Drop for Computing<'_> {
	fn drop(&mut self) {
		self.flag.set(false);
	}
}

impl<T> StoreBody<T>
where
	T: Clone + 'static,
{
	pub(crate) fn refresh(&self) -> Result<T, Error> {
		if self.computing.get() {
			return Err(Error::CircularReference { store: self.name });
		}

		let snapshot = self.dependencies.borrow().snapshot();
		if let Some(based_on) = snapshot {
			if Dependencies::are_valid(&based_on) {
				if let Some(value) = self.value.borrow().clone() {
					return Ok(value);
				}
			}
		}

		self.recompute()
	}

	fn recompute(&self) -> Result<T, Error> {
		let Some(func) = self.func.as_ref() else {
			return self.try_get();
		};

		let evaluation = Evaluation::new();
		let value = {
			let _computing = Computing::enter(&self.computing);
			let _span = tracing::trace_span!("compute", store = self.name).entered();
			func(&evaluation)
		};

		let mut next = Dependencies::computed(evaluation.take());
		if self.is_active() {
			let based_on = next.based_on();
			next.set_subscriptions(Dependencies::listen_to(&based_on, &self.on_dependency_change()));
		}

		tracing::trace!(store = self.name, dependencies = next.len(), "computed");

		let previous = self.dependencies.borrow_mut().swap(next);
		*self.value.borrow_mut() = Some(value.clone());
		drop(previous);

		self.notify();
		Ok(value)
	}

	pub(crate) fn install_connection(&self) {
		let weak = self.this.clone();
		self.insert_effect(
			Rc::new(move || {
				if let Some(this) = weak.upgrade() {
					this.connect();
				}

				let weak = weak.clone();
				Box::new(move || {
					if let Some(this) = weak.upgrade() {
						this.disconnect();
					}
				}) as Teardown
			}),
			None,
		);
	}

	fn connect(&self) {
		if let Err(error) = self.refresh() {
			tracing::error!(store = self.name, %error, "cannot compute on activation");
			return;
		}

		let based_on = {
			let dependencies = self.dependencies.borrow();
			if dependencies.is_listening() {
				return;
			}
			dependencies.based_on()
		};

		let subscriptions = Dependencies::listen_to(&based_on, &self.on_dependency_change());
		self.dependencies.borrow_mut().set_subscriptions(subscriptions);
	}

	fn disconnect(&self) {
		let subscriptions = self.dependencies.borrow_mut().unlisten();
		drop(subscriptions);
	}

	fn on_dependency_change(&self) -> Rc<dyn Fn()> {
		let weak = self.this.clone();
		Rc::new(move || {
			if let Some(this) = weak.upgrade() {
				this.dependency_changed();
			}
		})
	}

	fn dependency_changed(&self) {
		// the running computation is checked again on the next read
		if self.computing.get() {
			return;
		}

		let snapshot = self.dependencies.borrow().snapshot();
		if let Some(based_on) = snapshot {
			if Dependencies::are_valid(&based_on) {
				tracing::trace!(store = self.name, "dependency changed outside of what was read");
				return;
			}
		}

		if let Err(error) = self.recompute() {
			tracing::error!(store = self.name, %error, "cannot recompute");
		}
	}

	pub(crate) fn invalidate_computation(&self) {
		if self.func.is_none() {
			return;
		}

		self.dependencies.borrow_mut().invalidate();

		if self.is_active() {
			if let Err(error) = self.recompute() {
				tracing::error!(store = self.name, %error, "cannot recompute");
			}
		}
	}
}

impl<T> Invalidate for StoreBody<T>
where
	T: Clone + 'static,
{
	fn invalidate(&self, recursive: bool) {
		if recursive {
			let based_on = self.dependencies.borrow().based_on();
			for source in Dependencies::sources(&based_on) {
				source.invalidate(true);
			}
		}

		self.invalidate_computation();
	}

	fn clear(&self, recursive: bool) {
		if recursive {
			let based_on = self.dependencies.borrow().based_on();
			for source in Dependencies::sources(&based_on) {
				source.clear(true);
			}
		}

		self.invalidate_computation();
	}
}

use std::fmt::Debug;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Status<T, E> {
	/// Nothing has been produced yet.
	Pending,
	Value(T),
	Error(E),
}

/// What a [`Cache`](crate::Cache) currently knows.
///
/// `Pending` is always stale. `is_updating` is set only while a
/// replacement computation is in flight; `is_connected` while a push
/// channel opened with [`CacheContext::connect`](crate::CacheContext::connect)
/// is live.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CacheState<T, E> {
	pub status: Status<T, E>,
	pub is_stale: bool,
	pub is_updating: bool,
	pub is_connected: bool,
}

impl<T, E> Default for CacheState<T, E> {
	fn default() -> Self {
		CacheState::pending()
	}
}

impl<T, E> CacheState<T, E> {
	pub fn pending() -> Self {
		CacheState {
			status: Status::Pending,
			is_stale: true,
			is_updating: false,
			is_connected: false,
		}
	}

	pub fn value(value: T) -> Self {
		CacheState {
			status: Status::Value(value),
			is_stale: false,
			is_updating: false,
			is_connected: false,
		}
	}

	pub fn error(error: E) -> Self {
		CacheState {
			status: Status::Error(error),
			is_stale: false,
			is_updating: false,
			is_connected: false,
		}
	}

	pub(crate) fn settled(result: Result<T, E>) -> Self {
		match result {
			Ok(value) => CacheState::value(value),
			Err(error) => CacheState::error(error),
		}
	}

	pub fn is_pending(&self) -> bool {
		matches!(self.status, Status::Pending)
	}

	pub fn get_value(&self) -> Option<&T> {
		match &self.status {
			Status::Value(value) => Some(value),
			_ => None,
		}
	}

	pub fn get_error(&self) -> Option<&E> {
		match &self.status {
			Status::Error(error) => Some(error),
			_ => None,
		}
	}

	pub(crate) fn stale(mut self) -> Self {
		self.is_stale = true;
		self
	}

	pub(crate) fn updating(mut self, is_updating: bool) -> Self {
		self.is_updating = is_updating;
		self
	}

	pub(crate) fn connected(mut self, is_connected: bool) -> Self {
		self.is_connected = is_connected;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pending_is_stale() {
		let state = CacheState::<u32, String>::pending();
		assert!(state.is_pending());
		assert!(state.is_stale);
		assert!(!state.is_updating);
	}

	#[test]
	fn settled_values_are_fresh() {
		let state = CacheState::<u32, String>::settled(Ok(1));
		assert_eq!(state.get_value(), Some(&1));
		assert!(!state.is_stale);

		let state = CacheState::<u32, String>::settled(Err("boom".into())).stale();
		assert_eq!(state.get_error().map(String::as_str), Some("boom"));
		assert!(state.is_stale);
	}
}

use std::fmt::Debug;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// The key an argument list is pooled under when no key function is given.
pub fn key_of<T: Hash + ?Sized>(args: &T) -> u64 {
	fxhash::hash64(args)
}

/// Call arguments together with their pool key.
///
/// Equality and hashing only look at the key, so two argument lists that a
/// custom key function maps to the same key are the same entry.
pub struct Hashed<T> {
	pub value: T,
	pub hash: u64,
}

impl<T> Hashed<T> {
	pub fn new(value: T) -> Self
	where
		T: Hash,
	{
		let hash = key_of(&value);
		Self { value, hash }
	}

	pub fn with_key(value: T, key: impl FnOnce(&T) -> u64) -> Self {
		let hash = key(&value);
		Self { value, hash }
	}

	pub fn into_inner(self) -> T {
		self.value
	}
}

impl<T: Clone> Clone for Hashed<T> {
	fn clone(&self) -> Self {
		Hashed {
			value: self.value.clone(),
			hash: self.hash,
		}
	}
}

impl<T> PartialEq for Hashed<T> {
	fn eq(&self, other: &Self) -> bool {
		self.hash == other.hash
	}
}

impl<T> Eq for Hashed<T> {}

impl<T> Hash for Hashed<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.hash)
	}
}

impl<T> Deref for Hashed<T> {
	type Target = T;
	fn deref(&self) -> &Self::Target {
		&self.value
	}
}

impl<T> Debug for Hashed<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:?}#{:016x}", self.value, self.hash)
	}
}

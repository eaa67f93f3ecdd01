/*
 * Copyright 2026 lux contributors
 *
 * This file is part of lux.
 *
 * lux is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * lux is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * lux. If not, see <https://www.gnu.org/licenses/>.
 */

use std::sync::{MutexGuard, TryLockError};

/// A mutual-exclusion lock that never returns a poison error: a poisoned lock panics on the
/// next access, the same way a corrupted kernel spinlock would, rather than asking every call
/// site to reason about recovering from a panic mid-critical-section.
pub struct Mutex<T: ?Sized>(std::sync::Mutex<T>);

impl<T> Mutex<T> {
	pub const fn new(value: T) -> Self {
		Self(std::sync::Mutex::new(value))
	}
}

impl<T: ?Sized> Mutex<T> {
	/// Acquires the lock, blocking the calling (host) thread until available.
	///
	/// Named `lock` rather than `acquireLockBlocking` (as in the original C source) to read as
	/// idiomatic Rust; the blocking semantics are identical.
	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.0.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Attempts to acquire the lock without blocking.
	pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
		match self.0.try_lock() {
			Ok(guard) => Some(guard),
			Err(TryLockError::WouldBlock) => None,
			Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
		}
	}
}

impl<T: Default> Default for Mutex<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

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

//! A reference-counted pointer whose constructor reports allocation failure.
//!
//! `maestro` wraps `alloc::sync::Arc` in its own `Arc` so that `Arc::new` returns
//! `AllocResult<Self>` instead of aborting on OOM, since a `no_std` kernel cannot rely on the
//! global allocator's default abort handler. The host allocator backing this workspace does not
//! realistically fail, but the fallible constructor is kept so call sites (`Arc::new(...)?`)
//! read the same way.

use crate::errno::AllocResult;
use std::ops::Deref;

#[derive(Debug)]
pub struct Arc<T: ?Sized>(std::sync::Arc<T>);

impl<T> Arc<T> {
	pub fn new(value: T) -> AllocResult<Self> {
		Ok(Self(std::sync::Arc::new(value)))
	}
}

impl<T: ?Sized> Clone for Arc<T> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<T: ?Sized> Deref for Arc<T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.0
	}
}

impl<T: ?Sized> PartialEq for Arc<T> {
	fn eq(&self, other: &Self) -> bool {
		std::sync::Arc::ptr_eq(&self.0, &other.0)
	}
}

impl<T: ?Sized> Eq for Arc<T> {}

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

//! Thin re-exports over `alloc`/`std` collections, kept under the same module paths `maestro`
//! uses (`utils::collections::{vec, btreemap, path}`) so call sites in the kernel crate read the
//! same regardless of which workspace they live in.

pub mod path;

/// Re-exported so the kernel crate can write `utils::collections::vec::Vec` as `maestro` does,
/// even though it is a plain `std::vec::Vec` here.
pub mod vec {
	pub use std::vec::Vec;
}

/// Re-exported ordered map, used for the VMM's gap/mapping trees and the syscall-id→thread
/// completion index.
pub mod btreemap {
	pub use std::collections::BTreeMap;
}

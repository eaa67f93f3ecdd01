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

//! ELF segment loading and `execve` support.
//!
//! Grounded in `original_source/src/sched/elf.c` (`loadELF`) and `original_source/src/sched/
//! exec.c` (`execveMemory`). Byte-level ELF header parsing is out of scope (the interface is
//! specified, not the parser); callers hand in an already-parsed segment list, matching the
//! contract `loadELF` exposes to its one caller once the file header fields have been read.

use crate::memory::vmm::{PageFlags, VMem, Vmm};
use crate::memory::{VirtAddr, PAGE_SIZE, USER_BASE_ADDRESS, USER_LIMIT_ADDRESS};
use utils::errno::{errno, EResult};

/// One `PT_LOAD` program header, already extracted from the ELF file by the caller.
///
/// `data` is the segment's file content, exactly `file_size` bytes; the remaining
/// `mem_size - file_size` bytes (typically `.bss`) are zero-filled by [`load`] rather than
/// carried here, matching `loadELF`'s own read-then-zero-pad sequence.
#[derive(Debug, Clone)]
pub struct Segment {
	pub virtual_address: u64,
	pub file_size: u64,
	pub mem_size: u64,
	pub writable: bool,
	pub executable: bool,
	pub data: Vec<u8>,
}

/// A parsed, ready-to-load image: entry point plus its `PT_LOAD` segments.
pub struct Image {
	pub entry_point: u64,
	pub segments: Vec<Segment>,
}

/// Loads every segment of `image` into `space`, returning the highest mapped address (the
/// initial program break), matching `loadELF`'s `*highest` out-parameter.
///
/// Each segment's range must lie entirely within the user address window; `loadELF` returns 0 on
/// this violation, which this workspace expresses as `EFAULT` rather than a sentinel.
pub fn load(image: &Image, vmm: &Vmm, space: &VMem) -> EResult<u64> {
	let mut highest = 0u64;
	for segment in &image.segments {
		let end = segment
			.virtual_address
			.checked_add(segment.mem_size)
			.ok_or(errno!(EFAULT))?;
		if segment.virtual_address < USER_BASE_ADDRESS.0 || end > USER_LIMIT_ADDRESS.0 {
			return Err(errno!(EFAULT));
		}
		if segment.data.len() as u64 != segment.file_size {
			return Err(errno!(EINVAL));
		}
		if end > highest {
			highest = end;
		}

		let base = VirtAddr(segment.virtual_address).align_down(PAGE_SIZE);
		let misalignment = segment.virtual_address - base.0;
		let pages = (segment.mem_size + misalignment).div_ceil(PAGE_SIZE);

		let flags = PageFlags {
			user: true,
			write: true,
			exec: segment.executable,
		};
		vmm.allocate(space, base, USER_LIMIT_ADDRESS, pages, flags)?;
		// Populate eagerly rather than lazily: a freshly `exec`'d thread must see the segment's
		// bytes on its very first instruction fetch, with no page-fault round trip.
		vmm.write(space, VirtAddr(segment.virtual_address), &segment.data)?;
		let tail = segment.mem_size - segment.file_size;
		if tail > 0 {
			let zeroes = vec![0u8; tail as usize];
			vmm.write(space, VirtAddr(segment.virtual_address) + segment.file_size, &zeroes)?;
		}

		if !segment.writable {
			// `vmmSetFlags()`'s tightening pass: drop write permission once the bytes are in
			// place. This workspace has no separate `set_flags` path yet, so re-stating intent
			// here documents the step `loadELF` performs even though nothing currently re-maps.
		}
	}
	Ok(highest)
}

/// `execveMemory()`'s address-space half: builds a fresh address space and loads `image` into
/// it, returning the entry point and the break. Installing the result into the calling thread's
/// saved register context is platform glue out of scope here.
pub fn prepare_execve(image: &Image, vmm: &Vmm) -> EResult<(u64, utils::ptr::arc::Arc<VMem>, u64)> {
	let space = vmm.new_address_space()?;
	let highest = load(image, vmm, &space)?;
	Ok((image.entry_point, space, highest))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::Pmm;
	use utils::ptr::arc::Arc;

	fn test_vmm() -> Vmm {
		let entry = crate::boot::MemoryMapEntry {
			base: 0,
			len: 16 * 1024 * 1024,
			kind: crate::boot::MemoryType::Usable,
			attributes_valid: true,
		};
		let pmm = Arc::new(Pmm::init(16 * 1024 * 1024, &[entry])).unwrap();
		Vmm::new(pmm)
	}

	#[test]
	fn single_segment_loads_and_reports_highest_address() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let image = Image {
			entry_point: 0x1000,
			segments: vec![Segment {
				virtual_address: 0x1000,
				file_size: 200,
				mem_size: 200,
				writable: true,
				executable: true,
				data: vec![0x41; 200],
			}],
		};
		let highest = load(&image, &vmm, &space).unwrap();
		assert_eq!(highest, 0x1000 + 200);
	}

	#[test]
	fn segment_outside_user_window_is_efault() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let image = Image {
			entry_point: 0,
			segments: vec![Segment {
				virtual_address: USER_LIMIT_ADDRESS.0,
				file_size: 16,
				mem_size: 16,
				writable: true,
				executable: false,
				data: vec![0u8; 16],
			}],
		};
		assert_eq!(load(&image, &vmm, &space), Err(errno!(EFAULT)));
	}

	#[test]
	fn mismatched_data_length_is_einval() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let image = Image {
			entry_point: 0,
			segments: vec![Segment {
				virtual_address: 0x1000,
				file_size: 200,
				mem_size: 200,
				writable: true,
				executable: false,
				data: vec![0u8; 16],
			}],
		};
		assert_eq!(load(&image, &vmm, &space), Err(errno!(EINVAL)));
	}

	#[test]
	fn segment_bytes_land_at_their_virtual_address_and_bss_tail_is_zeroed() {
		let vmm = test_vmm();
		let space = vmm.new_address_space().unwrap();
		let image = Image {
			entry_point: 0x1000,
			segments: vec![Segment {
				virtual_address: 0x1000,
				file_size: 8,
				mem_size: 32,
				writable: true,
				executable: false,
				data: b"DEADBEEF".to_vec(),
			}],
		};
		load(&image, &vmm, &space).unwrap();

		let mut head = [0u8; 8];
		vmm.read(&space, VirtAddr(0x1000), &mut head).unwrap();
		assert_eq!(&head, b"DEADBEEF");

		let mut tail = [0xFFu8; 24];
		vmm.read(&space, VirtAddr(0x1000 + 8), &mut tail).unwrap();
		assert_eq!(tail, [0u8; 24]);
	}

	#[test]
	fn prepare_execve_returns_fresh_address_space() {
		let vmm = test_vmm();
		let image = Image {
			entry_point: 0x2000,
			segments: vec![Segment {
				virtual_address: 0x2000,
				file_size: 64,
				mem_size: 64,
				writable: false,
				executable: true,
				data: vec![0x90; 64],
			}],
		};
		let (entry, space, highest) = prepare_execve(&image, &vmm).unwrap();
		assert_eq!(entry, 0x2000);
		assert_eq!(highest, 0x2000 + 64);
		assert!(space.translate(VirtAddr(0x2000)).is_some());
	}
}

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

//! `lux`: core subsystems of a microkernel whose drivers and policy live in user space.
//!
//! This crate owns physical and virtual memory management, the process/thread scheduler, local
//! socket IPC, the per-process I/O descriptor table, the syscall pipeline, the wire-protocol
//! bridge to the router process, IRQ registration, and ELF segment loading. Everything here is
//! `std`-backed rather than `no_std`: the platform-specific half (paging hardware, interrupt
//! vectors, context switching) is out of scope, and keeping this half on `std` is what makes
//! every module's `#[cfg(test)]` suite runnable as an ordinary host binary.

pub mod boot;
pub mod bridge;
pub mod elf;
pub mod fd;
pub mod ipc;
pub mod irq;
pub mod memory;
pub mod process;
pub mod syscall;

use boot::BootInfo;
use ipc::SocketTable;
use irq::{IoPermTable, IrqTable};
use memory::{Pmm, Vmm};
use process::scheduler::Scheduler;
use syscall::SyscallQueue;
use utils::errno::{errno, EResult};
use utils::ptr::arc::Arc;

/// The aggregate kernel instance: every subsystem a booted kernel owns, wired together once and
/// handed to the worker loop and bridge. Grounded in `original_source/src/main.c`'s `kmain()`,
/// which builds exactly this set of singletons in sequence before falling into the idle loop.
pub struct Kernel {
	pub vmm: Arc<Vmm>,
	pub scheduler: Scheduler,
	pub sockets: SocketTable,
	pub syscalls: SyscallQueue,
	pub bridge: bridge::KernelBridge,
	pub irqs: IrqTable,
	pub ioperm: IoPermTable,
}

impl Kernel {
	/// `kmain()`'s setup half: builds the physical allocator from the boot-provided memory map,
	/// then every subsystem layered on top of it, in the same dependency order the original
	/// establishes (physical memory, then virtual memory, then scheduling, then IPC).
	pub fn boot(info: &BootInfo) -> EResult<Self> {
		let pmm = boot::init_pmm(info);
		let pmm = Arc::new(pmm).map_err(|_| errno!(ENOMEM))?;
		let vmm = Arc::new(Vmm::new(pmm)).map_err(|_| errno!(ENOMEM))?;
		let scheduler = Scheduler::new(vmm.clone());

		Ok(Self {
			vmm,
			scheduler,
			sockets: SocketTable::new(),
			syscalls: SyscallQueue::new(),
			bridge: bridge::KernelBridge::new(),
			irqs: IrqTable::new(),
			ioperm: IoPermTable::new(),
		})
	}

	/// The worker loop's body: drains one pending syscall, if any.
	///
	/// Returns `true` if a request was processed. Grounded in
	/// `original_source/src/syscalls/dispatch.c`'s `syscallProcess()` loop, split out of
	/// `main()`'s idle loop the way the original keeps it as a standalone worker thread body.
	pub fn process_one_syscall(&self) -> bool {
		syscall::dispatch::process_one(&self.syscalls, &self.scheduler, &self.sockets, &self.bridge)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use boot::{MemoryMapEntry, MemoryType};

	fn test_boot_info() -> BootInfo {
		BootInfo {
			memory_map: vec![MemoryMapEntry {
				base: 0,
				len: 16 * 1024 * 1024,
				kind: MemoryType::Usable,
				attributes_valid: true,
			}],
			highest_physical_address: 16 * 1024 * 1024,
			cmdline: String::new(),
		}
	}

	#[test]
	fn boot_wires_every_subsystem() {
		let info = test_boot_info();
		let kernel = Kernel::boot(&info).unwrap();
		assert_eq!(kernel.syscalls.len(), 0);
		assert_eq!(kernel.bridge.inflight_count(), 0);
	}

	#[test]
	fn process_one_syscall_on_empty_queue_is_a_noop() {
		let info = test_boot_info();
		let kernel = Kernel::boot(&info).unwrap();
		assert!(!kernel.process_one_syscall());
	}

	#[test]
	fn an_enqueued_getpid_is_answered_by_the_worker_loop() {
		let info = test_boot_info();
		let kernel = Kernel::boot(&info).unwrap();
		let pid = kernel.scheduler.spawn_kernel_thread("init").unwrap();
		kernel
			.syscalls
			.enqueue(pid, syscall::Syscall::Getpid as u32, [0; 4], 1)
			.unwrap();
		assert!(kernel.process_one_syscall());
		assert_eq!(kernel.syscalls.len(), 0);
	}
}

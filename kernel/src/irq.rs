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

//! IRQ handler registration/dispatch and per-thread I/O port permissions.
//!
//! Grounded in `original_source/src/irq.c` (`installIRQ`, `dispatchIRQ`) and
//! `original_source/src/include/kernel/irq.h` (`IRQHandler`, `IRQ`). User-space drivers register
//! by socket rather than function pointer, matching the original's `IRQHandler.socket` field; the
//! kernel-handler variant (`IRQHandler.khandler`) is platform entry-point glue this workspace has
//! no platform layer to call into, so it is modeled but never invoked here.

use crate::process::pid::Pid;
use crate::process::Process;
use std::collections::BTreeMap;
use utils::errno::{errno, EResult};
use utils::sync::Mutex;

/// One registered consumer of an IRQ pin.
#[derive(Debug, Clone)]
pub struct IrqHandler {
	pub name: String,
	/// The socket a user-space driver expects `IRQ` wire notifications on. `None` marks a
	/// kernel-level handler (the original's `kernel == 1`, `khandler` entry point).
	pub socket: Option<usize>,
}

#[derive(Default)]
struct IrqLine {
	handlers: Vec<IrqHandler>,
}

/// The platform's IRQ line count. `original_source` asks `platformGetMaxIRQ()`; this workspace
/// has no platform layer, so the count is a fixed upper bound wide enough for any real machine's
/// legacy PIC/APIC line count.
pub const MAX_IRQ: usize = 256;

/// `irqs` in the original: a sparse, lazily-sized table of per-pin handler lists.
pub struct IrqTable {
	lines: Mutex<BTreeMap<usize, IrqLine>>,
}

impl IrqTable {
	pub fn new() -> Self {
		Self {
			lines: Mutex::new(BTreeMap::new()),
		}
	}

	/// `installIRQ()`: registers `handler` on `pin`, restricted to root (`p->user` check becomes
	/// an explicit `process.user` read here since this workspace has no implicit "current
	/// process").
	pub fn install(&self, process: &Process, pin: usize, handler: IrqHandler) -> EResult<usize> {
		if process.user != 0 {
			return Err(errno!(EPERM));
		}
		if pin >= MAX_IRQ {
			return Err(errno!(EIO));
		}
		// No platform redirection table to consult, so the requested pin is always the actual
		// one: `platformConfigureIRQ()`'s return value degenerates to `pin` unchanged.
		let mut lines = self.lines.lock();
		lines.entry(pin).or_default().handlers.push(handler);
		Ok(pin)
	}

	/// `dispatchIRQ()`: returns the sockets of every handler registered on `pin`, for the caller
	/// to notify over the bridge. The original's body is a stub that only acknowledges the
	/// interrupt; this workspace does the useful half a real implementation would add next.
	pub fn dispatch(&self, pin: usize) -> Vec<usize> {
		let lines = self.lines.lock();
		match lines.get(&pin) {
			Some(line) => line.handlers.iter().filter_map(|h| h.socket).collect(),
			None => Vec::new(),
		}
	}

	pub fn handler_count(&self, pin: usize) -> usize {
		self.lines.lock().get(&pin).map_or(0, |l| l.handlers.len())
	}
}

impl Default for IrqTable {
	fn default() -> Self {
		Self::new()
	}
}

/// The number of legacy I/O ports (`ioperm`'s bitmap covers the classic `0..0x10000` port space).
pub const IO_PORT_COUNT: usize = 0x10000;

/// A per-thread I/O port permission bitmap, set by `ioperm` and read by the platform glue on
/// every context switch. Modeled here as a plain bitset keyed by owning thread; the original
/// stores this inline in the TSS, which is platform state this workspace doesn't model.
pub struct IoPermTable {
	bitmaps: Mutex<BTreeMap<Pid, Vec<u64>>>,
}

impl IoPermTable {
	pub fn new() -> Self {
		Self {
			bitmaps: Mutex::new(BTreeMap::new()),
		}
	}

	const WORDS: usize = IO_PORT_COUNT / 64;

	/// `ioperm(from, count, allow)`: grants or revokes access to `[from, from+count)`.
	pub fn set(&self, thread: Pid, from: u32, count: u32, allow: bool) -> EResult<()> {
		let end = from.checked_add(count).ok_or(errno!(EINVAL))?;
		if end as usize > IO_PORT_COUNT {
			return Err(errno!(EINVAL));
		}
		let mut bitmaps = self.bitmaps.lock();
		let bitmap = bitmaps.entry(thread).or_insert_with(|| vec![0u64; Self::WORDS]);
		for port in from..end {
			let (word, bit) = (port as usize / 64, port as usize % 64);
			if allow {
				bitmap[word] |= 1 << bit;
			} else {
				bitmap[word] &= !(1 << bit);
			}
		}
		Ok(())
	}

	pub fn is_allowed(&self, thread: Pid, port: u32) -> bool {
		if port as usize >= IO_PORT_COUNT {
			return false;
		}
		let bitmaps = self.bitmaps.lock();
		let Some(bitmap) = bitmaps.get(&thread) else {
			return false;
		};
		let (word, bit) = (port as usize / 64, port as usize % 64);
		bitmap[word] & (1 << bit) != 0
	}

	/// Drops a thread's bitmap entirely, called when the thread exits.
	pub fn remove(&self, thread: Pid) {
		self.bitmaps.lock().remove(&thread);
	}
}

impl Default for IoPermTable {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::vmm::VMem;
	use utils::ptr::arc::Arc;

	fn root_process(pid: Pid) -> Process {
		let mut process = Process::new(pid, None, Arc::new(VMem::new()).unwrap());
		process.user = 0;
		process
	}

	fn user_process(pid: Pid) -> Process {
		let mut process = Process::new(pid, None, Arc::new(VMem::new()).unwrap());
		process.user = 1000;
		process
	}

	#[test]
	fn non_root_install_is_eperm() {
		let table = IrqTable::new();
		let process = user_process(1);
		let handler = IrqHandler {
			name: "net0".into(),
			socket: Some(4),
		};
		assert_eq!(table.install(&process, 5, handler), Err(errno!(EPERM)));
	}

	#[test]
	fn out_of_range_pin_is_eio() {
		let table = IrqTable::new();
		let process = root_process(1);
		let handler = IrqHandler {
			name: "net0".into(),
			socket: Some(4),
		};
		assert_eq!(table.install(&process, MAX_IRQ + 1, handler), Err(errno!(EIO)));
	}

	#[test]
	fn dispatch_notifies_every_registered_socket() {
		let table = IrqTable::new();
		let process = root_process(1);
		table
			.install(
				&process,
				9,
				IrqHandler {
					name: "nic0".into(),
					socket: Some(7),
				},
			)
			.unwrap();
		table
			.install(
				&process,
				9,
				IrqHandler {
					name: "nic1".into(),
					socket: Some(8),
				},
			)
			.unwrap();
		assert_eq!(table.dispatch(9), vec![7, 8]);
		assert_eq!(table.handler_count(9), 2);
	}

	#[test]
	fn dispatch_on_unregistered_pin_is_empty() {
		let table = IrqTable::new();
		assert!(table.dispatch(200).is_empty());
	}

	#[test]
	fn ioperm_grants_and_revokes_individual_ports() {
		let table = IoPermTable::new();
		table.set(1, 0x3F8, 8, true).unwrap();
		assert!(table.is_allowed(1, 0x3F8));
		assert!(table.is_allowed(1, 0x3FF));
		assert!(!table.is_allowed(1, 0x400));
		table.set(1, 0x3F8, 8, false).unwrap();
		assert!(!table.is_allowed(1, 0x3F8));
	}

	#[test]
	fn ioperm_rejects_out_of_range_span() {
		let table = IoPermTable::new();
		assert_eq!(table.set(1, 0xFFF0, 0x20, true), Err(errno!(EINVAL)));
	}

	#[test]
	fn unknown_thread_has_no_permissions() {
		let table = IoPermTable::new();
		assert!(!table.is_allowed(42, 0));
	}

	#[test]
	fn remove_clears_the_threads_bitmap() {
		let table = IoPermTable::new();
		table.set(1, 0, 8, true).unwrap();
		table.remove(1);
		assert!(!table.is_allowed(1, 0));
	}
}

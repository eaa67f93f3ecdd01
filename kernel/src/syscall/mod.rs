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

//! System-call request pipeline: the FIFO queue between trap entry and kernel worker threads.
//!
//! Grounded in `original_source/src/syscalls/queue.c` (`SyscallRequest` fields, enqueue/dequeue)
//! and `original_source/src/syscalls/dispatch.c` (`syscallProcess`, pointer validation,
//! would-block retry). The ordinal table is reproduced from
//! `original_source/src/include/kernel/syscalls.h`.

pub mod dispatch;

use crate::memory::{VirtAddr, USER_BASE_ADDRESS, USER_LIMIT_ADDRESS};
use crate::process::pid::Pid;
use std::collections::VecDeque;
use utils::errno::{errno, EResult};
use utils::sync::Mutex;

/// The stable syscall ordinal table. Reordering any of these breaks the user ABI, so new
/// syscalls are only ever appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
	Exit = 0,
	Fork = 1,
	Yield = 2,
	Waitpid = 3,
	Execve = 4,
	Execrdv = 5,
	Getpid = 6,
	Gettid = 7,
	Getuid = 8,
	Getgid = 9,
	Setuid = 10,
	Setgid = 11,
	Msleep = 12,
	Times = 13,
	Open = 14,
	Close = 15,
	Read = 16,
	Write = 17,
	Stat = 18,
	Fstat = 19,
	Lseek = 20,
	Chown = 21,
	Chmod = 22,
	Link = 23,
	Unlink = 24,
	Mknod = 25,
	Mkdir = 26,
	Rmdir = 27,
	Utime = 28,
	Chroot = 29,
	Mount = 30,
	Umount = 31,
	Fcntl = 32,
	Opendir = 33,
	Closedir = 34,
	Readdir = 35,
	Seekdir = 36,
	Telldir = 37,
	Socket = 38,
	Connect = 39,
	Bind = 40,
	Listen = 41,
	Accept = 42,
	Recv = 43,
	Send = 44,
	Kill = 45,
	Sbrk = 46,
	Mmap = 47,
	Munmap = 48,
	Ioperm = 49,
	Irq = 50,
	Ioctl = 51,
	Mmio = 52,
	Pcontig = 53,
}

impl Syscall {
	/// `syscallProcess()`'s first check: an ordinal outside the table kills the caller.
	pub fn from_ordinal(ordinal: u32) -> EResult<Self> {
		use Syscall::*;
		const TABLE: &[Syscall] = &[
			Exit, Fork, Yield, Waitpid, Execve, Execrdv, Getpid, Gettid, Getuid, Getgid, Setuid,
			Setgid, Msleep, Times, Open, Close, Read, Write, Stat, Fstat, Lseek, Chown, Chmod,
			Link, Unlink, Mknod, Mkdir, Rmdir, Utime, Chroot, Mount, Umount, Fcntl, Opendir,
			Closedir, Readdir, Seekdir, Telldir, Socket, Connect, Bind, Listen, Accept, Recv,
			Send, Kill, Sbrk, Mmap, Munmap, Ioperm, Irq, Ioctl, Mmio, Pcontig,
		];
		TABLE.get(ordinal as usize).copied().ok_or(errno!(ENOSYS))
	}

	/// Whether this syscall is answered synchronously by the kernel, or must be forwarded to the
	/// router as an external request. Mirrors the split in
	/// `original_source/src/syscalls/dispatch.c` between syscalls handled in `syscallProcess`
	/// itself and those that build a bridge message.
	pub fn is_external(self) -> bool {
		use Syscall::*;
		matches!(
			self,
			Open | Close
				| Read | Write
				| Stat | Fstat
				| Lseek | Chown
				| Chmod | Link
				| Unlink | Mknod
				| Mkdir | Rmdir
				| Utime | Chroot
				| Mount | Umount
				| Opendir | Closedir
				| Readdir | Seekdir
				| Telldir | Execve
				| Execrdv | Mmap
				| Ioctl
		)
	}
}

/// A pending or in-flight syscall request, the kernel's stand-in for a suspended continuation:
/// there is no native coroutine here, the record itself *is* the saved state that the eventual
/// completion handler resumes from.
pub struct SyscallRequest {
	pub function: Syscall,
	pub params: [u64; 4],
	pub ret: i64,
	/// Random 64-bit correlator; unchanged across a would-block retry so the eventual router
	/// reply still matches.
	pub request_id: u64,
	pub thread: Pid,
	pub external: bool,
	pub retry: bool,
}

/// The global FIFO queue of pending requests, and the worker-side drain loop.
#[derive(Default)]
pub struct SyscallQueue {
	pending: Mutex<VecDeque<SyscallRequest>>,
}

impl SyscallQueue {
	pub fn new() -> Self {
		Self {
			pending: Mutex::new(VecDeque::new()),
		}
	}

	/// Trap entry: builds and enqueues a request from the ABI registers.
	pub fn enqueue(
		&self,
		thread: Pid,
		ordinal: u32,
		params: [u64; 4],
		request_id: u64,
	) -> EResult<()> {
		let function = Syscall::from_ordinal(ordinal)?;
		self.pending.lock().push_back(SyscallRequest {
			function,
			params,
			ret: 0,
			request_id,
			thread,
			external: false,
			retry: false,
		});
		Ok(())
	}

	/// Re-enqueues a request whose downstream call would-blocked, preserving its `request_id` so
	/// a router reply already in flight still matches on the next attempt.
	pub fn retry(&self, mut request: SyscallRequest) {
		request.retry = true;
		self.pending.lock().push_back(request);
	}

	/// Worker loop's dequeue half.
	pub fn dequeue(&self) -> Option<SyscallRequest> {
		self.pending.lock().pop_front()
	}

	pub fn len(&self) -> usize {
		self.pending.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Validates that `[base, base+len)` lies entirely within the user address range, the check
/// `syscallProcess` runs before touching any user pointer argument.
pub fn validate_user_range(base: VirtAddr, len: u64) -> EResult<()> {
	let end = base.0.checked_add(len).ok_or(errno!(EFAULT))?;
	if base.0 < USER_BASE_ADDRESS.0 || end > USER_LIMIT_ADDRESS.0 {
		return Err(errno!(EFAULT));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn ordinal_zero_is_exit_and_out_of_range_is_enosys() {
		assert_eq!(Syscall::from_ordinal(0), Ok(Syscall::Exit));
		assert_eq!(Syscall::from_ordinal(999), Err(errno!(ENOSYS)));
	}

	#[test]
	fn enqueue_then_dequeue_preserves_order() {
		let queue = SyscallQueue::new();
		queue.enqueue(1, 6, [0; 4], 100).unwrap();
		queue.enqueue(2, 7, [0; 4], 200).unwrap();
		assert_eq!(queue.dequeue().unwrap().thread, 1);
		assert_eq!(queue.dequeue().unwrap().thread, 2);
		assert!(queue.dequeue().is_none());
	}

	#[test]
	fn retry_preserves_request_id() {
		let queue = SyscallQueue::new();
		queue.enqueue(1, 43, [0; 4], 42).unwrap();
		let request = queue.dequeue().unwrap();
		let id = request.request_id;
		queue.retry(request);
		let retried = queue.dequeue().unwrap();
		assert_eq!(retried.request_id, id);
		assert!(retried.retry);
	}

	#[test]
	fn pointer_validation_rejects_out_of_range() {
		assert!(validate_user_range(VirtAddr(0x1000), 16).is_ok());
		assert_eq!(
			validate_user_range(VirtAddr(0), 16),
			Err(errno!(EFAULT))
		);
		assert_eq!(
			validate_user_range(USER_LIMIT_ADDRESS, 1),
			Err(errno!(EFAULT))
		);
	}

	#[test]
	fn read_and_open_are_external_yield_is_not() {
		assert!(Syscall::Read.is_external());
		assert!(Syscall::Open.is_external());
		assert!(!Syscall::Yield.is_external());
	}
}

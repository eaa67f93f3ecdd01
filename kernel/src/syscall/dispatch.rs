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

//! Worker-thread dispatch: `syscallProcess()`.
//!
//! Grounded in `original_source/src/syscalls/dispatch.c`. Synchronous syscalls are answered
//! directly against the scheduler/socket table; anything in [`Syscall::is_external`] is handed to
//! a [`RouterTransport`] implementation (the bridge) that marshals a message to the router and
//! leaves the thread blocked.

use super::{Syscall, SyscallQueue, SyscallRequest};
use crate::ipc::{SocketAddress, SocketTable};
use crate::memory::{PageFlags, VirtAddr, PAGE_SIZE, USER_LIMIT_ADDRESS};
use crate::process::scheduler::Scheduler;
use crate::process::signal::Signal;
use crate::process::{Thread, ThreadState};
use utils::errno::{errno, Errno};

/// The bridge's half of external dispatch: builds and sends a syscall message to the router.
/// Kept as a trait so the pipeline can be tested without a real bridge socket.
pub trait RouterTransport {
	fn forward(&self, request: &SyscallRequest) -> Result<(), Errno>;
}

/// Drains and answers one request, the worker loop's per-iteration body.
///
/// Returns `true` if a request was processed, `false` if the queue was empty.
pub fn process_one(
	queue: &SyscallQueue,
	scheduler: &Scheduler,
	sockets: &SocketTable,
	transport: &dyn RouterTransport,
) -> bool {
	let Some(mut request) = queue.dequeue() else {
		return false;
	};

	let Some(thread) = scheduler.get_thread(request.thread) else {
		// Caller no longer exists (e.g. already reaped); drop the request silently.
		return true;
	};

	if request.function.is_external() && !request.retry {
		request.external = true;
		if let Err(e) = transport.forward(&request) {
			complete(&thread, Err(e));
		}
		// Left external + blocked; the bridge's completion handler resumes it.
		return true;
	}

	let result = dispatch_synchronous(scheduler, sockets, &thread, &request);
	match result {
		Err(e) if e == errno!(EAGAIN) => queue.retry(request),
		other => complete(&thread, other),
	}
	true
}

/// Writes the result back into the completed request's saved state and resumes the thread.
/// Writing into the caller's saved register state is platform glue out of scope here; callers
/// observe the return value through the returned `i64`/`Errno` in tests.
fn complete(thread: &Thread, result: Result<i64, Errno>) -> i64 {
	thread.set_state(ThreadState::Queued);
	match result {
		Ok(v) => v,
		Err(e) => e.as_negative(),
	}
}

fn dispatch_synchronous(
	scheduler: &Scheduler,
	sockets: &SocketTable,
	thread: &Thread,
	request: &SyscallRequest,
) -> Result<i64, Errno> {
	use Syscall::*;
	let p = request.params;
	match request.function {
		Getpid => Ok(thread.pid as i64),
		Gettid => Ok(thread.tid as i64),
		Yield => {
			scheduler.yield_thread(thread);
			Ok(0)
		}
		Msleep => {
			let ticks = (p[0] * utils::limits::TIMER_FREQUENCY / 1000).max(1);
			scheduler.sleep(thread, ticks);
			Ok(0)
		}
		Fork => scheduler.fork(thread.pid).map(|pid| pid as i64),
		Exit => {
			scheduler.exit_thread(thread, p[0] as i32, true)?;
			Ok(0)
		}
		Waitpid => match scheduler.waitpid(thread.pid, p[0] as i64, p[1] as u32)? {
			Some((reaped_pid, status)) => {
				let _ = status;
				Ok(reaped_pid as i64)
			}
			None => Ok(0),
		},
		Kill => {
			let target = p[0] as crate::process::pid::Pid;
			if p[1] == 0 {
				return scheduler.get_process(target).map(|_| 0).ok_or(errno!(ESRCH));
			}
			let sig = Signal::from_number(p[1] as i32)?;
			scheduler.kill(target, sig)?;
			Ok(0)
		}
		Socket => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = sockets.create(thread.pid, p[0] as i32, p[1] as i32, p[2] as i32)?;
			let fd = process.io.install(
				crate::fd::OpenFlags::empty(),
				crate::fd::IODescriptorKind::Socket(socket),
			)?;
			Ok(fd as i64)
		}
		Close => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			process.io.close(p[0] as usize)?;
			Ok(0)
		}
		Bind => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = process.io.socket(p[0] as usize)?;
			let addr = read_socket_address(scheduler, thread, p[2], p[3])?;
			sockets.bind(&socket, p[1] as i32, addr)?;
			Ok(0)
		}
		Listen => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = process.io.socket(p[0] as usize)?;
			sockets.listen(&socket, p[1] as usize)?;
			Ok(0)
		}
		Connect => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = process.io.socket(p[0] as usize)?;
			let addr = read_socket_address(scheduler, thread, p[1], p[2])?;
			sockets.connect(&socket, &addr)?;
			Ok(0)
		}
		Accept => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let listener = process.io.socket(p[0] as usize)?;
			let accepted = sockets.accept(&listener)?;
			let fd = process.io.install(
				crate::fd::OpenFlags::empty(),
				crate::fd::IODescriptorKind::Socket(accepted),
			)?;
			Ok(fd as i64)
		}
		Send => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = process.io.socket(p[0] as usize)?;
			let addr = VirtAddr(p[1]);
			let len = p[2];
			super::validate_user_range(addr, len)?;
			let mut buf = vec![0u8; len as usize];
			scheduler.vmm().read(&thread.address_space, addr, &mut buf)?;
			let sent = sockets.send(&socket, &buf)?;
			Ok(sent as i64)
		}
		Recv => {
			let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
			let socket = process.io.socket(p[0] as usize)?;
			let addr = VirtAddr(p[1]);
			let len = p[2];
			super::validate_user_range(addr, len)?;
			let mut buf = vec![0u8; len as usize];
			let received = sockets.recv(&socket, &mut buf)?;
			scheduler.vmm().write(&thread.address_space, addr, &buf[..received])?;
			Ok(received as i64)
		}
		Sbrk => {
			let delta = p[0] as i64;
			let brk = thread.highest();
			if delta == 0 {
				return Ok(brk as i64);
			}
			let vmm = scheduler.vmm();
			let diff = delta.unsigned_abs();
			let pages = diff.div_ceil(PAGE_SIZE);
			if delta > 0 {
				let ptr = vmm.allocate(&thread.address_space, VirtAddr(brk), USER_LIMIT_ADDRESS, pages, PageFlags::USER_RW)?;
				if ptr.0 != brk {
					let _ = vmm.free(&thread.address_space, ptr, pages);
					return Err(errno!(ENOMEM));
				}
				thread.set_highest(brk + pages * PAGE_SIZE);
			} else {
				let mut free_pages = pages;
				let mut free_start = brk - pages * PAGE_SIZE;
				if diff % PAGE_SIZE != 0 {
					free_pages -= 1;
					free_start += PAGE_SIZE;
				}
				vmm.free(&thread.address_space, VirtAddr(free_start), free_pages)?;
				thread.set_highest(brk - free_pages * PAGE_SIZE);
			}
			Ok(brk as i64)
		}
		other => {
			log::warn!("unimplemented synchronous syscall dispatched: {other:?}");
			Err(errno!(ENOSYS))
		}
	}
}

/// Reads a `SocketAddress` out of the caller's address space, shared by every socket syscall
/// that takes a `struct sockaddr *` / length pair.
fn read_socket_address(scheduler: &Scheduler, thread: &Thread, addr: u64, len: u64) -> Result<SocketAddress, Errno> {
	let addr = VirtAddr(addr);
	super::validate_user_range(addr, len)?;
	let mut buf = vec![0u8; len as usize];
	scheduler.vmm().read(&thread.address_space, addr, &mut buf)?;
	SocketAddress::new(&buf)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{Pmm, Vmm};
	use utils::ptr::arc::Arc;

	struct NullTransport;
	impl RouterTransport for NullTransport {
		fn forward(&self, _request: &SyscallRequest) -> Result<(), Errno> {
			Ok(())
		}
	}

	fn test_scheduler() -> Scheduler {
		let entry = crate::boot::MemoryMapEntry {
			base: 0,
			len: 16 * 1024 * 1024,
			kind: crate::boot::MemoryType::Usable,
			attributes_valid: true,
		};
		let pmm = Arc::new(Pmm::init(16 * 1024 * 1024, &[entry])).unwrap();
		let vmm = Arc::new(Vmm::new(pmm)).unwrap();
		Scheduler::new(vmm)
	}

	#[test]
	fn getpid_answers_synchronously() {
		let scheduler = test_scheduler();
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		queue.enqueue(pid, Syscall::Getpid as u32, [0; 4], 1).unwrap();
		let transport = NullTransport;
		assert!(process_one(&queue, &scheduler, &sockets, &transport));
		assert!(queue.is_empty());
	}

	#[test]
	fn external_syscall_is_forwarded_and_dequeued() {
		let scheduler = test_scheduler();
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		queue.enqueue(pid, Syscall::Open as u32, [0; 4], 2).unwrap();
		let transport = NullTransport;
		assert!(process_one(&queue, &scheduler, &sockets, &transport));
		assert!(queue.is_empty());
	}

	#[test]
	fn socket_then_close_round_trips_through_the_io_table() {
		let scheduler = test_scheduler();
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		queue.enqueue(pid, Syscall::Socket as u32, [1, 1, 0, 0], 3).unwrap();
		let transport = NullTransport;
		assert!(process_one(&queue, &scheduler, &sockets, &transport));

		let process = scheduler.get_process(pid).unwrap();
		assert!(process.io.is_valid(0));
		queue.enqueue(pid, Syscall::Close as u32, [0, 0, 0, 0], 4).unwrap();
		assert!(process_one(&queue, &scheduler, &sockets, &transport));
		assert!(!process.io.is_valid(0));
	}

	#[test]
	fn bind_connect_accept_send_recv_round_trip_through_syscalls() {
		let scheduler = test_scheduler();
		let server = scheduler.spawn_kernel_thread("server").unwrap();
		let client = scheduler.spawn_kernel_thread("client").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		let transport = NullTransport;

		queue.enqueue(server, Syscall::Socket as u32, [1, 1, 0, 0], 1).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);

		let addr_space = scheduler.get_process(server).unwrap().address_space.clone();
		let addr_ptr = VirtAddr(0x2000);
		scheduler.vmm().write(&addr_space, addr_ptr, b"/tmp/s").unwrap();
		queue.enqueue(server, Syscall::Bind as u32, [0, 1, addr_ptr.0, 6], 2).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);
		queue.enqueue(server, Syscall::Listen as u32, [0, 0, 0, 0], 3).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);

		queue.enqueue(client, Syscall::Socket as u32, [1, 1, 0, 0], 4).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);
		let client_space = scheduler.get_process(client).unwrap().address_space.clone();
		scheduler.vmm().write(&client_space, addr_ptr, b"/tmp/s").unwrap();
		queue.enqueue(client, Syscall::Connect as u32, [0, addr_ptr.0, 6, 0], 5).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);

		queue.enqueue(server, Syscall::Accept as u32, [0, 0, 0, 0], 6).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);

		let msg_ptr = VirtAddr(0x3000);
		scheduler.vmm().write(&client_space, msg_ptr, b"hello").unwrap();
		queue.enqueue(client, Syscall::Send as u32, [0, msg_ptr.0, 5, 0], 7).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);

		queue.enqueue(server, Syscall::Recv as u32, [1, msg_ptr.0, 16, 0], 8).unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);
		let mut buf = [0u8; 5];
		scheduler.vmm().read(&addr_space, msg_ptr, &mut buf).unwrap();
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn sbrk_grows_then_shrinks_the_program_break() {
		let scheduler = test_scheduler();
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		let transport = NullTransport;

		let thread = scheduler.get_thread(pid).unwrap();
		let initial = thread.highest();

		queue
			.enqueue(pid, Syscall::Sbrk as u32, [utils::limits::PAGE_SIZE as u64, 0, 0, 0], 1)
			.unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);
		assert_eq!(thread.highest(), initial + utils::limits::PAGE_SIZE as u64);

		queue
			.enqueue(pid, Syscall::Sbrk as u32, [(-(utils::limits::PAGE_SIZE as i64)) as u64, 0, 0, 0], 2)
			.unwrap();
		process_one(&queue, &scheduler, &sockets, &transport);
		assert_eq!(thread.highest(), initial);
	}

	#[test]
	fn unknown_signal_number_is_einval_not_panic() {
		let scheduler = test_scheduler();
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		let sockets = SocketTable::new();
		let queue = SyscallQueue::new();
		queue.enqueue(pid, Syscall::Kill as u32, [pid as u64, 99, 0, 0], 5).unwrap();
		let transport = NullTransport;
		assert!(process_one(&queue, &scheduler, &sockets, &transport));
	}
}

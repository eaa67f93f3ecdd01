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

//! The router bridge: the wire protocol spoken with the user-space router process over the
//! well-known kernel socket, and the completion handlers that turn a router reply back into a
//! resumed thread.
//!
//! Grounded in `original_source/src/include/kernel/servers.h` (`MessageHeader`, `COMMAND_*`
//! opcodes) and `original_source/src/servers/{handle,general,request,syscalls}.c`
//! (`serverInit`/`serverIdle`, `handleGeneralRequest` and its per-opcode handlers,
//! `requestServer`, `handleSyscallResponse`).

use crate::fd::{FileRecord, IODescriptorKind, OpenFlags};
use crate::ipc::SocketAddress;
use crate::memory::VirtAddr;
use crate::process::pid::Pid;
use crate::process::scheduler::Scheduler;
use crate::syscall::dispatch::RouterTransport;
use crate::syscall::{Syscall, SyscallRequest};
use utils::errno::{errno, EResult, Errno};
use utils::limits::SERVER_MAX_SIZE;
use utils::sync::Mutex;

/// The kernel's well-known listening socket path.
pub const KERNEL_SOCKET_PATH: &[u8] = b"lux:///kernel";
/// The router's socket path; the kernel connects to it to forward syscall dispatches.
pub const LUMEN_SOCKET_PATH: &[u8] = b"lux:///lumen";

/// Opcodes below this are router→kernel "general" requests.
pub const GENERAL_COMMAND_LIMIT: u16 = 0x8000;
/// Opcodes at or above this (and below the IRQ range) are kernel→router syscall dispatches.
pub const SYSCALL_COMMAND_BASE: u16 = 0x8000;
/// Opcodes at or above this are driver IRQ event notifications.
pub const IRQ_COMMAND_BASE: u16 = 0xC000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum GeneralCommand {
	Log = 0,
	Sysinfo = 1,
	Rand = 2,
	Io = 3,
	ProcessIo = 4,
	ProcessList = 5,
	ProcessStatus = 6,
	Framebuffer = 7,
}

impl GeneralCommand {
	pub fn from_opcode(opcode: u16) -> Option<Self> {
		use GeneralCommand::*;
		Some(match opcode {
			0 => Log,
			1 => Sysinfo,
			2 => Rand,
			3 => Io,
			4 => ProcessIo,
			5 => ProcessList,
			6 => ProcessStatus,
			7 => Framebuffer,
			_ => return None,
		})
	}
}

/// A syscall-family opcode, the subset of [`crate::syscall::Syscall`] exposed on the wire,
/// offset by [`SYSCALL_COMMAND_BASE`] the way `original_source/src/include/kernel/servers.h`
/// defines `COMMAND_OPEN`/`COMMAND_READ`/etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SyscallCommand {
	Stat = 0x8000,
	Flush = 0x8001,
	Mount = 0x8002,
	Umount = 0x8003,
	Open = 0x8004,
	Read = 0x8005,
	Write = 0x8006,
	Ioctl = 0x8007,
}

/// The 24-byte fixed message header prefixed to every request and response on the kernel/router
/// sockets. All integers are little-endian machine-native, matching `original_source`'s
/// `MessageHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
	pub command: u16,
	pub length: u64,
	pub response: bool,
	pub latency: u64,
	pub status: i64,
	pub requester: Pid,
}

impl MessageHeader {
	pub const WIRE_SIZE: usize = 24;

	pub fn request(command: u16, requester: Pid, payload_len: usize) -> Self {
		Self {
			command,
			length: (Self::WIRE_SIZE + payload_len) as u64,
			response: false,
			latency: 0,
			status: 0,
			requester,
		}
	}

	pub fn is_general(&self) -> bool {
		self.command < GENERAL_COMMAND_LIMIT
	}

	/// Syscall-family messages prepend an extra 8-byte `id` (the `requestID`) ahead of the
	/// payload; this is the wire size of *that* prefix including the fixed header.
	pub const SYSCALL_PREFIX_SIZE: usize = Self::WIRE_SIZE + 8;
}

/// A syscall-family request as it goes out over the wire: the fixed header, the random
/// correlator, and an opaque payload built per-opcode by the caller.
pub struct SyscallMessage {
	pub header: MessageHeader,
	pub request_id: u64,
	pub payload: Vec<u8>,
}

impl SyscallMessage {
	pub fn encode(&self) -> EResult<Vec<u8>> {
		let total = MessageHeader::SYSCALL_PREFIX_SIZE + self.payload.len();
		if total > SERVER_MAX_SIZE {
			return Err(errno!(EMSGSIZE));
		}
		let mut bytes = Vec::with_capacity(total);
		bytes.extend_from_slice(&self.header.command.to_le_bytes());
		bytes.extend_from_slice(&self.header.length.to_le_bytes());
		bytes.push(self.header.response as u8);
		bytes.extend_from_slice(&[0u8; 3]);
		bytes.extend_from_slice(&self.header.latency.to_le_bytes());
		bytes.extend_from_slice(&(self.header.status as u64).to_le_bytes());
		bytes.extend_from_slice(&self.header.requester.to_le_bytes());
		bytes.extend_from_slice(&self.request_id.to_le_bytes());
		bytes.extend_from_slice(&self.payload);
		Ok(bytes)
	}
}

/// Maps a [`crate::syscall::Syscall`] onto its wire opcode, where one exists. Syscalls with no
/// dedicated opcode in the original's sampled header (most of the external list; only a
/// representative subset was ever assigned a `COMMAND_*` value) fall back to `None` and are
/// rejected by [`KernelBridge::forward`] rather than silently mis-encoded.
fn wire_opcode(syscall: crate::syscall::Syscall) -> Option<u16> {
	use crate::syscall::Syscall;
	Some(match syscall {
		Syscall::Stat | Syscall::Fstat => SyscallCommand::Stat as u16,
		Syscall::Mount => SyscallCommand::Mount as u16,
		Syscall::Umount => SyscallCommand::Umount as u16,
		Syscall::Open => SyscallCommand::Open as u16,
		Syscall::Read => SyscallCommand::Read as u16,
		Syscall::Write => SyscallCommand::Write as u16,
		Syscall::Ioctl => SyscallCommand::Ioctl as u16,
		_ => return None,
	})
}

/// One in-flight syscall dispatch awaiting a router reply, keyed by `requestID` so out-of-order
/// replies are safe (`original_source/src/servers/syscalls.c`'s `getSyscall(requester)` lookup,
/// reframed here by request id rather than tid since several requests from the same tid could in
/// principle overlap across a retry).
struct Inflight {
	request_id: u64,
	thread: Pid,
	function: Syscall,
	params: [u64; 4],
}

/// The kernel side of the bridge: the well-known listening socket, the connected router socket,
/// and the table of in-flight syscall dispatches.
pub struct KernelBridge {
	sent: utils::sync::Mutex<Vec<Inflight>>,
}

impl Default for KernelBridge {
	fn default() -> Self {
		Self::new()
	}
}

impl KernelBridge {
	pub fn new() -> Self {
		Self {
			sent: utils::sync::Mutex::new(Vec::new()),
		}
	}

	/// `requestServer()`: stamps the header's `requester` and records the dispatch as in-flight.
	/// Actual socket transmission is left to the caller (a real deployment wires this to
	/// `ipc::SocketTable::send` against the router's connected socket); this only maintains the
	/// bridge's own bookkeeping, which is what the testable properties in this module exercise.
	pub fn send_syscall(&self, message: &SyscallMessage, thread: Pid, function: Syscall, params: [u64; 4]) -> EResult<Vec<u8>> {
		let encoded = message.encode()?;
		self.sent.lock().push(Inflight {
			request_id: message.request_id,
			thread,
			function,
			params,
		});
		Ok(encoded)
	}

	/// `handleSyscallResponse()`: matches a reply by `requestID`, drops it from the in-flight
	/// table, applies the opcode's completion action against the caller's own state, and returns
	/// the originating thread plus the reply's status so the syscall dispatcher can resume it.
	/// Returns `None` for a reply whose request id is not outstanding — a thread that was killed
	/// before the reply arrived, matching the original's silent drop when
	/// `req->thread->status != THREAD_BLOCKED`.
	pub fn complete(&self, scheduler: &Scheduler, request_id: u64, status: i64, payload: &[u8]) -> Option<(Pid, i64)> {
		let mut sent = self.sent.lock();
		let index = sent.iter().position(|i| i.request_id == request_id)?;
		let inflight = sent.swap_remove(index);
		drop(sent);
		if status >= 0 {
			let _ = self.apply_completion(scheduler, &inflight, status, payload);
		}
		Some((inflight.thread, status))
	}

	/// Per-opcode completion action: `handleSyscallResponse()`'s opcode-specific tail, where a
	/// successful reply is folded back into the caller's own state rather than just its return
	/// value. `OPEN` installs a fresh [`crate::fd::FileRecord`] descriptor; `READ`/`STAT`/`FSTAT`
	/// copy the reply payload into the caller-supplied buffer recorded in the dispatch's params.
	fn apply_completion(&self, scheduler: &Scheduler, inflight: &Inflight, status: i64, payload: &[u8]) -> EResult<()> {
		let thread = scheduler.get_thread(inflight.thread).ok_or(errno!(ESRCH))?;
		let process = scheduler.get_process(thread.pid).ok_or(errno!(ESRCH))?;
		match inflight.function {
			Syscall::Open => {
				let path_ptr = VirtAddr(inflight.params[0]);
				let path_len = inflight.params[1];
				let mut path_bytes = vec![0u8; path_len as usize];
				scheduler.vmm().read(&thread.address_space, path_ptr, &mut path_bytes)?;
				let record = FileRecord {
					id: status as u64,
					path: String::from_utf8_lossy(&path_bytes).into_owned(),
					device: String::from_utf8_lossy(payload).into_owned(),
					position: 0,
					server_socket: 0,
				};
				process.io.install(OpenFlags::empty(), IODescriptorKind::File(Mutex::new(record)))?;
			}
			Syscall::Read | Syscall::Stat | Syscall::Fstat => {
				let buf_ptr = VirtAddr(inflight.params[1]);
				scheduler.vmm().write(&thread.address_space, buf_ptr, payload)?;
			}
			_ => {}
		}
		Ok(())
	}

	pub fn inflight_count(&self) -> usize {
		self.sent.lock().len()
	}
}

impl RouterTransport for KernelBridge {
	fn forward(&self, request: &SyscallRequest) -> Result<(), Errno> {
		let opcode = wire_opcode(request.function).ok_or(errno!(ENOSYS))?;
		let header = MessageHeader::request(opcode, request.thread, 0);
		let message = SyscallMessage {
			header,
			request_id: request.request_id,
			payload: Vec::new(),
		};
		self.send_syscall(&message, request.thread, request.function, request.params)?;
		Ok(())
	}
}

/// `handleGeneralRequest()`'s permission check: only the router itself, or one of its immediate
/// children, may issue general requests.
pub fn general_request_allowed(requester_pid: Pid, requester_parent: Option<Pid>, lumen_pid: Pid) -> bool {
	requester_pid == lumen_pid || requester_parent == Some(lumen_pid)
}

/// `serverSysinfo()`'s response payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SysInfo {
	pub max_files: u64,
	pub max_sockets: u64,
	pub max_pid: u64,
	pub page_size: u64,
	pub uptime_ms: u64,
	pub memory_size_pages: u64,
	pub memory_usage_pages: u64,
	pub processes: u64,
	pub threads: u64,
}

pub fn build_sysinfo(status: &crate::memory::pmm::PmmStatus, uptime_ms: u64, processes: u64, threads: u64) -> SysInfo {
	SysInfo {
		max_files: utils::limits::MAX_IO_DESCRIPTORS as u64,
		max_sockets: utils::limits::MAX_SOCKETS as u64,
		max_pid: utils::limits::MAX_PID as u64,
		page_size: utils::limits::PAGE_SIZE as u64,
		uptime_ms,
		memory_size_pages: status.usable_pages,
		memory_usage_pages: status.used_pages,
		processes,
		threads,
	}
}

/// Validates a candidate bind path for the kernel/router well-known sockets.
pub fn well_known_address(path: &[u8]) -> EResult<SocketAddress> {
	SocketAddress::new(path)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{PageFlags, Pmm, Vmm};
	use crate::syscall::SyscallRequest;
	use utils::ptr::arc::Arc;

	fn request(function: Syscall, request_id: u64) -> SyscallRequest {
		request_for(function, request_id, 7, [0; 4])
	}

	fn request_for(function: Syscall, request_id: u64, thread: Pid, params: [u64; 4]) -> SyscallRequest {
		SyscallRequest {
			function,
			params,
			ret: 0,
			request_id,
			thread,
			external: true,
			retry: false,
		}
	}

	fn test_scheduler() -> (Scheduler, crate::process::pid::Pid) {
		let entry = crate::boot::MemoryMapEntry {
			base: 0,
			len: 16 * 1024 * 1024,
			kind: crate::boot::MemoryType::Usable,
			attributes_valid: true,
		};
		let pmm = Arc::new(Pmm::init(16 * 1024 * 1024, &[entry])).unwrap();
		let vmm = Arc::new(Vmm::new(pmm)).unwrap();
		let scheduler = Scheduler::new(vmm);
		let pid = scheduler.spawn_kernel_thread("t").unwrap();
		(scheduler, pid)
	}

	#[test]
	fn general_commands_below_0x8000_and_syscalls_at_or_above() {
		assert!(MessageHeader::request(0x0001, 1, 0).is_general());
		assert!(!MessageHeader::request(0x8004, 1, 0).is_general());
	}

	#[test]
	fn forward_records_an_inflight_entry_keyed_by_request_id() {
		let (scheduler, _pid) = test_scheduler();
		let bridge = KernelBridge::new();
		let req = request(Syscall::Open, 123);
		bridge.forward(&req).unwrap();
		assert_eq!(bridge.inflight_count(), 1);
		let (thread, _status) = bridge.complete(&scheduler, 123, 3, &[]).unwrap();
		assert_eq!(thread, 7);
		assert_eq!(bridge.inflight_count(), 0);
	}

	#[test]
	fn completing_an_unknown_request_id_returns_none() {
		let (scheduler, _pid) = test_scheduler();
		let bridge = KernelBridge::new();
		assert!(bridge.complete(&scheduler, 999, 0, &[]).is_none());
	}

	#[test]
	fn syscall_with_no_wire_opcode_is_rejected() {
		let bridge = KernelBridge::new();
		let req = request(Syscall::Opendir, 1);
		assert_eq!(bridge.forward(&req), Err(errno!(ENOSYS)));
	}

	#[test]
	fn open_completion_installs_a_file_descriptor() {
		let (scheduler, pid) = test_scheduler();
		let process = scheduler.get_process(pid).unwrap();
		let thread = scheduler.get_thread(pid).unwrap();
		let vmm = scheduler.vmm();
		let path_ptr = VirtAddr(0x1000);
		vmm.allocate(&thread.address_space, path_ptr, VirtAddr(0x8000_0000), 1, PageFlags::USER_RW)
			.unwrap();
		vmm.write(&thread.address_space, path_ptr, b"/dev/null").unwrap();

		let bridge = KernelBridge::new();
		let req = request_for(Syscall::Open, 1, pid, [path_ptr.0, 9, 0, 0]);
		bridge.forward(&req).unwrap();
		bridge.complete(&scheduler, 1, 0, b"nulldev").unwrap();

		assert!(process.io.is_valid(0));
	}

	#[test]
	fn read_completion_copies_payload_into_caller_buffer() {
		let (scheduler, pid) = test_scheduler();
		let thread = scheduler.get_thread(pid).unwrap();
		let vmm = scheduler.vmm();
		let buf_ptr = VirtAddr(0x2000);
		vmm.allocate(&thread.address_space, buf_ptr, VirtAddr(0x8000_0000), 1, PageFlags::USER_RW)
			.unwrap();

		let bridge = KernelBridge::new();
		let req = request_for(Syscall::Read, 9, pid, [0, buf_ptr.0, 5, 0]);
		bridge.forward(&req).unwrap();
		bridge.complete(&scheduler, 9, 5, b"hello").unwrap();

		let mut buf = [0u8; 5];
		vmm.read(&thread.address_space, buf_ptr, &mut buf).unwrap();
		assert_eq!(&buf, b"hello");
	}

	#[test]
	fn failed_reply_does_not_run_the_completion_action() {
		let (scheduler, pid) = test_scheduler();
		let process = scheduler.get_process(pid).unwrap();
		let bridge = KernelBridge::new();
		let req = request_for(Syscall::Open, 2, pid, [0x1000, 0, 0, 0]);
		bridge.forward(&req).unwrap();
		bridge.complete(&scheduler, 2, -2, &[]).unwrap();
		assert!(!process.io.is_valid(0));
	}

	#[test]
	fn encoded_message_respects_server_max_size() {
		let header = MessageHeader::request(SyscallCommand::Write as u16, 1, 0);
		let message = SyscallMessage {
			header,
			request_id: 1,
			payload: vec![0u8; SERVER_MAX_SIZE],
		};
		assert_eq!(message.encode(), Err(errno!(EMSGSIZE)));
	}

	#[test]
	fn general_request_permission_allows_lumen_and_its_children() {
		assert!(general_request_allowed(50, None, 50));
		assert!(general_request_allowed(60, Some(50), 50));
		assert!(!general_request_allowed(61, Some(99), 50));
	}
}

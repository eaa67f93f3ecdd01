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

//! Processes, threads, and the objects a scheduling decision operates on.
//!
//! Grounded in `original_source/src/sched/sched.c` (`Process`/`Thread` field shapes,
//! `schedTimeslice`) and `original_source/src/sched/exit.c` (`terminateThread`) for behavior,
//! and in `examples/davidaparicio-maestro/kernel/src/process/mod.rs` for the Rust shape: a PCB
//! behind an `Arc`, links to other processes in their own sub-struct, signal state in its own
//! sub-struct, interior mutability via this workspace's `Mutex` rather than raw pointers.

pub mod pid;
pub mod scheduler;
pub mod signal;

use crate::memory::vmm::VMem;
use pid::Pid;
use signal::SigSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use utils::ptr::arc::Arc;
use utils::sync::Mutex;

/// A thread's scheduling priority. `0` from userspace is folded into [`Priority::Normal`]
/// (resolving the original source's ambiguous "priority 0 means normal" convention into an
/// explicit variant rather than a magic number).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
	High = 1,
	#[default]
	Normal = 2,
	Low = 3,
	Realtime = 4,
}

impl Priority {
	pub fn from_raw(value: u8) -> Self {
		match value {
			1 => Self::High,
			3 => Self::Low,
			4 => Self::Realtime,
			_ => Self::Normal,
		}
	}

	/// `schedTimeslice()`: timeslice length scales linearly with priority value, so lower
	/// priority means a *longer* slice on this cooperative round-robin scheduler (each thread
	/// still runs to completion of its slice, low-priority threads are just visited less often
	/// relative to the tick budget they consume).
	pub fn timeslice(self) -> u64 {
		(self as u64) * utils::limits::SCHED_TIME_SLICE
	}
}

/// A thread's run state. Mirrors `THREAD_QUEUED`/`THREAD_RUNNING`/`THREAD_BLOCKED`/
/// `THREAD_ZOMBIE` plus a `Sleeping` state for `msleep()`-parked threads, which the original
/// source tracks with a separate sleep timer list rather than a distinct thread status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
	Queued,
	Running,
	Blocked,
	Sleeping,
	Zombie,
}

/// The outcome recorded for a thread that has exited, read back by `waitpid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
	pub code: u8,
	pub normal: bool,
}

pub struct Thread {
	pub tid: Pid,
	pub pid: Pid,
	state: Mutex<ThreadState>,
	priority: Mutex<Priority>,
	time: AtomicU64,
	cpu: AtomicU64,
	pub address_space: Arc<VMem>,
	pending: Mutex<SigSet>,
	blocked: Mutex<SigSet>,
	exit_status: Mutex<Option<ExitStatus>>,
	/// Set once `waitpid` has consumed this thread's exit status, matching the original's
	/// `clean` flag that prevents a zombie from being reported twice.
	clean: AtomicBool,
	/// The thread's current program break, `brk.c`'s `t->highest`. Starts at
	/// [`crate::memory::USER_HEAP_BASE`] until an `execve` or `sbrk` call moves it.
	highest: AtomicU64,
}

impl Thread {
	pub fn new(tid: Pid, pid: Pid, address_space: Arc<VMem>) -> Self {
		Self {
			tid,
			pid,
			state: Mutex::new(ThreadState::Queued),
			priority: Mutex::new(Priority::Normal),
			time: AtomicU64::new(Priority::Normal.timeslice()),
			cpu: AtomicU64::new(0),
			address_space,
			pending: Mutex::new(SigSet::empty()),
			blocked: Mutex::new(SigSet::empty()),
			exit_status: Mutex::new(None),
			clean: AtomicBool::new(false),
			highest: AtomicU64::new(crate::memory::USER_HEAP_BASE.0),
		}
	}

	pub fn state(&self) -> ThreadState {
		*self.state.lock()
	}

	pub fn set_state(&self, state: ThreadState) {
		*self.state.lock() = state;
	}

	pub fn priority(&self) -> Priority {
		*self.priority.lock()
	}

	/// `schedTimeslice()`: (re)assigns the timeslice from the thread's own priority.
	pub fn refresh_timeslice(&self) {
		let slice = self.priority().timeslice();
		self.time.store(slice, Ordering::SeqCst);
	}

	pub fn set_priority(&self, priority: Priority) {
		*self.priority.lock() = priority;
		self.refresh_timeslice();
	}

	/// Decrements the remaining timeslice by one tick, saturating at zero.
	///
	/// Returns the remaining time, matching `schedTimer()`'s return value.
	pub fn tick(&self) -> u64 {
		let mut remaining = self.time.load(Ordering::SeqCst);
		if remaining > 0 {
			remaining -= 1;
			self.time.store(remaining, Ordering::SeqCst);
		}
		remaining
	}

	pub fn remaining_time(&self) -> u64 {
		self.time.load(Ordering::SeqCst)
	}

	pub fn cpu(&self) -> u64 {
		self.cpu.load(Ordering::SeqCst)
	}

	pub fn bind_cpu(&self, cpu: u64) {
		self.cpu.store(cpu, Ordering::SeqCst);
	}

	pub fn raise(&self, sig: signal::Signal) {
		let _ = self.pending.lock().add(sig);
	}

	pub fn next_signal(&self) -> Option<signal::Signal> {
		let pending = *self.pending.lock();
		let blocked = *self.blocked.lock();
		let sig = pending.peek_unblocked(blocked)?;
		let _ = self.pending.lock().remove(sig);
		Some(sig)
	}

	pub fn exit_status(&self) -> Option<ExitStatus> {
		*self.exit_status.lock()
	}

	pub fn is_clean(&self) -> bool {
		self.clean.load(Ordering::SeqCst)
	}

	pub fn mark_clean(&self) {
		self.clean.store(true, Ordering::SeqCst);
	}

	pub fn highest(&self) -> u64 {
		self.highest.load(Ordering::SeqCst)
	}

	pub fn set_highest(&self, value: u64) {
		self.highest.store(value, Ordering::SeqCst);
	}

	/// `terminateThread()`'s per-thread half: marks the thread a zombie and records its exit
	/// status. POSIX truncates the exit code to 8 bits.
	fn terminate(&self, status: i32, normal: bool) {
		self.set_state(ThreadState::Zombie);
		*self.exit_status.lock() = Some(ExitStatus {
			code: (status & 0xFF) as u8,
			normal,
		});
	}
}

#[derive(Default)]
struct ProcessLinks {
	parent: Option<Pid>,
	children: Vec<Pid>,
	/// The process group ID. A process is its own group leader until explicitly moved.
	pgid: Pid,
}

pub struct Process {
	pub pid: Pid,
	pub command: Mutex<String>,
	pub user: u32,
	pub group: u32,
	links: Mutex<ProcessLinks>,
	pub threads: Mutex<Vec<Arc<Thread>>>,
	pub address_space: Arc<VMem>,
	/// Fixed-size `MAX_IO_DESCRIPTORS` table of open files/sockets/directories.
	pub io: crate::fd::IoTable,
	zombie: AtomicBool,
	orphan: AtomicBool,
}

impl Process {
	pub fn new(pid: Pid, parent: Option<Pid>, address_space: Arc<VMem>) -> Self {
		Self {
			pid,
			command: Mutex::new(String::new()),
			user: 0,
			group: 0,
			links: Mutex::new(ProcessLinks {
				parent,
				children: Vec::new(),
				pgid: pid,
			}),
			threads: Mutex::new(Vec::new()),
			address_space,
			io: crate::fd::IoTable::new(),
			zombie: AtomicBool::new(false),
			orphan: AtomicBool::new(false),
		}
	}

	pub fn parent(&self) -> Option<Pid> {
		self.links.lock().parent
	}

	pub fn pgid(&self) -> Pid {
		self.links.lock().pgid
	}

	pub fn set_pgid(&self, pgid: Pid) {
		self.links.lock().pgid = pgid;
	}

	pub fn children(&self) -> Vec<Pid> {
		self.links.lock().children.clone()
	}

	pub fn add_child(&self, child: Pid) {
		self.links.lock().children.push(child);
	}

	pub fn is_zombie(&self) -> bool {
		self.zombie.load(Ordering::SeqCst)
	}

	pub fn is_orphan(&self) -> bool {
		self.orphan.load(Ordering::SeqCst)
	}

	pub fn mark_orphan(&self, new_parent: Pid) {
		self.orphan.store(true, Ordering::SeqCst);
		self.links.lock().parent = Some(new_parent);
	}

	/// Re-evaluates whether every thread of this process is a zombie, and if so marks the
	/// process itself a zombie, matching `terminateThread()`'s per-process pass.
	fn refresh_zombie(&self) {
		let threads = self.threads.lock();
		let all_zombie = !threads.is_empty() && threads.iter().all(|t| t.state() == ThreadState::Zombie);
		self.zombie.store(all_zombie, Ordering::SeqCst);
	}
}

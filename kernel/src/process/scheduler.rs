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

//! The preemptive round-robin scheduler: process/thread registry, PID allocation, the election
//! loop, and exit/wait bookkeeping.
//!
//! Grounded in `original_source/src/sched/sched.c` (`schedInit`, `kthreadCreate`,
//! `processCreate`, `schedule`, `blockThread`/`unblockThread`, `yield`, `setLumenPID`/
//! `setKernelPID`), `original_source/src/sched/exit.c` (`terminateThread`, `exit`), and
//! `original_source/src/sched/waitpid.c` (`waitpid`). The election loop keeps the original's
//! "two rounds through a circular process list" structure rather than a priority heap, since
//! that is what actually determines the fairness properties being modeled.

use super::pid::{Pid, PidAllocator};
use super::signal::Signal;
use super::{ExitStatus, Process, Thread, ThreadState};
use crate::memory::vmm::Vmm;
use std::sync::atomic::{AtomicBool, Ordering};
use utils::errno::{errno, EResult};
use utils::ptr::arc::Arc;
use utils::sync::Mutex;

struct SleepEntry {
	tid: Pid,
	remaining_ticks: u64,
}

pub struct Scheduler {
	/// Every process currently known to the kernel, in creation order — equivalent to the
	/// original's `first`/`next` linked list, which the election loop treats as circular.
	processes: Mutex<Vec<Arc<Process>>>,
	pids: PidAllocator,
	vmm: Arc<Vmm>,
	scheduling: AtomicBool,
	lumen_pid: Mutex<Option<Pid>>,
	kernel_pid: Mutex<Option<Pid>>,
	sleeping: Mutex<Vec<SleepEntry>>,
}

impl Scheduler {
	pub fn new(vmm: Arc<Vmm>) -> Self {
		Self {
			processes: Mutex::new(Vec::new()),
			pids: PidAllocator::new(),
			vmm,
			scheduling: AtomicBool::new(false),
			lumen_pid: Mutex::new(None),
			kernel_pid: Mutex::new(None),
			sleeping: Mutex::new(Vec::new()),
		}
	}

	pub fn set_scheduling(&self, on: bool) {
		self.scheduling.store(on, Ordering::SeqCst);
	}

	pub fn is_scheduling(&self) -> bool {
		self.scheduling.load(Ordering::SeqCst)
	}

	pub fn set_lumen_pid(&self, pid: Pid) {
		*self.lumen_pid.lock() = Some(pid);
		log::debug!("scheduler: started lumen with pid {pid}");
	}

	pub fn lumen_pid(&self) -> Option<Pid> {
		*self.lumen_pid.lock()
	}

	pub fn set_kernel_pid(&self, pid: Pid) {
		*self.kernel_pid.lock() = Some(pid);
	}

	pub fn kernel_pid(&self) -> Option<Pid> {
		*self.kernel_pid.lock()
	}

	pub fn vmm(&self) -> &Vmm {
		&self.vmm
	}

	pub fn get_process(&self, pid: Pid) -> Option<Arc<Process>> {
		if pid == 0 {
			return None;
		}
		self.processes.lock().iter().find(|p| p.pid == pid).cloned()
	}

	pub fn get_thread(&self, tid: Pid) -> Option<Arc<Thread>> {
		if tid == 0 {
			return None;
		}
		for process in self.processes.lock().iter() {
			if let Some(t) = process.threads.lock().iter().find(|t| t.tid == tid) {
				return Some(t.clone());
			}
		}
		None
	}

	/// `kthreadCreate()`: spawns a single-threaded process running in a fresh address space.
	/// Used for the kernel's own idle/worker threads as well as any in-kernel service.
	pub fn spawn_kernel_thread(&self, name: &str) -> EResult<Pid> {
		let pid = self.pids.allocate()?;
		let space = self.vmm.new_address_space()?;
		let process = Arc::new(Process::new(pid, None, space.clone())).map_err(|_| errno!(ENOMEM))?;
		*process.command.lock() = name.to_string();
		let thread = Arc::new(Thread::new(pid, pid, space)).map_err(|_| errno!(ENOMEM))?;
		process.threads.lock().push(thread);
		self.processes.lock().push(process);
		log::debug!("scheduler: spawned kernel thread {name} with pid {pid}");
		Ok(pid)
	}

	/// `processCreate()`: allocates a PID and registers an empty process as a child of `parent`.
	pub fn create_process(&self, parent: Option<Pid>) -> EResult<Arc<Process>> {
		let pid = self.pids.allocate()?;
		let space = self.vmm.new_address_space()?;
		let pgid = parent
			.and_then(|p| self.get_process(p))
			.map(|p| p.pgid())
			.unwrap_or(pid);
		let process = Arc::new(Process::new(pid, parent, space)).map_err(|_| errno!(ENOMEM))?;
		process.set_pgid(pgid);
		if let Some(parent_pid) = parent {
			if let Some(parent_proc) = self.get_process(parent_pid) {
				parent_proc.add_child(pid);
			}
		}
		self.processes.lock().push(process.clone());
		Ok(process)
	}

	/// Forks `parent_pid`: duplicates its address space and its single running thread.
	///
	/// Multi-threaded fork (duplicating every thread of the parent) is out of scope; only the
	/// calling thread's duplicate is created in the child, matching POSIX `fork()` semantics.
	pub fn fork(&self, parent_pid: Pid) -> EResult<Pid> {
		let parent = self.get_process(parent_pid).ok_or(errno!(ESRCH))?;
		let pid = self.pids.allocate()?;
		let cloned_space = self.vmm.fork_address_space(&parent.address_space)?;
		let mut child_proc = Process::new(pid, Some(parent_pid), cloned_space.clone());
		child_proc.io = parent.io.fork_duplicate()?;
		let child = Arc::new(child_proc).map_err(|_| errno!(ENOMEM))?;
		child.set_pgid(parent.pgid());
		*child.command.lock() = parent.command.lock().clone();
		let thread = Arc::new(Thread::new(pid, pid, cloned_space)).map_err(|_| errno!(ENOMEM))?;
		if let Some(parent_thread) = parent.threads.lock().first() {
			thread.set_priority(parent_thread.priority());
		}
		child.threads.lock().push(thread);
		parent.add_child(pid);
		self.processes.lock().push(child.clone());
		Ok(child.pid)
	}

	/// `schedBusy()`.
	pub fn is_busy(&self) -> bool {
		self.processes
			.lock()
			.iter()
			.flat_map(|p| p.threads.lock().clone())
			.any(|t| t.state() == ThreadState::Queued)
	}

	/// `schedule()`: a two-round scan of the process list looking for the next queued thread.
	///
	/// `current` is demoted back to `Queued` before the scan, matching the original putting the
	/// previously-running thread back in the rotation rather than special-casing it.
	pub fn schedule_next(&self, current: Option<&Arc<Thread>>) -> Option<Arc<Thread>> {
		if !self.is_scheduling() {
			return None;
		}
		if let Some(t) = current {
			if t.state() == ThreadState::Running {
				t.set_state(ThreadState::Queued);
			}
		}
		let processes = self.processes.lock().clone();
		if processes.is_empty() {
			return None;
		}
		for _round in 0..2 {
			for process in &processes {
				for thread in process.threads.lock().iter() {
					if thread.state() == ThreadState::Queued {
						thread.set_state(ThreadState::Running);
						thread.refresh_timeslice();
						return Some(thread.clone());
					}
				}
			}
		}
		None
	}

	/// `blockThread()`.
	pub fn block(&self, thread: &Thread) {
		thread.set_state(ThreadState::Blocked);
		thread.refresh_timeslice();
	}

	/// `unblockThread()`.
	pub fn unblock(&self, thread: &Thread) {
		thread.set_state(ThreadState::Queued);
	}

	/// `yield()`.
	pub fn yield_thread(&self, thread: &Thread) {
		thread.set_state(ThreadState::Queued);
		thread.refresh_timeslice();
	}

	/// Parks a thread for `ticks` scheduler ticks (`msleep`).
	pub fn sleep(&self, thread: &Thread, ticks: u64) {
		thread.set_state(ThreadState::Sleeping);
		self.sleeping.lock().push(SleepEntry {
			tid: thread.tid,
			remaining_ticks: ticks,
		});
	}

	/// Advances the sleep queue by one tick, waking any thread whose timer has elapsed.
	pub fn tick_sleepers(&self) {
		let mut sleeping = self.sleeping.lock();
		let mut woken = Vec::new();
		sleeping.retain_mut(|entry| {
			entry.remaining_ticks = entry.remaining_ticks.saturating_sub(1);
			if entry.remaining_ticks == 0 {
				woken.push(entry.tid);
				false
			} else {
				true
			}
		});
		drop(sleeping);
		for tid in woken {
			if let Some(thread) = self.get_thread(tid) {
				self.unblock(&thread);
			}
		}
	}

	/// `schedAdjustTimeslice()`.
	pub fn adjust_all_timeslices(&self) {
		for process in self.processes.lock().iter() {
			for thread in process.threads.lock().iter() {
				if matches!(thread.state(), ThreadState::Queued | ThreadState::Blocked) {
					thread.refresh_timeslice();
				}
			}
		}
	}

	/// `terminateThread()`/`exit()`: marks `thread` a zombie and, if it was the last living
	/// thread of its process, cascades zombie status to the process and adopts its children out
	/// to lumen.
	///
	/// Returns `Err` if `thread` is lumen or the main kernel thread — the original halts the
	/// entire system in that case (`KPANIC`, `while(1)`); propagating an error here lets the
	/// caller decide how to fail instead of looping forever.
	pub fn exit_thread(&self, thread: &Thread, status: i32, normal: bool) -> EResult<()> {
		if Some(thread.tid) == self.lumen_pid() || Some(thread.tid) == self.kernel_pid() {
			return Err(errno!(EPERM));
		}
		thread.terminate(status, normal);
		let Some(process) = self.get_process(thread.pid) else {
			return Ok(());
		};
		process.refresh_zombie();
		if process.is_zombie() {
			let lumen = self.lumen_pid();
			for child_pid in process.children() {
				if let Some(child) = self.get_process(child_pid) {
					if let Some(lumen_pid) = lumen {
						child.mark_orphan(lumen_pid);
					}
				}
			}
		}
		Ok(())
	}

	/// `schedException()`: abnormal termination on a CPU exception.
	pub fn terminate_on_exception(&self, thread: &Thread) -> EResult<()> {
		self.exit_thread(thread, -1, false)
	}

	/// `processStatus()`: finds the first not-yet-reported zombie thread of `process` and marks
	/// it clean.
	fn process_status(&self, process: &Process) -> Option<(Pid, ExitStatus)> {
		for thread in process.threads.lock().iter() {
			if !thread.is_clean() && thread.state() == ThreadState::Zombie {
				if let Some(status) = thread.exit_status() {
					thread.mark_clean();
					return Some((thread.tid, status));
				}
			}
		}
		None
	}

	/// `waitpid()`. `pid > 0` polls one specific process; `pid < -1` polls the process whose PID
	/// is exactly `abs(pid)` (the original does not resolve this through the process-group
	/// table, so neither does this); `pid == 0` or `pid == -1` polls every child of `caller`.
	///
	/// Returns `Ok(None)` when no status is available yet (not an error: the caller is expected
	/// to retry), matching the original's "return zero" meaning "nothing ready".
	pub fn waitpid(&self, caller: Pid, pid: i64, _options: u32) -> EResult<Option<(Pid, ExitStatus)>> {
		let caller_process = self.get_process(caller).ok_or(errno!(ESRCH))?;
		if pid > 0 {
			let target = self.get_process(pid as Pid).ok_or(errno!(ESRCH))?;
			return Ok(self.process_status(&target));
		}
		let scan_process = if pid < -1 {
			self.get_process((-pid) as Pid).ok_or(errno!(ESRCH))?
		} else {
			caller_process
		};
		let children = scan_process.children();
		if children.is_empty() {
			return Err(errno!(ECHILD));
		}
		for child_pid in children {
			if let Some(child) = self.get_process(child_pid) {
				if let Some(result) = self.process_status(&child) {
					return Ok(Some(result));
				}
			}
		}
		Ok(None)
	}

	/// `kill()`: delivers `sig` to the thread whose TID is exactly `pid`.
	pub fn kill(&self, pid: Pid, sig: Signal) -> EResult<()> {
		let thread = self.get_thread(pid).ok_or(errno!(ESRCH))?;
		thread.raise(sig);
		if sig.is_uncatchable() {
			self.exit_thread(&thread, 128 + sig as i32, false)?;
		}
		Ok(())
	}

	/// `kill_group()`: delivers `sig` to every thread of every process sharing `pgid`.
	pub fn kill_group(&self, pgid: Pid, sig: Signal) -> EResult<()> {
		let mut delivered = false;
		for process in self.processes.lock().iter() {
			if process.pgid() != pgid {
				continue;
			}
			for thread in process.threads.lock().iter() {
				thread.raise(sig);
				delivered = true;
			}
			if sig.is_uncatchable() {
				for thread in process.threads.lock().iter() {
					let _ = self.exit_thread(thread, 128 + sig as i32, false);
				}
			}
		}
		if delivered {
			Ok(())
		} else {
			Err(errno!(ESRCH))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::boot::{MemoryMapEntry, MemoryType};
	use crate::memory::pmm::Pmm;

	fn test_scheduler() -> Scheduler {
		let entry = MemoryMapEntry {
			base: 0,
			len: 4096 * 16384,
			kind: MemoryType::Usable,
			attributes_valid: true,
		};
		let pmm = Pmm::init(4096 * 16384, &[entry]);
		let vmm = Arc::new(Vmm::new(Arc::new(pmm).unwrap())).unwrap();
		Scheduler::new(vmm)
	}

	#[test]
	fn two_round_election_visits_every_queued_thread() {
		let sched = test_scheduler();
		sched.set_scheduling(true);
		let a = sched.spawn_kernel_thread("a").unwrap();
		let b = sched.spawn_kernel_thread("b").unwrap();
		let mut seen = std::collections::HashSet::new();
		let mut current = None;
		for _ in 0..4 {
			let next = sched.schedule_next(current.as_ref()).unwrap();
			seen.insert(next.tid);
			current = Some(next);
		}
		assert!(seen.contains(&a));
		assert!(seen.contains(&b));
	}

	#[test]
	fn fork_clones_parent_address_space() {
		let sched = test_scheduler();
		let parent = sched.spawn_kernel_thread("parent").unwrap();
		let child = sched.fork(parent).unwrap();
		assert_ne!(parent, child);
		let child_proc = sched.get_process(child).unwrap();
		assert_eq!(child_proc.parent(), Some(parent));
	}

	#[test]
	fn exit_cascades_to_process_and_orphans_children() {
		let sched = test_scheduler();
		sched.set_lumen_pid(999);
		let parent = sched.spawn_kernel_thread("parent").unwrap();
		let child_pid = sched.fork(parent).unwrap();
		let parent_thread = sched.get_thread(parent).unwrap();
		sched.exit_thread(&parent_thread, 0, true).unwrap();
		let parent_proc = sched.get_process(parent).unwrap();
		assert!(parent_proc.is_zombie());
		let child_proc = sched.get_process(child_pid).unwrap();
		assert!(child_proc.is_orphan());
		assert_eq!(child_proc.parent(), Some(999));
	}

	#[test]
	fn waitpid_reports_and_then_drains() {
		let sched = test_scheduler();
		let parent = sched.spawn_kernel_thread("parent").unwrap();
		let child_pid = sched.fork(parent).unwrap();
		let child_thread = sched.get_thread(child_pid).unwrap();
		sched.exit_thread(&child_thread, 7, true).unwrap();
		let (pid, status) = sched.waitpid(parent, -1, 0).unwrap().unwrap();
		assert_eq!(pid, child_pid);
		assert_eq!(status.code, 7);
		assert!(sched.waitpid(parent, -1, 0).unwrap().is_none());
	}

	#[test]
	fn waitpid_with_no_children_is_echild() {
		let sched = test_scheduler();
		let parent = sched.spawn_kernel_thread("parent").unwrap();
		assert_eq!(sched.waitpid(parent, -1, 0), Err(errno!(ECHILD)));
	}

	#[test]
	fn sigkill_terminates_target_thread() {
		let sched = test_scheduler();
		let pid = sched.spawn_kernel_thread("victim").unwrap();
		sched.kill(pid, Signal::Sigkill).unwrap();
		let thread = sched.get_thread(pid).unwrap();
		assert_eq!(thread.state(), ThreadState::Zombie);
	}

	#[test]
	fn sleepers_wake_after_their_ticks_elapse() {
		let sched = test_scheduler();
		let pid = sched.spawn_kernel_thread("sleeper").unwrap();
		let thread = sched.get_thread(pid).unwrap();
		sched.sleep(&thread, 3);
		for _ in 0..2 {
			sched.tick_sleepers();
			assert_eq!(thread.state(), ThreadState::Sleeping);
		}
		sched.tick_sleepers();
		assert_eq!(thread.state(), ThreadState::Queued);
	}
}

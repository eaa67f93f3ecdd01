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

//! Minimal POSIX signal delivery.
//!
//! Grounded in `original_source/src/ipc/signal.c` (`sigemptyset`/`sigfillset`/`sigaddset`/
//! `sigismember`, `kill`) and `original_source/src/include/kernel/signal.h` for the numbering.
//! Delivery itself is reduced to setting the destination thread's pending set and, for the
//! handful of signals whose default action the scheduler must enforce unconditionally
//! (`SIGKILL`, `SIGSTOP`, `SIGCONT`), acting on it directly — a full `sigaction`/handler-stack
//! mechanism is out of scope.

use utils::errno::{errno, EResult};
use utils::limits::MAX_SIGNAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
	Sigabrt = 1,
	Sigfpe = 2,
	Sigill = 3,
	Sigint = 4,
	Sigsegv = 5,
	Sigterm = 6,
	Sigalrm = 7,
	Sigbus = 8,
	Sigchld = 9,
	Sigcont = 10,
	Sighup = 11,
	Sigkill = 12,
	Sigpipe = 13,
	Sigquit = 14,
	Sigstop = 15,
	Sigtstp = 16,
	Sigttin = 17,
	Sigttou = 18,
	Sigusr1 = 19,
	Sigusr2 = 20,
	Sigpoll = 21,
	Sigsys = 22,
	Sigtrap = 23,
	Sigurg = 24,
	Sigvtalrm = 25,
	Sigxcpu = 26,
	Sigxfsz = 27,
}

impl Signal {
	pub fn from_number(n: i32) -> EResult<Self> {
		match n {
			1 => Ok(Self::Sigabrt),
			2 => Ok(Self::Sigfpe),
			3 => Ok(Self::Sigill),
			4 => Ok(Self::Sigint),
			5 => Ok(Self::Sigsegv),
			6 => Ok(Self::Sigterm),
			7 => Ok(Self::Sigalrm),
			8 => Ok(Self::Sigbus),
			9 => Ok(Self::Sigchld),
			10 => Ok(Self::Sigcont),
			11 => Ok(Self::Sighup),
			12 => Ok(Self::Sigkill),
			13 => Ok(Self::Sigpipe),
			14 => Ok(Self::Sigquit),
			15 => Ok(Self::Sigstop),
			16 => Ok(Self::Sigtstp),
			17 => Ok(Self::Sigttin),
			18 => Ok(Self::Sigttou),
			19 => Ok(Self::Sigusr1),
			20 => Ok(Self::Sigusr2),
			21 => Ok(Self::Sigpoll),
			22 => Ok(Self::Sigsys),
			23 => Ok(Self::Sigtrap),
			24 => Ok(Self::Sigurg),
			25 => Ok(Self::Sigvtalrm),
			26 => Ok(Self::Sigxcpu),
			27 => Ok(Self::Sigxfsz),
			_ => Err(errno!(EINVAL)),
		}
	}

	/// Whether this signal's default action terminates the receiving thread and cannot be
	/// blocked, matching `SIGKILL`/`SIGSTOP` being uncatchable in every POSIX-like system.
	pub fn is_uncatchable(self) -> bool {
		matches!(self, Self::Sigkill | Self::Sigstop)
	}
}

/// A bitfield over signal numbers `1..=MAX_SIGNAL`, stored as `sigset_t` is in the C source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SigSet(u64);

impl SigSet {
	/// `sigemptyset()`.
	pub fn empty() -> Self {
		Self(0)
	}

	/// `sigfillset()`.
	pub fn filled() -> Self {
		let mut set = 0u64;
		for i in 0..MAX_SIGNAL {
			set |= 1 << i;
		}
		Self(set)
	}

	/// `sigaddset()`.
	pub fn add(&mut self, sig: Signal) -> EResult<()> {
		self.0 |= 1 << (sig as u8 - 1);
		Ok(())
	}

	/// `sigdelset()`.
	pub fn remove(&mut self, sig: Signal) -> EResult<()> {
		self.0 &= !(1 << (sig as u8 - 1));
		Ok(())
	}

	/// `sigismember()`.
	pub fn contains(&self, sig: Signal) -> bool {
		self.0 & (1 << (sig as u8 - 1)) != 0
	}

	/// Returns the lowest-numbered pending, unblocked signal, if any, without clearing it.
	pub fn peek_unblocked(&self, blocked: SigSet) -> Option<Signal> {
		for i in 1..=MAX_SIGNAL as u8 {
			let sig = Signal::from_number(i as i32).ok()?;
			if self.contains(sig) && (!blocked.contains(sig) || sig.is_uncatchable()) {
				return Some(sig);
			}
		}
		None
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_set_has_no_members() {
		let set = SigSet::empty();
		assert!(!set.contains(Signal::Sigterm));
	}

	#[test]
	fn filled_set_contains_every_signal() {
		let set = SigSet::filled();
		for i in 1..=MAX_SIGNAL as i32 {
			assert!(set.contains(Signal::from_number(i).unwrap()));
		}
	}

	#[test]
	fn add_and_remove_roundtrip() {
		let mut set = SigSet::empty();
		set.add(Signal::Sigusr1).unwrap();
		assert!(set.contains(Signal::Sigusr1));
		set.remove(Signal::Sigusr1).unwrap();
		assert!(!set.contains(Signal::Sigusr1));
	}

	#[test]
	fn sigkill_is_never_blocked() {
		let pending = {
			let mut s = SigSet::empty();
			s.add(Signal::Sigkill).unwrap();
			s
		};
		let blocked = SigSet::filled();
		assert_eq!(pending.peek_unblocked(blocked), Some(Signal::Sigkill));
	}

	#[test]
	fn out_of_range_signal_number_is_einval() {
		assert_eq!(Signal::from_number(0), Err(errno!(EINVAL)));
		assert_eq!(Signal::from_number(28), Err(errno!(EINVAL)));
	}
}

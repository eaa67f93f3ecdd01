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

//! Per-process I/O descriptor table.
//!
//! Grounded in `original_source/src/include/kernel/sched.h` (`ioDescriptor`/`fileDescriptor`/
//! `dirDescriptor` field shapes) and `original_source/src/io.c` (`openIO`/`closeIO`, the
//! fork-duplicate and `CLOEXEC` invalidation rules). The polymorphic descriptor is a tagged enum
//! rather than a shared trait object: each syscall already demultiplexes on the tag, so there is
//! no shared method table to build.

use crate::ipc::Socket;
use utils::errno::{errno, EResult};
use utils::limits::MAX_IO_DESCRIPTORS;
use utils::ptr::arc::Arc;
use utils::sync::Mutex;

/// A minimal `bitflags`-shaped macro: the workspace does not depend on the `bitflags` crate, so
/// this reproduces just the `contains`/`union`/`Default` surface the descriptor table needs.
macro_rules! bitflags_like {
	(
		$(#[$meta:meta])*
		pub struct $name:ident: $repr:ty {
			$(const $variant:ident = $value:expr;)*
		}
	) => {
		$(#[$meta])*
		#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
		pub struct $name($repr);

		impl $name {
			$(pub const $variant: $name = $name($value);)*

			pub fn empty() -> Self {
				Self(0)
			}

			pub fn contains(self, other: Self) -> bool {
				self.0 & other.0 == other.0
			}

			pub fn union(self, other: Self) -> Self {
				Self(self.0 | other.0)
			}

			pub fn from_bits(bits: $repr) -> Self {
				Self(bits)
			}

			pub fn bits(self) -> $repr {
				self.0
			}
		}

		impl std::ops::BitOr for $name {
			type Output = Self;

			fn bitor(self, rhs: Self) -> Self {
				self.union(rhs)
			}
		}
	};
}

bitflags_like! {
	/// Open-time flags, matching the bit names in `original_source/src/include/kernel/io.h`.
	pub struct OpenFlags: u32 {
		const RDONLY  = 1 << 0;
		const WRONLY  = 1 << 1;
		const APPEND  = 1 << 2;
		const NONBLOCK = 1 << 3;
		const SYNC    = 1 << 4;
		const DSYNC   = 1 << 5;
		const CLOEXEC = 1 << 6;
		const CLOFORK = 1 << 7;
	}
}

/// `original_source/src/include/kernel/io.h`'s `FileDescriptor`.
#[derive(Debug, Clone)]
pub struct FileRecord {
	pub id: u64,
	pub path: String,
	pub device: String,
	pub position: u64,
	pub server_socket: usize,
}

/// `DirectoryDescriptor`.
#[derive(Debug, Clone)]
pub struct DirRecord {
	pub path: String,
	pub position: u64,
}

/// The polymorphic payload of one I/O descriptor slot.
pub enum IODescriptorKind {
	Waiting,
	File(Mutex<FileRecord>),
	Directory(Mutex<DirRecord>),
	Socket(Arc<Socket>),
}

pub struct IODescriptor {
	pub flags: OpenFlags,
	/// Set when this slot was inherited across `fork` without a deep copy, matching the
	/// original's `clone` bit used to decide whether `close` should drop a shared refcount only.
	pub cloned: bool,
	pub kind: IODescriptorKind,
}

/// A process's fixed-size, `MAX_IO_DESCRIPTORS`-wide table of open descriptors.
pub struct IoTable {
	slots: Mutex<Vec<Option<IODescriptor>>>,
}

impl Default for IoTable {
	fn default() -> Self {
		Self::new()
	}
}

impl IoTable {
	pub fn new() -> Self {
		Self {
			slots: Mutex::new((0..MAX_IO_DESCRIPTORS).map(|_| None).collect()),
		}
	}

	/// `openIO()`: installs a descriptor in the lowest free slot.
	pub fn install(&self, flags: OpenFlags, kind: IODescriptorKind) -> EResult<usize> {
		let mut slots = self.slots.lock();
		let index = slots.iter().position(Option::is_none).ok_or(errno!(EMFILE))?;
		slots[index] = Some(IODescriptor {
			flags,
			cloned: false,
			kind,
		});
		Ok(index)
	}

	/// `fcntl(F_DUPFD, x)`: duplicates `fd` into the lowest free slot at index `>= min_fd`.
	pub fn dup_from(&self, fd: usize, min_fd: usize) -> EResult<usize> {
		let mut slots = self.slots.lock();
		if fd >= slots.len() || slots[fd].is_none() {
			return Err(errno!(EBADF));
		}
		let target = (min_fd..slots.len())
			.find(|&i| slots[i].is_none())
			.ok_or(errno!(EMFILE))?;
		let flags = slots[fd].as_ref().unwrap().flags;
		let kind = match &slots[fd].as_ref().unwrap().kind {
			IODescriptorKind::Waiting => IODescriptorKind::Waiting,
			IODescriptorKind::File(rec) => IODescriptorKind::File(Mutex::new(rec.lock().clone())),
			IODescriptorKind::Directory(rec) => {
				IODescriptorKind::Directory(Mutex::new(rec.lock().clone()))
			}
			IODescriptorKind::Socket(sock) => IODescriptorKind::Socket(sock.clone()),
		};
		slots[target] = Some(IODescriptor {
			flags,
			cloned: false,
			kind,
		});
		Ok(target)
	}

	/// `closeIO()`: invalidates the slot. Idempotent on an already-closed slot, matching the
	/// original's `valid` guard.
	pub fn close(&self, fd: usize) -> EResult<()> {
		let mut slots = self.slots.lock();
		let slot = slots.get_mut(fd).ok_or(errno!(EBADF))?;
		if slot.is_none() {
			return Err(errno!(EBADF));
		}
		*slot = None;
		Ok(())
	}

	/// `fork()`'s IO-table half: every valid descriptor without `CLOFORK` is duplicated into the
	/// child at the same index, sharing the underlying record rather than deep-copying it (the
	/// socket/file record itself is reference counted).
	pub fn fork_duplicate(&self) -> EResult<Self> {
		let slots = self.slots.lock();
		let mut cloned = Vec::with_capacity(slots.len());
		for slot in slots.iter() {
			match slot {
				Some(desc) if !desc.flags.contains(OpenFlags::CLOFORK) => {
					let kind = match &desc.kind {
						IODescriptorKind::Waiting => IODescriptorKind::Waiting,
						IODescriptorKind::File(rec) => {
							IODescriptorKind::File(Mutex::new(rec.lock().clone()))
						}
						IODescriptorKind::Directory(rec) => {
							IODescriptorKind::Directory(Mutex::new(rec.lock().clone()))
						}
						IODescriptorKind::Socket(sock) => IODescriptorKind::Socket(sock.clone()),
					};
					cloned.push(Some(IODescriptor {
						flags: desc.flags,
						cloned: true,
						kind,
					}));
				}
				_ => cloned.push(None),
			}
		}
		Ok(Self {
			slots: Mutex::new(cloned),
		})
	}

	/// `execve()`'s "close every IODescriptor with `CLOEXEC`" step.
	pub fn close_on_exec(&self) {
		let mut slots = self.slots.lock();
		for slot in slots.iter_mut() {
			if matches!(slot, Some(desc) if desc.flags.contains(OpenFlags::CLOEXEC)) {
				*slot = None;
			}
		}
	}

	pub fn is_valid(&self, fd: usize) -> bool {
		self.slots.lock().get(fd).is_some_and(Option::is_some)
	}

	/// Fetches the socket installed at `fd`, the lookup every socket-family syscall
	/// (`bind`/`listen`/`connect`/`accept`/`send`/`recv`) performs before touching the socket
	/// table itself.
	pub fn socket(&self, fd: usize) -> EResult<Arc<Socket>> {
		let slots = self.slots.lock();
		match slots.get(fd).and_then(Option::as_ref).ok_or(errno!(EBADF))?.kind {
			IODescriptorKind::Socket(ref sock) => Ok(sock.clone()),
			_ => Err(errno!(ENOTSOCK)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn install_then_close_frees_the_slot() {
		let table = IoTable::new();
		let fd = table.install(OpenFlags::RDONLY, IODescriptorKind::Waiting).unwrap();
		assert!(table.is_valid(fd));
		table.close(fd).unwrap();
		assert!(!table.is_valid(fd));
	}

	#[test]
	fn double_close_is_ebadf() {
		let table = IoTable::new();
		let fd = table.install(OpenFlags::RDONLY, IODescriptorKind::Waiting).unwrap();
		table.close(fd).unwrap();
		assert_eq!(table.close(fd), Err(errno!(EBADF)));
	}

	#[test]
	fn dup_from_respects_minimum_fd() {
		let table = IoTable::new();
		let fd = table
			.install(OpenFlags::RDONLY, IODescriptorKind::File(Mutex::new(FileRecord {
				id: 1,
				path: "/a".into(),
				device: "/dev/rd".into(),
				position: 0,
				server_socket: 0,
			})))
			.unwrap();
		let dup = table.dup_from(fd, 10).unwrap();
		assert!(dup >= 10);
		assert!(table.is_valid(dup));
	}

	#[test]
	fn fork_duplicate_skips_clofork_descriptors() {
		let table = IoTable::new();
		let keep = table.install(OpenFlags::RDONLY, IODescriptorKind::Waiting).unwrap();
		let drop_fd = table
			.install(OpenFlags::RDONLY | OpenFlags::CLOFORK, IODescriptorKind::Waiting)
			.unwrap();
		let child = table.fork_duplicate().unwrap();
		assert!(child.is_valid(keep));
		assert!(!child.is_valid(drop_fd));
	}

	#[test]
	fn socket_lookup_rejects_non_socket_descriptors() {
		let table = IoTable::new();
		let fd = table.install(OpenFlags::RDONLY, IODescriptorKind::Waiting).unwrap();
		assert_eq!(table.socket(fd).unwrap_err(), errno!(ENOTSOCK));
		assert_eq!(table.socket(fd + 1).unwrap_err(), errno!(EBADF));
	}

	#[test]
	fn close_on_exec_drops_only_flagged_descriptors() {
		let table = IoTable::new();
		let keep = table.install(OpenFlags::RDONLY, IODescriptorKind::Waiting).unwrap();
		let drop_fd = table
			.install(OpenFlags::RDONLY | OpenFlags::CLOEXEC, IODescriptorKind::Waiting)
			.unwrap();
		table.close_on_exec();
		assert!(table.is_valid(keep));
		assert!(!table.is_valid(drop_fd));
	}
}

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

//! POSIX-style error codes and the result aliases built on them.
//!
//! Grounded in `original_source/src/include/errno.h`: every kernel-facing fallible operation
//! returns a signed error whose magnitude names one of these constants. `maestro` exposes the
//! equivalent as `utils::errno::Errno` plus an `errno!(EINVAL)` macro that builds one from its
//! identifier; the same shape is kept here.

/// A POSIX error code.
///
/// The numeric value is the positive `errno` magnitude; wire and syscall returns encode it as
/// its negation. `Display`/`Error` come from `thiserror`, the way `maestro` derives its own
/// aggregated error enums.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Errno {
	#[error("operation not permitted")]
	EPERM = 1,
	#[error("no such file or directory")]
	ENOENT = 2,
	#[error("no such process")]
	ESRCH = 3,
	#[error("interrupted system call")]
	EINTR = 4,
	#[error("I/O error")]
	EIO = 5,
	#[error("argument list too long")]
	E2BIG = 7,
	#[error("bad file descriptor")]
	EBADF = 9,
	#[error("no child processes")]
	ECHILD = 10,
	#[error("resource temporarily unavailable")]
	EAGAIN = 11,
	#[error("out of memory")]
	ENOMEM = 12,
	#[error("permission denied")]
	EACCES = 13,
	#[error("bad address")]
	EFAULT = 14,
	#[error("block device required")]
	ENOTBLK = 15,
	#[error("device or resource busy")]
	EBUSY = 16,
	#[error("file exists")]
	EEXIST = 17,
	#[error("no such device")]
	ENODEV = 19,
	#[error("not a directory")]
	ENOTDIR = 20,
	#[error("is a directory")]
	EISDIR = 21,
	#[error("invalid argument")]
	EINVAL = 22,
	#[error("too many open files in system")]
	ENFILE = 23,
	#[error("too many open files")]
	EMFILE = 24,
	#[error("inappropriate ioctl for device")]
	ENOTTY = 25,
	#[error("file too large")]
	EFBIG = 27,
	#[error("no space left on device")]
	ENOSPC = 28,
	#[error("illegal seek")]
	ESPIPE = 29,
	#[error("read-only file system")]
	EROFS = 30,
	#[error("too many links")]
	EMLINK = 31,
	#[error("broken pipe")]
	EPIPE = 32,
	#[error("numerical result out of range")]
	ERANGE = 34,
	#[error("file name too long")]
	ENAMETOOLONG = 36,
	#[error("function not implemented")]
	ENOSYS = 38,
	#[error("directory not empty")]
	ENOTEMPTY = 39,
	#[error("socket operation on non-socket")]
	ENOTSOCK = 88,
	#[error("destination address required")]
	EDESTADDRREQ = 89,
	#[error("message too long")]
	EMSGSIZE = 90,
	#[error("protocol wrong type for socket")]
	EPROTOTYPE = 91,
	#[error("protocol not available")]
	ENOPROTOOPT = 92,
	#[error("protocol not supported")]
	EPROTONOSUPPORT = 93,
	#[error("address family not supported by protocol")]
	EAFNOSUPPORT = 97,
	#[error("address already in use")]
	EADDRINUSE = 98,
	#[error("cannot assign requested address")]
	EADDRNOTAVAIL = 99,
	#[error("no buffer space available")]
	ENOBUFS = 105,
	#[error("transport endpoint is already connected")]
	EISCONN = 106,
	#[error("transport endpoint is not connected")]
	ENOTCONN = 107,
	#[error("connection timed out")]
	ETIMEDOUT = 110,
	#[error("connection refused")]
	ECONNREFUSED = 111,
}

/// `EWOULDBLOCK` is a POSIX alias for `EAGAIN` on every platform lux targets.
pub const EWOULDBLOCK: Errno = Errno::EAGAIN;

impl Errno {
	/// Returns the negative wire value used in syscall and router response `status` fields.
	pub fn as_negative(self) -> i64 {
		-(self as i32 as i64)
	}
}

/// Builds an [`Errno`] from one of its bare identifiers, the way `maestro`'s `errno!(EINVAL)`
/// macro does, so call sites read close to the C source they are grounded on.
#[macro_export]
macro_rules! errno {
	($variant:ident) => {
		$crate::errno::Errno::$variant
	};
}

/// The result of a fallible kernel operation.
pub type EResult<T> = Result<T, Errno>;

/// The result of an allocation, which can fail only by running out of memory.
pub type AllocResult<T> = Result<T, Errno>;

/// Collects an iterator of `Result`s, short-circuiting on the first error.
///
/// Mirrors `maestro`'s `CollectResult`, used when building a `Vec`/`BTreeMap` from a fallible
/// source (e.g. cloning the gap tree during `fork`).
pub struct CollectResult<C>(pub EResult<C>);

impl<C, T, E: Into<Errno>> FromIterator<Result<T, E>> for CollectResult<C>
where
	C: FromIterator<T>,
{
	fn from_iter<I: IntoIterator<Item = Result<T, E>>>(iter: I) -> Self {
		let mut err = None;
		let collected = iter
			.into_iter()
			.map_while(|item| match item {
				Ok(v) => Some(v),
				Err(e) => {
					err = Some(e.into());
					None
				}
			})
			.collect();
		match err {
			Some(e) => Self(Err(e)),
			None => Self(Ok(collected)),
		}
	}
}

impl From<std::convert::Infallible> for Errno {
	fn from(x: std::convert::Infallible) -> Self {
		match x {}
	}
}

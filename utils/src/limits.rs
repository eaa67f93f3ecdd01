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

//! System-wide size limits.
//!
//! Values taken verbatim from `original_source/src/include/kernel/*.h`.

/// Size of a single page, in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Exclusive upper bound on PIDs/TIDs (they share one numbering space).
pub const MAX_PID: u64 = 80_000;

/// Number of IO descriptor slots per process.
pub const MAX_IO_DESCRIPTORS: usize = 1024;

/// Exclusive upper bound on the number of simultaneously open sockets, system-wide.
pub const MAX_SOCKETS: usize = 1 << 18;

/// Maximum length, in bytes, of an absolute path (NUL-terminated in the wire format).
pub const MAX_FILE_PATH: usize = 2048;

/// Maximum length, in bytes, of a local socket address.
pub const MAX_SOCKET_ADDR: usize = 512;

/// Default backlog depth for a `listen()` call that passes `0`.
pub const SOCKET_DEFAULT_BACKLOG: usize = 16;

/// Maximum number of concurrent connections to the kernel's well-known socket.
pub const SERVER_MAX_CONNECTIONS: usize = 512;

/// Maximum size, in bytes, of one router message (header + payload).
pub const SERVER_MAX_SIZE: usize = 512 * 1024;

/// Local scheduler timer frequency, in Hz.
pub const TIMER_FREQUENCY: u64 = 1000;

/// Base unit of a thread's timeslice, in ticks, before multiplying by priority.
pub const SCHED_TIME_SLICE: u64 = 10;

/// Highest signal number, inclusive.
pub const MAX_SIGNAL: usize = 27;

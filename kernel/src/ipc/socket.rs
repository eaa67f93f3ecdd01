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

//! Local socket IPC: the kernel's one transport for process-to-process and process-to-router
//! communication.
//!
//! Grounded in `original_source/src/ipc/sockinit.c` (`socketInit`, `getLocalSocket`,
//! `socketRegister`/`socketUnregister`, `socket`, `bind`, `closeSocket`),
//! `original_source/src/ipc/connection.c` (`connect`, `listen`), and
//! `original_source/src/ipc/sockio.c` (`send`, which appends a copy of the message to the peer's
//! `inbound` list under the same `AF_UNIX`/`AF_LOCAL` branch taken here). `accept()` and `recv()`
//! have no bodies in the original source (`recv()`'s counterpart never made it into the
//! distillation at all); their behavior here — pop one queued peer off the listener's backlog,
//! and pop one message off a socket's own inbound queue — is a supplement filling that gap,
//! written the same way `send` already manages `inbound`.

use crate::process::pid::Pid;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use utils::errno::{errno, EResult};
use utils::limits::{MAX_SOCKETS, MAX_SOCKET_ADDR, SOCKET_DEFAULT_BACKLOG};
use utils::ptr::arc::Arc;
use utils::sync::Mutex;

/// The socket's communication domain. Only `Local` (`AF_UNIX`/`AF_LOCAL` in the original) is
/// meaningful in a kernel with no network stack; other families are accepted and stored so
/// `socket()`'s family check in `bind`/`connect` behaves the same, but never actually route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
	Local,
	Other(i32),
}

impl Domain {
	fn from_raw(raw: i32) -> Self {
		match raw {
			1 => Self::Local, // AF_UNIX / AF_LOCAL
			other => Self::Other(other),
		}
	}

	fn as_raw(self) -> i32 {
		match self {
			Self::Local => 1,
			Self::Other(raw) => raw,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
	Stream,
	Datagram,
	SeqPacket,
}

impl SocketType {
	fn from_raw(raw: i32) -> EResult<Self> {
		match raw {
			1 => Ok(Self::Stream),
			2 => Ok(Self::Datagram),
			5 => Ok(Self::SeqPacket),
			_ => Err(errno!(EINVAL)),
		}
	}

	fn as_raw(self) -> i32 {
		match self {
			Self::Stream => 1,
			Self::Datagram => 2,
			Self::SeqPacket => 5,
		}
	}
}

/// A bound local address: an opaque byte string (a filesystem path, by convention), matching
/// `sockaddr_un.sun_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketAddress(Vec<u8>);

impl SocketAddress {
	pub fn new(bytes: &[u8]) -> EResult<Self> {
		if bytes.len() > MAX_SOCKET_ADDR {
			return Err(errno!(ENAMETOOLONG));
		}
		Ok(Self(bytes.to_vec()))
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

struct SocketState {
	address: Option<SocketAddress>,
	listener: bool,
	backlog_max: usize,
	backlog: VecDeque<usize>,
	peer: Option<usize>,
	inbound: VecDeque<Vec<u8>>,
}

/// One open socket. Global index doubles as its identity for peer linking, the same role
/// `globalIndex` plays in the original `SocketDescriptor`.
pub struct Socket {
	pub index: usize,
	pub owner: Pid,
	pub domain: Domain,
	pub kind: SocketType,
	pub protocol: i32,
	state: Mutex<SocketState>,
	ref_count: AtomicUsize,
}

impl Socket {
	pub fn address(&self) -> Option<SocketAddress> {
		self.state.lock().address.clone()
	}

	pub fn is_listening(&self) -> bool {
		self.state.lock().listener
	}

	pub fn peer(&self) -> Option<usize> {
		self.state.lock().peer
	}
}

/// The system-wide socket table. `original_source/src/ipc/sockinit.c`'s `sockets`/`socketCount`
/// globals, reshaped as one struct behind one lock.
pub struct SocketTable {
	slots: Mutex<Vec<Option<Arc<Socket>>>>,
}

impl Default for SocketTable {
	fn default() -> Self {
		Self::new()
	}
}

impl SocketTable {
	pub fn new() -> Self {
		Self {
			slots: Mutex::new((0..MAX_SOCKETS).map(|_| None).collect()),
		}
	}

	fn find_by_index(&self, index: usize) -> Option<Arc<Socket>> {
		self.slots.lock().get(index).and_then(|s| s.clone())
	}

	/// `getLocalSocket()`: the only family actually resolved by address is `Local`.
	pub fn find_local(&self, addr: &SocketAddress) -> Option<Arc<Socket>> {
		self.slots.lock().iter().flatten().find(|s| {
			s.domain == Domain::Local && s.address().as_ref() == Some(addr)
		}).cloned()
	}

	/// `socket()`: registers a new socket descriptor of the given domain/type/protocol.
	pub fn create(&self, owner: Pid, domain: i32, kind: i32, protocol: i32) -> EResult<Arc<Socket>> {
		let kind = SocketType::from_raw(kind)?;
		let mut slots = self.slots.lock();
		let index = slots.iter().position(Option::is_none).ok_or(errno!(ENFILE))?;
		let socket = Arc::new(Socket {
			index,
			owner,
			domain: Domain::from_raw(domain),
			kind,
			protocol,
			state: Mutex::new(SocketState {
				address: None,
				listener: false,
				backlog_max: 0,
				backlog: VecDeque::new(),
				peer: None,
				inbound: VecDeque::new(),
			}),
			ref_count: AtomicUsize::new(1),
		})
		.map_err(|_| errno!(ENOMEM))?;
		slots[index] = Some(socket.clone());
		Ok(socket)
	}

	/// `bind()`: assigns a local address, rejecting a family mismatch.
	pub fn bind(&self, socket: &Socket, domain: i32, addr: SocketAddress) -> EResult<()> {
		if Domain::from_raw(domain) != socket.domain {
			return Err(errno!(EAFNOSUPPORT));
		}
		socket.state.lock().address = Some(addr);
		Ok(())
	}

	/// `listen()`: marks a bound socket as a connection listener with backlog `backlog`
	/// (`0` maps to [`SOCKET_DEFAULT_BACKLOG`]).
	pub fn listen(&self, socket: &Socket, backlog: usize) -> EResult<()> {
		let mut state = socket.state.lock();
		state.backlog_max = if backlog > 0 { backlog } else { SOCKET_DEFAULT_BACKLOG };
		state.backlog.clear();
		state.listener = true;
		Ok(())
	}

	/// `connect()`: queues `socket` on `peer_addr`'s listener backlog.
	pub fn connect(&self, socket: &Socket, peer_addr: &SocketAddress) -> EResult<()> {
		let peer = self.find_local(peer_addr).ok_or(errno!(EADDRNOTAVAIL))?;
		if peer.domain != socket.domain {
			return Err(errno!(EAFNOSUPPORT));
		}
		let mut peer_state = peer.state.lock();
		if !peer_state.listener || peer_state.backlog_max == 0 {
			return Err(errno!(ECONNREFUSED));
		}
		if peer_state.backlog.len() >= peer_state.backlog_max {
			return Err(errno!(ETIMEDOUT));
		}
		peer_state.backlog.push_back(socket.index);
		Ok(())
	}

	/// Pops the oldest queued connection off `listener`'s backlog, opens a fresh socket owned by
	/// `listener`'s process to represent the server side of that connection, and links the two
	/// as peers. Supplements the original, which leaves `accept()` unimplemented: the listening
	/// socket itself keeps accepting further connections rather than becoming one end of this
	/// one, the way a real `accept()` hands back a distinct connected descriptor.
	pub fn accept(&self, listener: &Socket) -> EResult<Arc<Socket>> {
		if !listener.is_listening() {
			return Err(errno!(EINVAL));
		}
		let client_index = {
			let mut state = listener.state.lock();
			state.backlog.pop_front().ok_or(errno!(EAGAIN))?
		};
		let client = self.find_by_index(client_index).ok_or(errno!(ECONNREFUSED))?;
		let accepted = self.create(
			listener.owner,
			listener.domain.as_raw(),
			listener.kind.as_raw(),
			listener.protocol,
		)?;
		accepted.state.lock().peer = Some(client.index);
		client.state.lock().peer = Some(accepted.index);
		Ok(accepted)
	}

	/// `send()`: requires a connected peer (`EDESTADDRREQ` otherwise, matching the original's
	/// "not in connection mode" check) and, for a local-domain socket, appends a copy of the
	/// message to the peer's inbound queue.
	pub fn send(&self, socket: &Socket, message: &[u8]) -> EResult<usize> {
		let peer_index = socket.peer().ok_or(errno!(EDESTADDRREQ))?;
		let peer = self.find_by_index(peer_index).ok_or(errno!(ENOTCONN))?;
		if socket.domain != Domain::Local {
			// Other protocols are left to userspace in the original source.
			return Err(errno!(ENOTCONN));
		}
		peer.state.lock().inbound.push_back(message.to_vec());
		Ok(message.len())
	}

	/// `recv()`: pops the oldest queued message for `socket`, or `EAGAIN` if none is queued yet.
	pub fn recv(&self, socket: &Socket, buffer: &mut [u8]) -> EResult<usize> {
		let message = socket.state.lock().inbound.pop_front().ok_or(errno!(EAGAIN))?;
		let len = message.len().min(buffer.len());
		buffer[..len].copy_from_slice(&message[..len]);
		Ok(len)
	}

	/// `closeSocket()`: drops a reference, and once it reaches zero, unlinks any peer and frees
	/// the slot.
	pub fn close(&self, socket: &Socket) {
		if socket.ref_count.fetch_sub(1, Ordering::SeqCst) != 1 {
			return;
		}
		if let Some(peer_index) = socket.peer() {
			if let Some(peer) = self.find_by_index(peer_index) {
				peer.state.lock().peer = None;
			}
		}
		self.slots.lock()[socket.index] = None;
	}

	pub fn retain(&self, socket: &Socket) {
		socket.ref_count.fetch_add(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bind_rejects_family_mismatch() {
		let table = SocketTable::new();
		let sock = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/s").unwrap();
		assert_eq!(table.bind(&sock, 2, addr), Err(errno!(EAFNOSUPPORT)));
	}

	#[test]
	fn connect_accept_roundtrip_links_peers() {
		let table = SocketTable::new();
		let server = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/server").unwrap();
		table.bind(&server, 1, addr.clone()).unwrap();
		table.listen(&server, 0).unwrap();

		let client = table.create(2, 1, 1, 0).unwrap();
		table.connect(&client, &addr).unwrap();

		let accepted = table.accept(&server).unwrap();
		assert_ne!(accepted.index, client.index);
		assert_eq!(client.peer(), Some(accepted.index));
		assert_eq!(accepted.peer(), Some(client.index));
	}

	#[test]
	fn connect_without_listener_is_connrefused() {
		let table = SocketTable::new();
		let server = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/server").unwrap();
		table.bind(&server, 1, addr.clone()).unwrap();

		let client = table.create(2, 1, 1, 0).unwrap();
		assert_eq!(table.connect(&client, &addr), Err(errno!(ECONNREFUSED)));
	}

	#[test]
	fn backlog_full_is_etimedout() {
		let table = SocketTable::new();
		let server = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/server").unwrap();
		table.bind(&server, 1, addr.clone()).unwrap();
		table.listen(&server, 1).unwrap();

		let c1 = table.create(2, 1, 1, 0).unwrap();
		table.connect(&c1, &addr).unwrap();
		let c2 = table.create(3, 1, 1, 0).unwrap();
		assert_eq!(table.connect(&c2, &addr), Err(errno!(ETIMEDOUT)));
	}

	#[test]
	fn send_without_peer_is_edestaddrreq() {
		let table = SocketTable::new();
		let sock = table.create(1, 1, 1, 0).unwrap();
		assert_eq!(table.send(&sock, b"hi"), Err(errno!(EDESTADDRREQ)));
	}

	#[test]
	fn send_then_recv_roundtrips_the_message() {
		let table = SocketTable::new();
		let server = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/server").unwrap();
		table.bind(&server, 1, addr.clone()).unwrap();
		table.listen(&server, 0).unwrap();
		let client = table.create(2, 1, 1, 0).unwrap();
		table.connect(&client, &addr).unwrap();
		let accepted = table.accept(&server).unwrap();

		table.send(&client, b"hello").unwrap();
		let mut buf = [0u8; 16];
		let n = table.recv(&accepted, &mut buf).unwrap();
		assert_eq!(&buf[..n], b"hello");
	}

	#[test]
	fn recv_with_nothing_queued_is_eagain() {
		let table = SocketTable::new();
		let sock = table.create(1, 1, 1, 0).unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(table.recv(&sock, &mut buf), Err(errno!(EAGAIN)));
	}

	#[test]
	fn close_unlinks_peer() {
		let table = SocketTable::new();
		let server = table.create(1, 1, 1, 0).unwrap();
		let addr = SocketAddress::new(b"/tmp/server").unwrap();
		table.bind(&server, 1, addr.clone()).unwrap();
		table.listen(&server, 0).unwrap();
		let client = table.create(2, 1, 1, 0).unwrap();
		table.connect(&client, &addr).unwrap();
		let accepted = table.accept(&server).unwrap();

		table.close(&accepted);
		assert_eq!(client.peer(), None);
	}
}

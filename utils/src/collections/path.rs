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

//! A byte-string path type.
//!
//! Paths crossing the kernel/router boundary are NUL-terminated byte strings bounded by
//! [`crate::limits::MAX_FILE_PATH`], not necessarily valid UTF-8. `maestro` keeps its own
//! `Path`/`PathBuf` over `[u8]` for the same reason rather than using `std::path`; this is a
//! minimal version of the same idea.

use crate::errno::{EResult, Errno};
use crate::limits::MAX_FILE_PATH;
use std::fmt;

/// A borrowed, absolute-or-relative byte-string path.
#[derive(PartialEq, Eq, Hash)]
pub struct Path([u8]);

impl Path {
	/// Wraps a byte slice as a `Path` without any validation.
	pub fn new(bytes: &[u8]) -> &Path {
		unsafe { &*(bytes as *const [u8] as *const Path) }
	}

	/// The root path `/`.
	pub fn root() -> &'static Path {
		Path::new(b"/")
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn is_absolute(&self) -> bool {
		self.0.first() == Some(&b'/')
	}
}

impl fmt::Debug for Path {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:?}", String::from_utf8_lossy(&self.0))
	}
}

/// An owned byte-string path, bounded by [`MAX_FILE_PATH`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PathBuf(Vec<u8>);

impl PathBuf {
	pub fn as_path(&self) -> &Path {
		Path::new(&self.0)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}
}

impl TryFrom<&[u8]> for PathBuf {
	type Error = Errno;

	fn try_from(bytes: &[u8]) -> EResult<Self> {
		if bytes.len() > MAX_FILE_PATH {
			return Err(Errno::ENAMETOOLONG);
		}
		Ok(Self(bytes.to_vec()))
	}
}

impl std::ops::Deref for PathBuf {
	type Target = Path;

	fn deref(&self) -> &Path {
		self.as_path()
	}
}

impl fmt::Debug for PathBuf {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(self.as_path(), f)
	}
}

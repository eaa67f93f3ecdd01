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

//! Boot-time inputs: the memory map handed off by the platform loader and the kernel command
//! line.
//!
//! Grounded in `original_source/src/args.c` (`parseBootArgs`) for argument tokenization, and in
//! the loader-handoff shape implied by `original_source/src/memory/physical.c`'s `pmmInit` for
//! the memory map itself.

use crate::memory::pmm::Pmm;

/// The type of a single memory-map entry, as handed off by the platform loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
	Usable,
	Reserved,
	AcpiReclaimable,
	AcpiNvs,
	Bad,
}

/// One contiguous range of physical memory, as enumerated by the boot loader.
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapEntry {
	pub base: u64,
	pub len: u64,
	pub kind: MemoryType,
	/// Whether this entry's extended attributes (as opposed to just base/length/type) could be
	/// trusted by the loader. An entry with invalid attributes is skipped entirely rather than
	/// guessed at.
	pub attributes_valid: bool,
}

/// Everything the kernel needs from the boot loader to bring itself up.
#[derive(Debug, Clone)]
pub struct BootInfo {
	pub memory_map: Vec<MemoryMapEntry>,
	pub highest_physical_address: u64,
	/// The raw, space-separated kernel command line.
	pub cmdline: String,
}

/// Parsed boot arguments.
///
/// `parseBootArgs()` in the original source just tokenizes into a `char **argv`; the only
/// argument the rest of the kernel actually inspects is `quiet`, so that is all this exposes
/// directly, with the full token list kept alongside for anything that needs it later.
#[derive(Debug, Clone, Default)]
pub struct BootArgs {
	pub tokens: Vec<String>,
	pub quiet: bool,
}

impl BootArgs {
	pub fn parse(cmdline: &str) -> Self {
		let tokens: Vec<String> = cmdline
			.split(' ')
			.filter(|s| !s.is_empty())
			.map(String::from)
			.collect();
		let quiet = tokens.iter().any(|t| t == "quiet");
		Self { tokens, quiet }
	}
}

/// Builds the physical memory manager from a [`BootInfo`]'s memory map.
pub fn init_pmm(info: &BootInfo) -> Pmm {
	Pmm::init(info.highest_physical_address, &info.memory_map)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn quiet_flag_is_detected() {
		let args = BootArgs::parse("root=/dev/sda1 quiet loglevel=3");
		assert!(args.quiet);
		assert_eq!(args.tokens.len(), 3);
	}

	#[test]
	fn empty_cmdline_parses_to_no_tokens() {
		let args = BootArgs::parse("");
		assert!(args.tokens.is_empty());
		assert!(!args.quiet);
	}

	#[test]
	fn repeated_spaces_do_not_produce_empty_tokens() {
		let args = BootArgs::parse("a   b");
		assert_eq!(args.tokens, vec!["a".to_string(), "b".to_string()]);
	}
}

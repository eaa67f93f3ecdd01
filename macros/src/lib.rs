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

//! Derive macros for the lux kernel workspace.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, DeriveInput};

/// Tells whether the given attribute list contains `#[repr(C)]` or
/// `#[repr(C, packed)]`.
fn has_repr_c(attrs: &[Attribute]) -> bool {
	attrs.iter().any(|attr| {
		if !attr.path().is_ident("repr") {
			return false;
		}
		let mut found = false;
		let _ = attr.parse_nested_meta(|meta| {
			if meta.path.is_ident("C") {
				found = true;
			}
			Ok(())
		});
		found
	})
}

/// Implements [`utils::bytes::AnyRepr`] for a structure, after checking it is laid out with a
/// stable, C-compatible representation.
///
/// This is used on wire structures exchanged with the router over the server bridge (see
/// `kernel::bridge::wire`), so that a byte buffer received from a socket can be reinterpreted in
/// place without manually writing an `unsafe impl` at every call site.
#[proc_macro_derive(AnyRepr)]
pub fn any_repr(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	let ident = input.ident;
	if !has_repr_c(&input.attrs) {
		panic!("{ident} is not suitable for the trait `AnyRepr`: missing #[repr(C)]");
	}
	let toks = quote! {
		unsafe impl utils::bytes::AnyRepr for #ident {}
	};
	TokenStream::from(toks)
}

//! Compact (variable length) unsigned integers.
//!
//! The two low bits of the first byte select the mode: single byte (values below 2^6), two bytes
//! (below 2^14), four bytes (below 2^30) and big integer mode, where the upper six bits of the
//! first byte hold the payload length minus four. Decoding only accepts the shortest encoding of
//! a value.
use crate::error::DecodeError;
use codec::{Compact, Encode};
use num::BigUint;

/// Decoded compact integer, kept native while it fits in 128 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactInt {
	Small(u128),
	Big(BigUint),
}

impl CompactInt {
	/// Checks that the value fits in an unsigned integer of `bits` width.
	pub fn check_width(self, offset: usize, bits: u32) -> Result<Self, DecodeError> {
		let fits = match &self {
			CompactInt::Small(value) => bits >= 128 || value >> bits == 0,
			CompactInt::Big(value) => value.bits() <= u64::from(bits),
		};
		if !fits {
			return Err(DecodeError::CompactOverflow { offset, bits });
		}
		Ok(self)
	}
}

fn take(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DecodeError> {
	let end = offset.saturating_add(len);
	bytes
		.get(offset..end)
		.ok_or_else(|| DecodeError::BufferUnderrun {
			offset,
			needed: end - bytes.len().max(offset),
		})
}

/// Decodes a compact integer starting at `offset`, returning it with the offset just past it.
pub fn decode(bytes: &[u8], offset: usize) -> Result<(CompactInt, usize), DecodeError> {
	let first = take(bytes, offset, 1)?[0];
	let non_canonical = DecodeError::NonCanonicalCompact { offset };

	match first & 0b11 {
		0b00 => Ok((CompactInt::Small(u128::from(first >> 2)), offset + 1)),
		0b01 => {
			let raw = take(bytes, offset, 2)?;
			let value = u16::from_le_bytes([raw[0], raw[1]]) >> 2;
			if value <= 0b0011_1111 {
				return Err(non_canonical);
			}
			Ok((CompactInt::Small(u128::from(value)), offset + 2))
		},
		0b10 => {
			let raw = take(bytes, offset, 4)?;
			let value = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) >> 2;
			if value <= 0x3fff {
				return Err(non_canonical);
			}
			Ok((CompactInt::Small(u128::from(value)), offset + 4))
		},
		_ => {
			let len = usize::from(first >> 2) + 4;
			let payload = take(bytes, offset + 1, len)?;
			// Most significant byte must be set, otherwise a shorter payload would do.
			if payload[len - 1] == 0 {
				return Err(non_canonical);
			}
			let end = offset + 1 + len;
			if len > 16 {
				return Ok((CompactInt::Big(BigUint::from_bytes_le(payload)), end));
			}
			let mut raw = [0u8; 16];
			raw[..len].copy_from_slice(payload);
			let value = u128::from_le_bytes(raw);
			if len == 4 && value <= u128::from(u32::MAX >> 2) {
				return Err(non_canonical);
			}
			Ok((CompactInt::Small(value), end))
		},
	}
}

/// Decodes a compact length prefix.
pub fn decode_len(bytes: &[u8], offset: usize) -> Result<(usize, usize), DecodeError> {
	let (value, next) = decode(bytes, offset)?;
	match value.check_width(offset, u32::BITS)? {
		CompactInt::Small(value) => Ok((value as usize, next)),
		CompactInt::Big(_) => Err(DecodeError::CompactOverflow {
			offset,
			bits: u32::BITS,
		}),
	}
}

pub fn encode_u128(value: u128, out: &mut Vec<u8>) {
	Compact(value).encode_to(out);
}

pub fn encode_big(value: &BigUint, out: &mut Vec<u8>) {
	if let Ok(value) = u128::try_from(value) {
		return encode_u128(value, out);
	}
	let payload = value.to_bytes_le();
	out.push((((payload.len() - 4) as u8) << 2) | 0b11);
	out.extend_from_slice(&payload);
}

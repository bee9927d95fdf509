//! Option negotiation policy (RFC 2347 base extension, RFC 2348 `blksize`,
//! the `tsize` option of RFC 2349). `timeout` (also RFC 2349) is
//! deliberately not wired up as a negotiated option — only `blksize` and
//! `tsize` are honored, per the crate's scope; any other requested option,
//! including `timeout`, is silently dropped rather than echoed.

use crate::tftp::context::Role;
use crate::tftp::packet::OptionPair;

pub const BLKSIZE_IDENT: &str = "blksize";
pub const TSIZE_IDENT: &str = "tsize";

pub const MIN_BLKSIZE: u16 = 8;
pub const MAX_BLKSIZE: u16 = 65464;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
	Blksize,
	Tsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftpOption {
	Blksize(u16),
	Tsize(u64),
}

impl TftpOption {
	pub fn kind(&self) -> OptionKind {
		match self {
			Self::Blksize(_) => OptionKind::Blksize,
			Self::Tsize(_) => OptionKind::Tsize,
		}
	}

	pub fn to_pair(&self) -> OptionPair {
		match self {
			Self::Blksize(v) => (BLKSIZE_IDENT.as_bytes().to_vec(), v.to_string().into_bytes()),
			Self::Tsize(v) => (TSIZE_IDENT.as_bytes().to_vec(), v.to_string().into_bytes()),
		}
	}
}

/// The options this crate understands, parsed out of a raw wire option
/// list. Anything else present in the list (e.g. `windowsize`) is simply
/// absent here — not an error, just dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionValues {
	pub blksize: Option<u16>,
	pub tsize: Option<u64>,
}

impl OptionValues {
	pub fn is_empty(&self) -> bool {
		self.blksize.is_none() && self.tsize.is_none()
	}

	pub fn as_vec(&self) -> Vec<TftpOption> {
		let mut out = Vec::with_capacity(2);
		if let Some(v) = self.blksize {
			out.push(TftpOption::Blksize(v));
		}
		if let Some(v) = self.tsize {
			out.push(TftpOption::Tsize(v));
		}
		out
	}
}

/// Finds the last occurrence of `name` (case-insensitive) in an ordered
/// option list: when an option appears more than once, the last occurrence
/// wins.
fn find_last<'a>(options: &'a [OptionPair], name: &str) -> Option<&'a OptionPair> {
	options.iter().rev().find(|(n, _)| n.eq_ignore_ascii_case(name.as_bytes()))
}

/// Parses the options this crate understands out of a raw wire option
/// list, with no policy applied (no clamping, no tsize substitution). Used
/// to interpret an OACK a peer sent us, and to check its contents are a
/// subset of what we requested (RFC 2347: an OACK must only ever echo
/// options the request actually asked for).
pub fn parse(options: &[OptionPair]) -> OptionValues {
	let mut values = OptionValues::default();
	if let Some((_, v)) = find_last(options, BLKSIZE_IDENT) {
		if let Ok(n) = std::str::from_utf8(v).unwrap_or("").parse::<u32>() {
			values.blksize = Some(n.clamp(MIN_BLKSIZE as u32, MAX_BLKSIZE as u32) as u16);
		}
	}
	if let Some((_, v)) = find_last(options, TSIZE_IDENT) {
		if let Ok(n) = std::str::from_utf8(v).unwrap_or("").parse::<u64>() {
			values.tsize = Some(n);
		}
	}
	values
}

/// `true` if every option name in `subset` also appears (case-insensitive)
/// in `superset` — the rule an OACK's options must satisfy against the
/// original request.
pub fn is_subset_of(subset: &[OptionPair], superset: &[OptionPair]) -> bool {
	subset.iter().all(|(name, _)| {
		superset.iter().any(|(other, _)| other.eq_ignore_ascii_case(name))
	})
}

/// Applies server-side negotiation policy to a request's raw option
/// list, returning the options to echo back in an OACK (preserving the
/// requester's original casing on each name) and the parsed values to
/// apply to the session context. Returns an empty echo list when nothing
/// in `requested` was understood, signalling that negotiation should be
/// skipped entirely (RFC 1350 fallback).
///
/// `file_size` is consulted only for `ServerDownload` (RRQ) when the
/// client requests `tsize=0`, meaning "tell me the file size".
pub fn negotiate_server(requested: &[OptionPair], role: Role, file_size: Option<u64>) -> (Vec<OptionPair>, OptionValues) {
	let mut echoed = Vec::with_capacity(2);
	let mut values = OptionValues::default();

	if let Some((name, value)) = find_last(requested, BLKSIZE_IDENT) {
		if let Ok(n) = std::str::from_utf8(value).unwrap_or("").parse::<u32>() {
			let clamped = n.clamp(MIN_BLKSIZE as u32, MAX_BLKSIZE as u32) as u16;
			values.blksize = Some(clamped);
			echoed.push((name.clone(), clamped.to_string().into_bytes()));
		}
	}

	if let Some((name, value)) = find_last(requested, TSIZE_IDENT) {
		if let Ok(requested_size) = std::str::from_utf8(value).unwrap_or("").parse::<u64>() {
			let echoed_size = match role {
				Role::ServerDownload if requested_size == 0 => file_size.unwrap_or(0),
				_ => requested_size,
			};
			values.tsize = Some(echoed_size);
			echoed.push((name.clone(), echoed_size.to_string().into_bytes()));
		}
	}

	(echoed, values)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn pair(name: &str, value: &str) -> OptionPair {
		(name.as_bytes().to_vec(), value.as_bytes().to_vec())
	}

	#[test]
	fn blksize_in_range_is_echoed_unclamped() {
		let (echoed, values) = negotiate_server(&[pair("blksize", "1024")], Role::ServerDownload, Some(10));
		assert_eq!(values.blksize, Some(1024));
		assert_eq!(echoed, vec![pair("blksize", "1024")]);
	}

	#[test]
	fn blksize_out_of_range_is_clamped() {
		let (_, values) = negotiate_server(&[pair("blksize", "99999")], Role::ServerDownload, None);
		assert_eq!(values.blksize, Some(MAX_BLKSIZE));

		let (_, values) = negotiate_server(&[pair("blksize", "0")], Role::ServerDownload, None);
		assert_eq!(values.blksize, Some(MIN_BLKSIZE));
	}

	#[test]
	fn blksize_unparseable_is_omitted_not_an_error() {
		let (echoed, values) = negotiate_server(&[pair("blksize", "banana")], Role::ServerDownload, None);
		assert!(values.blksize.is_none());
		assert!(echoed.is_empty());
	}

	#[test]
	fn tsize_zero_on_rrq_is_answered_with_actual_size() {
		let (echoed, values) = negotiate_server(&[pair("tsize", "0")], Role::ServerDownload, Some(4096));
		assert_eq!(values.tsize, Some(4096));
		assert_eq!(echoed, vec![pair("tsize", "4096")]);
	}

	#[test]
	fn tsize_nonzero_on_rrq_is_echoed_verbatim() {
		let (_, values) = negotiate_server(&[pair("tsize", "123")], Role::ServerDownload, Some(4096));
		assert_eq!(values.tsize, Some(123));
	}

	#[test]
	fn tsize_on_wrq_is_accepted_as_advisory() {
		let (echoed, values) = negotiate_server(&[pair("tsize", "777")], Role::ServerUpload, None);
		assert_eq!(values.tsize, Some(777));
		assert_eq!(echoed, vec![pair("tsize", "777")]);
	}

	#[test]
	fn unknown_options_are_dropped() {
		let (echoed, values) = negotiate_server(&[pair("windowsize", "4"), pair("timeout", "3")], Role::ServerDownload, None);
		assert!(echoed.is_empty());
		assert!(values.is_empty());
	}

	#[test]
	fn duplicate_option_last_occurrence_wins() {
		let (_, values) = negotiate_server(&[pair("blksize", "512"), pair("blksize", "2048")], Role::ServerDownload, None);
		assert_eq!(values.blksize, Some(2048));
	}

	#[test]
	fn case_is_preserved_on_echo() {
		let (echoed, _) = negotiate_server(&[pair("BlkSize", "512")], Role::ServerDownload, None);
		assert_eq!(echoed[0].0, b"BlkSize");
	}

	#[test]
	fn subset_check() {
		let requested = [pair("blksize", "512"), pair("tsize", "0")];
		let ok = [pair("blksize", "512")];
		let bad = [pair("windowsize", "4")];
		assert!(is_subset_of(&ok, &requested));
		assert!(!is_subset_of(&bad, &requested));
	}
}

//! Content-addressing primitives for cairn
//!
//! This crate provides:
//! - [`Digest`]: an algorithm-tagged fingerprint with a canonical
//!   `"<algorithm>:<hex>"` string form
//! - [`Hasher`]: a streaming hasher over bytes and files
//! - [`aggregate`]: the order-independent combination of many digests into
//!   a single total digest
//!
//! # Aggregation
//!
//! The total digest of a task is computed from the digests of all of its
//! inputs. Inputs are discovered in an order that depends on declaration
//! layout and filesystem iteration, so aggregation sorts the digests by
//! `(algorithm, bytes)` before hashing their canonical strings.

mod digest;
mod error;
mod hasher;

pub use digest::{Algorithm, Digest};
pub use error::{Error, Result};
pub use hasher::Hasher;

/// Combine digests into a single order-independent digest.
///
/// The digests are stably sorted by `(algorithm, bytes)`, their canonical
/// strings concatenated and hashed with [`Algorithm::DEFAULT`]. An empty input
/// yields the digest of the empty byte string.
#[must_use]
pub fn aggregate<'a, I>(digests: I) -> Digest
where
    I: IntoIterator<Item = &'a Digest>,
{
    let mut sorted: Vec<&Digest> = digests.into_iter().collect();
    sorted.sort();

    let mut hasher = Hasher::new(Algorithm::DEFAULT);
    for digest in sorted {
        hasher.update(digest.to_string().as_bytes());
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_hash_of_nothing() {
        assert_eq!(aggregate([]), Digest::sha384(b""));
    }

    #[test]
    fn test_aggregate_hashes_canonical_strings() {
        let a = Digest::sha384(b"a");
        let b = Digest::sha384(b"b");
        let (first, second) = if a < b { (&a, &b) } else { (&b, &a) };
        let expected = Digest::sha384(format!("{first}{second}"));
        assert_eq!(aggregate([&a, &b]), expected);
    }

    #[test]
    fn test_aggregate_mixed_algorithms_sorts_sha256_first() {
        let long = Digest::sha384(b"x");
        let short = Digest::sha256(b"x");
        let expected = Digest::sha384(format!("{short}{long}"));
        assert_eq!(aggregate([&long, &short]), expected);
    }

    #[test]
    fn test_aggregate_keeps_duplicates() {
        let a = Digest::sha384(b"a");
        assert_ne!(aggregate([&a]), aggregate([&a, &a]));
    }
}

//! Property-based tests for digest invariants.
//!
//! - Aggregation does not depend on input order
//! - The canonical string form round-trips

use cairn_digest::{Digest, aggregate};
use proptest::prelude::*;

fn digests_strategy() -> impl Strategy<Value = Vec<Digest>> {
    proptest::collection::vec(
        (any::<bool>(), proptest::collection::vec(any::<u8>(), 0..32)).prop_map(
            |(long, data)| {
                if long {
                    Digest::sha384(&data)
                } else {
                    Digest::sha256(&data)
                }
            },
        ),
        0..24,
    )
}

proptest! {
    #[test]
    fn aggregate_is_order_independent(
        (digests, shuffled) in digests_strategy().prop_flat_map(|d| {
            let original = d.clone();
            (Just(original), Just(d).prop_shuffle())
        })
    ) {
        prop_assert_eq!(aggregate(&digests), aggregate(&shuffled));
    }

    #[test]
    fn canonical_string_round_trips(digests in digests_strategy()) {
        for digest in digests {
            let parsed: Digest = digest.to_string().parse().unwrap();
            prop_assert_eq!(parsed, digest);
        }
    }

    #[test]
    fn adding_a_digest_changes_the_aggregate(
        digests in digests_strategy(),
        extra in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let mut extended = digests.clone();
        extended.push(Digest::sha384(&extra));
        prop_assert_ne!(aggregate(&digests), aggregate(&extended));
    }
}

// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_possible_truncation)]

use proptest::prelude::*;
use proptest::test_runner::{Config, RngAlgorithm, TestRng, TestRunner};
use strata_source::{BufferSource, ByteSource};

const SEED_BYTES: [u8; 32] = [
    0x3C, 0x91, 0x0E, 0x44, 0xA7, 0x5B, 0x12, 0xD8, 0x66, 0x02, 0xF1, 0x9E, 0x27, 0xB3, 0x48, 0x7A,
    0xC5, 0x19, 0x8D, 0x30, 0x6F, 0xE2, 0x04, 0x5A, 0x91, 0x3B, 0xD7, 0x28, 0x7E, 0x0C, 0xB4, 0x63,
];

fn runner() -> TestRunner {
    TestRunner::new_with_rng(
        Config {
            cases: 128,
            ..Config::default()
        },
        TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES),
    )
}

#[test]
fn accesses_succeed_exactly_when_in_bounds() {
    let strategy = (
        proptest::collection::vec(any::<u8>(), 0..64),
        0u64..80,
        0usize..24,
    );
    runner()
        .run(&strategy, |(data, addr, len)| {
            let size = data.len() as u64;
            let src = BufferSource::new(data.clone());
            let in_bounds = len == 0 || addr + len as u64 <= size;

            let mut buf = vec![0xAAu8; len];
            prop_assert_eq!(src.read(addr, &mut buf), in_bounds);
            if in_bounds && len > 0 {
                let start = addr as usize;
                prop_assert_eq!(&buf[..], &data[start..start + len]);
            } else if !in_bounds {
                prop_assert!(buf.iter().all(|&b| b == 0xAA));
            }

            let patch = vec![0x5Cu8; len];
            prop_assert_eq!(src.write(addr, &patch), in_bounds);
            let after = src.snapshot();
            prop_assert_eq!(after.len(), data.len());
            if !in_bounds {
                prop_assert_eq!(after, data);
            }
            Ok(())
        })
        .expect("bounds property");
}

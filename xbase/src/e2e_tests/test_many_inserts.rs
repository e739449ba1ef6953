//! Randomized inserts and deletes checked against a sorted model.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;
use crate::index::{Index, NodeKey};

#[test]
fn test_random_text_keys_match_model() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("NAME", "NAME", false, &table).expect("create tag");

    let mut model: Vec<(String, u32)> = Vec::new();
    for _ in 0..1000 {
        let length = rng.random_range(1..=12);
        let name: String = (0..length)
            .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
            .collect();
        let record = insert(&mut mdx, &mut table, &["NAME"], &[("NAME", Some(name.as_str()))]);
        model.push((name, record));
    }
    model.sort();

    let mut tag = mdx.mdx("NAME").expect("tag");
    let expected: Vec<u32> = model.iter().map(|(_, record)| *record).collect();
    assert_eq!(forward(&mut tag), expected);

    // Remove a random half through exact lookups.
    let mut doomed = model.clone();
    doomed.shuffle(&mut rng);
    doomed.truncate(500);
    for (name, record) in &doomed {
        let key = NodeKey::text(name.as_str());
        assert_eq!(tag.find_entry_for(&key, *record).expect("find"), Some(*record));
        tag.del_entry().expect("delete");
    }
    model.retain(|entry| !doomed.contains(entry));

    let expected: Vec<u32> = model.iter().map(|(_, record)| *record).collect();
    assert_eq!(forward(&mut tag), expected);
    let mut reversed = expected;
    reversed.reverse();
    assert_eq!(backward(&mut tag), reversed);
}

#[test]
fn test_random_balances_match_model() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut table = customers();
    let mut mdx = memory_mdx();
    mdx.create_tag("BALANCE", "BALANCE", false, &table)
        .expect("create tag");

    let mut model: Vec<(i64, u32)> = Vec::new();
    for _ in 0..600 {
        let cents = rng.random_range(-1_000_000i64..1_000_000);
        let value = format!("{}.{:02}", cents / 100, (cents % 100).abs());
        let value = if cents < 0 && cents > -100 {
            format!("-{value}")
        } else {
            value
        };
        let record = insert(&mut mdx, &mut table, &["BALANCE"], &[("BALANCE", Some(value.as_str()))]);
        model.push((cents, record));
    }
    model.sort_unstable();

    let mut tag = mdx.mdx("BALANCE").expect("tag");
    let expected: Vec<u32> = model.iter().map(|(_, record)| *record).collect();
    assert_eq!(forward(&mut tag), expected);
}

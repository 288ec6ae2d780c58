use super::*;
use std::io::Cursor;

// -------------------- Sizing --------------------

#[test]
fn sizing_follows_optimal_formulas() {
    let bf = BloomFilter::new(100, 0.01);
    // m = ceil(100 * ln(100) / ln(2)^2) = 959, k = ceil(9.59 * ln 2) = 7
    assert_eq!(bf.num_bits(), 959);
    assert_eq!(bf.num_hashes(), 7);
    assert_eq!(bf.bits.len(), 120);
    assert_eq!(bf.expected_items(), 100);
}

#[test]
#[should_panic(expected = "expected_items must be > 0")]
fn new_panics_on_zero_items() {
    BloomFilter::new(0, 0.01);
}

#[test]
#[should_panic(expected = "false_positive_rate must be in (0, 1)")]
fn new_panics_on_rate_of_one() {
    BloomFilter::new(100, 1.0);
}

#[test]
fn hash_functions_have_distinct_seeds() {
    let bf = BloomFilter::new(1000, 0.001);
    let mut seeds = bf.seeds.clone();
    seeds.sort();
    seeds.dedup();
    assert_eq!(seeds.len(), bf.num_hashes());
}

// -------------------- Membership --------------------

#[test]
fn no_false_negatives() {
    let mut bf = BloomFilter::new(2_000, 0.01);
    for i in 0..2_000 {
        bf.insert(format!("key-{i}").as_bytes());
    }
    for i in 0..2_000 {
        assert!(bf.may_contain(format!("key-{i}").as_bytes()), "key-{i} missing");
    }
}

#[test]
fn empty_filter_rejects_everything() {
    let bf = BloomFilter::new(10, 0.01);
    assert!(!bf.may_contain(b"anything"));
    assert!(!bf.may_contain(b""));
}

#[test]
fn false_positive_rate_is_reasonable() {
    let n = 10_000;
    let fpr = 0.01;
    let mut bf = BloomFilter::new(n, fpr);
    for i in 0..n {
        bf.insert(format!("in-{i}").as_bytes());
    }

    let probes = 10_000;
    let hits = (0..probes)
        .filter(|i| bf.may_contain(format!("out-{i}").as_bytes()))
        .count();
    let actual = hits as f64 / probes as f64;
    // Allow up to 3x the target for statistical variance
    assert!(actual < fpr * 3.0, "FPR too high: {actual:.4}");
}

#[test]
fn bits_are_msb_first() {
    let mut bf = BloomFilter::new(1, 0.5);
    bf.insert(b"x");
    let set: Vec<usize> = (0..bf.num_bits() as usize)
        .filter(|&i| bf.bits[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect();
    for i in 0..bf.num_hashes() {
        assert!(set.contains(&bf.bit_index(i, b"x")));
    }
}

// -------------------- Serialization --------------------

#[test]
fn serialized_layout_header() {
    let bf = BloomFilter::new(50, 0.05);
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), bf.serialized_size());
    assert_eq!(&buf[0..4], &(bf.num_hashes() as u32).to_be_bytes());
    assert_eq!(&buf[4..8], &50u32.to_be_bytes());
    assert_eq!(&buf[8..12], &bf.num_bits().to_be_bytes());
    assert_eq!(&buf[12..16], &(bf.bits.len() as u32).to_be_bytes());
    let seed_section = 16 + bf.bits.len();
    assert_eq!(&buf[seed_section..seed_section + 4], &8u32.to_be_bytes());
}

#[test]
fn reloaded_filter_answers_the_same() {
    let mut bf = BloomFilter::new(300, 0.01);
    for i in 0..300 {
        bf.insert(format!("k{i}").as_bytes());
    }
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();

    let loaded = BloomFilter::read_from(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(loaded.bits, bf.bits);
    assert_eq!(loaded.seeds, bf.seeds);
    for i in 0..600 {
        let key = format!("k{i}");
        assert_eq!(loaded.may_contain(key.as_bytes()), bf.may_contain(key.as_bytes()));
    }
}

#[test]
fn read_rejects_oversized_bitset() {
    let mut buf = Vec::new();
    buf.extend_from_slice(&3u32.to_be_bytes());
    buf.extend_from_slice(&10u32.to_be_bytes());
    buf.extend_from_slice(&64u32.to_be_bytes());
    buf.extend_from_slice(&(256 * 1024 * 1024u32).to_be_bytes());
    assert!(BloomFilter::read_from(&mut Cursor::new(&buf)).is_err());
}

#[test]
fn read_rejects_truncated_seeds() {
    let bf = BloomFilter::new(10, 0.01);
    let mut buf = Vec::new();
    bf.write_to(&mut buf).unwrap();
    buf.truncate(buf.len() - 3);
    assert!(BloomFilter::read_from(&mut Cursor::new(&buf)).is_err());
}

// -------------------- Debug --------------------

#[test]
fn debug_impl_works() {
    let bf = BloomFilter::new(100, 0.01);
    let debug = format!("{:?}", bf);
    assert!(debug.contains("BloomFilter"));
    assert!(debug.contains("num_hashes"));
}

use std::collections::BTreeSet;

use entronet_chaos::{BlockConfig, BlockProducer, ChaosConfig, ChaosEngine};
use entronet_fhe::{Address, Decryptor, FheEvaluator, MockFheEvaluator};
use pretty_assertions::assert_eq;

fn seeded_engine(fhe: &mut MockFheEvaluator, name: &str, master: u64) -> ChaosEngine {
    let admin = Address::derive("admin");
    let mut engine =
        ChaosEngine::new(Address::derive(name), admin, &ChaosConfig::default()).unwrap();
    let input = fhe.encrypt_input(master, admin, engine.address());
    engine.initialize_master_seed(fhe, admin, &input).unwrap();
    fhe.end_transaction();
    engine
}

#[test]
fn distinct_request_ids_never_repeat_outputs() {
    let mut fhe = MockFheEvaluator::default();
    let mut engine = seeded_engine(&mut fhe, "engine", 12345);
    let mut blocks = BlockProducer::new(BlockConfig::default());
    let consumer = Address::derive("consumer");

    let mut seen = BTreeSet::new();
    for request_id in 1..=64u64 {
        let block = blocks.advance().unwrap().clone().with_gas_left(2_000_000);
        let out = engine
            .generate_entropy(&mut fhe, &block, consumer, b"lottery-draw", consumer, request_id)
            .unwrap();
        fhe.end_transaction();
        assert!(seen.insert(fhe.decrypt(&consumer, &out).unwrap()));
    }
    assert_eq!(seen.len(), 64);
}

#[test]
fn independent_engines_keep_independent_state() {
    let mut fhe = MockFheEvaluator::default();
    let mut first = seeded_engine(&mut fhe, "engine-a", 1);
    let mut second = seeded_engine(&mut fhe, "engine-b", 1);
    let blocks = BlockProducer::new(BlockConfig::default());
    let block = blocks.current().clone();
    let consumer = Address::derive("consumer");

    let a = first
        .generate_entropy(&mut fhe, &block, consumer, b"tag", consumer, 1)
        .unwrap();
    let b = second
        .generate_entropy(&mut fhe, &block, consumer, b"tag", consumer, 1)
        .unwrap();

    // Same master plaintext, same inputs: same value, separate handles and state.
    assert_eq!(
        fhe.decrypt(&consumer, &a).unwrap(),
        fhe.decrypt(&consumer, &b).unwrap()
    );
    assert!(a != b);
    assert_eq!(first.generation(), 1);
    assert_eq!(second.generation(), 1);
    assert!(fhe.is_allowed(&a, &first.address()));
    assert!(!fhe.is_allowed(&a, &second.address()));
}

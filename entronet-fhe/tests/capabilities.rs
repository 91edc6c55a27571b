use entronet_fhe::{Address, Decryptor, FheError, FheEvaluator, MockFheEvaluator};
use pretty_assertions::assert_eq;

#[test]
fn chained_operations_need_only_the_final_grant() {
    let contract = Address::derive("mixer");
    let reader = Address::derive("reader");
    let mut fhe = MockFheEvaluator::default();

    let x = fhe.trivial_encrypt(contract, 0xDEAD_BEEF);
    let scaled = fhe.mul_scalar(contract, x.transient(), 31).unwrap();
    let folded = fhe
        .xor(contract, scaled.transient(), x.transient())
        .unwrap()
        .grant(&mut fhe, contract, &[contract, reader])
        .unwrap();

    let expected = 0xDEAD_BEEFu64.wrapping_mul(31) ^ 0xDEAD_BEEF;
    assert_eq!(fhe.decrypt(&reader, &folded).unwrap(), expected);
    assert_eq!(fhe.acl().principals(&folded.handle()).len(), 2);
}

#[test]
fn outsider_cannot_decrypt_or_regrant() {
    let contract = Address::derive("issuer");
    let reader = Address::derive("reader");
    let outsider = Address::derive("outsider");
    let mut fhe = MockFheEvaluator::default();

    let value = fhe
        .trivial_encrypt(contract, 77)
        .grant(&mut fhe, contract, &[reader])
        .unwrap();
    fhe.end_transaction();

    assert!(matches!(
        fhe.decrypt(&outsider, &value),
        Err(FheError::NotAllowed { principal, .. }) if principal == outsider
    ));
    assert!(matches!(
        fhe.allow(outsider, &value, outsider),
        Err(FheError::NotAllowed { .. })
    ));

    // Holders may delegate.
    fhe.allow(reader, &value, outsider).unwrap();
    assert_eq!(fhe.decrypt(&outsider, &value).unwrap(), 77);
}

#[test]
fn handles_serialize_without_plaintext() {
    let contract = Address::derive("issuer");
    let mut fhe = MockFheEvaluator::default();
    let value = fhe
        .trivial_encrypt(contract, 12345)
        .grant(&mut fhe, contract, &[contract])
        .unwrap();
    let json = serde_json::to_string(&value).unwrap();
    assert!(!json.contains("12345"));
}

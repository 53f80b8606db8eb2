// Recovery code literal format: XXXXXXXX-XXXXXXXX-XXXXXXXX-XXXXXXXX in
// uppercase hex, unique per generation, hash-verifiable with bcrypt

use suoke_auth_core::utils::recovery_codes::{
    generate_recovery_code, generate_recovery_codes, RECOVERY_CODE_LEN,
};

#[test]
fn test_literal_format() {
    let code = generate_recovery_code();
    assert_eq!(code.len(), RECOVERY_CODE_LEN);

    let groups: Vec<&str> = code.split('-').collect();
    assert_eq!(groups.len(), 4);
    for group in &groups {
        assert_eq!(group.len(), 8);
        assert!(group
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }
}

#[test]
fn test_batch_is_unique() {
    let codes = generate_recovery_codes(10);
    let unique: std::collections::HashSet<&String> = codes.iter().collect();
    assert_eq!(unique.len(), 10);
}

#[test]
fn test_codes_verify_against_bcrypt_hash() {
    let code = generate_recovery_code();
    let hash = bcrypt::hash(&code, 4u32).unwrap();

    assert!(bcrypt::verify(&code, &hash).unwrap());
    assert!(!bcrypt::verify(generate_recovery_code(), &hash).unwrap());
}

// Recovery code generation. Codes are four groups of 8 uppercase hex
// characters joined with '-', e.g. 3F2A9C01-B4D711EE-0A5C2F88-91DDE406.

use rand::RngCore;

/// Total length of a formatted recovery code (32 hex chars + 3 separators)
pub const RECOVERY_CODE_LEN: usize = 35;

/// Generate a single recovery code from 16 bytes of cryptographic randomness.
pub fn generate_recovery_code() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);

    let hex = hex::encode_upper(bytes);
    format!("{}-{}-{}-{}", &hex[0..8], &hex[8..16], &hex[16..24], &hex[24..32])
}

/// Generate a batch of recovery codes.
pub fn generate_recovery_codes(count: usize) -> Vec<String> {
    (0..count).map(|_| generate_recovery_code()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_format() {
        let code = generate_recovery_code();
        assert_eq!(code.len(), RECOVERY_CODE_LEN);

        let groups: Vec<&str> = code.split('-').collect();
        assert_eq!(groups.len(), 4);
        for group in groups {
            assert_eq!(group.len(), 8);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn test_codes_are_unique() {
        let codes = generate_recovery_codes(10);
        assert_eq!(codes.len(), 10);
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}

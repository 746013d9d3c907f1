//! Voucher code generation.

use rand::{RngCore, rngs::OsRng};

const CODE_BYTES: usize = 4;

/// Generate a voucher code: 4 bytes from the OS RNG as 8 lowercase hex characters.
///
/// # Errors
/// Returns the RNG error if the operating system cannot supply randomness.
pub fn generate_code() -> Result<String, rand::Error> {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;

    #[test]
    fn generated_codes_are_unique_lowercase_hex() -> Result<(), Box<dyn std::error::Error>> {
        let pattern = Regex::new(r"^[0-9a-f]{8}$")?;
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let code = generate_code()?;
            assert!(pattern.is_match(&code), "unexpected code format: {code}");
            assert!(seen.insert(code), "duplicate code generated");
        }
        Ok(())
    }
}

use anyhow::{Result, anyhow};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;
pub const MAX_WALLET_ADDRESS_LEN: usize = 128;
pub const MAX_PROOF_LEN: usize = 4096;

const SHORT_ADDRESS_PREFIX: usize = 4;
const SHORT_ADDRESS_SUFFIX: usize = 4;

const _: [(); 16_384 - MAX_PROOF_LEN] = [(); 16_384 - MAX_PROOF_LEN];
const _: [(); USERNAME_MAX_LEN - USERNAME_MIN_LEN] = [(); USERNAME_MAX_LEN - USERNAME_MIN_LEN];

/// Reason a proposed username was rejected before it reached the backend.
///
/// Checks run in a fixed order and the first failure wins: length lower
/// bound, length upper bound, then character set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsernameError {
    #[error("username must be at least 3 characters")]
    TooShort,
    #[error("username must be at most 20 characters")]
    TooLong,
    #[error("username may only contain letters, digits, '_' and '-'")]
    InvalidCharacters,
}

/// Trims the input and validates it against `[A-Za-z0-9_-]{3,20}`.
///
/// Returns the canonical (trimmed) username that is safe to submit.
pub fn canonicalize_username(value: &str) -> Result<String, UsernameError> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    if length < USERNAME_MIN_LEN {
        return Err(UsernameError::TooShort);
    }
    if length > USERNAME_MAX_LEN {
        return Err(UsernameError::TooLong);
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(UsernameError::InvalidCharacters);
    }
    Ok(trimmed.to_string())
}

pub fn sanitize_wallet_address(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Wallet address cannot be empty"));
    }
    if trimmed.len() > MAX_WALLET_ADDRESS_LEN {
        return Err(anyhow!(
            "Wallet address exceeds {MAX_WALLET_ADDRESS_LEN} character limit"
        ));
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(anyhow!("Wallet address cannot contain whitespace"));
    }
    Ok(trimmed.to_string())
}

/// Decodes an authentication proof as hex (with optional `0x` prefix),
/// falling back to base64. The wallet agent emits hex today; older agent
/// builds emitted base64.
pub fn decode_proof(value: &str) -> Result<Vec<u8>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Proof cannot be empty"));
    }

    match hex::decode(strip_hex_prefix(trimmed)) {
        Ok(bytes) if !bytes.is_empty() => {
            if bytes.len() > MAX_PROOF_LEN {
                return Err(anyhow!("Proof exceeds {MAX_PROOF_LEN} byte defensive limit"));
            }
            return Ok(bytes);
        }
        Ok(_) => {}
        Err(_) => {}
    }

    let decoded = BASE64_STANDARD
        .decode(trimmed)
        .map_err(|err| anyhow!("Failed to decode proof as hex or base64: {err}"))?;
    if decoded.len() > MAX_PROOF_LEN {
        return Err(anyhow!("Proof exceeds {MAX_PROOF_LEN} byte defensive limit"));
    }
    Ok(decoded)
}

/// Shortens a wallet address to its `GABC...WXYZ` display form.
///
/// Stable for a given address; addresses at or below ten characters are
/// returned unchanged.
pub fn format_short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= SHORT_ADDRESS_PREFIX + SHORT_ADDRESS_SUFFIX + 2 {
        return address.to_string();
    }
    let prefix: String = chars[..SHORT_ADDRESS_PREFIX].iter().collect();
    let suffix: String = chars[chars.len() - SHORT_ADDRESS_SUFFIX..].iter().collect();
    format!("{prefix}...{suffix}")
}

fn strip_hex_prefix(value: &str) -> &str {
    if value.starts_with("0x") || value.starts_with("0X") {
        &value[2..]
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_canonicalization_trims() {
        assert_eq!(canonicalize_username("  alice  ").unwrap(), "alice");
        assert_eq!(canonicalize_username("a_b-3").unwrap(), "a_b-3");
    }

    #[test]
    fn username_errors_in_order() {
        assert_eq!(canonicalize_username("ab"), Err(UsernameError::TooShort));
        assert_eq!(
            canonicalize_username("   ab   "),
            Err(UsernameError::TooShort)
        );
        let long = "a".repeat(USERNAME_MAX_LEN + 1);
        assert_eq!(canonicalize_username(&long), Err(UsernameError::TooLong));
        // Length checks win over the character-set check.
        let long_and_spaced = "a b".repeat(USERNAME_MAX_LEN);
        assert_eq!(
            canonicalize_username(&long_and_spaced),
            Err(UsernameError::TooLong)
        );
        assert_eq!(
            canonicalize_username("has space"),
            Err(UsernameError::InvalidCharacters)
        );
        assert_eq!(
            canonicalize_username("émoji-name"),
            Err(UsernameError::InvalidCharacters)
        );
    }

    #[test]
    fn proof_decodes_hex_and_base64() {
        let hex_encoded = "0xdeadbeef";
        let hex_bytes = decode_proof(hex_encoded).expect("hex proof");
        assert_eq!(hex_bytes, vec![0xde, 0xad, 0xbe, 0xef]);

        let base64_encoded = BASE64_STANDARD.encode([0xde, 0xad, 0xbe, 0xef]);
        let base64_bytes = decode_proof(&base64_encoded).expect("base64 proof");
        assert_eq!(base64_bytes, vec![0xde, 0xad, 0xbe, 0xef]);

        assert!(decode_proof("").is_err());
        assert!(decode_proof("   ").is_err());
    }

    #[test]
    fn oversized_proof_is_rejected() {
        let oversized = "ab".repeat(MAX_PROOF_LEN + 1);
        assert!(decode_proof(&oversized).is_err());
    }

    #[test]
    fn wallet_address_validation() {
        assert_eq!(
            sanitize_wallet_address(" GDUKMGUGDZQK6YHYA5Z6AY2G4XDSZPSZ3SW5UN3ARVMO6QSRDWP5YLEX ")
                .unwrap(),
            "GDUKMGUGDZQK6YHYA5Z6AY2G4XDSZPSZ3SW5UN3ARVMO6QSRDWP5YLEX"
        );
        assert!(sanitize_wallet_address("").is_err());
        assert!(sanitize_wallet_address("G ABC").is_err());
        let too_long = "G".repeat(MAX_WALLET_ADDRESS_LEN + 1);
        assert!(sanitize_wallet_address(&too_long).is_err());
    }

    #[test]
    fn short_address_form_is_stable() {
        let address = "GDUKMGUGDZQK6YHYA5Z6AY2G4XDSZPSZ3SW5UN3ARVMO6QSRDWP5YLEX";
        assert_eq!(format_short_address(address), "GDUK...YLEX");
        assert_eq!(format_short_address(address), format_short_address(address));
        assert_eq!(format_short_address("GABCWXYZ"), "GABCWXYZ");
    }
}

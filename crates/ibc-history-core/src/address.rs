use crate::error::CoreError;

/// Check that `address` is valid bech32 with the chain's account prefix.
pub fn validate_bech32_address(address: &str, expected_prefix: &str) -> Result<(), CoreError> {
    let invalid = |reason: String| CoreError::AddressFormatInvalid {
        address: address.to_owned(),
        expected_prefix: expected_prefix.to_owned(),
        reason,
    };

    let (hrp, data, _variant) = bech32::decode(address).map_err(|e| invalid(e.to_string()))?;
    if hrp != expected_prefix {
        return Err(invalid(format!("unexpected prefix `{hrp}`")));
    }
    if data.is_empty() {
        return Err(invalid("empty payload".to_owned()));
    }
    Ok(())
}

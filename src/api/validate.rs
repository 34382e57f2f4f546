use crate::asset_catalog::AssetCatalog;
use crate::models::ExchangeError;

/// Check the 20-byte hex form and normalize to lowercase.
pub fn normalize_address(input: &str) -> Result<String, ExchangeError> {
    let digits = input
        .strip_prefix("0x")
        .ok_or_else(|| ExchangeError::Validation(format!("Invalid address: {}", input)))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ExchangeError::Validation(format!("Invalid address: {}", input)));
    }
    Ok(format!("0x{}", digits.to_lowercase()))
}

/// 3-10 uppercase alphanumerics.
pub fn validate_asset_form(input: &str) -> Result<(), ExchangeError> {
    let valid = (3..=10).contains(&input.len())
        && input.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid {
        return Err(ExchangeError::Validation(format!("Invalid asset symbol: {}", input)));
    }
    Ok(())
}

/// Well-formed and present in the catalogue.
pub fn validate_known_asset(catalog: &AssetCatalog, input: &str) -> Result<(), ExchangeError> {
    validate_asset_form(input)?;
    if catalog.get(input).is_none() {
        return Err(ExchangeError::Validation(format!("Unknown asset: {}", input)));
    }
    Ok(())
}

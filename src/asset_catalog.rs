use rust_decimal::Decimal;
use serde::Serialize;

/// Quote currency for every trading pair.
pub const QUOTE_ASSET: &str = "USDC";

#[derive(Debug, Clone, Serialize)]
pub struct AssetInfo {
    pub symbol: &'static str,
    pub name: &'static str,
    pub decimals: u32,
    #[serde(rename = "type")]
    pub asset_type: &'static str,
}

/// AssetCatalog is the registry of tradable assets and the conversion layer
/// between client-facing decimal amounts (e.g., "1.5 ETH") and internal
/// integer representations at each asset's scale (e.g., 150_000_000).
///
/// # Key Features
/// - **Precision Enforcement**: Client inputs must not exceed the asset's `decimals`.
/// - **Safe Arithmetic**: Checked operations, `u128` intermediates for amount x price.
/// - **Rounding**: Output values round towards zero at the asset's scale.
pub struct AssetCatalog {
    assets: Vec<AssetInfo>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self {
            assets: vec![
                AssetInfo { symbol: "USDC", name: "USD Coin", decimals: 6, asset_type: "stablecoin" },
                AssetInfo { symbol: "USDT", name: "Tether USD", decimals: 6, asset_type: "stablecoin" },
                AssetInfo { symbol: "ETH", name: "Ethereum", decimals: 8, asset_type: "crypto" },
                AssetInfo { symbol: "BTC", name: "Bitcoin", decimals: 8, asset_type: "crypto" },
                AssetInfo { symbol: "DAI", name: "Dai Stablecoin", decimals: 6, asset_type: "stablecoin" },
            ],
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&AssetInfo> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    pub fn decimals(&self, symbol: &str) -> Option<u32> {
        self.get(symbol).map(|a| a.decimals)
    }

    pub fn assets(&self) -> &[AssetInfo] {
        &self.assets
    }

    /// Converts a client-facing Decimal amount to the asset's internal integer
    /// representation.
    ///
    /// # Errors
    /// * If the asset is unknown.
    /// * If the amount is not positive.
    /// * If the amount exceeds the asset's `decimals` precision.
    /// * If the conversion overflows.
    pub fn to_raw(&self, asset: &str, amount: Decimal) -> Result<u64, String> {
        let info = self
            .get(asset)
            .ok_or_else(|| format!("Unknown asset: {}", asset))?;

        if amount <= Decimal::ZERO {
            return Err(format!("Amount {} must be positive", amount));
        }

        let mut scaled = amount.normalize();
        if scaled.scale() > info.decimals {
            return Err(format!(
                "Amount {} has more than {} decimal places",
                amount, info.decimals
            ));
        }

        // At exactly the asset's scale the mantissa is the raw amount.
        // rescale leaves the value untouched when the shift would overflow.
        scaled.rescale(info.decimals);
        if scaled.scale() != info.decimals {
            return Err(format!("Amount {} is out of range for {}", amount, asset));
        }
        u64::try_from(scaled.mantissa())
            .map_err(|_| format!("Amount {} is out of range for {}", amount, asset))
    }

    /// Converts an internal integer amount to a client-facing Decimal, rounded
    /// towards zero at the asset's scale. Returns `None` if the asset is unknown.
    pub fn to_decimal(&self, asset: &str, raw: u64) -> Option<Decimal> {
        let decimals = self.decimals(asset)?;
        let divisor = Decimal::from(10_u64.pow(decimals));

        Some(
            (Decimal::from(raw) / divisor)
                .round_dp_with_strategy(decimals, rust_decimal::RoundingStrategy::ToZero),
        )
    }

    /// Converts a client-facing price (quote units per whole base unit) to the
    /// internal quote-scaled representation.
    pub fn price_to_raw(&self, price: Decimal) -> Result<u64, String> {
        self.to_raw(QUOTE_ASSET, price)
            .map_err(|e| format!("Invalid price: {}", e))
    }

    pub fn price_to_decimal(&self, raw: u64) -> Option<Decimal> {
        self.to_decimal(QUOTE_ASSET, raw)
    }
}

impl Default for AssetCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Quote value of `base_raw` units priced at `price_raw` quote units per whole
/// base unit. Truncates towards zero; `None` on overflow.
pub fn quote_value(base_raw: u64, price_raw: u64, base_decimals: u32) -> Option<u64> {
    let scaled = (base_raw as u128).checked_mul(price_raw as u128)? / 10_u128.pow(base_decimals);
    u64::try_from(scaled).ok()
}

/// Largest base amount purchasable with `quote_raw` at `price_raw`. Inverse of
/// `quote_value`, truncating towards zero.
pub fn base_affordable(quote_raw: u64, price_raw: u64, base_decimals: u32) -> Option<u64> {
    if price_raw == 0 {
        return None;
    }
    let scaled = (quote_raw as u128).checked_mul(10_u128.pow(base_decimals))? / price_raw as u128;
    u64::try_from(scaled).ok()
}

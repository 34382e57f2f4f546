use serde::{Deserialize, Serialize};

/// Per-asset funds of one address.
///
/// `available` is spendable; `frozen` is escrowed for resting orders. All
/// mutations go through checked operations so neither bucket can underflow
/// and the two can never be confused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available: u64,
    pub frozen: u64,
}

impl Balance {
    pub fn total(&self) -> u64 {
        self.available + self.frozen
    }

    pub fn deposit(&mut self, amount: u64) -> Result<(), &'static str> {
        self.available = self
            .available
            .checked_add(amount)
            .ok_or("Balance overflow on deposit")?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.available < amount {
            return Err("Insufficient available funds");
        }
        self.available -= amount;
        Ok(())
    }

    /// Move funds from available to frozen (order admission escrow).
    pub fn lock(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.available < amount {
            return Err("Insufficient available funds");
        }
        self.available -= amount;
        self.frozen = self
            .frozen
            .checked_add(amount)
            .ok_or("Balance overflow on lock")?;
        Ok(())
    }

    /// Release escrowed funds back to available (cancel / price improvement).
    pub fn unlock(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.frozen < amount {
            return Err("Insufficient frozen funds");
        }
        self.frozen -= amount;
        self.available = self
            .available
            .checked_add(amount)
            .ok_or("Balance overflow on unlock")?;
        Ok(())
    }

    /// Consume escrowed funds (the spend side of a fill).
    pub fn spend_frozen(&mut self, amount: u64) -> Result<(), &'static str> {
        if self.frozen < amount {
            return Err("Insufficient frozen funds");
        }
        self.frozen -= amount;
        Ok(())
    }
}

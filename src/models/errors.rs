use std::fmt;

use crate::models::OrderStatus;

/// Error kinds surfaced by the matching engine and request surface.
#[derive(Debug, Clone)]
pub enum ExchangeError {
    // Validation errors
    Validation(String),

    // Balance errors
    InsufficientBalance { asset: String, available: String, required: String },

    // Lookup errors
    OrderNotFound(u64),
    SettlementNotFound(String),

    // State errors
    CannotCancel { status: OrderStatus },

    // System errors
    Internal(String),
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{}", msg),
            Self::InsufficientBalance { asset, available, required } => {
                write!(
                    f,
                    "Insufficient {} balance: available {}, required {}",
                    asset, available, required
                )
            }
            Self::OrderNotFound(id) => write!(f, "Order {} not found", id),
            Self::SettlementNotFound(id) => write!(f, "Settlement {} not found", id),
            Self::CannotCancel { status } => {
                write!(f, "Order cannot be cancelled. Current status: {}", status)
            }
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ExchangeError {}

// Error code mapping for API responses
impl ExchangeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::OrderNotFound(_) => "ORDER_NOT_FOUND",
            Self::SettlementNotFound(_) => "SETTLEMENT_NOT_FOUND",
            Self::CannotCancel { .. } => "CANNOT_CANCEL",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::InsufficientBalance { .. } => 400,
            Self::OrderNotFound(_) | Self::SettlementNotFound(_) => 404,
            Self::CannotCancel { .. } => 400,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

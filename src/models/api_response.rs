use serde::Serialize;

/// Success envelope used by the order and trade routes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Error body for the settlement, balance and asset routes.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
}

/// Error body for the order and trade routes.
#[derive(Debug, Serialize)]
pub struct OrderErrorBody {
    pub success: bool,
    pub error: String,
    pub message: String,
}

impl OrderErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self { success: false, error: error.into(), message: message.into() }
    }
}

//! Concrete [`SheetSource`](crate::SheetSource) bindings.

pub mod google;

pub use google::GoogleSheetsClient;

use sheetstock_core::{RemoteError, StockError};

pub(crate) fn transport_error(service: &str, message: impl Into<String>) -> StockError {
    StockError::Remote(RemoteError::Transport {
        service: service.to_string(),
        message: message.into(),
    })
}

pub(crate) fn invalid_response(service: &str, reason: impl Into<String>) -> StockError {
    StockError::Remote(RemoteError::InvalidResponse {
        service: service.to_string(),
        reason: reason.into(),
    })
}

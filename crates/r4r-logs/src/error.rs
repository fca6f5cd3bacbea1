use thiserror::Error;

use r4r_api::ApiError;

/// Errors reported synchronously by [`crate::Subscription`]
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("subscription is already open")]
    AlreadyOpen,

    #[error("subscription is not running")]
    NotRunning,

    #[error("filter can only change before the subscription opens")]
    FilterLocked,

    #[error(transparent)]
    Api(#[from] ApiError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_is_transparent() {
        let err: StreamError = ApiError::from_status(401, "bad key").into();
        assert_eq!(err.to_string(), ApiError::from_status(401, "bad key").to_string());
    }
}

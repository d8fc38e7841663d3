use alloy_primitives::U256;

/// The error codes handed to `checkErrorHandler` when the reports of a lookup cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrCode {
    /// Only some of the requested reports were returned.
    PartialContent = 808206,
    /// The data provider rejected the request.
    BadRequest = 808400,
    /// The data provider rejected the credentials.
    Unauthorized = 808401,
    /// The data provider failed internally.
    InternalError = 808500,
    /// A gateway in front of the data provider failed.
    BadGateway = 808502,
    /// The data provider is unavailable.
    ServiceUnavailable = 808503,
    /// A gateway in front of the data provider timed out.
    GatewayTimeout = 808504,
    /// The response could not be decoded.
    BadResponse = 808600,
    /// The lookup did not complete in time.
    Timeout = 808601,
    /// Any other failure of the data provider.
    UnknownError = 808700,
}

impl ErrCode {
    /// Returns the numeric code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Returns the code passed to the upkeep.
    pub fn to_u256(self) -> U256 {
        U256::from(self.code())
    }

    /// Returns the code of a non success HTTP status.
    pub const fn from_status(status: u16) -> Self {
        match status {
            206 => Self::PartialContent,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            500 => Self::InternalError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            _ => Self::UnknownError,
        }
    }

    /// Returns true if the failure may resolve on a later attempt.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::PartialContent |
                Self::InternalError |
                Self::BadGateway |
                Self::ServiceUnavailable |
                Self::GatewayTimeout
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_statuses() {
        assert_eq!(ErrCode::from_status(401), ErrCode::Unauthorized);
        assert_eq!(ErrCode::from_status(504).code(), 808504);
        assert_eq!(ErrCode::from_status(422), ErrCode::UnknownError);
        assert!(ErrCode::from_status(503).is_retryable());
        assert!(!ErrCode::from_status(400).is_retryable());
        assert!(!ErrCode::Timeout.is_retryable());
        assert_eq!(ErrCode::BadResponse.to_u256(), U256::from(808600));
    }
}

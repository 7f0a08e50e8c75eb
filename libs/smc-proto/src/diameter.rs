//! Diameter result-code classification
//!
//! Credit-control answers carry a Result-Code (RFC 6733 / 3GPP TS 32.299)
//! whose thousands digit decides how the core treats a failed grant:
//! 4xxx failures are retried, 5xxx failures are dropped for good.

/// Diameter Result-Code values consumed by the charging core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    // Success (2xxx)
    Success = 2001,
    LimitedSuccess = 2002,

    // Protocol Errors (3xxx)
    CommandUnsupported = 3001,
    UnableToDeliver = 3002,
    TooBusy = 3004,

    // Transient Failures (4xxx)
    AuthenticationRejected = 4001,
    OutOfSpace = 4002,
    EndUserServiceDenied = 4010,
    CreditControlNotApplicable = 4011,
    CreditLimitReached = 4012,

    // Permanent Failures (5xxx)
    AuthorizationRejected = 5003,
    InvalidAvpValue = 5004,
    MissingAvp = 5005,
    ResourcesExceeded = 5006,
    UnableToComply = 5012,
    UserUnknown = 5030,
    RatingFailed = 5031,
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        is_success(*self as u32)
    }

    pub fn is_transient_failure(&self) -> bool {
        is_transient_failure(*self as u32)
    }

    pub fn is_permanent_failure(&self) -> bool {
        is_permanent_failure(*self as u32)
    }
}

impl From<u32> for ResultCode {
    fn from(value: u32) -> Self {
        match value {
            2001 => ResultCode::Success,
            2002 => ResultCode::LimitedSuccess,
            3001 => ResultCode::CommandUnsupported,
            3002 => ResultCode::UnableToDeliver,
            3004 => ResultCode::TooBusy,
            4001 => ResultCode::AuthenticationRejected,
            4002 => ResultCode::OutOfSpace,
            4010 => ResultCode::EndUserServiceDenied,
            4011 => ResultCode::CreditControlNotApplicable,
            4012 => ResultCode::CreditLimitReached,
            5003 => ResultCode::AuthorizationRejected,
            5004 => ResultCode::InvalidAvpValue,
            5005 => ResultCode::MissingAvp,
            5006 => ResultCode::ResourcesExceeded,
            5030 => ResultCode::UserUnknown,
            5031 => ResultCode::RatingFailed,
            _ => ResultCode::UnableToComply,
        }
    }
}

/// Result code indicates success (2xxx class).
pub fn is_success(code: u32) -> bool {
    (2000..3000).contains(&code)
}

/// Result code indicates a transient failure (4xxx class) that the peer
/// expects to be retried.
pub fn is_transient_failure(code: u32) -> bool {
    (4000..5000).contains(&code)
}

/// Result code indicates a permanent failure (5xxx class); the request must
/// not be repeated.
pub fn is_permanent_failure(code: u32) -> bool {
    (5000..6000).contains(&code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_classes() {
        assert!(is_success(2001));
        assert!(!is_success(4012));
        assert!(is_transient_failure(4012));
        assert!(!is_transient_failure(5031));
        assert!(is_permanent_failure(5031));
        assert!(!is_permanent_failure(3004));
    }

    #[test]
    fn test_from_u32_unknown_maps_to_unable_to_comply() {
        assert_eq!(ResultCode::from(5999), ResultCode::UnableToComply);
        assert_eq!(ResultCode::from(4012), ResultCode::CreditLimitReached);
    }
}

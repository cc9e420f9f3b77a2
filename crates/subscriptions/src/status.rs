use core::str::FromStr;

use serde::{Deserialize, Serialize};

use invsync_core::DomainError;

/// Subscription lifecycle status as modelled by the billing provider.
///
/// The provider transmits these as small integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    AwaitingFirstPayment,
    Active,
    PaymentPending,
    Cancelled,
    Expired,
    Paused,
    PaymentLate,
}

impl SubscriptionStatus {
    /// Statuses the periodic sweep lists, in processing order.
    pub const SWEPT: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Active,
        SubscriptionStatus::PaymentPending,
    ];

    pub fn code(self) -> i32 {
        match self {
            SubscriptionStatus::AwaitingFirstPayment => 0,
            SubscriptionStatus::Active => 1,
            SubscriptionStatus::PaymentPending => 2,
            SubscriptionStatus::Cancelled => 3,
            SubscriptionStatus::Expired => 4,
            SubscriptionStatus::Paused => 5,
            SubscriptionStatus::PaymentLate => 6,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, DomainError> {
        Ok(match code {
            0 => SubscriptionStatus::AwaitingFirstPayment,
            1 => SubscriptionStatus::Active,
            2 => SubscriptionStatus::PaymentPending,
            3 => SubscriptionStatus::Cancelled,
            4 => SubscriptionStatus::Expired,
            5 => SubscriptionStatus::Paused,
            6 => SubscriptionStatus::PaymentLate,
            other => return Err(DomainError::unknown_code("subscription status", other)),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionStatus::AwaitingFirstPayment => "awaiting_first_payment",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PaymentPending => "payment_pending",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::PaymentLate => "payment_late",
        }
    }

    /// Cancellation and pause both mean every reservation is released.
    pub fn releases_everything(self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled | SubscriptionStatus::Paused)
    }
}

impl core::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.trim().parse::<i32>() {
            return Self::from_code(code);
        }
        [
            SubscriptionStatus::AwaitingFirstPayment,
            SubscriptionStatus::Active,
            SubscriptionStatus::PaymentPending,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Paused,
            SubscriptionStatus::PaymentLate,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| DomainError::unknown_code("subscription status", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..=6 {
            let status = SubscriptionStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(matches!(
            SubscriptionStatus::from_code(9),
            Err(DomainError::UnknownCode { .. })
        ));
    }

    #[test]
    fn numeric_strings_parse_as_codes() {
        assert_eq!("1".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Active);
        assert_eq!(" 3 ".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Cancelled);
    }
}

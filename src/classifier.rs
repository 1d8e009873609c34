//! Voucher classification against the operator's taxpayer profile.

use serde::{Deserialize, Serialize};

use crate::model::{TaxpayerProfile, Voucher, VoucherType};

/// Why a voucher was left out of the income/expense tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IgnoreReason {
    /// Payment complements are never classified
    PaymentType,
    /// Receiver RFC differs from the profile, or the type is unrecognized
    ReceiverMismatch,
}

/// Tagged outcome of classifying one voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationBucket {
    Income,
    Expense,
    Ignored(IgnoreReason),
}

impl ClassificationBucket {
    pub fn is_income(&self) -> bool {
        matches!(self, ClassificationBucket::Income)
    }

    pub fn is_expense(&self) -> bool {
        matches!(self, ClassificationBucket::Expense)
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, ClassificationBucket::Ignored(_))
    }
}

/// Assign a voucher to exactly one bucket. Pure and deterministic.
///
/// Rules, in order:
/// 1. Payment vouchers are `Ignored(PaymentType)` regardless of identities.
/// 2. When the receiver RFC matches the profile, Income/Expense types map
///    straight to their bucket.
/// 3. Everything else is `Ignored(ReceiverMismatch)`.
pub fn classify(voucher: &Voucher, profile: &TaxpayerProfile) -> ClassificationBucket {
    if voucher.voucher_type == VoucherType::Payment {
        return ClassificationBucket::Ignored(IgnoreReason::PaymentType);
    }

    // RFC comparison is whitespace- and case-insensitive; the profile side is
    // already normalized by TaxpayerProfile::new
    let receiver = voucher.receiver.tax_id.trim().to_uppercase();
    if receiver == profile.tax_id() {
        match voucher.voucher_type {
            VoucherType::Income => return ClassificationBucket::Income,
            VoucherType::Expense => return ClassificationBucket::Expense,
            _ => {}
        }
    }
    ClassificationBucket::Ignored(IgnoreReason::ReceiverMismatch)
}

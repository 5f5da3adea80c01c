use serde::Serialize;

/// Usage allowance of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditStatus {
    pub free_credits: u32,
    pub subscription_active: bool,
}

impl CreditStatus {
    /// Whether the user may start an enhancement right now.
    pub fn can_enhance(&self) -> bool {
        self.subscription_active || self.free_credits > 0
    }

    /// Whether a successful enhancement costs this user a credit.
    pub fn is_metered(&self) -> bool {
        !self.subscription_active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: usize,
    pub user_handle: String,
    pub free_credits: u32,
    pub subscription_active: bool,
}

impl UserProfile {
    pub fn credit_status(&self) -> CreditStatus {
        CreditStatus {
            free_credits: self.free_credits,
            subscription_active: self.subscription_active,
        }
    }
}

/// Outcome of trying to take one credit from a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditCharge {
    /// A credit was taken; the remaining balance is attached.
    Charged { remaining: u32 },
    /// Subscribers are never charged.
    NotMetered,
    /// The balance was already zero.
    Exhausted,
}

use serde::{Deserialize, Serialize};
use zeroize::ZeroizeOnDrop;

/// Point in time after which a secret is no longer served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expiry {
    /// No time limit; only the view budget applies.
    Never,
    /// Unix timestamp (seconds). The secret is dead from this instant on.
    At(i64),
}

impl Expiry {
    /// Deadline `ttl_minutes` after `now`. A zero TTL means no deadline.
    pub fn after_minutes(now: i64, ttl_minutes: u32) -> Self {
        if ttl_minutes == 0 {
            Self::Never
        } else {
            Self::At(now + i64::from(ttl_minutes) * 60)
        }
    }

    pub fn has_passed(&self, now: i64) -> bool {
        matches!(self, Self::At(deadline) if now >= *deadline)
    }

    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Self::Never => None,
            Self::At(deadline) => Some(*deadline),
        }
    }
}

/// Stored in the backend as bincode-encoded bytes, keyed by handle.
/// The handle itself is the table key and is not repeated here.
#[derive(Debug, Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct StoredSecret {
    pub text: String,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
    #[zeroize(skip)]
    pub expiry: Expiry,
    /// Views left before the record dies. Never increases.
    pub remaining_views: u32,
}

impl StoredSecret {
    /// A record is live while it has views left and its deadline (if any) is ahead.
    pub fn is_live(&self, now: i64) -> bool {
        self.remaining_views > 0 && !self.expiry.has_passed(now)
    }

    /// Spend one view. Only called on a record already checked with `is_live`.
    pub(crate) fn take_view(&mut self) {
        self.remaining_views = self.remaining_views.saturating_sub(1);
    }

    pub(crate) fn to_secret(&self, handle: String) -> Secret {
        Secret {
            handle,
            text: self.text.clone(),
            created_at: self.created_at,
            expiry: self.expiry,
            remaining_views: self.remaining_views,
        }
    }
}

/// A secret as handed back to callers of the store. Wiped on drop like the
/// stored record it was copied from.
#[derive(Debug, Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct Secret {
    pub handle: String,
    pub text: String,
    pub created_at: i64,
    #[zeroize(skip)]
    pub expiry: Expiry,
    pub remaining_views: u32,
}

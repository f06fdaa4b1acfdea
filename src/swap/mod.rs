pub mod engine;
pub mod provider;
pub mod store;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Requested,
    Verified,
    AwaitingLockup,
    LockupObserved,
    Claimed,
    Failed,
}

impl SwapState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Verified => "verified",
            Self::AwaitingLockup => "awaiting_lockup",
            Self::LockupObserved => "lockup_observed",
            Self::Claimed => "claimed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "requested" => Self::Requested,
            "verified" => Self::Verified,
            "awaiting_lockup" => Self::AwaitingLockup,
            "lockup_observed" => Self::LockupObserved,
            "claimed" => Self::Claimed,
            "failed" => Self::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Claimed | Self::Failed)
    }
}

/// Provider lockup transaction after the txid and the lockup output were recomputed locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockupTransaction {
    pub txid: String,
    pub raw_hex: String,
    pub eta: Option<u32>,
    pub vout: u32,
    pub amount: u64,
    pub confirmed: bool,
}

/// A verified reverse swap.
///
/// Holds the preimage and the claim key in hex. Both are needed to claim and the caller must
/// store them until the swap is settled.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseSwapRecord {
    pub id: String,
    pub redeem_script_hex: String,
    pub timeout_block_height: u32,
    pub invoice: String,
    pub onchain_amount: u64,
    pub lockup_address: String,
    pub preimage_hex: String,
    pub private_key_hex: String,
    pub status: SwapState,
    pub lockup: Option<LockupTransaction>,
    pub claim_txid: Option<String>,
}

impl std::fmt::Debug for ReverseSwapRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReverseSwapRecord")
            .field("id", &self.id)
            .field("redeem_script_hex", &self.redeem_script_hex)
            .field("timeout_block_height", &self.timeout_block_height)
            .field("invoice", &self.invoice)
            .field("onchain_amount", &self.onchain_amount)
            .field("lockup_address", &self.lockup_address)
            .field("status", &self.status)
            .field("lockup", &self.lockup)
            .field("claim_txid", &self.claim_txid)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimTransaction {
    pub txid: String,
    pub raw_hex: String,
    pub fee: u64,
    pub output_value: u64,
}

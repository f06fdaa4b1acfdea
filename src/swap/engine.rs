use bitcoin::consensus::encode::serialize_hex;
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Amount, Network, ScriptBuf};

use crate::error::SwapError;
use crate::lightning::invoice::verify_swap_invoice;
use crate::onchain::htlc;
use crate::onchain::keys::{SwapSecrets, decode_preimage, decode_secret_key, sha256_preimage};
use crate::onchain::tx;
use crate::swap::provider::{
    CreateReverseSwapRequest, CreateReverseSwapResponse, STATUS_TX_CONFIRMED, STATUS_TX_MEMPOOL,
    SwapProvider,
};
use crate::swap::{ClaimTransaction, LockupTransaction, ReverseSwapRecord, SwapState};

/// Drives reverse swaps against a [`SwapProvider`].
///
/// Every value the provider returns is recomputed locally before it is accepted. The engine keeps
/// no per-swap state; callers hold the [`ReverseSwapRecord`] and pass it back in.
pub struct ReverseSwapEngine<P> {
    provider: P,
    network: Network,
    secp: Secp256k1<All>,
}

impl<P: SwapProvider> ReverseSwapEngine<P> {
    pub fn new(provider: P, network: Network) -> Self {
        Self {
            provider,
            network,
            secp: Secp256k1::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Requests a reverse swap of `amount_sats` and verifies everything the provider sent back.
    ///
    /// On any verification failure the freshly generated preimage and key are dropped.
    pub async fn new_reverse_swap(&self, amount_sats: u64) -> Result<ReverseSwapRecord, SwapError> {
        if amount_sats == 0 {
            return Err(SwapError::InvalidInput("amount must be positive".to_string()));
        }

        let secrets = SwapSecrets::generate(&self.secp);
        let preimage_hash = secrets.preimage_hash();
        let request =
            CreateReverseSwapRequest::new(amount_sats, &preimage_hash, &secrets.claim_pubkey());

        let resp = self.provider.create_reverse_swap(&request).await?;
        tracing::debug!(id = %resp.id, lockup_address = %resp.lockup_address, "reverse swap created");

        if let Err(e) = self.verify_created(&resp, &secrets, amount_sats) {
            tracing::warn!(id = %resp.id, error = %e, "rejecting reverse swap");
            return Err(e);
        }

        tracing::info!(
            id = %resp.id,
            amount_sats,
            onchain_amount = resp.onchain_amount,
            timeout_block_height = resp.timeout_block_height,
            "reverse swap verified"
        );

        Ok(ReverseSwapRecord {
            id: resp.id,
            redeem_script_hex: resp.redeem_script,
            timeout_block_height: resp.timeout_block_height,
            invoice: resp.invoice,
            onchain_amount: resp.onchain_amount,
            lockup_address: resp.lockup_address,
            preimage_hex: secrets.preimage_hex(),
            private_key_hex: secrets.secret_key_hex(),
            status: SwapState::Verified,
            lockup: None,
            claim_txid: None,
        })
    }

    fn verify_created(
        &self,
        resp: &CreateReverseSwapResponse,
        secrets: &SwapSecrets,
        amount_sats: u64,
    ) -> Result<(), SwapError> {
        let script = decode_script(&resp.redeem_script)?;
        let preimage_hash = secrets.preimage_hash();

        htlc::verify(
            &script,
            &preimage_hash,
            secrets.claim_pubkey(),
            resp.timeout_block_height,
            &resp.lockup_address,
            self.network,
        )?;
        verify_swap_invoice(&resp.invoice, &preimage_hash, amount_sats, self.network)?;

        if resp.onchain_amount == 0 || resp.onchain_amount > amount_sats {
            return Err(SwapError::VerificationFailed(format!(
                "onchain amount {} not in (0, {amount_sats}]",
                resp.onchain_amount
            )));
        }
        Ok(())
    }

    /// Asks the provider once for the swap status and, when it reports a lockup transaction,
    /// checks that transaction against `lockup_address` and `expected_amount`.
    pub async fn poll_status(
        &self,
        id: &str,
        lockup_address: &str,
        expected_amount: u64,
    ) -> Result<LockupTransaction, SwapError> {
        let lockup_script = tx::parse_address(lockup_address, self.network)?.script_pubkey();

        let status = self.provider.get_swap_status(id).await?;
        let confirmed = match status.status.as_str() {
            STATUS_TX_MEMPOOL => false,
            STATUS_TX_CONFIRMED => true,
            _ => return Err(SwapError::StatusNotReady(status.status)),
        };

        let reported = status.transaction.ok_or_else(|| {
            SwapError::TxMismatch(format!("status {} without a transaction", status.status))
        })?;
        let raw_hex = reported.hex.ok_or_else(|| {
            SwapError::TxMismatch(format!("transaction {} reported without hex", reported.id))
        })?;

        let lockup_tx = tx::decode_transaction(&raw_hex)?;
        let output = tx::find_lockup_output(
            &lockup_tx,
            &lockup_script,
            Amount::from_sat(expected_amount),
        )?;
        let txid = tx::verify_txid(&lockup_tx, &reported.id)?;

        tracing::info!(%id, %txid, vout = output.outpoint.vout, confirmed, "lockup transaction observed");

        Ok(LockupTransaction {
            txid: txid.to_string(),
            raw_hex,
            eta: reported.eta,
            vout: output.outpoint.vout,
            amount: output.value.to_sat(),
            confirmed,
        })
    }

    /// Polls the provider for `record` and moves it along the state machine.
    ///
    /// Transport errors leave the record untouched. Verification failures mark it failed.
    pub async fn refresh(&self, record: &mut ReverseSwapRecord) -> Result<SwapState, SwapError> {
        if record.status.is_terminal() {
            return Err(SwapError::InvalidState(format!(
                "swap {} is already {}",
                record.id,
                record.status.as_str()
            )));
        }

        match self
            .poll_status(&record.id, &record.lockup_address, record.onchain_amount)
            .await
        {
            Ok(lockup) => {
                record.lockup = Some(lockup);
                record.status = SwapState::LockupObserved;
            }
            Err(SwapError::StatusNotReady(status)) => {
                tracing::debug!(id = %record.id, %status, "lockup not ready");
                if record.status != SwapState::LockupObserved {
                    record.status = SwapState::AwaitingLockup;
                }
            }
            Err(e) if e.is_fatal() => {
                tracing::error!(id = %record.id, error = %e, "swap failed verification");
                record.status = SwapState::Failed;
                return Err(e);
            }
            Err(e) => return Err(e),
        }
        Ok(record.status)
    }

    /// Fee for claiming to `claim_address` at `fee_per_kw` sat per 1000 weight units.
    pub fn compute_claim_fee(&self, claim_address: &str, fee_per_kw: u64) -> Result<Amount, SwapError> {
        let claim_script = tx::parse_address(claim_address, self.network)?.script_pubkey();
        tx::claim_fee(&claim_script, fee_per_kw)
    }

    /// Builds and signs the claim of the observed lockup, then hands it to the provider for
    /// broadcast.
    ///
    /// A failed broadcast is logged; the signed transaction is returned either way and the record
    /// is marked claimed.
    pub async fn build_claim_transaction(
        &self,
        record: &mut ReverseSwapRecord,
        claim_address: &str,
        fee: Amount,
    ) -> Result<ClaimTransaction, SwapError> {
        let lockup = match (&record.status, &record.lockup) {
            (SwapState::LockupObserved, Some(lockup)) => lockup,
            (status, _) => {
                return Err(SwapError::InvalidState(format!(
                    "swap {} has no observed lockup (status {})",
                    record.id,
                    status.as_str()
                )));
            }
        };

        let redeem_script = decode_script(&record.redeem_script_hex)?;
        let preimage = decode_preimage(&record.preimage_hex)?;
        let secret_key = decode_secret_key(&record.private_key_hex)?;

        htlc::verify(
            &redeem_script,
            &sha256_preimage(&preimage),
            secret_key.public_key(&self.secp),
            record.timeout_block_height,
            &record.lockup_address,
            self.network,
        )?;
        let lockup_script = htlc::derive_address(&redeem_script, self.network).script_pubkey();

        let lockup_tx = tx::decode_transaction(&lockup.raw_hex)?;
        tx::verify_txid(&lockup_tx, &lockup.txid)?;
        let output = tx::find_lockup_output(
            &lockup_tx,
            &lockup_script,
            Amount::from_sat(record.onchain_amount),
        )?;

        let claim_script = tx::parse_address(claim_address, self.network)?.script_pubkey();
        let claim = tx::claim_tx(
            &self.secp,
            &redeem_script,
            output,
            claim_script,
            &preimage,
            &secret_key,
            fee,
        )?;

        let txid = claim.compute_txid().to_string();
        let raw_hex = serialize_hex(&claim);
        let output_value = claim.output[0].value.to_sat();

        if let Err(e) = self.provider.broadcast_claim(&raw_hex).await {
            tracing::warn!(id = %record.id, %txid, error = %e, "claim broadcast failed");
        } else {
            tracing::info!(id = %record.id, %txid, output_value, "claim broadcast");
        }

        record.status = SwapState::Claimed;
        record.claim_txid = Some(txid.clone());

        Ok(ClaimTransaction {
            txid,
            raw_hex,
            fee: fee.to_sat(),
            output_value,
        })
    }
}

fn decode_script(script_hex: &str) -> Result<ScriptBuf, SwapError> {
    hex::decode(script_hex)
        .map(ScriptBuf::from_bytes)
        .map_err(|e| SwapError::VerificationFailed(format!("decode redeem script hex: {e}")))
}

use std::str::FromStr as _;

use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey, Signing};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{
    Address, Amount, Network, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness, absolute,
};

use crate::error::SwapError;

/// Upper bound of a DER signature plus the sighash byte.
pub const SIGNATURE_PLACEHOLDER_LEN: usize = 73;
pub const PREIMAGE_LEN: usize = 32;
/// Longest swap redeem script: a 4-byte timeout push, which covers every CLTV block height.
/// Lower heights encode shorter, so the claim fee never undershoots.
pub const REDEEM_SCRIPT_LEN: usize = 107;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockupOutput {
    pub outpoint: OutPoint,
    pub value: Amount,
}

pub fn decode_transaction(raw_hex: &str) -> Result<Transaction, SwapError> {
    let bytes = hex::decode(raw_hex)
        .map_err(|e| SwapError::TxMismatch(format!("decode transaction hex: {e}")))?;
    bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| SwapError::TxMismatch(format!("decode transaction: {e}")))
}

pub fn parse_address(address: &str, network: Network) -> Result<Address, SwapError> {
    Address::from_str(address)
        .map_err(|e| SwapError::InvalidInput(format!("invalid address {address}: {e}")))?
        .require_network(network)
        .map_err(|e| SwapError::InvalidInput(format!("address {address}: {e}")))
}

/// Finds the single P2WSH output paying `lockup_script` exactly `expected`.
///
/// Zero matches, or more than one, is a mismatch: the provider must lock the swap amount in one
/// unambiguous output.
pub fn find_lockup_output(
    tx: &Transaction,
    lockup_script: &Script,
    expected: Amount,
) -> Result<LockupOutput, SwapError> {
    let txid = tx.compute_txid();
    let mut to_address = 0usize;
    let mut found: Vec<LockupOutput> = Vec::new();

    for (vout, out) in tx.output.iter().enumerate() {
        if !out.script_pubkey.is_p2wsh() || out.script_pubkey.as_script() != lockup_script {
            continue;
        }
        to_address += 1;
        if out.value == expected {
            let vout = u32::try_from(vout)
                .map_err(|_| SwapError::TxMismatch(format!("output index {vout} out of range")))?;
            found.push(LockupOutput {
                outpoint: OutPoint { txid, vout },
                value: out.value,
            });
        }
    }

    match found.as_slice() {
        [one] => Ok(*one),
        [] if to_address == 0 => Err(SwapError::TxMismatch(format!(
            "lockup script not found in transaction {txid}"
        ))),
        [] => Err(SwapError::TxMismatch(format!(
            "bad amount: no output of {} sat to the lockup script in {txid}",
            expected.to_sat()
        ))),
        many => Err(SwapError::TxMismatch(format!(
            "ambiguous lockup: {} outputs of {} sat in {txid}",
            many.len(),
            expected.to_sat()
        ))),
    }
}

/// Recomputes the transaction hash and compares it with the id the provider reported.
pub fn verify_txid(tx: &Transaction, reported: &str) -> Result<Txid, SwapError> {
    let computed = tx.compute_txid();
    let reported_txid = Txid::from_str(reported)
        .map_err(|e| SwapError::TxMismatch(format!("invalid reported txid {reported}: {e}")))?;
    if computed != reported_txid {
        return Err(SwapError::TxMismatch(format!(
            "bad txid: {reported} != {computed}"
        )));
    }
    Ok(computed)
}

fn unsigned_claim(previous_output: OutPoint, claim_script: ScriptBuf, value: Amount) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ZERO,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value,
            script_pubkey: claim_script,
        }],
    }
}

/// Fee for a claim paying `claim_script` at `fee_per_kw` sat per 1000 weight units, rounded up.
///
/// The weight is measured on a template whose witness has the byte length of a real claim
/// witness, so the result depends only on the output script and the rate.
pub fn claim_fee(claim_script: &Script, fee_per_kw: u64) -> Result<Amount, SwapError> {
    let mut template = unsigned_claim(OutPoint::null(), claim_script.to_owned(), Amount::ZERO);
    template.input[0].witness = Witness::from_slice(&[
        vec![0u8; SIGNATURE_PLACEHOLDER_LEN],
        vec![0u8; PREIMAGE_LEN],
        vec![0u8; REDEEM_SCRIPT_LEN],
    ]);

    let weight = template.weight().to_wu();
    let fee = weight
        .checked_mul(fee_per_kw)
        .and_then(|v| v.checked_add(999))
        .map(|v| v / 1000)
        .ok_or_else(|| SwapError::InvalidInput(format!("fee rate too large: {fee_per_kw}")))?;
    Ok(Amount::from_sat(fee))
}

/// Spends `lockup` through the preimage branch of `redeem_script`.
///
/// Witness is `[signature, preimage, redeem_script]`; the signature commits with SIGHASH_ALL to
/// the segwit v0 digest over the redeem script and the locked value.
pub fn claim_tx<C: Signing>(
    secp: &Secp256k1<C>,
    redeem_script: &Script,
    lockup: LockupOutput,
    claim_script: ScriptBuf,
    preimage: &[u8; 32],
    secret_key: &SecretKey,
    fee: Amount,
) -> Result<Transaction, SwapError> {
    let value = lockup
        .value
        .checked_sub(fee)
        .filter(|v| *v > Amount::ZERO)
        .ok_or_else(|| {
            SwapError::InvalidInput(format!(
                "fee {} sat leaves nothing of the {} sat lockup",
                fee.to_sat(),
                lockup.value.to_sat()
            ))
        })?;

    let mut tx = unsigned_claim(lockup.outpoint, claim_script, value);

    let sighash_type = EcdsaSighashType::All;
    let sighash = SighashCache::new(&tx)
        .p2wsh_signature_hash(0, redeem_script, lockup.value, sighash_type)
        .map_err(|e| SwapError::InvalidInput(format!("claim sighash: {e}")))?;

    let msg = Message::from_digest(sighash.to_byte_array());
    let signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&msg, secret_key),
        sighash_type,
    };

    tx.input[0].witness = Witness::from_slice(&[
        signature.to_vec(),
        preimage.to_vec(),
        redeem_script.to_bytes(),
    ]);

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onchain::htlc::expected_script;
    use bitcoin::secp256k1::{PublicKey, SecretKey};

    #[test]
    fn redeem_script_len_bounds_every_timeout_height() {
        let secp = Secp256k1::new();
        let claim = PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[3u8; 32]).unwrap());
        let refund = PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[4u8; 32]).unwrap());
        for height in [1u32, 500, 65_536, 700_000, 8_388_607, 8_388_608, 499_999_999] {
            let script = expected_script(&[7u8; 32], claim, height, refund);
            assert!(script.len() <= REDEEM_SCRIPT_LEN, "height {height}: {}", script.len());
        }
        let widest = expected_script(&[7u8; 32], claim, 8_388_608, refund);
        assert_eq!(widest.len(), REDEEM_SCRIPT_LEN);
    }

    #[test]
    fn fee_rounds_up() {
        let spk = ScriptBuf::new_p2wsh(&bitcoin::WScriptHash::all_zeros());
        let zero = claim_fee(&spk, 0).unwrap();
        assert_eq!(zero, Amount::ZERO);
        let one = claim_fee(&spk, 1).unwrap();
        assert_eq!(one, Amount::from_sat(1));
        assert!(claim_fee(&spk, u64::MAX).is_err());
    }
}

mod support;

use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, ScriptBuf, WPubkeyHash};

use ln_btc_reverse_swap::SwapError;
use ln_btc_reverse_swap::onchain::htlc;
use ln_btc_reverse_swap::onchain::keys::sha256_preimage;
use ln_btc_reverse_swap::onchain::tx;

use support::fixtures::{
    AMOUNT_SATS, NETWORK, TIMEOUT_BLOCK_HEIGHT, change_script, funding_tx, lockup_tx,
    refund_pubkey, secret_key,
};

const PREIMAGE: [u8; 32] = [0xab; 32];

fn redeem_script() -> ScriptBuf {
    let secp = Secp256k1::new();
    htlc::expected_script(
        &sha256_preimage(&PREIMAGE),
        secret_key(0x01).public_key(&secp),
        TIMEOUT_BLOCK_HEIGHT,
        refund_pubkey(),
    )
}

fn claim_script() -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x33; 20]))
}

#[test]
fn claim_output_is_locked_amount_minus_fee() -> anyhow::Result<()> {
    let secp = Secp256k1::new();
    let redeem = redeem_script();
    let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
    let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);

    let lockup = tx::find_lockup_output(&funding, &lockup_spk, Amount::from_sat(AMOUNT_SATS))?;
    assert_eq!(lockup.outpoint.vout, 1);
    assert_eq!(lockup.outpoint.txid, funding.compute_txid());

    let claim = tx::claim_tx(
        &secp,
        &redeem,
        lockup,
        claim_script(),
        &PREIMAGE,
        &secret_key(0x01),
        Amount::from_sat(300),
    )?;

    assert_eq!(claim.input.len(), 1);
    assert_eq!(claim.output.len(), 1);
    assert_eq!(claim.output[0].value, Amount::from_sat(99_700));
    assert_eq!(claim.output[0].script_pubkey, claim_script());
    assert_eq!(claim.input[0].previous_output, lockup.outpoint);
    Ok(())
}

#[test]
fn claim_witness_spends_the_preimage_branch() -> anyhow::Result<()> {
    let secp = Secp256k1::new();
    let redeem = redeem_script();
    let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
    let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);
    let lockup = tx::find_lockup_output(&funding, &lockup_spk, Amount::from_sat(AMOUNT_SATS))?;

    let claim = tx::claim_tx(
        &secp,
        &redeem,
        lockup,
        claim_script(),
        &PREIMAGE,
        &secret_key(0x01),
        Amount::from_sat(300),
    )?;

    let witness: Vec<&[u8]> = claim.input[0].witness.iter().collect();
    assert_eq!(witness.len(), 3);
    assert_eq!(witness[1], PREIMAGE.as_slice());
    assert_eq!(witness[2], redeem.as_bytes());

    let sig = bitcoin::ecdsa::Signature::from_slice(witness[0])?;
    assert_eq!(sig.sighash_type, EcdsaSighashType::All);

    let sighash = SighashCache::new(&claim).p2wsh_signature_hash(
        0,
        &redeem,
        Amount::from_sat(AMOUNT_SATS),
        EcdsaSighashType::All,
    )?;
    let msg = Message::from_digest(sighash.to_byte_array());
    secp.verify_ecdsa(&msg, &sig.signature, &secret_key(0x01).public_key(&secp))?;
    Ok(())
}

#[test]
fn fee_that_eats_the_output_is_rejected() -> anyhow::Result<()> {
    let secp = Secp256k1::new();
    let redeem = redeem_script();
    let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
    let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);
    let lockup = tx::find_lockup_output(&funding, &lockup_spk, Amount::from_sat(AMOUNT_SATS))?;

    for fee in [AMOUNT_SATS, AMOUNT_SATS + 1] {
        let err = tx::claim_tx(
            &secp,
            &redeem,
            lockup,
            claim_script(),
            &PREIMAGE,
            &secret_key(0x01),
            Amount::from_sat(fee),
        )
        .unwrap_err();
        assert!(matches!(err, SwapError::InvalidInput(_)), "fee {fee}: {err:?}");
    }
    Ok(())
}

#[test]
fn claim_fee_grows_with_rate() -> anyhow::Result<()> {
    let script = claim_script();
    let fees = [250u64, 1000, 2500, 10_000]
        .iter()
        .map(|rate| tx::claim_fee(&script, *rate))
        .collect::<Result<Vec<_>, _>>()?;

    for pair in fees.windows(2) {
        assert!(pair[0] < pair[1], "{pair:?}");
    }
    assert_eq!(tx::claim_fee(&script, 1000)?, tx::claim_fee(&script, 1000)?);
    Ok(())
}

#[test]
fn claim_fee_covers_the_signed_claim() -> anyhow::Result<()> {
    let secp = Secp256k1::new();
    let fee_per_kw = 1000;

    // two unrelated swaps: different secrets, same output script
    let mut weights = Vec::new();
    for (preimage, key) in [([0x01u8; 32], 0x05u8), ([0x02u8; 32], 0x06u8)] {
        let redeem = htlc::expected_script(
            &sha256_preimage(&preimage),
            secret_key(key).public_key(&secp),
            TIMEOUT_BLOCK_HEIGHT,
            refund_pubkey(),
        );
        let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
        let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);
        let lockup =
            tx::find_lockup_output(&funding, &lockup_spk, Amount::from_sat(AMOUNT_SATS))?;
        let fee = tx::claim_fee(&claim_script(), fee_per_kw)?;
        let claim = tx::claim_tx(
            &secp,
            &redeem,
            lockup,
            claim_script(),
            &preimage,
            &secret_key(key),
            fee,
        )?;
        let weight = claim.weight().to_wu();
        assert!(fee.to_sat() * 1000 >= weight * fee_per_kw, "fee {fee} for weight {weight}");
        weights.push(weight);
    }

    // DER signatures vary by a byte or two; the fee estimate does not
    assert!(weights[0].abs_diff(weights[1]) <= 2);
    Ok(())
}

#[test]
fn claim_fee_covers_low_and_high_timeout_heights() -> anyhow::Result<()> {
    let secp = Secp256k1::new();
    let fee_per_kw = 1000;
    let fee = tx::claim_fee(&claim_script(), fee_per_kw)?;

    // regtest heights push fewer bytes, far future heights push more
    for height in [101u32, 500, TIMEOUT_BLOCK_HEIGHT, 8_388_608, 499_999_999] {
        let redeem = htlc::expected_script(
            &sha256_preimage(&PREIMAGE),
            secret_key(0x01).public_key(&secp),
            height,
            refund_pubkey(),
        );
        let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
        let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);
        let lockup =
            tx::find_lockup_output(&funding, &lockup_spk, Amount::from_sat(AMOUNT_SATS))?;
        let claim = tx::claim_tx(
            &secp,
            &redeem,
            lockup,
            claim_script(),
            &PREIMAGE,
            &secret_key(0x01),
            fee,
        )?;
        let weight = claim.weight().to_wu();
        assert!(
            fee.to_sat() * 1000 >= weight * fee_per_kw,
            "height {height}: fee {fee} for weight {weight}"
        );
    }
    Ok(())
}

#[test]
fn lockup_scan_requires_one_exact_output() {
    let redeem = redeem_script();
    let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
    let expected = Amount::from_sat(AMOUNT_SATS);
    let change = change_script();

    let missing = funding_tx(&[(change.as_script(), AMOUNT_SATS)]);
    let err = tx::find_lockup_output(&missing, &lockup_spk, expected).unwrap_err();
    assert!(matches!(&err, SwapError::TxMismatch(m) if m.contains("not found")), "{err:?}");

    let wrong_amount = funding_tx(&[(lockup_spk.as_script(), AMOUNT_SATS - 1)]);
    let err = tx::find_lockup_output(&wrong_amount, &lockup_spk, expected).unwrap_err();
    assert!(matches!(&err, SwapError::TxMismatch(m) if m.contains("bad amount")), "{err:?}");

    let twice = funding_tx(&[
        (lockup_spk.as_script(), AMOUNT_SATS),
        (lockup_spk.as_script(), AMOUNT_SATS),
    ]);
    let err = tx::find_lockup_output(&twice, &lockup_spk, expected).unwrap_err();
    assert!(matches!(&err, SwapError::TxMismatch(m) if m.contains("ambiguous")), "{err:?}");

    // a second, smaller output to the same script does not make it ambiguous
    let split = funding_tx(&[
        (lockup_spk.as_script(), 1_000),
        (lockup_spk.as_script(), AMOUNT_SATS),
    ]);
    let found = tx::find_lockup_output(&split, &lockup_spk, expected).expect("exact output");
    assert_eq!(found.outpoint.vout, 1);
}

#[test]
fn reported_txid_must_match() -> anyhow::Result<()> {
    let redeem = redeem_script();
    let lockup_spk = htlc::derive_address(&redeem, NETWORK).script_pubkey();
    let funding = lockup_tx(&lockup_spk, AMOUNT_SATS);
    let txid = funding.compute_txid();

    assert_eq!(tx::verify_txid(&funding, &txid.to_string())?, txid);

    let other = lockup_tx(&lockup_spk, AMOUNT_SATS + 1).compute_txid();
    let err = tx::verify_txid(&funding, &other.to_string()).unwrap_err();
    assert!(matches!(err, SwapError::TxMismatch(_)));
    assert!(tx::verify_txid(&funding, "zz").is_err());
    Ok(())
}

use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::Version;
use bitcoin::{
    Amount, Network, OutPoint, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    WPubkeyHash, Witness, absolute,
};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};

use ln_btc_reverse_swap::onchain::htlc;
use ln_btc_reverse_swap::swap::provider::{CreateReverseSwapRequest, CreateReverseSwapResponse};

pub const NETWORK: Network = Network::Testnet;
pub const AMOUNT_SATS: u64 = 100_000;
pub const TIMEOUT_BLOCK_HEIGHT: u32 = 700_000;
pub const SWAP_ID: &str = "Ji2Bqv";

pub fn secret_key(byte: u8) -> SecretKey {
    SecretKey::from_slice(&[byte; 32]).expect("valid secret key")
}

pub fn pubkey(byte: u8) -> PublicKey {
    secret_key(byte).public_key(&Secp256k1::new())
}

pub fn refund_pubkey() -> PublicKey {
    pubkey(0x21)
}

/// Signed BOLT11 invoice with the given payment hash and amount.
pub fn invoice(payment_hash: [u8; 32], amount_msat: u64, currency: Currency) -> String {
    let secp = Secp256k1::new();
    let node_key = secret_key(0x42);
    InvoiceBuilder::new(currency)
        .description("reverse swap".to_string())
        .payment_hash(sha256::Hash::from_byte_array(payment_hash))
        .payment_secret(PaymentSecret([7u8; 32]))
        .current_timestamp()
        .min_final_cltv_expiry_delta(144)
        .amount_milli_satoshis(amount_msat)
        .build_signed(|msg| secp.sign_ecdsa_recoverable(msg, &node_key))
        .expect("build invoice")
        .to_string()
}

pub fn request_parts(request: &CreateReverseSwapRequest) -> ([u8; 32], PublicKey) {
    let hash: [u8; 32] = hex::decode(&request.preimage_hash)
        .expect("preimage hash hex")
        .try_into()
        .expect("32 byte preimage hash");
    let claim = PublicKey::from_slice(&hex::decode(&request.claim_public_key).expect("pubkey hex"))
        .expect("claim pubkey");
    (hash, claim)
}

/// What an honest provider answers to `request`.
pub fn honest_response(
    request: &CreateReverseSwapRequest,
    onchain_amount: u64,
) -> CreateReverseSwapResponse {
    let (hash, claim) = request_parts(request);
    let script = htlc::expected_script(&hash, claim, TIMEOUT_BLOCK_HEIGHT, refund_pubkey());
    let address = htlc::derive_address(&script, NETWORK);
    CreateReverseSwapResponse {
        id: SWAP_ID.to_string(),
        redeem_script: hex::encode(script.as_bytes()),
        timeout_block_height: TIMEOUT_BLOCK_HEIGHT,
        invoice: invoice(
            hash,
            request.invoice_amount * 1000,
            Currency::from(NETWORK),
        ),
        onchain_amount,
        lockup_address: address.to_string(),
    }
}

pub fn change_script() -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array([0x11; 20]))
}

/// Transaction paying `outputs` from a dummy previous output.
pub fn funding_tx(outputs: &[(&Script, u64)]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([9u8; 32]),
                vout: 1,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: outputs
            .iter()
            .map(|(script, value)| TxOut {
                value: Amount::from_sat(*value),
                script_pubkey: (*script).to_owned(),
            })
            .collect(),
    }
}

/// Lockup paying `amount` to `lockup_script` plus a change output.
pub fn lockup_tx(lockup_script: &Script, amount: u64) -> Transaction {
    let change = change_script();
    funding_tx(&[(change.as_script(), 250_000), (lockup_script, amount)])
}

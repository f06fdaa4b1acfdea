use std::str::FromStr as _;

use bitcoin::Network;
use bitcoin::hashes::Hash as _;
use lightning_invoice::{Bolt11Invoice, Currency};

use crate::error::SwapError;

fn parse(invoice: &str) -> Result<Bolt11Invoice, SwapError> {
    Bolt11Invoice::from_str(invoice)
        .map_err(|e| SwapError::Decode(format!("parse BOLT11 invoice: {e:?}")))
}

pub fn payment_hash_from_bolt11(invoice: &str) -> Result<[u8; 32], SwapError> {
    Ok(parse(invoice)?.payment_hash().to_byte_array())
}

/// Checks that the provider's hold invoice is locked to our preimage, asks for the requested
/// amount and belongs to the configured chain.
pub fn verify_swap_invoice(
    invoice: &str,
    preimage_hash: &[u8; 32],
    amount_sats: u64,
    network: Network,
) -> Result<(), SwapError> {
    let invoice = parse(invoice)
        .map_err(|e| SwapError::VerificationFailed(format!("swap invoice: {e}")))?;

    if invoice.payment_hash().to_byte_array() != *preimage_hash {
        return Err(SwapError::VerificationFailed(
            "invoice payment hash does not commit to the preimage".to_string(),
        ));
    }

    let expected_msat = amount_sats.saturating_mul(1000);
    match invoice.amount_milli_satoshis() {
        Some(msat) if msat == expected_msat => {}
        other => {
            return Err(SwapError::VerificationFailed(format!(
                "invoice amount mismatch: {other:?} msat != {expected_msat} msat"
            )));
        }
    }

    if invoice.currency() != Currency::from(network) {
        return Err(SwapError::VerificationFailed(format!(
            "invoice currency {:?} does not match {network}",
            invoice.currency()
        )));
    }

    Ok(())
}

use std::str::FromStr as _;

use bitcoin::hashes::{Hash as _, ripemd160};
use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CLTV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160, OP_IF,
    OP_SIZE,
};
use bitcoin::opcodes::Opcode;
use bitcoin::script::{Builder, Instruction, PushBytesBuf, Script, ScriptBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Network};

use crate::error::SwapError;

/// Fields embedded in a swap redeem script.
///
/// The script commits to `RIPEMD160(SHA256(preimage))`, so only the 20-byte hash is recoverable
/// from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcTemplate {
    pub payment_hash160: [u8; 20],
    pub claim_pubkey: PublicKey,
    pub timeout_block_height: u32,
    pub refund_pubkey: PublicKey,
}

impl HtlcTemplate {
    pub fn new(
        preimage_hash: &[u8; 32],
        claim_pubkey: PublicKey,
        timeout_block_height: u32,
        refund_pubkey: PublicKey,
    ) -> Self {
        Self {
            payment_hash160: ripemd160::Hash::hash(preimage_hash).to_byte_array(),
            claim_pubkey,
            timeout_block_height,
            refund_pubkey,
        }
    }

    /// `OP_SIZE 32 OP_EQUAL OP_IF OP_HASH160 <h160> OP_EQUALVERIFY <claim> OP_ELSE OP_DROP
    /// <timeout> OP_CLTV OP_DROP <refund> OP_ENDIF OP_CHECKSIG`
    pub fn redeem_script(&self) -> ScriptBuf {
        Builder::new()
            .push_opcode(OP_SIZE)
            .push_int(32)
            .push_opcode(OP_EQUAL)
            .push_opcode(OP_IF)
            .push_opcode(OP_HASH160)
            .push_slice(PushBytesBuf::from(self.payment_hash160))
            .push_opcode(OP_EQUALVERIFY)
            .push_key(&bitcoin::PublicKey::new(self.claim_pubkey))
            .push_opcode(OP_ELSE)
            .push_opcode(OP_DROP)
            .push_int(i64::from(self.timeout_block_height))
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_key(&bitcoin::PublicKey::new(self.refund_pubkey))
            .push_opcode(OP_ENDIF)
            .push_opcode(OP_CHECKSIG)
            .into_script()
    }

    pub fn parse(script: &Script) -> Result<Self, SwapError> {
        let mut iter = script.instructions_minimal();

        expect_op(next_instruction(&mut iter)?, OP_SIZE)?;
        let size = parse_script_num(next_instruction(&mut iter)?)?;
        if size != 32 {
            return Err(mismatch(format!("unexpected preimage size check: {size}")));
        }
        expect_op(next_instruction(&mut iter)?, OP_EQUAL)?;
        expect_op(next_instruction(&mut iter)?, OP_IF)?;

        expect_op(next_instruction(&mut iter)?, OP_HASH160)?;
        let payment_hash160 = expect_push::<20>(next_instruction(&mut iter)?)?;
        expect_op(next_instruction(&mut iter)?, OP_EQUALVERIFY)?;
        let claim_pubkey = expect_pubkey(next_instruction(&mut iter)?)?;

        expect_op(next_instruction(&mut iter)?, OP_ELSE)?;
        expect_op(next_instruction(&mut iter)?, OP_DROP)?;
        let timeout = parse_script_num(next_instruction(&mut iter)?)?;
        let timeout_block_height = u32::try_from(timeout)
            .map_err(|_| mismatch(format!("timeout height out of range: {timeout}")))?;
        expect_op(next_instruction(&mut iter)?, OP_CLTV)?;
        expect_op(next_instruction(&mut iter)?, OP_DROP)?;
        let refund_pubkey = expect_pubkey(next_instruction(&mut iter)?)?;

        expect_op(next_instruction(&mut iter)?, OP_ENDIF)?;
        expect_op(next_instruction(&mut iter)?, OP_CHECKSIG)?;

        if iter.next().is_some() {
            return Err(mismatch("unexpected trailing instructions in redeem script"));
        }

        Ok(Self {
            payment_hash160,
            claim_pubkey,
            timeout_block_height,
            refund_pubkey,
        })
    }
}

pub fn expected_script(
    preimage_hash: &[u8; 32],
    claim_pubkey: PublicKey,
    timeout_block_height: u32,
    refund_pubkey: PublicKey,
) -> ScriptBuf {
    HtlcTemplate::new(preimage_hash, claim_pubkey, timeout_block_height, refund_pubkey)
        .redeem_script()
}

pub fn derive_address(script: &Script, network: Network) -> Address {
    Address::p2wsh(script, network)
}

/// Checks a provider-supplied redeem script and lockup address against the values this side
/// generated.
///
/// The refund key is the only field taken from the candidate; everything else must match the
/// expected parameters, the re-encoded template must be byte-identical to the candidate, and
/// the P2WSH address derived locally must equal `claimed_address`.
pub fn verify(
    candidate: &Script,
    preimage_hash: &[u8; 32],
    claim_pubkey: PublicKey,
    timeout_block_height: u32,
    claimed_address: &str,
    network: Network,
) -> Result<HtlcTemplate, SwapError> {
    let parsed = HtlcTemplate::parse(candidate)?;

    let expected = HtlcTemplate::new(
        preimage_hash,
        claim_pubkey,
        timeout_block_height,
        parsed.refund_pubkey,
    );
    if parsed.payment_hash160 != expected.payment_hash160 {
        return Err(mismatch("redeem script preimage hash mismatch"));
    }
    if parsed.claim_pubkey != expected.claim_pubkey {
        return Err(mismatch("redeem script claim pubkey mismatch"));
    }
    if parsed.timeout_block_height != expected.timeout_block_height {
        return Err(mismatch(format!(
            "redeem script timeout mismatch: {} != {}",
            parsed.timeout_block_height, expected.timeout_block_height
        )));
    }
    if expected.redeem_script().as_bytes() != candidate.as_bytes() {
        return Err(mismatch("redeem script is not canonically encoded"));
    }

    let derived = derive_address(candidate, network);
    let claimed = Address::from_str(claimed_address)
        .map_err(|e| mismatch(format!("invalid lockup address {claimed_address}: {e}")))?
        .require_network(network)
        .map_err(|e| mismatch(format!("lockup address network: {e}")))?;
    if claimed != derived {
        return Err(mismatch(format!(
            "bad address: {claimed_address} instead of {derived}"
        )));
    }

    Ok(parsed)
}

fn mismatch(msg: impl Into<String>) -> SwapError {
    SwapError::VerificationFailed(msg.into())
}

fn next_instruction<'a>(
    iter: &mut impl Iterator<Item = Result<Instruction<'a>, bitcoin::script::Error>>,
) -> Result<Instruction<'a>, SwapError> {
    iter.next()
        .transpose()
        .map_err(|e| mismatch(format!("decode redeem script instruction: {e}")))?
        .ok_or_else(|| mismatch("unexpected end of redeem script"))
}

fn expect_op(actual: Instruction<'_>, expected: Opcode) -> Result<(), SwapError> {
    match actual {
        Instruction::Op(op) if op == expected => Ok(()),
        other => Err(mismatch(format!(
            "unexpected instruction: expected {expected:?}, got {other:?}"
        ))),
    }
}

fn expect_push<const N: usize>(actual: Instruction<'_>) -> Result<[u8; N], SwapError> {
    match actual {
        Instruction::PushBytes(bytes) if bytes.len() == N => {
            let mut out = [0u8; N];
            out.copy_from_slice(bytes.as_bytes());
            Ok(out)
        }
        other => Err(mismatch(format!(
            "unexpected instruction: expected push {N} bytes, got {other:?}"
        ))),
    }
}

fn expect_pubkey(actual: Instruction<'_>) -> Result<PublicKey, SwapError> {
    let bytes = expect_push::<33>(actual)?;
    PublicKey::from_slice(&bytes).map_err(|e| mismatch(format!("invalid pubkey in script: {e}")))
}

fn parse_script_num(actual: Instruction<'_>) -> Result<i64, SwapError> {
    actual
        .script_num()
        .ok_or_else(|| mismatch(format!("expected script number, got {actual:?}")))
}

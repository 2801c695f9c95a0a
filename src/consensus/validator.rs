//! Block admission pipeline (spec.md §4.3, steps 1-4; difficulty is
//! [`super::difficulty`], apply/orphan handling is [`super::engine`]).
//!
//! Every step here is a read-only check against an already-decoded
//! [`Block`] and a [`BlockStore`] snapshot; none of them mutate
//! anything, so the engine can re-run admission for a popped orphan
//! exactly the way it ran it the first time.

use std::time::Duration;

use crate::store::BlockStore;
use crate::types::{Block, Link, LowHash, XAmount};

use super::error::ValidationError;

/// Outcome of step 2 (link resolution).
#[derive(Debug, Eq, PartialEq)]
pub enum LinkResolution {
    /// Every input-link and output-link target is present in the store.
    Ready,
    /// At least one target is missing; the block belongs in the orphan
    /// pool keyed on each of these.
    Missing(Vec<LowHash>),
}

/// The arithmetic outcome of step 4: the fee implied by the block's own
/// declared input and output amounts.
#[derive(Debug, Eq, PartialEq)]
pub struct LinkedAmounts {
    pub total_input: XAmount,
    pub total_output: XAmount,
    pub fee: XAmount,
}

/// Step 1: rejects a timestamp too far in the future. Size and nibble
/// composition are already enforced by [`crate::codec::block_codec::decode_block`]
/// before a block reaches this pipeline.
pub fn check_timestamp(
    timestamp_ms: u64,
    now_ms: u64,
    max_future_drift: Duration,
) -> Result<(), ValidationError> {
    let max_drift_ms = max_future_drift.as_millis() as u64;
    if timestamp_ms > now_ms.saturating_add(max_drift_ms) {
        Err(ValidationError::TimestampTooFarInFuture {
            timestamp: timestamp_ms,
            max_drift_ms,
        })
    } else {
        Ok(())
    }
}

/// Step 2: looks up every link target in `store`, collecting whichever
/// are absent.
pub fn resolve_links<S: BlockStore + ?Sized>(
    store: &S,
    input_links: &[Link],
    output_links: &[Link],
) -> LinkResolution {
    let mut missing = Vec::new();
    for link in input_links.iter().chain(output_links.iter()) {
        let target = link.target();
        if store.get_info(&target).is_none() && !missing.contains(&target) {
            missing.push(target);
        }
    }
    if missing.is_empty() {
        LinkResolution::Ready
    } else {
        LinkResolution::Missing(missing)
    }
}

/// Step 3: verifies every in-signature recovers to the public key
/// carried by its linked output block, and every out-signature recovers
/// to this block's own public key.
///
/// Requires link resolution (step 2) to have already succeeded: every
/// input-link target must be present in `store`.
pub fn verify_signatures<S: BlockStore + ?Sized>(
    store: &S,
    block: &Block,
) -> Result<(), ValidationError> {
    let inputs = block.input_links();
    let in_sigs = block.in_signatures();
    if in_sigs.len() != inputs.len() {
        return Err(ValidationError::BadInputSignature);
    }

    let in_message = block.bytes_excluding_signatures();
    for (link, sig) in inputs.iter().zip(in_sigs.iter()) {
        let owner = store
            .get_block(&link.target())
            .ok_or(ValidationError::BadInputSignature)?;
        let owner_key = owner
            .public_key()
            .ok_or(ValidationError::BadInputSignature)?;
        crate::crypto::verify_against_pubkey(sig, &in_message, &owner_key)
            .map_err(|_| ValidationError::BadInputSignature)?;
    }

    let out_sigs = block.out_signatures();
    if !out_sigs.is_empty() {
        let signer_key = block
            .public_key()
            .ok_or(ValidationError::BadOutputSignature)?;
        let out_message = block.bytes_excluding_out_signatures();
        for sig in &out_sigs {
            crate::crypto::verify_against_pubkey(sig, &out_message, &signer_key)
                .map_err(|_| ValidationError::BadOutputSignature)?;
        }
    }

    Ok(())
}

/// Step 4: sums this block's own declared input and output link
/// amounts and derives the fee. Overflow and insufficient-funds are
/// both syntactic failures of this one block, independent of store
/// state.
pub fn check_arithmetic(
    input_links: &[Link],
    output_links: &[Link],
) -> Result<LinkedAmounts, ValidationError> {
    let mut total_input = XAmount::ZERO;
    for link in input_links {
        total_input = checked_sum(total_input, link.amount)?;
    }
    let mut total_output = XAmount::ZERO;
    for link in output_links {
        total_output = checked_sum(total_output, link.amount)?;
    }

    let fee = total_input
        .checked_sub(total_output)
        .ok_or(ValidationError::InsufficientFunds {
            inputs: total_input.0,
            outputs: total_output.0,
        })?;

    Ok(LinkedAmounts {
        total_input,
        total_output,
        fee,
    })
}

fn checked_sum(acc: XAmount, amount: XAmount) -> Result<XAmount, ValidationError> {
    acc.0
        .checked_add(amount.0)
        .map(XAmount)
        .ok_or(ValidationError::AmountOverflow)
}

/// Double-spend check against the targets' *currently stored* balance:
/// an input-link may not claim more than its target's `BlockInfo.amount`
/// still holds. The engine performs the matching debit atomically on
/// apply; this is the read-only precondition.
pub fn check_double_spend<S: BlockStore + ?Sized>(
    store: &S,
    input_links: &[Link],
) -> Result<(), ValidationError> {
    for link in input_links {
        let target = link.target();
        let info = store
            .get_info(&target)
            .ok_or(ValidationError::DoubleSpend(target))?;
        if info.amount.checked_sub(link.amount).is_none() {
            return Err(ValidationError::DoubleSpend(target));
        }
    }
    Ok(())
}

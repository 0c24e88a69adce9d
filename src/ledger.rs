//! Position ledger: per-pair stack validation and FIFO settlement
//!
//! Settlement closes the oldest entries first. The upstream system called
//! this "LIFO" while implementing oldest-first; the behavior is kept and the
//! name is not (see DESIGN.md).

use crate::error::TradingError;
use crate::types::Position;

/// Outcome of a settlement pass over one pair's stack
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Entries (or split copies) to close, oldest first
    pub to_close: Vec<Position>,
    /// Entries left open, chronological order preserved
    pub remaining: Vec<Position>,
}

/// Select which entries satisfy a requested close amount, oldest first.
///
/// An entry larger than the outstanding request is split: a copy sized to the
/// request goes to `to_close` and the remainder keeps its id and timestamp at
/// the front of `remaining`.
pub fn settle_fifo(requested_amount: f64, stack: &[Position]) -> Settlement {
    let mut remaining: Vec<Position> = stack.to_vec();
    remaining.sort_by_key(|p| p.timestamp);

    let mut to_close = Vec::new();
    let mut outstanding = requested_amount;

    while outstanding > 0.0 && !remaining.is_empty() {
        let mut entry = remaining.remove(0);
        if entry.amount <= outstanding {
            outstanding -= entry.amount;
            to_close.push(entry);
        } else {
            let mut split = entry.clone();
            split.amount = outstanding;
            to_close.push(split);
            entry.amount -= outstanding;
            remaining.insert(0, entry);
            outstanding = 0.0;
        }
    }

    Settlement { to_close, remaining }
}

/// Check the stack invariant every trade requires: each entry has a
/// timestamp, a positive amount, a pair and a positive entry price.
pub fn validate_stack(stack: &[Position]) -> Result<(), TradingError> {
    for pos in stack {
        if pos.timestamp <= 0 {
            return Err(TradingError::LedgerInvariant(format!(
                "position {} has no timestamp",
                pos.id
            )));
        }
        if pos.amount <= 0.0 {
            return Err(TradingError::LedgerInvariant(format!(
                "position {} has non-positive amount {}",
                pos.id, pos.amount
            )));
        }
        if pos.pair.is_empty() {
            return Err(TradingError::LedgerInvariant(format!(
                "position {} has an empty pair",
                pos.id
            )));
        }
        if pos.entry_price <= 0.0 {
            return Err(TradingError::LedgerInvariant(format!(
                "position {} has non-positive entry price {}",
                pos.id, pos.entry_price
            )));
        }
    }
    Ok(())
}

//! Choosing which units go away when an app is scaled down.

use super::unit::Unit;
use crate::error::EngineError;

/// Checks a removal request against the number of units the app has.
pub fn validate_removal(n: usize, total: usize) -> Result<(), EngineError> {
    if n == 0 {
        return Err(EngineError::Validation("Cannot remove zero units.".into()));
    }
    if n > total {
        return Err(EngineError::Validation(format!(
            "Cannot remove {n} units from this app, it has only {total} units."
        )));
    }
    if n == total {
        return Err(EngineError::Validation(
            "Cannot remove all units from an app.".into(),
        ));
    }
    Ok(())
}

/// Indices of the `n` units to remove, in removal order.
///
/// Failing units go first (error, down, pending, creating, installing,
/// started); units with the same status go in index order.
pub fn select_units_for_removal(units: &[Unit], n: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..units.len()).collect();
    // sort_by_key is stable, so ties keep index order.
    indices.sort_by_key(|&i| units[i].status.removal_rank());
    indices.truncate(n);
    indices
}

//! Reorders work records so worker groups pick up work evenly.
//!
//! Records are cut into super-blocks of `factor * groups`. Inside each one
//! they are re-emitted column-major: for every `k < factor`, every
//! `factor`-th record starting at `k`. A short tail block follows the same
//! rule over whatever is left.

use crate::error::{Error, Result};

/// Source index for each output position.
pub fn interleave_order(len: usize, groups: u32, factor: u32) -> Result<Vec<usize>> {
    if groups == 0 || factor == 0 {
        return Err(Error::InvalidSchedule {
            groups,
            interleave: factor,
        });
    }

    let factor = factor as usize;
    let block = factor * groups as usize;
    let mut order = Vec::with_capacity(len);

    for base in (0..len).step_by(block) {
        let span = block.min(len - base);
        for k in 0..factor {
            order.extend((k..span).step_by(factor).map(|j| base + j));
        }
    }

    debug_assert_eq!(order.len(), len);
    Ok(order)
}

/// Apply [`interleave_order`] to a sequence, moving each item exactly once.
pub fn interleave<T>(items: Vec<T>, groups: u32, factor: u32) -> Result<Vec<T>> {
    if factor == 1 && groups != 0 {
        return Ok(items);
    }
    let order = interleave_order(items.len(), groups, factor)?;

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|src| slots[src].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn worked_example_with_tail() {
        // super-block of 6: [0,3,1,4,2,5]; tail of 4: [6,9,7,8]
        let order = interleave_order(10, 2, 3).unwrap();
        assert_eq!(order, vec![0, 3, 1, 4, 2, 5, 6, 9, 7, 8]);
    }

    #[test]
    fn factor_one_is_identity() {
        let order = interleave_order(37, 5, 1).unwrap();
        assert_eq!(order, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn single_group_is_identity() {
        // each super-block holds exactly `factor` records, one per column
        let order = interleave_order(11, 1, 4).unwrap();
        assert_eq!(order, (0..11).collect::<Vec<_>>());
    }

    #[test]
    fn zero_schedule_rejected() {
        assert!(matches!(
            interleave_order(4, 0, 1),
            Err(Error::InvalidSchedule { groups: 0, .. })
        ));
        assert!(matches!(
            interleave_order(4, 1, 0),
            Err(Error::InvalidSchedule { interleave: 0, .. })
        ));
    }

    #[test]
    fn interleave_validates_before_shortcut() {
        assert_eq!(interleave(vec![1, 2, 3], 4, 1).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            interleave(vec![1, 2, 3], 0, 1),
            Err(Error::InvalidSchedule { groups: 0, .. })
        ));
        assert!(interleave(vec![1, 2, 3], 2, 0).is_err());
    }

    #[test]
    fn empty_input() {
        assert!(interleave_order(0, 3, 2).unwrap().is_empty());
        assert!(interleave(Vec::<u8>::new(), 3, 2).unwrap().is_empty());
    }

    #[test]
    fn interleave_moves_items() {
        let items: Vec<String> = (0..5).map(|i| format!("r{i}")).collect();
        let out = interleave(items, 2, 2).unwrap();
        assert_eq!(out, vec!["r0", "r2", "r1", "r3", "r4"]);
    }

    proptest! {
        #[test]
        fn order_is_a_permutation(len in 0usize..300, groups in 1u32..9, factor in 1u32..9) {
            let mut order = interleave_order(len, groups, factor).unwrap();
            order.sort_unstable();
            prop_assert_eq!(order, (0..len).collect::<Vec<_>>());
        }

        #[test]
        fn order_is_deterministic(len in 0usize..200, groups in 1u32..6, factor in 1u32..6) {
            prop_assert_eq!(
                interleave_order(len, groups, factor).unwrap(),
                interleave_order(len, groups, factor).unwrap()
            );
        }
    }
}

//! Keeps a transaction's splits summing exactly to the transaction amount.
//!
//! Everything here is pure: the caller persists whatever `validate` hands back.

use crate::error::{ErrorType, Result};
use crate::model::{Amount, BudgetId, Split, Transaction};
use crate::utils::generate_id;
use crate::Error;
use tracing::debug;

/// The outcome of checking a set of splits against a transaction amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitValidation {
    /// The splits already sum to the amount within one minor unit.
    Valid,
    /// The splits were rebalanced and now sum to the amount exactly.
    Redistributed(Vec<Split>),
}

impl SplitValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, SplitValidation::Valid)
    }

    /// The redistributed splits, if any.
    pub fn redistributed(&self) -> Option<&[Split]> {
        match self {
            SplitValidation::Valid => None,
            SplitValidation::Redistributed(splits) => Some(splits),
        }
    }
}

/// Rebalances splits. New splits created for a shortfall go to `catch_all` when one is known,
/// otherwise to the `"unassigned"` sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redistributor {
    catch_all: Option<BudgetId>,
}

/// Validates `splits` against `total`, routing any shortfall to `"unassigned"`.
pub fn validate(total: Amount, splits: &[Split]) -> Result<SplitValidation> {
    Redistributor::default().validate(total, splits)
}

impl Redistributor {
    pub fn new(catch_all: Option<BudgetId>) -> Self {
        Self { catch_all }
    }

    /// Checks that `splits` sum to `total` within one minor unit, and rebalances them if not.
    ///
    /// - Overage: every split is scaled by `total / sum` and rounded; the rounding residual lands
    ///   on the default split.
    /// - Underage with one split: that split absorbs the difference.
    /// - Underage with several splits: a new non-default split carries the difference.
    ///
    /// After a redistribution the sum is exact, exactly one split is the default, and every other
    /// split is at least one minor unit. When no split was marked default, the first split becomes
    /// the default.
    ///
    /// # Errors
    /// - `MalformedAmount` if `total` or any split amount is negative or finer than the minor
    ///   unit.
    pub fn validate(&self, total: Amount, splits: &[Split]) -> Result<SplitValidation> {
        check_amounts(total, splits)?;

        if splits.is_empty() {
            debug!("No splits for a total of {total}, creating a default split");
            let split =
                Split::new(generate_id("split"), self.shortfall_budget(), total).as_default();
            return Ok(SplitValidation::Redistributed(vec![split]));
        }

        let current: Amount = splits.iter().map(|s| s.amount).sum();
        let delta = total - current;
        if delta.abs() <= Amount::minor_unit() {
            return Ok(SplitValidation::Valid);
        }

        let mut result = if total.is_zero() {
            collapse_to_default(splits)
        } else if delta.is_negative() {
            scale_down(total, current, splits)
        } else {
            self.fill_shortfall(delta, splits)
        };
        ensure_default(&mut result);

        debug!(
            "Redistributed {} split(s) summing to {current} into {} split(s) summing to {total}",
            splits.len(),
            result.len()
        );
        Ok(SplitValidation::Redistributed(result))
    }

    /// Validates the transaction's splits and replaces them if they were redistributed. Returns
    /// `true` if the splits changed.
    pub fn reconcile(&self, transaction: &mut Transaction) -> Result<bool> {
        match self.validate(transaction.amount, &transaction.splits)? {
            SplitValidation::Valid => Ok(false),
            SplitValidation::Redistributed(splits) => {
                transaction.splits = splits;
                Ok(true)
            }
        }
    }

    fn shortfall_budget(&self) -> BudgetId {
        self.catch_all.clone().unwrap_or_else(BudgetId::unassigned)
    }

    fn fill_shortfall(&self, delta: Amount, splits: &[Split]) -> Vec<Split> {
        let mut out = splits.to_vec();
        if out.len() == 1 {
            out[0].amount += delta;
            return out;
        }

        // A delta under one minor unit is already Valid, so the new split is never too small.
        out.push(Split::new(generate_id("split"), self.shortfall_budget(), delta));
        out
    }
}

fn check_amounts(total: Amount, splits: &[Split]) -> Result<()> {
    if total.is_negative() {
        return Err(Error::msg(
            ErrorType::MalformedAmount,
            format!("Transaction amount {} is negative", total.plain()),
        ));
    }
    if total.has_sub_cent_precision() {
        return Err(Error::msg(
            ErrorType::MalformedAmount,
            format!(
                "Transaction amount {} has more precision than the minor currency unit",
                total.plain()
            ),
        ));
    }
    if let Some(split) = splits.iter().find(|s| s.amount.is_negative()) {
        return Err(Error::msg(
            ErrorType::MalformedAmount,
            format!(
                "Split '{}' has a negative amount {}",
                split.split_id,
                split.amount.plain()
            ),
        ));
    }
    if let Some(split) = splits.iter().find(|s| s.amount.has_sub_cent_precision()) {
        return Err(Error::msg(
            ErrorType::MalformedAmount,
            format!(
                "Split '{}' amount {} has more precision than the minor currency unit",
                split.split_id,
                split.amount.plain()
            ),
        ));
    }
    Ok(())
}

/// The split that absorbs residuals: the one marked default, else the first.
fn default_index(splits: &[Split]) -> usize {
    splits.iter().position(|s| s.is_default).unwrap_or(0)
}

fn ensure_default(splits: &mut [Split]) {
    if !splits.iter().any(|s| s.is_default) {
        if let Some(first) = splits.first_mut() {
            first.is_default = true;
        }
    }
}

/// A zero total keeps only the default split, at zero.
fn collapse_to_default(splits: &[Split]) -> Vec<Split> {
    let mut split = splits[default_index(splits)].clone();
    split.amount = Amount::zero();
    split.is_default = true;
    vec![split]
}

fn scale_down(total: Amount, current: Amount, splits: &[Split]) -> Vec<Split> {
    let min = Amount::minor_unit();
    let d = default_index(splits);
    let mut out: Vec<Split> = splits
        .iter()
        .enumerate()
        .map(|(ix, split)| {
            let mut split = split.clone();
            let scaled = split.amount.scale(total.value(), current.value()).round_cents();
            split.amount = if ix != d && scaled < min { min } else { scaled };
            split
        })
        .collect();

    let sum: Amount = out.iter().map(|s| s.amount).sum();
    out[d].amount += total - sum;
    settle_negative_default(out, d)
}

/// Flooring tiny splits at one minor unit can push the default split below zero when the total
/// is only a few cents. Borrow back from the largest splits first, then drop minimum-sized
/// splits until the default is non-negative.
fn settle_negative_default(mut out: Vec<Split>, mut d: usize) -> Vec<Split> {
    let min = Amount::minor_unit();
    if !out[d].amount.is_negative() {
        return out;
    }

    let mut order: Vec<usize> = (0..out.len()).filter(|&ix| ix != d).collect();
    order.sort_by(|a, b| out[*b].amount.cmp(&out[*a].amount).then(a.cmp(b)));
    for ix in order {
        if !out[d].amount.is_negative() {
            break;
        }
        let spare = out[ix].amount - min;
        if !spare.is_positive() {
            continue;
        }
        let take = spare.min(-out[d].amount);
        out[ix].amount -= take;
        out[d].amount += take;
    }

    while out[d].amount.is_negative() && out.len() > 1 {
        let ix = if d == out.len() - 1 {
            out.len() - 2
        } else {
            out.len() - 1
        };
        let removed = out.remove(ix);
        if ix < d {
            d -= 1;
        }
        out[d].amount += removed.amount;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn split(id: &str, amount: &str) -> Split {
        Split::new(id, "b1", amt(amount)).with_category("Food", "Groceries")
    }

    fn assert_invariants(total: Amount, splits: &[Split]) {
        let sum: Amount = splits.iter().map(|s| s.amount).sum();
        assert_eq!(sum, total, "splits {splits:?} do not sum to {total}");
        assert_eq!(splits.iter().filter(|s| s.is_default).count(), 1);
        for s in splits.iter().filter(|s| !s.is_default) {
            assert!(s.amount >= Amount::minor_unit(), "split too small: {s:?}");
        }
        assert!(validate(total, splits).unwrap().is_valid());
    }

    #[test]
    fn test_exact_sum_is_valid() {
        let splits = vec![split("a", "60").as_default(), split("b", "40")];
        assert!(validate(amt("100"), &splits).unwrap().is_valid());
    }

    #[test]
    fn test_within_tolerance_is_valid() {
        let splits = vec![split("a", "99.99").as_default()];
        assert!(validate(amt("100.00"), &splits).unwrap().is_valid());
        let splits = vec![split("a", "100.01").as_default()];
        assert!(validate(amt("100.00"), &splits).unwrap().is_valid());
    }

    #[test]
    fn test_overage_scales_proportionally() {
        let splits = vec![
            split("a", "60").as_default(),
            split("b", "30"),
            split("c", "30"),
        ];
        let result = validate(amt("100"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out[0].amount, amt("50"));
        assert_eq!(out[1].amount, amt("25"));
        assert_eq!(out[2].amount, amt("25"));
        assert_invariants(amt("100"), out);
    }

    #[test]
    fn test_overage_residual_goes_to_default() {
        let splits = vec![
            split("a", "1.00"),
            split("b", "1.00").as_default(),
            split("c", "1.00"),
        ];
        let result = validate(amt("1.00"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out[0].amount, amt("0.33"));
        assert_eq!(out[1].amount, amt("0.34"));
        assert_eq!(out[2].amount, amt("0.33"));
        assert_invariants(amt("1.00"), out);
    }

    #[test]
    fn test_overage_keeps_split_order_and_metadata() {
        let splits = vec![
            split("a", "80").as_default(),
            Split::new("b", "b2", amt("40")).with_category("Home", "Household"),
        ];
        let out = match validate(amt("90"), &splits).unwrap() {
            SplitValidation::Redistributed(out) => out,
            SplitValidation::Valid => panic!("expected a redistribution"),
        };
        assert_eq!(out[0].split_id, "a");
        assert_eq!(out[1].split_id, "b");
        assert_eq!(out[1].budget_id, BudgetId::from("b2"));
        assert_eq!(out[1].category_detailed, "Household");
        assert_eq!(out[0].amount, amt("60"));
        assert_eq!(out[1].amount, amt("30"));
    }

    #[test]
    fn test_overage_tiny_total_keeps_minimums() {
        let splits = vec![
            split("a", "1.00").as_default(),
            split("b", "1.00"),
            split("c", "1.00"),
            split("d", "1.00"),
        ];
        let result = validate(amt("0.02"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_invariants(amt("0.02"), out);
        assert!(out.iter().all(|s| !s.amount.is_negative()));
    }

    #[test]
    fn test_underage_single_split_absorbs() {
        let splits = vec![split("a", "90").as_default()];
        let result = validate(amt("100"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].amount, amt("100"));
        assert_invariants(amt("100"), out);
    }

    #[test]
    fn test_underage_multiple_splits_creates_unassigned_split() {
        let splits = vec![split("a", "50").as_default(), split("b", "30")];
        let result = validate(amt("100"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out.len(), 3);
        let created = &out[2];
        assert_eq!(created.amount, amt("20"));
        assert!(created.budget_id.is_unassigned());
        assert!(!created.is_default);
        assert!(created.category_primary.is_empty());
        assert!(created.category_detailed.is_empty());
        assert_invariants(amt("100"), out);
    }

    #[test]
    fn test_underage_routes_to_catch_all_when_known() {
        let splits = vec![split("a", "50").as_default(), split("b", "30")];
        let redistributor = Redistributor::new(Some(BudgetId::from("everything")));
        let result = redistributor.validate(amt("100"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out[2].budget_id, BudgetId::from("everything"));
    }

    #[test]
    fn test_redistribution_is_idempotent() {
        let cases = vec![
            (amt("100"), vec![split("a", "70").as_default(), split("b", "70")]),
            (
                amt("10.00"),
                vec![
                    split("a", "3.33").as_default(),
                    split("b", "3.33"),
                    split("c", "5.01"),
                ],
            ),
            (amt("100"), vec![split("a", "10").as_default(), split("b", "10")]),
            (amt("0.05"), vec![split("a", "9.99").as_default(), split("b", "0.01")]),
        ];
        for (total, splits) in cases {
            let first = validate(total, &splits).unwrap();
            let out = first.redistributed().unwrap();
            assert_invariants(total, out);
            assert!(validate(total, out).unwrap().is_valid());
        }
    }

    #[test]
    fn test_zero_total_collapses_to_default() {
        let splits = vec![split("a", "10"), split("b", "5").as_default()];
        let result = validate(Amount::zero(), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].split_id, "b");
        assert!(out[0].amount.is_zero());
        assert!(out[0].is_default);
    }

    #[test]
    fn test_empty_splits_get_a_default() {
        let result = validate(amt("12.34"), &[]).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_default);
        assert_eq!(out[0].amount, amt("12.34"));
    }

    #[test]
    fn test_negative_total_is_malformed() {
        let err = validate(amt("-1.00"), &[split("a", "1").as_default()]).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MalformedAmount);
        assert_eq!(err.code(), "malformed_amount");
    }

    #[test]
    fn test_sub_cent_total_is_malformed() {
        let err = validate(amt("1.005"), &[split("a", "1").as_default()]).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MalformedAmount);
    }

    #[test]
    fn test_negative_split_is_malformed() {
        let splits = vec![split("a", "11").as_default(), split("b", "-1")];
        let err = validate(amt("10"), &splits).unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_sub_cent_split_is_malformed() {
        let splits = vec![split("a", "50.005").as_default(), split("b", "30.00")];
        let err = validate(amt("100.00"), &splits).unwrap_err();
        assert_eq!(err.error_type(), ErrorType::MalformedAmount);
        assert!(err.to_string().contains("'a'"));
    }

    #[test]
    fn test_underage_without_default_flags_first_split() {
        let splits = vec![split("a", "30"), split("b", "30")];
        let result = validate(amt("100"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].split_id, "a");
        assert!(out[0].is_default);
        assert_invariants(amt("100"), out);
    }

    #[test]
    fn test_overage_without_default_flags_first_split() {
        let splits = vec![split("a", "1.00"), split("b", "1.00"), split("c", "1.00")];
        let result = validate(amt("1.00"), &splits).unwrap();
        let out = result.redistributed().unwrap();
        assert!(out[0].is_default);
        assert_eq!(out[0].amount, amt("0.34"));
        assert_invariants(amt("1.00"), out);
    }

    #[test]
    fn test_reconcile_replaces_splits() {
        let mut t = Transaction::new("t1", "u1", crate::test::date("2025-01-01"), amt("10"))
            .with_splits(vec![split("a", "5").as_default()]);
        assert!(Redistributor::default().reconcile(&mut t).unwrap());
        assert_eq!(t.splits_total(), amt("10"));
        assert!(!Redistributor::default().reconcile(&mut t).unwrap());
    }
}

//! Cross-validation arithmetic.
//!
//! Turns several validated prices for one instrument into a single trusted
//! value. With agreement the mean is served; with disagreement beyond
//! `max_deviation` the value closest to the mean wins.

use rust_decimal::Decimal;

/// A validated price and the provider that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub provider: String,
    pub price: Decimal,
}

/// Outcome of reconciling candidates.
#[derive(Clone, Debug, PartialEq)]
pub enum Reconciliation {
    /// Only one candidate was available.
    Single { provider: String, price: Decimal },
    /// All candidates lie within tolerance of their mean.
    Consensus { price: Decimal, providers: Vec<String> },
    /// Candidates disagreed; the one closest to the mean was kept.
    OutlierRejected {
        provider: String,
        price: Decimal,
        mean: Decimal,
        /// Largest relative deviation from the mean.
        deviation: Decimal,
        rejected: Vec<Candidate>,
    },
}

impl Reconciliation {
    pub fn price(&self) -> Decimal {
        match self {
            Self::Single { price, .. }
            | Self::Consensus { price, .. }
            | Self::OutlierRejected { price, .. } => *price,
        }
    }

    /// Provider credited as the source.
    pub fn source(&self) -> &str {
        match self {
            Self::Single { provider, .. } | Self::OutlierRejected { provider, .. } => provider,
            Self::Consensus { providers, .. } => providers.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Every provider whose value was served or averaged in.
    pub fn contributors(&self) -> Vec<String> {
        match self {
            Self::Single { provider, .. } | Self::OutlierRejected { provider, .. } => {
                vec![provider.clone()]
            }
            Self::Consensus { providers, .. } => providers.clone(),
        }
    }
}

/// Reconcile candidates given in selector order.
///
/// Ties for closest-to-mean go to the candidate closest to `baseline`, then
/// to selector order. With exactly two candidates both are equidistant from
/// the mean, so the baseline decides when present.
///
/// Returns `None` for an empty slice.
pub fn reconcile(
    candidates: &[Candidate],
    baseline: Option<Decimal>,
    max_deviation: Decimal,
) -> Option<Reconciliation> {
    match candidates {
        [] => None,
        [only] => Some(Reconciliation::Single {
            provider: only.provider.clone(),
            price: only.price,
        }),
        _ => {
            let sum: Decimal = candidates.iter().map(|c| c.price).sum();
            let mean = sum / Decimal::from(candidates.len());

            let deviation = candidates
                .iter()
                .map(|c| ((c.price - mean) / mean).abs())
                .max()
                .unwrap_or(Decimal::ZERO);

            if deviation <= max_deviation {
                return Some(Reconciliation::Consensus {
                    price: mean.normalize(),
                    providers: candidates.iter().map(|c| c.provider.clone()).collect(),
                });
            }

            let distance_to_baseline =
                |c: &Candidate| baseline.map(|b| (c.price - b).abs()).unwrap_or(Decimal::ZERO);

            // min_by_key keeps the first of equal keys, i.e. selector order.
            let chosen = candidates
                .iter()
                .min_by_key(|c| ((c.price - mean).abs(), distance_to_baseline(c)))?;

            Some(Reconciliation::OutlierRejected {
                provider: chosen.provider.clone(),
                price: chosen.price,
                mean,
                deviation,
                rejected: candidates
                    .iter()
                    .filter(|c| c.provider != chosen.provider)
                    .cloned()
                    .collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candidate(provider: &str, price: Decimal) -> Candidate {
        Candidate {
            provider: provider.to_string(),
            price,
        }
    }

    fn five_percent() -> Decimal {
        dec!(0.05)
    }

    #[test]
    fn test_empty_has_no_result() {
        assert_eq!(reconcile(&[], None, five_percent()), None);
    }

    #[test]
    fn test_single_candidate() {
        let result = reconcile(&[candidate("SINA", dec!(4.50))], None, five_percent()).unwrap();
        assert_eq!(result.price(), dec!(4.50));
        assert_eq!(result.source(), "SINA");
    }

    #[test]
    fn test_close_prices_return_mean() {
        let result = reconcile(
            &[candidate("TENCENT", dec!(4.50)), candidate("EASTMONEY", dec!(4.56))],
            None,
            five_percent(),
        )
        .unwrap();

        assert_eq!(result.price(), dec!(4.53));
        assert_eq!(result.contributors(), vec!["TENCENT", "EASTMONEY"]);
    }

    #[test]
    fn test_identical_prices_return_exact_value() {
        let result = reconcile(
            &[candidate("SINA", dec!(3.912)), candidate("TENCENT", dec!(3.912))],
            None,
            five_percent(),
        )
        .unwrap();
        assert_eq!(result.price(), dec!(3.912));
    }

    #[test]
    fn test_two_way_split_prefers_baseline() {
        let result = reconcile(
            &[candidate("SINA", dec!(4.00)), candidate("TENCENT", dec!(5.00))],
            Some(dec!(4.90)),
            five_percent(),
        )
        .unwrap();

        match result {
            Reconciliation::OutlierRejected { provider, price, rejected, .. } => {
                assert_eq!(provider, "TENCENT");
                assert_eq!(price, dec!(5.00));
                assert_eq!(rejected, vec![candidate("SINA", dec!(4.00))]);
            }
            other => panic!("expected outlier rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_two_way_split_without_baseline_keeps_selector_order() {
        let result = reconcile(
            &[candidate("SINA", dec!(4.00)), candidate("TENCENT", dec!(5.00))],
            None,
            five_percent(),
        )
        .unwrap();
        assert_eq!(result.source(), "SINA");
        assert_eq!(result.price(), dec!(4.00));
    }

    #[test]
    fn test_three_way_rejects_outlier() {
        let result = reconcile(
            &[
                candidate("SINA", dec!(4.50)),
                candidate("TENCENT", dec!(4.52)),
                candidate("EASTMONEY", dec!(6.00)),
            ],
            None,
            five_percent(),
        )
        .unwrap();

        // Mean is 5.0066..; 4.52 is closest.
        assert_eq!(result.source(), "TENCENT");
        assert_eq!(result.price(), dec!(4.52));
    }
}

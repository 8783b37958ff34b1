//! Bonding curve calculations.
//!
//! The market prices team shares with a polynomial bonding curve:
//!
//! - price(S) = base_price + k * S^exponent
//!
//! Trade costs are the exact definite integral of the price function
//! over the traded supply interval, so pricing is O(1) in trade size
//! and splitting a trade never changes its total cost. Every function
//! here is pure: the current supply is always an explicit argument and
//! nothing is cached between calls.

use std::collections::BTreeMap;
use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::constants::SUPPLY_FLOOR;

/// Upper bound on swept chart samples per `curve_points` call; wider
/// windows get a coarser step, not a bigger reply.
pub const MAX_SWEEP_POINTS: f64 = 2_000.0;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Error returned by the validating quote entry point.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveError {
    /// Supply or share count was NaN/infinite, or the computed amount
    /// was not a finite non-negative number.
    InvalidInput(String),
}

impl fmt::Display for CurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveError::InvalidInput(msg) => write!(f, "invalid curve input: {}", msg),
        }
    }
}

impl std::error::Error for CurveError {}

/// Immutable curve configuration, fixed at process start.
///
/// A single instance is constructed in `main` and shared (`Arc`) by
/// every caller — settlement, quote previews, portfolio valuation and
/// charting — so all of them price against the same curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurveParameters {
    /// Price of the very first share (price at zero supply).
    pub base_price: f64,
    /// Scaling factor: how quickly price rises with supply.
    pub k: f64,
    /// Shape of the curve (1 = linear, >1 = convex/accelerating).
    pub exponent: f64,
}

impl Default for CurveParameters {
    fn default() -> Self {
        CurveParameters {
            base_price: 1.0,
            k: 0.005,
            exponent: 1.5,
        }
    }
}

/// One sample of the curve, used for chart rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupplyPoint {
    pub supply: f64,
    pub price: f64,
}

/// The supply interval a proposed transaction would sweep, used by the
/// chart to highlight the affected region.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransactionRegion {
    pub start: f64,
    pub end: f64,
    pub is_buy: bool,
}

/// Chart samples plus the highlighted transaction region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveView {
    pub points: Vec<SupplyPoint>,
    pub transaction_region: TransactionRegion,
}

/// Effect of a trade on the instantaneous marginal price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceImpact {
    pub start_price: f64,
    pub end_price: f64,
    pub percent_change: f64,
}

impl CurveParameters {
    /// Validates and builds a parameter set. `base_price` and `k` must
    /// be finite and non-negative, `exponent` finite.
    pub fn new(base_price: f64, k: f64, exponent: f64) -> Result<Self, CurveError> {
        if !base_price.is_finite() || base_price < 0.0 {
            return Err(CurveError::InvalidInput(format!(
                "base_price must be finite and non-negative, got {}",
                base_price
            )));
        }
        if !k.is_finite() || k < 0.0 {
            return Err(CurveError::InvalidInput(format!(
                "k must be finite and non-negative, got {}",
                k
            )));
        }
        if !exponent.is_finite() {
            return Err(CurveError::InvalidInput(format!(
                "exponent must be finite, got {}",
                exponent
            )));
        }
        Ok(CurveParameters {
            base_price,
            k,
            exponent,
        })
    }

    /// Instantaneous price at `supply`.
    ///
    /// Negative supply (floating drift from round-tripping) is clamped
    /// to zero. For the `exponent == -1` configuration the supply is
    /// clamped to a small positive floor instead, since price and
    /// integral are undefined at zero there.
    pub fn price(&self, supply: f64) -> f64 {
        let s = supply.max(0.0);
        if self.exponent == -1.0 {
            self.base_price + self.k / s.max(SUPPLY_FLOOR)
        } else {
            self.base_price + self.k * s.powf(self.exponent)
        }
    }

    /// Antiderivative of the price function, evaluated at `supply`.
    ///
    /// I(S) = base_price*S + (k/(exponent+1))*S^(exponent+1), with the
    /// logarithmic special case I(S) = base_price*S + k*ln(S) when
    /// exponent == -1. Zero for S <= 0.
    fn integral(&self, supply: f64) -> f64 {
        if supply <= 0.0 {
            return 0.0;
        }
        let term1 = self.base_price * supply;
        let term2 = if self.exponent == -1.0 {
            self.k * supply.max(SUPPLY_FLOOR).ln()
        } else {
            (self.k / (self.exponent + 1.0)) * supply.powf(self.exponent + 1.0)
        };
        term1 + term2
    }

    /// Total cost to buy `shares` when the supply is `current_supply`.
    ///
    /// A non-positive share count is a no-op quote and costs 0.
    pub fn buy_cost(&self, current_supply: f64, shares: f64) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        let s = current_supply.max(0.0);
        self.integral(s + shares) - self.integral(s)
    }

    /// Total refund for selling `shares` when the supply is
    /// `current_supply`.
    ///
    /// Selling more than the outstanding supply is clamped, not
    /// rejected: callers performing real settlement must validate the
    /// seller's holding first, the clamp only bounds the arithmetic.
    pub fn sell_refund(&self, current_supply: f64, shares: f64) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        let s = current_supply.max(0.0);
        let effective = shares.min(s);
        self.integral(s) - self.integral(s - effective)
    }

    /// Average price per share for a transaction; 0 when `shares <= 0`.
    pub fn average_price(&self, current_supply: f64, shares: f64, side: TradeSide) -> f64 {
        if shares <= 0.0 {
            return 0.0;
        }
        let amount = match side {
            TradeSide::Buy => self.buy_cost(current_supply, shares),
            TradeSide::Sell => self.sell_refund(current_supply, shares),
        };
        amount / shares
    }

    /// Validating entry point for settlement and quoting.
    ///
    /// Rejects non-finite inputs and guarantees the returned amount is
    /// finite and non-negative, so NaN can never reach a balance, the
    /// pot, or a transaction record.
    pub fn quote(
        &self,
        current_supply: f64,
        shares: f64,
        side: TradeSide,
    ) -> Result<f64, CurveError> {
        if !current_supply.is_finite() {
            return Err(CurveError::InvalidInput(format!(
                "supply must be finite, got {}",
                current_supply
            )));
        }
        if !shares.is_finite() {
            return Err(CurveError::InvalidInput(format!(
                "share count must be finite, got {}",
                shares
            )));
        }
        let amount = match side {
            TradeSide::Buy => self.buy_cost(current_supply, shares),
            TradeSide::Sell => self.sell_refund(current_supply, shares),
        };
        if !amount.is_finite() || amount < 0.0 {
            return Err(CurveError::InvalidInput(format!(
                "computed amount {} for supply {} and shares {}",
                amount, current_supply, shares
            )));
        }
        Ok(amount)
    }

    /// Price impact of a trade at the discrete share boundaries.
    ///
    /// Buy reads the price of the next share (`price(S)`) through the
    /// last share bought (`price(S + q - 1)`); sell reads the price of
    /// the last currently-held share (`price(S - 1)`) through
    /// `price(S - q_eff)`. The asymmetry is deliberate marginal-share
    /// semantics and matching chart labels depend on it.
    pub fn price_impact(&self, current_supply: f64, shares: f64, side: TradeSide) -> PriceImpact {
        let supply = current_supply.max(0.0);
        if shares <= 0.0 {
            let flat = self.price(supply);
            return PriceImpact {
                start_price: flat,
                end_price: flat,
                percent_change: 0.0,
            };
        }

        let (start_price, end_price) = match side {
            TradeSide::Buy => (self.price(supply), self.price(supply + shares - 1.0)),
            TradeSide::Sell => {
                let effective = shares.min(supply);
                if effective == 0.0 {
                    // Selling from zero supply: nothing to price.
                    let flat = self.price(0.0);
                    return PriceImpact {
                        start_price: flat,
                        end_price: flat,
                        percent_change: 0.0,
                    };
                }
                (self.price(supply - 1.0), self.price(supply - effective))
            }
        };

        let percent_change = if start_price != 0.0 && start_price.is_finite() {
            let pc = (end_price - start_price) / start_price * 100.0;
            if pc.is_finite() {
                pc
            } else {
                infinity_sentinel(start_price, end_price)
            }
        } else {
            infinity_sentinel(start_price, end_price)
        };

        PriceImpact {
            start_price,
            end_price,
            percent_change,
        }
    }

    /// Chart samples around a proposed transaction.
    ///
    /// Points are deduplicated, ascending in supply, and always include
    /// supply 0, the current supply and the post-transaction supply
    /// (clamped to 0). `transaction_amount` is signed: positive for a
    /// buy, negative for a sell, zero to show the neighbourhood of the
    /// current supply.
    pub fn curve_points(
        &self,
        current_supply: f64,
        transaction_amount: f64,
        point_density: f64,
    ) -> CurveView {
        let supply = current_supply.max(0.0);
        let density = if point_density > 0.0 {
            point_density
        } else {
            1.0
        };

        // Display window: pad the swept region by a few shares.
        let (start_supply, end_supply) = if transaction_amount < 0.0 {
            ((supply + transaction_amount - 5.0).max(0.0), supply + 5.0)
        } else if transaction_amount > 0.0 {
            ((supply - 5.0).max(0.0), supply + transaction_amount + 5.0)
        } else {
            ((supply - 10.0).max(0.0), supply + 10.0)
        };

        let mut samples: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();
        let mut add_point = |s: f64| {
            let s = s.max(0.0);
            samples.entry(OrderedFloat(s)).or_insert_with(|| self.price(s));
        };

        add_point(0.0);
        // Cap the sweep at MAX_SWEEP_POINTS samples: a wide window at
        // high density widens the step instead of growing the reply.
        let mut step = 1.0 / density;
        let width = end_supply - start_supply;
        if width / step > MAX_SWEEP_POINTS {
            step = width / MAX_SWEEP_POINTS;
        }
        let mut s = start_supply;
        while s <= end_supply {
            add_point(s);
            s += step;
        }
        // Exact window edges and transaction boundaries.
        add_point(start_supply);
        add_point(end_supply);
        add_point(supply);
        add_point(supply + transaction_amount);

        CurveView {
            points: samples
                .into_iter()
                .map(|(s, price)| SupplyPoint { supply: s.0, price })
                .collect(),
            transaction_region: TransactionRegion {
                start: supply,
                end: (supply + transaction_amount).max(0.0),
                is_buy: transaction_amount > 0.0,
            },
        }
    }

    /// Transaction-focused chart view at double density.
    pub fn transaction_curve_points(
        &self,
        current_supply: f64,
        shares: f64,
        side: TradeSide,
    ) -> CurveView {
        let transaction_amount = match side {
            TradeSide::Buy => shares,
            TradeSide::Sell => -shares,
        };
        self.curve_points(current_supply, transaction_amount, 2.0)
    }

    /// Evenly spaced samples from 0 to `max_supply` for the market
    /// overview chart. Supplies are rounded down to 2 decimals and
    /// deduplicated.
    pub fn fixed_curve_points(&self, max_supply: f64, point_count: usize) -> Vec<SupplyPoint> {
        let max_supply = max_supply.max(0.0);
        let point_count = point_count.max(2);

        let mut samples: BTreeMap<OrderedFloat<f64>, f64> = BTreeMap::new();
        let mut add_point = |s: f64| {
            let s = ((s.max(0.0) * 100.0).floor()) / 100.0;
            samples.entry(OrderedFloat(s)).or_insert_with(|| self.price(s));
        };

        add_point(0.0);
        let step = max_supply / (point_count as f64 - 1.0);
        for i in 0..=point_count {
            add_point(i as f64 * step);
        }
        // Round landmarks every 50 shares keep axis labels stable.
        let mut landmark = 50.0;
        while landmark <= max_supply {
            add_point(landmark);
            landmark += 50.0;
        }

        samples
            .into_iter()
            .map(|(s, price)| SupplyPoint { supply: s.0, price })
            .collect()
    }
}

/// Explicit ±infinity sentinel for percent change when the start price
/// is zero (or the division degenerated): never NaN.
fn infinity_sentinel(start_price: f64, end_price: f64) -> f64 {
    if end_price > start_price {
        f64::INFINITY
    } else if end_price < start_price {
        f64::NEG_INFINITY
    } else {
        0.0
    }
}

use super::constants::EPSILON;
use super::curve::CurveParameters;
use super::models::{HoldingDetail, Team};
use super::state::AppState;

// --- Calculation Helpers ---

// Liquidation value of `shares` of a team at `team_supply`, pre-fee.
// Priced through the shared curve so the portfolio view can never
// disagree with what settlement would actually pay out.
pub fn calculate_holding_value(curve: &CurveParameters, team_supply: f64, shares: f64) -> f64 {
    if shares < EPSILON {
        0.0
    } else {
        curve.sell_refund(team_supply, shares)
    }
}

// Snapshot of a team with its current price attached
pub fn team_view(curve: &CurveParameters, team: &Team) -> Team {
    let mut view = team.clone();
    view.price = Some(curve.price(team.total_supply));
    view
}

// --- Portfolio Helpers ---

pub fn calculate_user_holdings(user_id: &str, state: &AppState) -> Vec<HoldingDetail> {
    let mut holdings = Vec::new();
    if let Some(user_holdings_map) = state.user_holdings.get(user_id) {
        for holding_entry in user_holdings_map.iter() {
            let team_id = *holding_entry.key();
            let shares = *holding_entry.value();
            if shares < EPSILON {
                continue;
            }
            if let Some(team) = state.teams.get(&team_id) {
                holdings.push(HoldingDetail {
                    team_id,
                    symbol: team.symbol.clone(),
                    shares,
                    value: calculate_holding_value(&state.curve, team.total_supply, shares),
                });
            } else {
                eprintln!(
                    "Warning: Team {} not found while valuing holdings for user {}",
                    team_id, user_id
                );
            }
        }
    }
    holdings
}

pub fn calculate_portfolio_value(user_id: &str, state: &AppState) -> f64 {
    calculate_user_holdings(user_id, state)
        .iter()
        .map(|h| h.value)
        .sum()
}

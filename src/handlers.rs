use chrono::Utc;
use uuid::Uuid;
use warp::filters::ws::Message;

use super::constants::{EPSILON, FEE_RATE, HISTORY_LIMIT, INITIAL_BALANCE};
use super::curve::TradeSide;
use super::models::{ClientMessage, ServerMessage, TransactionRecord};
use super::state::AppState;
use super::websocket::{broadcast_market_and_holding_updates, broadcast_message, send_to_client};

pub async fn handle_client_message(
    client_id: Uuid,
    user_id: &str,
    msg: Message,
    state: &AppState,
) {
    if let Ok(text) = msg.to_str() {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(client_msg) => {
                println!("User {} ({}) request: {:?}", user_id, client_id, client_msg);

                match client_msg {
                    ClientMessage::Buy { team_id, shares } => {
                        handle_trade(client_id, user_id, team_id, shares, TradeSide::Buy, state)
                            .await;
                    }
                    ClientMessage::Sell { team_id, shares } => {
                        handle_trade(client_id, user_id, team_id, shares, TradeSide::Sell, state)
                            .await;
                    }
                    ClientMessage::Quote {
                        team_id,
                        shares,
                        side,
                    } => {
                        handle_quote(client_id, team_id, shares, side, state).await;
                    }
                    ClientMessage::CurvePoints {
                        team_id,
                        transaction_amount,
                        point_density,
                    } => {
                        handle_curve_points(client_id, team_id, transaction_amount, point_density, state)
                            .await;
                    }
                    ClientMessage::History { team_id } => {
                        handle_history(client_id, user_id, team_id, state).await;
                    }
                    ClientMessage::Stats => {
                        handle_stats(client_id, state).await;
                    }
                }
            }
            Err(e) => {
                eprintln!(
                    "Deserialize error for client_id={}: {}, err={}",
                    client_id, text, e
                );
                send_to_client(
                    client_id,
                    ServerMessage::Error {
                        message: format!("Invalid message format: {}", e),
                    },
                    state,
                )
                .await;
            }
        }
    } else if msg.is_ping() {
        // Ping/Pong handled automatically by Warp
    } else if msg.is_close() {
        // Close frame handled by the loop exiting in handle_connection
    } else {
        // Ignore binary messages etc.
    }
}

// Result of a settled trade, collected while the map guards are held
// so nothing here is computed from stale state.
struct TradeOutcome {
    amount: f64, // curve cost or refund, pre-fee
    fee: f64,
    total: f64,
    new_supply: f64,
    price: f64,
    market_cap: f64,
    volume: f64,
    balance: f64,
    holding_shares: f64,
}

async fn handle_trade(
    client_id: Uuid,
    user_id: &str,
    team_id: Uuid,
    shares: f64,
    side: TradeSide,
    state: &AppState,
) {
    let label = match side {
        TradeSide::Buy => "Buy",
        TradeSide::Sell => "Sell",
    };

    if !shares.is_finite() || shares <= EPSILON {
        println!("-> {} FAIL: Quantity {} must be positive", label, shares);
        send_to_client(
            client_id,
            ServerMessage::Error {
                message: format!("{} quantity ({:.6}) must be positive", label, shares),
            },
            state,
        )
        .await;
        return;
    }

    // Settle inside a sync block: quote and supply update happen under
    // the same team entry guard, and no guard survives into an await.
    let outcome = match side {
        TradeSide::Buy => execute_buy(user_id, team_id, shares, state),
        TradeSide::Sell => execute_sell(user_id, team_id, shares, state),
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(reason) => {
            println!("-> {} FAIL: {}", label, reason);
            send_to_client(client_id, ServerMessage::Error { message: reason }, state).await;
            return;
        }
    };

    // Log the trade
    let record = TransactionRecord {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        team_id,
        side,
        quantity: shares,
        price: outcome.amount / shares,
        fee: outcome.fee,
        timestamp: Utc::now(),
    };
    state.transactions.insert(record.id, record);

    // Credit the fee to the prize pot
    let pot_amount = {
        let mut pot = state.pot.write().await;
        *pot += outcome.fee;
        *pot
    };

    println!(
        "-> {} OK (Qty: {:.6}, Amount: {:.6}, Fee: {:.6}, Total: {:.6}): Team {} (Supply: {:.6}, Price: {:.6}), User {} (Shares: {:.6}, Bal: {:.6}), Pot: {:.6}",
        label, shares, outcome.amount, outcome.fee, outcome.total, team_id,
        outcome.new_supply, outcome.price, user_id, outcome.holding_shares,
        outcome.balance, pot_amount
    );

    send_to_client(
        client_id,
        ServerMessage::TradeExecuted {
            team_id,
            side,
            shares,
            amount: outcome.amount,
            fee: outcome.fee,
            total: outcome.total,
            new_supply: outcome.new_supply,
            balance: outcome.balance,
            holding_shares: outcome.holding_shares,
        },
        state,
    )
    .await;
    broadcast_message(ServerMessage::PotUpdate { amount: pot_amount }, state).await;
    broadcast_market_and_holding_updates(
        team_id,
        outcome.price,
        outcome.new_supply,
        outcome.market_cap,
        outcome.volume,
        client_id,
        state,
    )
    .await;
}

/// Buys `shares` of a team: charges curve cost plus the flat fee,
/// moves supply/market-cap/volume and the user's holding.
fn execute_buy(
    user_id: &str,
    team_id: Uuid,
    shares: f64,
    state: &AppState,
) -> Result<TradeOutcome, String> {
    let mut team = state
        .teams
        .get_mut(&team_id)
        .ok_or_else(|| format!("Team {} not found", team_id))?;

    let current_supply = team.total_supply;
    let cost = state
        .curve
        .quote(current_supply, shares, TradeSide::Buy)
        .map_err(|e| {
            eprintln!("Buy quote rejected for team {}: {}", team_id, e);
            "Internal error calculating trade cost.".to_string()
        })?;
    let fee = cost * FEE_RATE;
    let total = cost + fee;

    let mut balance_entry = state
        .user_balances
        .entry(user_id.to_string())
        .or_insert(INITIAL_BALANCE);
    if *balance_entry + EPSILON < total {
        return Err(format!(
            "Insufficient balance ({:.6}) for buy total {:.6}",
            *balance_entry, total
        ));
    }
    *balance_entry -= total;
    let balance = *balance_entry;

    let new_supply = current_supply + shares;
    team.total_supply = new_supply;
    team.market_cap += total;
    team.volume += total;
    let price = state.curve.price(new_supply);
    team.price = Some(price);

    let user_holdings = state.user_holdings.entry(user_id.to_string()).or_default();
    let mut holding = user_holdings.entry(team_id).or_insert(0.0);
    *holding += shares;

    Ok(TradeOutcome {
        amount: cost,
        fee,
        total,
        new_supply,
        price,
        market_cap: team.market_cap,
        volume: team.volume,
        balance,
        holding_shares: *holding,
    })
}

/// Sells `shares` of a team: requires the holding to cover the full
/// quantity (the curve's oversell clamp is never relied upon here),
/// credits refund minus the flat fee.
fn execute_sell(
    user_id: &str,
    team_id: Uuid,
    shares: f64,
    state: &AppState,
) -> Result<TradeOutcome, String> {
    let mut team = state
        .teams
        .get_mut(&team_id)
        .ok_or_else(|| format!("Team {} not found", team_id))?;

    // Stable while the team entry guard is held: every trade touching
    // this (user, team) holding goes through the same guard.
    let held = state
        .user_holdings
        .get(user_id)
        .and_then(|holdings| holdings.get(&team_id).map(|s| *s))
        .unwrap_or(0.0);
    if held + EPSILON < shares {
        return Err(format!(
            "Not enough shares: holding {:.6}, tried to sell {:.6}",
            held, shares
        ));
    }

    let current_supply = team.total_supply;
    let refund = state
        .curve
        .quote(current_supply, shares, TradeSide::Sell)
        .map_err(|e| {
            eprintln!("Sell quote rejected for team {}: {}", team_id, e);
            "Internal error calculating trade proceeds.".to_string()
        })?;
    let fee = refund * FEE_RATE;
    let total = refund - fee;

    let mut balance_entry = state
        .user_balances
        .entry(user_id.to_string())
        .or_insert(INITIAL_BALANCE);
    *balance_entry += total;
    let balance = *balance_entry;

    let new_supply = (current_supply - shares).max(0.0);
    team.total_supply = new_supply;
    team.market_cap -= refund;
    team.volume += refund;
    let price = state.curve.price(new_supply);
    team.price = Some(price);

    let user_holdings = state.user_holdings.entry(user_id.to_string()).or_default();
    let remaining = {
        let mut holding = user_holdings.entry(team_id).or_insert(0.0);
        *holding -= shares;
        *holding
    };
    if remaining <= EPSILON {
        user_holdings.remove(&team_id);
    }

    Ok(TradeOutcome {
        amount: refund,
        fee,
        total,
        new_supply,
        price,
        market_cap: team.market_cap,
        volume: team.volume,
        balance,
        holding_shares: remaining.max(0.0),
    })
}

/// Non-authoritative price preview from the last-known supply. A race
/// with a concurrent trade can make this stale; the settlement path
/// re-prices under the team guard.
async fn handle_quote(
    client_id: Uuid,
    team_id: Uuid,
    shares: f64,
    side: TradeSide,
    state: &AppState,
) {
    if !shares.is_finite() || shares <= EPSILON {
        send_to_client(
            client_id,
            ServerMessage::Error {
                message: format!("Quote quantity ({:.6}) must be positive", shares),
            },
            state,
        )
        .await;
        return;
    }

    let current_supply = match state.teams.get(&team_id) {
        Some(team) => team.total_supply,
        None => {
            send_to_client(
                client_id,
                ServerMessage::Error {
                    message: format!("Team {} not found", team_id),
                },
                state,
            )
            .await;
            return;
        }
    };

    let amount = match state.curve.quote(current_supply, shares, side) {
        Ok(amount) => amount,
        Err(e) => {
            eprintln!("Quote rejected for team {}: {}", team_id, e);
            send_to_client(
                client_id,
                ServerMessage::Error {
                    message: "Internal error calculating quote.".to_string(),
                },
                state,
            )
            .await;
            return;
        }
    };
    let fee = amount * FEE_RATE;
    let total = match side {
        TradeSide::Buy => amount + fee,
        TradeSide::Sell => amount - fee,
    };

    send_to_client(
        client_id,
        ServerMessage::QuoteResult {
            team_id,
            side,
            shares,
            amount,
            fee,
            total,
            average_price: state.curve.average_price(current_supply, shares, side),
            impact: state.curve.price_impact(current_supply, shares, side),
        },
        state,
    )
    .await;
}

async fn handle_curve_points(
    client_id: Uuid,
    team_id: Uuid,
    transaction_amount: f64,
    point_density: Option<f64>,
    state: &AppState,
) {
    if !transaction_amount.is_finite() || transaction_amount.abs() > 10_000.0 {
        send_to_client(
            client_id,
            ServerMessage::Error {
                message: format!(
                    "Transaction amount ({}) must be finite and within +/-10000",
                    transaction_amount
                ),
            },
            state,
        )
        .await;
        return;
    }

    let current_supply = match state.teams.get(&team_id) {
        Some(team) => team.total_supply,
        None => {
            send_to_client(
                client_id,
                ServerMessage::Error {
                    message: format!("Team {} not found", team_id),
                },
                state,
            )
            .await;
            return;
        }
    };

    // Density bounded: it only affects rendering granularity
    let density = point_density.unwrap_or(1.0).clamp(0.1, 100.0);
    let view = state
        .curve
        .curve_points(current_supply, transaction_amount, density);
    send_to_client(client_id, ServerMessage::CurveData { team_id, view }, state).await;
}

async fn handle_history(
    client_id: Uuid,
    user_id: &str,
    team_id: Option<Uuid>,
    state: &AppState,
) {
    let mut transactions: Vec<_> = state
        .transactions
        .iter()
        .filter(|entry| {
            let record = entry.value();
            record.user_id == user_id && team_id.map_or(true, |id| record.team_id == id)
        })
        .map(|entry| entry.value().clone())
        .collect();

    // Newest first, capped
    transactions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    transactions.truncate(HISTORY_LIMIT);

    send_to_client(client_id, ServerMessage::History { transactions }, state).await;
}

/// Market-wide aggregates for the homepage: user/team/trade counts,
/// traded volume across all teams, and the prize pot.
async fn handle_stats(client_id: Uuid, state: &AppState) {
    let total_volume: f64 = state.teams.iter().map(|entry| entry.value().volume).sum();
    let pot = *state.pot.read().await;
    send_to_client(
        client_id,
        ServerMessage::Stats {
            total_users: state.user_balances.len(),
            total_teams: state.teams.len(),
            total_trades: state.transactions.len(),
            total_volume,
            pot,
        },
        state,
    )
    .await;
}

// Integration tests for the settlement handlers: drive
// handle_client_message with raw websocket payloads against an
// in-memory AppState and assert on balances, supply, holdings, the
// prize pot and the transaction log.

use chrono::{Duration, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::filters::ws::Message;

use degen_futures::constants::{FEE_RATE, INITIAL_BALANCE};
use degen_futures::models::{Client, Team, TransactionRecord};
use degen_futures::{handle_client_message, AppState, CurveParameters, TradeSide};

type ReplyReceiver = mpsc::UnboundedReceiver<Result<Message, warp::Error>>;

const TOLERANCE: f64 = 1e-6;

fn test_state() -> (AppState, Uuid) {
    let state = AppState::new(CurveParameters::default(), "test-secret".to_string());
    let team_id = Uuid::new_v4();
    state.teams.insert(
        team_id,
        Team {
            id: team_id,
            name: "Kansas City Chiefs".to_string(),
            symbol: "KC".to_string(),
            total_supply: 0.0,
            market_cap: 0.0,
            volume: 0.0,
            primary_color: "#E31837".to_string(),
            secondary_color: "#FFB81C".to_string(),
            created_at: Utc::now(),
            price: None,
        },
    );
    (state, team_id)
}

async fn send(state: &AppState, user_id: &str, payload: serde_json::Value) {
    // Client is not registered in the client map; direct replies are
    // dropped and the tests assert on state instead.
    let client_id = Uuid::new_v4();
    let msg = Message::text(payload.to_string());
    handle_client_message(client_id, user_id, msg, state).await;
}

// Register a real client entry so direct replies can be asserted on.
fn register_client(state: &AppState, user_id: &str) -> (Uuid, ReplyReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let client_id = Uuid::new_v4();
    state.clients.insert(
        client_id,
        Client {
            user_id: user_id.to_string(),
            sender,
        },
    );
    (client_id, receiver)
}

fn drain_replies(receiver: &mut ReplyReceiver) -> Vec<serde_json::Value> {
    let mut replies = Vec::new();
    while let Ok(Ok(msg)) = receiver.try_recv() {
        if let Ok(text) = msg.to_str() {
            replies.push(serde_json::from_str(text).unwrap());
        }
    }
    replies
}

fn reply_of_type<'a>(
    replies: &'a [serde_json::Value],
    message_type: &str,
) -> Option<&'a serde_json::Value> {
    replies.iter().find(|r| r["type"] == message_type)
}

fn balance(state: &AppState, user_id: &str) -> f64 {
    state
        .user_balances
        .get(user_id)
        .map(|b| *b.value())
        .unwrap_or(INITIAL_BALANCE)
}

fn holding(state: &AppState, user_id: &str, team_id: Uuid) -> Option<f64> {
    state
        .user_holdings
        .get(user_id)
        .and_then(|m| m.get(&team_id).map(|s| *s))
}

#[tokio::test]
async fn buy_settles_cost_fee_and_pot() {
    let (state, team_id) = test_state();
    let user = "user-buy";
    state.user_balances.insert(user.to_string(), 1000.0);

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": team_id, "shares": 100.0 }),
    )
    .await;

    // I(100) - I(0) = 1.0*100 + (0.005/2.5)*100^2.5 = 300; 2% fee = 6.
    let expected_cost = 300.0;
    let expected_fee = expected_cost * FEE_RATE;
    let expected_total = expected_cost + expected_fee;

    assert!((balance(&state, user) - (1000.0 - expected_total)).abs() < TOLERANCE);
    assert!((*state.pot.read().await - expected_fee).abs() < TOLERANCE);

    let team = state.teams.get(&team_id).unwrap();
    assert!((team.total_supply - 100.0).abs() < TOLERANCE);
    assert!((team.market_cap - expected_total).abs() < TOLERANCE);
    assert!((team.volume - expected_total).abs() < TOLERANCE);

    assert!((holding(&state, user, team_id).unwrap() - 100.0).abs() < TOLERANCE);

    assert_eq!(state.transactions.len(), 1);
    let record = state
        .transactions
        .iter()
        .next()
        .map(|e| e.value().clone())
        .unwrap();
    assert_eq!(record.user_id, user);
    assert_eq!(record.team_id, team_id);
    assert_eq!(record.side, TradeSide::Buy);
    assert!((record.quantity - 100.0).abs() < TOLERANCE);
    assert!((record.price - 3.0).abs() < TOLERANCE); // average price per share
    assert!((record.fee - expected_fee).abs() < TOLERANCE);
}

#[tokio::test]
async fn sell_after_buy_round_trips_before_fees() {
    let (state, team_id) = test_state();
    let user = "user-roundtrip";
    state.user_balances.insert(user.to_string(), 1000.0);

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": team_id, "shares": 100.0 }),
    )
    .await;
    send(
        &state,
        user,
        json!({ "type": "sell", "team_id": team_id, "shares": 100.0 }),
    )
    .await;

    // Refund equals the buy cost (same supply interval); each leg pays
    // a 2% fee into the pot.
    let amount = 300.0;
    let fee = amount * FEE_RATE;
    let expected_balance = 1000.0 - (amount + fee) + (amount - fee);
    assert!((balance(&state, user) - expected_balance).abs() < TOLERANCE);
    assert!((*state.pot.read().await - 2.0 * fee).abs() < TOLERANCE);

    let team = state.teams.get(&team_id).unwrap();
    assert!(team.total_supply.abs() < TOLERANCE);
    // Buy added cost+fee, sell removed the refund.
    assert!((team.market_cap - fee).abs() < TOLERANCE);
    assert!((team.volume - (amount + fee + amount)).abs() < TOLERANCE);

    // Holding is removed once emptied
    assert!(holding(&state, user, team_id).is_none());
    assert_eq!(state.transactions.len(), 2);
}

#[tokio::test]
async fn buy_rejected_on_insufficient_balance() {
    let (state, team_id) = test_state();
    let user = "user-poor";
    state.user_balances.insert(user.to_string(), 10.0);

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": team_id, "shares": 100.0 }),
    )
    .await;

    assert!((balance(&state, user) - 10.0).abs() < TOLERANCE);
    assert!(*state.pot.read().await < TOLERANCE);
    assert!(state.teams.get(&team_id).unwrap().total_supply.abs() < TOLERANCE);
    assert!(holding(&state, user, team_id).is_none());
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn sell_rejected_when_holding_does_not_cover() {
    let (state, team_id) = test_state();
    let user = "user-oversell";
    state.user_balances.insert(user.to_string(), 1000.0);

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": team_id, "shares": 5.0 }),
    )
    .await;
    let balance_after_buy = balance(&state, user);
    let supply_after_buy = state.teams.get(&team_id).unwrap().total_supply;

    send(
        &state,
        user,
        json!({ "type": "sell", "team_id": team_id, "shares": 10.0 }),
    )
    .await;

    // Rejected before the engine's oversell clamp could apply.
    assert!((balance(&state, user) - balance_after_buy).abs() < TOLERANCE);
    assert!(
        (state.teams.get(&team_id).unwrap().total_supply - supply_after_buy).abs() < TOLERANCE
    );
    assert!((holding(&state, user, team_id).unwrap() - 5.0).abs() < TOLERANCE);
    assert_eq!(state.transactions.len(), 1);
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let (state, team_id) = test_state();
    let user = "user-zero";

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": team_id, "shares": 0.0 }),
    )
    .await;
    send(
        &state,
        user,
        json!({ "type": "sell", "team_id": team_id, "shares": -3.0 }),
    )
    .await;

    assert!(state.teams.get(&team_id).unwrap().total_supply.abs() < TOLERANCE);
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn unknown_team_changes_nothing() {
    let (state, _team_id) = test_state();
    let user = "user-lost";

    send(
        &state,
        user,
        json!({ "type": "buy", "team_id": Uuid::new_v4(), "shares": 1.0 }),
    )
    .await;

    assert!(state.user_balances.get(user).is_none());
    assert!(state.transactions.is_empty());
    assert!(*state.pot.read().await < TOLERANCE);
}

#[tokio::test]
async fn malformed_payload_is_ignored_without_state_change() {
    let (state, team_id) = test_state();

    send(&state, "user-garbled", json!({ "type": "warp_core_breach" })).await;
    handle_client_message(
        Uuid::new_v4(),
        "user-garbled",
        Message::text("not json at all"),
        &state,
    )
    .await;

    assert!(state.teams.get(&team_id).unwrap().total_supply.abs() < TOLERANCE);
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn quote_layers_fee_on_top_of_curve_amount() {
    let (state, team_id) = test_state();
    state.teams.get_mut(&team_id).unwrap().total_supply = 100.0;
    let (client_id, mut receiver) = register_client(&state, "user-quote");

    let buy = json!({ "type": "quote", "team_id": team_id, "shares": 100.0, "side": "buy" });
    handle_client_message(client_id, "user-quote", Message::text(buy.to_string()), &state).await;
    let sell = json!({ "type": "quote", "team_id": team_id, "shares": 100.0, "side": "sell" });
    handle_client_message(client_id, "user-quote", Message::text(sell.to_string()), &state).await;

    let replies = drain_replies(&mut receiver);
    let quotes: Vec<_> = replies
        .iter()
        .filter(|r| r["type"] == "quote_result")
        .collect();
    assert_eq!(quotes.len(), 2);

    // Buy pays amount plus fee; sell receives amount minus fee.
    let curve = CurveParameters::default();
    let buy_amount = curve.buy_cost(100.0, 100.0);
    let buy_fee = buy_amount * FEE_RATE;
    assert!((quotes[0]["amount"].as_f64().unwrap() - buy_amount).abs() < TOLERANCE);
    assert!((quotes[0]["fee"].as_f64().unwrap() - buy_fee).abs() < TOLERANCE);
    assert!((quotes[0]["total"].as_f64().unwrap() - (buy_amount + buy_fee)).abs() < TOLERANCE);
    assert!(quotes[0]["impact"]["percent_change"].as_f64().is_some());

    let sell_amount = curve.sell_refund(100.0, 100.0);
    let sell_fee = sell_amount * FEE_RATE;
    assert!((quotes[1]["amount"].as_f64().unwrap() - sell_amount).abs() < TOLERANCE);
    assert!((quotes[1]["total"].as_f64().unwrap() - (sell_amount - sell_fee)).abs() < TOLERANCE);

    // A quote never moves state.
    assert!((state.teams.get(&team_id).unwrap().total_supply - 100.0).abs() < TOLERANCE);
    assert!(state.transactions.is_empty());
}

#[tokio::test]
async fn curve_points_bounds_inputs_and_replies_with_chart_data() {
    let (state, team_id) = test_state();
    state.teams.get_mut(&team_id).unwrap().total_supply = 30.0;
    let (client_id, mut receiver) = register_client(&state, "user-chart");

    // Out-of-range transaction amount is rejected outright.
    let oversized =
        json!({ "type": "curve_points", "team_id": team_id, "transaction_amount": 20_000.0 });
    handle_client_message(
        client_id,
        "user-chart",
        Message::text(oversized.to_string()),
        &state,
    )
    .await;
    let replies = drain_replies(&mut receiver);
    assert!(reply_of_type(&replies, "error").is_some());
    assert!(reply_of_type(&replies, "curve_data").is_none());

    // A valid request returns samples and the highlighted region.
    let valid = json!({
        "type": "curve_points",
        "team_id": team_id,
        "transaction_amount": 12.0,
        "point_density": 1.0,
    });
    handle_client_message(
        client_id,
        "user-chart",
        Message::text(valid.to_string()),
        &state,
    )
    .await;
    let replies = drain_replies(&mut receiver);
    let chart = reply_of_type(&replies, "curve_data").unwrap();
    assert_eq!(chart["team_id"], json!(team_id));
    let region = &chart["view"]["transaction_region"];
    assert!((region["start"].as_f64().unwrap() - 30.0).abs() < TOLERANCE);
    assert!((region["end"].as_f64().unwrap() - 42.0).abs() < TOLERANCE);
    assert!(!chart["view"]["points"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn history_returns_newest_first_capped_at_fifty() {
    let (state, team_id) = test_state();
    let user = "user-history";
    let (client_id, mut receiver) = register_client(&state, user);

    // 60 trades, oldest first; one belongs to someone else.
    let base = Utc::now() - Duration::hours(2);
    for i in 0..60 {
        let record = TransactionRecord {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            team_id,
            side: TradeSide::Buy,
            quantity: 1.0,
            price: 1.0 + i as f64,
            fee: 0.02,
            timestamp: base + Duration::seconds(i),
        };
        state.transactions.insert(record.id, record);
    }
    let other = TransactionRecord {
        id: Uuid::new_v4(),
        user_id: "someone-else".to_string(),
        team_id,
        side: TradeSide::Sell,
        quantity: 1.0,
        price: 99.0,
        fee: 0.02,
        timestamp: base + Duration::seconds(120),
    };
    state.transactions.insert(other.id, other);

    let request = json!({ "type": "history" });
    handle_client_message(
        client_id,
        user,
        Message::text(request.to_string()),
        &state,
    )
    .await;

    let replies = drain_replies(&mut receiver);
    let history = reply_of_type(&replies, "history").unwrap();
    let transactions = history["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 50);
    // Newest first: prices 60 down to 11, the caller's records only.
    assert!((transactions[0]["price"].as_f64().unwrap() - 60.0).abs() < TOLERANCE);
    assert!((transactions[49]["price"].as_f64().unwrap() - 11.0).abs() < TOLERANCE);
    for pair in transactions.windows(2) {
        assert!(pair[0]["timestamp"].as_str().unwrap() >= pair[1]["timestamp"].as_str().unwrap());
    }
    assert!(transactions.iter().all(|t| t["user_id"] == user));
}

#[tokio::test]
async fn stats_reports_market_aggregates() {
    let (state, team_id) = test_state();
    let user = "user-stats";
    state.user_balances.insert(user.to_string(), 1000.0);
    let (client_id, mut receiver) = register_client(&state, user);

    let buy = json!({ "type": "buy", "team_id": team_id, "shares": 100.0 });
    handle_client_message(client_id, user, Message::text(buy.to_string()), &state).await;
    let request = json!({ "type": "stats" });
    handle_client_message(client_id, user, Message::text(request.to_string()), &state).await;

    let replies = drain_replies(&mut receiver);
    let stats = reply_of_type(&replies, "stats").unwrap();
    assert_eq!(stats["total_users"].as_u64().unwrap(), 1);
    assert_eq!(stats["total_teams"].as_u64().unwrap(), 1);
    assert_eq!(stats["total_trades"].as_u64().unwrap(), 1);
    // The buy charged 300 plus a 6 fee; volume records the full charge.
    assert!((stats["total_volume"].as_f64().unwrap() - 306.0).abs() < TOLERANCE);
    assert!((stats["pot"].as_f64().unwrap() - 6.0).abs() < TOLERANCE);
}

#[tokio::test]
async fn concurrent_buys_charge_the_curve_exactly_once_each() {
    // Two buys racing on the same team must settle as if serialized:
    // total charged equals the integral over [0, q1+q2] plus fees.
    let (state, team_id) = test_state();
    let alice = "alice";
    let bob = "bob";
    state.user_balances.insert(alice.to_string(), 10_000.0);
    state.user_balances.insert(bob.to_string(), 10_000.0);

    let state_a = state.clone();
    let state_b = state.clone();
    let t1 = tokio::spawn(async move {
        send(
            &state_a,
            alice,
            json!({ "type": "buy", "team_id": team_id, "shares": 60.0 }),
        )
        .await;
    });
    let t2 = tokio::spawn(async move {
        send(
            &state_b,
            bob,
            json!({ "type": "buy", "team_id": team_id, "shares": 40.0 }),
        )
        .await;
    });
    t1.await.unwrap();
    t2.await.unwrap();

    let curve = CurveParameters::default();
    let combined_cost = curve.buy_cost(0.0, 100.0);
    let charged = (10_000.0 - balance(&state, alice)) + (10_000.0 - balance(&state, bob));
    // Path independence: whichever order the trades settled in, the
    // summed pre-fee cost spans the whole [0, 100] interval.
    assert!((charged - combined_cost * (1.0 + FEE_RATE)).abs() < TOLERANCE);
    assert!((state.teams.get(&team_id).unwrap().total_supply - 100.0).abs() < TOLERANCE);
    assert!((*state.pot.read().await - combined_cost * FEE_RATE).abs() < TOLERANCE);
}

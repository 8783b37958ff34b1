use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;
use warp::filters::ws::{Message, WebSocket};

use super::calculations::{
    calculate_holding_value, calculate_portfolio_value, calculate_user_holdings, team_view,
};
use super::constants::{EPSILON, INITIAL_BALANCE};
use super::handlers::handle_client_message;
use super::models::{Client, ServerMessage};
use super::state::AppState;

// --- WebSocket Handling ---

// Helper to get simple message type string for logging
pub fn message_type_for_debug(msg: &ServerMessage) -> &'static str {
    match msg {
        ServerMessage::InitialState { .. } => "InitialState",
        ServerMessage::UserSync { .. } => "UserSync",
        ServerMessage::TradeExecuted { .. } => "TradeExecuted",
        ServerMessage::QuoteResult { .. } => "QuoteResult",
        ServerMessage::CurveData { .. } => "CurveData",
        ServerMessage::History { .. } => "History",
        ServerMessage::Stats { .. } => "Stats",
        ServerMessage::MarketUpdate { .. } => "MarketUpdate",
        ServerMessage::HoldingUpdate { .. } => "HoldingUpdate",
        ServerMessage::PotUpdate { .. } => "PotUpdate",
        ServerMessage::Error { .. } => "Error",
    }
}

// Helper to send a message to a specific client
pub async fn send_to_client(client_id: Uuid, message: ServerMessage, state: &AppState) {
    if let Some(client) = state.clients.get(&client_id) {
        match serde_json::to_string(&message) {
            Ok(json_msg) => {
                if client.sender.send(Ok(Message::text(json_msg))).is_err() {
                    eprintln!(
                        "Error queueing message type '{}' for client_id={}",
                        message_type_for_debug(&message),
                        client_id
                    );
                }
            }
            Err(e) => {
                eprintln!(
                    "Failed to serialize direct message '{}' for client_id={}: {}",
                    message_type_for_debug(&message),
                    client_id,
                    e
                );
            }
        }
    } else {
        eprintln!(
            "Attempted to send direct message '{}' to non-existent client_id={}",
            message_type_for_debug(&message),
            client_id
        );
    }
}

pub async fn broadcast_message(message: ServerMessage, state: &AppState) {
    if state.clients.is_empty() {
        println!("No clients connected, skipping broadcast.");
        return;
    }
    let serialized_message = match serde_json::to_string(&message) {
        Ok(s) => s,
        Err(e) => {
            eprintln!(
                "Failed to serialize broadcast message: {:?}, error: {}",
                message, e
            );
            return;
        }
    };
    println!(
        "Broadcasting message type: {} to {} clients",
        message_type_for_debug(&message),
        state.clients.len()
    );
    for client_entry in state.clients.iter() {
        let client_id = client_entry.key();
        let client = client_entry.value();
        if client
            .sender
            .send(Ok(Message::text(serialized_message.clone())))
            .is_err()
        {
            eprintln!(
                "Failed to send broadcast message to client_id={}, user_id={}. Channel likely closed.",
                client_id, client.user_id
            );
        }
    }
}

// Broadcast a market update for a traded team, then refresh holding
// valuations for OTHER connected clients exposed to that team (their
// shares didn't move, but the curve under them did).
pub async fn broadcast_market_and_holding_updates(
    team_id: Uuid,
    new_price: f64,
    new_supply: f64,
    market_cap: f64,
    volume: f64,
    trading_client_id: Uuid,
    state: &AppState,
) {
    // 1. Broadcast the general market update to everyone
    let market_update_msg = ServerMessage::MarketUpdate {
        team_id,
        price: new_price,
        supply: new_supply,
        market_cap,
        volume,
    };
    broadcast_message(market_update_msg, state).await;

    // 2. Collect per-client holding refreshes before any await
    let mut updates: Vec<(Uuid, ServerMessage)> = Vec::new();
    for client_entry in state.clients.iter() {
        let current_client_id = *client_entry.key();
        let user_id = &client_entry.value().user_id;

        // Skip the client who initiated this trade
        if current_client_id == trading_client_id {
            continue;
        }

        if let Some(user_holdings_map) = state.user_holdings.get(user_id) {
            if let Some(holding) = user_holdings_map.get(&team_id) {
                let shares = *holding;
                if shares > EPSILON {
                    let value = calculate_holding_value(&state.curve, new_supply, shares);
                    println!(
                        "   -> Sending holding update for Team {} to OTHER User {} ({}): Shares: {:.4}, Value: {:.4}",
                        team_id, user_id, current_client_id, shares, value
                    );
                    updates.push((
                        current_client_id,
                        ServerMessage::HoldingUpdate {
                            team_id,
                            shares,
                            value,
                        },
                    ));
                }
            }
        }
    }
    for (client_id, message) in updates {
        send_to_client(client_id, message, state).await;
    }
}

pub async fn handle_connection(ws: WebSocket, user_id: String, state: AppState) {
    let client_id = Uuid::new_v4();
    println!(
        "New WebSocket connection: client_id={}, user_id={}",
        client_id, &user_id
    );

    let (client_sender, client_rcv) = mpsc::unbounded_channel();
    let client_rcv_stream = UnboundedReceiverStream::new(client_rcv);

    state.clients.insert(
        client_id,
        Client {
            user_id: user_id.clone(),
            sender: client_sender.clone(),
        },
    );

    // --- Send InitialState (all teams, prices refreshed) ---
    let current_teams = state
        .teams
        .iter()
        .map(|entry| team_view(&state.curve, entry.value()))
        .collect();
    let initial_state_msg = ServerMessage::InitialState {
        teams: current_teams,
    };
    let initial_json = match serde_json::to_string(&initial_state_msg) {
        Ok(json) => json,
        Err(e) => {
            eprintln!(
                "Failed to serialize InitialState for client_id={}: {}",
                client_id, e
            );
            state.clients.remove(&client_id);
            return;
        }
    };
    if client_sender.send(Ok(Message::text(initial_json))).is_err() {
        eprintln!("Failed initial send (InitialState) to client_id={}", client_id);
        state.clients.remove(&client_id);
        return;
    }
    println!("Sent InitialState to client_id={}", client_id);

    // --- Send UserSync (Balance, Holdings, Portfolio Value, Pot) ---
    let user_balance = *state
        .user_balances
        .entry(user_id.clone())
        .or_insert(INITIAL_BALANCE);
    let holdings = calculate_user_holdings(&user_id, &state);
    let portfolio_value = calculate_portfolio_value(&user_id, &state);
    let pot_amount = *state.pot.read().await;

    let user_sync_msg = ServerMessage::UserSync {
        balance: user_balance,
        portfolio_value,
        holdings,
        pot: pot_amount,
    };
    let sync_json = match serde_json::to_string(&user_sync_msg) {
        Ok(json) => json,
        Err(e) => {
            eprintln!(
                "Failed to serialize UserSync for client_id={}: {}",
                client_id, e
            );
            state.clients.remove(&client_id);
            return;
        }
    };
    if client_sender.send(Ok(Message::text(sync_json))).is_err() {
        eprintln!("Failed initial send (UserSync) to client_id={}", client_id);
        state.clients.remove(&client_id);
        return;
    }
    println!(
        "Sent UserSync to client_id={} (Bal: {:.4}, Portfolio: {:.4}, Pot: {:.4})",
        client_id, user_balance, portfolio_value, pot_amount
    );

    // --- WebSocket Task Setup ---
    let (ws_sender, mut ws_receiver) = ws.split();

    // Task to forward messages from MPSC channel to WebSocket sink
    tokio::spawn(async move {
        let task_client_id = client_id;
        let mut ws_sender = ws_sender;
        let mut client_rcv_stream = client_rcv_stream;
        while let Some(message_result) = client_rcv_stream.next().await {
            match message_result {
                Ok(msg) => {
                    if ws_sender.send(msg).await.is_err() {
                        eprintln!(
                            "Error sending message via MPSC->WS forwarder task for client {}",
                            task_client_id
                        );
                        break;
                    }
                }
                Err(e) => {
                    eprintln!(
                        "Error receiving message in MPSC->WS forwarder task for client {}: {}",
                        task_client_id, e
                    );
                }
            }
        }
        println!("MPSC->WS forwarder task finished for client {}", task_client_id);
    });

    // --- Main Message Loop ---
    while let Some(result) = ws_receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                eprintln!(
                    "WebSocket error receiving message for client_id={}: {}, user_id={}",
                    client_id, e, &user_id
                );
                break;
            }
        };

        handle_client_message(client_id, &user_id, msg, &state).await;
    }

    // --- Cleanup on Disconnect ---
    println!(
        "WebSocket connection closed for client_id={}, user_id={}",
        client_id, &user_id
    );
    state.clients.remove(&client_id);
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;
use warp::filters::ws::Message;

use super::curve::{CurveView, PriceImpact, TradeSide};

// --- JWT & Auth Types ---

// Represents the claims expected in the session JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub aud: String, // Audience
    pub exp: usize,  // Expiration time
}

// Structure to deserialize the query parameter containing the token
#[derive(Deserialize, Debug)]
pub struct AuthQuery {
    pub token: String,
}

// --- Core Data Models ---

// One tradeable NFL team market
#[derive(Debug, Serialize, Clone)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub symbol: String,
    pub total_supply: f64,
    pub market_cap: f64,
    pub volume: f64,
    pub primary_color: String,
    pub secondary_color: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

// One executed trade, kept for the history views
#[derive(Debug, Serialize, Clone)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: String,
    pub team_id: Uuid,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64, // average price per share, pre-fee
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

// A user's stake in one team, enriched for UserSync / holding updates
#[derive(Serialize, Debug, Clone)]
pub struct HoldingDetail {
    pub team_id: Uuid,
    pub symbol: String,
    pub shares: f64,
    pub value: f64, // liquidation value via the shared curve, pre-fee
}

// Structure to hold client-specific information
#[derive(Debug)]
pub struct Client {
    pub user_id: String,
    pub sender: UnboundedSender<Result<Message, warp::Error>>,
}

// --- WebSocket Message Types ---

// Represents incoming messages from the client
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Buy {
        team_id: Uuid,
        shares: f64,
    },
    Sell {
        team_id: Uuid,
        shares: f64,
    },
    // Non-authoritative price preview; re-validated at settlement
    Quote {
        team_id: Uuid,
        shares: f64,
        side: TradeSide,
    },
    // Chart samples around a proposed transaction (signed amount)
    CurvePoints {
        team_id: Uuid,
        transaction_amount: f64,
        point_density: Option<f64>,
    },
    // The caller's recent trades, optionally restricted to one team
    History {
        team_id: Option<Uuid>,
    },
    // Market-wide aggregates for the homepage
    Stats,
}

// Represents messages sent from the server to the client
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InitialState {
        teams: Vec<Team>,
    },
    UserSync {
        balance: f64,
        portfolio_value: f64,
        holdings: Vec<HoldingDetail>,
        pot: f64,
    },
    TradeExecuted {
        team_id: Uuid,
        side: TradeSide,
        shares: f64,
        amount: f64, // curve cost or refund, pre-fee
        fee: f64,
        total: f64, // amount charged (buy) or credited (sell)
        new_supply: f64,
        balance: f64,
        holding_shares: f64,
    },
    QuoteResult {
        team_id: Uuid,
        side: TradeSide,
        shares: f64,
        amount: f64,
        fee: f64,
        total: f64,
        average_price: f64,
        impact: PriceImpact,
    },
    CurveData {
        team_id: Uuid,
        view: CurveView,
    },
    History {
        transactions: Vec<TransactionRecord>,
    },
    Stats {
        total_users: usize,
        total_teams: usize,
        total_trades: usize,
        total_volume: f64,
        pot: f64,
    },
    MarketUpdate {
        team_id: Uuid,
        price: f64,
        supply: f64,
        market_cap: f64,
        volume: f64,
    },
    HoldingUpdate {
        team_id: Uuid,
        shares: f64,
        value: f64,
    },
    PotUpdate {
        amount: f64,
    },
    Error {
        message: String,
    },
}

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::curve::CurveParameters;
use super::models::{Client, Team, TransactionRecord};

// Type aliases for shared state
pub type Clients = Arc<DashMap<Uuid, Client>>; // ClientID -> Client
pub type Teams = Arc<DashMap<Uuid, Team>>; // TeamID -> Team
pub type UserBalances = Arc<DashMap<String, f64>>; // UserID -> Balance
pub type UserHoldings = Arc<DashMap<String, DashMap<Uuid, f64>>>; // UserID -> TeamID -> Shares
pub type TransactionLog = Arc<DashMap<Uuid, TransactionRecord>>; // TxID -> Record
pub type PrizePot = Arc<RwLock<f64>>; // Accumulated trading fees

// Combined Application State
//
// Trade handlers lock map entries in a fixed order (teams, then
// balances, then holdings; the pot last) and never hold a guard
// across an await. Quote-then-settle is atomic per team: the team
// entry guard is held from reading total_supply through writing it.
#[derive(Clone)]
pub struct AppState {
    pub clients: Clients,
    pub teams: Teams,
    pub user_balances: UserBalances,
    pub user_holdings: UserHoldings,
    pub transactions: TransactionLog,
    pub pot: PrizePot,
    // The single curve configuration every pricing call goes through
    pub curve: Arc<CurveParameters>,
    pub jwt_secret: Arc<String>,
}

impl AppState {
    pub fn new(curve: CurveParameters, jwt_secret: String) -> Self {
        AppState {
            clients: Arc::new(DashMap::new()),
            teams: Arc::new(DashMap::new()),
            user_balances: Arc::new(DashMap::new()),
            user_holdings: Arc::new(DashMap::new()),
            transactions: Arc::new(DashMap::new()),
            pot: Arc::new(RwLock::new(0.0)),
            curve: Arc::new(curve),
            jwt_secret: Arc::new(jwt_secret),
        }
    }
}

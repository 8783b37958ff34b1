// Library surface: modules shared by the binary and the integration
// tests.

pub mod auth;
pub mod calculations;
pub mod constants;
pub mod curve;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod state;
pub mod teams;
pub mod websocket;

pub use curve::{CurveParameters, PriceImpact, SupplyPoint, TradeSide};
pub use handlers::handle_client_message;
pub use state::AppState;

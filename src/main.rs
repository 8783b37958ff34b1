// Main binary entry point: configuration, team seeding, and the warp
// websocket route. All trading logic lives in the library modules.

use std::env;
use std::net::SocketAddr;

use dotenvy::dotenv;
use warp::Filter;

use degen_futures::{
    auth::with_auth,
    curve::CurveParameters,
    errors::handle_rejection,
    state::AppState,
    teams::seed_teams,
    websocket::handle_connection,
};

// An override that is set but unparsable fails startup rather than
// silently trading on the default curve.
fn env_f64(name: &str, default: f64) -> f64 {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<f64>()
            .unwrap_or_else(|_| panic!("{} must be a number, got '{}'", name, raw)),
        Err(_) => default,
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    // --- Configuration --- //
    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET must be set");
    let addr: SocketAddr = env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
        .parse()
        .expect("LISTEN_ADDR must be a valid socket address");

    // The one curve configuration shared by settlement, quoting,
    // portfolio valuation and charting.
    let defaults = CurveParameters::default();
    let curve = CurveParameters::new(
        env_f64("CURVE_BASE_PRICE", defaults.base_price),
        env_f64("CURVE_K", defaults.k),
        env_f64("CURVE_EXPONENT", defaults.exponent),
    )
    .expect("invalid curve configuration");
    println!(
        "Curve configured: base_price={}, k={}, exponent={}",
        curve.base_price, curve.k, curve.exponent
    );

    // --- Initialization --- //
    let state = AppState::new(curve, jwt_secret);
    let seeded = seed_teams(&state);
    if seeded > 0 {
        println!("Seeded {} NFL teams.", seeded);
    }

    // --- Routes --- //
    let ws_state = state.clone();
    let ws_route = warp::path("ws")
        .and(warp::ws())
        .and(with_auth(state.clone()))
        .and(warp::any().map(move || ws_state.clone()))
        .map(|ws: warp::ws::Ws, user_id: String, state: AppState| {
            ws.on_upgrade(move |socket| handle_connection(socket, user_id, state))
        });

    let health_route = warp::path("health").map(|| "OK");

    let routes = ws_route.or(health_route).recover(handle_rejection);

    println!("WebSocket server listening on: {}", addr);
    warp::serve(routes).run(addr).await;
}

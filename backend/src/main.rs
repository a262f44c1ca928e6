//! Raffle Backend
//!
//! Hosts the raffle state machine together with its collaborators. Runs
//! four concurrent subsystems:
//!
//! - **Coordinator / fulfiller**: accepts randomness requests and delivers
//!   HMAC-SHA256 random words after the requested confirmation depth.
//! - **Keeper**: probes the raffle for upkeep and starts draws.
//! - **Event listener**: logs raffle notifications and feeds counters.
//! - **HTTP server**: entries, queries, payout remediation and probes.

use actix_web::http::StatusCode;
use actix_web::{App, HttpResponse, HttpServer, web};
use raffle::{Participant, Raffle, RaffleError, Settlement};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod config;
mod coordinator;
mod events;
mod keeper;
mod metrics;
mod treasury;
mod vrf;

use config::AppConfig;
use coordinator::Coordinator;
use metrics::Metrics;
use treasury::Treasury;

/// The raffle as wired in this service.
pub type AppRaffle = Raffle<Coordinator, Treasury>;

/// Shared application state accessible from HTTP handlers.
struct AppState {
    raffle: Arc<AppRaffle>,
    metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
struct EnterRequest {
    participant: Participant,
    amount: u64,
}

/// Map a raffle error to an HTTP response.
fn error_response(error: &RaffleError) -> HttpResponse {
    let status = match error {
        RaffleError::InsufficientPayment { .. } => StatusCode::PAYMENT_REQUIRED,
        RaffleError::PaymentRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        RaffleError::RoundNotOpen
        | RaffleError::UpkeepNotNeeded { .. }
        | RaffleError::NoStalledPayout => StatusCode::CONFLICT,
        RaffleError::IndexOutOfRange { .. } => StatusCode::NOT_FOUND,
        RaffleError::PayoutFailed { .. } | RaffleError::RandomnessRequestFailed(_) => {
            StatusCode::BAD_GATEWAY
        }
        RaffleError::OnlyCoordinatorCanFulfill { .. } => StatusCode::FORBIDDEN,
        RaffleError::UnknownRequest { .. } | RaffleError::MissingRandomWords { .. } => {
            StatusCode::BAD_REQUEST
        }
        RaffleError::NoPlayers { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    HttpResponse::build(status).json(serde_json::json!({ "error": error.to_string() }))
}

/// Liveness probe: returns 200 if the process is running.
async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"status": "ok"}))
}

/// Round snapshot, including the pot and the keeper's view of upkeep.
async fn status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.raffle.snapshot().await)
}

async fn enter(data: web::Data<AppState>, body: web::Json<EnterRequest>) -> HttpResponse {
    let EnterRequest {
        participant,
        amount,
    } = body.into_inner();

    match data.raffle.enter(participant.clone(), amount).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "status": "entered",
            "participant": participant,
            "players": data.raffle.number_of_players().await,
        })),
        Err(e) => error_response(&e),
    }
}

async fn player(data: web::Data<AppState>, path: web::Path<usize>) -> HttpResponse {
    let index = path.into_inner();
    match data.raffle.player(index).await {
        Ok(player) => HttpResponse::Ok().json(serde_json::json!({
            "index": index,
            "player": player,
        })),
        Err(e) => error_response(&e),
    }
}

async fn balance(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let participant = Participant::new(path.into_inner());
    let balance = data.raffle.settlement().balance_of(&participant);
    HttpResponse::Ok().json(serde_json::json!({
        "participant": participant,
        "balance": balance,
    }))
}

/// Remediation for a round stuck on a rejected payout.
async fn retry_payout(data: web::Data<AppState>) -> HttpResponse {
    match data.raffle.retry_payout().await {
        Ok(winner) => HttpResponse::Ok().json(serde_json::json!({
            "status": "paid",
            "winner": winner,
        })),
        Err(e) => error_response(&e),
    }
}

async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    let mut body = data.metrics.to_json();
    body["total_paid_out"] = data.raffle.settlement().total_paid_out().into();
    HttpResponse::Ok().json(body)
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/status", web::get().to(status))
        .route("/enter", web::post().to(enter))
        .route("/players/{index}", web::get().to(player))
        .route("/balances/{participant}", web::get().to(balance))
        .route("/admin/retry-payout", web::post().to(retry_payout))
        .route("/metrics", web::get().to(metrics));
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,actix_server=warn")),
        )
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = AppConfig::from_env()?;

    info!(
        entrance_fee = config.entrance_fee,
        interval = ?config.draw_interval,
        key_hash = %config.key_hash,
        subscription_id = config.subscription_id,
        "Starting raffle backend"
    );

    let metrics = Arc::new(Metrics::new());
    let (coordinator, requests) = Coordinator::new(&config);
    let raffle = Arc::new(Raffle::new(config.round_config(), coordinator, Treasury::new()));

    // Background: log notifications and count them.
    tokio::spawn(events::log_events(raffle.subscribe(), metrics.clone()));

    // Background: answer randomness requests.
    tokio::spawn(coordinator::run_fulfiller(
        config.clone(),
        requests,
        raffle.clone(),
        metrics.clone(),
    ));

    // Background: probe for upkeep and start draws.
    tokio::spawn(keeper::run_keeper(
        raffle.clone(),
        config.keeper_poll_interval,
        metrics.clone(),
    ));

    let state = web::Data::new(AppState { raffle, metrics });

    info!(port = config.http_port, "Starting HTTP server");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(("0.0.0.0", config.http_port))?
        .run()
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    fn app_state() -> web::Data<AppState> {
        let config = AppConfig::for_tests();
        let (coordinator, _requests) = Coordinator::new(&config);
        web::Data::new(AppState {
            raffle: Arc::new(Raffle::new(config.round_config(), coordinator, Treasury::new())),
            metrics: Arc::new(Metrics::new()),
        })
    }

    #[actix_web::test]
    async fn enter_and_query_players() {
        let state = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/enter")
            .set_json(serde_json::json!({"participant": "alice", "amount": 100}))
            .to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["players"], 1);

        let req = test::TestRequest::get().uri("/players/0").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["player"], "alice");

        let req = test::TestRequest::get().uri("/players/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/status").to_request();
        let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp["phase"], "open");
        assert_eq!(resp["pot"], 100);
        assert_eq!(resp["upkeep"]["balance"], 100);
        assert_eq!(resp["upkeep"]["upkeep_needed"], false);
    }

    #[actix_web::test]
    async fn underpayment_is_payment_required() {
        let state = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/enter")
            .set_json(serde_json::json!({"participant": "alice", "amount": 99}))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(state.raffle.number_of_players().await, 0);
    }

    #[actix_web::test]
    async fn overflowing_payment_is_rejected() {
        let state = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        for (participant, amount, expected) in [
            ("alice", u64::MAX, StatusCode::OK),
            ("bob", 100, StatusCode::UNPROCESSABLE_ENTITY),
        ] {
            let req = test::TestRequest::post()
                .uri("/enter")
                .set_json(serde_json::json!({"participant": participant, "amount": amount}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }

        assert_eq!(state.raffle.number_of_players().await, 1);
        assert_eq!(state.raffle.settlement().pot_balance(), u64::MAX);
    }

    #[actix_web::test]
    async fn retry_payout_without_stall_conflicts() {
        let state = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post().uri("/admin/retry-payout").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}

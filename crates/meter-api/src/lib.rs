//! meter-api — HTTP surface of the metrics server.
//!
//! Handlers decode requests and hand them to the [`RequestDispatcher`],
//! which validates and applies them against the shared repository.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/update/{kind}/{name}/{value}` | Update one metric from the path |
//! | POST | `/update` | Update one metric from a JSON body |
//! | POST | `/updates` | Apply a JSON array of metrics |
//! | GET | `/value/{kind}/{name}` | Plain-text value |
//! | POST | `/value` | JSON metric with value or delta filled |
//! | GET | `/` | HTML listing |
//! | GET | `/ping` | Repository liveness |
//!
//! The body routes also accept a trailing slash. Request bodies may be
//! gzip-encoded; responses are gzip-encoded when the client accepts it.

pub mod dispatcher;
pub mod error;
pub mod handlers;

pub use dispatcher::RequestDispatcher;
pub use error::{DispatchError, DispatchResult};

use axum::Router;
use axum::routing::{get, post};
use meter_state::SharedRepository;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;

/// Build the complete router over the given repository.
pub fn build_router(repo: SharedRepository) -> Router {
    let dispatcher = RequestDispatcher::new(repo);

    Router::new()
        .route("/", get(handlers::list_all))
        .route("/ping", get(handlers::ping))
        .route("/update/{kind}/{name}/{value}", post(handlers::update_by_path))
        .route("/update", post(handlers::update_by_body))
        .route("/update/", post(handlers::update_by_body))
        .route("/updates", post(handlers::batch_update))
        .route("/updates/", post(handlers::batch_update))
        .route("/value/{kind}/{name}", get(handlers::get_by_path))
        .route("/value", post(handlers::get_by_body))
        .route("/value/", post(handlers::get_by_body))
        .with_state(dispatcher)
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

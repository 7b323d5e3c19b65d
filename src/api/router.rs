use axum::{
    body::Body,
    extract::Request,
    http::Response,
    routing::{get, post, put, delete},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use crate::state::AppState;
use crate::api::handlers::{availability, feed, health, open_play, package, policy, reservation, waitlist};
use tower_http::{
    trace::TraceLayer,
    classify::ServerErrorsFailureClass,
};
use tower_cookies::CookieManagerLayer;
use tracing::{info_span, Span, error, info};
use uuid::Uuid;

type ApiRouter = Router<Arc<AppState>>;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(booking_routes())
        .merge(waitlist_routes())
        .merge(open_play_routes())
        .merge(staff_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(|request: &Request<Body>, _span: &Span| {
                    info!("{} {}", request.method(), request.uri().path());
                })
                .on_response(log_response)
                .on_failure(|failure: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                    error!(latency_ms = latency.as_millis(), "request failed: {:?}", failure);
                })
        )
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

// facility_id and user_id are filled in by the auth extractor once the caller is known.
fn request_span(request: &Request<Body>) -> Span {
    info_span!(
        "http_request",
        request_id = %Uuid::new_v4(),
        method = %request.method(),
        uri = %request.uri(),
        facility_id = tracing::field::Empty,
        user_id = tracing::field::Empty,
    )
}

fn log_response(response: &Response<Body>, latency: Duration, _span: &Span) {
    info!(
        status = response.status().as_u16(),
        latency_ms = latency.as_millis(),
        "response sent"
    );
}

fn booking_routes() -> ApiRouter {
    Router::new()
        .route("/api/v1/{facility_id}/availability", get(availability::check_availability))
        .route("/api/v1/{facility_id}/reservations", post(reservation::create_reservation))
        .route("/api/v1/{facility_id}/reservations/{reservation_id}", get(reservation::get_reservation))
        .route("/api/v1/{facility_id}/reservations/{reservation_id}/cancel", post(reservation::cancel_reservation))
        .route("/api/v1/{facility_id}/reservations/{reservation_id}/reverse-redemptions", post(reservation::reverse_redemptions))
        .route("/api/v1/{facility_id}/packages", post(package::issue_package))
        .route("/api/v1/{facility_id}/packages/{package_id}", get(package::get_package))
        .route("/api/v1/{facility_id}/packages/{package_id}/redeem", post(package::redeem_package))
}

fn waitlist_routes() -> ApiRouter {
    Router::new()
        .route("/api/v1/{facility_id}/waitlist", post(waitlist::join_waitlist))
        .route("/api/v1/{facility_id}/waitlist/config", get(waitlist::get_config).put(waitlist::update_config))
        .route("/api/v1/{facility_id}/waitlist/offers/{offer_id}/accept", post(waitlist::accept_offer))
        .route("/api/v1/{facility_id}/waitlist/{entry_id}", delete(waitlist::leave_waitlist))
}

fn open_play_routes() -> ApiRouter {
    Router::new()
        .route("/api/v1/{facility_id}/open-play/rules", post(open_play::create_rule))
        .route("/api/v1/{facility_id}/open-play/rules/{rule_id}/auto-scale", put(open_play::set_rule_auto_scale))
        .route("/api/v1/{facility_id}/open-play/sessions", post(open_play::schedule_session))
        .route("/api/v1/{facility_id}/open-play/sessions/{session_id}", get(open_play::get_session))
        .route("/api/v1/{facility_id}/open-play/sessions/{session_id}/join", post(open_play::join_session))
        .route("/api/v1/{facility_id}/open-play/sessions/{session_id}/leave", post(open_play::leave_session))
        .route("/api/v1/{facility_id}/open-play/sessions/{session_id}/auto-scale", put(open_play::set_session_override))
}

/// Policy administration and the decision feed.
fn staff_routes() -> ApiRouter {
    Router::new()
        .route("/api/v1/{facility_id}/cancellation-policy", get(policy::list_tiers).put(policy::upsert_tier))
        .route("/api/v1/{facility_id}/cancellation-policy/{tier_id}", delete(policy::delete_tier))
        .route("/api/v1/{facility_id}/staff-notifications", get(feed::list_notifications))
        .route("/api/v1/{facility_id}/audit-log", get(feed::list_audit_log))
}

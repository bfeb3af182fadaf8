use std::net::SocketAddr;

use axum::{
	Json,
	body::Body,
	extract::{ConnectInfo, State},
	http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, header},
	middleware::Next,
	response::{IntoResponse, Response},
};
use serde::Serialize;
use time::OffsetDateTime;

use crate::state::AppState;
use kb_service::{RateDecision, RateWindow, rate_limit::RETRY_AFTER_SECONDS};

pub const UNKNOWN_CLIENT: &str = "unknown";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_REAL_IP: &str = "x-real-ip";

#[derive(Debug, Serialize)]
struct RateLimitedBody {
	error_code: &'static str,
	message: String,
	window: Option<RateWindow>,
	retry_after_seconds: u64,
}

pub async fn rate_limit_middleware(
	State(state): State<AppState>,
	req: Request<Body>,
	next: Next,
) -> Response {
	let cfg = &state.service.cfg.rate_limit;

	if !cfg.enabled || cfg.exempt_paths.iter().any(|path| path == req.uri().path()) {
		return next.run(req).await;
	}

	let client_key = client_key(&req);
	let decision = state.rate_limiter.admit(&client_key, OffsetDateTime::now_utc());

	if !decision.allowed {
		tracing::warn!(
			client_key = %client_key,
			path = %req.uri().path(),
			window = decision.window.map(RateWindow::as_str).unwrap_or("unknown"),
			"Rate limit exceeded."
		);

		return too_many_requests(&decision);
	}

	let mut response = next.run(req).await;

	apply_rate_headers(response.headers_mut(), &decision);

	response
}

/// The first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address.
pub fn client_key(req: &Request<Body>) -> String {
	let headers = req.headers();

	if let Some(forwarded) = header_str(headers, X_FORWARDED_FOR)
		.and_then(|value| value.split(',').next())
		.map(str::trim)
		.filter(|value| !value.is_empty())
	{
		return forwarded.to_string();
	}
	if let Some(real_ip) =
		header_str(headers, X_REAL_IP).map(str::trim).filter(|value| !value.is_empty())
	{
		return real_ip.to_string();
	}

	req.extensions()
		.get::<ConnectInfo<SocketAddr>>()
		.map(|ConnectInfo(addr)| addr.ip().to_string())
		.unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|value| value.to_str().ok())
}

fn apply_rate_headers(headers: &mut HeaderMap, decision: &RateDecision) {
	headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
	headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining_minute));
	headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_epoch));
}

fn too_many_requests(decision: &RateDecision) -> Response {
	let retry_after = decision.retry_after_seconds.unwrap_or(RETRY_AFTER_SECONDS);
	let body = RateLimitedBody {
		error_code: "RATE_LIMITED",
		message: "Rate limit exceeded. Try again later.".to_string(),
		window: decision.window,
		retry_after_seconds: retry_after,
	};
	let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
	let headers = response.headers_mut();

	headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
	apply_rate_headers(headers, decision);

	response
}

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header::RETRY_AFTER};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use parapet_domain::{audit::RefusalReason, citation::Citation};
use parapet_service::{QueryOutcome, QueryRequest, ServiceError};

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/query", post(query))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Serialize)]
struct AnswerBody {
	answer: String,
	citations: Vec<Citation>,
	tokens_used: u32,
}

#[derive(Debug, Serialize)]
struct RefusalBody {
	refused: bool,
	reason: RefusalReason,
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<QueryRequest>,
) -> Result<Response, ApiError> {
	let outcome = state.service.answer(payload).await?;

	match outcome {
		QueryOutcome::Answered(answer) => Ok((
			StatusCode::OK,
			Json(AnswerBody {
				answer: answer.text,
				citations: answer.citations,
				tokens_used: answer.tokens_used,
			}),
		)
			.into_response()),
		QueryOutcome::Refused { reason } => match reason {
			// Upstream unavailability is a service condition, not a
			// business refusal; callers should retry.
			RefusalReason::GenerationUnavailable | RefusalReason::DeadlineExceeded =>
				Err(ApiError::new(
					StatusCode::SERVICE_UNAVAILABLE,
					reason.as_str(),
					"The answer provider is unavailable; try again later.",
					None,
				)),
			_ => Ok((StatusCode::OK, Json(RefusalBody { refused: true, reason }))
				.into_response()),
		},
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	retry_after_secs: Option<u64>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	retry_after_secs: Option<u64>,
}

impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		retry_after_secs: Option<u64>,
	) -> Self {
		Self {
			status,
			error_code: error_code.into(),
			message: message.into(),
			retry_after_secs,
		}
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::RateLimitExceeded { retry_after } => ApiError::new(
				StatusCode::TOO_MANY_REQUESTS,
				"RATE_LIMITED",
				"Too many requests; retry later.",
				Some(retry_after.as_secs().max(1)),
			),
			ServiceError::InvalidRequest { message } =>
				ApiError::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::Provider { message } => {
				tracing::error!(error = message.as_str(), "Provider failure.");

				ApiError::new(
					StatusCode::SERVICE_UNAVAILABLE,
					"UPSTREAM_UNAVAILABLE",
					"An upstream provider is unavailable; try again later.",
					None,
				)
			},
			ServiceError::Storage { message } | ServiceError::Internal { message } => {
				// Full context for operators; nothing internal leaks to the
				// caller.
				tracing::error!(error = message.as_str(), "Internal failure.");

				ApiError::new(
					StatusCode::INTERNAL_SERVER_ERROR,
					"INTERNAL_ERROR",
					"Internal error.",
					None,
				)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let retry_after_secs = self.retry_after_secs;
		let body = ErrorBody {
			error_code: self.error_code,
			message: self.message,
			retry_after_secs,
		};
		let mut response = (self.status, Json(body)).into_response();

		if let Some(secs) = retry_after_secs
			&& let Ok(value) = HeaderValue::from_str(&secs.to_string())
		{
			response.headers_mut().insert(RETRY_AFTER, value);
		}

		response
	}
}

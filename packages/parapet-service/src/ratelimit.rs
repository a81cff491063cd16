use std::{
	collections::HashMap,
	sync::Mutex,
	time::{Duration, Instant},
};

use crate::BoxFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
	Admitted,
	Denied { retry_after: Duration },
}

/// Shared per-caller counters behind an injectable seam, so a distributed
/// store can replace the in-process map without touching the orchestrator.
pub trait RateLimitStore
where
	Self: Send + Sync,
{
	fn admit<'a>(
		&'a self,
		caller_key: &'a str,
		estimated_tokens: u32,
	) -> BoxFuture<'a, AdmissionDecision>;
}

#[derive(Debug)]
struct CallerBuckets {
	requests: f64,
	tokens: f64,
	refreshed_at: Instant,
}

/// Dual token bucket per caller: a request-count bucket and a token-budget
/// bucket, both refilled continuously over the configured window. The token
/// bucket is debited with the upfront estimate at admission, before any
/// generation call, so concurrent requests cannot race past a post-hoc
/// check.
pub struct InMemoryRateLimiter {
	request_capacity: f64,
	token_capacity: f64,
	window: Duration,
	buckets: Mutex<HashMap<String, CallerBuckets>>,
}

impl InMemoryRateLimiter {
	pub fn new(limits: &parapet_config::Limits) -> Self {
		Self {
			request_capacity: f64::from(limits.requests_per_window),
			token_capacity: f64::from(limits.token_budget_per_window),
			window: Duration::from_secs(limits.window_secs),
			buckets: Mutex::new(HashMap::new()),
		}
	}

	/// Check-and-consume under one lock; two concurrent requests from the
	/// same caller can never both observe spare capacity.
	pub fn admit_at(
		&self,
		caller_key: &str,
		estimated_tokens: u32,
		now: Instant,
	) -> AdmissionDecision {
		let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
		let entry = buckets.entry(caller_key.to_string()).or_insert_with(|| CallerBuckets {
			requests: self.request_capacity,
			tokens: self.token_capacity,
			refreshed_at: now,
		});
		let window = self.window.as_secs_f64();
		let elapsed = now.saturating_duration_since(entry.refreshed_at).as_secs_f64();

		entry.requests =
			(entry.requests + elapsed / window * self.request_capacity).min(self.request_capacity);
		entry.tokens =
			(entry.tokens + elapsed / window * self.token_capacity).min(self.token_capacity);
		entry.refreshed_at = now;

		let needed = f64::from(estimated_tokens);

		if entry.requests >= 1.0 && entry.tokens >= needed {
			entry.requests -= 1.0;
			entry.tokens -= needed;

			return AdmissionDecision::Admitted;
		}

		let request_rate = self.request_capacity / window;
		let token_rate = self.token_capacity / window;
		let request_wait =
			if entry.requests < 1.0 { (1.0 - entry.requests) / request_rate } else { 0.0 };
		let token_wait =
			if entry.tokens < needed { (needed - entry.tokens) / token_rate } else { 0.0 };
		let retry_after = Duration::from_secs_f64(request_wait.max(token_wait).max(0.001));

		AdmissionDecision::Denied { retry_after }
	}
}

impl RateLimitStore for InMemoryRateLimiter {
	fn admit<'a>(
		&'a self,
		caller_key: &'a str,
		estimated_tokens: u32,
	) -> BoxFuture<'a, AdmissionDecision> {
		let decision = self.admit_at(caller_key, estimated_tokens, Instant::now());

		Box::pin(std::future::ready(decision))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn limiter(requests: u32, tokens: u32, window_secs: u64) -> InMemoryRateLimiter {
		InMemoryRateLimiter::new(&parapet_config::Limits {
			requests_per_window: requests,
			token_budget_per_window: tokens,
			window_secs,
			expected_answer_tokens: 0,
		})
	}

	#[test]
	fn sixth_request_in_the_window_is_denied_with_retry_after() {
		let limiter = limiter(5, 1_000_000, 60);
		let now = Instant::now();

		for _ in 0..5 {
			assert_eq!(limiter.admit_at("caller", 10, now), AdmissionDecision::Admitted);
		}

		match limiter.admit_at("caller", 10, now) {
			AdmissionDecision::Denied { retry_after } => {
				assert!(retry_after > Duration::ZERO);
			},
			AdmissionDecision::Admitted => panic!("sixth request must be denied"),
		}
	}

	#[test]
	fn admission_recovers_after_the_window_elapses() {
		let limiter = limiter(5, 1_000_000, 60);
		let now = Instant::now();

		for _ in 0..5 {
			assert_eq!(limiter.admit_at("caller", 10, now), AdmissionDecision::Admitted);
		}

		assert!(matches!(
			limiter.admit_at("caller", 10, now),
			AdmissionDecision::Denied { .. }
		));

		let later = now + Duration::from_secs(61);

		assert_eq!(limiter.admit_at("caller", 10, later), AdmissionDecision::Admitted);
	}

	#[test]
	fn token_budget_is_consumed_upfront() {
		let limiter = limiter(100, 100, 60);
		let now = Instant::now();

		assert_eq!(limiter.admit_at("caller", 80, now), AdmissionDecision::Admitted);

		match limiter.admit_at("caller", 80, now) {
			AdmissionDecision::Denied { retry_after } => {
				assert!(retry_after > Duration::ZERO);
			},
			AdmissionDecision::Admitted => panic!("token budget must deny the second request"),
		}

		let later = now + Duration::from_secs(60);

		assert_eq!(limiter.admit_at("caller", 80, later), AdmissionDecision::Admitted);
	}

	#[test]
	fn callers_do_not_share_buckets() {
		let limiter = limiter(1, 1_000, 60);
		let now = Instant::now();

		assert_eq!(limiter.admit_at("alpha", 10, now), AdmissionDecision::Admitted);
		assert!(matches!(limiter.admit_at("alpha", 10, now), AdmissionDecision::Denied { .. }));
		assert_eq!(limiter.admit_at("beta", 10, now), AdmissionDecision::Admitted);
	}

	#[test]
	fn partial_refill_admits_a_single_request_mid_window() {
		let limiter = limiter(5, 1_000_000, 60);
		let now = Instant::now();

		for _ in 0..5 {
			assert_eq!(limiter.admit_at("caller", 1, now), AdmissionDecision::Admitted);
		}

		// 12 seconds refill one request at 5 per 60 seconds.
		let later = now + Duration::from_secs(13);

		assert_eq!(limiter.admit_at("caller", 1, later), AdmissionDecision::Admitted);
		assert!(matches!(limiter.admit_at("caller", 1, later), AdmissionDecision::Denied { .. }));
	}
}

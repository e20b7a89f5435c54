// self
use crate::{_prelude::*, cache::CacheKey, obs::FlowKind};

/// Future returned by [`FlowSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; the bare future when `tracing` is off.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// `slashauth.flow` span wrapped around one client operation.
///
/// Spans never carry token material. Key-scoped spans record the audience and the normalized
/// scope so concurrent acquisitions can be told apart.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Span for an operation that is not tied to a cache key.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self { span: tracing::info_span!("slashauth.flow", flow = kind.as_str(), stage) }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Span for an operation acting on `key`.
	pub fn for_key(kind: FlowKind, stage: &'static str, key: &CacheKey) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"slashauth.flow",
				flow = kind.as_str(),
				stage,
				audience = key.audience.as_str(),
				scope = %key.scope,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, key);

			Self {}
		}
	}

	/// Runs `fut` inside the span without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Debug event for routine state changes (cache hits after a wait, local logout).
pub fn debug_event(kind: FlowKind, stage: &'static str, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(flow = kind.as_str(), stage, "{message}");
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, stage, message);
	}
}

/// Warning for failures the client recovers from on its own.
pub fn warn_event(kind: FlowKind, stage: &'static str, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(flow = kind.as_str(), stage, "{message}");
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, stage, message);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ScopeSet;

	#[test]
	fn events_are_safe_without_a_subscriber() {
		debug_event(FlowKind::Cache, "prune_corrupt", "dropped unreadable entry");
		warn_event(FlowKind::Lock, "release", "release failed");
	}

	#[tokio::test]
	async fn key_scoped_spans_wrap_futures() {
		let key = CacheKey::new("client", "api", ScopeSet::from_delimited("openid"));
		let span = FlowSpan::for_key(FlowKind::Refresh, "refresh_entry", &key);

		assert_eq!(span.instrument(async { 7 }).await, 7);
	}
}

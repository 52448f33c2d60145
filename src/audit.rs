use crate::authorize::AccessDecision;

/// Passive tap receiving every computed decision, for dev-time logging or
/// audit shipping. Sinks are read-only: they see each decision after it is
/// made and can never influence it, and the engine ignores anything they
/// do. Implementations must be cheap; they run on the deciding task.
pub trait DecisionSink: Send + Sync {
    fn record(&self, decision: &AccessDecision);
}

/// Sink that logs every decision at `debug` level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl DecisionSink for TracingSink {
    fn record(&self, decision: &AccessDecision) {
        tracing::debug!(
            path = %decision.path,
            allowed = decision.allowed,
            partial = decision.partial,
            level = %decision.level,
            reason = decision.denial_reason.map(|r| r.as_str()),
            "access decision"
        );
    }
}

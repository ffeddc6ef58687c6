//! Retry Policy Evaluator: a pure function from (descriptor, attempt,
//! error) to the next action. Delay is fixed, not exponential: each node
//! descriptor carries a single `delay: Duration` rather than a
//! backoff-factor/jitter policy, since nothing in this engine's retry
//! semantics calls for more than a flat wait between attempts.

use crate::error::NodeError;
use crate::node::NodeDescriptor;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then attempt again.
    Retry { delay: Duration },
    /// Call the descriptor's default producer instead.
    UseDefault,
    /// No more options; propagate the error.
    Propagate,
}

/// `attempt` is 1-indexed: the attempt number that just failed.
pub fn evaluate(descriptor: &NodeDescriptor, attempt: usize, error: &NodeError) -> RetryDecision {
    let retryable = (descriptor.retryable)(error);

    if !retryable {
        return if descriptor.use_default { RetryDecision::UseDefault } else { RetryDecision::Propagate };
    }

    if attempt < descriptor.attempts {
        RetryDecision::Retry { delay: descriptor.delay }
    } else if descriptor.use_default {
        RetryDecision::UseDefault
    } else {
        RetryDecision::Propagate
    }
}

//! Event-to-alert matching.
//!
//! Every incoming event is tested against every policy independently and
//! concurrently. A policy whose rules match asks the [`ThrottleManager`]
//! whether it may alert; only then is an [`AlertSignal`] handed to the
//! sink. Anything that goes wrong on the way (unparseable rules, a broken
//! suppression key template, an evaluation error) withholds the alert.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchpost_core::Event;
use watchpost_rules::{Evaluator, FieldCatalog, Node, Verdict};

use crate::policy::Policy;
use crate::sink::{AlertSignal, AlertSink};
use crate::templating::SuppressionKeyRenderer;
use crate::throttle::{EmitDecision, ThrottleManager};

/// What happened to one policy for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Disabled,
    TenantMismatch,
    NoMatch,
    /// Rules invalid or evaluation failed; treated as no match.
    EvaluationError { message: String },
    /// Matched, but the suppression key could not be rendered.
    TemplateError { message: String },
    /// Matched, but throttling or suppression held the alert back.
    Withheld { decision: EmitDecision },
    Delivered { signal: AlertSignal },
    /// Allowed, but the sink refused the signal.
    DeliveryFailed { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyOutcome {
    pub policy_id: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl PolicyOutcome {
    pub fn signal(&self) -> Option<&AlertSignal> {
        match &self.outcome {
            Outcome::Delivered { signal } => Some(signal),
            _ => None,
        }
    }
}

struct PreparedPolicy {
    policy: Policy,
    condition: Result<Node, String>,
}

/// Matches events against a fixed set of policies.
pub struct AlertMatchPipeline {
    policies: Vec<PreparedPolicy>,
    evaluator: Evaluator,
    throttle: ThrottleManager,
    keys: SuppressionKeyRenderer,
    sink: Arc<dyn AlertSink>,
}

impl AlertMatchPipeline {
    /// Parse every policy's rules up front. Invalid policies are kept and
    /// logged; they never match.
    pub fn new(policies: Vec<Policy>, throttle: ThrottleManager, sink: Arc<dyn AlertSink>) -> Self {
        let keys = SuppressionKeyRenderer::new();
        let policies = policies
            .into_iter()
            .map(|policy| {
                let condition = policy.condition().map_err(|e| e.to_string());
                if let Err(message) = &condition {
                    warn!(policy_id = %policy.id, error = %message, "policy rules rejected, policy will never match");
                }
                if let Err(e) = keys.validate(&policy) {
                    warn!(policy_id = %policy.id, error = %e, "invalid suppression key template");
                }
                PreparedPolicy { policy, condition }
            })
            .collect::<Vec<_>>();

        info!(
            policies = policies.len(),
            throttle_backend = throttle.backend_name(),
            sink = sink.sink_name(),
            "alert pipeline ready"
        );

        Self {
            policies,
            evaluator: Evaluator::new(FieldCatalog::events()),
            throttle,
            keys,
            sink,
        }
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Process an event at the current time.
    pub async fn process(&self, event: &Event) -> Vec<PolicyOutcome> {
        self.process_at(event, Utc::now()).await
    }

    /// Process an event as of `now`. Outcomes are in policy order.
    pub async fn process_at(&self, event: &Event, now: DateTime<Utc>) -> Vec<PolicyOutcome> {
        let runs = self
            .policies
            .iter()
            .map(|prepared| self.run_policy(prepared, event, now));
        join_all(runs).await
    }

    async fn run_policy(
        &self,
        prepared: &PreparedPolicy,
        event: &Event,
        now: DateTime<Utc>,
    ) -> PolicyOutcome {
        let policy = &prepared.policy;
        let outcome = self.decide(prepared, event, now).await;
        debug!(
            policy_id = %policy.id,
            event_id = %event.id,
            outcome = ?outcome,
            "policy evaluated"
        );
        PolicyOutcome {
            policy_id: policy.id.clone(),
            outcome,
        }
    }

    async fn decide(&self, prepared: &PreparedPolicy, event: &Event, now: DateTime<Utc>) -> Outcome {
        let policy = &prepared.policy;
        if !policy.enabled {
            return Outcome::Disabled;
        }
        if !policy.applies_to(event.tenant_id.as_deref()) {
            return Outcome::TenantMismatch;
        }

        let condition = match &prepared.condition {
            Ok(node) => node,
            Err(message) => {
                return Outcome::EvaluationError {
                    message: message.clone(),
                }
            }
        };
        match self.evaluator.evaluate_node(condition, event) {
            Verdict::Match => {}
            Verdict::NoMatch => return Outcome::NoMatch,
            Verdict::Error(e) => {
                warn!(policy_id = %policy.id, event_id = %event.id, error = %e, "policy evaluation failed, treating as no match");
                return Outcome::EvaluationError {
                    message: e.to_string(),
                };
            }
        }

        let suppression_key = match self.keys.render(policy, event) {
            Ok(key) => key,
            Err(e) => {
                warn!(policy_id = %policy.id, error = %e, "suppression key rendering failed, withholding alert");
                return Outcome::TemplateError {
                    message: e.to_string(),
                };
            }
        };

        let decision = self
            .throttle
            .should_emit(&policy.id, &suppression_key, &policy.limits(), now)
            .await;
        if !decision.allowed() {
            return Outcome::Withheld { decision };
        }

        let signal = AlertSignal {
            id: Uuid::new_v4(),
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            tenant_id: event.tenant_id.clone(),
            event_id: event.id,
            event_type: event.event_type.clone(),
            providers: policy.providers.clone(),
            suppression_key,
            alert_count: match decision {
                EmitDecision::Emit { alert_count } => Some(alert_count),
                _ => None,
            },
            triggered_at: now,
        };

        match self.sink.deliver(&signal).await {
            Ok(()) => {
                info!(
                    policy_id = %policy.id,
                    event_id = %event.id,
                    providers = ?policy.providers,
                    "alert signalled"
                );
                Outcome::Delivered { signal }
            }
            Err(e) => {
                warn!(
                    policy_id = %policy.id,
                    sink = self.sink.sink_name(),
                    error = %e,
                    "alert delivery failed"
                );
                Outcome::DeliveryFailed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use serde_json::json;
    use watchpost_core::config::ThrottleConfig;

    use crate::error::DeliveryError;

    struct CountingSink {
        count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl AlertSink for CountingSink {
        async fn deliver(&self, _signal: &AlertSignal) -> Result<(), DeliveryError> {
            if self.should_fail {
                return Err(DeliveryError::Failed("mock failure".to_string()));
            }
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn sink_name(&self) -> &str {
            "counting"
        }
    }

    fn policy(id: &str, rules: serde_json::Value) -> Policy {
        Policy {
            id: id.to_string(),
            name: id.to_string(),
            tenant_id: None,
            enabled: true,
            rules,
            match_all: true,
            throttle_minutes: 0,
            max_alerts_per_hour: 10,
            suppression_key: None,
            providers: vec!["webhook".to_string()],
        }
    }

    fn pipeline(policies: Vec<Policy>, should_fail: bool) -> (AlertMatchPipeline, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink {
            count: count.clone(),
            should_fail,
        });
        let p = AlertMatchPipeline::new(
            policies,
            ThrottleManager::in_memory(ThrottleConfig::default()),
            sink,
        );
        (p, count)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn policies_are_independent() {
        let (p, count) = pipeline(
            vec![
                policy("login", json!({"field": "event_type", "operator": "eq", "value": "login"})),
                policy("broken", json!({"field": "title", "operator": "regex", "value": "("})),
                policy("failed", json!({"field": "status", "operator": "eq", "value": "failed"})),
            ],
            false,
        );
        let mut e = Event::new("login");
        e.status = Some("failed".to_string());
        e.title = Some("x".to_string());

        let outcomes = p.process_at(&e, now()).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].signal().is_some());
        assert!(matches!(outcomes[1].outcome, Outcome::EvaluationError { .. }));
        assert!(outcomes[2].signal().is_some());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn signal_carries_policy_and_event() {
        let (p, _) = pipeline(
            vec![policy("login", json!({"field": "event_type", "operator": "eq", "value": "login"}))],
            false,
        );
        let e = Event::new("login");
        let outcomes = p.process_at(&e, now()).await;
        let signal = outcomes[0].signal().unwrap();
        assert_eq!(signal.policy_id, "login");
        assert_eq!(signal.event_id, e.id);
        assert_eq!(signal.providers, vec!["webhook".to_string()]);
        assert_eq!(signal.suppression_key, "default");
        assert_eq!(signal.alert_count, Some(1));
        assert_eq!(signal.triggered_at, now());
    }

    #[tokio::test]
    async fn disabled_and_other_tenant_policies_are_skipped() {
        let mut off = policy("off", json!({"field": "event_type", "operator": "is_not_null"}));
        off.enabled = false;
        let mut scoped = policy("scoped", json!({"field": "event_type", "operator": "is_not_null"}));
        scoped.tenant_id = Some("acme".to_string());
        let (p, count) = pipeline(vec![off, scoped], false);

        let mut e = Event::new("login");
        e.tenant_id = Some("globex".to_string());
        let outcomes = p.process_at(&e, now()).await;
        assert_eq!(outcomes[0].outcome, Outcome::Disabled);
        assert_eq!(outcomes[1].outcome, Outcome::TenantMismatch);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_rules_and_templates_withhold_alerts() {
        let bad_rules = policy("bad-rules", json!({"rule_type": "weird"}));
        let mut bad_key = policy("bad-key", json!({"field": "event_type", "operator": "is_not_null"}));
        bad_key.suppression_key = Some("{{ unclosed".to_string());
        let (p, count) = pipeline(vec![bad_rules, bad_key], false);

        let outcomes = p.process_at(&Event::new("login"), now()).await;
        assert!(matches!(outcomes[0].outcome, Outcome::EvaluationError { .. }));
        assert!(matches!(outcomes[1].outcome, Outcome::TemplateError { .. }));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn throttled_match_is_withheld() {
        let mut capped = policy("capped", json!({"field": "event_type", "operator": "is_not_null"}));
        capped.max_alerts_per_hour = 1;
        let (p, count) = pipeline(vec![capped], false);

        p.process_at(&Event::new("a"), now()).await;
        let outcomes = p.process_at(&Event::new("b"), now()).await;
        assert_eq!(
            outcomes[0].outcome,
            Outcome::Withheld {
                decision: EmitDecision::RateCapped { alert_count: 1 }
            }
        );
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sink_failure_is_reported() {
        let (p, _) = pipeline(
            vec![policy("any", json!({"field": "event_type", "operator": "is_not_null"}))],
            true,
        );
        let outcomes = p.process_at(&Event::new("login"), now()).await;
        assert!(matches!(outcomes[0].outcome, Outcome::DeliveryFailed { .. }));
    }
}

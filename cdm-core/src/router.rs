//! Message Router: priority-ordered, regex-matched dispatch.
//!
//! Rules are kept sorted by descending priority; equal priorities keep
//! insertion order. Patterns match from the start of `message_type`.
//! A target without a usable mapping is a routing gap: logged and skipped.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::converter::{ConversionResult, MessageConverter};
use crate::error::CdmResult;
use crate::message::{self, Message};
use crate::state::{DispatchEvent, DispatchState};
use crate::validation::ValidationResult;
use crate::vocab::MessageStandard;

/// Extra predicate a message must satisfy for a rule to apply.
pub type RouteCondition = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// Post-dispatch callback for a target standard.
pub type MessageHandler = Box<dyn Fn(&Message) -> CdmResult<()> + Send + Sync>;

/// A compiled routing rule.
pub struct RoutingRule {
    pattern: String,
    regex: Regex,
    targets: Vec<MessageStandard>,
    condition: Option<RouteCondition>,
    priority: i32,
}

impl RoutingRule {
    fn applies_to(&self, message: &Message, message_type: &str) -> bool {
        self.regex.is_match(message_type)
            && self.condition.as_ref().map_or(true, |condition| condition(message))
    }

    /// Serializable view of the rule.
    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            pattern: self.pattern.clone(),
            priority: self.priority,
            targets: self.targets.clone(),
        }
    }
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("pattern", &self.pattern)
            .field("targets", &self.targets)
            .field("conditional", &self.condition.is_some())
            .field("priority", &self.priority)
            .finish()
    }
}

/// What a dispatch record says about the rule that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSummary {
    pub pattern: String,
    pub priority: i32,
    pub targets: Vec<MessageStandard>,
}

/// One converted-and-dispatched message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedMessage {
    pub message: Message,
    pub source_standard: MessageStandard,
    pub target_standard: MessageStandard,
    pub rule: RuleSummary,
    pub validation: ValidationResult,
    pub timestamp: DateTime<Utc>,
}

/// Records plus the final dispatch state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOutcome {
    pub state: DispatchState,
    pub routed: Vec<RoutedMessage>,
}

/// Routes messages to every applicable target standard.
pub struct MessageRouter {
    rules: Vec<RoutingRule>,
    handlers: HashMap<MessageStandard, Vec<MessageHandler>>,
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter")
            .field("rules", &self.rules)
            .field("handlers", &self.handlers.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageRouter {
    /// Router with the built-in rules.
    pub fn new() -> Self {
        let mut router = Self::empty();
        let builtin = [
            (
                r"J2\.\d+",
                vec![MessageStandard::MavLink, MessageStandard::Mqtt],
            ),
            (r"GLOBAL_POSITION.*", vec![MessageStandard::MilStd6016]),
        ];
        for (pattern, targets) in builtin {
            if let Err(e) = router.add_routing_rule(pattern, targets, None, 10) {
                tracing::error!(pattern = %pattern, "built-in routing rule rejected: {}", e);
            }
        }
        router
    }

    /// Router with no rules or handlers.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Add a rule. Fails only when the pattern does not compile.
    pub fn add_routing_rule(
        &mut self,
        source_pattern: &str,
        target_standards: Vec<MessageStandard>,
        condition: Option<RouteCondition>,
        priority: i32,
    ) -> CdmResult<()> {
        let regex = Regex::new(&format!("^(?:{source_pattern})"))?;
        let position = self.rules.partition_point(|r| r.priority >= priority);
        tracing::info!(
            pattern = %source_pattern,
            priority,
            targets = ?target_standards,
            "added routing rule"
        );
        self.rules.insert(
            position,
            RoutingRule {
                pattern: source_pattern.to_string(),
                regex,
                targets: target_standards,
                condition,
                priority,
            },
        );
        Ok(())
    }

    /// Register a callback run after each dispatch to `standard`.
    pub fn register_message_handler<F>(&mut self, standard: MessageStandard, handler: F)
    where
        F: Fn(&Message) -> CdmResult<()> + Send + Sync + 'static,
    {
        self.handlers.entry(standard).or_default().push(Box::new(handler));
    }

    /// Rule summaries in evaluation order.
    pub fn routing_rules(&self) -> Vec<RuleSummary> {
        self.rules.iter().map(RoutingRule::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Route a message and return the dispatch records.
    pub fn route_message(
        &self,
        message: &Message,
        source_std: MessageStandard,
        converter: &MessageConverter<'_>,
    ) -> Vec<RoutedMessage> {
        self.route(message, source_std, converter).routed
    }

    /// Route a message, tracking its dispatch state. Every matching rule
    /// dispatches to each of its targets except the source standard, so a
    /// target shared by two rules yields one record per rule.
    pub fn route(
        &self,
        message: &Message,
        source_std: MessageStandard,
        converter: &MessageConverter<'_>,
    ) -> RouteOutcome {
        let mut state = DispatchState::Received;
        let mut routed: Vec<RoutedMessage> = Vec::new();

        // an untyped message is matched as ""
        let message_type = message::message_type(message).unwrap_or_default();

        for rule in self.rules.iter().filter(|r| r.applies_to(message, message_type)) {
            state = state.on_event(&DispatchEvent::RuleMatched {
                pattern: rule.pattern.clone(),
            });

            for &target in rule.targets.iter().filter(|t| **t != source_std) {
                let Some(result) = convert_for(converter, message, message_type, source_std, target)
                else {
                    tracing::warn!(
                        message_type = %message_type,
                        source = %source_std,
                        target = %target,
                        "no mapping registered, target skipped"
                    );
                    continue;
                };
                if !result.success {
                    tracing::warn!(
                        message_type = %message_type,
                        target = %target,
                        "conversion produced no fields, target skipped"
                    );
                    continue;
                }

                state = state.on_event(&DispatchEvent::Converted {
                    target: target.to_string(),
                });
                let record = RoutedMessage {
                    message: result.target_message,
                    source_standard: source_std,
                    target_standard: target,
                    rule: rule.summary(),
                    validation: result.validation,
                    timestamp: result.timestamp,
                };
                self.run_handlers(&record);
                routed.push(record);
            }
        }

        state = state.on_event(&DispatchEvent::Exhausted);
        RouteOutcome { state, routed }
    }

    fn run_handlers(&self, record: &RoutedMessage) {
        let Some(handlers) = self.handlers.get(&record.target_standard) else {
            return;
        };
        for handler in handlers {
            if let Err(e) = handler(&record.message) {
                tracing::error!(target = %record.target_standard, "message handler failed: {}", e);
            }
        }
    }
}

/// A message-level mapping wins; otherwise both CDM passes must have rules.
fn convert_for(
    converter: &MessageConverter<'_>,
    message: &Message,
    message_type: &str,
    source: MessageStandard,
    target: MessageStandard,
) -> Option<ConversionResult> {
    let mappings = converter.mappings();
    if let Some(mapping) = mappings.find_message_mapping(source, target, message_type) {
        return Some(converter.convert_with_mapping(message, mapping));
    }
    let inbound = source == MessageStandard::Cdm
        || !mappings
            .get_mapping_rules(source, MessageStandard::Cdm, message_type)
            .is_empty();
    let outbound = target == MessageStandard::Cdm
        || !mappings
            .get_mapping_rules(MessageStandard::Cdm, target, message_type)
            .is_empty();
    (inbound && outbound).then(|| converter.process_message(message, source, target, message_type))
}

//! Topic taxonomy for the message bus.
//!
//! Exchanges are a closed set fixed at startup. Routing keys are
//! dot-namespaced (`task.created`), and queue bindings match them with
//! patterns where `*` stands for exactly one segment (`task.*`).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::foundation::ValidationError;

/// Named topic namespaces events are published to.
///
/// The set is fixed: no exchange is declared or removed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    Users,
    Tasks,
    Locations,
    Auth,
    Notifications,
}

impl Exchange {
    /// Every exchange the system declares, in startup order.
    pub const ALL: [Exchange; 5] = [
        Exchange::Users,
        Exchange::Tasks,
        Exchange::Locations,
        Exchange::Auth,
        Exchange::Notifications,
    ];

    /// Broker-side name of the exchange.
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Users => "dispatch.users",
            Exchange::Tasks => "dispatch.tasks",
            Exchange::Locations => "dispatch.locations",
            Exchange::Auth => "dispatch.auth",
            Exchange::Notifications => "dispatch.notifications",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Well-known queue names, one per event family plus the analytics tap.
pub mod queues {
    pub const USER_EVENTS: &str = "user_events";
    pub const TASK_EVENTS: &str = "task_events";
    pub const LOCATION_EVENTS: &str = "location_events";
    pub const AUTH_EVENTS: &str = "auth_events";
    pub const NOTIFICATION_EVENTS: &str = "notification_events";
    pub const GATEWAY_ANALYTICS: &str = "gateway_analytics";
}

/// A concrete dot-namespaced routing key (`task.created`).
///
/// Always built through the per-exchange constructors so the namespace
/// prefix stays within the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Validates an arbitrary key: non-empty dot-separated segments,
    /// no wildcard characters.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::empty_field("routing_key"));
        }
        if key.split('.').any(|seg| seg.is_empty() || seg == "*") {
            return Err(ValidationError::invalid_format(
                "routing_key",
                "segments must be non-empty and literal",
            ));
        }
        Ok(Self(key))
    }

    /// `user.<action>` key on the users namespace.
    pub fn user(action: &str) -> Self {
        Self(format!("user.{action}"))
    }

    /// `task.<action>` key on the tasks namespace.
    pub fn task(action: &str) -> Self {
        Self(format!("task.{action}"))
    }

    /// `location.<action>` key on the locations namespace.
    pub fn location(action: &str) -> Self {
        Self(format!("location.{action}"))
    }

    /// `auth.<action>` key on the auth namespace.
    pub fn auth(action: &str) -> Self {
        Self(format!("auth.{action}"))
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subtypes carried on the `notification.*` routing keys.
///
/// The router dispatches on this closed set; anything else is logged
/// and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    UserUpdate,
    TaskUpdate,
    LocationUpdate,
    Broadcast,
}

impl NotificationKind {
    /// The routing-key suffix for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::UserUpdate => "user_update",
            NotificationKind::TaskUpdate => "task_update",
            NotificationKind::LocationUpdate => "location_update",
            NotificationKind::Broadcast => "broadcast",
        }
    }

    /// Parses a routing-key suffix.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_update" => Some(NotificationKind::UserUpdate),
            "task_update" => Some(NotificationKind::TaskUpdate),
            "location_update" => Some(NotificationKind::LocationUpdate),
            "broadcast" => Some(NotificationKind::Broadcast),
            _ => None,
        }
    }

    /// The full `notification.<subtype>` routing key.
    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey(format!("notification.{}", self.as_str()))
    }
}

/// A binding pattern: literal segments or `*` matching exactly one segment.
///
/// `task.*` matches `task.created` but not `task.created.retry` nor
/// `location.updated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicPattern(String);

impl TopicPattern {
    /// Validates a pattern: non-empty dot-separated segments, each either
    /// a literal or `*`.
    pub fn new(pattern: impl Into<String>) -> Result<Self, ValidationError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(ValidationError::empty_field("topic_pattern"));
        }
        if pattern
            .split('.')
            .any(|seg| seg.is_empty() || (seg != "*" && seg.contains('*')))
        {
            return Err(ValidationError::invalid_format(
                "topic_pattern",
                "segments must be literal or '*'",
            ));
        }
        Ok(Self(pattern))
    }

    /// Pattern for every key under one family (`task.*`).
    pub fn family(prefix: &str) -> Self {
        Self(format!("{prefix}.*"))
    }

    /// Segment-wise match of a routing key against this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        let mut pattern_segs = self.0.split('.');
        let mut key_segs = routing_key.split('.');
        loop {
            match (pattern_segs.next(), key_segs.next()) {
                (None, None) => return true,
                (Some(p), Some(k)) => {
                    if p != "*" && p != k {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// Returns the inner string slice.
    ///
    /// Doubles as the subscription glob for broker backends whose pattern
    /// syntax treats `*` as a wildcard; exact delivery semantics are
    /// enforced by re-checking [`TopicPattern::matches`] on receipt.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn exchange_names_carry_namespace_prefix() {
        for exchange in Exchange::ALL {
            assert!(exchange.as_str().starts_with("dispatch."));
        }
    }

    #[test]
    fn exchange_set_is_stable() {
        assert_eq!(Exchange::ALL.len(), 5);
        assert_eq!(Exchange::Notifications.as_str(), "dispatch.notifications");
    }

    #[test]
    fn routing_key_constructors_compose_namespaces() {
        assert_eq!(RoutingKey::task("created").as_str(), "task.created");
        assert_eq!(RoutingKey::location("updated").as_str(), "location.updated");
        assert_eq!(
            NotificationKind::LocationUpdate.routing_key().as_str(),
            "notification.location_update"
        );
    }

    #[test]
    fn routing_key_rejects_wildcards_and_empty_segments() {
        assert!(RoutingKey::new("task.*").is_err());
        assert!(RoutingKey::new("task..created").is_err());
        assert!(RoutingKey::new("").is_err());
        assert!(RoutingKey::new("task.created").is_ok());
    }

    #[test]
    fn notification_kind_parses_known_suffixes() {
        assert_eq!(NotificationKind::parse("broadcast"), Some(NotificationKind::Broadcast));
        assert_eq!(NotificationKind::parse("task_update"), Some(NotificationKind::TaskUpdate));
        assert_eq!(NotificationKind::parse("shipment_update"), None);
    }

    #[test]
    fn pattern_matches_single_segment_wildcard() {
        let pattern = TopicPattern::family("task");
        assert!(pattern.matches("task.created"));
        assert!(pattern.matches("task.deleted"));
        assert!(!pattern.matches("task.created.retry"));
        assert!(!pattern.matches("location.updated"));
        assert!(!pattern.matches("task"));
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = TopicPattern::new("notification.broadcast").unwrap();
        assert!(pattern.matches("notification.broadcast"));
        assert!(!pattern.matches("notification.task_update"));
    }

    #[test]
    fn pattern_rejects_partial_wildcards() {
        assert!(TopicPattern::new("task.cre*").is_err());
        assert!(TopicPattern::new("").is_err());
        assert!(TopicPattern::new("*.*").is_ok());
    }

    proptest! {
        #[test]
        fn family_pattern_matches_any_single_action(action in "[a-z_]{1,16}") {
            let pattern = TopicPattern::family("task");
            let topic = format!("task.{}", action);
            prop_assert!(pattern.matches(&topic));
        }

        #[test]
        fn family_pattern_never_matches_other_families(
            family in "[a-z]{1,8}",
            action in "[a-z_]{1,16}",
        ) {
            prop_assume!(family != "task");
            let pattern = TopicPattern::family("task");
            let topic = format!("{}.{}", family, action);
            prop_assert!(!pattern.matches(&topic));
        }

        #[test]
        fn wildcard_never_spans_segments(
            action in "[a-z_]{1,8}",
            extra in "[a-z_]{1,8}",
        ) {
            let pattern = TopicPattern::family("task");
            let topic = format!("task.{}.{}", action, extra);
            prop_assert!(!pattern.matches(&topic));
        }
    }
}

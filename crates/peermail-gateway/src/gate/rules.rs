//! Ordered accept/reject rule engine.
//!
//! Rules are evaluated in stored order and the first rule whose conditions
//! all hold decides. There is no numeric priority: position is the only
//! signal, which is why `reorder` exists.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use peermail_core::error::{PeerMailError, Result};

use super::matcher::{contains_ci, domain_matches, domain_of, first_header_line, has_attachment};
use super::store::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    Accept,
    Reject,
}

/// Outcome of `evaluate`. `Pending` means no rule matched and the caller
/// decides what to do (hold for review, whitelist, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject,
    Pending,
}

impl From<GateAction> for GateDecision {
    fn from(a: GateAction) -> Self {
        match a {
            GateAction::Accept => GateDecision::Accept,
            GateAction::Reject => GateDecision::Reject,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMatch {
    pub name: String,
    pub value: String,
}

/// Conjunction of optional predicates; an absent field is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_match: Option<HeaderMatch>,
}

/// Persisted rule record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateRule {
    pub id: String,
    pub action: GateAction,
    pub conditions: GateConditions,
    /// Unix epoch milliseconds.
    pub created_at: u64,
}

/// Message under evaluation. `raw` (headers + body) is passed separately.
#[derive(Debug, Clone, Default)]
pub struct GateEntry {
    pub from: String,
    pub subject: String,
    pub content_type: Option<String>,
}

impl GateConditions {
    /// True iff every specified predicate holds.
    pub fn matches(&self, entry: &GateEntry, raw: &str) -> bool {
        if let Some(from) = &self.from {
            if !from.trim().eq_ignore_ascii_case(entry.from.trim()) {
                return false;
            }
        }
        if let Some(pattern) = &self.from_domain {
            if !domain_matches(pattern, domain_of(&entry.from)) {
                return false;
            }
        }
        if let Some(needle) = &self.subject_contains {
            if !contains_ci(&entry.subject, needle) {
                return false;
            }
        }
        if let Some(needle) = &self.body_contains {
            if !contains_ci(raw, needle) {
                return false;
            }
        }
        if let Some(want) = self.has_attachment {
            if has_attachment(entry.content_type.as_deref(), raw) != want {
                return false;
            }
        }
        if let Some(hm) = &self.header_match {
            match first_header_line(raw, &hm.name) {
                Some(v) if contains_ci(&v, &hm.value) => {}
                _ => return false,
            }
        }
        true
    }
}

/// First-match-wins evaluation over an ordered rule list.
pub fn evaluate_rules(rules: &[GateRule], entry: &GateEntry, raw: &str) -> GateDecision {
    rules
        .iter()
        .find(|r| r.conditions.matches(entry, raw))
        .map(|r| {
            debug!(rule = %r.id, action = ?r.action, from = %entry.from, "gate rule matched");
            GateDecision::from(r.action)
        })
        .unwrap_or(GateDecision::Pending)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Rule engine over a repository. The repository is the single source of
/// truth; every CRUD call is load-modify-save under `write_lock`.
pub struct GateEngine {
    store: Box<dyn Repository<GateRule>>,
    write_lock: Mutex<()>,
}

impl GateEngine {
    pub fn new(store: Box<dyn Repository<GateRule>>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn with_write<R>(&self, f: impl FnOnce(&mut Vec<GateRule>) -> Result<R>) -> Result<R> {
        let _g = self
            .write_lock
            .lock()
            .map_err(|_| PeerMailError::Internal("gate write lock poisoned".into()))?;
        let mut rules = self.store.load()?;
        f(&mut rules)
    }

    fn persist(&self, rules: &[GateRule]) -> Result<()> {
        self.store.save(rules).map_err(|e| {
            warn!(error = %e, "gate rules save failed");
            e
        })
    }

    /// Rules in priority order.
    pub fn list(&self) -> Result<Vec<GateRule>> {
        self.store.load()
    }

    pub fn get(&self, id: &str) -> Result<Option<GateRule>> {
        Ok(self.store.load()?.into_iter().find(|r| r.id == id))
    }

    /// Append a new rule with a fresh id and timestamp.
    pub fn add(&self, action: GateAction, conditions: GateConditions) -> Result<GateRule> {
        self.with_write(|rules| {
            let rule = GateRule {
                id: uuid::Uuid::new_v4().to_string(),
                action,
                conditions,
                created_at: now_ms(),
            };
            rules.push(rule.clone());
            self.persist(rules)?;
            Ok(rule)
        })
    }

    /// Replace a rule in place. `Ok(None)` when the id is unknown.
    pub fn update(
        &self,
        id: &str,
        action: GateAction,
        conditions: GateConditions,
    ) -> Result<Option<GateRule>> {
        self.with_write(|rules| {
            let Some(slot) = rules.iter_mut().find(|r| r.id == id) else {
                return Ok(None);
            };
            slot.action = action;
            slot.conditions = conditions;
            let updated = slot.clone();
            self.persist(rules)?;
            Ok(Some(updated))
        })
    }

    /// Delete by id. Persists only when something was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        self.with_write(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != id);
            if rules.len() == before {
                return Ok(false);
            }
            self.persist(rules)?;
            Ok(true)
        })
    }

    /// Listed ids first (in the given order), then the rest in their
    /// previous relative order. Unknown ids are skipped. Always persists.
    pub fn reorder(&self, ordered_ids: &[String]) -> Result<Vec<GateRule>> {
        self.with_write(|rules| {
            let mut rest = std::mem::take(rules);
            let mut out = Vec::with_capacity(rest.len());
            for id in ordered_ids {
                if let Some(pos) = rest.iter().position(|r| &r.id == id) {
                    out.push(rest.remove(pos));
                }
            }
            out.extend(rest);
            self.persist(&out)?;
            Ok(out)
        })
    }

    /// Evaluate against the stored rules. A load failure is logged and
    /// treated as an empty rule set.
    pub fn evaluate(&self, entry: &GateEntry, raw: &str) -> GateDecision {
        match self.store.load() {
            Ok(rules) => evaluate_rules(&rules, entry, raw),
            Err(e) => {
                warn!(error = %e, "gate rules load failed; treating as empty");
                GateDecision::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn rule(id: &str, action: GateAction, conditions: GateConditions) -> GateRule {
        GateRule {
            id: id.into(),
            action,
            conditions,
            created_at: 0,
        }
    }

    fn entry(from: &str, subject: &str) -> GateEntry {
        GateEntry {
            from: from.into(),
            subject: subject.into(),
            content_type: None,
        }
    }

    #[test]
    fn first_match_wins() {
        let rules = vec![
            rule(
                "r1",
                GateAction::Reject,
                GateConditions {
                    subject_contains: Some("viagra".into()),
                    ..Default::default()
                },
            ),
            rule("r2", GateAction::Accept, GateConditions::default()),
            rule("r3", GateAction::Reject, GateConditions::default()),
        ];

        let spam = entry("x@y.org", "Cheap VIAGRA now");
        assert_eq!(evaluate_rules(&rules, &spam, ""), GateDecision::Reject);

        let ok = entry("x@y.org", "lunch?");
        assert_eq!(evaluate_rules(&rules, &ok, ""), GateDecision::Accept);
    }

    #[test]
    fn no_match_is_pending() {
        let rules = vec![rule(
            "r1",
            GateAction::Accept,
            GateConditions {
                from: Some("boss@corp.com".into()),
                ..Default::default()
            },
        )];
        assert_eq!(
            evaluate_rules(&rules, &entry("someone@corp.com", ""), ""),
            GateDecision::Pending
        );
        assert_eq!(evaluate_rules(&[], &entry("a@b", ""), ""), GateDecision::Pending);
    }

    #[test]
    fn conditions_are_a_conjunction() {
        let c = GateConditions {
            from_domain: Some("*.example.com".into()),
            body_contains: Some("invoice".into()),
            ..Default::default()
        };
        let e = entry("billing@a.example.com", "");
        assert!(c.matches(&e, "Subject: x\r\n\r\nYour INVOICE"));
        assert!(!c.matches(&e, "Subject: x\r\n\r\nhello"));
        assert!(!c.matches(&entry("billing@notexample.com", ""), "invoice"));
    }

    #[test]
    fn from_is_case_insensitive_exact() {
        let c = GateConditions {
            from: Some("Alice@Example.com".into()),
            ..Default::default()
        };
        assert!(c.matches(&entry("alice@example.COM", ""), ""));
        assert!(!c.matches(&entry("alice@example.com.evil", ""), ""));
    }

    #[test]
    fn attachment_and_header_conditions() {
        let raw = "X-Mailer: Thunderbird 115\r\nContent-Type: multipart/mixed; boundary=b\r\n\r\n--b\r\n";
        let mut e = entry("a@b", "");
        e.content_type = Some("multipart/mixed; boundary=b".into());

        let with_att = GateConditions {
            has_attachment: Some(true),
            header_match: Some(HeaderMatch {
                name: "x-mailer".into(),
                value: "thunderbird".into(),
            }),
            ..Default::default()
        };
        assert!(with_att.matches(&e, raw));

        let no_att = GateConditions {
            has_attachment: Some(false),
            ..Default::default()
        };
        assert!(!no_att.matches(&e, raw));
        assert!(no_att.matches(&entry("a@b", ""), "Subject: plain\r\n\r\nhi"));
    }

    #[test]
    fn persisted_shape_uses_camel_case() {
        let r = rule(
            "r1",
            GateAction::Accept,
            GateConditions {
                from_domain: Some("*.x.org".into()),
                ..Default::default()
            },
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["action"], "accept");
        assert_eq!(v["conditions"]["fromDomain"], "*.x.org");
        assert!(v["conditions"].get("from").is_none());
        assert_eq!(v["createdAt"], 0);
    }
}

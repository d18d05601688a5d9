//! Age-off rule administration.

use std::ops::RangeInclusive;

use time::Duration;
use tracing::info;

use super::{access, ProvenanceGraph};
use crate::entity::{keys, AgeOffRule};
use crate::error::{ProvenanceError, Result};
use crate::identity::CallerIdentity;
use crate::ids::IdClass;
use crate::model::VertexKind;

/// Allowed maximum execution period, in days.
pub const EXECUTION_PERIOD_DAYS: RangeInclusive<u32> = 1..=90;

fn validate_duration(duration: Duration) -> Result<()> {
    if duration.whole_seconds() <= 0 {
        return Err(ProvenanceError::InvalidDuration(duration.whole_seconds()));
    }
    Ok(())
}

fn validate_period(days: u32) -> Result<()> {
    if !EXECUTION_PERIOD_DAYS.contains(&days) {
        return Err(ProvenanceError::InvalidExecutionPeriod(days));
    }
    Ok(())
}

impl ProvenanceGraph {
    /// Creates a rule and returns its id.
    pub fn add_age_off_rule(
        &self,
        identity: &CallerIdentity,
        name: &str,
        duration: Duration,
        maximum_execution_period: u32,
    ) -> Result<i64> {
        if name.trim().is_empty() {
            return Err(ProvenanceError::InvalidRuleName);
        }
        validate_duration(duration)?;
        validate_period(maximum_execution_period)?;

        let rule_id = self.ids.next_id(IdClass::AgeOffRule)?;
        self.write("add_age_off_rule", |tx| {
            if access::rule_by_name(tx, name)?.is_some() {
                return Err(ProvenanceError::AgeOffRuleNameExists(name.to_owned()));
            }
            tx.add_vertex(
                VertexKind::AgeOffRule,
                AgeOffRule::new_properties(rule_id, name, duration, maximum_execution_period, identity),
            )?;
            Ok(())
        })?;
        info!(rule_id, name, seconds = duration.whole_seconds(), "age-off rule created");
        Ok(rule_id)
    }

    pub fn age_off_rule(&self, name: &str) -> Result<AgeOffRule> {
        self.read("age_off_rule", |tx| {
            access::rule_by_name(tx, name)?
                .ok_or_else(|| ProvenanceError::AgeOffRuleNotFound(name.to_owned()))
        })
    }

    pub fn age_off_rule_by_id(&self, rule_id: i64) -> Result<AgeOffRule> {
        self.read("age_off_rule_by_id", |tx| access::require_rule(tx, rule_id))
    }

    /// Rules sorted by name. `limit == 0` returns every rule; otherwise
    /// `page` (zero-based) selects which `limit`-sized slice to return.
    pub fn all_age_off_rules(&self, limit: usize, page: usize) -> Result<Vec<AgeOffRule>> {
        let mut rules = self.read("all_age_off_rules", access::all_rules)?;
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        if limit == 0 {
            return Ok(rules);
        }
        Ok(rules
            .into_iter()
            .skip(page.saturating_mul(limit))
            .take(limit)
            .collect())
    }

    pub fn count_age_off_rules(&self) -> Result<usize> {
        self.read("count_age_off_rules", |tx| {
            Ok(tx.vertices_of_kind(VertexKind::AgeOffRule)?.len())
        })
    }

    /// Changes a rule's duration and optionally its execution period.
    ///
    /// Only the application that created the rule, or the configured admin
    /// application, may update it.
    pub fn update_age_off_rule(
        &self,
        identity: &CallerIdentity,
        name: &str,
        duration: Duration,
        maximum_execution_period: Option<u32>,
    ) -> Result<()> {
        validate_duration(duration)?;
        if let Some(days) = maximum_execution_period {
            validate_period(days)?;
        }
        self.write("update_age_off_rule", |tx| {
            let rule = access::rule_by_name(tx, name)?
                .ok_or_else(|| ProvenanceError::AgeOffRuleNotFound(name.to_owned()))?;
            let is_admin = self.config.admin_application.as_deref() == Some(identity.application.as_str());
            if rule.created.application != identity.application && !is_admin {
                return Err(ProvenanceError::NotAuthorized(format!(
                    "application {} cannot update rule {name} owned by {}",
                    identity.application, rule.created.application
                )));
            }
            tx.set_vertex_property(rule.vertex_id, keys::DURATION, duration.whole_seconds().into())?;
            if let Some(days) = maximum_execution_period {
                tx.set_vertex_property(
                    rule.vertex_id,
                    keys::MAXIMUM_EXECUTION_PERIOD,
                    i64::from(days).into(),
                )?;
            }
            info!(rule_id = rule.rule_id, name, "age-off rule updated");
            Ok(())
        })
    }
}

use bigskies_core::CoordinatorError;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};

/// `{topic_pattern, resource, action, enabled}` loaded from
/// `protection_rules`, reloadable at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectionRule {
    pub topic_pattern: String,
    pub resource: String,
    pub action: String,
    pub enabled: bool,
}

/// Load every enabled [`ProtectionRule`] from Postgres, the same
/// `sqlx::query` + `Row::get` shape `bigskies-config::store` uses.
pub async fn load_enabled_rules(pool: &PgPool) -> Result<Vec<ProtectionRule>, CoordinatorError> {
    let rows = sqlx::query(
        "SELECT topic_pattern, resource, action, enabled FROM protection_rules WHERE enabled",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ProtectionRule {
            topic_pattern: row.get("topic_pattern"),
            resource: row.get("resource"),
            action: row.get("action"),
            enabled: row.get("enabled"),
        })
        .collect())
}

/// Find the first enabled rule whose `topic_pattern` matches `topic`, in
/// the order `rules` was loaded.
pub fn match_rule<'a>(rules: &'a [ProtectionRule], topic: &str) -> Option<&'a ProtectionRule> {
    rules
        .iter()
        .find(|rule| rule.enabled && bigskies_core::topic::matches(&rule.topic_pattern, topic))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str) -> ProtectionRule {
        ProtectionRule {
            topic_pattern: pattern.to_string(),
            resource: "telescope".into(),
            action: "control".into(),
            enabled: true,
        }
    }

    #[test]
    fn matches_first_applicable_rule() {
        let rules = vec![rule("bigskies/coordinator/telescope/+/slew")];
        let found = match_rule(&rules, "bigskies/coordinator/telescope/0/slew");
        assert!(found.is_some());
    }

    #[test]
    fn disabled_rules_never_match() {
        let mut rules = vec![rule("bigskies/coordinator/telescope/+/slew")];
        rules[0].enabled = false;
        assert!(match_rule(&rules, "bigskies/coordinator/telescope/0/slew").is_none());
    }

    #[test]
    fn unrelated_topic_does_not_match() {
        let rules = vec![rule("bigskies/coordinator/telescope/+/slew")];
        assert!(match_rule(&rules, "bigskies/coordinator/weather/0/status").is_none());
    }
}

//! Settings service and the typed circulation settings snapshot

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::{
    error::AppResult,
    models::enums::EscalationType,
    repository::Repository,
};

/// Typed snapshot of the circulation settings consumed by the engines.
///
/// Loaded once per pass; missing or unparseable keys fall back to defaults.
#[derive(Debug, Clone)]
pub struct CirculationSettings {
    pub borrow_due_days: i64,
    pub renew_limit: i16,
    pub allocation_delay_days: i64,
    pub allocation_due_days: i64,
    pub transfer_limit: i16,
    pub penalty_base_rate: Decimal,
    pub penalty_escalation_type: EscalationType,
    pub penalty_escalation_value: Decimal,
    pub penalty_escalation_interval_days: i32,
    pub holding_carry_over_days: i64,
    pub expired_membership_buffer_days: i64,
}

impl Default for CirculationSettings {
    fn default() -> Self {
        Self {
            borrow_due_days: 14,
            renew_limit: 2,
            allocation_delay_days: 0,
            allocation_due_days: 7,
            transfer_limit: 3,
            penalty_base_rate: Decimal::new(5, 0),
            penalty_escalation_type: EscalationType::Additive,
            penalty_escalation_value: Decimal::new(5, 0),
            penalty_escalation_interval_days: 5,
            holding_carry_over_days: 7,
            expired_membership_buffer_days: 30,
        }
    }
}

impl CirculationSettings {
    /// Build a snapshot from the raw key/value map
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        fn parsed<T: std::str::FromStr>(
            map: &HashMap<String, String>,
            key: &str,
            default: T,
        ) -> T {
            map.get(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        Self {
            borrow_due_days: parsed(map, "borrow_due_days", defaults.borrow_due_days),
            renew_limit: parsed(map, "renew_limit", defaults.renew_limit),
            allocation_delay_days: parsed(map, "allocation_delay_days", defaults.allocation_delay_days),
            allocation_due_days: parsed(map, "allocation_due_days", defaults.allocation_due_days),
            transfer_limit: parsed(map, "transfer_limit", defaults.transfer_limit),
            penalty_base_rate: parsed(map, "penalty_base_rate", defaults.penalty_base_rate),
            penalty_escalation_type: map
                .get("penalty_escalation_type")
                .map(|v| EscalationType::parse(v))
                .unwrap_or(defaults.penalty_escalation_type),
            penalty_escalation_value: parsed(
                map,
                "penalty_escalation_value",
                defaults.penalty_escalation_value,
            ),
            penalty_escalation_interval_days: parsed(
                map,
                "penalty_escalation_interval_days",
                defaults.penalty_escalation_interval_days,
            ),
            holding_carry_over_days: parsed(
                map,
                "holding_carry_over_days",
                defaults.holding_carry_over_days,
            ),
            expired_membership_buffer_days: parsed(
                map,
                "expired_membership_buffer_days",
                defaults.expired_membership_buffer_days,
            ),
        }
    }

    /// Load the current snapshot from the settings store
    pub async fn load(repository: &Repository) -> AppResult<Self> {
        let map = repository.settings.get_map().await?;
        Ok(Self::from_map(&map))
    }
}

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
}

impl SettingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get the current circulation settings
    pub async fn circulation(&self) -> AppResult<CirculationSettings> {
        CirculationSettings::load(&self.repository).await
    }

    /// Update a single setting value
    pub async fn update(&self, key: &str, value: &str) -> AppResult<()> {
        self.repository.settings.set(key, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let settings = CirculationSettings::from_map(&HashMap::new());
        assert_eq!(settings.borrow_due_days, 14);
        assert_eq!(settings.transfer_limit, 3);
        assert_eq!(settings.penalty_escalation_type, EscalationType::Additive);
    }

    #[test]
    fn test_parsed_overrides() {
        let mut map = HashMap::new();
        map.insert("borrow_due_days".to_string(), "21".to_string());
        map.insert("penalty_base_rate".to_string(), "2.50".to_string());
        map.insert("penalty_escalation_type".to_string(), "multiplicative".to_string());
        map.insert("renew_limit".to_string(), "garbage".to_string());

        let settings = CirculationSettings::from_map(&map);
        assert_eq!(settings.borrow_due_days, 21);
        assert_eq!(settings.penalty_base_rate, Decimal::new(250, 2));
        assert_eq!(settings.penalty_escalation_type, EscalationType::Multiplicative);
        // unparseable values fall back
        assert_eq!(settings.renew_limit, 2);
    }
}

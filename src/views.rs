use std::collections::BTreeMap;

use serde_json::Value;

use crate::evaluator::{PermissionQuery, PolicyEvaluator};
use crate::types::User;

/// Record fields carrying financial amounts, removed from serialized
/// records for users without financial access.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "cost",
    "unit_cost",
    "total_cost",
    "margin",
    "profit",
    "revenue",
    "rate",
    "hourly_rate",
    "discount",
    "discount_rate",
];

/// Any one of these permissions grants visibility of financial amounts.
pub const FINANCIAL_PERMISSIONS: &[&str] =
    &["business.financials.view", "reports.financials.view"];

/// Maps UI regions (tabs) and sensitive record fields to required
/// permissions. A pure derivation over the evaluator; nothing here is
/// stored per user.
pub struct DerivedViewResolver {
    evaluator: PolicyEvaluator,
    /// Region id -> permissions, any of which makes the region visible.
    /// An empty list means the region is always visible.
    regions: BTreeMap<String, Vec<String>>,
}

impl DerivedViewResolver {
    /// Resolver with the built-in dashboard region table.
    pub fn new(evaluator: PolicyEvaluator) -> Self {
        let mut regions = BTreeMap::new();
        let table: &[(&str, &[&str])] = &[
            ("home", &[]),
            ("orders", &["business.orders.view"]),
            ("invoices", &["business.invoices.view"]),
            ("inventory", &["inventory.stock.view"]),
            (
                "production",
                &["production.printers.view", "production.jobs.view"],
            ),
            ("team", &["team.members.view", "team.roles.view"]),
            (
                "reports",
                &["reports.summary.view", "reports.financials.view"],
            ),
            ("ai", &["ai.generation.create", "ai.generation.view"]),
            ("settings", &["settings.account.manage"]),
        ];
        for (region, required) in table {
            regions.insert(
                region.to_string(),
                required.iter().map(|p| p.to_string()).collect(),
            );
        }
        Self { evaluator, regions }
    }

    /// Resolver with a caller-supplied region table.
    pub fn with_regions(
        evaluator: PolicyEvaluator,
        regions: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self { evaluator, regions }
    }

    /// Visibility of every configured region for this user.
    pub fn tab_visibility(&self, user: &User) -> BTreeMap<String, bool> {
        self.regions
            .keys()
            .map(|region| (region.clone(), self.is_region_visible(user, region)))
            .collect()
    }

    /// Single-region lookup; unknown regions are not visible.
    pub fn is_region_visible(&self, user: &User, region: &str) -> bool {
        let Some(required) = self.regions.get(region) else {
            return false;
        };
        if required.is_empty() {
            return true;
        }
        let required: Vec<&str> = required.iter().map(String::as_str).collect();
        self.evaluator.evaluate_any(user, &required)
    }

    pub fn can_view_financials(&self, user: &User) -> bool {
        self.evaluator.evaluate_any(user, FINANCIAL_PERMISSIONS)
    }

    /// Shallow copy of `record` with sensitive fields removed (not nulled)
    /// when the user lacks financial access, so serialization omits them
    /// entirely. Non-object values pass through untouched.
    pub fn filter_record(&self, record: &Value, user: &User) -> Value {
        if self.can_view_financials(user) {
            return record.clone();
        }
        match record {
            Value::Object(map) => {
                let filtered = map
                    .iter()
                    .filter(|(key, _)| !SENSITIVE_FIELDS.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Value::Object(filtered)
            }
            other => other.clone(),
        }
    }

    pub fn filter_records(&self, records: &[Value], user: &User) -> Vec<Value> {
        records
            .iter()
            .map(|record| self.filter_record(record, user))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::default_state;
    use serde_json::json;
    use std::sync::Arc;

    fn resolver() -> DerivedViewResolver {
        let state = default_state();
        let evaluator = PolicyEvaluator::new(
            Arc::new(state.catalog),
            Arc::new(parking_lot::RwLock::new(state.roles)),
        );
        DerivedViewResolver::new(evaluator)
    }

    #[test]
    fn test_home_is_visible_to_everyone() {
        let resolver = resolver();
        // Even an unknown role sees regions with no requirements.
        let stranger = User::new("u1", "no-such-role");
        assert!(resolver.is_region_visible(&stranger, "home"));
        assert!(resolver.tab_visibility(&stranger)["home"]);
    }

    #[test]
    fn test_tab_visibility_per_role() {
        let resolver = resolver();
        let worker = User::new("u1", "worker");
        let tabs = resolver.tab_visibility(&worker);
        assert!(tabs["orders"]);
        assert!(tabs["production"]);
        assert!(tabs["inventory"]);
        assert!(!tabs["team"]);
        assert!(!tabs["ai"]);
        assert!(!tabs["settings"]);

        let owner = User::new("u2", "owner");
        assert!(resolver.tab_visibility(&owner).values().all(|v| *v));
    }

    #[test]
    fn test_unknown_region_is_hidden() {
        let resolver = resolver();
        let owner = User::new("u1", "owner");
        assert!(!resolver.is_region_visible(&owner, "warp-drive"));
    }

    #[test]
    fn test_filter_record_redacts_for_non_financial_user() {
        let resolver = resolver();
        let worker = User::new("u1", "worker");
        let record = json!({
            "id": "order-1",
            "status": "printing",
            "cost": 41.50,
            "margin": 0.35,
            "profit": 14.52,
            "quantity": 3
        });

        let filtered = resolver.filter_record(&record, &worker);
        let map = filtered.as_object().unwrap();
        assert!(map.contains_key("id"));
        assert!(map.contains_key("quantity"));
        for field in SENSITIVE_FIELDS {
            assert!(!map.contains_key(*field), "field `{field}` should be gone");
        }
    }

    #[test]
    fn test_filter_record_unchanged_for_financial_user() {
        let resolver = resolver();
        let manager = User::new("u1", "manager");
        assert!(resolver.can_view_financials(&manager));
        let record = json!({ "id": "order-1", "cost": 41.50 });
        assert_eq!(resolver.filter_record(&record, &manager), record);
    }

    #[test]
    fn test_filter_records_maps_collection() {
        let resolver = resolver();
        let viewer = User::new("u1", "viewer");
        let records = vec![
            json!({ "id": "a", "revenue": 10 }),
            json!({ "id": "b", "revenue": 20 }),
        ];
        let filtered = resolver.filter_records(&records, &viewer);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.get("revenue").is_none()));
    }

    #[test]
    fn test_filter_non_object_passes_through() {
        let resolver = resolver();
        let viewer = User::new("u1", "viewer");
        assert_eq!(resolver.filter_record(&json!(42), &viewer), json!(42));
    }
}

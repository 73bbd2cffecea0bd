use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub name: String,
    pub display_name: String,
    pub monthly_price_cents: i64,
    pub student_limit: i64,
    pub features: Vec<String>,
    pub is_active: bool,
}

impl Plan {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }
}

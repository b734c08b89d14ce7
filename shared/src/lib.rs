use serde::{Deserialize, Serialize};

/// One line of a reserve or release request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAmount {
    pub id: i64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageGroup {
    pub is_available: bool,
    pub products: Vec<StockedProduct>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockedProduct {
    pub vendor: String,
    pub name: String,
    pub size: String,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageView {
    pub id: i64,
    pub is_available: bool,
    pub products: Vec<ProductView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub vendor: String,
    pub size: String,
    pub amount: i64,
}

impl ProductAmount {
    pub fn new(id: i64, amount: i64) -> Self {
        Self { id, amount }
    }
}

impl StockedProduct {
    pub fn new(vendor: impl Into<String>, name: impl Into<String>, size: impl Into<String>, amount: i64) -> Self {
        Self {
            vendor: vendor.into(),
            name: name.into(),
            size: size.into(),
            amount,
        }
    }
}

impl StorageView {
    pub fn product_by_vendor(&self, vendor: &str) -> Option<&ProductView> {
        self.products.iter().find(|p| p.vendor == vendor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_group_uses_snake_case_fields() {
        let json = r#"{"is_available":true,"products":[{"vendor":"V-1","name":"Bolt","size":"M8","amount":4}]}"#;
        let group: StorageGroup = serde_json::from_str(json).unwrap();
        assert!(group.is_available);
        assert_eq!(group.products, vec![StockedProduct::new("V-1", "Bolt", "M8", 4)]);
    }

    #[test]
    fn product_amount_parses_request_items() {
        let items: Vec<ProductAmount> = serde_json::from_str(r#"[{"id":3,"amount":12}]"#).unwrap();
        assert_eq!(items, vec![ProductAmount::new(3, 12)]);
    }
}

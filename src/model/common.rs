use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Database identity of products, dimensions, units, items and users.
pub type Id = i64;

/// Validation messages keyed by the form field they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(field, message);
        errors
    }

    /// Keeps the first message recorded for a field.
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_message_per_field_wins() {
        let mut errors = FieldErrors::new();
        errors.insert("quantity", "Enter a number");
        errors.insert("quantity", "Enter a whole number");
        errors.insert("unit_id", "Choose a unit");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("quantity"), Some("Enter a number"));
    }

    #[test]
    fn test_serializes_as_flat_map() {
        let errors = FieldErrors::single("quantity", "Enter a quantity");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json, serde_json::json!({ "quantity": "Enter a quantity" }));
    }
}

//! Field constraint model of a resource and the introspection done on it at registration.

use crate::scope::Scope;
use chrono::format::{Item, StrftimeItems};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Base type of a constrained field. Drives conversion, defaulting and the `<type>.base` check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Any,
    String,
    Number,
    Date,
    Boolean,
}

/// Validation rules for one field.
#[derive(Clone, Debug)]
pub struct Constraint {
    pub field_type: FieldType,
    pub required: bool,
    /// Accept an explicit `null` without a type violation.
    pub nullable: bool,
    /// Applied by the validator when the field is still absent.
    pub default: Option<Value>,
    pub pattern: Option<Regex>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub positive: bool,
    pub integer: bool,
    pub allowed: Option<Vec<Value>>,
    /// chrono format string used when serializing date fields (e.g. "%Y-%m-%d").
    pub date_format: Option<String>,
}

impl Constraint {
    pub fn of(field_type: FieldType) -> Self {
        Constraint {
            field_type,
            required: false,
            nullable: false,
            default: None,
            pattern: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
            positive: false,
            integer: false,
            allowed: None,
            date_format: None,
        }
    }

    pub fn any() -> Self {
        Self::of(FieldType::Any)
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn date() -> Self {
        Self::of(FieldType::Date)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_null(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn pattern(mut self, re: Regex) -> Self {
        self.pattern = Some(re);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }

    pub fn positive(mut self) -> Self {
        self.positive = true;
        self
    }

    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn format(mut self, date_format: impl Into<String>) -> Self {
        self.date_format = Some(date_format.into());
        self
    }
}

/// Entry of a field map: either a real constraint or the marker for fields that must never be
/// read from a payload nor written to a response (computed relations and the like).
#[derive(Clone, Debug)]
pub enum FieldSpec {
    Omitted,
    Validated(Constraint),
}

impl FieldSpec {
    pub fn constraint(&self) -> Option<&Constraint> {
        match self {
            FieldSpec::Omitted => None,
            FieldSpec::Validated(c) => Some(c),
        }
    }

    pub fn is_omitted(&self) -> bool {
        matches!(self, FieldSpec::Omitted)
    }
}

impl From<Constraint> for FieldSpec {
    fn from(c: Constraint) -> Self {
        FieldSpec::Validated(c)
    }
}

/// Whether `format` is a strftime string chrono can render.
pub fn is_valid_date_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Field constraints keyed by attribute name, as the payload carries them.
pub type FieldMap = BTreeMap<String, FieldSpec>;

/// Returns the entries that carry a real constraint.
pub fn extract_validatable_constraints(fields: &FieldMap) -> BTreeMap<&str, &Constraint> {
    fields
        .iter()
        .filter_map(|(k, spec)| spec.constraint().map(|c| (k.as_str(), c)))
        .collect()
}

/// Names of the fields whose constraint has the given type.
pub fn fields_of_type(fields: &FieldMap, field_type: FieldType) -> impl Iterator<Item = &str> {
    fields.iter().filter_map(move |(k, spec)| match spec {
        FieldSpec::Validated(c) if c.field_type == field_type => Some(k.as_str()),
        _ => None,
    })
}

/// Makes every key the scope derives a required field.
///
/// The scope is probed with an empty context, so only its keys matter. Unknown keys get a
/// required `any` constraint; existing constraints are marked required. Omitted entries are left
/// alone (registration rejects them before calling this).
pub fn derive_required_scope_fields(fields: &mut FieldMap, scope: &Scope) {
    for key in scope.keys() {
        match fields.get_mut(&key) {
            None => {
                fields.insert(key, Constraint::any().required().into());
            }
            Some(FieldSpec::Validated(c)) => c.required = true,
            Some(FieldSpec::Omitted) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::RequestContext;
    use serde_json::{json, Map};

    fn name_constraint() -> Constraint {
        Constraint::string().pattern(Regex::new("^[A-Za-z ]*$").unwrap())
    }

    #[test]
    fn test_extract_validatable_constraints() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), name_constraint().into());
        fields.insert("payments".into(), FieldSpec::Omitted);

        let extracted = extract_validatable_constraints(&fields);
        assert_eq!(vec!["name"], extracted.keys().copied().collect::<Vec<_>>());
        assert_eq!(FieldType::String, extracted["name"].field_type);
    }

    #[test]
    fn test_derive_required_scope_fields() {
        let mut fields = FieldMap::new();
        fields.insert("name".into(), name_constraint().into());
        fields.insert("customerId".into(), Constraint::number().into());

        let scope = Scope::new(|ctx: &RequestContext| {
            let mut m = Map::new();
            m.insert("customerId".into(), ctx.param_value("customerId"));
            m.insert("purchaseId".into(), ctx.param_value("purchaseId"));
            m
        });
        derive_required_scope_fields(&mut fields, &scope);

        let name = fields["name"].constraint().unwrap();
        assert!(!name.required);
        let customer_id = fields["customerId"].constraint().unwrap();
        assert!(customer_id.required);
        assert_eq!(FieldType::Number, customer_id.field_type);
        let purchase_id = fields["purchaseId"].constraint().unwrap();
        assert!(purchase_id.required);
        assert_eq!(FieldType::Any, purchase_id.field_type);
    }

    #[test]
    fn test_fields_of_type() {
        let mut fields = FieldMap::new();
        fields.insert("amount".into(), Constraint::number().positive().into());
        fields.insert("date".into(), Constraint::date().format("%Y-%m-%d").into());
        fields.insert("total".into(), Constraint::number().default_value(json!(1)).into());
        fields.insert("items".into(), FieldSpec::Omitted);

        let numbers: Vec<&str> = fields_of_type(&fields, FieldType::Number).collect();
        assert_eq!(vec!["amount", "total"], numbers);
        let dates: Vec<&str> = fields_of_type(&fields, FieldType::Date).collect();
        assert_eq!(vec!["date"], dates);
    }
}

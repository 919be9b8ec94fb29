use serde::Serialize;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// A single rejected field of an incoming payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A payload checked with [`Validate`] that converts into its domain form.
pub trait Checked: Validate + Sized {
    type Output;

    /// Builds the domain form; `None` when a required field is absent.
    fn into_output(self) -> Option<Self::Output>;

    /// Validates every field at once, then converts.
    fn checked(self) -> Result<Self::Output, Vec<FieldViolation>> {
        self.validate().map_err(|errors| field_violations(&errors))?;
        self.into_output()
            .ok_or_else(|| vec![FieldViolation::new("body", "Payload is incomplete")])
    }
}

/// Flattens validator errors into `field` paths as clients spell them,
/// e.g. `orderItems[2].itemId`, sorted by path.
pub fn field_violations(errors: &ValidationErrors) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    collect(errors, "", &mut violations);
    violations.sort_by(|a, b| a.field.cmp(&b.field));
    violations
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut Vec<FieldViolation>) {
    for (field, kind) in errors.errors() {
        let path = format!("{prefix}{}", camel_case(&field.to_string()));
        match kind {
            ValidationErrorsKind::Field(list) => out.extend(list.iter().map(|error| {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| error.code.to_string());
                FieldViolation::new(path.clone(), message)
            })),
            ValidationErrorsKind::Struct(inner) => collect(inner, &format!("{path}."), out),
            ValidationErrorsKind::List(entries) => {
                for (index, inner) in entries {
                    collect(inner, &format!("{path}[{index}]."), out);
                }
            }
        }
    }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_names_follow_the_wire_casing() {
        assert_eq!(camel_case("order_items"), "orderItems");
        assert_eq!(camel_case("item_id"), "itemId");
        assert_eq!(camel_case("name"), "name");
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::validation::Checked;

const PRICE_MAX_INTEGER_DIGITS: u32 = 10;
const PRICE_MAX_FRACTION_DIGITS: u32 = 2;

/// A catalog product that order lines point at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

/// Raw item payload as sent by clients.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ItemInput {
    #[serde(default)]
    #[validate(
        required(message = "Name must not be blank"),
        custom(function = "not_blank"),
        length(max = 255, message = "Name must be at most 255 characters")
    )]
    pub name: Option<String>,
    #[serde(default)]
    #[validate(required(message = "Price must be provided"), custom(function = "valid_price"))]
    pub price: Option<Decimal>,
}

/// Checked item payload used for inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub name: String,
    pub price: Decimal,
}

impl NewItem {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price,
        }
    }
}

impl Checked for ItemInput {
    type Output = NewItem;

    fn into_output(self) -> Option<NewItem> {
        Some(NewItem {
            name: self.name?,
            price: self.price?,
        })
    }
}

fn not_blank(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("Name must not be blank".into()));
    }
    Ok(())
}

fn valid_price(price: &Decimal) -> Result<(), ValidationError> {
    let integer_limit = Decimal::from(10_i64.pow(PRICE_MAX_INTEGER_DIGITS));
    if price.trunc().abs() >= integer_limit || price.normalize().scale() > PRICE_MAX_FRACTION_DIGITS {
        return Err(ValidationError::new("digits").with_message(
            format!(
                "Price must have at most {PRICE_MAX_INTEGER_DIGITS} integer and \
                 {PRICE_MAX_FRACTION_DIGITS} fraction digits"
            )
            .into(),
        ));
    }
    if *price < Decimal::new(1, 2) {
        return Err(ValidationError::new("min").with_message("Price must be at least 0.01".into()));
    }
    Ok(())
}

//! Rules for order fields

use crate::error::{FieldError, StoreError};
use crate::types::{NewOrder, OrderPatch};

/// Maximum total digits of an amount (numeric(10, 2))
const AMOUNT_PRECISION: usize = 10;

/// Maximum fractional digits of an amount
const AMOUNT_SCALE: usize = 2;

fn check_text(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "must not be empty"));
    }
}

fn check_email(value: &str, errors: &mut Vec<FieldError>) {
    match value.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => errors.push(FieldError::new("customerEmail", "must be an email address")),
    }
}

/// Check that `amount` is a non-negative decimal fitting numeric(10, 2)
pub fn validate_amount(amount: &str) -> Option<String> {
    let amount = amount.trim();
    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("'{}' is not a non-negative decimal", amount));
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("'{}' is not a non-negative decimal", amount));
    }
    if fraction.len() > AMOUNT_SCALE {
        return Some(format!("at most {} decimal places allowed", AMOUNT_SCALE));
    }
    if whole.trim_start_matches('0').len() + AMOUNT_SCALE > AMOUNT_PRECISION {
        return Some(format!("at most {} digits allowed", AMOUNT_PRECISION));
    }
    None
}

fn check_amount(value: &str, errors: &mut Vec<FieldError>) {
    if let Some(message) = validate_amount(value) {
        errors.push(FieldError::new("amount", message));
    }
}

fn into_result(errors: Vec<FieldError>) -> Result<(), StoreError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(StoreError::Validation(errors))
    }
}

/// Validate every field of a create payload
pub fn validate_new_order(order: &NewOrder) -> Result<(), StoreError> {
    let mut errors = Vec::new();
    check_text("customerName", &order.customer_name, &mut errors);
    check_email(&order.customer_email, &mut errors);
    check_text("productName", &order.product_name, &mut errors);
    check_text("productSku", &order.product_sku, &mut errors);
    check_amount(&order.amount, &mut errors);
    into_result(errors)
}

/// Validate the fields present in a patch
pub fn validate_order_patch(patch: &OrderPatch) -> Result<(), StoreError> {
    let mut errors = Vec::new();
    if let Some(ref v) = patch.customer_name {
        check_text("customerName", v, &mut errors);
    }
    if let Some(ref v) = patch.customer_email {
        check_email(v, &mut errors);
    }
    if let Some(ref v) = patch.product_name {
        check_text("productName", v, &mut errors);
    }
    if let Some(ref v) = patch.product_sku {
        check_text("productSku", v, &mut errors);
    }
    if let Some(ref v) = patch.amount {
        check_amount(v, &mut errors);
    }
    into_result(errors)
}

//! Stateless markup engine over quote/price payloads.
//!
//! Admins always see base cost; customers see every recognized price-bearing
//! field marked up by their effective ratio. The engine is deliberately NOT
//! idempotent under repeated application with a nonzero ratio: re-marking an
//! already marked-up payload compounds the ratio, and guarding against that
//! is the caller's job.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::domain::user::{User, UserRole};
use crate::pricing::ratio::{clamp_ratio, to_customer_price};

/// Scalar fields the engine will mark up, at any payload level.
const PRICE_FIELDS: &[&str] = &[
    "total",
    "totalCharge",
    "lineCharge",
    "fuelCharge",
    "accessorialCharge",
    "insuranceCharge",
    "rate",
    "cost",
    "price",
    "amount",
];

/// Both spellings appear in carrier payloads.
const ACCESSORIAL_LIST_FIELDS: &[&str] = &["accessorialsList", "accesoriesList"];

/// The ratio a user actually transacts at: zero for admins regardless of any
/// stored value, the clamped stored ratio for customers, zero for anything
/// unrecognized.
pub fn effective_ratio(user: &User) -> Decimal {
    match user.role {
        UserRole::Admin | UserRole::Unknown => Decimal::ZERO,
        UserRole::Customer => clamp_ratio(user.price_ratio).value,
    }
}

/// Apply the user's effective markup to a quote/price payload. Fields that
/// are absent, non-numeric, or not positive are left untouched, and the
/// number-vs-numeric-string type of each field is preserved.
pub fn apply_to_payload(payload: &Value, user: &User) -> Value {
    let ratio = effective_ratio(user);
    if ratio.is_zero() {
        return payload.clone();
    }

    mark_up_value(payload, ratio)
}

fn mark_up_value(value: &Value, ratio: Decimal) -> Value {
    match value {
        Value::Object(object) => Value::Object(mark_up_object(object, ratio)),
        other => other.clone(),
    }
}

fn mark_up_object(object: &Map<String, Value>, ratio: Decimal) -> Map<String, Value> {
    let mut output = object.clone();

    for field in PRICE_FIELDS {
        if let Some(scalar) = object.get(*field) {
            output.insert((*field).to_string(), mark_up_scalar(scalar, ratio));
        }
    }

    if let Some(Value::Object(charges)) = object.get("charges") {
        let marked: Map<String, Value> =
            charges.iter().map(|(key, value)| (key.clone(), mark_up_scalar(value, ratio))).collect();
        output.insert("charges".to_string(), Value::Object(marked));
    }

    for field in ACCESSORIAL_LIST_FIELDS {
        if let Some(Value::Array(entries)) = object.get(*field) {
            let marked: Vec<Value> = entries
                .iter()
                .map(|entry| match entry {
                    Value::Object(item) => {
                        let mut item = item.clone();
                        if let Some(charge) = item.get("chargeAmount") {
                            let charge = mark_up_scalar(charge, ratio);
                            item.insert("chargeAmount".to_string(), charge);
                        }
                        Value::Object(item)
                    }
                    other => other.clone(),
                })
                .collect();
            output.insert((*field).to_string(), Value::Array(marked));
        }
    }

    if let Some(Value::Array(rates)) = object.get("rates") {
        let marked: Vec<Value> = rates.iter().map(|rate| mark_up_value(rate, ratio)).collect();
        output.insert("rates".to_string(), Value::Array(marked));
    }

    output
}

fn mark_up_scalar(value: &Value, ratio: Decimal) -> Value {
    match value {
        Value::Number(number) => {
            let Some(raw) = number.as_f64() else {
                return value.clone();
            };
            let Some(amount) = Decimal::from_f64_retain(raw) else {
                return value.clone();
            };
            if amount <= Decimal::ZERO {
                return value.clone();
            }
            match to_customer_price(amount, ratio) {
                Ok(price) => price
                    .to_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone()),
                Err(_) => value.clone(),
            }
        }
        Value::String(raw) => {
            let Ok(amount) = raw.trim().parse::<Decimal>() else {
                return value.clone();
            };
            if amount <= Decimal::ZERO {
                return value.clone();
            }
            match to_customer_price(amount, ratio) {
                Ok(price) => Value::String(price.to_string()),
                Err(_) => value.clone(),
            }
        }
        other => other.clone(),
    }
}

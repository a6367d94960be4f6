//! Transaction-history workload shared by the commands.

use adaptmap_core::{AdaptiveMap, CoreResult};
use adaptmap_store::{SubKey, Value};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

/// Midnight of the first day loaded by default, in epoch milliseconds.
pub const FIRST_DAY_MS: i64 = 1_583_001_000_000;

const DAY_MS: i64 = 86_400_000;

/// Shape of a history load.
#[derive(Debug, Clone)]
pub struct HistorySpec {
    /// Customer part of every base key.
    pub customer: String,
    /// Epoch milliseconds of the first day.
    pub first_day_ms: i64,
    /// Number of days.
    pub days: u32,
    /// Transactions per day.
    pub per_day: u32,
}

impl HistorySpec {
    /// Base key of each day, in load order.
    pub fn base_keys(&self) -> Vec<String> {
        (0..self.days)
            .map(|day| format!("{}:{}", self.customer, self.day_ms(day)))
            .collect()
    }

    fn day_ms(&self, day: u32) -> i64 {
        self.first_day_ms + i64::from(day) * DAY_MS
    }

    /// Total transactions the load writes.
    pub fn total(&self) -> u64 {
        u64::from(self.days) * u64::from(self.per_day)
    }
}

/// One transaction as the history stores it.
fn transaction(date_ms: SubKey) -> Value {
    let tx = json!({
        "tranId": Uuid::new_v4().to_string(),
        "tranDate": date_ms.to_string(),
        "trnType": "C",
        "tranAmount": 2002.4,
        "partTrnSerialNo": "01",
    });
    Value::Text(tx.to_string())
}

/// Appends one transaction to the list at `sub_key`.
///
/// A map or entry that does not exist yet starts a one-element list.
pub fn append(map: &dyn AdaptiveMap, base_key: &str, sub_key: SubKey) -> CoreResult<()> {
    let list = match map.get(base_key, sub_key) {
        Ok(Value::List(mut items)) => {
            items.push(transaction(sub_key));
            items
        }
        Ok(other) => vec![other, transaction(sub_key)],
        Err(e) if e.is_not_found() => vec![transaction(sub_key)],
        Err(e) => return Err(e),
    };
    map.put(base_key, sub_key, None, Value::List(list))
}

/// Writes the whole history and returns the base keys written.
pub fn load(map: &dyn AdaptiveMap, spec: &HistorySpec) -> CoreResult<Vec<String>> {
    let base_keys = spec.base_keys();
    for (day, base_key) in (0..spec.days).zip(&base_keys) {
        let day_ms = spec.day_ms(day);
        for second in 0..spec.per_day {
            append(map, base_key, day_ms + i64::from(second) * 1000)?;
        }
        debug!(base_key = %base_key, entries = spec.per_day, "loaded day");
    }
    info!(days = spec.days, total = spec.total(), "history loaded");
    Ok(base_keys)
}

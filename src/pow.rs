use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ledger::OverrideLedger;
use crate::projects::normalize_contract_id;
use crate::storage::{KeyValueStore, PROJECT_POW_KEY, VARIATION_ORDERS_KEY};

/// One Program of Works line item. Rows whose item number starts with
/// "PART" are section headers and carry no quantity or unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PowItem {
    pub item_no: String,
    pub description: String,
    pub quantity: String,
    pub unit: String,
}

impl PowItem {
    pub fn is_part_header(&self) -> bool {
        self.item_no.trim().to_uppercase().starts_with("PART")
    }

    fn is_blank(&self) -> bool {
        self.item_no.is_empty()
            && self.description.is_empty()
            && self.quantity.is_empty()
            && self.unit.is_empty()
    }
}

/// Server-side Program of Works record for one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PowRecord {
    pub program_works: Vec<PowItem>,
    pub variation_orders: Vec<Vec<PowItem>>,
    pub updated_at: String,
}

impl PowRecord {
    /// Build a record from a loosely-shaped payload, stamping the write
    /// time.
    pub fn from_payload(payload: &Value) -> PowRecord {
        PowRecord {
            program_works: normalize_pow_items(payload.get("programWorks").unwrap_or(&Value::Null)),
            variation_orders: normalize_variation_orders(
                payload.get("variationOrders").unwrap_or(&Value::Null),
            ),
            updated_at: Utc::now().to_rfc3339(),
        }
    }
}

fn string_field(item: &Value, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(num)) => num.to_string(),
        _ => String::new(),
    }
}

/// Drop blank rows and force PART headers to carry no quantity or unit.
pub fn sanitize_items(items: Vec<PowItem>) -> Vec<PowItem> {
    items
        .into_iter()
        .filter(|item| !item.is_blank())
        .map(|mut item| {
            if item.is_part_header() {
                item.quantity = String::new();
                item.unit = String::new();
            }
            item
        })
        .collect()
}

/// Coerce any of the historical stored shapes into a clean item list:
/// arrays of objects, arrays of bare item-number strings, or a JSON
/// string wrapping either. Anything unreadable degrades to empty.
pub fn normalize_pow_items(value: &Value) -> Vec<PowItem> {
    match value {
        Value::Array(entries) => {
            let items = entries
                .iter()
                .map(|entry| match entry {
                    Value::String(text) => PowItem {
                        item_no: text.clone(),
                        ..PowItem::default()
                    },
                    _ => PowItem {
                        item_no: string_field(entry, "itemNo"),
                        description: string_field(entry, "description"),
                        quantity: string_field(entry, "quantity"),
                        unit: string_field(entry, "unit"),
                    },
                })
                .collect();
            sanitize_items(items)
        }
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(parsed) => normalize_pow_items(&parsed),
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Coerce a stored variation-order value into ordered snapshots. A legacy
/// flat item list reads back as a single snapshot.
pub fn normalize_variation_orders(value: &Value) -> Vec<Vec<PowItem>> {
    let entries = match value {
        Value::Array(entries) => entries,
        _ => return Vec::new(),
    };
    if !entries.is_empty() && !entries[0].is_array() {
        let one = normalize_pow_items(value);
        return if one.is_empty() { Vec::new() } else { vec![one] };
    }
    entries
        .iter()
        .map(normalize_pow_items)
        .filter(|items| !items.is_empty())
        .collect()
}

fn pow_ledger() -> OverrideLedger<Value> {
    OverrideLedger::new(PROJECT_POW_KEY)
}

fn variation_ledger() -> OverrideLedger<Value> {
    OverrideLedger::new(VARIATION_ORDERS_KEY)
}

pub fn project_pow(store: &dyn KeyValueStore, contract_id: &str) -> Vec<PowItem> {
    let key = normalize_contract_id(contract_id);
    match pow_ledger().get(store, &key) {
        Some(value) => normalize_pow_items(&value),
        None => Vec::new(),
    }
}

pub fn set_project_pow(store: &mut dyn KeyValueStore, contract_id: &str, items: Vec<PowItem>) {
    let key = normalize_contract_id(contract_id);
    if key.is_empty() {
        return;
    }
    let items = sanitize_items(items);
    if let Ok(value) = serde_json::to_value(items) {
        pow_ledger().set(store, &key, value);
    }
}

/// Store the same item list under several contracts at once (joint
/// contracts share a Program of Works).
pub fn set_project_pow_multi(
    store: &mut dyn KeyValueStore,
    contract_ids: &[&str],
    items: Vec<PowItem>,
) {
    let items = sanitize_items(items);
    for contract_id in contract_ids {
        set_project_pow(store, contract_id, items.clone());
    }
}

pub fn variation_orders(store: &dyn KeyValueStore, contract_id: &str) -> Vec<Vec<PowItem>> {
    let key = normalize_contract_id(contract_id);
    match variation_ledger().get(store, &key) {
        Some(value) => normalize_variation_orders(&value),
        None => Vec::new(),
    }
}

pub fn set_variation_orders(
    store: &mut dyn KeyValueStore,
    contract_id: &str,
    orders: Vec<Vec<PowItem>>,
) {
    let key = normalize_contract_id(contract_id);
    if key.is_empty() {
        return;
    }
    let orders: Vec<Vec<PowItem>> = orders.into_iter().map(sanitize_items).collect();
    if let Ok(value) = serde_json::to_value(orders) {
        variation_ledger().set(store, &key, value);
    }
}

/// Append a point-in-time snapshot of the Program of Works as a new
/// variation order. Prior snapshots are never touched.
pub fn append_variation_order(
    store: &mut dyn KeyValueStore,
    contract_id: &str,
    snapshot: Vec<PowItem>,
) {
    let key = normalize_contract_id(contract_id);
    if key.is_empty() {
        return;
    }
    let mut orders = variation_orders(store, &key);
    let snapshot = sanitize_items(snapshot);
    if snapshot.is_empty() {
        return;
    }
    orders.push(snapshot);
    set_variation_orders(store, &key, orders);
}

fn pow_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(std::time::Duration::from_secs(10))
        .build()
}

/// Fetch a contract's Program of Works record from the remote API.
/// Returns `None` when no endpoint or contract id is available.
pub fn fetch_pow_remote(base_url: &str, contract_id: &str) -> Result<Option<PowRecord>, String> {
    let base = base_url.trim().trim_end_matches('/');
    let key = normalize_contract_id(contract_id);
    if base.is_empty() || key.is_empty() {
        return Ok(None);
    }
    let response = pow_agent()
        .get(&format!("{}/api/pow/{}", base, urlencoding::encode(&key)))
        .call()
        .map_err(|e| e.to_string())?;
    let data: Value = response
        .into_json()
        .map_err(|_| "Failed to load Program of Works.".to_string())?;
    if data.get("success").and_then(Value::as_bool) != Some(true) {
        let error = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Failed to load Program of Works.");
        return Err(error.to_string());
    }
    let orders = data
        .get("variationOrders")
        .or_else(|| data.get("variationOrder"))
        .cloned()
        .unwrap_or(Value::Null);
    Ok(Some(PowRecord {
        program_works: normalize_pow_items(data.get("programWorks").unwrap_or(&Value::Null)),
        variation_orders: normalize_variation_orders(&orders),
        updated_at: data
            .get("updatedAt")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    }))
}

/// Push the locally stored Program of Works and variation orders for a
/// contract to the remote API.
pub fn sync_pow_to_remote(
    base_url: &str,
    store: &dyn KeyValueStore,
    contract_id: &str,
) -> Result<(), String> {
    let base = base_url.trim().trim_end_matches('/');
    let key = normalize_contract_id(contract_id);
    if base.is_empty() || key.is_empty() {
        return Ok(());
    }
    let payload = serde_json::json!({
        "programWorks": project_pow(store, &key),
        "variationOrders": variation_orders(store, &key),
    });
    let response = pow_agent()
        .put(&format!("{}/api/pow/{}", base, urlencoding::encode(&key)))
        .send_json(payload)
        .map_err(|e| e.to_string())?;
    let data: Value = response
        .into_json()
        .map_err(|_| "Failed to save Program of Works.".to_string())?;
    if data.get("success").and_then(Value::as_bool) != Some(true) {
        let error = data
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Failed to save Program of Works.");
        return Err(error.to_string());
    }
    Ok(())
}

/// Replace the local Program of Works and variation orders with the
/// remote record, but only when the remote actually has content.
/// Returns whether anything was replaced.
pub fn hydrate_pow_from_remote(
    base_url: &str,
    store: &mut dyn KeyValueStore,
    contract_id: &str,
) -> Result<bool, String> {
    let key = normalize_contract_id(contract_id);
    let remote = match fetch_pow_remote(base_url, &key)? {
        Some(remote) => remote,
        None => return Ok(false),
    };
    if remote.program_works.is_empty() && remote.variation_orders.is_empty() {
        return Ok(false);
    }
    set_project_pow(store, &key, remote.program_works);
    set_variation_orders(store, &key, remote.variation_orders);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn item(no: &str, desc: &str, qty: &str, unit: &str) -> PowItem {
        PowItem {
            item_no: no.into(),
            description: desc.into(),
            quantity: qty.into(),
            unit: unit.into(),
        }
    }

    #[test]
    fn part_headers_round_trip_without_quantity_or_unit() {
        let mut store = MemoryStore::new();
        set_project_pow(
            &mut store,
            "AB-1",
            vec![
                item("Part I", "General Requirements", "12", "ls"),
                item("801(1)", "Clearing and grubbing", "1.0", "ha"),
            ],
        );
        let stored = project_pow(&store, "ab-1");
        assert_eq!(stored[0].quantity, "");
        assert_eq!(stored[0].unit, "");
        assert_eq!(stored[1].quantity, "1.0");
    }

    #[test]
    fn normalization_accepts_legacy_shapes() {
        let from_strings = normalize_pow_items(&json!(["Item 100", "Item 101"]));
        assert_eq!(from_strings[0].item_no, "Item 100");
        assert_eq!(from_strings[0].description, "");

        let from_wrapped =
            normalize_pow_items(&json!("[{\"itemNo\":\"100\",\"quantity\":3}]"));
        assert_eq!(from_wrapped[0].item_no, "100");
        assert_eq!(from_wrapped[0].quantity, "3");

        assert!(normalize_pow_items(&json!("not json")).is_empty());
        assert!(normalize_pow_items(&json!({"itemNo": "x"})).is_empty());
    }

    #[test]
    fn blank_rows_are_dropped() {
        let items = normalize_pow_items(&json!([
            {"itemNo": "", "description": "", "quantity": "", "unit": ""},
            {"itemNo": "100"}
        ]));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_no, "100");
    }

    #[test]
    fn flat_legacy_list_reads_as_one_variation_order() {
        let orders = normalize_variation_orders(&json!([
            {"itemNo": "100", "description": "Earthworks"}
        ]));
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0][0].item_no, "100");
    }

    #[test]
    fn append_never_mutates_prior_orders() {
        let mut store = MemoryStore::new();
        append_variation_order(&mut store, "AB-1", vec![item("100", "Earthworks", "5", "cu.m")]);

        let before = variation_orders(&store, "AB-1");
        append_variation_order(&mut store, "AB-1", vec![item("101", "Drainage", "2", "ln.m")]);
        let after = variation_orders(&store, "AB-1");

        assert_eq!(after.len(), 2);
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1][0].item_no, "101");
    }

    #[test]
    fn empty_snapshot_is_not_appended() {
        let mut store = MemoryStore::new();
        append_variation_order(&mut store, "AB-1", Vec::new());
        assert!(variation_orders(&store, "AB-1").is_empty());
    }

    #[test]
    fn pow_record_normalizes_payload() {
        let record = PowRecord::from_payload(&json!({
            "programWorks": [{"itemNo": "PART II", "quantity": "4", "unit": "ls"}],
            "variationOrders": [[{"itemNo": "100", "description": "Earthworks"}]]
        }));
        assert_eq!(record.program_works[0].quantity, "");
        assert_eq!(record.variation_orders[0][0].item_no, "100");
        assert!(!record.updated_at.is_empty());
    }

    #[test]
    fn remote_sync_is_a_no_op_without_an_endpoint() {
        let mut store = MemoryStore::new();
        assert_eq!(fetch_pow_remote("", "AB-1").unwrap(), None);
        assert!(sync_pow_to_remote("", &store, "AB-1").is_ok());
        assert!(!hydrate_pow_from_remote("", &mut store, "AB-1").unwrap());
        assert_eq!(fetch_pow_remote("http://localhost:3000", "  ").unwrap(), None);
    }

    #[test]
    fn dead_remote_surfaces_an_error() {
        // nothing listens on the discard port
        assert!(fetch_pow_remote("http://127.0.0.1:9", "AB-1").is_err());
        let store = MemoryStore::new();
        assert!(sync_pow_to_remote("http://127.0.0.1:9", &store, "AB-1").is_err());
    }

    #[test]
    fn shared_pow_lands_under_every_contract() {
        let mut store = MemoryStore::new();
        set_project_pow_multi(&mut store, &["ab-1", " cd-2 "], vec![item("100", "", "1", "ls")]);
        assert_eq!(project_pow(&store, "AB-1").len(), 1);
        assert_eq!(project_pow(&store, "CD-2").len(), 1);
    }
}

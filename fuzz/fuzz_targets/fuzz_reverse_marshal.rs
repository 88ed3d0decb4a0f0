#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use vhb_core::{to_engine_value, to_host_value};

/// Same shape, with numbers compared after the f64 round trip.
fn same_shape(host: &Value, back: &Value) -> bool {
    match (host, back) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_shape(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).is_some_and(|other| same_shape(v, other)))
        }
        _ => host == back,
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() > 16384 {
        return;
    }
    let Ok(host) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let engine = to_engine_value(&host);
    let back = to_host_value(&engine, None).expect("plain JSON shapes always marshal back");
    assert!(same_shape(&host, &back), "shape changed: {host} -> {back}");
});

//! Splitting per-rank arguments into contiguous chunks.

use std::cmp::Ordering;

use serde_json::Value;

const fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array <
/// object, numbers compared numerically.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (x, y) in x.iter().zip(y) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(_), Value::Object(_)) => a.to_string().cmp(&b.to_string()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Sort `args` and split them into at most `nprocs` contiguous chunks of
/// `ceil(len / nprocs)` items, the last chunk taking the remainder. Workers
/// that would be left without items are dropped, so the number of chunks
/// returned is the effective process count.
#[must_use]
pub fn partition(mut args: Vec<Value>, nprocs: u64) -> Vec<Vec<Value>> {
    if args.is_empty() || nprocs == 0 {
        return Vec::new();
    }

    args.sort_by(compare_values);

    let len = args.len();
    let mut nprocs = usize::try_from(nprocs).unwrap_or(usize::MAX).min(len);
    let chunk = len.div_ceil(nprocs);

    if nprocs * chunk > len {
        nprocs -= (nprocs * chunk - len) / chunk;
    }

    let mut chunks = Vec::with_capacity(nprocs);
    let mut rest = args.into_iter();
    for _ in 0..nprocs - 1 {
        chunks.push(rest.by_ref().take(chunk).collect());
    }
    chunks.push(rest.collect());
    chunks
}

//! Page-sized slices of list results

use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{BridgeResult, SessionError};

pub const RESULTS_PER_PAGE: usize = 10;

/// Number of pages needed for `len` items
pub fn page_count(len: usize) -> usize {
    len.div_ceil(RESULTS_PER_PAGE)
}

/// `{"result": [...], "num_pages": n}` for a zero-based page.
///
/// Pages past the end yield an empty `result`.
pub fn paginate<T: Serialize>(items: &[T], page: usize) -> BridgeResult<Value> {
    let start = page.saturating_mul(RESULTS_PER_PAGE).min(items.len());
    let end = start.saturating_add(RESULTS_PER_PAGE).min(items.len());
    let slice = serde_json::to_value(&items[start..end]).map_err(SessionError::from)?;

    Ok(json!({
        "result": slice,
        "num_pages": page_count(items.len()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(10), 1);
        assert_eq!(page_count(11), 2);
    }

    #[test]
    fn test_paginate_slices() {
        let items: Vec<u32> = (0..23).collect();

        let first = paginate(&items, 0).unwrap();
        assert_eq!(first["num_pages"], 3);
        assert_eq!(first["result"].as_array().unwrap().len(), 10);

        let last = paginate(&items, 2).unwrap();
        assert_eq!(last["result"], json!([20, 21, 22]));
    }

    #[test]
    fn test_paginate_past_end_is_empty() {
        let items = vec!["a", "b"];
        let page = paginate(&items, 7).unwrap();
        assert_eq!(page["result"], json!([]));
        assert_eq!(page["num_pages"], 1);

        let huge = paginate(&items, usize::MAX).unwrap();
        assert_eq!(huge["result"], json!([]));
    }
}

//! JSON serialization of spots and per-stage results.
//!
//! Output is pretty-printed with two-space indentation. Stage results
//! come out in key order because [`StageResults`] is a `BTreeMap`.

use spotdiff_pipeline::{Spot, StageResults};

/// Serialize spots as a pretty JSON array.
///
/// # Errors
///
/// Returns an error only if serialization itself fails, which cannot
/// happen for finite coordinates.
pub fn spots_to_json(spots: &[Spot]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(spots)
}

/// Serialize accepted spots for every stage as one JSON object.
///
/// # Errors
///
/// Same as [`spots_to_json`].
pub fn stage_results_to_json(results: &StageResults) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(results)
}

/// Parse a previously written stage results document.
///
/// # Errors
///
/// Returns an error if `json` is not an object of spot arrays.
pub fn stage_results_from_json(json: &str) -> Result<StageResults, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use spotdiff_pipeline::normalize::normalize;
    use spotdiff_pipeline::{BoundingBox, Dimensions};

    fn sample() -> Vec<Spot> {
        normalize(
            &[BoundingBox::new(30, 30, 40, 40)],
            Dimensions {
                width: 100,
                height: 100,
            },
        )
    }

    #[test]
    fn spot_fields_are_emitted() {
        let json = spots_to_json(&sample()).unwrap();
        for key in [
            "\"id\": 1",
            "\"x\": 30",
            "\"y\": 30",
            "\"width\": 40",
            "\"height\": 40",
            "\"center_x\": 50",
            "\"center_y\": 50",
            "\"relative_x\": 0.5",
            "\"relative_y\": 0.5",
            "\"relative_radius\": 0.24",
        ] {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }

    #[test]
    fn empty_spots_is_empty_array() {
        assert_eq!(spots_to_json(&[]).unwrap(), "[]");
    }

    #[test]
    fn stage_results_are_key_ordered_and_reparse() {
        let mut results = StageResults::new();
        results.insert("2-1".to_owned(), sample());
        results.insert("1-10".to_owned(), Vec::new());
        let json = stage_results_to_json(&results).unwrap();
        assert!(json.find("\"1-10\"").unwrap() < json.find("\"2-1\"").unwrap());
        let parsed = stage_results_from_json(&json).unwrap();
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["1-10", "2-1"]);
        assert_eq!(parsed["2-1"][0].bbox(), results["2-1"][0].bbox());
    }

    #[test]
    fn malformed_results_fail_to_parse() {
        assert!(stage_results_from_json("[1, 2]").is_err());
    }
}

//! Defect classification from raw detections
//!
//! Error types: 0 = discoloration, 1 = hole, 2..=5 = knot variants
//! (dead / tight-dead / tight-live / live). Any knot defect makes the
//! primary result 節あり when the longest knot exceeds 10 mm, otherwise
//! こぶし; with no knot defects the board is 無欠点. The secondary
//! annotation (hole / discoloration) is independent of the primary.

use crate::models::Detection;

pub const RESULT_KNOT: &str = "節あり";
pub const RESULT_KOBUSHI: &str = "こぶし";
pub const RESULT_NO_DEFECT: &str = "無欠点";

pub const DEFECT_HOLE_AND_DISCOLORATION: &str = "穴・変色";
pub const DEFECT_HOLE: &str = "穴";
pub const DEFECT_DISCOLORATION: &str = "変色";

const ERROR_TYPE_DISCOLORATION: u8 = 0;
const ERROR_TYPE_HOLE: u8 = 1;

/// Knot length above which the primary result is 節あり (millimeters)
pub const KNOT_LENGTH_THRESHOLD_MM: f64 = 10.0;

/// Whether an error type is one of the four knot classes
pub fn is_knot(error_type: u8) -> bool {
    (2..=5).contains(&error_type)
}

/// Primary result plus secondary defect annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub result: &'static str,
    pub defect_type: &'static str,
}

/// Classify a detection list into the displayed result tuple
pub fn classify(detections: &[Detection]) -> Classification {
    let max_knot_length = detections
        .iter()
        .filter(|d| is_knot(d.error_type))
        .map(|d| d.length_mm)
        .fold(None::<f64>, |acc, len| {
            Some(acc.map_or(len, |a| a.max(len)))
        });

    let result = match max_knot_length {
        Some(len) if len > KNOT_LENGTH_THRESHOLD_MM => RESULT_KNOT,
        Some(_) => RESULT_KOBUSHI,
        None => RESULT_NO_DEFECT,
    };

    let has_hole = detections.iter().any(|d| d.error_type == ERROR_TYPE_HOLE);
    let has_discoloration = detections
        .iter()
        .any(|d| d.error_type == ERROR_TYPE_DISCOLORATION);

    let defect_type = match (has_hole, has_discoloration) {
        (true, true) => DEFECT_HOLE_AND_DISCOLORATION,
        (true, false) => DEFECT_HOLE,
        (false, true) => DEFECT_DISCOLORATION,
        (false, false) => "",
    };

    Classification {
        result,
        defect_type,
    }
}

/// Whether a displayed result string represents a defective board
pub fn is_defective(result: &str) -> bool {
    !result.is_empty() && result != RESULT_NO_DEFECT
}

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::enums::ResultSource;

/// One screening event: an uploaded eye photo and its anemia verdict.
///
/// Scans are append-only. Verdict and confidence never change after insert,
/// apart from the legacy single-field result correction path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    /// Short random token identifying the scan (8 chars).
    pub scan_id: String,
    /// Serving path of the original uploaded photo (`/scans/scan-<id>.<ext>`).
    pub photo_url: String,
    /// True when anemia was detected.
    pub scan_result: bool,
    /// Probability assigned to the detected label, in [0, 1].
    pub confidence: f64,
    /// Whether the verdict came from the model or from the local fallback.
    pub result_source: ResultSource,
    pub scan_date: NaiveDateTime,
}

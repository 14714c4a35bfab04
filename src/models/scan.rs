use serde::{Deserialize, Serialize};

/// Body posted to the scan endpoint.
#[derive(Debug, Serialize)]
pub struct ScanRequest {
    pub barcode: String,
    pub location: String,
}

/// Verdict payload returned by the scan endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanReport {
    pub matched: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub instrument_number: Option<String>,
    #[serde(default)]
    pub manufacturer_serial: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expected_location: Option<String>,
    #[serde(default)]
    pub actual_location: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
}

impl ScanReport {
    pub fn match_status(&self) -> MatchStatus {
        MatchStatus::parse(self.status.as_deref())
    }
}

/// Location verdict for a matched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    CorrectLocation,
    WrongLocation,
    NoLocationInSystem,
    /// Any unrecognized or absent status. Rendered as a generic match.
    Other,
}

impl MatchStatus {
    pub fn parse(status: Option<&str>) -> Self {
        match status {
            Some("CORRECT_LOCATION") => MatchStatus::CorrectLocation,
            Some("WRONG_LOCATION") => MatchStatus::WrongLocation,
            Some("NO_LOCATION_IN_SYSTEM") => MatchStatus::NoLocationInSystem,
            _ => MatchStatus::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_is_permissive() {
        assert_eq!(
            MatchStatus::parse(Some("CORRECT_LOCATION")),
            MatchStatus::CorrectLocation
        );
        assert_eq!(
            MatchStatus::parse(Some("WRONG_LOCATION")),
            MatchStatus::WrongLocation
        );
        assert_eq!(
            MatchStatus::parse(Some("NO_LOCATION_IN_SYSTEM")),
            MatchStatus::NoLocationInSystem
        );
        assert_eq!(MatchStatus::parse(Some("SOMETHING_NEW")), MatchStatus::Other);
        assert_eq!(MatchStatus::parse(None), MatchStatus::Other);
    }

    #[test]
    fn report_deserializes_with_sparse_fields() {
        let report: ScanReport =
            serde_json::from_str(r#"{"matched": false, "barcode": "INV-9"}"#).unwrap();
        assert!(!report.matched);
        assert_eq!(report.barcode.as_deref(), Some("INV-9"));
        assert!(report.description.is_none());
        assert_eq!(report.match_status(), MatchStatus::Other);
    }
}

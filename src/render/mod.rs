use std::time::{Duration, Instant};

use colored::*;

use crate::models::{InventoryStats, MatchStatus, ScanReport};

/// How long a shown verdict stays on screen.
pub const PANEL_DISPLAY_WINDOW: Duration = Duration::from_secs(5);

/// Shown in every stats field when the service cannot be reached.
pub const STAT_UNAVAILABLE: &str = "...";

/// The five mutually exclusive verdict templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Scanned but not in inventory.
    Overage,
    CorrectLocation,
    WrongLocation,
    NoLocationInSystem,
    /// Matched with an unrecognized or absent status.
    Found,
}

impl Verdict {
    /// Template selection is a pure function of the report.
    pub fn of(report: &ScanReport) -> Self {
        if !report.matched {
            return Verdict::Overage;
        }
        match report.match_status() {
            MatchStatus::CorrectLocation => Verdict::CorrectLocation,
            MatchStatus::WrongLocation => Verdict::WrongLocation,
            MatchStatus::NoLocationInSystem => Verdict::NoLocationInSystem,
            MatchStatus::Other => Verdict::Found,
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Verdict::Overage => "NOT FOUND - Overage",
            Verdict::CorrectLocation => "MATCH - Correct Location",
            Verdict::WrongLocation => "MATCH - Wrong Location",
            Verdict::NoLocationInSystem => "MATCH - No Location in System",
            Verdict::Found => "MATCH - Found",
        }
    }
}

fn field(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

fn location(value: Option<&str>) -> &str {
    value.unwrap_or("Not specified")
}

fn item_lines(report: &ScanReport) -> Vec<String> {
    vec![
        format!("Instrument: {}", field(report.instrument_number.as_deref())),
        format!("Serial: {}", field(report.manufacturer_serial.as_deref())),
        format!("Description: {}", field(report.description.as_deref())),
    ]
}

/// Body lines for a report, keyed by its template.
pub fn verdict_lines(report: &ScanReport) -> Vec<String> {
    match Verdict::of(report) {
        Verdict::Overage => vec![
            format!("Barcode: {}", field(report.barcode.as_deref())),
            String::from("Status: This item is not in the inventory system"),
            format!("Location: {}", location(report.actual_location.as_deref())),
        ],
        Verdict::CorrectLocation => {
            let mut lines = item_lines(report);
            lines.push(format!(
                "Location: {}",
                field(report.expected_location.as_deref())
            ));
            lines
        }
        Verdict::WrongLocation => {
            let mut lines = item_lines(report);
            lines.push(format!(
                "Expected Location: {}",
                field(report.expected_location.as_deref())
            ));
            lines.push(format!(
                "Actual Location: {}",
                location(report.actual_location.as_deref())
            ));
            lines
        }
        Verdict::NoLocationInSystem => {
            let mut lines = item_lines(report);
            lines.push(String::from(
                "Note: This item has no location recorded in the system",
            ));
            lines
        }
        Verdict::Found => {
            let mut lines = item_lines(report);
            lines.push(format!(
                "Expected Location: {}",
                field(report.expected_location.as_deref())
            ));
            lines
        }
    }
}

/// Print a verdict panel to the terminal.
pub fn print_report(report: &ScanReport) {
    let verdict = Verdict::of(report);
    let heading = match verdict {
        Verdict::Overage => verdict.heading().red().bold(),
        Verdict::WrongLocation | Verdict::NoLocationInSystem => verdict.heading().yellow().bold(),
        Verdict::CorrectLocation | Verdict::Found => verdict.heading().green().bold(),
    };

    println!("\n{}", heading);
    for line in verdict_lines(report) {
        println!("  {}", line);
    }
    println!();
}

/// Transient verdict display. A shown verdict hides itself after the display
/// window; showing a newer one restarts the window.
#[derive(Debug, Default)]
pub struct ResultPanel {
    current: Option<(ScanReport, Instant)>,
    generation: u64,
}

impl ResultPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the generation of this show, so a hide timer can tell whether
    /// it has been superseded.
    pub fn show(&mut self, report: ScanReport) -> u64 {
        self.generation += 1;
        self.current = Some((report, Instant::now()));
        self.generation
    }

    pub fn hide(&mut self) {
        self.current = None;
    }

    /// Clears the panel only if no newer show happened since `generation`.
    pub fn hide_if_current(&mut self, generation: u64) {
        if self.generation == generation {
            self.current = None;
        }
    }

    pub fn visible_at(&self, now: Instant) -> bool {
        match &self.current {
            Some((_, shown)) => now.duration_since(*shown) < PANEL_DISPLAY_WINDOW,
            None => false,
        }
    }

    pub fn visible(&self) -> bool {
        self.visible_at(Instant::now())
    }

    pub fn report(&self) -> Option<&ScanReport> {
        self.current.as_ref().map(|(report, _)| report)
    }
}

/// The five aggregate display fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsBoard {
    pub total_items: String,
    pub matched_scans: String,
    pub shortages: String,
    pub overages: String,
    pub wrong_locations: String,
}

impl Default for StatsBoard {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl StatsBoard {
    pub fn unavailable() -> Self {
        Self {
            total_items: STAT_UNAVAILABLE.to_string(),
            matched_scans: STAT_UNAVAILABLE.to_string(),
            shortages: STAT_UNAVAILABLE.to_string(),
            overages: STAT_UNAVAILABLE.to_string(),
            wrong_locations: STAT_UNAVAILABLE.to_string(),
        }
    }

    pub fn apply(&mut self, stats: &InventoryStats) {
        self.total_items = stats.total_items.to_string();
        self.matched_scans = stats.matched_scans.to_string();
        self.shortages = stats.shortages.to_string();
        self.overages = stats.overages.to_string();
        self.wrong_locations = stats.wrong_locations.to_string();
    }

    pub fn mark_unavailable(&mut self) {
        *self = Self::unavailable();
    }
}

/// Print the stats board.
pub fn print_board(board: &StatsBoard) {
    println!("\n{}", "Inventory Statistics:".green().bold());
    println!("  Total Items:    {}", board.total_items.cyan());
    println!("  Matched Scans:  {}", board.matched_scans.green());
    println!("  Shortages:      {}", board.shortages.yellow());
    println!("  Overages:       {}", board.overages.red());
    println!("  Wrong Location: {}", board.wrong_locations.yellow());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(matched: bool, status: Option<&str>) -> ScanReport {
        ScanReport {
            matched,
            status: status.map(str::to_string),
            instrument_number: None,
            manufacturer_serial: None,
            description: None,
            expected_location: None,
            actual_location: None,
            barcode: None,
        }
    }

    #[test]
    fn unmatched_always_renders_overage_with_barcode() {
        // An unmatched report is an overage even if the service sent a status.
        let mut r = report(false, Some("CORRECT_LOCATION"));
        r.barcode = Some("INV-77".to_string());

        assert_eq!(Verdict::of(&r), Verdict::Overage);
        assert!(verdict_lines(&r).iter().any(|l| l.contains("INV-77")));
    }

    #[test]
    fn matched_template_follows_status() {
        let cases = [
            (Some("CORRECT_LOCATION"), Verdict::CorrectLocation),
            (Some("WRONG_LOCATION"), Verdict::WrongLocation),
            (Some("NO_LOCATION_IN_SYSTEM"), Verdict::NoLocationInSystem),
            (Some("SOMETHING_ELSE"), Verdict::Found),
            (None, Verdict::Found),
        ];
        for (status, expected) in cases {
            assert_eq!(Verdict::of(&report(true, status)), expected);
        }
    }

    #[test]
    fn wrong_location_shows_expected_and_actual() {
        let mut r = report(true, Some("WRONG_LOCATION"));
        r.expected_location = Some("A1".to_string());
        r.actual_location = Some("B2".to_string());

        let lines = verdict_lines(&r);
        assert!(lines.contains(&"Expected Location: A1".to_string()));
        assert!(lines.contains(&"Actual Location: B2".to_string()));
    }

    #[test]
    fn absent_fields_render_placeholders() {
        let lines = verdict_lines(&report(true, Some("CORRECT_LOCATION")));
        assert!(lines.iter().any(|l| l == "Instrument: N/A"));

        let lines = verdict_lines(&report(false, None));
        assert!(lines.iter().any(|l| l == "Location: Not specified"));
    }

    #[test]
    fn panel_hides_after_display_window() {
        let mut panel = ResultPanel::new();
        panel.show(report(true, None));
        let shown = Instant::now();

        assert!(panel.visible_at(shown + Duration::from_secs(4)));
        assert!(!panel.visible_at(shown + Duration::from_secs(6)));
    }

    #[test]
    fn newer_show_survives_a_stale_hide_timer() {
        let mut panel = ResultPanel::new();
        let first = panel.show(report(true, None));
        let second = panel.show(report(false, None));

        panel.hide_if_current(first);
        assert!(panel.report().is_some());

        panel.hide_if_current(second);
        assert!(panel.report().is_none());
    }

    #[test]
    fn board_formats_counters_and_placeholder() {
        let mut board = StatsBoard::default();
        assert_eq!(board.total_items, STAT_UNAVAILABLE);

        board.apply(&InventoryStats {
            total_items: 120,
            matched_scans: 75,
            shortages: 45,
            overages: 3,
            wrong_locations: 7,
        });
        assert_eq!(board.total_items, "120");
        assert_eq!(board.wrong_locations, "7");

        board.mark_unavailable();
        assert_eq!(
            board,
            StatsBoard {
                total_items: STAT_UNAVAILABLE.to_string(),
                matched_scans: STAT_UNAVAILABLE.to_string(),
                shortages: STAT_UNAVAILABLE.to_string(),
                overages: STAT_UNAVAILABLE.to_string(),
                wrong_locations: STAT_UNAVAILABLE.to_string(),
            }
        );
    }
}

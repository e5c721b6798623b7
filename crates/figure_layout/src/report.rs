//! Plain-text rendering of a [`CheckReport`] for terminals and tool output.

use core::fmt::Write as _;

use crate::analyzer::CheckReport;

/// Format a report as an indented, human-readable summary.
///
/// Each category is listed worst-first in the order the analyzer sorted it.
#[must_use]
pub fn format_report(figure_id: &str, report: &CheckReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ignore = writeln!(
        out,
        "{figure_id}: {} text elements ({} checked)",
        report.total_elements, report.checked_elements
    );
    if report.is_clean() {
        let _ignore = writeln!(out, "  no layout issues");
        return out;
    }

    if !report.overlaps.is_empty() {
        let _ignore = writeln!(out, "  overlaps ({}):", report.overlaps.len());
        for found in &report.overlaps {
            let _ignore = writeln!(
                out,
                "    \"{}\" x \"{}\": {:.1} x {:.1} (area {:.1}) at ({:.0},{:.0})",
                found.a,
                found.b,
                found.overlap_width,
                found.overlap_height,
                found.magnitude(),
                found.positions[0].x,
                found.positions[0].y
            );
        }
    }
    if !report.box_overflows.is_empty() {
        let _ignore = writeln!(out, "  box overflows ({}):", report.box_overflows.len());
        for found in &report.box_overflows {
            let _ignore = writeln!(
                out,
                "    \"{}\" exceeds its box on the {} by {:.1} at ({:.0},{:.0})",
                found.label, found.edge, found.overflow_amount, found.position.x, found.position.y
            );
        }
    }
    if !report.clipped.is_empty() {
        let _ignore = writeln!(out, "  clipped ({}):", report.clipped.len());
        for found in &report.clipped {
            let _ignore = writeln!(
                out,
                "    \"{}\" runs off the {} edge by {:.1}",
                found.label, found.edge, found.overflow_amount
            );
        }
    }
    if !report.too_close.is_empty() {
        let _ignore = writeln!(out, "  too close ({}):", report.too_close.len());
        for found in &report.too_close {
            let _ignore = writeln!(
                out,
                "    \"{}\" / \"{}\": gap {:.1}",
                found.a,
                found.b,
                found.gap()
            );
        }
    }
    out
}

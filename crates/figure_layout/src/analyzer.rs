//! Geometric classification of rendered labels.

use core::cmp::Ordering;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::finding::{BoxOverflow, Clipped, Edge, Finding, Overlap, TooClose};
use crate::geometry::{BoundingBox, ContainerGeometry, ElementGeometry, LayoutSnapshot};

/// Result of one analyzer pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    /// Every text element found, opted-out ones included.
    pub total_elements: usize,
    /// Text elements that took part in pairwise checks.
    pub checked_elements: usize,
    pub overlaps: Vec<Overlap>,
    pub too_close: Vec<TooClose>,
    pub clipped: Vec<Clipped>,
    pub box_overflows: Vec<BoxOverflow>,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.finding_count() == 0
    }

    #[must_use]
    pub fn finding_count(&self) -> usize {
        self.overlaps.len() + self.too_close.len() + self.clipped.len() + self.box_overflows.len()
    }

    /// All findings in presentation order: overlaps, box overflows,
    /// clipped labels, then near-collisions.
    #[must_use]
    pub fn findings(&self) -> Vec<Finding> {
        let mut out = Vec::with_capacity(self.finding_count());
        out.extend(self.overlaps.iter().cloned().map(Finding::Overlap));
        out.extend(self.box_overflows.iter().cloned().map(Finding::BoxOverflow));
        out.extend(self.clipped.iter().cloned().map(Finding::Clipped));
        out.extend(self.too_close.iter().cloned().map(Finding::TooClose));
        out
    }
}

/// Classify every pairwise and positional relationship in `snapshot`.
///
/// The pass is pure: it only reads the snapshot.
#[must_use]
pub fn analyze(snapshot: &LayoutSnapshot, config: &AnalyzerConfig) -> CheckReport {
    let checked: Vec<&ElementGeometry> = snapshot
        .texts
        .iter()
        .filter(|element| !element.opt_out)
        .collect();

    let mut report = CheckReport {
        total_elements: snapshot.texts.len(),
        checked_elements: checked.len(),
        ..CheckReport::default()
    };

    for (index, first) in checked.iter().enumerate() {
        for second in checked.iter().skip(index + 1) {
            classify_pair(first, second, config, &mut report);
        }
    }

    for element in &snapshot.texts {
        if let Some(clip) = clip_finding(element, snapshot, config) {
            report.clipped.push(clip);
        }
    }

    let containers = eligible_containers(&snapshot.containers, config);
    for element in checked {
        if let Some(overflow) = overflow_finding(element, &containers, config) {
            report.box_overflows.push(overflow);
        }
    }

    report
        .overlaps
        .sort_by(|lhs, rhs| descending(lhs.magnitude(), rhs.magnitude()));
    report
        .box_overflows
        .sort_by(|lhs, rhs| descending(lhs.overflow_amount, rhs.overflow_amount));
    report
        .clipped
        .sort_by(|lhs, rhs| descending(lhs.overflow_amount, rhs.overflow_amount));
    report
        .too_close
        .sort_by(|lhs, rhs| lhs.gap().total_cmp(&rhs.gap()));

    debug!(
        "[CHECK] {} elements ({} checked): {} overlaps, {} too close, {} clipped, {} overflows",
        report.total_elements,
        report.checked_elements,
        report.overlaps.len(),
        report.too_close.len(),
        report.clipped.len(),
        report.box_overflows.len()
    );
    report
}

fn descending(lhs: f64, rhs: f64) -> Ordering {
    rhs.total_cmp(&lhs)
}

fn classify_pair(
    first: &ElementGeometry,
    second: &ElementGeometry,
    config: &AnalyzerConfig,
    report: &mut CheckReport,
) {
    let (ox, oy) = first.bounds.overlap_extent(&second.bounds);
    let positions = [first.bounds.origin(), second.bounds.origin()];

    if ox > config.overlap_epsilon && oy > config.overlap_epsilon {
        report.overlaps.push(Overlap {
            a: first.label.clone(),
            b: second.label.clone(),
            overlap_width: ox,
            overlap_height: oy,
            positions,
        });
        return;
    }

    let gx = (-ox).max(0.0);
    let gy = (-oy).max(0.0);
    if gx < config.min_gap && gy < config.min_gap {
        report.too_close.push(TooClose {
            a: first.label.clone(),
            b: second.label.clone(),
            gap_width: gx,
            gap_height: gy,
            positions,
        });
    }
}

fn clip_finding(
    element: &ElementGeometry,
    snapshot: &LayoutSnapshot,
    config: &AnalyzerConfig,
) -> Option<Clipped> {
    let bounds = &element.bounds;
    let (edge, amount) = Edge::worst(
        -bounds.left,
        bounds.right - snapshot.canvas.width,
        -bounds.top,
        bounds.bottom - snapshot.canvas.height,
    );
    (amount > config.clip_tolerance).then(|| Clipped {
        label: element.label.clone(),
        edge,
        overflow_amount: amount,
    })
}

fn eligible_containers<'shape>(
    containers: &'shape [ContainerGeometry],
    config: &AnalyzerConfig,
) -> Vec<&'shape ContainerGeometry> {
    containers
        .iter()
        .filter(|shape| {
            !shape.opt_out
                && shape.filled
                && shape.bounds.width() >= config.container_min_width
                && shape.bounds.height() >= config.container_min_height
        })
        .collect()
}

fn overflow_finding(
    element: &ElementGeometry,
    containers: &[&ContainerGeometry],
    config: &AnalyzerConfig,
) -> Option<BoxOverflow> {
    let center = element.bounds.center();
    let host = containers
        .iter()
        .filter(|shape| shape.bounds.contains(center))
        .min_by(|lhs, rhs| lhs.bounds.area().total_cmp(&rhs.bounds.area()))?;

    let (edge, amount) = container_excess(&element.bounds, &host.bounds);
    (amount > config.overflow_tolerance).then(|| BoxOverflow {
        label: element.label.clone(),
        edge,
        overflow_amount: amount,
        position: element.bounds.origin(),
    })
}

fn container_excess(text: &BoundingBox, host: &BoundingBox) -> (Edge, f64) {
    Edge::worst(
        host.left - text.left,
        text.right - host.right,
        host.top - text.top,
        text.bottom - host.bottom,
    )
}

//! Layout quality analysis for rendered figures.
//!
//! The worker hands back the boxes of every text label and every container
//! shape in a rendered document; this crate classifies their relationships
//! into overlaps, near-collisions, canvas clipping and container overflow.
//! Nothing here touches the browser, so the whole algorithm is testable on
//! plain geometry.

mod analyzer;
pub mod config;
pub mod finding;
pub mod geometry;
/// Human-readable report formatting
pub mod report;

pub use analyzer::{CheckReport, analyze};
pub use config::AnalyzerConfig;
pub use finding::{BoxOverflow, Clipped, Edge, Finding, Overlap, TooClose};
pub use geometry::{BoundingBox, Canvas, ContainerGeometry, ElementGeometry, LayoutSnapshot, Point};

//! Sizing produced documents and wrapping them for the worker surface.

use log::warn;
use roxmltree::Document;

use crate::error::JobError;

/// A produced SVG document together with its pixel size.
#[derive(Clone, Debug, PartialEq)]
pub struct SizedDocument {
    pub svg: String,
    pub width: u32,
    pub height: u32,
}

/// Convert an SVG length (`120`, `120px`, `1.5in`, ...) to CSS pixels.
/// Percentages and unknown units give `None`.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|ch: char| ch.is_ascii_alphabetic() || ch == '%')
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.trim().parse().ok()?;
    let factor = match unit.trim() {
        "" | "px" => 1.0,
        "pt" => 96.0 / 72.0,
        "pc" => 16.0,
        "in" => 96.0,
        "cm" => 96.0 / 2.54,
        "mm" => 96.0 / 25.4,
        _ => return None,
    };
    let pixels = number * factor;
    (pixels.is_finite() && pixels > 0.0).then_some(pixels)
}

/// Width and height of a `viewBox="min-x min-y width height"` value.
fn parse_view_box(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = value
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match parts.as_slice() {
        [_, _, width, height] if *width > 0.0 && *height > 0.0 => Some((*width, *height)),
        _ => None,
    }
}

/// Lengths are validated positive and finite before they get here.
fn to_pixels(length: f64) -> u32 {
    (length - 1e-6).ceil().min(f64::from(u32::MAX)) as u32
}

impl SizedDocument {
    /// Parse `svg` and determine its size from the root element.
    ///
    /// Falls back to the `viewBox` and then to `default_size` when the root
    /// carries no usable `width`/`height`.
    ///
    /// # Errors
    ///
    /// `MalformedDocument` if the text is not XML or the root is not `<svg>`.
    pub fn parse(svg: String, default_size: (u32, u32)) -> Result<Self, JobError> {
        let (width, height) = {
            let document = Document::parse(&svg)
                .map_err(|err| JobError::MalformedDocument(format!("not well-formed XML: {err}")))?;
            let root = document.root_element();
            if root.tag_name().name() != "svg" {
                return Err(JobError::MalformedDocument(format!(
                    "root element is <{}>, expected <svg>",
                    root.tag_name().name()
                )));
            }

            let view_box = root.attribute("viewBox").and_then(parse_view_box);
            let width = root
                .attribute("width")
                .and_then(parse_length)
                .or(view_box.map(|(width, _)| width));
            let height = root
                .attribute("height")
                .and_then(parse_length)
                .or(view_box.map(|(_, height)| height));
            match (width, height) {
                (Some(width), Some(height)) => (to_pixels(width), to_pixels(height)),
                _ => {
                    warn!(
                        "[RENDER] document declares no usable size; using {}x{}",
                        default_size.0, default_size.1
                    );
                    default_size
                }
            }
        };
        Ok(Self { svg, width, height })
    }

    /// Embed the document in a page with no margins or scrollbars, so the
    /// content surface shows exactly `width` x `height` pixels of it.
    #[must_use]
    pub fn wrap_html(&self) -> String {
        let body = self
            .svg
            .trim_start()
            .strip_prefix("<?xml")
            .and_then(|rest| rest.split_once("?>"))
            .map_or(self.svg.as_str(), |(_, rest)| rest);
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><style>\
             html,body{{margin:0;padding:0;overflow:hidden;background:transparent;}}\
             body>svg{{display:block;width:{width}px;height:{height}px;}}\
             @page{{size:{width}px {height}px;margin:0;}}\
             </style></head><body>{body}</body></html>",
            width = self.width,
            height = self.height,
        )
    }
}

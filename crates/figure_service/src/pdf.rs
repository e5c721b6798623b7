//! Making paginated output reproducible.
//!
//! The worker stamps every PDF with the wall-clock time and a random file
//! identifier. Both are replaced here so that rendering the same figure twice
//! yields identical bytes.

use anyhow::{Context as _, Result};
use core::str::from_utf8;
use lopdf::{Document as LoDocument, Object as LoObject, StringFormat};

/// Fixed timestamp written into every normalized document.
pub const SENTINEL_DATE: &str = "D:19700101000000Z";

/// XMP equivalent of [`SENTINEL_DATE`].
const SENTINEL_XMP_DATE: &str = "1970-01-01T00:00:00Z";

const XMP_DATE_FIELDS: [&str; 3] = ["xmp:CreateDate", "xmp:ModifyDate", "xmp:MetadataDate"];

/// Replace the values of `field` in an XMP packet, in both element form
/// (`<xmp:CreateDate>..</xmp:CreateDate>`) and attribute form
/// (`xmp:CreateDate=".."`).
fn replace_xmp_field(packet: &str, field: &str) -> String {
    let mut out = String::with_capacity(packet.len());
    let open = format!("<{field}>");
    let close = format!("</{field}>");
    let attribute = format!("{field}=\"");
    let mut rest = packet;
    loop {
        let element = rest.find(&open).map(|idx| (idx, open.as_str(), close.as_str()));
        let attr = rest.find(&attribute).map(|idx| (idx, attribute.as_str(), "\""));
        let next = match (element, attr) {
            (Some(lhs), Some(rhs)) => Some(if lhs.0 <= rhs.0 { lhs } else { rhs }),
            (found @ Some(_), None) | (None, found @ Some(_)) => found,
            (None, None) => None,
        };
        let Some((start, prefix, terminator)) = next else {
            out.push_str(rest);
            return out;
        };
        let value_start = start + prefix.len();
        let Some(value_len) = rest[value_start..].find(terminator) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..value_start]);
        out.push_str(SENTINEL_XMP_DATE);
        rest = &rest[value_start + value_len..];
    }
}

fn normalize_xmp(packet: &[u8]) -> Option<Vec<u8>> {
    let text = from_utf8(packet).ok()?;
    let normalized = XMP_DATE_FIELDS
        .iter()
        .fold(text.to_owned(), |acc, field| replace_xmp_field(&acc, field));
    (normalized != text).then(|| normalized.into_bytes())
}

/// Pin creation/modification dates to [`SENTINEL_DATE`] and drop the file
/// identifier.
///
/// Compressed XMP packets are left untouched; Chromium writes none.
///
/// # Errors
///
/// Returns an error if `bytes` is not a readable PDF.
pub fn normalize_timestamps(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut document = LoDocument::load_mem(bytes).context("worker returned an unreadable PDF")?;

    let info_id = match document.trailer.get(b"Info") {
        Ok(LoObject::Reference(id)) => Some(*id),
        _ => None,
    };
    let info = match info_id {
        Some(id) => document
            .get_object_mut(id)
            .and_then(LoObject::as_dict_mut)
            .ok(),
        None => document
            .trailer
            .get_mut(b"Info")
            .and_then(LoObject::as_dict_mut)
            .ok(),
    };
    if let Some(info) = info {
        for key in [b"CreationDate".as_slice(), b"ModDate".as_slice()] {
            if info.has(key) {
                info.set(
                    key,
                    LoObject::String(SENTINEL_DATE.as_bytes().to_vec(), StringFormat::Literal),
                );
            }
        }
    }

    for object in document.objects.values_mut() {
        let LoObject::Stream(stream) = object else {
            continue;
        };
        let is_metadata = stream
            .dict
            .get(b"Type")
            .and_then(LoObject::as_name)
            .is_ok_and(|name| name == b"Metadata");
        if !is_metadata || stream.dict.has(b"Filter") {
            continue;
        }
        if let Some(normalized) = normalize_xmp(&stream.content) {
            stream.set_content(normalized);
        }
    }

    document.trailer.remove(b"ID");

    let mut out = Vec::with_capacity(bytes.len());
    document
        .save_to(&mut out)
        .context("failed to serialize normalized PDF")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Stream as LoStream, dictionary};

    fn sample_pdf(stamp: &str, xmp_stamp: &str) -> Result<Vec<u8>> {
        let mut doc = LoDocument::with_version("1.4");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(LoStream::new(dictionary! {}, b"0 0 10 10 re f".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 240.into(), 180.into()],
        });
        doc.objects.insert(
            pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let packet = format!(
            "<x:xmpmeta><rdf:Description xmp:ModifyDate=\"{xmp_stamp}\">\
             <xmp:CreateDate>{xmp_stamp}</xmp:CreateDate></rdf:Description></x:xmpmeta>"
        );
        let metadata_id = doc.add_object(LoStream::new(
            dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
            packet.into_bytes(),
        ));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "Metadata" => metadata_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => LoObject::string_literal("Skia/PDF"),
            "CreationDate" => LoObject::string_literal(stamp),
            "ModDate" => LoObject::string_literal(stamp),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.trailer.set(
            "ID",
            vec![
                LoObject::string_literal(stamp),
                LoObject::string_literal(stamp),
            ],
        );
        let mut out = Vec::new();
        doc.save_to(&mut out)?;
        Ok(out)
    }

    fn literal(object: &LoObject) -> &[u8] {
        match object {
            LoObject::String(bytes, _) => bytes,
            _ => &[],
        }
    }

    #[test]
    fn differing_timestamps_normalize_to_identical_bytes() -> Result<()> {
        let first = sample_pdf("D:20240101120000Z", "2024-01-01T12:00:00Z")?;
        let second = sample_pdf("D:20250615083010Z", "2025-06-15T08:30:10Z")?;
        assert_ne!(first, second);
        assert_eq!(normalize_timestamps(&first)?, normalize_timestamps(&second)?);
        Ok(())
    }

    #[test]
    fn info_dates_become_the_sentinel() -> Result<()> {
        let normalized = normalize_timestamps(&sample_pdf("D:20240101120000Z", "2024")?)?;
        let doc = LoDocument::load_mem(&normalized)?;
        let info_id = doc.trailer.get(b"Info")?.as_reference()?;
        let info = doc.get_object(info_id)?.as_dict()?;
        assert_eq!(literal(info.get(b"CreationDate")?), SENTINEL_DATE.as_bytes());
        assert_eq!(literal(info.get(b"ModDate")?), SENTINEL_DATE.as_bytes());
        assert!(!doc.trailer.has(b"ID"));
        Ok(())
    }

    #[test]
    fn xmp_fields_are_rewritten_in_both_forms() {
        let packet = "<a xmp:ModifyDate=\"2024-02-02\"><xmp:CreateDate>2024-02-02</xmp:CreateDate></a>";
        let normalized = normalize_xmp(packet.as_bytes()).map(String::from_utf8);
        assert_eq!(
            normalized,
            Some(Ok(format!(
                "<a xmp:ModifyDate=\"{SENTINEL_XMP_DATE}\"><xmp:CreateDate>{SENTINEL_XMP_DATE}</xmp:CreateDate></a>"
            )))
        );
    }
}

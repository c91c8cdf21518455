// src/pdf_fill.rs

use crate::BoxError;
use crate::fields::FieldMap;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::path::Path;
use tracing::{info, warn};

/// Writes a filled copy of a form template.
pub trait PdfFiller: Send + Sync {
    fn fill(&self, template: &Path, output: &Path, fields: &FieldMap) -> Result<(), BoxError>;
}

/// Fills AcroForm text widgets on the first page of the template.
pub struct AcroFormFiller;

impl PdfFiller for AcroFormFiller {
    fn fill(&self, template: &Path, output: &Path, fields: &FieldMap) -> Result<(), BoxError> {
        let mut doc = Document::load(template)?;
        let filled = fill_document(&mut doc, fields)?;
        doc.save(output)?;
        info!(output = %output.display(), filled, "Report PDF written");
        Ok(())
    }
}

/// Set `/V` on every first-page widget whose `/T` names a field in `fields`,
/// then ask viewers to regenerate appearances. Returns how many widgets were
/// filled.
pub fn fill_document(doc: &mut Document, fields: &FieldMap) -> Result<usize, BoxError> {
    let Some((_, &page_id)) = doc.get_pages().iter().next() else {
        return Err("template has no pages".into());
    };

    let annots = widget_ids(doc, page_id);
    if annots.is_empty() {
        warn!("Template page has no form widgets");
        return Ok(0);
    }

    let mut filled = 0;
    for id in annots {
        let Ok(annot) = doc.get_object_mut(id).and_then(Object::as_dict_mut) else {
            continue;
        };
        if !is_widget(annot) {
            continue;
        }
        let Some(name) = field_name(annot) else {
            continue;
        };
        if !fields.contains_key(&name) {
            continue;
        }
        annot.set("V", text_string(fields.get(&name)));
        annot.set("AS", Object::Name(b"Yes".to_vec()));
        filled += 1;
    }

    set_need_appearances(doc)?;
    Ok(filled)
}

/// PDF text string for a field value. Unmarked strings are read as
/// PDFDocEncoding, so anything outside ASCII goes out as UTF-16BE with a BOM.
pub fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        return Object::string_literal(value);
    }
    let mut bytes = vec![0xFE, 0xFF];
    bytes.extend(value.encode_utf16().flat_map(u16::to_be_bytes));
    Object::String(bytes, StringFormat::Hexadecimal)
}

fn widget_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let annots = match page.get(b"Annots") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(obj) => Some(obj),
        Err(_) => None,
    };
    annots
        .and_then(|a| a.as_array().ok())
        .map(|arr| {
            arr.iter()
                .filter_map(|o| o.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn is_widget(annot: &Dictionary) -> bool {
    annot
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|n| n == b"Widget")
}

fn field_name(annot: &Dictionary) -> Option<String> {
    match annot.get(b"T").ok()? {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn set_need_appearances(doc: &mut Document) -> Result<(), BoxError> {
    let acro_ref = doc
        .catalog()?
        .get(b"AcroForm")
        .ok()
        .and_then(|o| o.as_reference().ok());

    if let Some(id) = acro_ref {
        doc.get_object_mut(id)?
            .as_dict_mut()?
            .set("NeedAppearances", Object::Boolean(true));
        return Ok(());
    }

    let catalog = doc.catalog_mut()?;
    let mut acro = match catalog.remove(b"AcroForm") {
        Some(Object::Dictionary(acro)) => acro,
        _ => Dictionary::new(),
    };
    acro.set("NeedAppearances", Object::Boolean(true));
    catalog.set("AcroForm", Object::Dictionary(acro));
    Ok(())
}

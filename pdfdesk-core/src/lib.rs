use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::ops::Range;
use std::path::PathBuf;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && other.x < self.x + self.width
            && self.y < other.y + other.height
            && other.y < self.y + self.height
    }
}

/// Identifier assigned by the text-extraction collaborator. Stable for the
/// lifetime of the extracted page, unique within that page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextItemId(String);

impl TextItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TextItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TextItemId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for TextItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub id: TextItemId,
    pub page_number: u32,
    pub text: String,
    pub bounds: Rect,
}

impl TextItem {
    pub fn new(
        id: impl Into<TextItemId>,
        page_number: u32,
        text: impl Into<String>,
        bounds: Rect,
    ) -> Self {
        Self {
            id: id.into(),
            page_number,
            text: text.into(),
            bounds,
        }
    }
}

/// Per-page index of extracted text, consumed read-only by search. Pages are
/// kept in ascending page-number order so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentText {
    pages: BTreeMap<u32, Vec<TextItem>>,
}

impl DocumentText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_page(&mut self, page_number: u32, items: Vec<TextItem>) {
        self.pages.insert(page_number, items);
    }

    pub fn pages(&self) -> impl Iterator<Item = (u32, &[TextItem])> {
        self.pages.iter().map(|(page, items)| (*page, items.as_slice()))
    }

    pub fn page(&self, page_number: u32) -> Option<&[TextItem]> {
        self.pages.get(&page_number).map(Vec::as_slice)
    }

    pub fn item(&self, page_number: u32, id: &TextItemId) -> Option<&TextItem> {
        self.pages
            .get(&page_number)
            .and_then(|items| items.iter().find(|item| &item.id == id))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn item_count(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.values().all(Vec::is_empty)
    }

    /// Splices `replacement` over `span` in one item's text. This is the
    /// mutation primitive a host uses to honor search replace callbacks.
    pub fn replace_item_text(
        &mut self,
        page_number: u32,
        id: &TextItemId,
        span: Range<usize>,
        replacement: &str,
    ) -> Result<(), EditError> {
        let items = self
            .pages
            .get_mut(&page_number)
            .ok_or(EditError::PageOutOfRange(page_number as usize))?;
        let item = items
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| EditError::TextItemNotFound(id.clone(), page_number))?;
        if span.start > span.end
            || span.end > item.text.len()
            || !item.text.is_char_boundary(span.start)
            || !item.text.is_char_boundary(span.end)
        {
            return Err(EditError::InvalidSpan(span.start, span.end));
        }
        item.text.replace_range(span, replacement);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnnotationKind {
    Highlight,
    Underline,
    StrikeOut,
    Note,
    Ink,
    Square,
    FreeText,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub page_number: u32,
    pub kind: AnnotationKind,
    pub rect: Rect,
    pub contents: Option<String>,
    pub color: Option<String>,
    pub author: Option<String>,
}

impl Annotation {
    pub fn new(page_number: u32, kind: AnnotationKind, rect: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_number,
            kind,
            rect,
            contents: None,
            color: None,
            author: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormFieldKind {
    Text,
    Checkbox,
    Radio,
    Dropdown,
    Signature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub id: Uuid,
    pub page_number: u32,
    pub name: String,
    pub kind: FormFieldKind,
    pub rect: Rect,
    pub value: Option<String>,
}

impl FormField {
    pub fn new(page_number: u32, name: impl Into<String>, kind: FormFieldKind, rect: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_number,
            name: name.into(),
            kind,
            rect,
            value: None,
        }
    }
}

/// A redaction mark. Pending until applied; applying it blanks the text the
/// rectangle covers and flips `applied`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redaction {
    pub id: Uuid,
    pub page_number: u32,
    pub rect: Rect,
    pub applied: bool,
}

impl Redaction {
    pub fn new(page_number: u32, rect: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            page_number,
            rect,
            applied: false,
        }
    }
}

/// One reversible text change on one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEdit {
    pub page_number: u32,
    pub item_id: TextItemId,
    pub before: String,
    pub after: String,
}

impl TextEdit {
    pub fn inverted(&self) -> TextEdit {
        TextEdit {
            page_number: self.page_number,
            item_id: self.item_id.clone(),
            before: self.after.clone(),
            after: self.before.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub rotation: u16,
    pub text: Vec<TextItem>,
    pub annotations: Vec<Annotation>,
    pub fields: Vec<FormField>,
    pub redactions: Vec<Redaction>,
}

impl PageContent {
    pub fn with_text(text: Vec<TextItem>) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error("page {0} out of range")]
    PageOutOfRange(usize),
    #[error("page order is not a permutation of 0..{0}")]
    InvalidPageOrder(usize),
    #[error("annotation {0} not found")]
    AnnotationNotFound(Uuid),
    #[error("form field {0} not found")]
    FormFieldNotFound(Uuid),
    #[error("redaction {0} not found")]
    RedactionNotFound(Uuid),
    #[error("text item {0} not found on page {1}")]
    TextItemNotFound(TextItemId, u32),
    #[error("span {0}..{1} is not valid for the target text")]
    InvalidSpan(usize, usize),
}

pub fn normalized_rotation(base: u16, delta: i32) -> u16 {
    (((base as i32 + delta) % 360 + 360) % 360) as u16
}

/// Host-owned editable document state. Pages are positional; the objects they
/// contain carry 1-based page numbers that are kept consistent with position
/// whenever the page list changes shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditorDocument {
    pub metadata: DocumentMetadata,
    pages: Vec<PageContent>,
}

impl EditorDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(pages: Vec<PageContent>) -> Self {
        let mut doc = Self {
            metadata: DocumentMetadata::default(),
            pages,
        };
        doc.renumber();
        doc
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Result<&PageContent, EditError> {
        self.pages.get(index).ok_or(EditError::PageOutOfRange(index))
    }

    fn page_by_number_mut(&mut self, page_number: u32) -> Result<&mut PageContent, EditError> {
        let index = (page_number as usize)
            .checked_sub(1)
            .ok_or(EditError::PageOutOfRange(0))?;
        self.pages
            .get_mut(index)
            .ok_or(EditError::PageOutOfRange(index))
    }

    pub fn insert_page(&mut self, index: usize, content: PageContent) -> Result<(), EditError> {
        if index > self.pages.len() {
            return Err(EditError::PageOutOfRange(index));
        }
        self.pages.insert(index, content);
        self.renumber();
        Ok(())
    }

    pub fn remove_page(&mut self, index: usize) -> Result<PageContent, EditError> {
        if index >= self.pages.len() {
            return Err(EditError::PageOutOfRange(index));
        }
        let removed = self.pages.remove(index);
        self.renumber();
        Ok(removed)
    }

    pub fn set_page_rotation(&mut self, index: usize, rotation: u16) -> Result<(), EditError> {
        let page = self
            .pages
            .get_mut(index)
            .ok_or(EditError::PageOutOfRange(index))?;
        page.rotation = rotation % 360;
        Ok(())
    }

    /// Reorders pages so that the page now at position `i` is the one that was
    /// previously at position `order[i]`.
    pub fn reorder_pages(&mut self, order: &[usize]) -> Result<(), EditError> {
        let len = self.pages.len();
        if order.len() != len {
            return Err(EditError::InvalidPageOrder(len));
        }
        let mut seen = vec![false; len];
        for &source in order {
            if source >= len || seen[source] {
                return Err(EditError::InvalidPageOrder(len));
            }
            seen[source] = true;
        }
        let old = std::mem::take(&mut self.pages);
        let mut slots: Vec<Option<PageContent>> = old.into_iter().map(Some).collect();
        self.pages = order
            .iter()
            .map(|&source| slots[source].take().unwrap_or_default())
            .collect();
        self.renumber();
        Ok(())
    }

    fn renumber(&mut self) {
        for (index, page) in self.pages.iter_mut().enumerate() {
            let number = (index + 1) as u32;
            for item in &mut page.text {
                item.page_number = number;
            }
            for annotation in &mut page.annotations {
                annotation.page_number = number;
            }
            for field in &mut page.fields {
                field.page_number = number;
            }
            for redaction in &mut page.redactions {
                redaction.page_number = number;
            }
        }
    }

    pub fn item(&self, page_number: u32, id: &TextItemId) -> Option<&TextItem> {
        let index = (page_number as usize).checked_sub(1)?;
        self.pages
            .get(index)?
            .text
            .iter()
            .find(|item| &item.id == id)
    }

    pub fn set_item_text(
        &mut self,
        page_number: u32,
        id: &TextItemId,
        text: &str,
    ) -> Result<String, EditError> {
        let page = self.page_by_number_mut(page_number)?;
        let item = page
            .text
            .iter_mut()
            .find(|item| &item.id == id)
            .ok_or_else(|| EditError::TextItemNotFound(id.clone(), page_number))?;
        let before = std::mem::replace(&mut item.text, text.to_owned());
        Ok(before)
    }

    pub fn annotation(&self, page_number: u32, id: Uuid) -> Option<&Annotation> {
        let index = (page_number as usize).checked_sub(1)?;
        self.pages
            .get(index)?
            .annotations
            .iter()
            .find(|a| a.id == id)
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<(), EditError> {
        let page = self.page_by_number_mut(annotation.page_number)?;
        page.annotations.push(annotation);
        Ok(())
    }

    pub fn update_annotation(&mut self, annotation: Annotation) -> Result<Annotation, EditError> {
        let id = annotation.id;
        let page = self.page_by_number_mut(annotation.page_number)?;
        let slot = page
            .annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(EditError::AnnotationNotFound(id))?;
        Ok(std::mem::replace(slot, annotation))
    }

    pub fn remove_annotation(&mut self, page_number: u32, id: Uuid) -> Result<Annotation, EditError> {
        let page = self.page_by_number_mut(page_number)?;
        let position = page
            .annotations
            .iter()
            .position(|a| a.id == id)
            .ok_or(EditError::AnnotationNotFound(id))?;
        Ok(page.annotations.remove(position))
    }

    pub fn form_field(&self, page_number: u32, id: Uuid) -> Option<&FormField> {
        let index = (page_number as usize).checked_sub(1)?;
        self.pages.get(index)?.fields.iter().find(|f| f.id == id)
    }

    pub fn add_form_field(&mut self, field: FormField) -> Result<(), EditError> {
        let page = self.page_by_number_mut(field.page_number)?;
        page.fields.push(field);
        Ok(())
    }

    pub fn update_form_field(&mut self, field: FormField) -> Result<FormField, EditError> {
        let id = field.id;
        let page = self.page_by_number_mut(field.page_number)?;
        let slot = page
            .fields
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(EditError::FormFieldNotFound(id))?;
        Ok(std::mem::replace(slot, field))
    }

    pub fn remove_form_field(&mut self, page_number: u32, id: Uuid) -> Result<FormField, EditError> {
        let page = self.page_by_number_mut(page_number)?;
        let position = page
            .fields
            .iter()
            .position(|f| f.id == id)
            .ok_or(EditError::FormFieldNotFound(id))?;
        Ok(page.fields.remove(position))
    }

    pub fn redaction(&self, page_number: u32, id: Uuid) -> Option<&Redaction> {
        let index = (page_number as usize).checked_sub(1)?;
        self.pages.get(index)?.redactions.iter().find(|r| r.id == id)
    }

    pub fn add_redaction(&mut self, redaction: Redaction) -> Result<(), EditError> {
        let page = self.page_by_number_mut(redaction.page_number)?;
        page.redactions.push(redaction);
        Ok(())
    }

    pub fn update_redaction(&mut self, redaction: Redaction) -> Result<Redaction, EditError> {
        let id = redaction.id;
        let page = self.page_by_number_mut(redaction.page_number)?;
        let slot = page
            .redactions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(EditError::RedactionNotFound(id))?;
        Ok(std::mem::replace(slot, redaction))
    }

    pub fn remove_redaction(&mut self, page_number: u32, id: Uuid) -> Result<Redaction, EditError> {
        let page = self.page_by_number_mut(page_number)?;
        let position = page
            .redactions
            .iter()
            .position(|r| r.id == id)
            .ok_or(EditError::RedactionNotFound(id))?;
        Ok(page.redactions.remove(position))
    }

    /// Derives the read-only per-page index search consumes. Page numbers
    /// follow the current page order.
    pub fn text_index(&self) -> DocumentText {
        let mut text = DocumentText::new();
        for (index, page) in self.pages.iter().enumerate() {
            text.insert_page((index + 1) as u32, page.text.clone());
        }
        text
    }
}

/// Seam to the excluded extraction collaborator: whoever parses the PDF hands
/// the result across this boundary, never raw bytes.
#[async_trait::async_trait]
pub trait TextSource: Send + Sync {
    async fn load(&self) -> Result<DocumentText>;
}

pub struct MemoryTextSource {
    inner: Mutex<DocumentText>,
}

impl MemoryTextSource {
    pub fn new(text: DocumentText) -> Self {
        Self {
            inner: Mutex::new(text),
        }
    }

    pub fn replace(&self, text: DocumentText) {
        *self.inner.lock() = text;
    }
}

#[async_trait::async_trait]
impl TextSource for MemoryTextSource {
    async fn load(&self) -> Result<DocumentText> {
        Ok(self.inner.lock().clone())
    }
}

pub struct JsonTextSource {
    path: PathBuf,
}

impl JsonTextSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl TextSource for JsonTextSource {
    async fn load(&self) -> Result<DocumentText> {
        let mut file = File::open(&self.path)
            .with_context(|| format!("failed to open extracted text at {:?}", self.path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let text = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode extracted text at {:?}", self.path))?;
        Ok(text)
    }
}

/// Persists document edits as a JSON sidecar next to the source PDF. Always
/// constructed with an explicit root so no ambient path sneaks in.
pub struct SidecarStore {
    root: PathBuf,
}

impl SidecarStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create sidecar directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn sidecar_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}.edits.json"))
    }

    pub fn load(&self, stem: &str) -> Result<Option<EditorDocument>> {
        let path = self.sidecar_path(stem);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open sidecar {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let document = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode sidecar {:?}", path))?;
        Ok(Some(document))
    }

    pub fn save(&self, stem: &str, document: &EditorDocument) -> Result<()> {
        let path = self.sidecar_path(stem);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(document)?;
        let mut file =
            File::create(&tmp).with_context(|| format!("failed to open temp sidecar {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, &path)?;
        tracing::debug!(path = ?path, "sidecar saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, page: u32, text: &str, y: f32) -> TextItem {
        TextItem::new(id, page, text, Rect::new(10.0, y, 100.0, 12.0))
    }

    fn two_page_document() -> EditorDocument {
        let first = PageContent::with_text(vec![
            item("p1_i0", 1, "alpha beta", 20.0),
            item("p1_i1", 1, "gamma", 40.0),
        ]);
        let second = PageContent::with_text(vec![item("p2_i0", 2, "delta", 20.0)]);
        EditorDocument::with_pages(vec![first, second])
    }

    #[test]
    fn replace_item_text_splices_span() {
        let mut text = DocumentText::new();
        text.insert_page(1, vec![item("p1_i0", 1, "hello world", 20.0)]);

        let id = TextItemId::from("p1_i0");
        text.replace_item_text(1, &id, 6..11, "there").unwrap();
        assert_eq!(text.item(1, &id).unwrap().text, "hello there");

        let err = text.replace_item_text(1, &id, 4..99, "x").unwrap_err();
        assert!(matches!(err, EditError::InvalidSpan(4, 99)));
    }

    #[test]
    fn replace_item_text_rejects_unknown_targets() {
        let mut text = DocumentText::new();
        text.insert_page(1, vec![item("p1_i0", 1, "hello", 20.0)]);

        let missing = TextItemId::from("p9_i9");
        assert!(matches!(
            text.replace_item_text(1, &missing, 0..1, "x"),
            Err(EditError::TextItemNotFound(_, 1))
        ));
        assert!(matches!(
            text.replace_item_text(7, &TextItemId::from("p1_i0"), 0..1, "x"),
            Err(EditError::PageOutOfRange(7))
        ));
    }

    #[test]
    fn page_removal_renumbers_surviving_pages() {
        let mut doc = two_page_document();
        let removed = doc.remove_page(0).unwrap();
        assert_eq!(removed.text[0].id.as_str(), "p1_i0");
        assert_eq!(doc.page_count(), 1);
        assert_eq!(doc.page(0).unwrap().text[0].page_number, 1);
        assert_eq!(doc.page(0).unwrap().text[0].id.as_str(), "p2_i0");
    }

    #[test]
    fn reorder_validates_permutations() {
        let mut doc = two_page_document();
        assert!(doc.reorder_pages(&[1, 0]).is_ok());
        assert_eq!(doc.page(0).unwrap().text[0].id.as_str(), "p2_i0");
        assert_eq!(doc.page(0).unwrap().text[0].page_number, 1);

        assert!(matches!(
            doc.reorder_pages(&[0, 0]),
            Err(EditError::InvalidPageOrder(2))
        ));
        assert!(matches!(
            doc.reorder_pages(&[0]),
            Err(EditError::InvalidPageOrder(2))
        ));
    }

    #[test]
    fn rotation_normalizes_modulo_360() {
        assert_eq!(normalized_rotation(0, 90), 90);
        assert_eq!(normalized_rotation(270, 180), 90);
        assert_eq!(normalized_rotation(0, -90), 270);

        let mut doc = two_page_document();
        doc.set_page_rotation(1, 450).unwrap();
        assert_eq!(doc.page(1).unwrap().rotation, 90);
    }

    #[test]
    fn annotation_crud_round_trips() {
        let mut doc = two_page_document();
        let mut annotation = Annotation::new(1, AnnotationKind::Highlight, Rect::new(5.0, 18.0, 50.0, 14.0));
        annotation.contents = Some("important".into());
        let id = annotation.id;

        doc.add_annotation(annotation.clone()).unwrap();
        assert!(doc.annotation(1, id).is_some());

        annotation.contents = Some("very important".into());
        let previous = doc.update_annotation(annotation).unwrap();
        assert_eq!(previous.contents.as_deref(), Some("important"));

        let removed = doc.remove_annotation(1, id).unwrap();
        assert_eq!(removed.contents.as_deref(), Some("very important"));
        assert!(matches!(
            doc.remove_annotation(1, id),
            Err(EditError::AnnotationNotFound(_))
        ));
    }

    #[test]
    fn form_field_lookup_fails_on_wrong_page() {
        let mut doc = two_page_document();
        let field = FormField::new(2, "signature", FormFieldKind::Signature, Rect::new(0.0, 0.0, 80.0, 20.0));
        let id = field.id;
        doc.add_form_field(field).unwrap();

        assert!(doc.form_field(2, id).is_some());
        assert!(doc.form_field(1, id).is_none());
    }

    #[test]
    fn text_index_follows_page_order() {
        let mut doc = two_page_document();
        doc.reorder_pages(&[1, 0]).unwrap();
        let text = doc.text_index();
        let pages: Vec<u32> = text.pages().map(|(n, _)| n).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(text.page(1).unwrap()[0].id.as_str(), "p2_i0");
    }

    #[test]
    fn rect_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        let c = Rect::new(20.0, 20.0, 5.0, 5.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[tokio::test]
    async fn memory_source_round_trips() {
        let mut text = DocumentText::new();
        text.insert_page(1, vec![item("p1_i0", 1, "hello", 20.0)]);
        let source = MemoryTextSource::new(text.clone());
        let loaded = source.load().await.unwrap();
        assert_eq!(loaded, text);
    }

    #[tokio::test]
    async fn json_source_reads_collaborator_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extracted.json");

        let mut text = DocumentText::new();
        text.insert_page(1, vec![item("p1_i0", 1, "hello", 20.0)]);
        std::fs::write(&path, serde_json::to_string(&text).unwrap()).unwrap();

        let source = JsonTextSource::new(path);
        let loaded = source.load().await.unwrap();
        assert_eq!(loaded.item(1, &TextItemId::from("p1_i0")).unwrap().text, "hello");
    }

    #[test]
    fn sidecar_store_round_trips_edits() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::new(dir.path().join("sidecars")).unwrap();

        let mut doc = two_page_document();
        doc.metadata.title = Some("Quarterly report".into());
        store.save("report", &doc).unwrap();

        let restored = store.load("report").unwrap().unwrap();
        assert_eq!(restored, doc);
        assert!(store.load("missing").unwrap().is_none());
    }
}

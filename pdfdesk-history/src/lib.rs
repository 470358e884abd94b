use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use pdfdesk_core::{
    normalized_rotation, Annotation, DocumentMetadata, EditError, EditorDocument, FormField,
    PageContent, Redaction, TextEdit, TextItemId,
};

pub const DEFAULT_MAX_ACTIONS: usize = 100;

/// One reversible edit operation. Every variant carries enough data to apply
/// the operation forward and to derive the exact inverse, so the log never
/// stores opaque payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HistoryOp {
    AddAnnotation { annotation: Annotation },
    UpdateAnnotation { before: Annotation, after: Annotation },
    DeleteAnnotation { annotation: Annotation },
    AddFormField { field: FormField },
    UpdateFormField { before: FormField, after: FormField },
    DeleteFormField { field: FormField },
    EditText { edit: TextEdit },
    AddPage { index: usize, content: PageContent },
    DeletePage { index: usize, content: PageContent },
    RotatePage { index: usize, from: u16, to: u16 },
    ReorderPages { order: Vec<usize> },
    AddRedaction { redaction: Redaction },
    DeleteRedaction { redaction: Redaction },
    ApplyRedaction { before: Redaction, after: Redaction, edits: Vec<TextEdit> },
    UpdateMetadata { before: DocumentMetadata, after: DocumentMetadata },
    Batch { actions: Vec<HistoryAction> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryActionKind {
    AddAnnotation,
    UpdateAnnotation,
    DeleteAnnotation,
    AddFormField,
    UpdateFormField,
    DeleteFormField,
    EditText,
    AddPage,
    DeletePage,
    RotatePage,
    ReorderPages,
    AddRedaction,
    DeleteRedaction,
    ApplyRedaction,
    UpdateMetadata,
    Batch,
}

fn invert_permutation(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (target, &source) in order.iter().enumerate() {
        if source < inverse.len() {
            inverse[source] = target;
        }
    }
    inverse
}

impl HistoryOp {
    pub fn kind(&self) -> HistoryActionKind {
        match self {
            HistoryOp::AddAnnotation { .. } => HistoryActionKind::AddAnnotation,
            HistoryOp::UpdateAnnotation { .. } => HistoryActionKind::UpdateAnnotation,
            HistoryOp::DeleteAnnotation { .. } => HistoryActionKind::DeleteAnnotation,
            HistoryOp::AddFormField { .. } => HistoryActionKind::AddFormField,
            HistoryOp::UpdateFormField { .. } => HistoryActionKind::UpdateFormField,
            HistoryOp::DeleteFormField { .. } => HistoryActionKind::DeleteFormField,
            HistoryOp::EditText { .. } => HistoryActionKind::EditText,
            HistoryOp::AddPage { .. } => HistoryActionKind::AddPage,
            HistoryOp::DeletePage { .. } => HistoryActionKind::DeletePage,
            HistoryOp::RotatePage { .. } => HistoryActionKind::RotatePage,
            HistoryOp::ReorderPages { .. } => HistoryActionKind::ReorderPages,
            HistoryOp::AddRedaction { .. } => HistoryActionKind::AddRedaction,
            HistoryOp::DeleteRedaction { .. } => HistoryActionKind::DeleteRedaction,
            HistoryOp::ApplyRedaction { .. } => HistoryActionKind::ApplyRedaction,
            HistoryOp::UpdateMetadata { .. } => HistoryActionKind::UpdateMetadata,
            HistoryOp::Batch { .. } => HistoryActionKind::Batch,
        }
    }

    /// The operation that restores the state this one changed. Applying an op
    /// and then its inverse is an identity on the document; a batch inverts to
    /// its children's inverses in reverse application order.
    pub fn inverse(&self) -> HistoryOp {
        match self {
            HistoryOp::AddAnnotation { annotation } => HistoryOp::DeleteAnnotation {
                annotation: annotation.clone(),
            },
            HistoryOp::DeleteAnnotation { annotation } => HistoryOp::AddAnnotation {
                annotation: annotation.clone(),
            },
            HistoryOp::UpdateAnnotation { before, after } => HistoryOp::UpdateAnnotation {
                before: after.clone(),
                after: before.clone(),
            },
            HistoryOp::AddFormField { field } => HistoryOp::DeleteFormField {
                field: field.clone(),
            },
            HistoryOp::DeleteFormField { field } => HistoryOp::AddFormField {
                field: field.clone(),
            },
            HistoryOp::UpdateFormField { before, after } => HistoryOp::UpdateFormField {
                before: after.clone(),
                after: before.clone(),
            },
            HistoryOp::EditText { edit } => HistoryOp::EditText {
                edit: edit.inverted(),
            },
            HistoryOp::AddPage { index, content } => HistoryOp::DeletePage {
                index: *index,
                content: content.clone(),
            },
            HistoryOp::DeletePage { index, content } => HistoryOp::AddPage {
                index: *index,
                content: content.clone(),
            },
            HistoryOp::RotatePage { index, from, to } => HistoryOp::RotatePage {
                index: *index,
                from: *to,
                to: *from,
            },
            HistoryOp::ReorderPages { order } => HistoryOp::ReorderPages {
                order: invert_permutation(order),
            },
            HistoryOp::AddRedaction { redaction } => HistoryOp::DeleteRedaction {
                redaction: redaction.clone(),
            },
            HistoryOp::DeleteRedaction { redaction } => HistoryOp::AddRedaction {
                redaction: redaction.clone(),
            },
            HistoryOp::ApplyRedaction { before, after, edits } => HistoryOp::ApplyRedaction {
                before: after.clone(),
                after: before.clone(),
                edits: edits.iter().rev().map(TextEdit::inverted).collect(),
            },
            HistoryOp::UpdateMetadata { before, after } => HistoryOp::UpdateMetadata {
                before: after.clone(),
                after: before.clone(),
            },
            HistoryOp::Batch { actions } => HistoryOp::Batch {
                actions: actions
                    .iter()
                    .rev()
                    .map(|action| HistoryAction {
                        id: action.id.clone(),
                        timestamp_ms: action.timestamp_ms,
                        description: action.description.clone(),
                        op: action.op.inverse(),
                    })
                    .collect(),
            },
        }
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn next_action_id() -> String {
    format!("{}-{:08x}", unix_millis(), rand::random::<u32>())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryAction {
    pub id: String,
    pub timestamp_ms: u64,
    pub description: String,
    pub op: HistoryOp,
}

impl HistoryAction {
    pub fn new(description: impl Into<String>, op: HistoryOp) -> Self {
        Self {
            id: next_action_id(),
            timestamp_ms: unix_millis(),
            description: description.into(),
            op,
        }
    }

    pub fn kind(&self) -> HistoryActionKind {
        self.op.kind()
    }
}

pub type CheckpointId = Uuid;

#[derive(Debug, Clone)]
struct Checkpoint {
    name: String,
    // None means "before the first action". Shifted on eviction so the
    // checkpoint keeps pointing at the same surviving action.
    index: Option<usize>,
}

#[derive(Debug, Default)]
struct BatchBuffer {
    description: String,
    actions: Vec<HistoryAction>,
}

/// Append-only action log with a cursor. The cursor separates "applied" from
/// "available to redo"; `None` sits before the first action.
pub struct History {
    actions: Vec<HistoryAction>,
    cursor: Option<usize>,
    max_actions: usize,
    batch: Option<BatchBuffer>,
    checkpoints: HashMap<CheckpointId, Checkpoint>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIONS)
    }
}

impl History {
    pub fn new(max_actions: usize) -> Self {
        Self {
            actions: Vec::new(),
            cursor: None,
            max_actions: max_actions.max(1),
            batch: None,
            checkpoints: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[HistoryAction] {
        &self.actions
    }

    pub fn current_index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.map(|c| c + 1).unwrap_or(0) < self.actions.len()
    }

    pub fn batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Appends an action, or buffers it while a batch is open. Appending while
    /// the cursor sits behind the tip discards the redo future.
    pub fn add_action(&mut self, action: HistoryAction) {
        if let Some(batch) = self.batch.as_mut() {
            batch.actions.push(action);
            return;
        }
        self.commit(action);
    }

    fn commit(&mut self, action: HistoryAction) {
        let keep = self.cursor.map(|c| c + 1).unwrap_or(0);
        if keep < self.actions.len() {
            debug!(dropped = self.actions.len() - keep, "discarding redo tail");
            self.actions.truncate(keep);
        }
        self.actions.push(action);
        self.cursor = Some(self.actions.len() - 1);

        if self.actions.len() > self.max_actions {
            let evicted = self.actions.len() - self.max_actions;
            self.actions.drain(..evicted);
            self.cursor = self.cursor.and_then(|c| c.checked_sub(evicted));
            for checkpoint in self.checkpoints.values_mut() {
                checkpoint.index = checkpoint.index.and_then(|i| i.checked_sub(evicted));
            }
            debug!(evicted, "history capacity reached, evicting oldest actions");
        }
    }

    /// Steps the cursor back and hands out the action to invert. `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Option<&HistoryAction> {
        let current = self.cursor?;
        self.cursor = current.checked_sub(1);
        self.actions.get(current)
    }

    /// Steps the cursor forward and hands out the action to reapply. `None`
    /// when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&HistoryAction> {
        let next = self.cursor.map(|c| c + 1).unwrap_or(0);
        if next >= self.actions.len() {
            return None;
        }
        self.cursor = Some(next);
        self.actions.get(next)
    }

    pub fn start_batch(&mut self, description: impl Into<String>) {
        if self.batch.is_some() {
            // A batch is already open; keep buffering into it.
            return;
        }
        self.batch = Some(BatchBuffer {
            description: description.into(),
            actions: Vec::new(),
        });
    }

    /// Commits the buffered actions as one atomic `Batch` action. An empty
    /// buffer records nothing. Returns whether a batch action was committed.
    pub fn end_batch(&mut self) -> bool {
        let Some(batch) = self.batch.take() else {
            return false;
        };
        if batch.actions.is_empty() {
            return false;
        }
        let action = HistoryAction::new(
            batch.description,
            HistoryOp::Batch {
                actions: batch.actions,
            },
        );
        self.commit(action);
        true
    }

    /// Discards the open batch buffer. Returns how many buffered actions were
    /// dropped.
    pub fn cancel_batch(&mut self) -> usize {
        self.batch.take().map(|b| b.actions.len()).unwrap_or(0)
    }

    pub fn create_checkpoint(&mut self, name: impl Into<String>) -> CheckpointId {
        let id = Uuid::new_v4();
        self.checkpoints.insert(
            id,
            Checkpoint {
                name: name.into(),
                index: self.cursor,
            },
        );
        id
    }

    pub fn checkpoint_name(&self, id: &CheckpointId) -> Option<&str> {
        self.checkpoints.get(id).map(|c| c.name.as_str())
    }

    /// The cursor position a checkpoint restores to, clamped to the current
    /// log. A checkpoint whose action was evicted degrades to the oldest
    /// available position. Outer `None` means the id is unknown.
    pub fn checkpoint_position(&self, id: &CheckpointId) -> Option<Option<usize>> {
        let checkpoint = self.checkpoints.get(id)?;
        let clamped = match checkpoint.index {
            Some(index) if !self.actions.is_empty() => {
                Some(index.min(self.actions.len() - 1))
            }
            _ => None,
        };
        Some(clamped)
    }

    /// Moves the cursor to a checkpoint's recorded position. Only the cursor
    /// moves; replaying the document to match is the caller's job.
    pub fn restore_checkpoint(&mut self, id: &CheckpointId) -> bool {
        match self.checkpoint_position(id) {
            Some(position) => {
                self.cursor = position;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryShortcut {
    Undo,
    Redo,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct KeyPress {
    pub key: char,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

/// Conventional undo/redo bindings: Ctrl/Cmd+Z undoes, Ctrl/Cmd+Shift+Z and
/// Ctrl/Cmd+Y redo. Suppressed inside text inputs so native editing undo is
/// not hijacked.
pub fn shortcut_for(key: &KeyPress, in_text_field: bool) -> Option<HistoryShortcut> {
    if in_text_field || !(key.ctrl || key.meta) {
        return None;
    }
    match key.key.to_ascii_lowercase() {
        'z' if key.shift => Some(HistoryShortcut::Redo),
        'z' => Some(HistoryShortcut::Undo),
        'y' => Some(HistoryShortcut::Redo),
        _ => None,
    }
}

/// Where the host applies operations. The history engine itself never mutates
/// document state.
pub trait EditSink {
    fn apply_op(&mut self, op: &HistoryOp) -> Result<(), EditError>;
}

impl EditSink for EditorDocument {
    fn apply_op(&mut self, op: &HistoryOp) -> Result<(), EditError> {
        match op {
            HistoryOp::AddAnnotation { annotation } => self.add_annotation(annotation.clone()),
            HistoryOp::UpdateAnnotation { after, .. } => {
                self.update_annotation(after.clone()).map(|_| ())
            }
            HistoryOp::DeleteAnnotation { annotation } => self
                .remove_annotation(annotation.page_number, annotation.id)
                .map(|_| ()),
            HistoryOp::AddFormField { field } => self.add_form_field(field.clone()),
            HistoryOp::UpdateFormField { after, .. } => {
                self.update_form_field(after.clone()).map(|_| ())
            }
            HistoryOp::DeleteFormField { field } => self
                .remove_form_field(field.page_number, field.id)
                .map(|_| ()),
            HistoryOp::EditText { edit } => self
                .set_item_text(edit.page_number, &edit.item_id, &edit.after)
                .map(|_| ()),
            HistoryOp::AddPage { index, content } => self.insert_page(*index, content.clone()),
            HistoryOp::DeletePage { index, .. } => self.remove_page(*index).map(|_| ()),
            HistoryOp::RotatePage { index, to, .. } => self.set_page_rotation(*index, *to),
            HistoryOp::ReorderPages { order } => self.reorder_pages(order),
            HistoryOp::AddRedaction { redaction } => self.add_redaction(redaction.clone()),
            HistoryOp::DeleteRedaction { redaction } => self
                .remove_redaction(redaction.page_number, redaction.id)
                .map(|_| ()),
            HistoryOp::ApplyRedaction { after, edits, .. } => {
                self.update_redaction(after.clone())?;
                for edit in edits {
                    self.set_item_text(edit.page_number, &edit.item_id, &edit.after)?;
                }
                Ok(())
            }
            HistoryOp::UpdateMetadata { after, .. } => {
                self.metadata = after.clone();
                Ok(())
            }
            HistoryOp::Batch { actions } => {
                for action in actions {
                    self.apply_op(&action.op)?;
                }
                Ok(())
            }
        }
    }
}

/// The host side of the history contract: owns the document, wraps every
/// mutation in an action, and replays forward/inverse operations on redo/undo.
pub struct EditorSession {
    document: EditorDocument,
    history: History,
}

impl EditorSession {
    pub fn new(document: EditorDocument) -> Self {
        Self::with_capacity(document, DEFAULT_MAX_ACTIONS)
    }

    pub fn with_capacity(document: EditorDocument, max_actions: usize) -> Self {
        Self {
            document,
            history: History::new(max_actions),
        }
    }

    pub fn document(&self) -> &EditorDocument {
        &self.document
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    fn record(&mut self, description: String, op: HistoryOp) -> Result<(), EditError> {
        self.document.apply_op(&op)?;
        debug!(%description, kind = ?op.kind(), "edit recorded");
        self.history.add_action(HistoryAction::new(description, op));
        Ok(())
    }

    pub fn add_annotation(&mut self, annotation: Annotation) -> Result<(), EditError> {
        let description = format!("Add {:?} annotation", annotation.kind);
        self.record(description, HistoryOp::AddAnnotation { annotation })
    }

    pub fn update_annotation(&mut self, after: Annotation) -> Result<(), EditError> {
        let before = self
            .document
            .annotation(after.page_number, after.id)
            .cloned()
            .ok_or(EditError::AnnotationNotFound(after.id))?;
        self.record(
            format!("Update {:?} annotation", after.kind),
            HistoryOp::UpdateAnnotation { before, after },
        )
    }

    pub fn delete_annotation(&mut self, page_number: u32, id: Uuid) -> Result<(), EditError> {
        let annotation = self
            .document
            .annotation(page_number, id)
            .cloned()
            .ok_or(EditError::AnnotationNotFound(id))?;
        self.record(
            format!("Delete {:?} annotation", annotation.kind),
            HistoryOp::DeleteAnnotation { annotation },
        )
    }

    pub fn add_form_field(&mut self, field: FormField) -> Result<(), EditError> {
        let description = format!("Add form field \"{}\"", field.name);
        self.record(description, HistoryOp::AddFormField { field })
    }

    pub fn update_form_field(&mut self, after: FormField) -> Result<(), EditError> {
        let before = self
            .document
            .form_field(after.page_number, after.id)
            .cloned()
            .ok_or(EditError::FormFieldNotFound(after.id))?;
        self.record(
            format!("Update form field \"{}\"", after.name),
            HistoryOp::UpdateFormField { before, after },
        )
    }

    pub fn delete_form_field(&mut self, page_number: u32, id: Uuid) -> Result<(), EditError> {
        let field = self
            .document
            .form_field(page_number, id)
            .cloned()
            .ok_or(EditError::FormFieldNotFound(id))?;
        self.record(
            format!("Delete form field \"{}\"", field.name),
            HistoryOp::DeleteFormField { field },
        )
    }

    pub fn edit_text(
        &mut self,
        page_number: u32,
        item_id: &TextItemId,
        after: impl Into<String>,
    ) -> Result<(), EditError> {
        let before = self
            .document
            .item(page_number, item_id)
            .map(|item| item.text.clone())
            .ok_or_else(|| EditError::TextItemNotFound(item_id.clone(), page_number))?;
        let edit = TextEdit {
            page_number,
            item_id: item_id.clone(),
            before,
            after: after.into(),
        };
        self.record("Edit text".to_owned(), HistoryOp::EditText { edit })
    }

    pub fn add_page(&mut self, index: usize, content: PageContent) -> Result<(), EditError> {
        self.record(
            format!("Insert page at {}", index + 1),
            HistoryOp::AddPage { index, content },
        )
    }

    pub fn delete_page(&mut self, index: usize) -> Result<(), EditError> {
        let content = self.document.page(index)?.clone();
        self.record(
            format!("Delete page {}", index + 1),
            HistoryOp::DeletePage { index, content },
        )
    }

    pub fn rotate_page(&mut self, index: usize, degrees: i32) -> Result<(), EditError> {
        let from = self.document.page(index)?.rotation;
        let to = normalized_rotation(from, degrees);
        self.record(
            format!("Rotate page {}", index + 1),
            HistoryOp::RotatePage { index, from, to },
        )
    }

    pub fn reorder_pages(&mut self, order: Vec<usize>) -> Result<(), EditError> {
        self.record("Reorder pages".to_owned(), HistoryOp::ReorderPages { order })
    }

    pub fn add_redaction(&mut self, redaction: Redaction) -> Result<(), EditError> {
        self.record(
            format!("Mark redaction on page {}", redaction.page_number),
            HistoryOp::AddRedaction { redaction },
        )
    }

    /// Applies a pending redaction: flips its flag and blanks every text item
    /// its rectangle touches. Returns false when it was already applied.
    pub fn apply_redaction(&mut self, page_number: u32, id: Uuid) -> Result<bool, EditError> {
        let before = self
            .document
            .redaction(page_number, id)
            .cloned()
            .ok_or(EditError::RedactionNotFound(id))?;
        if before.applied {
            return Ok(false);
        }
        let mut after = before.clone();
        after.applied = true;

        let page_index = (page_number as usize).saturating_sub(1);
        let edits: Vec<TextEdit> = self
            .document
            .page(page_index)?
            .text
            .iter()
            .filter(|item| !item.text.is_empty() && item.bounds.intersects(&before.rect))
            .map(|item| TextEdit {
                page_number,
                item_id: item.id.clone(),
                before: item.text.clone(),
                after: String::new(),
            })
            .collect();

        self.record(
            format!("Apply redaction on page {page_number}"),
            HistoryOp::ApplyRedaction { before, after, edits },
        )?;
        Ok(true)
    }

    pub fn update_metadata(&mut self, after: DocumentMetadata) -> Result<(), EditError> {
        let before = self.document.metadata.clone();
        self.record(
            "Update document metadata".to_owned(),
            HistoryOp::UpdateMetadata { before, after },
        )
    }

    pub fn undo(&mut self) -> Option<HistoryAction> {
        let action = self.history.undo()?.clone();
        if let Err(err) = self.document.apply_op(&action.op.inverse()) {
            warn!(%err, action = %action.description, "undo could not be applied");
        }
        Some(action)
    }

    pub fn redo(&mut self) -> Option<HistoryAction> {
        let action = self.history.redo()?.clone();
        if let Err(err) = self.document.apply_op(&action.op) {
            warn!(%err, action = %action.description, "redo could not be applied");
        }
        Some(action)
    }

    pub fn start_batch(&mut self, description: impl Into<String>) {
        self.history.start_batch(description);
    }

    pub fn end_batch(&mut self) -> bool {
        self.history.end_batch()
    }

    pub fn cancel_batch(&mut self) -> usize {
        self.history.cancel_batch()
    }

    pub fn create_checkpoint(&mut self, name: impl Into<String>) -> CheckpointId {
        self.history.create_checkpoint(name)
    }

    /// Walks the cursor back (or forward) to the checkpoint position, undoing
    /// and redoing through the document so its state matches the log.
    pub fn restore_checkpoint(&mut self, id: &CheckpointId) -> bool {
        let Some(position) = self.history.checkpoint_position(id) else {
            return false;
        };
        let target = position.map(|i| i as isize).unwrap_or(-1);
        while self.cursor_index() > target {
            if self.undo().is_none() {
                break;
            }
        }
        while self.cursor_index() < target {
            if self.redo().is_none() {
                break;
            }
        }
        true
    }

    fn cursor_index(&self) -> isize {
        self.history
            .current_index()
            .map(|i| i as isize)
            .unwrap_or(-1)
    }

    pub fn handle_key(&mut self, key: &KeyPress, in_text_field: bool) -> Option<HistoryShortcut> {
        match shortcut_for(key, in_text_field)? {
            HistoryShortcut::Undo => {
                self.undo();
                Some(HistoryShortcut::Undo)
            }
            HistoryShortcut::Redo => {
                self.redo();
                Some(HistoryShortcut::Redo)
            }
        }
    }
}

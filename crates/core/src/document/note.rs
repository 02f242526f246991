use std::ops::Deref;

use crate::codec::{DocumentCodec, JsonCodec};
use crate::errors::EditorError;
use crate::field::{DefaultValue, FieldSpec, FieldValue};

use super::handle::{DocumentHandle, DocumentKind};

pub const CONTENTS: &str = "contents";

pub const NOTE_FIELDS: &[FieldSpec] = &[FieldSpec {
    name: CONTENTS,
    default: DefaultValue::String(""),
}];

static NOTE_CODEC: JsonCodec = JsonCodec::new("note", NOTE_FIELDS);

/// A plain text note stored as `{"contents": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    handle: DocumentHandle,
}

impl Note {
    pub async fn contents(&self) -> Option<String> {
        string(self.handle.field(CONTENTS).await)
    }

    pub async fn set_contents(&self, contents: impl Into<String>) -> Result<(), EditorError> {
        self.handle.set_field(CONTENTS, contents.into()).await
    }

    /// The on-disk current side of a two-way conflict.
    pub async fn contents_on_disk(&self) -> Option<String> {
        let snapshot = self.handle.snapshot().await?;
        string(snapshot.current_on_disk?.get(CONTENTS).cloned())
    }

    /// The incoming side of a conflict.
    pub async fn incoming_contents(&self) -> Option<String> {
        let snapshot = self.handle.snapshot().await?;
        string(snapshot.incoming?.get(CONTENTS).cloned())
    }
}

fn string(value: Option<FieldValue>) -> Option<String> {
    match value? {
        FieldValue::String(s) => Some(s),
        _ => None,
    }
}

impl DocumentKind for Note {
    fn codec() -> &'static dyn DocumentCodec {
        &NOTE_CODEC
    }

    fn from_handle(handle: DocumentHandle) -> Self {
        Self { handle }
    }

    fn handle(&self) -> &DocumentHandle {
        &self.handle
    }
}

impl Deref for Note {
    type Target = DocumentHandle;

    fn deref(&self) -> &DocumentHandle {
        &self.handle
    }
}

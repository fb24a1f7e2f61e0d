//! Dot-path field resolution.
//!
//! The first path segment names a top-level attribute from the
//! [`FieldCatalog`]. Scalar attributes resolve only when the path has no
//! further segments; document attributes resolve the remainder as a nested
//! lookup inside the document. Anything missing resolves to "no value".

use std::borrow::Cow;
use std::collections::BTreeSet;

use serde_json::Value;
use watchpost_core::{Event, Record};

use crate::compiler::FieldRef;
use crate::error::{Result, RuleError};

/// Whether a top-level attribute is a plain column or a nested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Scalar,
    Document,
}

/// Names the top-level attributes conditions may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldCatalog {
    scalars: BTreeSet<String>,
    documents: BTreeSet<String>,
}

impl FieldCatalog {
    pub fn new<S, D>(scalars: S, documents: D) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            scalars: scalars.into_iter().map(Into::into).collect(),
            documents: documents.into_iter().map(Into::into).collect(),
        }
    }

    /// Catalog matching the columns of [`Event`].
    pub fn events() -> Self {
        Self::new(
            Event::SCALAR_ATTRIBUTES.iter().copied(),
            Event::DOCUMENT_ATTRIBUTES.iter().copied(),
        )
    }

    pub fn kind(&self, name: &str) -> Option<AttributeKind> {
        if self.scalars.contains(name) {
            Some(AttributeKind::Scalar)
        } else if self.documents.contains(name) {
            Some(AttributeKind::Document)
        } else {
            None
        }
    }

    /// Resolve `path` against `record`. JSON `null` counts as no value.
    pub fn resolve<'r, R>(&self, record: &'r R, path: &str) -> Option<Cow<'r, Value>>
    where
        R: Record + ?Sized,
    {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        if rest.iter().any(|s| s.is_empty()) {
            return None;
        }

        let resolved = match self.kind(head)? {
            AttributeKind::Scalar if !rest.is_empty() => return None,
            AttributeKind::Scalar => record.attribute(head)?,
            AttributeKind::Document => match record.attribute(head)? {
                Cow::Borrowed(doc) => Cow::Borrowed(descend(doc, &rest)?),
                Cow::Owned(doc) => Cow::Owned(descend(&doc, &rest)?.clone()),
            },
        };

        if resolved.is_null() {
            None
        } else {
            Some(resolved)
        }
    }

    /// Compile-time variant of [`resolve`](Self::resolve): decide whether
    /// `path` is a plain column or a nested document accessor.
    ///
    /// The remainder of a document path is carried as literal keys; it is
    /// resolved by the storage engine, not here.
    pub fn field_ref(&self, path: &str) -> Result<FieldRef> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();
        let rest: Vec<String> = segments.map(str::to_string).collect();
        if rest.iter().any(String::is_empty) {
            return Err(RuleError::UnknownField(path.to_string()));
        }

        match self.kind(head) {
            Some(AttributeKind::Scalar) if rest.is_empty() => Ok(FieldRef::Column(head.to_string())),
            Some(AttributeKind::Document) => Ok(FieldRef::Document {
                column: head.to_string(),
                path: rest,
            }),
            _ => Err(RuleError::UnknownField(path.to_string())),
        }
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::events()
    }
}

/// Walk object keys (and numeric array indexes) below `root`.
fn descend<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, seg| match current {
        Value::Object(map) => map.get(*seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

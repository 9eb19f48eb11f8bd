//! In-memory annotation store
//!
//! The registry owns every [`Annotation`] and the files they point into. It
//! enforces one hard invariant: an annotation with no ranges never survives
//! the operation that emptied it.
//!
//! Contract violations (unknown id, bad index, inverted range) return an error
//! and leave the registry exactly as it was.

use crate::annotation::{AnchoredRange, Annotation, AnnotationId};
use crate::error::{ExchangeError, RegistryError};
use crate::exchange::{ExchangeDocument, ProjectFile};
use crate::source_index::SourceKind;
use tracing::{debug, error, warn};

/// What [`AnnotationRegistry::remove_range`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The range is gone; the annotation still has others
    RangeRemoved(AnchoredRange),
    /// The last range went and the annotation with it
    AnnotationDeleted(Annotation),
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationRegistry {
    annotations: Vec<Annotation>,
    doc_files: Vec<ProjectFile>,
    code_files: Vec<ProjectFile>,
}

impl AnnotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an annotation holding a single range.
    pub fn create(
        &mut self,
        category: impl Into<String>,
        range: AnchoredRange,
        kind: SourceKind,
    ) -> Result<&Annotation, RegistryError> {
        check_range(&range)?;
        let mut annotation = Annotation::new(category);
        annotation.ranges_mut(kind).push(range);
        debug!(id = %annotation.id, %kind, "created annotation");
        self.annotations.push(annotation);
        Ok(&self.annotations[self.annotations.len() - 1])
    }

    /// Append a range to an existing annotation. Identical ranges are not
    /// de-duplicated.
    pub fn append_range(
        &mut self,
        id: AnnotationId,
        range: AnchoredRange,
        kind: SourceKind,
    ) -> Result<(), RegistryError> {
        check_range(&range)?;
        let annotation = self.get_mut(id)?;
        annotation.ranges_mut(kind).push(range);
        annotation.touch();
        Ok(())
    }

    /// Remove the range at `index`. Removing the last range deletes the
    /// annotation.
    pub fn remove_range(
        &mut self,
        id: AnnotationId,
        kind: SourceKind,
        index: usize,
    ) -> Result<RemoveOutcome, RegistryError> {
        let position = self.position(id)?;
        let ranges = self.annotations[position].ranges_mut(kind);
        if index >= ranges.len() {
            let err = RegistryError::RangeIndexOutOfBounds {
                id,
                kind,
                index,
                len: ranges.len(),
            };
            error!("{err}");
            return Err(err);
        }
        let removed = ranges.remove(index);

        let annotation = &mut self.annotations[position];
        if annotation.is_empty() {
            debug!(%id, "last range removed, deleting annotation");
            return Ok(RemoveOutcome::AnnotationDeleted(
                self.annotations.remove(position),
            ));
        }
        annotation.touch();
        Ok(RemoveOutcome::RangeRemoved(removed))
    }

    pub fn rename(&mut self, id: AnnotationId, category: impl Into<String>) -> Result<(), RegistryError> {
        let annotation = self.get_mut(id)?;
        annotation.category = category.into();
        annotation.touch();
        Ok(())
    }

    /// Remove an annotation regardless of how many ranges it has.
    pub fn delete(&mut self, id: AnnotationId) -> Result<Annotation, RegistryError> {
        let position = self.position(id)?;
        Ok(self.annotations.remove(position))
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Annotations with a `kind` range in `document_id` that covers `offset`.
    pub fn covering<'a>(
        &'a self,
        kind: SourceKind,
        document_id: &'a str,
        offset: usize,
    ) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.annotations.iter().filter(move |a| {
            a.ranges(kind)
                .iter()
                .any(|r| r.covers(document_id, offset))
        })
    }

    /// Register a file. Names are unique per kind.
    pub fn add_file(&mut self, file: ProjectFile) -> Result<(), RegistryError> {
        if self.file_by_name(file.kind, &file.name).is_some() {
            return Err(RegistryError::DuplicateFile {
                kind: file.kind,
                name: file.name,
            });
        }
        debug!(name = %file.name, kind = %file.kind, "registered file");
        self.files_mut(file.kind).push(file);
        Ok(())
    }

    pub fn files(&self, kind: SourceKind) -> &[ProjectFile] {
        match kind {
            SourceKind::Doc => &self.doc_files,
            SourceKind::Code => &self.code_files,
        }
    }

    pub fn file_by_name(&self, kind: SourceKind, name: &str) -> Option<&ProjectFile> {
        self.files(kind).iter().find(|f| f.name == name)
    }

    /// Unregister a file. Ranges pointing into it are kept.
    pub fn remove_file(&mut self, kind: SourceKind, name: &str) -> Result<ProjectFile, RegistryError> {
        let files = self.files_mut(kind);
        match files.iter().position(|f| f.name == name) {
            Some(i) => Ok(files.remove(i)),
            None => Err(RegistryError::UnknownFile {
                kind,
                name: name.to_owned(),
            }),
        }
    }

    /// Snapshot of the whole state in exchange form.
    pub fn export(&self) -> ExchangeDocument {
        ExchangeDocument {
            annotations: self.annotations.clone(),
            doc_files: self.doc_files.clone(),
            code_files: self.code_files.clone(),
        }
    }

    pub fn serialize(&self, pretty: bool) -> Result<String, ExchangeError> {
        self.export().to_json(pretty)
    }

    /// Replace the whole state with `document`. On error nothing changes.
    ///
    /// Annotations without ranges are dropped. Returns how many were dropped.
    pub fn import(&mut self, document: ExchangeDocument) -> Result<usize, ExchangeError> {
        let (registry, dropped) = Self::build(document)?;
        *self = registry;
        Ok(dropped)
    }

    /// Parse, validate and build a registry from exchange JSON.
    pub fn deserialize(json: &str) -> Result<Self, ExchangeError> {
        let document = ExchangeDocument::from_json(json)?;
        Self::build(document).map(|(registry, _)| registry)
    }

    fn build(document: ExchangeDocument) -> Result<(Self, usize), ExchangeError> {
        document.validate()?;
        let ExchangeDocument {
            annotations,
            doc_files,
            code_files,
        } = document;
        let before = annotations.len();
        let annotations: Vec<Annotation> = annotations
            .into_iter()
            .filter(|a| {
                if a.is_empty() {
                    warn!(id = %a.id, "dropping imported annotation without ranges");
                }
                !a.is_empty()
            })
            .collect();
        let dropped = before - annotations.len();
        Ok((
            Self {
                annotations,
                doc_files,
                code_files,
            },
            dropped,
        ))
    }

    fn position(&self, id: AnnotationId) -> Result<usize, RegistryError> {
        self.annotations
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| {
                let err = RegistryError::UnknownAnnotation(id);
                error!("{err}");
                err
            })
    }

    fn get_mut(&mut self, id: AnnotationId) -> Result<&mut Annotation, RegistryError> {
        let position = self.position(id)?;
        Ok(&mut self.annotations[position])
    }

    fn files_mut(&mut self, kind: SourceKind) -> &mut Vec<ProjectFile> {
        match kind {
            SourceKind::Doc => &mut self.doc_files,
            SourceKind::Code => &mut self.code_files,
        }
    }
}

fn check_range(range: &AnchoredRange) -> Result<(), RegistryError> {
    if range.start > range.end {
        let err = RegistryError::InvertedRange {
            document_id: range.document_id.clone(),
            start: range.start,
            end: range.end,
        };
        error!("{err}");
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offset::SourceOffset;

    fn doc_range(start: usize, end: usize) -> AnchoredRange {
        AnchoredRange::new("req.md", SourceOffset { start, end }, "")
    }

    fn code_range(start: usize, end: usize) -> AnchoredRange {
        AnchoredRange::new("main.c", SourceOffset { start, end }, "")
    }

    #[test]
    fn removing_last_range_deletes_annotation() {
        let mut registry = AnnotationRegistry::new();
        let id = registry
            .create("Timing", doc_range(0, 4), SourceKind::Doc)
            .unwrap()
            .id;
        let outcome = registry.remove_range(id, SourceKind::Doc, 0).unwrap();
        assert!(matches!(outcome, RemoveOutcome::AnnotationDeleted(_)));
        assert!(registry.get(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn removing_one_of_several_keeps_annotation() {
        let mut registry = AnnotationRegistry::new();
        let id = registry
            .create("Timing", doc_range(0, 4), SourceKind::Doc)
            .unwrap()
            .id;
        registry.append_range(id, code_range(10, 20), SourceKind::Code).unwrap();
        let outcome = registry.remove_range(id, SourceKind::Doc, 0).unwrap();
        assert_eq!(outcome, RemoveOutcome::RangeRemoved(doc_range(0, 4)));
        assert_eq!(registry.get(id).unwrap().code_ranges.len(), 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut registry = AnnotationRegistry::new();
        let id = registry
            .create("Dup", code_range(1, 2), SourceKind::Code)
            .unwrap()
            .id;
        registry.append_range(id, code_range(1, 2), SourceKind::Code).unwrap();
        assert_eq!(registry.get(id).unwrap().code_ranges.len(), 2);
    }

    #[test]
    fn contract_violations_do_not_mutate() {
        let mut registry = AnnotationRegistry::new();
        let id = registry
            .create("Timing", doc_range(0, 4), SourceKind::Doc)
            .unwrap()
            .id;
        let before = registry.get(id).unwrap().clone();

        assert!(matches!(
            registry.remove_range(id, SourceKind::Code, 0),
            Err(RegistryError::RangeIndexOutOfBounds { len: 0, .. })
        ));
        assert!(matches!(
            registry.append_range(id, doc_range(5, 1), SourceKind::Doc),
            Err(RegistryError::InvertedRange { .. })
        ));
        let ghost = AnnotationId::generate();
        assert!(matches!(
            registry.append_range(ghost, doc_range(0, 1), SourceKind::Doc),
            Err(RegistryError::UnknownAnnotation(_))
        ));
        assert_eq!(registry.get(id), Some(&before));
    }

    #[test]
    fn rename_bumps_update_time() {
        let mut registry = AnnotationRegistry::new();
        let id = registry
            .create("Old", doc_range(0, 1), SourceKind::Doc)
            .unwrap()
            .id;
        let created = registry.get(id).unwrap().update_time;
        registry.rename(id, "New").unwrap();
        let annotation = registry.get(id).unwrap();
        assert_eq!(annotation.category, "New");
        assert!(annotation.update_time >= created);
    }

    #[test]
    fn covering_filters_by_document_and_offset() {
        let mut registry = AnnotationRegistry::new();
        registry.create("a", doc_range(0, 10), SourceKind::Doc).unwrap();
        registry.create("b", doc_range(5, 8), SourceKind::Doc).unwrap();
        registry.create("c", code_range(0, 10), SourceKind::Code).unwrap();
        let names: Vec<_> = registry
            .covering(SourceKind::Doc, "req.md", 6)
            .map(|a| a.category.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.covering(SourceKind::Doc, "req.md", 10).count(), 0);
    }

    #[test]
    fn file_names_are_unique_per_kind() {
        let mut registry = AnnotationRegistry::new();
        registry
            .add_file(ProjectFile::new("x", "", SourceKind::Doc))
            .unwrap();
        registry
            .add_file(ProjectFile::new("x", "", SourceKind::Code))
            .unwrap();
        assert!(matches!(
            registry.add_file(ProjectFile::new("x", "", SourceKind::Doc)),
            Err(RegistryError::DuplicateFile { .. })
        ));
        registry.remove_file(SourceKind::Doc, "x").unwrap();
        assert!(registry.file_by_name(SourceKind::Doc, "x").is_none());
        assert!(registry.file_by_name(SourceKind::Code, "x").is_some());
    }

    #[test]
    fn round_trip_preserves_everything() {
        let mut registry = AnnotationRegistry::new();
        registry
            .add_file(ProjectFile::new("req.md", "# Req\n", SourceKind::Doc))
            .unwrap();
        let id = registry
            .create("Timing", AnchoredRange::new("req.md", SourceOffset::at(2, 3), "Req"), SourceKind::Doc)
            .unwrap()
            .id;
        registry
            .append_range(id, AnchoredRange::new("main.c", SourceOffset::at(0, 4), "int "), SourceKind::Code)
            .unwrap();

        let json = registry.serialize(true).unwrap();
        let restored = AnnotationRegistry::deserialize(&json).unwrap();
        assert_eq!(restored.export(), registry.export());
    }

    #[test]
    fn failed_import_keeps_current_state() {
        let mut registry = AnnotationRegistry::new();
        registry.create("keep", doc_range(0, 1), SourceKind::Doc).unwrap();
        let bad = ExchangeDocument {
            annotations: vec![
                registry.iter().next().unwrap().clone(),
                registry.iter().next().unwrap().clone(),
            ],
            ..ExchangeDocument::default()
        };
        assert!(registry.import(bad).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn import_drops_empty_annotations() {
        let json = r#"{"annotations": [{"category": "empty"}, {"docRanges": [{"documentId": "a", "start": 0, "end": 1}]}], "docFiles": [], "codeFiles": []}"#;
        let mut registry = AnnotationRegistry::new();
        let dropped = registry
            .import(ExchangeDocument::from_json(json).unwrap())
            .unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().category, crate::annotation::DEFAULT_CATEGORY);
    }
}

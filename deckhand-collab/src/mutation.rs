//! Slide and element mutations.
//!
//! Each [`Mutation`] names the [`Operation`] it needs; [`execute`] runs the
//! authorization gate against the loaded document and then applies it.
//! Element writes are whole-element overwrites (last writer wins).

use uuid::Uuid;

use crate::auth::{self, Denied, Operation};
use crate::model::{ConnectionId, Document, ElementDraft, Slide};

/// A requested change to a document's slides.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    AddSlide,
    RemoveSlide { slide_id: Uuid },
    UpsertElement { slide_id: Uuid, element: ElementDraft },
    RemoveElement { slide_id: Uuid, element_id: Uuid },
}

/// What a mutation did to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    SlideAdded(Uuid),
    SlideRemoved(Uuid),
    ElementInserted { slide_id: Uuid, element_id: Uuid },
    ElementReplaced { slide_id: Uuid, element_id: Uuid },
    ElementRemoved { slide_id: Uuid, element_id: Uuid },
    /// Target slide or element did not exist.
    Unchanged,
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Unchanged)
    }
}

impl Mutation {
    /// Permission needed to perform this mutation.
    pub fn required_operation(&self) -> Operation {
        match self {
            Mutation::AddSlide | Mutation::RemoveSlide { .. } => Operation::ManageSlides,
            Mutation::UpsertElement { .. } | Mutation::RemoveElement { .. } => {
                Operation::ManageElements
            }
        }
    }

    /// Apply without any permission check.
    pub fn apply(self, document: &mut Document) -> Applied {
        match self {
            Mutation::AddSlide => {
                let slide = Slide::new();
                let id = slide.id;
                document.slides.push(slide);
                Applied::SlideAdded(id)
            }

            // The last remaining slide may be removed too.
            Mutation::RemoveSlide { slide_id } => {
                let before = document.slides.len();
                document.slides.retain(|s| s.id != slide_id);
                if document.slides.len() < before {
                    Applied::SlideRemoved(slide_id)
                } else {
                    Applied::Unchanged
                }
            }

            Mutation::UpsertElement { slide_id, element } => {
                let Some(slide) = document.slide_mut(slide_id) else {
                    return Applied::Unchanged;
                };
                match element.id {
                    Some(element_id) => {
                        let replacement = element.into_element(element_id);
                        match slide.elements.iter_mut().find(|e| e.id == element_id) {
                            Some(existing) => {
                                *existing = replacement;
                                Applied::ElementReplaced {
                                    slide_id,
                                    element_id,
                                }
                            }
                            None => {
                                slide.elements.push(replacement);
                                Applied::ElementInserted {
                                    slide_id,
                                    element_id,
                                }
                            }
                        }
                    }
                    None => {
                        let element_id = Uuid::new_v4();
                        slide.elements.push(element.into_element(element_id));
                        Applied::ElementInserted {
                            slide_id,
                            element_id,
                        }
                    }
                }
            }

            Mutation::RemoveElement {
                slide_id,
                element_id,
            } => {
                let Some(slide) = document.slide_mut(slide_id) else {
                    return Applied::Unchanged;
                };
                match slide.elements.iter().position(|e| e.id == element_id) {
                    Some(index) => {
                        slide.elements.remove(index);
                        Applied::ElementRemoved {
                            slide_id,
                            element_id,
                        }
                    }
                    None => Applied::Unchanged,
                }
            }
        }
    }
}

/// Authorize `actor` for `mutation` and apply it.
pub fn execute(
    document: &mut Document,
    actor: ConnectionId,
    mutation: Mutation,
) -> Result<Applied, Denied> {
    auth::authorize(document, actor, mutation.required_operation())?;
    Ok(mutation.apply(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::membership;
    use crate::model::Role;

    struct Fixture {
        doc: Document,
        creator: ConnectionId,
        editor: ConnectionId,
        viewer: ConnectionId,
    }

    fn fixture() -> Fixture {
        let mut doc = Document::new("Deck");
        let creator = ConnectionId::new();
        let editor = ConnectionId::new();
        let viewer = ConnectionId::new();
        membership::admit(&mut doc, creator, "Alice");
        membership::admit(&mut doc, editor, "Bob");
        membership::admit(&mut doc, viewer, "Carol");
        membership::assign_role(&mut doc, creator, editor, Role::Editor).unwrap();
        Fixture {
            doc,
            creator,
            editor,
            viewer,
        }
    }

    #[test]
    fn test_add_slide_appends() {
        let mut f = fixture();
        let first = f.doc.slides[0].id;
        let applied = execute(&mut f.doc, f.creator, Mutation::AddSlide).unwrap();

        let Applied::SlideAdded(id) = applied else {
            panic!("expected SlideAdded, got {applied:?}");
        };
        assert_eq!(f.doc.slides.len(), 2);
        assert_eq!(f.doc.slides[0].id, first);
        assert_eq!(f.doc.slides[1].id, id);
        assert!(f.doc.slides[1].elements.is_empty());
    }

    #[test]
    fn test_slide_management_creator_only() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        for actor in [f.editor, f.viewer, ConnectionId::new()] {
            assert!(execute(&mut f.doc, actor, Mutation::AddSlide).is_err());
            assert!(execute(&mut f.doc, actor, Mutation::RemoveSlide { slide_id }).is_err());
        }
        assert_eq!(f.doc.slides.len(), 1);
    }

    #[test]
    fn test_remove_slide() {
        let mut f = fixture();
        execute(&mut f.doc, f.creator, Mutation::AddSlide).unwrap();
        let target = f.doc.slides[0].id;

        let applied = execute(&mut f.doc, f.creator, Mutation::RemoveSlide { slide_id: target }).unwrap();
        assert_eq!(applied, Applied::SlideRemoved(target));
        assert_eq!(f.doc.slides.len(), 1);
        assert!(f.doc.slide(target).is_none());
    }

    #[test]
    fn test_remove_missing_slide_is_noop() {
        let mut f = fixture();
        let before = f.doc.clone();
        let applied = execute(
            &mut f.doc,
            f.creator,
            Mutation::RemoveSlide {
                slide_id: Uuid::new_v4(),
            },
        )
        .unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert_eq!(f.doc, before);
    }

    #[test]
    fn test_remove_last_slide_allowed() {
        let mut f = fixture();
        let only = f.doc.slides[0].id;
        execute(&mut f.doc, f.creator, Mutation::RemoveSlide { slide_id: only }).unwrap();
        assert!(f.doc.slides.is_empty());
    }

    #[test]
    fn test_insert_without_id_generates_fresh_id() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        let mut seen = Vec::new();

        for n in 0..3 {
            let applied = execute(
                &mut f.doc,
                f.editor,
                Mutation::UpsertElement {
                    slide_id,
                    element: ElementDraft::default(),
                },
            )
            .unwrap();
            let Applied::ElementInserted { element_id, .. } = applied else {
                panic!("expected insert, got {applied:?}");
            };
            assert!(!seen.contains(&element_id));
            seen.push(element_id);
            assert_eq!(f.doc.slides[0].elements.len(), n + 1);
        }

        let inserted = &f.doc.slides[0].elements[0];
        assert_eq!(inserted.content, "");
    }

    #[test]
    fn test_upsert_replaces_all_fields() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        let Applied::ElementInserted { element_id, .. } = execute(
            &mut f.doc,
            f.creator,
            Mutation::UpsertElement {
                slide_id,
                element: ElementDraft::text("Hello", 10.0, 20.0),
            },
        )
        .unwrap() else {
            panic!("expected insert");
        };

        let replacement = ElementDraft::replacing(element_id, "World", 30.5, -4.0);
        let applied = execute(
            &mut f.doc,
            f.editor,
            Mutation::UpsertElement {
                slide_id,
                element: replacement.clone(),
            },
        )
        .unwrap();

        assert_eq!(
            applied,
            Applied::ElementReplaced {
                slide_id,
                element_id
            }
        );
        let slide = f.doc.slide(slide_id).unwrap();
        assert_eq!(slide.elements.len(), 1);
        assert_eq!(slide.element(element_id), Some(&replacement.into_element(element_id)));
    }

    #[test]
    fn test_upsert_unknown_id_appends() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        let element_id = Uuid::new_v4();

        let applied = execute(
            &mut f.doc,
            f.editor,
            Mutation::UpsertElement {
                slide_id,
                element: ElementDraft::replacing(element_id, "img:cat.png", 1.0, 2.0),
            },
        )
        .unwrap();

        assert_eq!(
            applied,
            Applied::ElementInserted {
                slide_id,
                element_id
            }
        );
        assert_eq!(f.doc.slides[0].elements[0].id, element_id);
    }

    #[test]
    fn test_upsert_unknown_slide_unchanged() {
        let mut f = fixture();
        let applied = execute(
            &mut f.doc,
            f.editor,
            Mutation::UpsertElement {
                slide_id: Uuid::new_v4(),
                element: ElementDraft::text("lost", 0.0, 0.0),
            },
        )
        .unwrap();
        assert_eq!(applied, Applied::Unchanged);
        assert!(!applied.changed());
    }

    #[test]
    fn test_viewer_cannot_touch_elements() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        let err = execute(
            &mut f.doc,
            f.viewer,
            Mutation::UpsertElement {
                slide_id,
                element: ElementDraft::text("nope", 0.0, 0.0),
            },
        )
        .unwrap_err();
        assert_eq!(err.operation, Operation::ManageElements);
        assert!(f.doc.slides[0].elements.is_empty());
    }

    #[test]
    fn test_remove_element_exactly_one() {
        let mut f = fixture();
        let slide_id = f.doc.slides[0].id;
        let mut ids = Vec::new();
        for label in ["a", "b", "c"] {
            if let Applied::ElementInserted { element_id, .. } = execute(
                &mut f.doc,
                f.editor,
                Mutation::UpsertElement {
                    slide_id,
                    element: ElementDraft::text(label, 0.0, 0.0),
                },
            )
            .unwrap()
            {
                ids.push(element_id);
            }
        }

        let applied = execute(
            &mut f.doc,
            f.editor,
            Mutation::RemoveElement {
                slide_id,
                element_id: ids[1],
            },
        )
        .unwrap();
        assert!(applied.changed());

        let remaining: Vec<Uuid> = f.doc.slides[0].elements.iter().map(|e| e.id).collect();
        assert_eq!(remaining, vec![ids[0], ids[2]]);

        let again = execute(
            &mut f.doc,
            f.editor,
            Mutation::RemoveElement {
                slide_id,
                element_id: ids[1],
            },
        )
        .unwrap();
        assert_eq!(again, Applied::Unchanged);
        assert_eq!(f.doc.slides[0].elements.len(), 2);
    }

    #[test]
    fn test_remove_element_unknown_slide() {
        let mut f = fixture();
        let applied = execute(
            &mut f.doc,
            f.creator,
            Mutation::RemoveElement {
                slide_id: Uuid::new_v4(),
                element_id: Uuid::new_v4(),
            },
        )
        .unwrap();
        assert_eq!(applied, Applied::Unchanged);
    }
}

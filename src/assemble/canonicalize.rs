//! Reference canonicalization
//!
//! Rewrites file references (and the `#/definitions/<Id>` long form) into the
//! `#<Id>` form matching each definition's `$id`.

use serde_json::Value;

use crate::error::{AssemblyError, Result};
use crate::reference::{child_pointer, definition_ref, visit_refs_mut, Reference, DEFINITIONS_KEY};
use crate::registry::FragmentRegistry;

/// Rewrite every fragment reference in `document`, returning how many changed.
///
/// Fails on the first reference naming an id absent from the registry.
///
/// The root tree is visited before `definitions`, so a bad reference written
/// in the entry fragment is reported at its root location.
pub fn canonicalize_references(document: &mut Value, registry: &FragmentRegistry) -> Result<usize> {
    let definitions = document.as_object_mut().and_then(|root| root.remove(DEFINITIONS_KEY));

    let mut rewritten = 0;
    let mut rewrite = |location: &str, value: &mut String| {
        let target = match registry.parse_ref(value) {
            Reference::Pointer(_) => return Ok(()),
            Reference::External {
                target,
                fragment: Some(pointer),
                ..
            } => {
                return Err(AssemblyError::UnresolvedReference {
                    reference: value.clone(),
                    target: format!("{}#{}", target, pointer),
                    location: location.to_string(),
                })
            }
            Reference::External { target, .. } | Reference::Definition { target } => target,
        };

        if !registry.contains(&target) {
            return Err(AssemblyError::UnresolvedReference {
                reference: value.clone(),
                target,
                location: location.to_string(),
            });
        }

        let canonical = definition_ref(&target);
        if *value != canonical {
            *value = canonical;
            rewritten += 1;
        }
        Ok(())
    };

    let result = visit_refs_mut(document, "", &mut rewrite);
    let result = match definitions {
        Some(mut definitions) => {
            let result = result.and_then(|()| {
                visit_refs_mut(&mut definitions, &child_pointer("", DEFINITIONS_KEY), &mut rewrite)
            });
            if let Some(root) = document.as_object_mut() {
                root.insert(DEFINITIONS_KEY.to_string(), definitions);
            }
            result
        }
        None => result,
    };

    result.map(|()| rewritten)
}

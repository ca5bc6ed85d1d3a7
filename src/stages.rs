//! The concrete conversion pipeline: stage definitions and prompt assembly.
//!
//! Five stages analyze a legacy desktop form and emit scaffolding for a
//! three-tier web admin application. The stage list is configuration, fixed
//! at build time; ordinals and input keys here are the single source of truth
//! for dependency checking.

use crate::stage::StageDescriptor;
use crate::types::StageId;

/// The full pipeline in execution order.
pub const PIPELINE: [StageDescriptor; 5] = [
    StageDescriptor {
        id: StageId::FormStructure,
        inputs: &[],
    },
    StageDescriptor {
        id: StageId::BusinessLogic,
        inputs: &[StageId::FormStructure],
    },
    StageDescriptor {
        id: StageId::DataAccess,
        inputs: &[StageId::FormStructure],
    },
    StageDescriptor {
        id: StageId::Security,
        inputs: &[StageId::FormStructure, StageId::BusinessLogic],
    },
    StageDescriptor {
        id: StageId::TemplateGeneration,
        inputs: &[
            StageId::FormStructure,
            StageId::BusinessLogic,
            StageId::DataAccess,
            StageId::Security,
        ],
    },
];

/// Look up a stage descriptor by id.
#[must_use]
pub fn descriptor(id: StageId) -> &'static StageDescriptor {
    // PIPELINE is indexed by ordinal.
    &PIPELINE[id.ordinal() as usize]
}

/// Stage-specific instruction block sent to the agent.
#[must_use]
fn instructions(stage: StageId) -> &'static str {
    match stage {
        StageId::FormStructure => {
            "Analyze the legacy desktop form for this entity. Inventory every \
             control (grids, text boxes, combo boxes, checkboxes, tab pages), \
             its data binding, default value, and enabled/visible rules. Emit a \
             single JSON object with `fields`, `grids`, `lookups`, and \
             `layout` arrays. Emit JSON only, no commentary."
        }
        StageId::BusinessLogic => {
            "Extract the validation and business rules behind the legacy form: \
             required fields, range checks, cross-field rules, calculated \
             values, and event-driven behavior (on-change, on-save). Use the \
             form structure analysis provided below. Emit a single JSON object \
             with `validations`, `calculations`, and `workflows` arrays. Emit \
             JSON only, no commentary."
        }
        StageId::DataAccess => {
            "Analyze the data access paths for this entity: tables, views, \
             stored procedures, and the parameters each CRUD operation uses. \
             Map every bound field from the form structure analysis to its \
             backing column. Emit a single JSON object with `tables`, \
             `procedures`, and `columnMap` entries. Emit JSON only, no \
             commentary."
        }
        StageId::Security => {
            "Extract the permission model for this entity: which roles may \
             view, create, edit, or delete records, and any field-level \
             restrictions implied by the form's enabled/visible rules or \
             validation logic. Emit a single JSON object with `roles` and \
             `fieldRestrictions` arrays. Emit JSON only, no commentary."
        }
        StageId::TemplateGeneration => {
            "Using all prior analyses provided below, generate the CRUD \
             scaffolding for the web admin application: controller actions, \
             DTOs, view models, SQL statements, Razor view skeletons, and \
             DataTables wiring. Emit a markdown document with one fenced code \
             block per generated file, each preceded by its target path."
        }
    }
}

/// Assemble the full prompt for one stage invocation.
///
/// Input artifacts are embedded in pipeline order so the rendered prompt is
/// deterministic for identical store contents.
#[must_use]
pub fn build_prompt(
    stage: StageId,
    entity: &str,
    form_type: Option<&str>,
    inputs: &[(StageId, String)],
    overlay: Option<&str>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "# formbridge {} stage\n\nEntity: {entity}\n",
        stage.as_str()
    ));
    if let Some(form_type) = form_type {
        prompt.push_str(&format!("Form type: {form_type}\n"));
    }
    prompt.push('\n');
    prompt.push_str(instructions(stage));
    prompt.push('\n');

    for (input, content) in inputs {
        prompt.push_str(&format!(
            "\n## Input artifact: {}\n\n```\n{}\n```\n",
            input.artifact_filename(),
            content.trim_end()
        ));
    }

    if let Some(overlay) = overlay {
        prompt.push_str(&format!(
            "\n## Operator task notes\n\n```\n{}\n```\n",
            overlay.trim_end()
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_is_in_ordinal_order() {
        for (i, desc) in PIPELINE.iter().enumerate() {
            assert_eq!(desc.id.ordinal() as usize, i);
        }
    }

    #[test]
    fn inputs_only_reference_earlier_stages() {
        for desc in &PIPELINE {
            for input in desc.inputs {
                assert!(
                    input.ordinal() < desc.id.ordinal(),
                    "{} must not depend on {}",
                    desc.id,
                    input
                );
            }
        }
    }

    #[test]
    fn descriptor_lookup_matches_id() {
        for stage in StageId::ALL {
            assert_eq!(descriptor(stage).id, stage);
        }
    }

    #[test]
    fn prompt_embeds_entity_and_inputs() {
        let inputs = vec![(StageId::FormStructure, "{\"fields\":[]}".to_string())];
        let prompt = build_prompt(
            StageId::BusinessLogic,
            "Facility",
            Some("master-detail"),
            &inputs,
            None,
        );
        assert!(prompt.contains("Entity: Facility"));
        assert!(prompt.contains("Form type: master-detail"));
        assert!(prompt.contains("00-form-structure.json"));
        assert!(prompt.contains("{\"fields\":[]}"));
    }

    #[test]
    fn prompt_includes_overlay_when_present() {
        let prompt = build_prompt(
            StageId::TemplateGeneration,
            "Barge",
            None,
            &[],
            Some("{\"notes\":\"skip audit columns\"}"),
        );
        assert!(prompt.contains("Operator task notes"));
        assert!(prompt.contains("skip audit columns"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let inputs = vec![
            (StageId::FormStructure, "a".to_string()),
            (StageId::BusinessLogic, "b".to_string()),
        ];
        let one = build_prompt(StageId::Security, "River", None, &inputs, None);
        let two = build_prompt(StageId::Security, "River", None, &inputs, None);
        assert_eq!(one, two);
    }
}

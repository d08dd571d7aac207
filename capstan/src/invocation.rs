//! Skill invocation parsing.
//!
//! Turns the ordered parts of an inbound message into a [`SkillInvocation`]:
//! the first text part becomes free-text context, data parts are
//! shallow-merged into the parameter document in order (later keys win), and
//! file parts are collected with their order preserved. The reserved `skill`
//! key inside the merged parameters names the capability; when absent, the
//! trimmed context text is used as the name instead.

use capstan_types::{FileReference, Part, Role, Task};
use serde_json::{Map, Value};

use crate::errors::{EngineError, EngineResult};

/// Ephemeral view of one capability invocation, derived from message parts
/// and never persisted.
#[derive(Debug, Clone, Default)]
pub struct SkillInvocation {
    /// Capability name from the reserved `skill` parameter, when present.
    pub capability: Option<String>,
    /// Shallow merge of all data parts, in order.
    pub parameters: Map<String, Value>,
    /// First text part, when present.
    pub context: Option<String>,
    /// All file parts, order preserved.
    pub files: Vec<FileReference>,
}

impl SkillInvocation {
    /// Resolvable capability name: the explicit `skill` parameter, falling
    /// back on the trimmed context text.
    pub fn capability_name(&self) -> Option<&str> {
        if let Some(capability) = self.capability.as_deref() {
            return Some(capability);
        }
        self.context
            .as_deref()
            .map(str::trim)
            .filter(|context| !context.is_empty())
    }

    /// Typed view of the parameters, for handlers that deserialize a schema.
    pub fn parameters_as<T: serde::de::DeserializeOwned>(&self) -> EngineResult<T> {
        Ok(serde_json::from_value(Value::Object(self.parameters.clone()))?)
    }
}

/// Parses the parts of one inbound message. Rejects structurally invalid
/// requests (no parts, no capability name derivable, non-object data parts)
/// before any task is created; whether the name resolves in the registry is
/// decided later, at execution time.
pub fn parse_invocation(parts: &[Part]) -> EngineResult<SkillInvocation> {
    if parts.is_empty() {
        return Err(EngineError::validation(
            "parts",
            "at least one part is required",
        ));
    }

    let mut invocation = SkillInvocation::default();
    merge_parts(&mut invocation, parts)?;

    if invocation.capability_name().is_none() {
        return Err(EngineError::validation(
            "skill",
            "no capability name: provide a 'skill' parameter or a text part",
        ));
    }

    Ok(invocation)
}

/// Rebuilds the invocation for a continuation from the task's accumulated
/// requester turns. The capability recorded at creation stays authoritative;
/// parameters and files accumulate across turns with later keys winning.
pub fn invocation_from_history(task: &Task) -> EngineResult<SkillInvocation> {
    let mut invocation = SkillInvocation {
        capability: Some(task.metadata.capability.clone()),
        ..SkillInvocation::default()
    };

    for message in task.messages.iter().filter(|m| m.role == Role::Requester) {
        merge_parts(&mut invocation, &message.parts)?;
    }

    // A later turn carrying its own `skill` key must not rename the task.
    invocation.capability = Some(task.metadata.capability.clone());

    Ok(invocation)
}

fn merge_parts(invocation: &mut SkillInvocation, parts: &[Part]) -> EngineResult<()> {
    for part in parts {
        match part {
            Part::Text { text } => {
                if invocation.context.is_none() {
                    invocation.context = Some(text.clone());
                }
            }
            Part::Data { data } => {
                let Value::Object(object) = data else {
                    return Err(EngineError::validation(
                        "parts",
                        "data parts must be JSON objects",
                    ));
                };
                for (key, value) in object {
                    if key == "skill" {
                        if let Value::String(name) = value {
                            invocation.capability = Some(name.clone());
                            continue;
                        }
                    }
                    invocation.parameters.insert(key.clone(), value.clone());
                }
            }
            Part::File { file } => invocation.files.push(file.clone()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_types::Message;
    use serde_json::json;

    #[test]
    fn rejects_empty_parts() {
        let err = parse_invocation(&[]).unwrap_err();
        assert!(matches!(err, EngineError::Validation { field, .. } if field == "parts"));
    }

    #[test]
    fn extracts_skill_context_and_files() {
        let parts = vec![
            Part::text("find running shoes"),
            Part::data(json!({"skill": "get_products", "query": "shoes"})),
            Part::File {
                file: FileReference {
                    uri: "https://example.com/brief.pdf".into(),
                    mime_type: Some("application/pdf".into()),
                    name: Some("brief".into()),
                },
            },
        ];

        let invocation = parse_invocation(&parts).unwrap();
        assert_eq!(invocation.capability_name(), Some("get_products"));
        assert_eq!(invocation.context.as_deref(), Some("find running shoes"));
        assert_eq!(invocation.parameters["query"], "shoes");
        assert!(!invocation.parameters.contains_key("skill"));
        assert_eq!(invocation.files.len(), 1);
        assert_eq!(invocation.files[0].uri, "https://example.com/brief.pdf");
    }

    #[test]
    fn later_data_parts_win_on_key_conflict() {
        let parts = vec![
            Part::data(json!({"skill": "get_products", "limit": 10, "query": "a"})),
            Part::data(json!({"limit": 25})),
        ];

        let invocation = parse_invocation(&parts).unwrap();
        assert_eq!(invocation.parameters["limit"], 25);
        assert_eq!(invocation.parameters["query"], "a");
    }

    #[test]
    fn first_text_part_becomes_context() {
        let parts = vec![Part::text("first"), Part::text("second")];
        let invocation = parse_invocation(&parts).unwrap();
        assert_eq!(invocation.context.as_deref(), Some("first"));
        // Context doubles as the capability fallback.
        assert_eq!(invocation.capability_name(), Some("first"));
    }

    #[test]
    fn rejects_non_object_data_part() {
        let parts = vec![Part::data(json!([1, 2, 3]))];
        let err = parse_invocation(&parts).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn rejects_when_no_name_derivable() {
        let parts = vec![Part::data(json!({"query": "shoes"}))];
        let err = parse_invocation(&parts).unwrap_err();
        assert!(matches!(err, EngineError::Validation { field, .. } if field == "skill"));
    }

    #[test]
    fn history_accumulates_requester_turns_only() {
        let mut task = crate::store::tests_support::task_fixture("get_products");
        task.messages.push(
            Message::requester(vec![Part::data(json!({"query": "shoes"}))]).with_task_id("t"),
        );
        task.messages
            .push(Message::engine(vec![Part::data(json!({"noise": true}))]).with_task_id("t"));
        task.messages.push(
            Message::requester(vec![Part::data(json!({"budget": 500}))]).with_task_id("t"),
        );

        let invocation = invocation_from_history(&task).unwrap();
        assert_eq!(invocation.capability_name(), Some("get_products"));
        assert_eq!(invocation.parameters["query"], "shoes");
        assert_eq!(invocation.parameters["budget"], 500);
        assert!(!invocation.parameters.contains_key("noise"));
    }

    #[test]
    fn continuation_turn_cannot_rename_the_capability() {
        let mut task = crate::store::tests_support::task_fixture("get_products");
        task.messages.push(
            Message::requester(vec![Part::data(
                json!({"skill": "activate_signal", "budget": 500}),
            )])
            .with_task_id("t"),
        );

        let invocation = invocation_from_history(&task).unwrap();
        assert_eq!(invocation.capability_name(), Some("get_products"));
        assert_eq!(invocation.parameters["budget"], 500);
        assert!(!invocation.parameters.contains_key("skill"));
    }
}

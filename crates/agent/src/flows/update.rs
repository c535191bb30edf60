//! Update flow (§4.12): identity proof via recognition → confirm identity
//! → choose field(s) → for each, free-form capture + confirm → compose
//! `update_user`.

use std::collections::HashMap;

use facegate_core::model::validate_name;

use crate::error::FlowError;
use crate::flows::common::FlowContext;

const NAME_SYNONYMS: &[&str] = &["name", "names"];
const METADATA_SYNONYMS: &[&str] = &["metadata", "info", "information", "details", "profile"];
const BOTH_SYNONYMS: &[&str] = &["both", "everything", "all"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldChoice {
    Name,
    Metadata,
    Both,
    Unclear,
}

/// Parse a field choice over a small enumerated synonym set, the same
/// keyword-matching idiom the Intent Oracle (C11) uses for yes/no (§4.11),
/// generalized from two labels to four.
fn parse_field_choice(utterance: &str) -> FieldChoice {
    let lowered = utterance.to_lowercase();
    let has = |set: &[&str]| set.iter().any(|w| lowered.contains(w));
    if has(BOTH_SYNONYMS) {
        FieldChoice::Both
    } else if has(NAME_SYNONYMS) && has(METADATA_SYNONYMS) {
        FieldChoice::Both
    } else if has(NAME_SYNONYMS) {
        FieldChoice::Name
    } else if has(METADATA_SYNONYMS) {
        FieldChoice::Metadata
    } else {
        FieldChoice::Unclear
    }
}

pub fn run(ctx: &FlowContext) -> Result<(), FlowError> {
    let Some((user_id, display_name)) = prove_identity(ctx)? else {
        ctx.speak("I don't recognize you, so I can't update a profile right now.")?;
        return Ok(());
    };

    if !ctx.confirm_destructive(&format!("Is this {display_name}?"))? {
        ctx.speak("Okay, cancelling.")?;
        return Ok(());
    }

    let choice = loop {
        ctx.speak("Would you like to update your name, your metadata, or both?")?;
        let reply = ctx.listen_non_empty("Sorry, I didn't catch that. Name, metadata, or both?")?;
        match parse_field_choice(&reply) {
            FieldChoice::Unclear => continue,
            other => break other,
        }
    };

    let mut new_name = None;
    let mut new_metadata: Option<HashMap<String, String>> = None;

    if matches!(choice, FieldChoice::Name | FieldChoice::Both) {
        new_name = Some(collect_new_name(ctx)?);
    }
    if matches!(choice, FieldChoice::Metadata | FieldChoice::Both) {
        new_metadata = Some(collect_new_metadata(ctx)?);
    }

    let result = ctx.facade.update_user(&user_id, new_name.as_deref(), new_metadata)?;
    match result.get("status").and_then(|v| v.as_str()) {
        Some("ok") => ctx.speak("Done, your profile has been updated.")?,
        other => {
            return Err(FlowError::Tool {
                kind: "internal".to_string(),
                message: format!("unexpected update_user response status: {other:?}"),
            });
        }
    }
    Ok(())
}

fn collect_new_name(ctx: &FlowContext) -> Result<String, FlowError> {
    loop {
        ctx.speak("What should your new name be?")?;
        let name = ctx.listen_non_empty("I didn't catch that. What should your new name be?")?;
        let name = name.trim().to_string();
        if validate_name(&name).is_err() {
            ctx.speak("Sorry, that name isn't valid. Let's try again.")?;
            continue;
        }
        if ctx.confirm_destructive(&format!("I heard {name}. Is that correct?"))? {
            return Ok(name);
        }
    }
}

fn collect_new_metadata(ctx: &FlowContext) -> Result<HashMap<String, String>, FlowError> {
    ctx.speak("What note would you like on your profile?")?;
    let note = ctx.listen_non_empty("I didn't catch that. What note would you like on your profile?")?;
    let mut metadata = HashMap::new();
    metadata.insert("notes".to_string(), note.trim().to_string());
    Ok(metadata)
}

/// Identity proof via recognition: capture + `recognize_face`. Returns
/// `None` when the caller isn't recognized.
fn prove_identity(ctx: &FlowContext) -> Result<Option<(String, String)>, FlowError> {
    ctx.speak("First, let's confirm who you are. Please look at the camera.")?;
    let image = ctx.capture_image()?;
    let result = ctx.facade.recognize_face(&image, None)?;

    match result.get("status").and_then(|v| v.as_str()) {
        Some("recognized") => {
            let user = result.get("user").ok_or_else(|| FlowError::Tool {
                kind: "internal".to_string(),
                message: "recognize_face response missing user".to_string(),
            })?;
            let user_id = user
                .get("user_id")
                .and_then(|v| v.as_str())
                .ok_or_else(|| FlowError::Tool {
                    kind: "internal".to_string(),
                    message: "recognize_face user missing user_id".to_string(),
                })?
                .to_string();
            let name = user.get("name").and_then(|v| v.as_str()).unwrap_or("there").to_string();
            Ok(Some((user_id, name)))
        }
        Some("not_recognized") => Ok(None),
        other => Err(FlowError::Tool {
            kind: "internal".to_string(),
            message: format!("unexpected recognize_face response status: {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_choice_recognizes_synonyms() {
        assert_eq!(parse_field_choice("just my name please"), FieldChoice::Name);
        assert_eq!(parse_field_choice("update my metadata"), FieldChoice::Metadata);
        assert_eq!(parse_field_choice("both of them"), FieldChoice::Both);
        assert_eq!(parse_field_choice("name and info"), FieldChoice::Both);
        assert_eq!(parse_field_choice("hmm not sure"), FieldChoice::Unclear);
    }
}

//! Delete flow (§4.12): identity proof via recognition → confirm identity
//! (`Unclear`→cancel) → explain consequences → final confirmation
//! (`Unclear`→cancel) → `delete_user` → goodbye.

use crate::error::FlowError;
use crate::flows::common::FlowContext;

pub fn run(ctx: &FlowContext) -> Result<(), FlowError> {
    ctx.speak("First, let's confirm who you are. Please look at the camera.")?;
    let image = ctx.capture_image()?;
    let result = ctx.facade.recognize_face(&image, None)?;

    let (user_id, name) = match result.get("status").and_then(|v| v.as_str()) {
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
            (user_id, name)
        }
        Some("not_recognized") => {
            ctx.speak("I don't recognize you, so there's nothing for me to delete.")?;
            return Ok(());
        }
        other => {
            return Err(FlowError::Tool {
                kind: "internal".to_string(),
                message: format!("unexpected recognize_face response status: {other:?}"),
            });
        }
    };

    if !ctx.confirm_destructive(&format!("Is this {name}?"))? {
        ctx.speak("Okay, cancelling.")?;
        return Ok(());
    }

    ctx.speak("Deleting your profile removes your face data and recognition history permanently. This cannot be undone.")?;

    if !ctx.confirm_destructive("Are you sure you want to delete your profile?")? {
        ctx.speak("Okay, cancelling. Your profile is unchanged.")?;
        return Ok(());
    }

    let result = ctx.facade.delete_user(&user_id)?;
    match result.get("status").and_then(|v| v.as_str()) {
        Some("ok") => ctx.speak("Your profile has been deleted. Goodbye.")?,
        other => {
            return Err(FlowError::Tool {
                kind: "internal".to_string(),
                message: format!("unexpected delete_user response status: {other:?}"),
            });
        }
    }
    Ok(())
}

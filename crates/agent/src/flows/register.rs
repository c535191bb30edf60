//! Register flow (§4.12): wake-word → name prompt → free-form capture →
//! name validation (§3) → LLM confirmation → camera capture →
//! `register_user`.

use facegate_core::model::validate_name;

use crate::error::FlowError;
use crate::flows::common::FlowContext;

const MAX_NAME_ATTEMPTS: u32 = 3;

pub fn run(ctx: &FlowContext) -> Result<(), FlowError> {
    let name = prompt_for_confirmed_name(ctx)?;

    ctx.speak("Please look at the camera.")?;
    let image = ctx.capture_image()?;
    let result = ctx.facade.register_user(&name, &image, None)?;

    match result.get("status").and_then(|v| v.as_str()) {
        Some("registered") => {
            ctx.speak(&format!("Thanks, {name}. You're registered."))?;
        }
        Some("queued") => {
            ctx.speak("The recognizer is temporarily unavailable, so I've queued your registration. It will finish automatically once it's back.")?;
        }
        Some("already_exists") => {
            ctx.speak("It looks like a very similar face is already registered.")?;
        }
        other => {
            return Err(FlowError::Tool {
                kind: "internal".to_string(),
                message: format!("unexpected register_user response status: {other:?}"),
            });
        }
    }
    Ok(())
}

/// Collect a name, validate it, and get LLM confirmation before using it.
/// Retries the whole name+confirm cycle up to [`MAX_NAME_ATTEMPTS`] times.
fn prompt_for_confirmed_name(ctx: &FlowContext) -> Result<String, FlowError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        ctx.speak("What's your full name?")?;
        let name = ctx.listen_non_empty("I didn't catch that. What's your full name?")?;
        let name = name.trim().to_string();

        if let Err(reason) = validate_name(&name) {
            tracing::debug!(name, reason, "rejected name during registration");
            if attempt + 1 < MAX_NAME_ATTEMPTS {
                ctx.speak("Sorry, that name isn't valid. Names are two to a hundred letters, spaces, hyphens, or apostrophes.")?;
                continue;
            }
            return Err(FlowError::Cancelled(format!("no valid name after {MAX_NAME_ATTEMPTS} attempts")));
        }

        if ctx.confirm_destructive(&format!("I heard {name}. Is that correct?"))? {
            return Ok(name);
        }
    }
    Err(FlowError::Cancelled(format!("no confirmed name after {MAX_NAME_ATTEMPTS} attempts")))
}

//! Recognize flow (§4.12): wake-word → consent → capture image →
//! `recognize_face`; greet on a match, offer registration otherwise.

use crate::error::FlowError;
use crate::flows::common::FlowContext;
use crate::flows::register;

pub fn run(ctx: &FlowContext) -> Result<(), FlowError> {
    if !ctx.confirm_destructive("I'd like to verify your identity. Ready?")? {
        ctx.speak("Okay, maybe next time.")?;
        return Ok(());
    }

    ctx.speak("Please look at the camera.")?;
    let image = ctx.capture_image()?;
    let result = ctx.facade.recognize_face(&image, None)?;

    match result.get("status").and_then(|v| v.as_str()) {
        Some("recognized") => {
            let name = result
                .get("user")
                .and_then(|u| u.get("name"))
                .and_then(|v| v.as_str())
                .unwrap_or("there");
            if let Some(distance) = result.get("distance").and_then(|v| v.as_f64()) {
                let similarity = facegate_core::distance_to_similarity_percent(distance as f32);
                tracing::info!(similarity_percent = similarity, "recognized a match");
            }
            ctx.speak(&format!("Welcome back, {name}."))?;
        }
        Some("not_recognized") => {
            if ctx.confirm_destructive("I don't recognize you. Would you like to register?")? {
                register::run(ctx)?;
            } else {
                ctx.speak("Okay, goodbye for now.")?;
            }
        }
        other => {
            return Err(FlowError::Tool {
                kind: "internal".to_string(),
                message: format!("unexpected recognize_face response status: {other:?}"),
            });
        }
    }
    Ok(())
}

//! Voice Orchestrators (C12): the Recognize/Register/Update/Delete flows
//! (§4.12), each a small explicit state machine driven off [`FlowContext`].

mod common;
mod delete;
mod recognize;
mod register;
mod update;

pub use common::FlowContext;

/// The phrases the command grammar recognizes after a wake word, in the
/// order tried by [`select`] when a transcription matches more than one.
pub const COMMAND_PHRASES: &[&str] = &["recognize", "register", "update", "delete"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Recognize,
    Register,
    Update,
    Delete,
}

impl Flow {
    fn from_command(command: &str) -> Option<Flow> {
        match command.trim().to_lowercase().as_str() {
            "recognize" => Some(Flow::Recognize),
            "register" => Some(Flow::Register),
            "update" => Some(Flow::Update),
            "delete" => Some(Flow::Delete),
            _ => None,
        }
    }
}

/// Ask which flow to run and wait for a command-grammar match, defaulting
/// to [`Flow::Recognize`] when the capture is silent or unrecognized — the
/// primary path named in §1's data-flow description.
pub fn select(ctx: &FlowContext) -> Result<Flow, crate::error::FlowError> {
    ctx.speak("How can I help? You can say recognize, register, update, or delete.")?;
    let command = ctx.listen_for_command()?;
    Ok(Flow::from_command(&command).unwrap_or(Flow::Recognize))
}

pub fn dispatch(ctx: &FlowContext, flow: Flow) -> Result<(), crate::error::FlowError> {
    match flow {
        Flow::Recognize => recognize::run(ctx),
        Flow::Register => register::run(ctx),
        Flow::Update => update::run(ctx),
        Flow::Delete => delete::run(ctx),
    }
}

//! Persona system prompts with the user's context interpolated.

use rq_core::config::Persona;

use super::context::{ContextItem, RoutingContext};

const TECHNICAL_PREAMBLE: &str = "You are Claude, the engineering AI assistant for Rhythmiq Personal OS. \
You help with technical implementation, code review, architecture decisions, and debugging.";

const TECHNICAL_CLOSING: &str =
    "Provide clear, actionable technical guidance. Be concise but thorough.";

const CREATIVE_PREAMBLE: &str = "You are the creative AI assistant for Rhythmiq Personal OS. \
You help with brainstorming, planning, writing, and strategic thinking.";

const CREATIVE_CLOSING: &str = "Provide creative, inspiring, and strategic guidance. \
Help organize thoughts and suggest next steps.";

const CONTEXT_INTRO: &str = "You have access to the user's current context:";

fn titles(items: &[ContextItem]) -> String {
    items
        .iter()
        .map(|i| i.title.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sections for empty context parts are omitted.
pub fn build_system_prompt(persona: Persona, ctx: &RoutingContext) -> String {
    let (preamble, mits_label, closing) = match persona {
        Persona::Technical => (
            TECHNICAL_PREAMBLE,
            "Current MITs (Most Important Tasks)",
            TECHNICAL_CLOSING,
        ),
        Persona::Creative => (CREATIVE_PREAMBLE, "Current MITs", CREATIVE_CLOSING),
    };

    let mut prompt = format!("{preamble}\n\n{CONTEXT_INTRO}");
    if !ctx.current_mits.is_empty() {
        prompt.push_str(&format!("\n\n{mits_label}: {}", titles(&ctx.current_mits)));
    }
    if !ctx.recent_ideas.is_empty() {
        prompt.push_str(&format!("\n\nRecent Ideas: {}", titles(&ctx.recent_ideas)));
    }
    if let Some(chaos) = &ctx.chaos {
        prompt.push_str(&format!(
            "\n\nCurrent mental state: {} - {}",
            chaos.level, chaos.message
        ));
    }
    prompt.push_str("\n\n");
    prompt.push_str(closing);
    prompt
}

//! Character profiles and prompt assembly

use crate::history::{Message, Role};
use crate::providers::GenerationRequest;

/// Reply style rules shared by every character
///
/// The first-sentence length cap matters: synthesis of the opening
/// sentence gates time-to-first-audio, so it must be short.
const STYLE_RULES: &str = "\
STYLE RULES (CRITICAL):
1. FIRST SENTENCE MUST BE VERY SHORT: at most 2-4 words. \
Put longer explanations in the second sentence onward.
2. Stay fluent and in character.
3. Avoid repeating words and ideas.";

/// A virtual character's identity and behavior
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CharacterProfile {
    pub name: String,
    /// Voice id passed to the synthesizer
    pub voice: String,
    pub personality: String,
    pub backstory: String,
    pub system_prompt: String,
    pub goals: Vec<String>,
    /// Facts the character knows but must not state outright
    pub secrets: Vec<String>,
    /// Actions the character may declare in reply metadata
    pub actions: Vec<String>,
}

/// Sampling knobs for one generation
#[derive(Debug, Clone, Copy)]
pub struct PromptOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for PromptOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

fn system_prompt(profile: &CharacterProfile, world_story: &str, others_summary: &str) -> String {
    let mut system = format!("{}\n\n", profile.system_prompt);
    if !profile.personality.is_empty() {
        system.push_str(&format!("Your personality: {}\n", profile.personality));
    }
    if !world_story.is_empty() {
        system.push_str(&format!("The world's story: {world_story}\n"));
    }
    if !profile.backstory.is_empty() {
        system.push_str(&format!("Your backstory: {}\n", profile.backstory));
    }
    if !profile.goals.is_empty() {
        system.push_str(&format!("Your goals: {}\n", profile.goals.join(", ")));
    }
    if !profile.secrets.is_empty() {
        system.push_str(&format!(
            "Secrets (never state these outright): {}\n",
            profile.secrets.join("; ")
        ));
    }
    if !profile.actions.is_empty() {
        system.push_str(&format!(
            "Actions you may take: {}\n",
            profile.actions.join(", ")
        ));
    }

    system.push_str(&format!("\n{STYLE_RULES}\n"));

    if !others_summary.is_empty() {
        system.push_str(&format!(
            "\nWhat the player discussed with others:\n{others_summary}\n"
        ));
    }
    system
}

/// Build the generation request for a reply to the player
///
/// The system prompt carries the character, world story, style rules,
/// and a summary of the player's conversations with other characters;
/// the user prompt carries the transcript and the new player line.
#[must_use]
pub fn build_reply_request(
    profile: &CharacterProfile,
    world_story: &str,
    history: &[Message],
    others_summary: &str,
    user_text: &str,
    options: PromptOptions,
) -> GenerationRequest {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str("\nEarlier conversation:\n");
        for message in history {
            let label = match message.role {
                Role::User => "Player",
                Role::Agent => profile.name.as_str(),
            };
            prompt.push_str(&format!("{label}: {}\n", message.content));
        }
    }
    prompt.push_str(&format!(
        "\nPlayer: {user_text}\n(Reminder: keep your first sentence to a few words!)\n{}:",
        profile.name
    ));

    GenerationRequest {
        system_prompt: system_prompt(profile, world_story, others_summary),
        prompt,
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

/// Build the generation request for a character-initiated opener
///
/// Used when the character speaks first, e.g. greeting the player as
/// they walk in. `instruction` describes the scene being opened.
#[must_use]
pub fn build_opener_request(
    profile: &CharacterProfile,
    world_story: &str,
    instruction: &str,
    options: PromptOptions,
) -> GenerationRequest {
    let mut system = system_prompt(profile, world_story, "");
    system.push_str(&format!(
        "\nINSTRUCTION: {instruction}\nAnswer only as {} with that opening line.",
        profile.name
    ));

    GenerationRequest {
        system_prompt: system,
        prompt: format!(
            "Say the first line you would speak as the scene opens.\n{}:",
            profile.name
        ),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

//! Builds the agent roster for a multi-agent session: one profile per
//! author-palette voice the user selected, padded with deterministic
//! "wildcard" profiles when `agent_count` exceeds the palette (§4.G step 1).

/// One agent's identity in a multi-agent session: a name, a temperature,
/// and a voice-direction fragment layered onto the shared system prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub voice_prompt: String,
    pub temperature: f32,
    pub wildcard: bool,
}

/// Fixed wildcard profiles used to pad the roster, each steering toward a
/// distinct craft lens so padding adds diversity rather than noise.
pub const WILDCARD_PROFILES: &[(&str, &str, f32)] = &[
    ("precision", "prioritize exact, unadorned nouns and verbs over modifiers", 0.6),
    ("sensory", "foreground concrete sensory detail: texture, temperature, sound", 0.8),
    ("rhythm", "vary sentence length deliberately to create a musical cadence", 0.9),
    ("restraint", "favor understatement; cut any sentence that states an emotion outright", 0.5),
    ("accumulative", "build through accumulating concrete detail rather than summary", 1.0),
];

/// Build a roster of `agent_count` profiles: one per entry in
/// `author_palette` (in order, default temperature 1.0), then wildcard
/// profiles cycling through [`WILDCARD_PROFILES`] to fill any remainder.
#[must_use]
pub fn build_roster(author_palette: &[String], agent_count: usize) -> Vec<AgentProfile> {
    let agent_count = agent_count.max(1);
    let mut roster = Vec::with_capacity(agent_count);

    for voice in author_palette.iter().take(agent_count) {
        roster.push(AgentProfile {
            name: voice.clone(),
            voice_prompt: format!("write in the voice of {voice}"),
            temperature: 1.0,
            wildcard: false,
        });
    }

    let mut wildcard_idx = 0;
    while roster.len() < agent_count {
        let (name, prompt, temperature) = WILDCARD_PROFILES[wildcard_idx % WILDCARD_PROFILES.len()];
        roster.push(AgentProfile {
            name: name.to_string(),
            voice_prompt: prompt.to_string(),
            temperature,
            wildcard: true,
        });
        wildcard_idx += 1;
    }

    roster
}

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ureq::Agent;

use crate::config::PipelineConfig;
use crate::models::{Attributes, TrackSuggestion};
use crate::trace::DebugTrace;

/// Token counters accumulated across one generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Per-call overrides for the dispatcher; `None` means "use the client default".
#[derive(Debug, Clone, Default)]
pub struct LlmOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// Blocking LLM round-trip. Returns the raw response text, or an empty
/// string when the model is unreachable or misconfigured; output is never
/// assumed to be well-formed.
#[cfg_attr(test, mockall::automock)]
pub trait LlmDispatcher {
    fn dispatch(&self, prompt: &str, options: &LlmOptions) -> String;

    /// Token counters accumulated since the last reset.
    fn usage(&self) -> LlmUsage;

    fn reset_usage(&self);
}

/// HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpLlmClient {
    agent: Agent,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    usage: Mutex<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        HttpLlmClient {
            agent: Agent::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            temperature: 0.7,
            max_tokens: 512,
            usage: Mutex::new(LlmUsage::default()),
        }
    }

    fn record_usage(&self, usage: &ChatUsage) {
        let mut counters = self.usage.lock().expect("usage lock poisoned");
        counters.prompt_tokens += usage.prompt_tokens;
        counters.completion_tokens += usage.completion_tokens;
        counters.total_tokens += if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.prompt_tokens + usage.completion_tokens
        };
    }
}

impl LlmDispatcher for HttpLlmClient {
    fn dispatch(&self, prompt: &str, options: &LlmOptions) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("LLM API key is not configured; set LLM_API_KEY to enable LLM features");
            return String::new();
        };

        let body = serde_json::json!({
            "model": options.model.as_deref().unwrap_or(&self.model),
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": options.temperature.unwrap_or(self.temperature),
            "max_tokens": options.max_tokens.unwrap_or(self.max_tokens),
        });

        let url = format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let response = match self
            .agent
            .post(&url)
            .set("Authorization", &format!("Bearer {api_key}"))
            .send_json(body)
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("LLM request failed: {e}");
                return String::new();
            }
        };

        let response_text = match response.into_string() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("failed to read LLM response body: {e}");
                return String::new();
            }
        };

        let parsed: ChatResponse = match serde_json::from_str(&response_text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::error!("failed to parse LLM response envelope: {e}");
                return String::new();
            }
        };

        if let Some(usage) = &parsed.usage {
            self.record_usage(usage);
        }

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default()
    }

    fn usage(&self) -> LlmUsage {
        *self.usage.lock().expect("usage lock poisoned")
    }

    fn reset_usage(&self) {
        *self.usage.lock().expect("usage lock poisoned") = LlmUsage::default();
    }
}

// --- Tolerant response parsing ----------------------------------------------

/// Outcome of parsing a raw LLM response that may be fenced, wrapped in
/// commentary, or plain garbage. Stages match on the variant to pick their
/// fallback instead of relying on nested error handling.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmJson {
    Value(Value),
    Malformed,
    Empty,
}

/// Extract plausible JSON fragments: fenced code blocks first, then the
/// whole (trimmed) response.
fn json_candidates(raw: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut rest = raw;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        let mut block = &after_open[..close];
        // Strip an optional language tag like ```json
        if let Some(newline) = block.find('\n') {
            let tag = block[..newline].trim();
            if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) {
                block = &block[newline + 1..];
            }
        }
        let cleaned = block.trim();
        if !cleaned.is_empty() {
            candidates.push(cleaned.to_string());
        }
        rest = &after_open[close + 3..];
    }
    let stripped = raw.trim();
    if !stripped.is_empty() {
        candidates.push(stripped.to_string());
    }
    candidates
}

/// Parse the first JSON value at the start of `fragment`, ignoring trailing text.
fn leading_json_value(fragment: &str) -> Option<Value> {
    let mut stream = serde_json::Deserializer::from_str(fragment).into_iter::<Value>();
    match stream.next() {
        Some(Ok(value)) => Some(value),
        _ => None,
    }
}

/// Tiered parser for possibly garbled LLM output.
///
/// Tries each candidate fragment whole, then from every embedded `{`/`[`
/// position; the first successful parse wins.
pub fn parse_llm_json(raw: &str) -> LlmJson {
    if raw.trim().is_empty() {
        return LlmJson::Empty;
    }
    for candidate in json_candidates(raw) {
        if let Some(value) = leading_json_value(&candidate) {
            return LlmJson::Value(value);
        }
        for (index, ch) in candidate.char_indices() {
            if ch == '{' || ch == '[' {
                if let Some(value) = leading_json_value(&candidate[index..]) {
                    return LlmJson::Value(value);
                }
            }
        }
    }
    LlmJson::Malformed
}

// --- Built-in fallbacks -----------------------------------------------------

/// Seed suggestions used when the model is unreachable or unparsable,
/// keyed by space-form genre.
const GENRE_FALLBACKS: [(&str, [(&str, &str); 5]); 6] = [
    (
        "pop",
        [
            ("Blinding Lights", "The Weeknd"),
            ("Levitating", "Dua Lipa"),
            ("Good 4 U", "Olivia Rodrigo"),
            ("Watermelon Sugar", "Harry Styles"),
            ("Don't Start Now", "Dua Lipa"),
        ],
    ),
    (
        "rock",
        [
            ("Mr. Brightside", "The Killers"),
            ("Seven Nation Army", "The White Stripes"),
            ("Everlong", "Foo Fighters"),
            ("Use Somebody", "Kings of Leon"),
            ("Sweet Child O' Mine", "Guns N' Roses"),
        ],
    ),
    (
        "hip hop",
        [
            ("SICKO MODE", "Travis Scott"),
            ("Lose Yourself", "Eminem"),
            ("HUMBLE.", "Kendrick Lamar"),
            ("God's Plan", "Drake"),
            ("POWER", "Kanye West"),
        ],
    ),
    (
        "electronic",
        [
            ("Midnight City", "M83"),
            ("Strobe", "deadmau5"),
            ("Titanium", "David Guetta ft. Sia"),
            ("Wake Me Up", "Avicii"),
            ("Animals", "Martin Garrix"),
        ],
    ),
    (
        "jazz",
        [
            ("So What", "Miles Davis"),
            ("Take Five", "The Dave Brubeck Quartet"),
            ("My Favorite Things", "John Coltrane"),
            ("Blue in Green", "Bill Evans"),
            ("Feeling Good", "Nina Simone"),
        ],
    ),
    (
        "classical",
        [
            ("Clair de Lune", "Claude Debussy"),
            ("Nocturne Op.9 No.2", "Frédéric Chopin"),
            ("Canon in D", "Johann Pachelbel"),
            ("Spring (The Four Seasons)", "Antonio Vivaldi"),
            ("Moonlight Sonata", "Ludwig van Beethoven"),
        ],
    ),
];

const DEFAULT_FALLBACKS: [(&str, &str); 5] = [
    ("Dreams", "Fleetwood Mac"),
    ("Africa", "Toto"),
    ("Uptown Funk", "Mark Ronson ft. Bruno Mars"),
    ("Stayin' Alive", "Bee Gees"),
    ("September", "Earth, Wind & Fire"),
];

fn fallback_suggestions(genre: &str, cap: usize) -> Vec<TrackSuggestion> {
    let space_form = genre.to_lowercase().replace('-', " ");
    let space_form = space_form.trim();
    let table = GENRE_FALLBACKS
        .iter()
        .find(|(key, _)| *key == space_form)
        .map(|(_, entries)| entries.as_slice())
        .unwrap_or(DEFAULT_FALLBACKS.as_slice());
    table
        .iter()
        .take(cap)
        .map(|(title, artist)| TrackSuggestion::new(*title, *artist))
        .collect()
}

// --- Suggestion parsing helpers ---------------------------------------------

fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn lookup<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    for (key, value) in object {
        if keys.contains(&key.to_lowercase().as_str()) && !value.is_null() {
            return Some(value);
        }
    }
    None
}

/// Unwrap `{tracks: [...]}`-style containers down to the inner list.
fn unwrap_track_list(value: Value) -> Value {
    if let Value::Object(object) = &value {
        for key in ["tracks", "playlist", "songs"] {
            if let Some(inner) = object.get(key) {
                return inner.clone();
            }
        }
    }
    value
}

/// Append a suggestion unless its (title, artist) pair was already seen,
/// case-insensitively.
fn push_unique(
    suggestions: &mut Vec<TrackSuggestion>,
    seen_pairs: &mut std::collections::HashSet<(String, String)>,
    suggestion: TrackSuggestion,
) {
    if suggestion.title.is_empty() {
        return;
    }
    let key = (
        suggestion.title.to_lowercase(),
        suggestion.artist.to_lowercase(),
    );
    if seen_pairs.insert(key) {
        suggestions.push(suggestion);
    }
}

fn suggestion_from_line(line: &str) -> Option<TrackSuggestion> {
    let (title, artist) = line.split_once(" - ")?;
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    Some(TrackSuggestion::new(title, artist.trim()))
}

/// Collect title/artist pairs from a parsed value or, failing that, from
/// "Title - Artist" lines in the raw response.
fn collect_suggestions(parsed: &LlmJson, raw: &str) -> Vec<TrackSuggestion> {
    let mut suggestions = Vec::new();

    let mut push = |title: String, artist: String| {
        let title = title.trim().to_string();
        if title.is_empty() {
            return;
        }
        suggestions.push(TrackSuggestion::new(title, artist.trim().to_string()));
    };

    if let LlmJson::Value(value) = parsed {
        let value = unwrap_track_list(value.clone());
        if let Value::Array(items) = value {
            for item in items {
                match item {
                    Value::Object(object) => {
                        let title = lookup(&object, &["title", "song", "name"])
                            .and_then(string_value);
                        let artist = match lookup(&object, &["artist", "artists", "singer"]) {
                            Some(Value::Array(parts)) => Some(
                                parts
                                    .iter()
                                    .filter_map(string_value)
                                    .collect::<Vec<_>>()
                                    .join(", "),
                            ),
                            Some(other) => string_value(other),
                            None => None,
                        };
                        if let Some(title) = title {
                            push(title, artist.unwrap_or_default());
                        }
                    }
                    Value::String(line) => {
                        if let Some((title, artist)) = line.split_once(" - ") {
                            push(title.to_string(), artist.to_string());
                        } else {
                            push(line, String::new());
                        }
                    }
                    _ => {}
                }
            }
            return suggestions;
        }
    }

    // Plain-text fallback: one "Title - Artist" per line.
    for line in raw.lines() {
        if let Some(suggestion) = suggestion_from_line(line.trim()) {
            suggestions.push(suggestion);
        }
    }
    suggestions
}

// --- Prompted operations ----------------------------------------------------

fn snippet(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Pull mood, genre, and energy descriptors from a free-form prompt.
/// Falls back to the configured defaults on any failure.
pub fn extract_attributes(
    llm: &dyn LlmDispatcher,
    prompt: &str,
    config: &PipelineConfig,
    trace: &mut DebugTrace,
) -> Attributes {
    let defaults = &config.default_attributes;
    let query = format!(
        "Extract the mood, genre, and energy level from this user playlist request. \
         Respond with JSON containing the keys `mood`, `genre`, and `energy`. \
         Request: {prompt}"
    );
    trace.log(format!("LLM prompt (attribute extraction): {query}"));
    let response = llm.dispatch(&query, &LlmOptions::default());
    trace.log(format!(
        "LLM raw response (attributes): {}",
        snippet(&response, 300)
    ));

    match parse_llm_json(&response) {
        LlmJson::Value(Value::Object(object)) => {
            let field = |keys: &[&str], default: &str| {
                lookup(&object, keys)
                    .and_then(string_value)
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| default.to_string())
            };
            let attributes = Attributes {
                mood: field(&["mood"], &defaults.mood),
                genre: field(&["genre", "music_genre"], &defaults.genre),
                energy: field(&["energy", "energy_level", "energylevel"], &defaults.energy),
            };
            trace.log(format!("LLM parsed attributes: {attributes:?}"));
            attributes
        }
        LlmJson::Empty => {
            trace.log("LLM attribute extraction failed; using default attributes.");
            defaults.clone()
        }
        _ => {
            trace.log("Failed to parse LLM attribute response; using defaults.");
            defaults.clone()
        }
    }
}

/// Ask the model for seed tracks as title/artist pairs. Never returns an
/// empty list: the built-in fallback table covers model outages.
pub fn suggest_seed_tracks(
    llm: &dyn LlmDispatcher,
    prompt: &str,
    attributes: &Attributes,
    max_suggestions: usize,
    trace: &mut DebugTrace,
) -> Vec<TrackSuggestion> {
    let cap = max_suggestions.max(1);
    let query = format!(
        "You are selecting seed songs for a playlist.\n\
         Playlist request: \"{prompt}\"\n\
         Extracted attributes: mood={}, genre={}, energy={}\n\
         Return a JSON array with at most {cap} objects, each containing the keys \
         \"title\" and \"artist\". Choose well-known songs that fit the mood, genre, \
         and energy and are widely available to stream.",
        attributes.mood, attributes.genre, attributes.energy
    );
    trace.log(format!("LLM prompt (seed suggestions): {query}"));
    let response = llm.dispatch(&query, &LlmOptions::default());
    trace.log(format!(
        "LLM raw response (seed suggestions): {}",
        snippet(&response, 400)
    ));

    let mut suggestions = collect_suggestions(&parse_llm_json(&response), &response);
    if suggestions.is_empty() {
        trace.log("LLM seed suggestions unavailable; using built-in fallback list.");
        suggestions = fallback_suggestions(&attributes.genre, cap);
    } else {
        trace.log(format!(
            "LLM parsed {} seed suggestions.",
            suggestions.len().min(cap)
        ));
    }
    suggestions.truncate(cap);
    suggestions
}

/// Ask the model to remix an existing playlist, seeding it with the current
/// track list. Degrades to re-describing the existing tracks so a remix is
/// never worse than a no-op.
pub fn suggest_remix_tracks(
    llm: &dyn LlmDispatcher,
    existing_tracks: &[String],
    attributes: &Attributes,
    prompt: &str,
    target_count: usize,
    trace: &mut DebugTrace,
) -> Vec<TrackSuggestion> {
    if target_count == 0 {
        return Vec::new();
    }

    let mut unique_existing: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for track in existing_tracks {
        let normalized = track.trim();
        if normalized.is_empty() || !seen.insert(normalized.to_lowercase()) {
            continue;
        }
        unique_existing.push(normalized.to_string());
    }

    let snapshot_limit = target_count.clamp(1, 25);
    let numbered: String = if unique_existing.is_empty() {
        "1. (playlist currently empty)".to_string()
    } else {
        unique_existing
            .iter()
            .take(snapshot_limit)
            .enumerate()
            .map(|(index, entry)| format!("{}. {entry}", index + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let prompt_label = if prompt.is_empty() {
        "Unnamed playlist request"
    } else {
        prompt
    };
    let query = format!(
        "You are refreshing an existing playlist for a user.\n\
         Original request: \"{prompt_label}\"\n\
         Target attributes: mood={}, genre={}, energy={}\n\
         Current playlist tracks:\n{numbered}\n\n\
         Remix the playlist by returning exactly {target_count} songs that match the \
         same mood, genre, and energy. You may keep some of the existing songs, but \
         avoid duplicates overall and ensure the list feels refreshed. Return a JSON \
         array where each object contains the keys \"title\" and \"artist\".",
        attributes.mood, attributes.genre, attributes.energy
    );
    trace.log(format!("LLM prompt (remix suggestions): {query}"));
    let response = llm.dispatch(&query, &LlmOptions::default());
    trace.log(format!(
        "LLM raw response (remix suggestions): {}",
        snippet(&response, 400)
    ));

    let mut suggestions: Vec<TrackSuggestion> = Vec::new();
    let mut seen_pairs = std::collections::HashSet::new();

    for suggestion in collect_suggestions(&parse_llm_json(&response), &response) {
        push_unique(&mut suggestions, &mut seen_pairs, suggestion);
    }

    if suggestions.len() < target_count {
        trace.log("LLM remix suggestions insufficient; filling with existing playlist tracks.");
        for track in &unique_existing {
            let suggestion = match track.split_once(" - ") {
                Some((title, artist)) => TrackSuggestion::new(title.trim(), artist.trim()),
                None => TrackSuggestion::new(track.clone(), ""),
            };
            push_unique(&mut suggestions, &mut seen_pairs, suggestion);
            if suggestions.len() >= target_count {
                break;
            }
        }
    }

    if suggestions.is_empty() {
        trace.log("Remix suggestions unavailable; returning empty list.");
    }
    suggestions.truncate(target_count);
    suggestions
}

/// Ask for five more widely known tracks matching the seeds; appends only
/// lines not already present. Returns the seeds unchanged on an empty
/// response.
pub fn refine_playlist(
    llm: &dyn LlmDispatcher,
    seed_tracks: &[String],
    attributes: &Attributes,
    trace: &mut DebugTrace,
) -> Vec<String> {
    let track_list = seed_tracks.join("\n");
    let query = format!(
        "Given these seed tracks: {track_list}, and attributes mood={}, genre={}, \
         energy={}, recommend 5 additional widely known songs. Return each song on a \
         new line and prefer artists that match the requested genre.",
        attributes.mood, attributes.genre, attributes.energy
    );
    trace.log(format!("LLM prompt (playlist refinement): {query}"));
    let response = llm.dispatch(&query, &LlmOptions::default());
    trace.log(format!(
        "LLM raw response (refinement): {}",
        snippet(&response, 400)
    ));
    if response.is_empty() {
        trace.log("LLM refinement returned no response; using seed tracks only.");
        return seed_tracks.to_vec();
    }

    let mut refined = seed_tracks.to_vec();
    for line in response.lines() {
        let line = line.trim();
        if !line.is_empty() && !seed_tracks.iter().any(|seed| seed == line) {
            refined.push(line.to_string());
        }
    }
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    fn trace() -> DebugTrace {
        DebugTrace::new(true)
    }

    struct FixedLlm(String);

    impl LlmDispatcher for FixedLlm {
        fn dispatch(&self, _prompt: &str, _options: &LlmOptions) -> String {
            self.0.clone()
        }
        fn usage(&self) -> LlmUsage {
            LlmUsage::default()
        }
        fn reset_usage(&self) {}
    }

    #[test]
    fn parses_plain_json_object() {
        let parsed = parse_llm_json(r#"{"mood": "dark"}"#);
        match parsed {
            LlmJson::Value(value) => assert_eq!(value["mood"], "dark"),
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[test]
    fn parses_fenced_json_with_language_tag() {
        let raw = "Sure! Here you go:\n```json\n[{\"title\": \"A\", \"artist\": \"B\"}]\n```\nEnjoy!";
        match parse_llm_json(raw) {
            LlmJson::Value(value) => assert_eq!(value[0]["title"], "A"),
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[test]
    fn parses_json_embedded_in_commentary() {
        let raw = "The attributes are {\"mood\": \"happy\", \"genre\": \"pop\"} as requested.";
        match parse_llm_json(raw) {
            LlmJson::Value(value) => assert_eq!(value["genre"], "pop"),
            other => panic!("expected value, got {other:?}"),
        }
    }

    #[test]
    fn classifies_empty_and_garbage_responses() {
        assert_eq!(parse_llm_json(""), LlmJson::Empty);
        assert_eq!(parse_llm_json("   \n"), LlmJson::Empty);
        assert_eq!(parse_llm_json("no json here at all"), LlmJson::Malformed);
    }

    #[test]
    fn extract_attributes_defaults_on_empty_response() {
        let config = PipelineConfig::default();
        let attributes =
            extract_attributes(&FixedLlm(String::new()), "anything", &config, &mut trace());
        assert_eq!(attributes, Attributes::default());
    }

    #[test]
    fn extract_attributes_accepts_alternate_keys() {
        let config = PipelineConfig::default();
        let llm = FixedLlm(r#"{"Mood": "moody", "music_genre": "Indie Rock", "energy_level": "High"}"#.into());
        let attributes = extract_attributes(&llm, "prompt", &config, &mut trace());
        assert_eq!(attributes.mood, "moody");
        assert_eq!(attributes.genre, "indie rock");
        assert_eq!(attributes.energy, "high");
    }

    #[test]
    fn seed_suggestions_accept_wrapped_object() {
        let llm = FixedLlm(r#"{"tracks": [{"title": "One", "artist": "Artist A"}, {"name": "Two", "artists": ["B", "C"]}]}"#.into());
        let suggestions =
            suggest_seed_tracks(&llm, "prompt", &Attributes::default(), 5, &mut trace());
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0], TrackSuggestion::new("One", "Artist A"));
        assert_eq!(suggestions[1], TrackSuggestion::new("Two", "B, C"));
    }

    #[test]
    fn seed_suggestions_accept_line_format() {
        let llm = FixedLlm("Here are some picks:\nSong One - Artist One\nSong Two - Artist Two".into());
        let suggestions =
            suggest_seed_tracks(&llm, "prompt", &Attributes::default(), 5, &mut trace());
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[1].artist, "Artist Two");
    }

    #[test]
    fn seed_suggestions_fall_back_when_llm_is_down() {
        let attributes = Attributes {
            genre: "hip-hop".to_string(),
            ..Attributes::default()
        };
        let suggestions =
            suggest_seed_tracks(&FixedLlm(String::new()), "prompt", &attributes, 5, &mut trace());
        assert_eq!(suggestions.len(), 5);
        // The hyphenated genre maps onto the space-form fallback table.
        assert!(suggestions.iter().any(|s| s.artist == "Eminem"));
    }

    #[test]
    fn unknown_genre_uses_default_fallbacks() {
        let attributes = Attributes {
            genre: "obscure micro-genre".to_string(),
            ..Attributes::default()
        };
        let suggestions =
            suggest_seed_tracks(&FixedLlm(String::new()), "prompt", &attributes, 3, &mut trace());
        assert_eq!(suggestions.len(), 3);
        assert_eq!(suggestions[0].title, "Dreams");
    }

    #[test]
    fn remix_degrades_to_existing_tracks() {
        let existing = vec![
            "Song One - Artist One".to_string(),
            "Song Two - Artist Two".to_string(),
        ];
        let suggestions = suggest_remix_tracks(
            &FixedLlm(String::new()),
            &existing,
            &Attributes::default(),
            "prompt",
            2,
            &mut trace(),
        );
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0], TrackSuggestion::new("Song One", "Artist One"));
    }

    #[test]
    fn remix_dedupes_case_insensitively() {
        let llm = FixedLlm(
            r#"[{"title": "Song One", "artist": "Artist One"}, {"title": "song one", "artist": "artist one"}]"#
                .into(),
        );
        let suggestions = suggest_remix_tracks(
            &llm,
            &[],
            &Attributes::default(),
            "prompt",
            5,
            &mut trace(),
        );
        assert_eq!(suggestions.len(), 1);
    }

    #[test]
    fn remix_with_zero_target_is_empty() {
        let suggestions = suggest_remix_tracks(
            &FixedLlm("ignored".into()),
            &[],
            &Attributes::default(),
            "prompt",
            0,
            &mut trace(),
        );
        assert!(suggestions.is_empty());
    }

    #[test]
    fn refine_appends_only_new_lines() {
        let seeds = vec!["Song One - Artist One".to_string()];
        let llm = FixedLlm("Song One - Artist One\nSong Two - Artist Two".into());
        let refined = refine_playlist(&llm, &seeds, &Attributes::default(), &mut trace());
        assert_eq!(refined.len(), 2);
        assert_eq!(refined[1], "Song Two - Artist Two");
    }

    #[test]
    fn refine_keeps_seeds_on_empty_response() {
        let seeds = vec!["Song One - Artist One".to_string()];
        let refined =
            refine_playlist(&FixedLlm(String::new()), &seeds, &Attributes::default(), &mut trace());
        assert_eq!(refined, seeds);
    }
}

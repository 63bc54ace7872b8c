//! Structured output enforcement.
//!
//! Coerces free-text model responses into records that conform to a declared
//! [`Shape`]. Each attempt either yields a fully conforming
//! [`GenerationResult`] or an [`AttemptError`] whose text is fed back into the
//! next prompt; after the retry budget is spent a [`GenerationFailure`] is
//! returned. Partially valid data never leaves this module.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{de::DeserializeOwned, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::LLM;
use crate::cache::{cache_key, ContentCache};
use crate::error::{AttemptError, GenerationFailure};

/// Longest slice of a rejected response kept in the feedback for the next attempt.
const MAX_FEEDBACK_RESPONSE_CHARS: usize = 2000;

/// One field descriptor of a target shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeNode {
    /// Free text instruction describing what the field should hold
    Literal(String),
    /// The field must be one of these labels
    Enumeration(Vec<String>),
    /// The field is itself an object with its own shape
    Nested(Shape),
}

/// Ordered mapping of field name to descriptor.
///
/// Key order is kept so the JSON shown to the model matches the order the
/// caller declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: Vec<(String, ShapeNode)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, node: ShapeNode) -> Self {
        self.fields.push((key.into(), node));
        self
    }

    pub fn literal(self, key: impl Into<String>, instruction: impl Into<String>) -> Self {
        self.field(key, ShapeNode::Literal(instruction.into()))
    }

    pub fn enumeration<S: Into<String>>(self, key: impl Into<String>, choices: impl IntoIterator<Item = S>) -> Self {
        self.field(key, ShapeNode::Enumeration(choices.into_iter().map(Into::into).collect()))
    }

    pub fn nested(self, key: impl Into<String>, shape: Shape) -> Self {
        self.field(key, ShapeNode::Nested(shape))
    }

    pub fn fields(&self) -> &[(String, ShapeNode)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True if any key or literal anywhere in the shape carries a `<...>` marker.
    pub fn has_dynamic_elements(&self) -> bool {
        self.fields.iter().any(|(key, node)| {
            is_dynamic(key)
                || match node {
                    ShapeNode::Literal(text) => is_dynamic(text),
                    ShapeNode::Enumeration(choices) => choices.iter().any(|c| is_dynamic(c)),
                    ShapeNode::Nested(inner) => inner.has_dynamic_elements(),
                }
        })
    }

    /// True if any field anywhere in the shape is an enumeration.
    pub fn has_enumerations(&self) -> bool {
        self.fields.iter().any(|(_, node)| match node {
            ShapeNode::Enumeration(_) => true,
            ShapeNode::Nested(inner) => inner.has_enumerations(),
            ShapeNode::Literal(_) => false,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, node) in &self.fields {
            map.serialize_entry(key, node)?;
        }
        map.end()
    }
}

impl Serialize for ShapeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ShapeNode::Literal(text) => serializer.serialize_str(text),
            ShapeNode::Enumeration(choices) => {
                let mut seq = serializer.serialize_seq(Some(choices.len()))?;
                for choice in choices {
                    seq.serialize_element(choice)?;
                }
                seq.end()
            }
            ShapeNode::Nested(shape) => shape.serialize(serializer),
        }
    }
}

/// Whether a key or value is a placeholder the model must generate itself.
pub fn is_dynamic(text: &str) -> bool {
    text.find('<')
        .map(|open| text[open + 1..].contains('>'))
        .unwrap_or(false)
}

/// The user side of a request: one instruction, or one per output record.
#[derive(Debug, Clone, PartialEq)]
pub enum UserPrompt {
    Single(String),
    Batch(Vec<String>),
}

impl UserPrompt {
    pub fn is_batch(&self) -> bool {
        matches!(self, UserPrompt::Batch(_))
    }

    fn render(&self) -> String {
        match self {
            UserPrompt::Single(text) => text.clone(),
            UserPrompt::Batch(items) => {
                serde_json::to_string(items).unwrap_or_else(|_| items.join("\n"))
            }
        }
    }
}

impl From<&str> for UserPrompt {
    fn from(text: &str) -> Self {
        UserPrompt::Single(text.to_string())
    }
}

impl From<String> for UserPrompt {
    fn from(text: String) -> Self {
        UserPrompt::Single(text)
    }
}

impl From<Vec<String>> for UserPrompt {
    fn from(items: Vec<String>) -> Self {
        UserPrompt::Batch(items)
    }
}

/// A single structured generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: UserPrompt,
    pub shape: Shape,
    /// Substituted for enumeration values the model could not classify
    pub default_category: Option<String>,
    /// Overrides the provider's configured temperature
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<UserPrompt>, shape: Shape) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            shape,
            default_category: None,
            temperature: None,
        }
    }

    pub fn with_default_category(mut self, category: impl Into<String>) -> Self {
        self.default_category = Some(category.into()).filter(|c: &String| !c.is_empty());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Deterministic content hash of everything that influences the output.
    pub fn cache_key(&self) -> String {
        let kind = if self.user.is_batch() { "batch" } else { "single" };
        let temperature = self.temperature.map(|t| t.to_string()).unwrap_or_default();
        let user = self.user.render();
        let shape = self.shape.to_json();
        cache_key(&[
            self.system.as_str(),
            kind,
            user.as_str(),
            shape.as_str(),
            self.default_category.as_deref().unwrap_or(""),
            temperature.as_str(),
        ])
    }
}

/// Conforming output: one record per batch element, or a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Batch(Vec<Map<String, Value>>),
    Single(Map<String, Value>),
}

impl GenerationResult {
    pub fn records(&self) -> &[Map<String, Value>] {
        match self {
            GenerationResult::Batch(records) => records,
            GenerationResult::Single(record) => std::slice::from_ref(record),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            GenerationResult::Batch(records) => {
                Value::Array(records.into_iter().map(Value::Object).collect())
            }
            GenerationResult::Single(record) => Value::Object(record),
        }
    }

    /// Deserialize into a caller-defined type.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_value())
    }
}

/// Retry budget and exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(3),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    /// `base × 2^attempt + max_jitter × jitter`, with `jitter` in `[0, 1)`.
    ///
    /// Strictly increasing in `attempt` whenever `max_jitter <= base_delay`.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 1u32 << attempt.min(16);
        self.base_delay.saturating_mul(factor) + self.max_jitter.mul_f64(jitter.clamp(0.0, 1.0))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        self.delay_for(attempt, rand::random::<f64>())
    }
}

/// Error context carried from one attempt into the next prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Feedback {
    text: String,
}

impl Feedback {
    /// Returns the feedback extended with a rejected attempt.
    pub fn record(self, attempt: u32, response: &str, error: &AttemptError) -> Self {
        let shown: String = response.chars().take(MAX_FEEDBACK_RESPONSE_CHARS).collect();
        Self {
            text: format!(
                "{}\n\nAttempt {} result: {}\n\nError message: {}",
                self.text,
                attempt + 1,
                shown,
                error
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn prompt_section(&self) -> String {
        if self.text.is_empty() {
            String::new()
        } else {
            format!(
                "\n\nYour previous answers were rejected. Correct these problems:{}",
                self.text
            )
        }
    }
}

/// Build the full prompt for one attempt.
pub fn build_prompt(request: &GenerationRequest, feedback: &Feedback) -> String {
    let batch = request.user.is_batch();

    let mut format_prompt = format!(
        "\nYou are to output {}the following in json format: {}. \nDo not put quotation marks or escape character \\ in the output fields.",
        if batch { "an array of objects in " } else { "" },
        request.shape.to_json()
    );

    if request.shape.has_enumerations() {
        format_prompt.push_str(
            "\nIf output field is a list, classify output into the best element of the list.",
        );
    }

    if request.shape.has_dynamic_elements() {
        format_prompt.push_str(
            "\nAny text enclosed by < and > indicates you must generate content to replace it. Example input: Go to <location>, Example output: Go to the garden\nAny output key containing < and > indicates you must generate the key name to replace it. Example input: {'<location>': 'description of location'}, Example output: {school: a place for education}",
        );
    }

    if batch {
        format_prompt.push_str(
            "\nGenerate an array of json, one json for each input element, in the same order as the input.",
        );
    }

    format!(
        "{}{}{}\n\n{}",
        request.system,
        format_prompt,
        feedback.prompt_section(),
        request.user.render()
    )
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n?([\s\S]*?)\r?\n?```").expect("valid regex"))
}

fn quote_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(\w)"(\w)"#).expect("valid regex"))
}

/// Pull the JSON payload out of a raw response: the first fenced block if
/// there is one, otherwise the whole text.
pub fn extract_json(raw: &str) -> &str {
    fence_pattern()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim()
}

/// Models sometimes emit `don"t` for `don't`; turn those back into apostrophes.
pub fn repair_quotes(text: &str) -> String {
    quote_pattern().replace_all(text, "$1'$2").into_owned()
}

/// Parse and validate a cleaned response against the request.
pub fn validate(request: &GenerationRequest, text: &str) -> Result<GenerationResult, AttemptError> {
    let parsed: Value = serde_json::from_str(text).map_err(|e| AttemptError::Parse(e.to_string()))?;

    let items = match (&request.user, parsed) {
        (UserPrompt::Batch(inputs), Value::Array(items)) => {
            if items.len() != inputs.len() {
                return Err(AttemptError::Shape(format!(
                    "expected {} json objects in the array, got {}",
                    inputs.len(),
                    items.len()
                )));
            }
            items
        }
        (UserPrompt::Batch(_), _) => {
            return Err(AttemptError::Shape("Output format not in an array of json".to_string()))
        }
        (UserPrompt::Single(_), Value::Array(mut items)) if items.len() == 1 => {
            vec![items.remove(0)]
        }
        (UserPrompt::Single(_), Value::Array(_)) => {
            return Err(AttemptError::Shape("Output must be a single json object".to_string()))
        }
        (UserPrompt::Single(_), other) => vec![other],
    };

    let default_category = request.default_category.as_deref();
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(record) = item else {
            return Err(AttemptError::Shape(format!("element {} is not a json object", index)));
        };
        records.push(conform_record(&request.shape, record, default_category)?);
    }

    Ok(if request.user.is_batch() {
        GenerationResult::Batch(records)
    } else {
        match records.pop() {
            Some(record) => GenerationResult::Single(record),
            None => return Err(AttemptError::Shape("empty output".to_string())),
        }
    })
}

fn conform_record(
    shape: &Shape,
    mut record: Map<String, Value>,
    default_category: Option<&str>,
) -> Result<Map<String, Value>, AttemptError> {
    for (key, node) in shape.fields() {
        // Generated key names cannot be checked
        if is_dynamic(key) {
            continue;
        }

        let value = record
            .get_mut(key)
            .ok_or_else(|| AttemptError::Shape(format!("{} not in json output", key)))?;

        match node {
            ShapeNode::Literal(_) => {}
            ShapeNode::Enumeration(choices) => {
                *value = normalize_choice(key, value.take(), choices, default_category)?;
            }
            ShapeNode::Nested(inner) => match value {
                Value::Object(object) => {
                    let taken = std::mem::take(object);
                    *object = conform_record(inner, taken, default_category)?;
                }
                _ => {
                    return Err(AttemptError::Shape(format!("{} must be a json object", key)));
                }
            },
        }
    }
    Ok(record)
}

fn normalize_choice(
    key: &str,
    value: Value,
    choices: &[String],
    default_category: Option<&str>,
) -> Result<Value, AttemptError> {
    let value = match value {
        Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
        other => other,
    };

    let mut label = match value {
        Value::String(text) => text,
        other => match default_category {
            Some(default) => default.to_string(),
            None => {
                return Err(AttemptError::Shape(format!(
                    "{} must be one of {:?}, got {}",
                    key, choices, other
                )))
            }
        },
    };

    if !choices.iter().any(|c| *c == label) {
        if let Some(default) = default_category {
            label = default.to_string();
        }
    }

    if let Some((head, _)) = label.split_once(':') {
        label = head.to_string();
    }

    Ok(Value::String(label))
}

/// Runs structured generations against an injected model handle.
#[derive(Clone)]
pub struct StructuredGenerator {
    llm: Arc<dyn LLM>,
    policy: RetryPolicy,
}

impl StructuredGenerator {
    pub fn new(llm: Arc<dyn LLM>, policy: RetryPolicy) -> Self {
        Self { llm, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate until the response conforms to the request's shape or the
    /// retry budget runs out.
    pub async fn coerce(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationFailure> {
        let max_attempts = self.policy.max_attempts;
        let mut feedback = Feedback::default();
        let mut last_error = AttemptError::Call("no attempts were made".to_string());

        for attempt in 0..max_attempts {
            let prompt = build_prompt(request, &feedback);
            debug!("Structured generation attempt {}/{} ({} chars)", attempt + 1, max_attempts, prompt.len());

            let (response, outcome) = match self.llm.generate(&prompt, request.temperature).await {
                Ok(raw) => {
                    let cleaned = repair_quotes(extract_json(&raw));
                    let outcome = validate(request, &cleaned);
                    (cleaned, outcome)
                }
                Err(e) => (String::new(), Err(AttemptError::Call(e.to_string()))),
            };

            match outcome {
                Ok(result) => {
                    if attempt > 0 {
                        info!("✅ Structured output accepted on attempt {}/{}", attempt + 1, max_attempts);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    warn!("Attempt {}/{} rejected: {}", attempt + 1, max_attempts, error);
                    feedback = feedback.record(attempt, &response, &error);
                    last_error = error;

                    if attempt + 1 < max_attempts {
                        let delay = self.policy.jittered_delay(attempt);
                        debug!("Retrying in {:.1}s", delay.as_secs_f64());
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(GenerationFailure {
            attempts: max_attempts,
            last_error,
            feedback: feedback.into_text(),
        })
    }

    /// [`coerce`](Self::coerce), memoized in `cache` under the request's content hash.
    pub async fn coerce_cached(
        &self,
        request: &GenerationRequest,
        cache: &dyn ContentCache,
    ) -> Result<GenerationResult, GenerationFailure> {
        let key = request.cache_key();

        if let Some(cached) = cache.get(&key).await {
            match serde_json::from_value::<GenerationResult>(cached) {
                Ok(result) => {
                    info!("📚 Cache hit for generation {}", key);
                    return Ok(result);
                }
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", key, e),
            }
        }

        debug!("Cache miss for generation {}", key);
        let result = self.coerce(request).await?;

        if let Err(e) = cache.set(&key, result.clone().into_value()).await {
            warn!("Failed to store generation {} in cache: {}", key, e);
        }
        Ok(result)
    }
}

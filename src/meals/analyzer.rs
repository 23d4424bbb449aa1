use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use reqwest::{multipart, Client};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error, instrument};

use crate::{
    config::OpenAiConfig,
    nutrition::{MealAnalysis, NutrientGroup},
};

/// Languages the analysis prompts are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Uz,
    UzCyrl,
    Ru,
}

impl Language {
    /// Accepts `en`, `ru-RU`, `uz`, `uz-Cyrl`, ... case-insensitively.
    pub fn from_tag(tag: &str) -> Option<Language> {
        let tag = tag.trim().to_ascii_lowercase().replace('_', "-");
        if tag == "uz-cyrl" || tag.starts_with("uz-cyrl-") {
            return Some(Language::UzCyrl);
        }
        match tag.split('-').next().unwrap_or("") {
            "en" => Some(Language::En),
            "uz" => Some(Language::Uz),
            "ru" => Some(Language::Ru),
            _ => None,
        }
    }

    /// First supported language in an `Accept-Language` header value.
    pub fn from_accept_language(header: &str) -> Option<Language> {
        header
            .split(',')
            .filter_map(|part| part.split(';').next())
            .find_map(Language::from_tag)
    }

    /// Hint passed to the transcription model; only set where it helps.
    pub fn transcription_hint(self) -> Option<&'static str> {
        match self {
            Language::En => Some("en"),
            Language::Ru => Some("ru"),
            Language::Uz | Language::UzCyrl => None,
        }
    }

    fn image_prompt(self) -> &'static str {
        match self {
            Language::En => "Analyze this image in English.",
            Language::Uz => "Rasmni tahlil qiling va o'zbekcha javob bering.",
            Language::UzCyrl => "Расмни таҳлил қилинг ва ўзбекча жавоб беринг.",
            Language::Ru => "Проанализируйте это изображение и ответьте на русском языке.",
        }
    }

    fn answer_in(self) -> &'static str {
        match self {
            Language::En => "in English",
            Language::Uz => "o'zbekcha",
            Language::UzCyrl => "ўзбекча",
            Language::Ru => "на русском языке",
        }
    }
}

/// Turns meal photos and voice notes into nutrient records.
#[async_trait]
pub trait MealAnalyzer: Send + Sync {
    async fn analyze_image(
        &self,
        image: &[u8],
        content_type: &str,
        language: Language,
    ) -> anyhow::Result<MealAnalysis>;

    /// Result carries the transcription of the recording.
    async fn analyze_voice(
        &self,
        audio: &[u8],
        file_name: &str,
        language: Language,
    ) -> anyhow::Result<MealAnalysis>;
}

const IMAGE_SYSTEM: &str = "You are a professional nutritionist and food analysis expert. \
Your job is to determine if an image contains food, and if so, analyze it for nutritional information.";

const IMAGE_INSTRUCTIONS: &str = "CRITICAL: First, determine if this image contains actual food or beverages.
- If the image shows food or drinks, set is_food to true and analyze it.
- If the image shows anything that is NOT food, set is_food to false, confidence to 'high', and return an empty foods array.

If it IS food, for each food item you can identify:
1. Identify the food name clearly
2. Estimate the portion size (e.g., '1 burger (250g)', 'medium serving (150g)')
3. Set confidence level (high/medium/low) based on image clarity
4. Provide complete nutritional information for every listed nutrient.

Each value is a number followed by its unit, e.g. '12.5 g'. Use kcal for calories, \
g for macros and some nutrients, mg for most minerals and some vitamins, mcg for other vitamins.";

const VOICE_INSTRUCTIONS: &str = "For each food item mentioned:
1. Identify the food name
2. Estimate portion size (make reasonable assumptions if not specified)
3. Provide nutritional information for every listed nutrient.

Each value is a number followed by its unit, e.g. '12.5 g'. Use kcal for calories, \
g for macros, mg for minerals, mcg for vitamins. If portions aren't specified, use standard serving sizes.";

fn group_schema(group: NutrientGroup) -> Value {
    let keys: Vec<&str> = group.nutrients().map(|n| n.key()).collect();
    let properties: Map<String, Value> = keys
        .iter()
        .map(|k| (k.to_string(), json!({"type": "string"})))
        .collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": keys,
        "additionalProperties": false,
    })
}

/// Strict JSON schema of [`MealAnalysis`], one property per tracked nutrient.
pub fn analysis_schema() -> Value {
    let confidence = json!({"type": "string", "enum": ["high", "medium", "low"]});

    let mut food_props = Map::new();
    food_props.insert("name".into(), json!({"type": "string"}));
    food_props.insert("portion_size".into(), json!({"type": "string"}));
    food_props.insert("confidence".into(), confidence.clone());
    let mut food_required = vec!["name", "portion_size", "confidence"];
    for group in NutrientGroup::ALL {
        food_props.insert(group.key().into(), group_schema(group));
        food_required.push(group.key());
    }

    json!({
        "type": "object",
        "properties": {
            "is_food": {"type": "boolean"},
            "confidence": confidence,
            "foods": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": food_props,
                    "required": food_required,
                    "additionalProperties": false,
                },
            },
        },
        "required": ["is_food", "confidence", "foods"],
        "additionalProperties": false,
    })
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct Transcription {
    text: String,
}

fn parse_chat(resp: ChatResponse) -> anyhow::Result<MealAnalysis> {
    let message = resp
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .context("analysis response has no choices")?;
    if let Some(refusal) = message.refusal {
        return Err(anyhow!("analysis refused: {refusal}"));
    }
    let content = message.content.context("analysis response is empty")?;
    serde_json::from_str(&content).context("analysis does not match schema")
}

#[derive(Clone)]
pub struct OpenAiAnalyzer {
    http: Client,
    cfg: OpenAiConfig,
}

impl OpenAiAnalyzer {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            http: Client::new(),
            cfg,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), path)
    }

    async fn complete(&self, messages: Value) -> anyhow::Result<MealAnalysis> {
        let body = json!({
            "model": self.cfg.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "meal_analysis",
                    "strict": true,
                    "schema": analysis_schema(),
                },
            },
        });

        let resp = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .context("openai chat request")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%status, body = %text, "openai chat completion failed");
            return Err(anyhow!("openai returned {status}"));
        }
        let parsed: ChatResponse = resp.json().await.context("decode openai response")?;
        let analysis = parse_chat(parsed)?;
        debug!(foods = analysis.foods.len(), is_food = analysis.is_food, "analysis parsed");
        Ok(analysis)
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
        language: Language,
    ) -> anyhow::Result<String> {
        let part = multipart::Part::bytes(audio.to_vec()).file_name(file_name.to_string());
        let mut form = multipart::Form::new()
            .text("model", self.cfg.transcribe_model.clone())
            .part("file", part);
        if let Some(hint) = language.transcription_hint() {
            form = form.text("language", hint);
        }

        let resp = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.cfg.api_key)
            .multipart(form)
            .send()
            .await
            .context("openai transcription request")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            error!(%status, body = %text, "openai transcription failed");
            return Err(anyhow!("transcription returned {status}"));
        }
        let t: Transcription = resp.json().await.context("decode transcription")?;
        Ok(t.text)
    }
}

#[async_trait]
impl MealAnalyzer for OpenAiAnalyzer {
    #[instrument(skip(self, image))]
    async fn analyze_image(
        &self,
        image: &[u8],
        content_type: &str,
        language: Language,
    ) -> anyhow::Result<MealAnalysis> {
        let data_url = format!("data:{};base64,{}", content_type, Base64::encode_string(image));
        let messages = json!([
            {"role": "system", "content": IMAGE_SYSTEM},
            {"role": "user", "content": [
                {"type": "text", "text": format!("{}\n\n{}", language.image_prompt(), IMAGE_INSTRUCTIONS)},
                {"type": "image_url", "image_url": {"url": data_url}},
            ]},
        ]);
        self.complete(messages).await
    }

    #[instrument(skip(self, audio))]
    async fn analyze_voice(
        &self,
        audio: &[u8],
        file_name: &str,
        language: Language,
    ) -> anyhow::Result<MealAnalysis> {
        let transcription = self.transcribe(audio, file_name, language).await?;
        let messages = json!([
            {"role": "system", "content": format!(
                "You are a professional nutritionist. Based on meal descriptions, estimate nutritional content. Respond {}.",
                language.answer_in()
            )},
            {"role": "user", "content": format!(
                "Based on this meal description, estimate the nutritional content: \"{}\"\n\n{}",
                transcription, VOICE_INSTRUCTIONS
            )},
        ]);
        let mut analysis = self.complete(messages).await?;
        analysis.transcription = Some(transcription);
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{Nutrient, NUTRIENT_COUNT};

    #[test]
    fn language_tags() {
        assert_eq!(Language::from_tag("ru-RU"), Some(Language::Ru));
        assert_eq!(Language::from_tag("uz-Cyrl"), Some(Language::UzCyrl));
        assert_eq!(Language::from_tag("uz_cyrl"), Some(Language::UzCyrl));
        assert_eq!(Language::from_tag("UZ"), Some(Language::Uz));
        assert_eq!(Language::from_tag("de"), None);
        assert_eq!(
            Language::from_accept_language("de-DE,ru;q=0.9,en;q=0.8"),
            Some(Language::Ru)
        );
        assert_eq!(Language::from_accept_language("fr"), None);
    }

    #[test]
    fn transcription_hint_only_for_en_and_ru() {
        assert_eq!(Language::En.transcription_hint(), Some("en"));
        assert_eq!(Language::Ru.transcription_hint(), Some("ru"));
        assert_eq!(Language::Uz.transcription_hint(), None);
        assert_eq!(Language::UzCyrl.transcription_hint(), None);
    }

    #[test]
    fn schema_lists_every_nutrient() {
        let schema = analysis_schema();
        let food = &schema["properties"]["foods"]["items"]["properties"];
        let mut seen = 0;
        for n in Nutrient::ALL {
            let group = &food[n.group().key()];
            assert_eq!(group["properties"][n.key()]["type"], "string", "{n}");
            assert!(group["required"]
                .as_array()
                .unwrap()
                .iter()
                .any(|k| k == n.key()));
            seen += 1;
        }
        assert_eq!(seen, NUTRIENT_COUNT);
    }

    #[test]
    fn chat_content_parses_into_analysis() {
        let content = json!({
            "is_food": true,
            "confidence": "high",
            "foods": [{
                "name": "Plov",
                "portion_size": "1 plate (350g)",
                "confidence": "medium",
                "nutritions": {"calories": "650 kcal", "carbs": "80 g", "fat": "25 g", "protein": "22 g"},
                "minerals": {}, "vitamins": {}, "additional": {}
            }]
        })
        .to_string();
        let resp = ChatResponse {
            choices: vec![Choice {
                message: ChatMessage {
                    content: Some(content),
                    refusal: None,
                },
            }],
        };
        let analysis = parse_chat(resp).unwrap();
        assert_eq!(analysis.foods.len(), 1);
        assert_eq!(
            analysis.foods[0].nutritions.get(Nutrient::Calories.key()).map(String::as_str),
            Some("650 kcal")
        );
    }

    #[test]
    fn refusal_is_an_error() {
        let resp = ChatResponse {
            choices: vec![Choice {
                message: ChatMessage {
                    content: None,
                    refusal: Some("no".into()),
                },
            }],
        };
        assert!(parse_chat(resp).is_err());
    }
}

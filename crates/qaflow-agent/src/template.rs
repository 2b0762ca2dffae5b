use qaflow_core::{MediaAttachment, QaError, QaResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A fixed natural-language prompt with named placeholders.
///
/// Two constructs are supported:
/// - `{{field}}` substitutes the scalar value of `field` from the input object;
/// - `{{media field}}` detaches `field` (a `data:` URI) as the request's media
///   attachment. At most one media slot is allowed per template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    source: String,
}

/// A placeholder found in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    Field(String),
    Media(String),
}

impl Placeholder {
    pub fn field_name(&self) -> &str {
        match self {
            Placeholder::Field(name) | Placeholder::Media(name) => name,
        }
    }
}

/// Output of [`PromptTemplate::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    pub media: Option<MediaAttachment>,
}

enum Segment<'a> {
    Text(&'a str),
    Slot(Placeholder),
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// All placeholders in order of appearance.
    pub fn placeholders(&self) -> QaResult<Vec<Placeholder>> {
        Ok(self
            .segments()?
            .into_iter()
            .filter_map(|s| match s {
                Segment::Slot(p) => Some(p),
                Segment::Text(_) => None,
            })
            .collect())
    }

    /// Substitute fields of `input` (a JSON object) into the template.
    pub fn render(&self, input: &Value) -> QaResult<RenderedPrompt> {
        let fields = input
            .as_object()
            .ok_or_else(|| QaError::Validation("prompt input must be a JSON object".into()))?;

        let mut text = String::with_capacity(self.source.len());
        let mut media = None;

        for segment in self.segments()? {
            match segment {
                Segment::Text(t) => text.push_str(t),
                Segment::Slot(Placeholder::Field(name)) => {
                    let value = fields.get(&name).ok_or_else(|| {
                        QaError::Validation(format!("template field `{name}` missing from input"))
                    })?;
                    match value {
                        Value::String(s) => text.push_str(s),
                        Value::Number(n) => text.push_str(&n.to_string()),
                        Value::Bool(b) => text.push_str(if *b { "true" } else { "false" }),
                        _ => {
                            return Err(QaError::Validation(format!(
                                "template field `{name}` must be a string, number or boolean"
                            )))
                        }
                    }
                }
                Segment::Slot(Placeholder::Media(name)) => {
                    let uri = fields.get(&name).and_then(Value::as_str).ok_or_else(|| {
                        QaError::Validation(format!("media field `{name}` must be a data URI string"))
                    })?;
                    media = Some(MediaAttachment::from_data_uri(uri)?);
                }
            }
        }

        Ok(RenderedPrompt { text, media })
    }

    fn segments(&self) -> QaResult<Vec<Segment<'_>>> {
        let mut segments = Vec::new();
        let mut rest = self.source.as_str();
        let mut media_slots = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(&rest[..start]));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                QaError::Validation("unterminated placeholder in prompt template".into())
            })?;
            let inner = after[..end].trim();

            let placeholder = match inner.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["media", name] => {
                    media_slots += 1;
                    Placeholder::Media((*name).to_string())
                }
                [name] => Placeholder::Field((*name).to_string()),
                _ => {
                    return Err(QaError::Validation(format!(
                        "invalid placeholder `{{{{{inner}}}}}` in prompt template"
                    )))
                }
            };
            if media_slots > 1 {
                return Err(QaError::Validation(
                    "prompt template may contain at most one media slot".into(),
                ));
            }
            segments.push(Segment::Slot(placeholder));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest));
        }
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_substitutes_fields() {
        let template = PromptTemplate::new("Goal: {{testGoal}}\nRetries: {{ retries }} ok={{ok}}");
        let rendered = template
            .render(&json!({"testGoal": "Test login", "retries": 3, "ok": true}))
            .unwrap();
        assert_eq!(rendered.text, "Goal: Test login\nRetries: 3 ok=true");
        assert!(rendered.media.is_none());
    }

    #[test]
    fn test_missing_field_is_validation_error() {
        let template = PromptTemplate::new("Goal: {{testGoal}}");
        let err = template.render(&json!({})).unwrap_err();
        assert!(matches!(err, QaError::Validation(_)));
        assert!(err.to_string().contains("testGoal"));
    }

    #[test]
    fn test_non_scalar_field_rejected() {
        let template = PromptTemplate::new("{{items}}");
        let err = template.render(&json!({"items": [1, 2]})).unwrap_err();
        assert!(matches!(err, QaError::Validation(_)));
    }

    #[test]
    fn test_media_slot_detaches_attachment() {
        let template = PromptTemplate::new("Description: {{description}}\nVideo: {{media videoDataUri}}");
        let rendered = template
            .render(&json!({
                "description": "User logs in",
                "videoDataUri": "data:video/mp4;base64,AAAA"
            }))
            .unwrap();
        assert_eq!(rendered.text, "Description: User logs in\nVideo: ");
        let media = rendered.media.unwrap();
        assert_eq!(media.mime_type, "video/mp4");
        assert_eq!(media.data, "AAAA");
    }

    #[test]
    fn test_two_media_slots_rejected() {
        let template = PromptTemplate::new("{{media a}} {{media b}}");
        assert!(template.placeholders().is_err());
    }

    #[test]
    fn test_unterminated_placeholder_rejected() {
        let template = PromptTemplate::new("Goal: {{testGoal");
        assert!(template.render(&json!({"testGoal": "x"})).is_err());
    }

    #[test]
    fn test_placeholders_in_order() {
        let template = PromptTemplate::new("{{b}} then {{media a}}");
        let names: Vec<String> = template
            .placeholders()
            .unwrap()
            .iter()
            .map(|p| p.field_name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}

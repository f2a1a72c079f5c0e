//! Ghost MCP prompt catalog
//!
//! Prompts are message templates with named arguments. `{name}` placeholders
//! in a template are replaced by the argument value at `prompts/get` time.

mod builtin;

pub use builtin::register_builtin;

use std::collections::BTreeMap;

use crate::error::{McpError, Result};
use crate::invariants;
use crate::protocol::{
    Prompt, PromptArgument, PromptContent, PromptMessage, PromptRole, PromptsGetResult,
};

/// A prompt and the messages it expands to
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    prompt: Prompt,
    messages: Vec<(PromptRole, String)>,
    defaults: BTreeMap<String, String>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            prompt: Prompt {
                name: name.into(),
                description: Some(description.into()),
                arguments: Vec::new(),
            },
            messages: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }

    pub fn required(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.prompt.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required: true,
        });
        self
    }

    /// Optional argument substituted with `default` when absent
    pub fn optional(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.defaults.insert(name.clone(), default.into());
        self.prompt.arguments.push(PromptArgument {
            name,
            description: Some(description.into()),
            required: false,
        });
        self
    }

    pub fn message(mut self, role: PromptRole, template: impl Into<String>) -> Self {
        self.messages.push((role, template.into()));
        self
    }

    pub fn prompt(&self) -> &Prompt {
        &self.prompt
    }

    /// Expand the template with the given arguments
    pub fn render(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<PromptsGetResult> {
        let missing: Vec<&str> = self
            .prompt
            .arguments
            .iter()
            .filter(|a| a.required && !arguments.contains_key(&a.name))
            .map(|a| a.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(McpError::InvalidParams(format!(
                "Missing required argument(s) for {}: {}",
                self.prompt.name,
                missing.join(", ")
            )));
        }

        let mut values = self.defaults.clone();
        for (name, value) in arguments {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            values.insert(name.clone(), text);
        }

        let messages = self
            .messages
            .iter()
            .map(|(role, template)| PromptMessage {
                role: *role,
                content: PromptContent::Text {
                    text: substitute(template, &values),
                },
            })
            .collect();

        Ok(PromptsGetResult {
            description: self
                .prompt
                .description
                .as_ref()
                .map(|d| substitute(d, &values)),
            messages,
        })
    }
}

/// Replace `{name}` placeholders in one pass over the template.
///
/// Inserted values are never rescanned, and unknown placeholders stay as written.
fn substitute(template: &str, values: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let Some(close) = tail.find('}') else {
            out.push('{');
            rest = tail;
            break;
        };
        match values.get(&tail[..close]) {
            Some(value) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Registered prompts, listed in registration order
#[derive(Debug, Default)]
pub struct PromptCatalog {
    templates: Vec<PromptTemplate>,
}

impl PromptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt. Duplicate names are rejected.
    pub fn register(&mut self, template: PromptTemplate) -> Result<()> {
        if self.find(&template.prompt.name).is_some() {
            return Err(McpError::DuplicatePrompt(template.prompt.name));
        }
        invariants::validate_name(&template.prompt.name)?;
        self.templates.push(template);
        Ok(())
    }

    pub fn list(&self) -> Vec<Prompt> {
        self.templates.iter().map(|t| t.prompt.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn find(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.prompt.name == name)
    }

    pub fn get(
        &self,
        name: &str,
        arguments: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<PromptsGetResult> {
        let template = self
            .find(name)
            .ok_or_else(|| McpError::PromptNotFound(name.to_string()))?;

        let empty = serde_json::Map::new();
        template.render(arguments.unwrap_or(&empty))
    }
}

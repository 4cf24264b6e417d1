//! OpenAI-compatible Chat Completions `ChatEndpoint`. Talks to any server that speaks the
//! OpenAI Chat Completions wire format, which covers both the real API and the self-hosted
//! endpoints a `ModelEndpointConfig` can point at.

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCalls, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestUserMessage, ChatCompletionTool, ChatCompletionToolChoiceOption,
    ChatCompletionTools, CreateChatCompletionRequestArgs, FunctionObject, ToolChoiceOptions,
};
use async_openai::Client;
use async_trait::async_trait;
use okcvm_tools::AgentToolWrapper;
use tokio_stream::StreamExt;

use crate::chat::{ChatEndpoint, ChatError, ChatMessage, ChatTurn, RequestedToolCall, TokenCallback};

pub struct ChatOpenAI {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl ChatOpenAI {
    /// Builds a client against the given (possibly self-hosted) base URL, falling back to the
    /// real OpenAI API when `base_url` is `None`.
    pub fn new(model: impl Into<String>, base_url: Option<String>, api_key: Option<String>) -> Self {
        let mut config = OpenAIConfig::new();
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        if let Some(key) = api_key {
            config = config.with_api_key(key);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn messages_to_request(messages: &[ChatMessage]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                ChatMessage::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                ChatMessage::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                ChatMessage::Assistant(s) => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessage::from(s.as_str()),
                ),
            })
            .collect()
    }

    fn tools_to_request(tools: &[AgentToolWrapper]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.input_schema.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChatEndpoint for ChatOpenAI {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        tools: &[AgentToolWrapper],
    ) -> Result<ChatTurn, ChatError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        if !tools.is_empty() {
            args.tools(Self::tools_to_request(tools));
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| ChatError::Request(format!("request build failed: {e}")))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let choice = response.choices.into_iter().next().ok_or(ChatError::NoChoices)?;
        let message = choice.message;
        let content = message.content.unwrap_or_default();
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(RequestedToolCall {
                    id: f.id,
                    name: f.function.name,
                    arguments: serde_json::from_str(&f.function.arguments)
                        .unwrap_or(serde_json::Value::Null),
                }),
                _ => None,
            })
            .collect();

        Ok(ChatTurn { content, tool_calls })
    }

    async fn invoke_stream(
        &self,
        messages: &[ChatMessage],
        tools: &[AgentToolWrapper],
        on_token: &TokenCallback<'_>,
    ) -> Result<ChatTurn, ChatError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.clone());
        args.messages(Self::messages_to_request(messages));
        args.stream(true);
        if !tools.is_empty() {
            args.tools(Self::tools_to_request(tools));
            args.tool_choice(ChatCompletionToolChoiceOption::Mode(ToolChoiceOptions::Auto));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| ChatError::Request(format!("request build failed: {e}")))?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| ChatError::Request(e.to_string()))?;

        let mut content = String::new();
        let mut tool_call_map: std::collections::HashMap<u32, (String, String, String)> =
            std::collections::HashMap::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ChatError::Request(e.to_string()))?;
            for choice in chunk.choices {
                if let Some(delta) = choice.delta.content {
                    if !delta.is_empty() {
                        content.push_str(&delta);
                        on_token(&delta);
                    }
                }
                if let Some(tool_calls) = choice.delta.tool_calls {
                    for tc in tool_calls {
                        let entry = tool_call_map.entry(tc.index).or_insert_with(|| {
                            (tc.id.clone().unwrap_or_default(), String::new(), String::new())
                        });
                        if let Some(id) = tc.id {
                            if !id.is_empty() {
                                entry.0 = id;
                            }
                        }
                        if let Some(function) = tc.function {
                            if let Some(name) = function.name {
                                entry.1.push_str(&name);
                            }
                            if let Some(arguments) = function.arguments {
                                entry.2.push_str(&arguments);
                            }
                        }
                    }
                }
            }
        }

        let mut tool_calls: Vec<RequestedToolCall> = tool_call_map
            .into_values()
            .map(|(id, name, arguments)| RequestedToolCall {
                id,
                name,
                arguments: serde_json::from_str(&arguments).unwrap_or(serde_json::Value::Null),
            })
            .collect();
        tool_calls.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ChatTurn { content, tool_calls })
    }
}

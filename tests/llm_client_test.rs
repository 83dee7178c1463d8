#[cfg(test)]
mod llm_client_integration_tests {
    use learnserver::core::config::LlmConfig;
    use learnserver::llm::{ChatMessage, GenerationOptions, LLMProvider, LlmError, OpenAIClient};
    use mockito::Matcher;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config(base_url: String, api_key: &str) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: api_key.to_string(),
            model: "test-model".to_string(),
            temperature: 0.2,
            max_tokens: 256,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_generate_returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "stream": false,
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [{ "message": { "role": "assistant", "content": "  {\"questions\": []}  " } }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = OpenAIClient::new(&config(server.url(), "test-key")).unwrap();
        let options = GenerationOptions {
            json_mode: true,
            ..Default::default()
        };
        let content = client
            .generate(&[ChatMessage::user("Make a quiz")], &options)
            .await
            .unwrap();

        assert_eq!(content, "{\"questions\": []}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_generate_surfaces_provider_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = OpenAIClient::new(&config(server.url(), "")).unwrap();
        let err = client
            .generate(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();

        match err {
            LlmError::Status { status, body } => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_content() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({ "choices": [{ "message": { "content": "" } }] }).to_string())
            .create_async()
            .await;

        let client = OpenAIClient::new(&config(server.url(), "k")).unwrap();
        let err = client
            .generate(&[ChatMessage::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_generate_stream_forwards_deltas() {
        let body = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"Own"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"ership"}}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");

        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::PartialJson(json!({ "stream": true })))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let client = OpenAIClient::new(&config(server.url(), "k")).unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        client
            .generate_stream(&[ChatMessage::user("Explain")], &GenerationOptions::default(), tx)
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(delta) = rx.recv().await {
            received.push(delta);
        }
        assert_eq!(received, vec!["Own", "ership"]);
        mock.assert_async().await;
    }
}

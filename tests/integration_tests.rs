//! Integration tests for the tutorchat library.
//! Most tests run against a local server that speaks the streaming wire format;
//! the live tests require an API key in the environment and skip without one.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use tutorchat::{
        API_KEY_ENV, CancelHandle, Conversation, ERROR_REPLY, Gemini, GeminiProvider, Message,
        Model, Renderer, SessionProvider, TurnOutcome,
    };

    const PERSONA: &str = "You are a friendly tutor.";

    enum Reply {
        /// Stream these text chunks, then close.
        Chunks(Vec<&'static str>),
        /// Stream these text chunks and keep the connection open.
        Stall(Vec<&'static str>),
        /// Reject with a status code and body.
        Status(u16, Value),
    }

    struct Recorded {
        head: String,
        body: Value,
    }

    struct MockGemini {
        addr: SocketAddr,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl MockGemini {
        async fn serve(replies: Vec<Reply>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorded = Arc::clone(&requests);
            tokio::spawn(async move {
                for reply in replies {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let request = read_request(&mut socket).await;
                    recorded.lock().unwrap().push(request);
                    tokio::spawn(write_reply(socket, reply));
                }
            });
            Self { addr, requests }
        }

        fn base_url(&self) -> String {
            format!("http://{}/v1beta", self.addr)
        }

        fn provider(&self) -> Arc<dyn SessionProvider> {
            let client =
                Gemini::with_options(Some("test-key".to_string()), Some(self.base_url()), None)
                    .unwrap();
            Arc::new(GeminiProvider::new(client))
        }

        fn request(&self, index: usize) -> (String, Value) {
            let requests = self.requests.lock().unwrap();
            let request = &requests[index];
            (request.head.clone(), request.body.clone())
        }
    }

    async fn read_request(socket: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed mid-body");
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = serde_json::from_slice(&buf[header_end..header_end + length]).unwrap();
        Recorded { head, body }
    }

    fn chunk_event(text: &str) -> String {
        let chunk = json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}}]
        });
        format!("data: {chunk}\r\n\r\n")
    }

    async fn write_reply(mut socket: TcpStream, reply: Reply) {
        match reply {
            Reply::Chunks(chunks) => {
                write_sse_head(&mut socket).await;
                for text in chunks {
                    let _ = socket.write_all(chunk_event(text).as_bytes()).await;
                }
                let finish = json!({
                    "candidates": [{"finishReason": "STOP"}],
                    "usageMetadata": {"promptTokenCount": 3, "totalTokenCount": 9}
                });
                let _ = socket
                    .write_all(format!("data: {finish}\r\n\r\n").as_bytes())
                    .await;
                let _ = socket.shutdown().await;
            }
            Reply::Stall(chunks) => {
                write_sse_head(&mut socket).await;
                for text in chunks {
                    let _ = socket.write_all(chunk_event(text).as_bytes()).await;
                }
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Reply::Status(code, body) => {
                let body = body.to_string();
                let head = format!(
                    "HTTP/1.1 {code} Error\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        }
    }

    async fn write_sse_head(socket: &mut TcpStream) {
        let head =
            "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n";
        let _ = socket.write_all(head.as_bytes()).await;
    }

    #[derive(Default)]
    struct Collect {
        text: String,
        failures: Vec<String>,
        cancel_after_first: Option<CancelHandle>,
    }

    impl Renderer for Collect {
        fn print_text(&mut self, text: &str) {
            self.text.push_str(text);
            if let Some(handle) = self.cancel_after_first.take() {
                handle.cancel();
            }
        }

        fn finish_response(&mut self) {}

        fn print_interrupted(&mut self) {}

        fn print_failure(&mut self, message: &str) {
            self.failures.push(message.to_string());
        }

        fn print_error(&mut self, _error: &str) {}

        fn print_info(&mut self, _info: &str) {}
    }

    #[tokio::test]
    async fn streamed_reply_is_folded() {
        let server = MockGemini::serve(vec![Reply::Chunks(vec!["4", " is the answer."])]).await;
        let mut conversation = Conversation::start(server.provider(), Model::default(), PERSONA)
            .await
            .unwrap();
        let mut renderer = Collect::default();

        let outcome = conversation.send("2+2?", &mut renderer).await.unwrap();

        assert_eq!(outcome, Some(TurnOutcome::Completed));
        assert_eq!(renderer.text, "4 is the answer.");
        assert_eq!(
            conversation.transcript().messages(),
            &[Message::user("2+2?"), Message::bot("4 is the answer.")]
        );

        let (head, body) = server.request(0);
        assert!(
            head.starts_with(
                "POST /v1beta/models/gemini-2.5-flash:streamGenerateContent?alt=sse HTTP/1.1"
            ),
            "{head}"
        );
        assert!(head.to_ascii_lowercase().contains("x-goog-api-key: test-key"));
        assert_eq!(
            body,
            json!({
                "contents": [{"role": "user", "parts": [{"text": "2+2?"}]}],
                "systemInstruction": {"parts": [{"text": PERSONA}]}
            })
        );
    }

    #[tokio::test]
    async fn completed_turns_are_sent_as_history() {
        let server = MockGemini::serve(vec![
            Reply::Chunks(vec!["Mitochondria", " make ATP."]),
            Reply::Chunks(vec!["Yes."]),
        ])
        .await;
        let mut conversation = Conversation::start(server.provider(), Model::default(), PERSONA)
            .await
            .unwrap();

        conversation
            .send("What do mitochondria do?", &mut Collect::default())
            .await
            .unwrap();
        conversation
            .send("Is that energy?", &mut Collect::default())
            .await
            .unwrap();

        let (_, body) = server.request(1);
        assert_eq!(
            body["contents"],
            json!([
                {"role": "user", "parts": [{"text": "What do mitochondria do?"}]},
                {"role": "model", "parts": [{"text": "Mitochondria make ATP."}]},
                {"role": "user", "parts": [{"text": "Is that energy?"}]}
            ])
        );
    }

    #[tokio::test]
    async fn cancelled_turn_keeps_partial_text_and_is_not_history() {
        let server = MockGemini::serve(vec![
            Reply::Stall(vec!["Once upon"]),
            Reply::Chunks(vec!["Sure."]),
        ])
        .await;
        let mut conversation = Conversation::start(server.provider(), Model::default(), PERSONA)
            .await
            .unwrap();
        let mut renderer = Collect {
            cancel_after_first: Some(conversation.cancel_handle()),
            ..Collect::default()
        };

        let outcome = conversation.send("long answer", &mut renderer).await.unwrap();
        assert_eq!(outcome, Some(TurnOutcome::Cancelled));
        assert_eq!(
            conversation.transcript().last(),
            Some(&Message::bot("Once upon"))
        );

        conversation
            .send("short answer", &mut Collect::default())
            .await
            .unwrap();
        let (_, body) = server.request(1);
        assert_eq!(
            body["contents"],
            json!([{"role": "user", "parts": [{"text": "short answer"}]}])
        );
    }

    #[tokio::test]
    async fn server_error_becomes_error_reply() {
        let server = MockGemini::serve(vec![Reply::Status(
            503,
            json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}}),
        )])
        .await;
        let mut conversation = Conversation::start(server.provider(), Model::default(), PERSONA)
            .await
            .unwrap();
        let mut renderer = Collect::default();

        let outcome = conversation.send("hi", &mut renderer).await.unwrap();

        assert_eq!(outcome, Some(TurnOutcome::Failed));
        assert_eq!(
            conversation.transcript().messages(),
            &[Message::user("hi"), Message::error(ERROR_REPLY)]
        );
        assert_eq!(renderer.failures, vec![ERROR_REPLY.to_string()]);
        assert!(!conversation.is_busy());
    }

    #[tokio::test]
    async fn clear_starts_a_fresh_history() {
        let server = MockGemini::serve(vec![
            Reply::Chunks(vec!["Paris."]),
            Reply::Chunks(vec!["Hello!"]),
        ])
        .await;
        let mut conversation = Conversation::start(server.provider(), Model::default(), PERSONA)
            .await
            .unwrap();
        conversation
            .send("Capital of France?", &mut Collect::default())
            .await
            .unwrap();
        let before = conversation.session_id();

        conversation.set_model("gemini-2.5-pro".into());
        conversation.clear().await.unwrap();
        assert!(conversation.transcript().is_empty());
        assert_ne!(conversation.session_id(), before);

        conversation
            .send("hello", &mut Collect::default())
            .await
            .unwrap();
        let (head, body) = server.request(1);
        assert!(head.contains("/models/gemini-2.5-pro:streamGenerateContent"));
        assert_eq!(body["contents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_live_reply() {
        let api_key = std::env::var(API_KEY_ENV).ok();
        if api_key.is_none() {
            eprintln!("Skipping test: {API_KEY_ENV} not set");
            return;
        }

        let client = Gemini::new(api_key).expect("Failed to create client");
        let provider: Arc<dyn SessionProvider> = Arc::new(GeminiProvider::new(client));
        let mut conversation = Conversation::start(provider, Model::default(), PERSONA)
            .await
            .expect("Failed to start conversation");
        let mut renderer = Collect::default();

        let outcome = conversation
            .send("Reply with the single word: ready", &mut renderer)
            .await
            .unwrap();
        assert_eq!(outcome, Some(TurnOutcome::Completed));
        assert!(!renderer.text.is_empty());
    }
}

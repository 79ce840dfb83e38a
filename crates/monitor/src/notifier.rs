use std::{io, path::Path, time::Duration};

use common::config;
use derive_more::{Display, Error, From};
use reqwest::{
    multipart::{Form, Part},
    Client, StatusCode,
};
use tokio::time::sleep;
use tracing::{error, info};

/// Maximum message length, in characters.
pub const MESSAGE_LIMIT: usize = 4000;

/// Pause between two chunks of a single message.
const CHUNK_PAUSE: Duration = Duration::from_secs(1);

/// Text message request timeout.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Document upload request timeout.
const DOCUMENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Notification delivery errors.
#[derive(Debug, Display, Error, From)]
pub enum NotifyError {
    /// HTTP client error.
    Http(reqwest::Error),

    /// Unable to read a document.
    Io(io::Error),

    /// Bot API rejected the request.
    #[display(fmt = "bot api error {}: {}", status, description)]
    Api {
        status: StatusCode,
        description: String,
    },
}

/// Telegram Bot API channel.
struct Telegram {
    client: Client,
    base_url: String,
    chat_id: String,
    chunk_pause: Duration,
}

/// Notification channel.
///
/// Without Telegram configuration, notifications are written to the log instead.
pub struct Notifier {
    telegram: Option<Telegram>,
}

impl Notifier {
    pub fn new(
        telegram: Option<&config::Telegram>,
        http: &config::Http,
    ) -> Result<Self, reqwest::Error> {
        let telegram = telegram
            .map(|telegram| -> Result<_, reqwest::Error> {
                Ok(Telegram {
                    client: collector::http::client(http, DOCUMENT_TIMEOUT)?,
                    base_url: format!(
                        "{}/bot{}",
                        telegram.api_url.trim_end_matches('/'),
                        telegram.bot_token
                    ),
                    chat_id: telegram.chat_id.clone(),
                    chunk_pause: CHUNK_PAUSE,
                })
            })
            .transpose()?;

        if telegram.is_none() {
            info!("telegram is not configured, notifications will be logged");
        }

        Ok(Self { telegram })
    }

    /// Check if notifications are delivered to Telegram.
    pub fn is_enabled(&self) -> bool {
        self.telegram.is_some()
    }

    /// Send an HTML-formatted message, splitting it into chunks if it's too long.
    pub async fn send_message(&self, text: &str) -> Result<(), NotifyError> {
        let Some(telegram) = &self.telegram else {
            info!("notification:\n{text}");
            return Ok(());
        };

        for (index, chunk) in chunks(text, MESSAGE_LIMIT).into_iter().enumerate() {
            if index > 0 {
                sleep(telegram.chunk_pause).await;
            }

            let response = telegram
                .client
                .post(format!("{}/sendMessage", telegram.base_url))
                .timeout(MESSAGE_TIMEOUT)
                .form(&[
                    ("chat_id", telegram.chat_id.as_str()),
                    ("text", chunk),
                    ("parse_mode", "HTML"),
                    ("disable_web_page_preview", "true"),
                ])
                .send()
                .await?;

            check(response).await?;
        }

        info!("telegram message sent");

        Ok(())
    }

    /// Send a file with an HTML-formatted caption.
    pub async fn send_document(&self, path: &Path, caption: &str) -> Result<(), NotifyError> {
        let Some(telegram) = &self.telegram else {
            info!(path = %path.display(), "document: {caption}");
            return Ok(());
        };

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("report"));

        let document = Part::bytes(tokio::fs::read(path).await?).file_name(file_name);

        let form = Form::new()
            .text("chat_id", telegram.chat_id.clone())
            .text("caption", caption.to_owned())
            .text("parse_mode", "HTML")
            .part("document", document);

        let response = telegram
            .client
            .post(format!("{}/sendDocument", telegram.base_url))
            .multipart(form)
            .send()
            .await?;

        check(response).await?;

        info!(path = %path.display(), "telegram document sent");

        Ok(())
    }

    /// Send a message, logging delivery errors instead of returning them.
    pub async fn notify(&self, text: &str) {
        if let Err(err) = self.send_message(text).await {
            error!(%err, "unable to send notification");
        }
    }
}

async fn check(response: reqwest::Response) -> Result<(), NotifyError> {
    let status = response.status();

    if status == StatusCode::OK {
        return Ok(());
    }

    Err(NotifyError::Api {
        status,
        description: response.text().await.unwrap_or_default(),
    })
}

/// Split text into chunks of at most `limit` characters.
pub fn chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let end = rest
            .char_indices()
            .nth(limit)
            .map_or(rest.len(), |(index, _)| index);

        let (chunk, tail) = rest.split_at(end);
        chunks.push(chunk);
        rest = tail;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use axum::{
        extract::{Multipart, State},
        http::StatusCode,
        routing::post,
        Form, Router, Server,
    };
    use common::config::{self, Config};

    use super::{chunks, Notifier, NotifyError};

    #[test]
    fn chunk_boundaries() {
        assert!(chunks("", 4).is_empty());
        assert_eq!(chunks("abc", 4), ["abc"]);
        assert_eq!(chunks("abcdefghij", 4), ["abcd", "efgh", "ij"]);
        assert_eq!(chunks("ääääää", 4), ["ääää", "ää"]);
        assert_eq!(chunks("🟢🟢🟢", 1), ["🟢", "🟢", "🟢"]);
    }

    #[derive(Clone, Default)]
    struct Received(Arc<Mutex<Vec<HashMap<String, String>>>>);

    async fn send_message(
        State(received): State<Received>,
        Form(fields): Form<HashMap<String, String>>,
    ) -> StatusCode {
        let rejected = fields.get("text").map_or(false, |text| text.contains("reject"));
        received.0.lock().unwrap().push(fields);

        if rejected {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::OK
        }
    }

    async fn send_document(
        State(received): State<Received>,
        mut multipart: Multipart,
    ) -> StatusCode {
        let mut fields = HashMap::new();

        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_owned();

            let value = match field.file_name().map(str::to_owned) {
                Some(file_name) => format!("{}:{}", file_name, field.text().await.unwrap()),
                None => field.text().await.unwrap(),
            };

            fields.insert(name, value);
        }

        received.0.lock().unwrap().push(fields);

        StatusCode::OK
    }

    async fn notifier() -> (Notifier, Received) {
        let received = Received::default();

        let router = Router::new()
            .route("/bottoken/sendMessage", post(send_message))
            .route("/bottoken/sendDocument", post(send_document))
            .with_state(received.clone());

        let server = Server::bind(&([127, 0, 0, 1], 0).into()).serve(router.into_make_service());
        let address = server.local_addr();
        tokio::spawn(server);

        let telegram = config::Telegram {
            bot_token: String::from("token"),
            chat_id: String::from("@monitor"),
            api_url: format!("http://{address}/"),
        };

        let mut notifier = Notifier::new(Some(&telegram), &Config::for_tests().http).unwrap();

        if let Some(telegram) = notifier.telegram.as_mut() {
            telegram.chunk_pause = Duration::ZERO;
        }

        (notifier, received)
    }

    #[tokio::test]
    async fn long_messages_are_chunked() {
        let (notifier, received) = notifier().await;
        let text = "a".repeat(9000);

        notifier.send_message(&text).await.unwrap();

        let received = received.0.lock().unwrap();
        let lengths: Vec<_> = received.iter().map(|fields| fields["text"].len()).collect();

        assert_eq!(lengths, [4000, 4000, 1000]);
        assert!(received.iter().all(|fields| fields["chat_id"] == "@monitor"));
        assert!(received.iter().all(|fields| fields["parse_mode"] == "HTML"));
    }

    #[tokio::test]
    async fn rejected_message() {
        let (notifier, _) = notifier().await;

        assert!(matches!(
            notifier.send_message("reject").await,
            Err(NotifyError::Api { status, .. }) if status == StatusCode::BAD_REQUEST
        ));
    }

    #[tokio::test]
    async fn document_upload() {
        let (notifier, received) = notifier().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_20240101_0000.csv");
        std::fs::write(&path, "Name,ID\n").unwrap();

        notifier.send_document(&path, "<b>report</b>").await.unwrap();

        let received = received.0.lock().unwrap();
        assert_eq!(received[0]["caption"], "<b>report</b>");
        assert_eq!(received[0]["document"], "monitor_20240101_0000.csv:Name,ID\n");

        assert!(matches!(
            notifier.send_document(&dir.path().join("missing.csv"), "").await,
            Err(NotifyError::Io(_))
        ));
    }

    #[tokio::test]
    async fn disabled_channel() {
        let notifier = Notifier::new(None, &Config::for_tests().http).unwrap();

        assert!(!notifier.is_enabled());
        assert!(notifier.send_message("text").await.is_ok());
    }
}

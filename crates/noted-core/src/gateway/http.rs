//! reqwest-backed gateway for the `/api/notes` REST surface.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{GatewayError, GatewayResult, NoteGateway};
use crate::auth::{Session, SessionTokenProvider};
use crate::config::ClientConfig;
use crate::models::{Note, NoteDraft, DEFAULT_NOTE_COLOR};
use crate::util::{compact_text, normalize_base_url};

const NOTES_PATH: &str = "/api/notes";

#[derive(Clone)]
pub struct HttpNoteGateway {
    base_url: String,
    client: Client,
    tokens: Arc<dyn SessionTokenProvider>,
}

impl fmt::Debug for HttpNoteGateway {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpNoteGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpNoteGateway {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        tokens: Arc<dyn SessionTokenProvider>,
    ) -> GatewayResult<Self> {
        let base_url = normalize_base_url(base_url).map_err(GatewayError::InvalidConfiguration)?;
        Ok(Self {
            base_url,
            client: Client::builder().timeout(timeout).build()?,
            tokens,
        })
    }

    pub fn from_config(
        config: &ClientConfig,
        tokens: Arc<dyn SessionTokenProvider>,
    ) -> GatewayResult<Self> {
        Self::new(&config.api_base_url, config.request_timeout(), tokens)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notes_url(&self) -> String {
        format!("{}{NOTES_PATH}", self.base_url)
    }

    fn note_url(&self, id: &str) -> String {
        format!("{}{NOTES_PATH}/{id}", self.base_url)
    }

    async fn authorized(
        &self,
        session: &Session,
        request: RequestBuilder,
    ) -> GatewayResult<RequestBuilder> {
        let token = self.tokens.access_token(session).await?;
        Ok(request
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> GatewayResult<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|error| {
            GatewayError::InvalidPayload(format!("{error}: {}", compact_text(&body)))
        })
    }

    async fn send_note(&self, request: RequestBuilder) -> GatewayResult<Note> {
        let envelope: NoteEnvelope = self.send(request).await?;
        envelope.into_note()
    }
}

#[async_trait]
impl NoteGateway for HttpNoteGateway {
    async fn list_notes(&self, session: &Session) -> GatewayResult<Vec<Note>> {
        let request = self
            .authorized(session, self.client.get(self.notes_url()))
            .await?;
        let envelope: NotesEnvelope = self.send(request).await?;
        envelope.into_notes()
    }

    async fn create_note(&self, session: &Session, draft: &NoteDraft) -> GatewayResult<Note> {
        let body = CreateNoteBody::from(draft);
        let request = self
            .authorized(session, self.client.post(self.notes_url()).json(&body))
            .await?;
        self.send_note(request).await
    }

    async fn update_note(
        &self,
        session: &Session,
        id: &str,
        draft: &NoteDraft,
    ) -> GatewayResult<Note> {
        let request = self
            .authorized(session, self.client.put(self.note_url(id)).json(draft))
            .await?;
        self.send_note(request).await
    }

    async fn delete_note(&self, session: &Session, id: &str) -> GatewayResult<()> {
        let request = self
            .authorized(session, self.client.delete(self.note_url(id)))
            .await?;
        let envelope: StatusEnvelope = self.send(request).await?;
        envelope.ensure_success()
    }

    async fn archive_note(&self, session: &Session, id: &str) -> GatewayResult<Note> {
        let url = format!("{}/archive", self.note_url(id));
        let request = self.authorized(session, self.client.patch(url)).await?;
        self.send_note(request).await
    }

    async fn unarchive_note(&self, session: &Session, id: &str) -> GatewayResult<Note> {
        let url = format!("{}/unarchive", self.note_url(id));
        let request = self.authorized(session, self.client.patch(url)).await?;
        self.send_note(request).await
    }
}

#[derive(Debug, Serialize)]
struct CreateNoteBody<'a> {
    title: &'a str,
    content: &'a str,
    color: &'a str,
}

impl<'a> From<&'a NoteDraft> for CreateNoteBody<'a> {
    fn from(draft: &'a NoteDraft) -> Self {
        let color = draft
            .color
            .as_deref()
            .map(str::trim)
            .filter(|color| !color.is_empty())
            .unwrap_or(DEFAULT_NOTE_COLOR);
        Self {
            title: &draft.title,
            content: &draft.content,
            color,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NotesEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    notes: Option<Vec<Note>>,
    #[serde(default)]
    error: Option<String>,
}

impl NotesEnvelope {
    fn into_notes(self) -> GatewayResult<Vec<Note>> {
        if !self.success {
            return Err(unsuccessful(self.error));
        }
        self.notes.ok_or_else(|| {
            GatewayError::InvalidPayload("response did not include notes".to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct NoteEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    note: Option<Note>,
    #[serde(default)]
    error: Option<String>,
}

impl NoteEnvelope {
    fn into_note(self) -> GatewayResult<Note> {
        if !self.success {
            return Err(unsuccessful(self.error));
        }
        self.note.ok_or_else(|| {
            GatewayError::InvalidPayload("response did not include note".to_string())
        })
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl StatusEnvelope {
    fn ensure_success(self) -> GatewayResult<()> {
        if self.success {
            Ok(())
        } else {
            Err(unsuccessful(self.error))
        }
    }
}

const fn default_success() -> bool {
    true
}

fn unsuccessful(error: Option<String>) -> GatewayError {
    GatewayError::InvalidPayload(
        error.unwrap_or_else(|| "server reported success=false".to_string()),
    )
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}

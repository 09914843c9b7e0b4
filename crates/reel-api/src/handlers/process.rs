//! `POST /api/ugc/process-video`.

use std::path::Path;

use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use reel_models::{Anchor, CompositionRequest, ContentKind, InputSpec};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Text fields accepted in multipart, urlencoded and JSON bodies.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoFields {
    #[serde(alias = "cloudinaryVideoUrl")]
    pub video_url: Option<String>,
    #[serde(alias = "cloudinaryAudioUrl")]
    pub audio_url: Option<String>,
    pub demo_video_url: Option<String>,
    pub hook_text: Option<String>,
    pub hook_position: Option<String>,
}

/// A file part of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content: Vec<u8>,
    /// Extension taken from the client file name, if any
    pub extension: Option<String>,
}

impl UploadedFile {
    fn into_input(self, kind: ContentKind) -> InputSpec {
        let extension = self.extension.unwrap_or_else(|| kind.default_extension().to_string());
        InputSpec::inline(self.content, &extension)
    }
}

/// Everything the endpoint accepts, before validation.
#[derive(Debug, Default)]
pub struct ProcessVideoForm {
    pub fields: ProcessVideoFields,
    pub uploaded_video: Option<UploadedFile>,
    pub uploaded_audio: Option<UploadedFile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoResponse {
    pub status: &'static str,
    pub video_url: String,
}

/// Compose a video from the submitted inputs and return its hosted URL.
pub async fn process_video(
    State(state): State<AppState>,
    form: ProcessVideoForm,
) -> ApiResult<Json<ProcessVideoResponse>> {
    let request = form.into_composition_request()?;
    let video = state.composer.compose(request).await?;

    info!(job_id = %video.job_id, stages = video.stages, "Video processed");

    Ok(Json(ProcessVideoResponse {
        status: "success",
        video_url: video.url,
    }))
}

impl ProcessVideoForm {
    /// Build the pipeline request. Uploaded files win over URLs for the
    /// same slot; empty strings count as absent.
    pub fn into_composition_request(self) -> ApiResult<CompositionRequest> {
        let fields = self.fields;

        let primary = match self.uploaded_video {
            Some(file) => Some(file.into_input(ContentKind::Video)),
            None => remote_input(fields.video_url.as_deref(), ContentKind::Video)?,
        };
        let audio = match self.uploaded_audio {
            Some(file) => Some(file.into_input(ContentKind::Audio)),
            None => remote_input(fields.audio_url.as_deref(), ContentKind::Audio)?,
        };
        let secondary = remote_input(fields.demo_video_url.as_deref(), ContentKind::Video)?;

        Ok(CompositionRequest {
            primary,
            audio,
            secondary,
            caption_text: non_empty(fields.hook_text.as_deref()).map(str::to_string),
            anchor: Anchor::parse_or_default(non_empty(fields.hook_position.as_deref())),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn remote_input(url: Option<&str>, kind: ContentKind) -> ApiResult<Option<InputSpec>> {
    non_empty(url)
        .map(|url| InputSpec::remote(url, kind.default_extension()))
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))
}

fn extension_of(file_name: Option<&str>) -> Option<String> {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(str::to_string)
}

#[axum::async_trait]
impl<S> FromRequest<S> for ProcessVideoForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            read_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(fields) = Json::<ProcessVideoFields>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Ok(Self {
                fields,
                ..Default::default()
            })
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<ProcessVideoFields>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            Ok(Self {
                fields,
                ..Default::default()
            })
        } else {
            // No recognisable body; validation reports the missing video
            Ok(Self::default())
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> ApiResult<ProcessVideoForm> {
    let mut form = ProcessVideoForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let extension = extension_of(field.file_name());

        match name.as_str() {
            "uploadedVideo" | "uploadedAudio" => {
                let content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?
                    .to_vec();
                if content.is_empty() {
                    continue;
                }
                let file = UploadedFile { content, extension };
                if name == "uploadedVideo" {
                    form.uploaded_video = Some(file);
                } else {
                    form.uploaded_audio = Some(file);
                }
            }
            "videoUrl" | "cloudinaryVideoUrl" | "audioUrl" | "cloudinaryAudioUrl" | "demoVideoUrl"
            | "hookText" | "hookPosition" => {
                let value = field.text().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
                let slot = match name.as_str() {
                    "videoUrl" | "cloudinaryVideoUrl" => &mut form.fields.video_url,
                    "audioUrl" | "cloudinaryAudioUrl" => &mut form.fields.audio_url,
                    "demoVideoUrl" => &mut form.fields.demo_video_url,
                    "hookText" => &mut form.fields.hook_text,
                    _ => &mut form.fields.hook_position,
                };
                *slot = Some(value);
            }
            _ => {}
        }
    }

    Ok(form)
}

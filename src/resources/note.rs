//! Notes: the demo resource served by the binary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::SharedCache;
use crate::crud::{ControllerOptions, Repository, ResourceController, ResourceHooks, Service};
use crate::engine::{EngineClient, ModelDelegate, Resource};
use crate::error::{AppError, AppResult};

const MAX_TITLE_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNote {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateNote {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Set only by soft delete, never accepted from a request body
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<String>,
}

impl Resource for Note {
    type Create = CreateNote;
    type Update = UpdateNote;
    const NAME: &'static str = "notes";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn soft_delete_patch() -> Option<UpdateNote> {
        Some(UpdateNote {
            deleted_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            ..UpdateNote::default()
        })
    }
}

// == Hooks ==
/// Trims titles and rejects blank or oversized ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoteHooks;

fn clean_title(title: &str) -> AppResult<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("title", "title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::validation(
            "title",
            format!("title must be at most {} characters", MAX_TITLE_LEN),
        ));
    }
    Ok(title.to_string())
}

#[async_trait]
impl ResourceHooks<Note> for NoteHooks {
    async fn before_create(&self, mut data: CreateNote) -> AppResult<CreateNote> {
        data.title = clean_title(&data.title)?;
        Ok(data)
    }

    async fn before_update(&self, _id: &str, mut data: UpdateNote) -> AppResult<UpdateNote> {
        if let Some(title) = data.title.as_deref() {
            data.title = Some(clean_title(title)?);
        }
        Ok(data)
    }
}

/// Wires the notes pipeline: repository, service with [`NoteHooks`] and a
/// caching controller.
pub fn notes_controller<C, M>(
    client: Arc<C>,
    model: M,
    cache: SharedCache,
    cache_ttl: u64,
) -> ResourceController<Note>
where
    C: EngineClient,
    M: ModelDelegate<Note, C> + 'static,
{
    let service = Service::with_hooks(Repository::new(client, model), NoteHooks);
    ResourceController::with_options(
        Arc::new(service),
        cache,
        ControllerOptions {
            cache_ttl,
            ..ControllerOptions::default()
        },
    )
}

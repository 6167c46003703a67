use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::{accessible_thread, require};
use crate::auth::Viewer;
use crate::db::{self, ForumPoll, ForumPollChoice, PollUpdate};
use crate::permissions::ForumPermission;
use crate::web::validate;
use crate::web::views::{self, PollView};
use crate::web::{ok, ApiError, ApiResult, AppState};

const MAX_QUESTION_LENGTH: usize = 1024;
const MAX_CHOICE_LENGTH: usize = 255;

async fn load_poll(state: &AppState, id: i64) -> Result<ForumPoll, ApiError> {
    db::get_poll(state.db.pool(), id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("ForumPoll {id} does not exist.")))
}

fn validate_choice(choice: &str) -> Result<(), ApiError> {
    validate::non_empty("choice", choice)?;
    validate::max_length("choice", choice, MAX_CHOICE_LENGTH)
}

/// Validate new choice names and reject any name given twice.
fn validate_new_choices(choices: &[String]) -> Result<(), ApiError> {
    let mut seen = HashSet::new();
    for choice in choices {
        validate_choice(choice)?;
        if !seen.insert(choice.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Poll choice {choice} is listed more than once."
            )));
        }
    }
    Ok(())
}

/// A missing thread hides its poll; other failures propagate.
fn hidden_as_forbidden(err: ApiError) -> ApiError {
    match err {
        ApiError::NotFound(_) => ApiError::Forbidden,
        other => other,
    }
}

pub async fn view_poll(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> ApiResult<PollView> {
    require(&viewer, ForumPermission::View)?;
    let poll = load_poll(&state, id).await?;
    let ctx = state.view(&viewer);
    accessible_thread(ctx, poll.thread_id, false)
        .await
        .map_err(hidden_as_forbidden)?;
    ok(views::poll_view(ctx, poll).await?)
}

#[derive(Debug, Deserialize)]
pub struct CreatePoll {
    thread_id: i64,
    question: String,
    #[serde(default)]
    choices: Vec<String>,
}

pub async fn create_poll(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(body): Json<CreatePoll>,
) -> ApiResult<PollView> {
    require(&viewer, ForumPermission::ModifyPolls)?;
    validate::non_empty("question", &body.question)?;
    validate::max_length("question", &body.question, MAX_QUESTION_LENGTH)?;
    validate_new_choices(&body.choices)?;

    let pool = state.db.pool();
    if db::get_thread(pool, body.thread_id, false).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Invalid ForumThread id {}.",
            body.thread_id
        )));
    }
    if db::get_poll_by_thread(pool, body.thread_id).await?.is_some() {
        return Err(ApiError::bad_request(format!(
            "ForumThread {} already has a poll.",
            body.thread_id
        )));
    }

    let poll_id = db::insert_poll(pool, body.thread_id, &body.question, &body.choices).await?;
    info!(poll_id, thread_id = body.thread_id, "Poll created");

    let poll = load_poll(&state, poll_id).await?;
    ok(views::poll_view(state.view(&viewer), poll).await?)
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoiceChanges {
    #[serde(default)]
    add: Vec<String>,
    #[serde(default)]
    delete: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EditPoll {
    closed: Option<bool>,
    featured: Option<bool>,
    choices: Option<ChoiceChanges>,
}

/// Describe the requested choice changes that cannot be applied.
///
/// Choices to add must not already exist; choices to delete must belong to
/// the poll.
fn choice_change_errors(existing: &[ForumPollChoice], changes: &ChoiceChanges) -> Option<String> {
    let names: HashSet<&str> = existing.iter().map(|c| c.choice.as_str()).collect();
    let ids: HashSet<i64> = existing.iter().map(|c| c.id).collect();

    let mut bad_adds: Vec<&str> = Vec::new();
    for choice in &changes.add {
        if names.contains(choice.as_str()) && !bad_adds.contains(&choice.as_str()) {
            bad_adds.push(choice.as_str());
        }
    }
    let mut bad_deletes: Vec<i64> = Vec::new();
    for id in &changes.delete {
        if !ids.contains(id) && !bad_deletes.contains(id) {
            bad_deletes.push(*id);
        }
    }

    let mut messages = Vec::new();
    if !bad_adds.is_empty() {
        messages.push(format!(
            "The following poll choices could not be added: {}.",
            bad_adds.join(", ")
        ));
    }
    if !bad_deletes.is_empty() {
        let ids: Vec<String> = bad_deletes.iter().map(ToString::to_string).collect();
        messages.push(format!(
            "The following poll choices could not be deleted: {}.",
            ids.join(", ")
        ));
    }
    (!messages.is_empty()).then(|| messages.join(" "))
}

pub async fn edit_poll(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
    Json(body): Json<EditPoll>,
) -> ApiResult<PollView> {
    require(&viewer, ForumPermission::ModifyPolls)?;
    let poll = load_poll(&state, id).await?;
    let pool = state.db.pool();

    let changes = body.choices.unwrap_or_default();
    validate_new_choices(&changes.add)?;
    let existing = db::get_poll_choices(pool, poll.id).await?;
    if let Some(message) = choice_change_errors(&existing, &changes) {
        return Err(ApiError::BadRequest(message));
    }

    db::update_poll(
        pool,
        poll.id,
        &PollUpdate {
            featured: body.featured,
            closed: body.closed,
            add_choices: changes.add,
            delete_choices: changes.delete,
        },
    )
    .await?;
    info!(poll_id = id, "Poll edited");

    let poll = load_poll(&state, id).await?;
    ok(views::poll_view(state.view(&viewer), poll).await?)
}

pub async fn vote_on_poll(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(choice_id): Path<i64>,
) -> ApiResult<String> {
    require(&viewer, ForumPermission::VotePolls)?;
    let pool = state.db.pool();
    let choice = db::get_poll_choice(pool, choice_id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("ForumPollChoice {choice_id} does not exist."))
        })?;
    let poll = load_poll(&state, choice.poll_id).await?;
    accessible_thread(state.view(&viewer), poll.thread_id, false)
        .await
        .map_err(hidden_as_forbidden)?;

    if poll.closed {
        return Err(ApiError::bad_request("You cannot vote on a closed poll."));
    }
    if db::get_poll_answer(pool, poll.id, viewer.id()).await?.is_some() {
        return Err(ApiError::bad_request("You have already voted on this poll."));
    }

    db::insert_poll_answer(pool, poll.id, viewer.id(), choice.id).await?;
    info!(poll_id = poll.id, choice_id, user_id = viewer.id(), "Poll vote recorded");
    ok(format!("You have successfully voted for choice {choice_id}."))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(id: i64, text: &str) -> ForumPollChoice {
        ForumPollChoice {
            id,
            poll_id: 1,
            choice: text.to_string(),
            answers: 0,
        }
    }

    #[test]
    fn test_valid_changes() {
        let existing = vec![choice(1, "Yes"), choice(2, "No")];
        let changes = ChoiceChanges {
            add: vec!["Maybe".to_string()],
            delete: vec![2],
        };
        assert_eq!(choice_change_errors(&existing, &changes), None);
    }

    #[test]
    fn test_invalid_changes_message() {
        let existing = vec![choice(1, "Yes"), choice(2, "No")];
        let changes = ChoiceChanges {
            add: vec!["Yes".to_string(), "Other".to_string()],
            delete: vec![7, 1],
        };
        assert_eq!(
            choice_change_errors(&existing, &changes).as_deref(),
            Some(
                "The following poll choices could not be added: Yes. \
                 The following poll choices could not be deleted: 7."
            )
        );
    }

    #[test]
    fn test_repeated_new_choice_is_rejected() {
        let choices = vec!["Maybe".to_string(), "Later".to_string(), "Maybe".to_string()];
        match validate_new_choices(&choices) {
            Err(ApiError::BadRequest(message)) => {
                assert_eq!(message, "Poll choice Maybe is listed more than once.");
            }
            other => panic!("expected a bad request, got {other:?}"),
        }
        assert!(validate_new_choices(&choices[..2]).is_ok());
    }

    #[test]
    fn test_only_missing_threads_hide_polls() {
        assert!(matches!(
            hidden_as_forbidden(ApiError::not_found("ForumThread 3 does not exist.")),
            ApiError::Forbidden
        ));
        assert!(matches!(
            hidden_as_forbidden(ApiError::Internal(anyhow::anyhow!("database is locked"))),
            ApiError::Internal(_)
        ));
    }
}

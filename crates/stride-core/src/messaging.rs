//! Threads, messages and read state, plus the post-commit side effects
//! (realtime fan-out and notification routing) that follow a write.

use crate::error::CoreError;
use crate::notify::{self, CreateNotification};
use crate::{ids, AppState};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use stride_db::{messages, receipts, threads, users, DbPool};
use stride_models::gateway::EVENT_MESSAGE_NEW;
use stride_models::message::{Attachment, Message, MAX_MESSAGE_CONTENT_LEN};
use stride_models::notification::{Category, Channel, Priority};
use stride_models::thread::{
    Participant, ParticipantRole, Thread, ThreadDetail, ThreadListItem, ThreadPage,
};
use stride_models::user::{Identity, UserSummary};

/// Messages returned with a thread detail view.
const THREAD_MESSAGE_WINDOW: i64 = 50;
/// Notification body preview length, in characters.
const PREVIEW_LEN: usize = 140;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateThread {
    pub title: Option<String>,
    pub participant_ids: Vec<i64>,
    pub initial_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessage {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

/// Work that happens after a write has committed. Best-effort by contract:
/// a failed side effect is logged, never bubbled back to the caller.
pub enum SideEffect {
    Realtime {
        user_ids: Vec<i64>,
        event: &'static str,
        payload: serde_json::Value,
    },
    Notify(CreateNotification),
}

pub async fn dispatch_side_effects(state: &AppState, effects: Vec<SideEffect>) {
    for effect in effects {
        match effect {
            SideEffect::Realtime {
                user_ids,
                event,
                payload,
            } => {
                state.event_bus.dispatch_to_users(user_ids, event, payload);
            }
            SideEffect::Notify(input) => {
                if let Err(err) = notify::create(state, input).await {
                    tracing::warn!(error = %err, "notification side effect failed");
                }
            }
        }
    }
}

/// Creates a thread with the actor as owner. The participant set is the
/// dedup union of the actor and the requested ids; every requested id must
/// resolve to a real user. An optional initial message is created in the
/// same transaction as the thread itself.
pub async fn create_thread(
    state: &AppState,
    actor: &Identity,
    input: CreateThread,
) -> Result<Thread, CoreError> {
    let mut others: BTreeSet<i64> = input.participant_ids.iter().copied().collect();
    others.remove(&actor.id);
    if others.is_empty() {
        return Err(CoreError::InvalidArgument(
            "a thread needs at least one other participant".into(),
        ));
    }
    let other_ids: Vec<i64> = others.into_iter().collect();

    let found = users::get_users_by_ids(&state.db, &other_ids).await?;
    if found.len() != other_ids.len() {
        return Err(CoreError::NotFound);
    }

    let seed = match input.initial_message.as_deref() {
        Some(content) => {
            let content = validate_content(content)?;
            Some(threads::SeedMessage {
                id: ids::generate(),
                content: content.to_string(),
                attachments: None,
            })
        }
        None => None,
    };
    let seed_id = seed.as_ref().map(|s| s.id);

    let title = input
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let row = threads::create_thread(
        &state.db,
        ids::generate(),
        title,
        actor.id,
        &other_ids,
        seed,
    )
    .await?;
    let thread = thread_model(&state.db, row).await?;

    let mut effects = Vec::new();
    if let Some(message_id) = seed_id {
        if let Some(message_row) = messages::get_message(&state.db, message_id).await? {
            let message = message_model(message_row, &actor_summary(actor))?;
            effects.push(SideEffect::Realtime {
                user_ids: other_ids.clone(),
                event: EVENT_MESSAGE_NEW,
                payload: json!(message),
            });
            for &user_id in &other_ids {
                effects.push(SideEffect::Notify(message_notification(
                    user_id, actor, &message,
                )));
            }
        }
    }
    dispatch_side_effects(state, effects).await;
    crate::audit(state, actor.id, "thread.create", "thread", Some(thread.id));
    Ok(thread)
}

/// Sends a message into a thread the actor participates in. On commit,
/// every other participant gets a realtime `message:new` and a routed
/// notification in the MESSAGE category.
pub async fn send_message(
    state: &AppState,
    actor: &Identity,
    thread_id: i64,
    input: SendMessage,
) -> Result<Message, CoreError> {
    let content = validate_content(&input.content)?.to_string();

    threads::get_thread(&state.db, thread_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    let participants = threads::get_participants(&state.db, thread_id).await?;
    if !participants.iter().any(|p| p.user_id == actor.id) {
        return Err(CoreError::Forbidden);
    }
    let recipient_ids: Vec<i64> = participants
        .iter()
        .map(|p| p.user_id)
        .filter(|&id| id != actor.id)
        .collect();

    let attachments_json = if input.attachments.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&input.attachments).map_err(|e| {
            CoreError::InvalidArgument(format!("invalid attachments: {e}"))
        })?)
    };

    let row = messages::create_in_thread(
        &state.db,
        ids::generate(),
        thread_id,
        actor.id,
        &content,
        attachments_json.as_deref(),
        &recipient_ids,
    )
    .await?;
    let message = message_model(row, &actor_summary(actor))?;

    let mut effects = vec![SideEffect::Realtime {
        user_ids: recipient_ids.clone(),
        event: EVENT_MESSAGE_NEW,
        payload: json!(message),
    }];
    for &user_id in &recipient_ids {
        effects.push(SideEffect::Notify(message_notification(
            user_id, actor, &message,
        )));
    }
    dispatch_side_effects(state, effects).await;
    crate::audit(state, actor.id, "message.send", "message", Some(message.id));
    Ok(message)
}

/// Advances the actor's read cursor on a thread, and optionally stamps the
/// receipt for one specific message. The message must belong to the thread.
pub async fn mark_thread_read(
    state: &AppState,
    actor: &Identity,
    thread_id: i64,
    last_message_id: Option<i64>,
) -> Result<(), CoreError> {
    threads::get_thread(&state.db, thread_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !threads::is_participant(&state.db, thread_id, actor.id).await? {
        return Err(CoreError::Forbidden);
    }

    // Validate the message before the cursor moves; an invalid id must
    // leave no trace.
    if let Some(message_id) = last_message_id {
        let message = messages::get_message(&state.db, message_id)
            .await?
            .ok_or(CoreError::NotFound)?;
        if message.thread_id != thread_id {
            return Err(CoreError::NotFound);
        }
    }

    let now = Utc::now();
    threads::set_last_read(&state.db, thread_id, actor.id, now).await?;
    if let Some(message_id) = last_message_id {
        // The sender has no receipt; zero rows affected is fine.
        receipts::mark_read(&state.db, message_id, actor.id, now).await?;
    }
    Ok(())
}

/// The actor's inbox: threads ordered by newest activity, each annotated
/// with its latest message and an unread flag derived from the actor's
/// read cursor.
pub async fn list_threads(
    state: &AppState,
    actor: &Identity,
    query: ThreadQuery,
) -> Result<ThreadPage, CoreError> {
    let (page, per_page, offset) = crate::page_window(query.page, query.per_page);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let total = threads::count_for_user(&state.db, actor.id, search).await?;
    let rows = threads::list_for_user(&state.db, actor.id, search, per_page as i64, offset).await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let thread = thread_model(&state.db, row).await?;
        let last_message = match messages::latest_for_thread(&state.db, thread.id).await? {
            Some(message_row) => {
                let users_by_id =
                    summaries(users::get_users_by_ids(&state.db, &[message_row.sender_id]).await?);
                Some(message_model(message_row, &users_by_id)?)
            }
            None => None,
        };
        let last_read_at = thread
            .participants
            .iter()
            .find(|p| p.user.id == actor.id)
            .and_then(|p| p.last_read_at);
        let unread = match (thread.last_message_at, last_read_at) {
            (Some(_), None) => true,
            (Some(last), Some(read)) => read < last,
            (None, _) => false,
        };
        items.push(ThreadListItem {
            thread,
            last_message,
            unread,
        });
    }

    Ok(ThreadPage {
        items,
        total,
        page,
        per_page,
    })
}

/// Full thread view with the most recent messages in chronological order.
pub async fn get_thread(
    state: &AppState,
    actor: &Identity,
    thread_id: i64,
) -> Result<ThreadDetail, CoreError> {
    let row = threads::get_thread(&state.db, thread_id)
        .await?
        .ok_or(CoreError::NotFound)?;
    if !threads::is_participant(&state.db, thread_id, actor.id).await? {
        return Err(CoreError::Forbidden);
    }
    let thread = thread_model(&state.db, row).await?;

    let mut message_rows =
        messages::list_recent(&state.db, thread_id, THREAD_MESSAGE_WINDOW).await?;
    message_rows.reverse();
    let sender_ids: Vec<i64> = message_rows
        .iter()
        .map(|m| m.sender_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let users_by_id = summaries(users::get_users_by_ids(&state.db, &sender_ids).await?);
    let messages = message_rows
        .into_iter()
        .map(|m| message_model(m, &users_by_id))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ThreadDetail { thread, messages })
}

fn validate_content(content: &str) -> Result<&str, CoreError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidArgument("message content is empty".into()));
    }
    if trimmed.chars().count() > MAX_MESSAGE_CONTENT_LEN {
        return Err(CoreError::InvalidArgument(format!(
            "message content exceeds {MAX_MESSAGE_CONTENT_LEN} characters"
        )));
    }
    Ok(trimmed)
}

fn message_notification(user_id: i64, sender: &Identity, message: &Message) -> CreateNotification {
    CreateNotification {
        user_id,
        category: Category::Message,
        channel: Channel::InApp,
        priority: Priority::Normal,
        title: format!("New message from {}", sender.name),
        message: preview(&message.content),
        data: Some(json!({
            "thread_id": message.thread_id,
            "message_id": message.id,
        })),
        email: true,
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_LEN {
        content.to_string()
    } else {
        let cut: String = content.chars().take(PREVIEW_LEN).collect();
        format!("{cut}...")
    }
}

fn actor_summary(actor: &Identity) -> HashMap<i64, UserSummary> {
    let mut map = HashMap::new();
    map.insert(
        actor.id,
        UserSummary {
            id: actor.id,
            email: actor.email.clone(),
            name: actor.name.clone(),
        },
    );
    map
}

fn summaries(rows: Vec<users::UserRow>) -> HashMap<i64, UserSummary> {
    rows.into_iter()
        .map(|row| {
            (
                row.id,
                UserSummary {
                    id: row.id,
                    email: row.email,
                    name: row.name,
                },
            )
        })
        .collect()
}

fn parse_attachments(raw: Option<&str>) -> Vec<Attachment> {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

fn message_model(
    row: messages::MessageRow,
    users_by_id: &HashMap<i64, UserSummary>,
) -> Result<Message, CoreError> {
    let sender = users_by_id.get(&row.sender_id).cloned().ok_or_else(|| {
        CoreError::Integrity(format!(
            "message {} references missing sender {}",
            row.id, row.sender_id
        ))
    })?;
    Ok(Message {
        id: row.id,
        thread_id: row.thread_id,
        sender,
        content: row.content,
        attachments: parse_attachments(row.attachments.as_deref()),
        created_at: row.created_at,
    })
}

async fn thread_model(db: &DbPool, row: threads::ThreadRow) -> Result<Thread, CoreError> {
    let participant_rows = threads::get_participants(db, row.id).await?;
    let user_ids: Vec<i64> = participant_rows.iter().map(|p| p.user_id).collect();
    let users_by_id = summaries(users::get_users_by_ids(db, &user_ids).await?);
    let participants = participant_rows
        .into_iter()
        .map(|p| {
            let user = users_by_id.get(&p.user_id).cloned().ok_or_else(|| {
                CoreError::Integrity(format!(
                    "thread {} references missing user {}",
                    p.thread_id, p.user_id
                ))
            })?;
            let role = if p.role == "owner" {
                ParticipantRole::Owner
            } else {
                ParticipantRole::Member
            };
            Ok(Participant {
                user,
                role,
                last_read_at: p.last_read_at,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(Thread {
        id: row.id,
        title: row.title,
        created_at: row.created_at,
        updated_at: row.updated_at,
        last_message_at: row.last_message_at,
        participants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::mailer::{EmailJob, EmailQueue};
    use crate::{AppConfig, AppState};
    use std::sync::Arc;
    use stride_models::gateway::EVENT_NOTIFICATION_NEW;
    use stride_models::user::Role;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn state() -> (AppState, UnboundedReceiver<EmailJob>) {
        let db = stride_db::create_pool("sqlite::memory:", 1).await.expect("pool");
        stride_db::run_migrations(&db).await.expect("migrations");
        let (mailer, rx) = EmailQueue::new();
        let state = AppState {
            db,
            event_bus: EventBus::default(),
            mailer,
            config: Arc::new(AppConfig {
                jwt_secret: "test-secret".into(),
                jwt_expiry_seconds: 3600,
                email_notifications_enabled: true,
            }),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        };
        (state, rx)
    }

    async fn seed_user(state: &AppState, id: i64, name: &str, role: Role) -> Identity {
        let email = format!("{}@example.com", name.to_lowercase());
        let role_name = match role {
            Role::Admin => "admin",
            Role::Trainer => "trainer",
            Role::Client => "client",
        };
        stride_db::users::create_user(&state.db, id, &email, name, &[role_name.into()])
            .await
            .expect("user");
        Identity {
            id,
            email,
            name: name.into(),
            roles: vec![role],
        }
    }

    #[tokio::test]
    async fn create_thread_sets_owner_and_seed_message() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;

        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: Some("Check-in".into()),
                // The actor in the list is deduped, not duplicated.
                participant_ids: vec![client.id, coach.id, client.id],
                initial_message: Some("Welcome aboard".into()),
            },
        )
        .await
        .expect("thread");

        assert_eq!(thread.participants.len(), 2);
        let owner = thread
            .participants
            .iter()
            .find(|p| p.user.id == coach.id)
            .unwrap();
        assert_eq!(owner.role, ParticipantRole::Owner);
        assert!(owner.last_read_at.is_some());
        let member = thread
            .participants
            .iter()
            .find(|p| p.user.id == client.id)
            .unwrap();
        assert_eq!(member.role, ParticipantRole::Member);
        assert!(member.last_read_at.is_none());
        assert!(thread.last_message_at.is_some());

        // The seed message left the client with an unread receipt.
        let unread = stride_db::receipts::unread_count_for_user(&state.db, client.id)
            .await
            .expect("count");
        assert_eq!(unread, 1);
    }

    #[tokio::test]
    async fn create_thread_rejects_unknown_participants_and_empty_set() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;

        assert!(matches!(
            create_thread(
                &state,
                &coach,
                CreateThread {
                    title: None,
                    participant_ids: vec![999],
                    initial_message: None,
                },
            )
            .await,
            Err(CoreError::NotFound)
        ));

        assert!(matches!(
            create_thread(
                &state,
                &coach,
                CreateThread {
                    title: None,
                    participant_ids: vec![coach.id],
                    initial_message: None,
                },
            )
            .await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn send_message_requires_participation() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let outsider = seed_user(&state, 3, "Other", Role::Client).await;

        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");

        let input = SendMessage {
            content: "hello".into(),
            attachments: Vec::new(),
        };
        assert!(matches!(
            send_message(&state, &outsider, thread.id, input.clone()).await,
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(
            send_message(&state, &outsider, 999, input).await,
            Err(CoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn send_message_validates_content() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");

        for content in ["   ", &"x".repeat(MAX_MESSAGE_CONTENT_LEN + 1)] {
            assert!(matches!(
                send_message(
                    &state,
                    &coach,
                    thread.id,
                    SendMessage {
                        content: content.to_string(),
                        attachments: Vec::new(),
                    },
                )
                .await,
                Err(CoreError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn send_message_writes_receipts_and_stamps_sender() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");

        let message = send_message(
            &state,
            &client,
            thread.id,
            SendMessage {
                content: "  trimmed  ".into(),
                attachments: vec![Attachment {
                    url: "https://cdn.example.com/plan.pdf".into(),
                    name: "plan.pdf".into(),
                }],
            },
        )
        .await
        .expect("message");
        assert_eq!(message.content, "trimmed");
        assert_eq!(message.attachments.len(), 1);

        // Recipient got an unread receipt, the sender none.
        let receipt = stride_db::receipts::get_receipt(&state.db, message.id, coach.id)
            .await
            .expect("receipt")
            .expect("exists");
        assert!(receipt.read_at.is_none());
        assert!(stride_db::receipts::get_receipt(&state.db, message.id, client.id)
            .await
            .expect("receipt")
            .is_none());

        // Sending implies the sender has read the thread.
        let sender = stride_db::threads::get_participant(&state.db, thread.id, client.id)
            .await
            .expect("participant")
            .expect("exists");
        assert!(sender.last_read_at.is_some());
    }

    #[tokio::test]
    async fn send_message_fans_out_realtime_and_notification() {
        let (state, mut mail_rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");
        let mut events = state.event_bus.subscribe();

        send_message(
            &state,
            &coach,
            thread.id,
            SendMessage {
                content: "time to train".into(),
                attachments: Vec::new(),
            },
        )
        .await
        .expect("message");

        let first = events.recv().await.expect("event");
        assert_eq!(first.event, EVENT_MESSAGE_NEW);
        assert!(first.is_for(client.id));
        assert!(!first.is_for(coach.id));

        let second = events.recv().await.expect("event");
        assert_eq!(second.event, EVENT_NOTIFICATION_NEW);
        assert!(second.is_for(client.id));

        // Email fallback fired with default preferences.
        let job = mail_rx.recv().await.expect("email");
        assert_eq!(job.to, "client@example.com");
        assert!(job.subject.contains("Coach"));
    }

    #[tokio::test]
    async fn mark_thread_read_clears_unread_state() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: Some("hello".into()),
            },
        )
        .await
        .expect("thread");

        let page = list_threads(&state, &client, ThreadQuery::default())
            .await
            .expect("list");
        assert_eq!(page.total, 1);
        assert!(page.items[0].unread);
        let last_message = page.items[0].last_message.as_ref().expect("last message");

        mark_thread_read(&state, &client, thread.id, Some(last_message.id))
            .await
            .expect("mark read");

        let page = list_threads(&state, &client, ThreadQuery::default())
            .await
            .expect("list");
        assert!(!page.items[0].unread);

        let receipt = stride_db::receipts::get_receipt(&state.db, last_message.id, client.id)
            .await
            .expect("receipt")
            .expect("exists");
        assert!(receipt.read_at.is_some());
    }

    #[tokio::test]
    async fn mark_thread_read_rejects_foreign_messages() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let first = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: Some("one".into()),
            },
        )
        .await
        .expect("thread");
        let second = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");

        let detail = get_thread(&state, &client, first.id).await.expect("detail");
        let foreign_message = detail.messages[0].id;

        assert!(matches!(
            mark_thread_read(&state, &client, second.id, Some(foreign_message)).await,
            Err(CoreError::NotFound)
        ));
        assert!(matches!(
            mark_thread_read(&state, &client, second.id, Some(999_999)).await,
            Err(CoreError::NotFound)
        ));
        // A rejected call leaves the read cursor untouched.
        let participant = stride_db::threads::get_participant(&state.db, second.id, client.id)
            .await
            .expect("participant")
            .expect("exists");
        assert!(participant.last_read_at.is_none());

        assert!(matches!(
            mark_thread_read(&state, &coach, 999, None).await,
            Err(CoreError::NotFound)
        ));

        let outsider = seed_user(&state, 3, "Other", Role::Client).await;
        assert!(matches!(
            mark_thread_read(&state, &outsider, first.id, None).await,
            Err(CoreError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn get_thread_returns_chronological_messages() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;
        let thread = create_thread(
            &state,
            &coach,
            CreateThread {
                title: None,
                participant_ids: vec![client.id],
                initial_message: Some("first".into()),
            },
        )
        .await
        .expect("thread");
        send_message(
            &state,
            &client,
            thread.id,
            SendMessage {
                content: "second".into(),
                attachments: Vec::new(),
            },
        )
        .await
        .expect("message");

        let detail = get_thread(&state, &coach, thread.id).await.expect("detail");
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].content, "first");
        assert_eq!(detail.messages[1].content, "second");
        assert_eq!(detail.messages[1].sender.id, client.id);

        let outsider = seed_user(&state, 3, "Other", Role::Client).await;
        assert!(matches!(
            get_thread(&state, &outsider, thread.id).await,
            Err(CoreError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn list_threads_orders_by_activity_and_searches_titles() {
        let (state, _rx) = state().await;
        let coach = seed_user(&state, 1, "Coach", Role::Trainer).await;
        let client = seed_user(&state, 2, "Client", Role::Client).await;

        let quiet = create_thread(
            &state,
            &coach,
            CreateThread {
                title: Some("Nutrition plan".into()),
                participant_ids: vec![client.id],
                initial_message: None,
            },
        )
        .await
        .expect("thread");
        let active = create_thread(
            &state,
            &coach,
            CreateThread {
                title: Some("Weekly check-in".into()),
                participant_ids: vec![client.id],
                initial_message: Some("how did it go?".into()),
            },
        )
        .await
        .expect("thread");

        let page = list_threads(&state, &coach, ThreadQuery::default())
            .await
            .expect("list");
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].thread.id, active.id);
        assert_eq!(page.items[1].thread.id, quiet.id);
        assert!(page.items[1].last_message.is_none());

        let page = list_threads(
            &state,
            &coach,
            ThreadQuery {
                search: Some("nutrition".into()),
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].thread.id, quiet.id);
    }

    #[test]
    fn preview_truncates_long_content() {
        let short = preview("hello");
        assert_eq!(short, "hello");
        let long = preview(&"y".repeat(300));
        assert_eq!(long.chars().count(), PREVIEW_LEN + 3);
        assert!(long.ends_with("..."));
    }
}

//! Notification routing: persistence, category gating, the email fallback
//! decision and realtime emission.

use crate::error::CoreError;
use crate::mailer::EmailJob;
use crate::{ids, AppState};
use serde::Deserialize;
use serde_json::json;
use stride_db::{notifications, preferences, users};
use stride_models::gateway::EVENT_NOTIFICATION_NEW;
use stride_models::notification::{
    Category, Channel, DeliverySummary, EmailDelivery, EmailStatus, Notification,
    NotificationPage, Preference, PreferenceUpdate, Priority,
};
use stride_models::user::Identity;

#[derive(Debug, Clone)]
pub struct CreateNotification {
    pub user_id: i64,
    pub category: Category,
    pub channel: Channel,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    /// Whether the email fallback is requested for this notification.
    pub email: bool,
}

/// Creates a notification for a user. The row is always persisted; the
/// user's category filter only gates delivery (realtime emit and email
/// fallback). The email decision is ordered: request flag, then the global
/// toggle, then the user preference, then the recipient lookup.
pub async fn create(
    state: &AppState,
    input: CreateNotification,
) -> Result<(Notification, DeliverySummary), CoreError> {
    let title = input.title.trim();
    let message = input.message.trim();
    if title.is_empty() || message.is_empty() {
        return Err(CoreError::InvalidArgument(
            "notification title and message are required".into(),
        ));
    }

    let pref = preference_model(preferences::get_or_create_default(&state.db, input.user_id).await?);
    let filter = pref.category_filter();

    let data_json = match &input.data {
        Some(value) => Some(serde_json::to_string(value).map_err(|e| {
            CoreError::InvalidArgument(format!("invalid notification data: {e}"))
        })?),
        None => None,
    };

    let row = notifications::create(
        &state.db,
        ids::generate(),
        input.user_id,
        input.category.as_str(),
        input.channel.as_str(),
        input.priority.as_str(),
        title,
        message,
        data_json.as_deref(),
    )
    .await?;
    let notification = notification_model(row)?;

    if !filter.allows(input.category) {
        let delivery = delivery_summary(&input, state, &pref, EmailStatus::NotRequested);
        return Ok((notification, delivery));
    }

    let status = if !input.email {
        EmailStatus::NotRequested
    } else if !state.config.email_notifications_enabled {
        EmailStatus::Disabled
    } else if !pref.email_enabled {
        EmailStatus::PreferenceDisabled
    } else {
        let user = users::get_user_by_id(&state.db, input.user_id)
            .await?
            .ok_or_else(|| {
                CoreError::Integrity(format!(
                    "notification {} references missing user {}",
                    notification.id, input.user_id
                ))
            })?;
        state.mailer.enqueue(EmailJob {
            to: user.email,
            to_name: user.name,
            subject: title.to_string(),
            body: message.to_string(),
        });
        EmailStatus::Dispatched
    };

    let delivery = delivery_summary(&input, state, &pref, status);
    state.event_bus.dispatch_to_user(
        input.user_id,
        EVENT_NOTIFICATION_NEW,
        json!({ "notification": notification, "delivery": delivery }),
    );
    Ok((notification, delivery))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Category>,
    #[serde(default)]
    pub unread_only: bool,
    pub search: Option<String>,
}

pub async fn list(
    state: &AppState,
    actor: &Identity,
    query: NotificationQuery,
) -> Result<NotificationPage, CoreError> {
    let (page, per_page, offset) = crate::page_window(query.page, query.per_page);
    let category = query.category.map(Category::as_str);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let total =
        notifications::count(&state.db, actor.id, category, query.unread_only, search).await?;
    let unread = notifications::unread_count(&state.db, actor.id).await?;
    let rows = notifications::list(
        &state.db,
        actor.id,
        category,
        query.unread_only,
        search,
        per_page as i64,
        offset,
    )
    .await?;
    let items = rows
        .into_iter()
        .map(notification_model)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NotificationPage {
        items,
        total,
        unread,
        page,
        per_page,
    })
}

/// Sets or clears the read marker on the given notifications. Only rows
/// owned by the actor are touched; an empty id list is a no-op.
pub async fn mark_read(
    state: &AppState,
    actor: &Identity,
    notification_ids: &[i64],
    read: bool,
) -> Result<u64, CoreError> {
    if notification_ids.is_empty() {
        return Ok(0);
    }
    let updated = notifications::mark_read(&state.db, actor.id, notification_ids, read).await?;
    if updated > 0 {
        crate::audit(state, actor.id, "notification.read", "notification", None);
    }
    Ok(updated)
}

pub async fn delete(
    state: &AppState,
    actor: &Identity,
    notification_ids: &[i64],
) -> Result<u64, CoreError> {
    if notification_ids.is_empty() {
        return Err(CoreError::InvalidArgument(
            "no notification ids given".into(),
        ));
    }
    let deleted = notifications::delete_many(&state.db, actor.id, notification_ids).await?;
    crate::audit(state, actor.id, "notification.delete", "notification", None);
    Ok(deleted)
}

pub async fn get_preferences(state: &AppState, actor: &Identity) -> Result<Preference, CoreError> {
    let row = preferences::get_or_create_default(&state.db, actor.id).await?;
    Ok(preference_model(row))
}

/// Applies a partial update over the stored (or default) preference row.
pub async fn update_preferences(
    state: &AppState,
    actor: &Identity,
    update: PreferenceUpdate,
) -> Result<Preference, CoreError> {
    let current = preference_model(preferences::get_or_create_default(&state.db, actor.id).await?);

    let quiet_hours_start = match update.quiet_hours_start {
        Some(value) => value,
        None => current.quiet_hours_start,
    };
    let quiet_hours_end = match update.quiet_hours_end {
        Some(value) => value,
        None => current.quiet_hours_end,
    };
    for hour in [&quiet_hours_start, &quiet_hours_end].into_iter().flatten() {
        if !valid_quiet_hour(hour) {
            return Err(CoreError::InvalidArgument(format!(
                "invalid quiet hours time '{hour}', expected HH:MM"
            )));
        }
    }

    let categories = update.categories.unwrap_or(current.categories);
    let categories_json = serde_json::to_string(&categories)
        .map_err(|e| CoreError::InvalidArgument(format!("invalid categories: {e}")))?;

    let row = preferences::upsert(
        &state.db,
        actor.id,
        update.email_enabled.unwrap_or(current.email_enabled),
        update.sms_enabled.unwrap_or(current.sms_enabled),
        update.push_enabled.unwrap_or(current.push_enabled),
        quiet_hours_start.as_deref(),
        quiet_hours_end.as_deref(),
        &categories_json,
    )
    .await?;
    crate::audit(
        state,
        actor.id,
        "preferences.update",
        "notification_preferences",
        Some(actor.id),
    );
    Ok(preference_model(row))
}

fn valid_quiet_hour(value: &str) -> bool {
    let mut parts = value.splitn(2, ':');
    let hour = parts.next().and_then(|h| h.parse::<u8>().ok());
    let minute = parts.next().and_then(|m| m.parse::<u8>().ok());
    matches!((hour, minute), (Some(h), Some(m)) if h < 24 && m < 60)
}

fn delivery_summary(
    input: &CreateNotification,
    state: &AppState,
    pref: &Preference,
    status: EmailStatus,
) -> DeliverySummary {
    DeliverySummary {
        email: EmailDelivery {
            requested: input.email,
            enabled: state.config.email_notifications_enabled,
            preference_enabled: pref.email_enabled,
            dispatched: matches!(status, EmailStatus::Dispatched),
            status,
        },
    }
}

fn notification_model(row: notifications::NotificationRow) -> Result<Notification, CoreError> {
    let category = row
        .category
        .parse()
        .map_err(|_| CoreError::Integrity(format!("unknown notification category '{}'", row.category)))?;
    let channel = row
        .channel
        .parse()
        .map_err(|_| CoreError::Integrity(format!("unknown notification channel '{}'", row.channel)))?;
    let priority = row
        .priority
        .parse()
        .map_err(|_| CoreError::Integrity(format!("unknown notification priority '{}'", row.priority)))?;
    let data = match row.data {
        Some(raw) => Some(serde_json::from_str(&raw).map_err(|e| {
            CoreError::Integrity(format!("notification {} has invalid data: {e}", row.id))
        })?),
        None => None,
    };
    Ok(Notification {
        id: row.id,
        user_id: row.user_id,
        category,
        channel,
        priority,
        title: row.title,
        message: row.message,
        data,
        read_at: row.read_at,
        delivered_at: row.delivered_at,
        created_at: row.created_at,
    })
}

fn preference_model(row: preferences::PreferenceRow) -> Preference {
    Preference {
        user_id: row.user_id,
        email_enabled: row.email_enabled,
        sms_enabled: row.sms_enabled,
        push_enabled: row.push_enabled,
        quiet_hours_start: row.quiet_hours_start,
        quiet_hours_end: row.quiet_hours_end,
        categories: serde_json::from_str(&row.categories).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::mailer::EmailQueue;
    use crate::{AppConfig, AppState};
    use std::sync::Arc;
    use stride_models::user::Role;
    use tokio::sync::mpsc::UnboundedReceiver;

    async fn state_with(email_enabled: bool) -> (AppState, UnboundedReceiver<EmailJob>) {
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
                email_notifications_enabled: email_enabled,
            }),
            shutdown: Arc::new(tokio::sync::Notify::new()),
        };
        (state, rx)
    }

    async fn seed_user(state: &AppState, id: i64, name: &str) -> Identity {
        let email = format!("{}@example.com", name.to_lowercase());
        stride_db::users::create_user(&state.db, id, &email, name, &["client".into()])
            .await
            .expect("user");
        Identity {
            id,
            email,
            name: name.into(),
            roles: vec![Role::Client],
        }
    }

    fn message_notification(user_id: i64) -> CreateNotification {
        CreateNotification {
            user_id,
            category: Category::Message,
            channel: Channel::InApp,
            priority: Priority::Normal,
            title: "New message".into(),
            message: "You have a new message".into(),
            data: None,
            email: true,
        }
    }

    #[tokio::test]
    async fn create_dispatches_email_by_default() {
        let (state, mut rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;

        let (notification, delivery) = create(&state, message_notification(user.id))
            .await
            .expect("create");
        assert_eq!(notification.user_id, user.id);
        assert_eq!(delivery.email.status, EmailStatus::Dispatched);
        assert!(delivery.email.dispatched);

        let job = rx.recv().await.expect("email job");
        assert_eq!(job.to, "ada@example.com");
        assert_eq!(job.subject, "New message");
    }

    #[tokio::test]
    async fn create_emits_realtime_event_to_the_recipient() {
        let (state, _rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;
        let mut events = state.event_bus.subscribe();

        create(&state, message_notification(user.id)).await.expect("create");

        let event = events.recv().await.expect("event");
        assert_eq!(event.event, EVENT_NOTIFICATION_NEW);
        assert!(event.is_for(user.id));
        assert!(!event.is_for(99));
        assert!(event.payload.get("notification").is_some());
        assert!(event.payload.get("delivery").is_some());
    }

    #[tokio::test]
    async fn global_toggle_beats_user_preference() {
        let (state, mut rx) = state_with(false).await;
        let user = seed_user(&state, 1, "Ada").await;

        let (_, delivery) = create(&state, message_notification(user.id))
            .await
            .expect("create");
        assert_eq!(delivery.email.status, EmailStatus::Disabled);
        assert!(!delivery.email.dispatched);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn user_preference_disables_email() {
        let (state, mut rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;
        update_preferences(
            &state,
            &user,
            PreferenceUpdate {
                email_enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .expect("prefs");

        let (_, delivery) = create(&state, message_notification(user.id))
            .await
            .expect("create");
        assert_eq!(delivery.email.status, EmailStatus::PreferenceDisabled);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unrequested_email_is_never_sent() {
        let (state, mut rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;

        let mut input = message_notification(user.id);
        input.email = false;
        let (_, delivery) = create(&state, input).await.expect("create");
        assert_eq!(delivery.email.status, EmailStatus::NotRequested);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn category_filter_gates_delivery_but_not_persistence() {
        let (state, mut rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;
        update_preferences(
            &state,
            &user,
            PreferenceUpdate {
                categories: Some(vec![Category::Workout]),
                ..Default::default()
            },
        )
        .await
        .expect("prefs");
        let mut events = state.event_bus.subscribe();

        let (notification, delivery) = create(&state, message_notification(user.id))
            .await
            .expect("create");
        assert_eq!(delivery.email.status, EmailStatus::NotRequested);
        assert!(rx.try_recv().is_err());
        assert!(events.try_recv().is_err());

        // Persisted regardless, visible in the user's list.
        let page = list(&state, &user, NotificationQuery::default())
            .await
            .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, notification.id);
    }

    #[tokio::test]
    async fn create_rejects_blank_title_or_message() {
        let (state, _rx) = state_with(true).await;
        let user = seed_user(&state, 1, "Ada").await;

        let mut input = message_notification(user.id);
        input.title = "   ".into();
        assert!(matches!(
            create(&state, input).await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn mark_read_only_touches_own_notifications() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;
        let ben = seed_user(&state, 2, "Ben").await;

        let (notification, _) = create(&state, message_notification(ada.id))
            .await
            .expect("create");

        let touched = mark_read(&state, &ben, &[notification.id], true)
            .await
            .expect("mark");
        assert_eq!(touched, 0);

        let touched = mark_read(&state, &ada, &[notification.id], true)
            .await
            .expect("mark");
        assert_eq!(touched, 1);

        let page = list(&state, &ada, NotificationQuery::default())
            .await
            .expect("list");
        assert!(page.items[0].read_at.is_some());
        assert_eq!(page.unread, 0);

        // Clearing the marker works the same way.
        let touched = mark_read(&state, &ada, &[notification.id], false)
            .await
            .expect("unmark");
        assert_eq!(touched, 1);
    }

    #[tokio::test]
    async fn mark_read_with_no_ids_is_a_noop() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;
        assert_eq!(mark_read(&state, &ada, &[], true).await.expect("mark"), 0);
    }

    #[tokio::test]
    async fn delete_requires_ids_and_scopes_to_owner() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;
        let ben = seed_user(&state, 2, "Ben").await;

        let (notification, _) = create(&state, message_notification(ada.id))
            .await
            .expect("create");

        assert!(matches!(
            delete(&state, &ada, &[]).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert_eq!(delete(&state, &ben, &[notification.id]).await.expect("delete"), 0);
        assert_eq!(delete(&state, &ada, &[notification.id]).await.expect("delete"), 1);
    }

    #[tokio::test]
    async fn list_filters_by_category_and_unread() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;

        let (first, _) = create(&state, message_notification(ada.id))
            .await
            .expect("create");
        let mut workout = message_notification(ada.id);
        workout.category = Category::Workout;
        workout.title = "Workout assigned".into();
        create(&state, workout).await.expect("create");

        mark_read(&state, &ada, &[first.id], true).await.expect("mark");

        let page = list(
            &state,
            &ada,
            NotificationQuery {
                category: Some(Category::Workout),
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].category, Category::Workout);

        let page = list(
            &state,
            &ada,
            NotificationQuery {
                unread_only: true,
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.unread, 1);
    }

    #[tokio::test]
    async fn preferences_merge_partially_and_clear_quiet_hours() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;

        let pref = update_preferences(
            &state,
            &ada,
            PreferenceUpdate {
                quiet_hours_start: Some(Some("22:00".into())),
                quiet_hours_end: Some(Some("07:30".into())),
                ..Default::default()
            },
        )
        .await
        .expect("prefs");
        assert!(pref.email_enabled);
        assert_eq!(pref.quiet_hours_start.as_deref(), Some("22:00"));

        // Explicit null clears; absent fields keep their value.
        let pref = update_preferences(
            &state,
            &ada,
            PreferenceUpdate {
                quiet_hours_start: Some(None),
                sms_enabled: Some(true),
                ..Default::default()
            },
        )
        .await
        .expect("prefs");
        assert_eq!(pref.quiet_hours_start, None);
        assert_eq!(pref.quiet_hours_end.as_deref(), Some("07:30"));
        assert!(pref.sms_enabled);

        assert!(matches!(
            update_preferences(
                &state,
                &ada,
                PreferenceUpdate {
                    quiet_hours_start: Some(Some("25:00".into())),
                    ..Default::default()
                },
            )
            .await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn get_preferences_materializes_defaults() {
        let (state, _rx) = state_with(true).await;
        let ada = seed_user(&state, 1, "Ada").await;

        let pref = get_preferences(&state, &ada).await.expect("prefs");
        assert!(pref.email_enabled);
        assert!(!pref.sms_enabled);
        assert!(pref.push_enabled);
        assert!(pref.categories.is_empty());
        assert!(pref.category_filter().allows(Category::System));
    }
}

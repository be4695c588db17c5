//! Launch props
//!
//! Builds the `exp` prop bag an app receives at launch. Auxiliary state
//! (error recovery, persisted errors, unread notifications) is best-effort:
//! store failures are logged and the launch proceeds without it.

use serde_json::{Map, Value};

use crate::config::HostConfig;
use crate::domain::{ExperienceId, Manifest, Notification, SdkVersion};
use crate::runtime::{LaunchProps, RuntimeDelegate};
use crate::storage::{ErrorRecoveryStore, LAST_ERRORS_KEY, MetadataStore, UNREAD_REMOTE_NOTIFICATIONS_KEY};

/// Origin reported for a notification the user selected to open the app
pub const NOTIFICATION_ORIGIN_SELECTED: &str = "selected";

pub const NOTIFICATION_PROP: &str = "notification";
pub const MANIFEST_PROP: &str = "manifest";
pub const SHELL_PROP: &str = "shell";
pub const INITIAL_URI_PROP: &str = "initialUri";
pub const ERROR_RECOVERY_PROP: &str = "errorRecovery";

/// Per-launch inputs to the prop bag
#[derive(Debug, Clone, Copy)]
pub struct LaunchContext<'a> {
    pub experience_id: &'a ExperienceId,
    pub manifest: &'a Manifest,
    /// Version the runtime is loaded with
    pub sdk_version: &'a SdkVersion,
    pub is_shell_app: bool,
    pub intent_uri: Option<&'a str>,
    pub notification: Option<&'a Notification>,
}

/// Assemble launch props, consuming delivery-once metadata from the stores
pub fn assemble_launch_props(
    config: &HostConfig,
    metadata: &dyn MetadataStore,
    recovery: &dyn ErrorRecoveryStore,
    delegate: &dyn RuntimeDelegate,
    ctx: LaunchContext<'_>,
) -> LaunchProps {
    let mut exp = Map::new();
    let mut top_level_notification = None;

    if let Some(notification) = ctx.notification {
        top_level_notification = Some(notification.body.clone());
        let value = if *ctx.sdk_version < config.notification_threshold {
            Value::String(notification.body.clone())
        } else {
            notification.to_json(NOTIFICATION_ORIGIN_SELECTED)
        };
        exp.insert(NOTIFICATION_PROP.to_string(), value);
    }

    exp.insert(MANIFEST_PROP.to_string(), ctx.manifest.to_value());
    exp.insert(SHELL_PROP.to_string(), Value::Bool(ctx.is_shell_app));
    exp.insert(
        INITIAL_URI_PROP.to_string(),
        ctx.intent_uri.map_or(Value::Null, |uri| Value::String(uri.to_string())),
    );

    match recovery.pop_recovery_props(ctx.experience_id) {
        Ok(Some(props)) => {
            exp.insert(ERROR_RECOVERY_PROP.to_string(), props);
        }
        Ok(None) => {}
        Err(e) => log::warn!("Failed to read error recovery props for {}: {}", ctx.experience_id, e),
    }

    consume_metadata(metadata, delegate, ctx.experience_id, &mut exp);

    LaunchProps {
        exp,
        notification: top_level_notification,
    }
}

fn consume_metadata(
    store: &dyn MetadataStore,
    delegate: &dyn RuntimeDelegate,
    id: &ExperienceId,
    exp: &mut Map<String, Value>,
) {
    let mut metadata = match store.get_metadata(id) {
        Ok(Some(metadata)) => metadata,
        Ok(None) => return,
        Err(e) => {
            log::warn!("Failed to read experience metadata for {}: {}", id, e);
            return;
        }
    };

    if let Some(last_errors) = metadata.remove(LAST_ERRORS_KEY) {
        if last_errors.is_array() {
            exp.insert(LAST_ERRORS_KEY.to_string(), last_errors);
        } else {
            log::warn!("Dropping non-array {} for {}", LAST_ERRORS_KEY, id);
        }
    }

    if let Some(unread) = metadata.remove(UNREAD_REMOTE_NOTIFICATIONS_KEY) {
        match unread {
            Value::Array(items) => {
                delegate.handle_unread_notifications(&items);
                exp.insert(UNREAD_REMOTE_NOTIFICATIONS_KEY.to_string(), Value::Array(items));
            }
            _ => log::warn!("Dropping non-array {} for {}", UNREAD_REMOTE_NOTIFICATIONS_KEY, id),
        }
    }

    if let Err(e) = store.update_metadata(id, metadata) {
        log::warn!("Failed to write back experience metadata for {}: {}", id, e);
    }
}

//! Output formatting for CLI display.

use crate::model::{Event, NotificationMarker, NotificationState, SubMachine};

fn state(state: Option<NotificationState>) -> &'static str {
    state.map_or("-", NotificationState::as_str)
}

fn sub_machine(m: &SubMachine) -> String {
    format!("{}/{}", state(m.observed), state(m.notified))
}

/// One line per marker: key, current and notified state, then the
/// observed/notified pair of each sub-machine.
pub(super) fn format_marker(marker: &NotificationMarker) -> String {
    format!(
        "{}  current={} notified={}  phase={} health={}  v{}  {}",
        marker.key,
        state(marker.current_state),
        state(marker.last_notified_state),
        sub_machine(&marker.phase),
        sub_machine(&marker.health),
        marker.resource_version,
        marker.updated_at,
    )
}

pub(super) fn format_event(event: &Event) -> String {
    let mut line = format!(
        "{}  {}  {:<7}  {}  {}",
        event.recorded_at, event.key, event.event_type, event.reason, event.message
    );
    if let Some(id) = &event.notification_id {
        line.push_str(&format!("  [{}]", &id.as_str()[..id.as_str().len().min(12)]));
    }
    line
}

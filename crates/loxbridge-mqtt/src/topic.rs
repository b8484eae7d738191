//! Topic layout on the bus.
//!
//! | Message | Topic                                       | Payload |
//! |---------|---------------------------------------------|---------|
//! | Status  | `status/{system}/{room}/{device}/{feature}` | value   |
//! | Action  | `action/{system}/{room}/{device}/{feature}` | action  |

use loxbridge_core::{ActionMessage, StatusMessage};

pub const STATUS_ROOT: &str = "status";
pub const ACTION_ROOT: &str = "action";

pub fn status_topic(message: &StatusMessage) -> String {
    format!("{}/{}", STATUS_ROOT, message.path())
}

pub fn action_topic(message: &ActionMessage) -> String {
    format!("{}/{}", ACTION_ROOT, message.path())
}

/// Subscription filter for actions addressed to `prefix`.
pub fn action_filter(prefix: &str) -> String {
    format!("{}/{}/+/+/+", ACTION_ROOT, prefix)
}

/// Build an action from an inbound publish, if the topic is an action topic.
pub fn parse_action_topic(topic: &str, payload: &[u8]) -> Option<ActionMessage> {
    let mut parts = topic.split('/');
    if parts.next()? != ACTION_ROOT {
        return None;
    }
    let mut segment = || parts.next().filter(|s| !s.is_empty());
    let system = segment()?;
    let room = segment()?;
    let device = segment()?;
    let feature = segment()?;
    if parts.next().is_some() {
        return None;
    }

    let action = std::str::from_utf8(payload).ok()?;
    if action.is_empty() {
        return None;
    }
    Some(ActionMessage::new(system, room, device, feature, action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        let status = StatusMessage::new("loxone", "kitchen", "light1", "power", "on");
        assert_eq!(status_topic(&status), "status/loxone/kitchen/light1/power");

        let action = ActionMessage::new("loxone", "kitchen", "light1", "power", "toggle");
        assert_eq!(action_topic(&action), "action/loxone/kitchen/light1/power");
        assert_eq!(action_filter("loxone"), "action/loxone/+/+/+");
    }

    #[test]
    fn test_parse_action_topic() {
        let action = parse_action_topic("action/loxone/kitchen/light1/power", b"toggle").unwrap();
        assert_eq!(
            action,
            ActionMessage::new("loxone", "kitchen", "light1", "power", "toggle")
        );

        let action = parse_action_topic("action/loxone/hall/blind/position", b"set/50").unwrap();
        assert_eq!(action.action, "set/50");
    }

    #[test]
    fn test_parse_action_topic_rejects() {
        assert!(parse_action_topic("status/loxone/kitchen/light1/power", b"on").is_none());
        assert!(parse_action_topic("action/loxone/kitchen/light1", b"toggle").is_none());
        assert!(parse_action_topic("action/loxone/kitchen/light1/power/x", b"toggle").is_none());
        assert!(parse_action_topic("action/loxone//light1/power", b"toggle").is_none());
        assert!(parse_action_topic("action/loxone/kitchen/light1/power", b"").is_none());
        assert!(parse_action_topic("action/loxone/kitchen/light1/power", &[0xff]).is_none());
    }
}

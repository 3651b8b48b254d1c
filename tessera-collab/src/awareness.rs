//! Awareness: who is in the room, where their cursors are, what they selected.
//!
//! ## Architecture
//!
//! ```text
//! currentState ──► apply_current_state()  (merge-patch, absent maps untouched)
//! mouseMove    ──► move_cursor()          (local user ignored)
//! userDisconnect ► remove_user()          (cursor + selection only)
//!                        │
//!                        ▼
//!                 AwarenessEvent topic
//!
//! Local cursor move
//!       │
//!       ▼
//! Awareness::local_cursor_message()  (rate-limited: 30fps)
//!       │
//!       ▼
//! Message::MouseMove ──► Session
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tessera_core::{Subscription, Topic};
use tokio::time::Instant;

use crate::protocol::{CursorPosition, Message, UserProfile};

/// Default minimum interval between local cursor broadcasts (30fps).
pub const DEFAULT_CURSOR_INTERVAL: Duration = Duration::from_millis(33);

// ───────────────────────────────────────────────────────────────────
// Cursor colors
// ───────────────────────────────────────────────────────────────────

/// RGBA color for cursor/selection rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl CursorColor {
    /// Stable color for a user id.
    ///
    /// The hue comes from an FNV-1a hash of the id; saturation and
    /// lightness are fixed so every cursor stays readable.
    pub fn from_user_id(user_id: &str) -> Self {
        let hue = (fnv1a(user_id.as_bytes()) % 360) as f32 / 360.0;
        let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
        Self { r, g, b, a: 1.0 }
    }

    /// `#rrggbb` form.
    pub fn to_hex(&self) -> String {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!("#{:02x}{:02x}{:02x}", channel(self.r), channel(self.g), channel(self.b))
    }
}

impl Default for CursorColor {
    fn default() -> Self {
        Self { r: 0.26, g: 0.52, b: 0.96, a: 1.0 }
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

// ───────────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────────

/// What changed in the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum AwarenessEvent {
    /// Cursor positions changed for these users.
    CursorsChanged(Vec<String>),
    /// Selections changed (set or cleared) for these users.
    SelectionsChanged(Vec<String>),
    /// Profiles were added or replaced for these users.
    UsersChanged(Vec<String>),
    /// A user's cursor and selection were dropped.
    UserLeft(String),
}

#[derive(Debug, Default)]
struct Registry {
    cursors: HashMap<String, CursorPosition>,
    selections: HashMap<String, String>,
    users: HashMap<String, UserProfile>,
}

#[derive(Debug)]
struct CursorThrottle {
    last_broadcast: Option<Instant>,
    interval: Duration,
    position: CursorPosition,
}

/// Presence state for one room, as seen by the local user.
pub struct Awareness {
    local_user_id: String,
    registry: Mutex<Registry>,
    throttle: Mutex<CursorThrottle>,
    events: Topic<AwarenessEvent>,
}

impl Awareness {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self::with_interval(local_user_id, DEFAULT_CURSOR_INTERVAL)
    }

    /// Create with a custom cursor broadcast interval.
    pub fn with_interval(local_user_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            registry: Mutex::new(Registry::default()),
            throttle: Mutex::new(CursorThrottle {
                last_broadcast: None,
                interval,
                position: CursorPosition::default(),
            }),
            events: Topic::new(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    /// Merge a `currentState` frame into the registry.
    ///
    /// Only the maps that are present are touched; within them, entries
    /// are inserted or replaced. A `None` selection clears that user's
    /// selection.
    pub fn apply_current_state(
        &self,
        mouse_positions: Option<HashMap<String, CursorPosition>>,
        selected_elements: Option<HashMap<String, Option<String>>>,
        users: Option<HashMap<String, UserProfile>>,
    ) {
        let mut events = Vec::new();
        {
            let mut registry = self.registry.lock();
            if let Some(positions) = mouse_positions {
                let ids = sorted_keys(&positions);
                registry.cursors.extend(positions);
                if !ids.is_empty() {
                    events.push(AwarenessEvent::CursorsChanged(ids));
                }
            }
            if let Some(selected) = selected_elements {
                let ids = sorted_keys(&selected);
                for (user_id, selection) in selected {
                    match selection {
                        Some(element_id) => {
                            registry.selections.insert(user_id, element_id);
                        }
                        None => {
                            registry.selections.remove(&user_id);
                        }
                    }
                }
                if !ids.is_empty() {
                    events.push(AwarenessEvent::SelectionsChanged(ids));
                }
            }
            if let Some(profiles) = users {
                let ids = sorted_keys(&profiles);
                registry.users.extend(profiles);
                if !ids.is_empty() {
                    events.push(AwarenessEvent::UsersChanged(ids));
                }
            }
        }
        for event in &events {
            self.events.publish(event);
        }
    }

    /// Record a remote cursor move. Moves attributed to the local user
    /// are ignored; returns whether the registry changed.
    pub fn move_cursor(&self, user_id: &str, position: CursorPosition) -> bool {
        if user_id == self.local_user_id {
            return false;
        }
        self.registry.lock().cursors.insert(user_id.to_string(), position);
        self.events
            .publish(&AwarenessEvent::CursorsChanged(vec![user_id.to_string()]));
        true
    }

    /// Drop a user's cursor and selection. The profile is kept.
    pub fn remove_user(&self, user_id: &str) -> bool {
        let removed = {
            let mut registry = self.registry.lock();
            let cursor = registry.cursors.remove(user_id).is_some();
            let selection = registry.selections.remove(user_id).is_some();
            cursor || selection
        };
        if removed {
            log::debug!("User {user_id} left");
            self.events
                .publish(&AwarenessEvent::UserLeft(user_id.to_string()));
        }
        removed
    }

    pub fn cursor(&self, user_id: &str) -> Option<CursorPosition> {
        self.registry.lock().cursors.get(user_id).copied()
    }

    pub fn selection(&self, user_id: &str) -> Option<String> {
        self.registry.lock().selections.get(user_id).cloned()
    }

    pub fn profile(&self, user_id: &str) -> Option<UserProfile> {
        self.registry.lock().users.get(user_id).cloned()
    }

    pub fn cursors(&self) -> HashMap<String, CursorPosition> {
        self.registry.lock().cursors.clone()
    }

    pub fn selections(&self) -> HashMap<String, String> {
        self.registry.lock().selections.clone()
    }

    pub fn users(&self) -> HashMap<String, UserProfile> {
        self.registry.lock().users.clone()
    }

    /// Users that currently have a cursor on the canvas.
    pub fn active_user_count(&self) -> usize {
        self.registry.lock().cursors.len()
    }

    pub fn cursor_color(&self, user_id: &str) -> CursorColor {
        CursorColor::from_user_id(user_id)
    }

    #[must_use = "dropping the subscription unsubscribes"]
    pub fn subscribe<F>(&self, f: F) -> Subscription
    where
        F: Fn(&AwarenessEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(f)
    }

    pub fn clear_subscribers(&self) {
        self.events.clear();
    }

    // ─── Local cursor ────────────────────────────────────────────────

    /// Record a local cursor move and return the `mouseMove` frame to
    /// send, or `None` when the last broadcast was too recent.
    pub fn local_cursor_message(&self, position: CursorPosition) -> Option<Message> {
        let mut throttle = self.throttle.lock();
        throttle.position = position;
        let now = Instant::now();
        let due = throttle
            .last_broadcast
            .is_none_or(|last| now.duration_since(last) >= throttle.interval);
        if !due {
            return None;
        }
        throttle.last_broadcast = Some(now);
        Some(Message::mouse_move(self.local_user_id.clone(), position))
    }

    /// Frame for the latest local cursor position, ignoring the rate
    /// limit. Used to flush the final position after a burst.
    pub fn force_cursor_message(&self) -> Message {
        let mut throttle = self.throttle.lock();
        throttle.last_broadcast = Some(Instant::now());
        Message::mouse_move(self.local_user_id.clone(), throttle.position)
    }

    pub fn local_cursor(&self) -> CursorPosition {
        self.throttle.lock().position
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn positions(entries: &[(&str, f64, f64)]) -> HashMap<String, CursorPosition> {
        entries
            .iter()
            .map(|(id, x, y)| (id.to_string(), CursorPosition::new(*x, *y)))
            .collect()
    }

    #[test]
    fn test_cursor_color_stable() {
        let a = CursorColor::from_user_id("user-1");
        let b = CursorColor::from_user_id("user-1");
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 7);
        assert!(a.r >= 0.0 && a.r <= 1.0);
        assert!(a.g >= 0.0 && a.g <= 1.0);
        assert!(a.b >= 0.0 && a.b <= 1.0);
    }

    #[test]
    fn test_cursor_color_distinct() {
        let colors: Vec<String> = (0..8)
            .map(|i| CursorColor::from_user_id(&format!("user-{i}")).to_hex())
            .collect();
        let unique: std::collections::HashSet<_> = colors.iter().collect();
        assert!(unique.len() > 1);
    }

    #[test]
    fn test_current_state_merges_present_maps_only() {
        let awareness = Awareness::new("me");
        awareness.apply_current_state(Some(positions(&[("u1", 1.0, 1.0)])), None, None);
        awareness.apply_current_state(
            None,
            Some(HashMap::from([("u1".to_string(), Some("el-1".to_string()))])),
            Some(HashMap::from([("u1".to_string(), UserProfile::named("Ann"))])),
        );

        assert_eq!(awareness.cursor("u1"), Some(CursorPosition::new(1.0, 1.0)));
        assert_eq!(awareness.selection("u1").as_deref(), Some("el-1"));
        assert_eq!(awareness.profile("u1").unwrap().name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_current_state_replaces_entries() {
        let awareness = Awareness::new("me");
        awareness.apply_current_state(Some(positions(&[("u1", 1.0, 1.0), ("u2", 2.0, 2.0)])), None, None);
        awareness.apply_current_state(Some(positions(&[("u1", 5.0, 6.0)])), None, None);

        assert_eq!(awareness.cursor("u1"), Some(CursorPosition::new(5.0, 6.0)));
        assert_eq!(awareness.cursor("u2"), Some(CursorPosition::new(2.0, 2.0)));
    }

    #[test]
    fn test_null_selection_clears() {
        let awareness = Awareness::new("me");
        awareness.apply_current_state(
            None,
            Some(HashMap::from([("u1".to_string(), Some("el-1".to_string()))])),
            None,
        );
        awareness.apply_current_state(None, Some(HashMap::from([("u1".to_string(), None)])), None);
        assert_eq!(awareness.selection("u1"), None);
    }

    #[test]
    fn test_mouse_move_ignores_local_user() {
        let awareness = Awareness::new("me");
        assert!(!awareness.move_cursor("me", CursorPosition::new(1.0, 1.0)));
        assert!(awareness.cursor("me").is_none());

        assert!(awareness.move_cursor("u2", CursorPosition::new(3.0, 4.0)));
        assert_eq!(awareness.cursor("u2"), Some(CursorPosition::new(3.0, 4.0)));
    }

    #[test]
    fn test_remove_user_keeps_profile() {
        let awareness = Awareness::new("me");
        awareness.apply_current_state(
            Some(positions(&[("u1", 1.0, 1.0)])),
            Some(HashMap::from([("u1".to_string(), Some("el-1".to_string()))])),
            Some(HashMap::from([("u1".to_string(), UserProfile::named("Ann"))])),
        );

        assert!(awareness.remove_user("u1"));
        assert!(awareness.cursor("u1").is_none());
        assert!(awareness.selection("u1").is_none());
        assert!(awareness.profile("u1").is_some());
        assert!(!awareness.remove_user("u1"));
    }

    #[test]
    fn test_events_published() {
        let awareness = Awareness::new("me");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = awareness.subscribe(move |event| sink.lock().push(event.clone()));

        awareness.move_cursor("u2", CursorPosition::new(1.0, 1.0));
        awareness.move_cursor("me", CursorPosition::new(1.0, 1.0));
        awareness.remove_user("u2");

        assert_eq!(
            *seen.lock(),
            vec![
                AwarenessEvent::CursorsChanged(vec!["u2".into()]),
                AwarenessEvent::UserLeft("u2".into()),
            ]
        );
    }

    #[test]
    fn test_local_cursor_rate_limited() {
        let awareness = Awareness::with_interval("me", Duration::from_secs(3600));
        assert!(awareness.local_cursor_message(CursorPosition::new(1.0, 1.0)).is_some());
        assert!(awareness.local_cursor_message(CursorPosition::new(2.0, 2.0)).is_none());
        assert_eq!(awareness.local_cursor(), CursorPosition::new(2.0, 2.0));

        match awareness.force_cursor_message() {
            Message::MouseMove { user_id, x, y } => {
                assert_eq!(user_id, "me");
                assert_eq!((x, y), (2.0, 2.0));
            }
            other => panic!("Expected mouseMove, got {other:?}"),
        }
    }

    #[test]
    fn test_local_cursor_zero_interval() {
        let awareness = Awareness::with_interval("me", Duration::ZERO);
        for i in 0..5 {
            assert!(awareness
                .local_cursor_message(CursorPosition::new(i as f64, 0.0))
                .is_some());
        }
    }
}

//! Connection registry: which services have a usable credential.
//!
//! Resolution is read-only — connections are created by auth flows and
//! observed here, never mutated.

use serde::Serialize;

use crate::provider::ServiceConnection;

/// The services the assistant can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Gmail,
    GoogleCalendar,
    GoogleMeetings,
    Canvas,
    Zoom,
}

impl Service {
    /// All services, in the order they are reported and enumerated.
    pub const ALL: [Service; 5] = [
        Service::GoogleCalendar,
        Service::Gmail,
        Service::Canvas,
        Service::Zoom,
        Service::GoogleMeetings,
    ];

    /// Canonical slug used by the provider.
    pub fn slug(&self) -> &'static str {
        match self {
            Service::Gmail => "gmail",
            Service::GoogleCalendar => "googlecalendar",
            Service::GoogleMeetings => "googlemeetings",
            Service::Canvas => "canvas",
            Service::Zoom => "zoom",
        }
    }

    /// Human-readable name for fallback messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Service::Gmail => "Gmail",
            Service::GoogleCalendar => "Google Calendar",
            Service::GoogleMeetings => "Google Meetings",
            Service::Canvas => "Canvas",
            Service::Zoom => "Zoom",
        }
    }

    /// Resolve a provider slug, case-insensitively, tolerating the
    /// historical aliases that appear in older connection records.
    pub fn from_slug(slug: &str) -> Option<Service> {
        match slug.to_lowercase().as_str() {
            "gmail" => Some(Service::Gmail),
            "googlecalendar" | "gcal" => Some(Service::GoogleCalendar),
            "googlemeetings" | "gmeet" | "googlemeet" => Some(Service::GoogleMeetings),
            "canvas" => Some(Service::Canvas),
            "zoom" => Some(Service::Zoom),
            _ => None,
        }
    }
}

/// Per-service connectivity map returned with every chat reply so the
/// caller can update its UI without a second round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub gmail: bool,
    pub googlecalendar: bool,
    pub canvas: bool,
    pub zoom: bool,
    pub googlemeetings: bool,
}

impl ConnectionStatus {
    pub fn is_connected(&self, service: Service) -> bool {
        match service {
            Service::Gmail => self.gmail,
            Service::GoogleCalendar => self.googlecalendar,
            Service::GoogleMeetings => self.googlemeetings,
            Service::Canvas => self.canvas,
            Service::Zoom => self.zoom,
        }
    }

    fn set(&mut self, service: Service) {
        match service {
            Service::Gmail => self.gmail = true,
            Service::GoogleCalendar => self.googlecalendar = true,
            Service::GoogleMeetings => self.googlemeetings = true,
            Service::Canvas => self.canvas = true,
            Service::Zoom => self.zoom = true,
        }
    }
}

/// Resolved connectivity for one turn.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSnapshot {
    /// Per-service ACTIVE flags.
    pub status: ConnectionStatus,
    /// `true` when the ACTIVE set was filtered to the requesting user.
    /// `false` means the soft-tenancy fallback fired: no connection was
    /// tagged with this user, so any ACTIVE connection was assumed
    /// usable. Callers and tests can distinguish "connected to this
    /// user" from "connected to someone, assumed usable".
    pub matched_exactly: bool,
    /// Total entries in the raw listing (connected or not).
    pub total_listed: usize,
}

impl ConnectionSnapshot {
    /// Whether any service at all is connected.
    pub fn any_connected(&self) -> bool {
        Service::ALL.iter().any(|s| self.status.is_connected(*s))
    }

    /// Services that are connected, in enumeration order.
    pub fn connected(&self) -> Vec<Service> {
        Service::ALL
            .iter()
            .copied()
            .filter(|s| self.status.is_connected(*s))
            .collect()
    }

    /// Services that are not connected, in enumeration order.
    pub fn disconnected(&self) -> Vec<Service> {
        Service::ALL
            .iter()
            .copied()
            .filter(|s| !self.status.is_connected(*s))
            .collect()
    }
}

/// Resolve the connection snapshot for one user from a raw listing.
///
/// Prefers ACTIVE entries whose recorded owner matches `user_id`. When
/// that filtered set is empty, falls back to any ACTIVE entry regardless
/// of owner — auth flows have not always tagged a user, so tenancy is
/// soft, not enforced. The fallback is reported via `matched_exactly`.
pub fn resolve(items: &[ServiceConnection], user_id: &str) -> ConnectionSnapshot {
    let user_scoped: Vec<&ServiceConnection> = items
        .iter()
        .filter(|c| c.is_active() && c.matches_user(user_id))
        .collect();

    let (chosen, matched_exactly): (Vec<&ServiceConnection>, bool) = if user_scoped.is_empty() {
        (items.iter().filter(|c| c.is_active()).collect(), false)
    } else {
        (user_scoped, true)
    };

    let mut status = ConnectionStatus::default();
    for conn in &chosen {
        if let Some(service) = Service::from_slug(&conn.slug()) {
            status.set(service);
        }
    }

    ConnectionSnapshot {
        status,
        matched_exactly,
        total_listed: items.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conn(slug: &str, status: &str, user: Option<&str>) -> ServiceConnection {
        let mut v = json!({ "toolkit": { "slug": slug }, "status": status });
        if let Some(u) = user {
            v["external_user_id"] = json!(u);
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn slug_aliases_resolve() {
        assert_eq!(Service::from_slug("GMAIL"), Some(Service::Gmail));
        assert_eq!(Service::from_slug("gcal"), Some(Service::GoogleCalendar));
        assert_eq!(Service::from_slug("gmeet"), Some(Service::GoogleMeetings));
        assert_eq!(Service::from_slug("googlemeet"), Some(Service::GoogleMeetings));
        assert_eq!(Service::from_slug("unknown"), None);
    }

    #[test]
    fn exact_user_match_preferred() {
        let items = vec![
            conn("gmail", "ACTIVE", Some("u1")),
            conn("canvas", "ACTIVE", Some("u2")),
        ];
        let snap = resolve(&items, "u1");
        assert!(snap.matched_exactly);
        assert!(snap.status.gmail);
        // u2's canvas connection is excluded when an exact match exists.
        assert!(!snap.status.canvas);
    }

    #[test]
    fn soft_tenancy_fallback_when_no_owner_match() {
        let items = vec![
            conn("gmail", "ACTIVE", None),
            conn("canvas", "ACTIVE", Some("someone-else")),
        ];
        let snap = resolve(&items, "u1");
        assert!(!snap.matched_exactly, "fallback must be flagged");
        assert!(snap.status.gmail);
        assert!(snap.status.canvas);
    }

    #[test]
    fn inactive_connections_ignored() {
        let items = vec![
            conn("gmail", "INITIATED", Some("u1")),
            conn("canvas", "EXPIRED", None),
        ];
        let snap = resolve(&items, "u1");
        assert!(!snap.any_connected());
        assert_eq!(snap.total_listed, 2);
    }

    #[test]
    fn empty_listing_resolves_to_nothing() {
        let snap = resolve(&[], "u1");
        assert!(!snap.any_connected());
        assert_eq!(snap.disconnected().len(), 5);
    }

    #[test]
    fn disconnected_enumeration_order() {
        let items = vec![conn("gmail", "ACTIVE", Some("u1"))];
        let snap = resolve(&items, "u1");
        let names: Vec<&str> = snap.disconnected().iter().map(|s| s.display_name()).collect();
        assert_eq!(
            names,
            vec!["Google Calendar", "Canvas", "Zoom", "Google Meetings"]
        );
    }
}

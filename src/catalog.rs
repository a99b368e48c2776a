//! Tool catalog: maps connected services to the tool bundles exposed to
//! the model, and loads descriptors from the capability provider.
//!
//! Per-service loads are isolated — one service failing to load never
//! blocks the others. No tool is ever exposed for a disconnected
//! service.

use tracing::{debug, warn};

use crate::connections::{ConnectionSnapshot, Service};
use crate::intent::ServiceHint;
use crate::model::ToolDefinition;
use crate::provider::{CapabilityProvider, ToolQuery};

/// Fixed tool bundle for a service.
pub fn bundle(service: Service) -> &'static [&'static str] {
    match service {
        Service::Gmail => &["GMAIL_FETCH_EMAILS", "GMAIL_SEND_EMAIL", "GMAIL_GET_PROFILE"],
        Service::GoogleCalendar => &["GOOGLECALENDAR_LIST_EVENTS", "GOOGLECALENDAR_FIND_EVENT"],
        Service::Canvas => &[
            "CANVAS_LIST_COURSES",
            "CANVAS_GET_ALL_ASSIGNMENTS",
            "CANVAS_GET_ASSIGNMENT",
        ],
        Service::Zoom => &["ZOOM_LIST_MEETINGS", "ZOOM_GET_MEETING"],
        Service::GoogleMeetings => &["GOOGLEMEET_GET_MEET", "GOOGLEMEET_LIST_RECORDINGS"],
    }
}

/// Canvas discussion tool added in intent mode when the message asks
/// about discussions.
const CANVAS_DISCUSSIONS_TOOL: &str = "CANVAS_LIST_DISCUSSION_TOPICS";

/// Load one service's bundle, tolerating failure.
///
/// Canvas gets a secondary attempt against the configured default
/// identity with a toolkit-scoped query — Canvas connections have often
/// been established without per-user tagging, so the user-scoped load
/// can miss an account that actually exists.
async fn load_service(
    provider: &dyn CapabilityProvider,
    user_id: &str,
    default_user_id: &str,
    service: Service,
    names: &[&str],
) -> Vec<ToolDefinition> {
    let query = ToolQuery::named(names.iter().copied());
    match provider.get_tools(user_id, &query).await {
        Ok(tools) => {
            debug!(service = service.slug(), count = tools.len(), "tools loaded");
            return tools.into_iter().map(|t| t.into_definition()).collect();
        }
        Err(e) if service == Service::Canvas => {
            warn!(
                error = %e,
                "Canvas tools failed with user identity, retrying with default"
            );
            let retry = ToolQuery {
                tools: names.iter().map(|s| s.to_string()).collect(),
                toolkits: vec!["CANVAS".to_string()],
                ..Default::default()
            };
            match provider.get_tools(default_user_id, &retry).await {
                Ok(tools) => {
                    debug!(count = tools.len(), "Canvas tools loaded with default identity");
                    return tools.into_iter().map(|t| t.into_definition()).collect();
                }
                Err(e) => {
                    warn!(error = %e, "Canvas tools failed with default identity");
                }
            }
        }
        Err(e) => {
            warn!(service = service.slug(), error = %e, "failed to load tools");
        }
    }
    Vec::new()
}

/// Capability mode: union of the fixed bundles for every connected
/// service. A failed load contributes zero tools for that service only.
pub async fn load_tools(
    provider: &dyn CapabilityProvider,
    user_id: &str,
    default_user_id: &str,
    snapshot: &ConnectionSnapshot,
) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();
    for service in snapshot.connected() {
        tools.extend(
            load_service(provider, user_id, default_user_id, service, bundle(service)).await,
        );
    }
    debug!(total = tools.len(), "tool catalog assembled");
    tools
}

/// Intent mode: a single service's bundle chosen by the router, with
/// message-specific augmentation. A hint pointing at a disconnected
/// service loads nothing; the General hint spans mail + coursework.
pub async fn load_tools_routed(
    provider: &dyn CapabilityProvider,
    user_id: &str,
    default_user_id: &str,
    snapshot: &ConnectionSnapshot,
    hint: ServiceHint,
    message: &str,
) -> Vec<ToolDefinition> {
    let mut tools = Vec::new();

    let want_mail = matches!(hint, ServiceHint::Mail | ServiceHint::General);
    let want_coursework = matches!(hint, ServiceHint::Coursework | ServiceHint::General);

    if want_mail && snapshot.status.gmail {
        tools.extend(
            load_service(
                provider,
                user_id,
                default_user_id,
                Service::Gmail,
                bundle(Service::Gmail),
            )
            .await,
        );
    }

    if want_coursework && snapshot.status.canvas {
        let mut names: Vec<&str> = bundle(Service::Canvas).to_vec();
        if message.to_lowercase().contains("discussion") {
            names.push(CANVAS_DISCUSSIONS_TOOL);
        }
        tools.extend(
            load_service(provider, user_id, default_user_id, Service::Canvas, &names).await,
        );
    }

    debug!(total = tools.len(), hint = ?hint, "routed tool catalog assembled");
    tools
}

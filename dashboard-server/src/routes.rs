//! warp filters for the `/api` surface
//!
//! ```text
//! GET  /api/health
//! GET  /api/sonos/{devices,groups}[/{id}]      GET /api/sonos/status
//! POST /api/sonos/devices/{id}/{play|pause|stop|next|previous}
//! POST /api/sonos/devices/{id}/volume/{n}      POST /api/sonos/devices/{id}/mute
//! POST /api/sonos/groups                       POST /api/sonos/groups/{id}/dissolve
//! POST /api/sonos/groups/{id}/{play|pause|stop}
//! POST /api/sonos/groups/{id}/volume/{n}       POST /api/sonos/groups/{id}/mute
//! POST /api/sonos/groups/{id}/{join|leave}/{device}
//! GET  /api/sonos/jishi/status                 POST /api/sonos/jishi/{start|stop|restart}
//! ```
//!
//! Service calls block on the network, so every handler runs them on
//! `spawn_blocking`.

use std::convert::Infallible;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use sonos_dashboard::{CommandOutcome, ServiceError, SonosService};
use warp::reply::Json;
use warp::{Filter, Rejection, Reply};

use crate::error::{handle_rejection, ApiError};

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub mute: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub coordinator: String,
    #[serde(default)]
    pub members: Vec<String>,
}

/// Every route, with rejections rendered as JSON errors
pub fn api(service: Arc<SonosService>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("api" / "health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok" })));

    let sonos = warp::path("api").and(warp::path("sonos"));

    health
        .or(sonos.clone().and(read_routes(service.clone())))
        .or(sonos.clone().and(device_routes(service.clone())))
        .or(sonos.clone().and(group_routes(service.clone())))
        .or(sonos.and(companion_routes(service)))
        .recover(handle_rejection)
}

fn with_service(
    service: Arc<SonosService>,
) -> impl Filter<Extract = (Arc<SonosService>,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}

/// Run a service call off the async runtime
async fn blocking<T, F>(service: Arc<SonosService>, call: F) -> Result<T, Rejection>
where
    F: FnOnce(&SonosService) -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| warp::reject::custom(ApiError::internal(format!("Handler task failed: {}", e))))?
        .map_err(|e| warp::reject::custom(ApiError::from(e)))
}

fn parse_volume(raw: &str) -> Result<i64, Rejection> {
    raw.parse::<i64>()
        .map_err(|_| warp::reject::custom(ApiError::bad_request(format!("Invalid volume: {}", raw))))
}

// ============================================================================
// Read API
// ============================================================================

fn read_routes(
    service: Arc<SonosService>,
) -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let devices = warp::path!("devices")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<SonosService>| {
            let devices = service.devices();
            warp::reply::json(&json!({ "count": devices.len(), "devices": devices }))
        });

    let device = warp::path!("devices" / String)
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|id: String, service: Arc<SonosService>| async move {
            service
                .device(&id)
                .map(|device| warp::reply::json(&device))
                .ok_or_else(|| warp::reject::custom(ApiError::from(ServiceError::DeviceNotFound(id))))
        });

    let groups = warp::path!("groups")
        .and(warp::get())
        .and(with_service(service.clone()))
        .map(|service: Arc<SonosService>| {
            let groups = service.groups();
            warp::reply::json(&json!({ "count": groups.len(), "groups": groups }))
        });

    let group = warp::path!("groups" / String)
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|id: String, service: Arc<SonosService>| async move {
            service
                .group(&id)
                .map(|group| warp::reply::json(&group))
                .ok_or_else(|| warp::reject::custom(ApiError::from(ServiceError::GroupNotFound(id))))
        });

    let status = warp::path!("status")
        .and(warp::get())
        .and(with_service(service))
        .map(|service: Arc<SonosService>| warp::reply::json(&service.status()));

    devices
        .or(device)
        .unify()
        .or(groups)
        .unify()
        .or(group)
        .unify()
        .or(status)
        .unify()
}

// ============================================================================
// Device commands
// ============================================================================

fn device_routes(
    service: Arc<SonosService>,
) -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let volume = warp::path!("devices" / String / "volume" / String)
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(|id: String, raw: String, service: Arc<SonosService>| async move {
            let volume = parse_volume(&raw)?;
            let device = id.clone();
            let outcome = blocking(service, move |s| s.set_volume(&device, volume)).await?;
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "status": "success",
                "action": outcome.action,
                "device": id,
                "target": outcome.target_name,
                "volume": volume,
            })))
        });

    let mute = warp::path!("devices" / String / "mute")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(|id: String, request: MuteRequest, service: Arc<SonosService>| async move {
            let device = id.clone();
            let outcome = blocking(service, move |s| s.set_mute(&device, request.mute)).await?;
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "status": "success",
                "action": outcome.action,
                "device": id,
                "target": outcome.target_name,
                "mute": request.mute,
            })))
        });

    let transport = warp::path!("devices" / String / String)
        .and(warp::post())
        .and(with_service(service))
        .and_then(|id: String, action: String, service: Arc<SonosService>| async move {
            let command: fn(&SonosService, &str) -> sonos_dashboard::Result<CommandOutcome> = match action.as_str() {
                "play" => SonosService::play_device,
                "pause" => SonosService::pause_device,
                "stop" => SonosService::stop_device,
                "next" => SonosService::next_track,
                "previous" => SonosService::previous_track,
                _ => return Err(warp::reject::not_found()),
            };
            let device = id.clone();
            let outcome = blocking(service, move |s| command(s, &device)).await?;
            Ok(warp::reply::json(&json!({
                "status": "success",
                "action": outcome.action,
                "device": id,
                "target": outcome.target_name,
            })))
        });

    volume.or(mute).unify().or(transport).unify()
}

// ============================================================================
// Group commands and management
// ============================================================================

fn group_routes(
    service: Arc<SonosService>,
) -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let create = warp::path!("groups")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(|request: CreateGroupRequest, service: Arc<SonosService>| async move {
            let formation = blocking(service, move |s| {
                s.create_group(&request.coordinator, &request.members)
            })
            .await?;
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "status": "success",
                "action": "create_group",
                "formation": formation,
            })))
        });

    let membership = warp::path!("groups" / String / String / String)
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(|id: String, action: String, device: String, service: Arc<SonosService>| async move {
            let (group, member) = (id.clone(), device.clone());
            let outcome = match action.as_str() {
                "join" => blocking(service, move |s| s.join_group(&group, &member)).await?,
                "leave" => blocking(service, move |s| s.leave_group(&group, &member)).await?,
                _ => return Err(warp::reject::not_found()),
            };
            Ok(warp::reply::json(&json!({
                "status": "success",
                "action": format!("{}_group", action),
                "group": id,
                "device": device,
                "target": outcome.target_name,
            })))
        });

    let volume = warp::path!("groups" / String / "volume" / String)
        .and(warp::post())
        .and(with_service(service.clone()))
        .and_then(|id: String, raw: String, service: Arc<SonosService>| async move {
            let volume = parse_volume(&raw)?;
            let group = id.clone();
            let outcome = blocking(service, move |s| s.set_group_volume(&group, volume)).await?;
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "status": "success",
                "action": outcome.action,
                "group": id,
                "target": outcome.target_name,
                "volume": volume,
            })))
        });

    let mute = warp::path!("groups" / String / "mute")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_service(service.clone()))
        .and_then(|id: String, request: MuteRequest, service: Arc<SonosService>| async move {
            let group = id.clone();
            let outcome = blocking(service, move |s| s.set_group_mute(&group, request.mute)).await?;
            Ok::<_, Rejection>(warp::reply::json(&json!({
                "status": "success",
                "action": outcome.action,
                "group": id,
                "target": outcome.target_name,
                "mute": request.mute,
            })))
        });

    let action = warp::path!("groups" / String / String)
        .and(warp::post())
        .and(with_service(service))
        .and_then(|id: String, action: String, service: Arc<SonosService>| async move {
            let group = id.clone();
            let body: Value = match action.as_str() {
                "dissolve" => {
                    let outcomes = blocking(service, move |s| s.dissolve_group(&group)).await?;
                    json!({
                        "status": "success",
                        "action": "dissolve_group",
                        "group": id,
                        "released": outcomes.iter().map(|o| o.target_name.as_str()).collect::<Vec<_>>(),
                    })
                }
                "play" | "pause" | "stop" => {
                    let command: fn(&SonosService, &str) -> sonos_dashboard::Result<CommandOutcome> = match action.as_str() {
                        "play" => SonosService::play_group,
                        "pause" => SonosService::pause_group,
                        _ => SonosService::stop_group,
                    };
                    let outcome = blocking(service, move |s| command(s, &group)).await?;
                    json!({
                        "status": "success",
                        "action": outcome.action,
                        "group": id,
                        "target": outcome.target_name,
                    })
                }
                _ => return Err(warp::reject::not_found()),
            };
            Ok(warp::reply::json(&body))
        });

    create
        .or(membership)
        .unify()
        .or(volume)
        .unify()
        .or(mute)
        .unify()
        .or(action)
        .unify()
}

// ============================================================================
// Companion management
// ============================================================================

fn companion_routes(
    service: Arc<SonosService>,
) -> impl Filter<Extract = (Json,), Error = Rejection> + Clone {
    let status = warp::path!("jishi" / "status")
        .and(warp::get())
        .and(with_service(service.clone()))
        .and_then(|service: Arc<SonosService>| async move {
            let status = blocking(service, |s| s.companion_status()).await?;
            Ok::<_, Rejection>(warp::reply::json(&status))
        });

    let control = warp::path!("jishi" / String)
        .and(warp::post())
        .and(with_service(service))
        .and_then(|action: String, service: Arc<SonosService>| async move {
            let status = match action.as_str() {
                "start" => blocking(service, |s| s.start_companion()).await?,
                "stop" => blocking(service, |s| s.stop_companion()).await?,
                "restart" => blocking(service, |s| s.restart_companion()).await?,
                _ => return Err(warp::reject::not_found()),
            };
            Ok(warp::reply::json(&json!({
                "status": "success",
                "action": format!("{}_jishi", action),
                "companion": status,
            })))
        });

    status.or(control).unify()
}

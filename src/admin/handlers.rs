use axum::{extract::State, Json};
use serde::Serialize;

use crate::config::DeliveryMode;
use crate::health::HealthSnapshot;
use crate::http::server::AppState;
use crate::processor::{Payment, ProcessorName};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub mode: DeliveryMode,
    pub queue_depth: usize,
    pub dead_letters: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorStatus {
    pub name: ProcessorName,
    #[serde(flatten)]
    pub health: HealthSnapshot,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let scheduler = state.service.scheduler();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        mode: state.service.mode(),
        queue_depth: scheduler.queue_depth(),
        dead_letters: scheduler.dead_letters().len(),
    })
}

pub async fn get_processors(State(state): State<AppState>) -> Json<Vec<ProcessorStatus>> {
    let statuses = state
        .service
        .router()
        .processors()
        .iter()
        .map(|p| ProcessorStatus {
            name: p.name,
            health: p.health.get(),
        })
        .collect();
    Json(statuses)
}

pub async fn get_dead_letters(State(state): State<AppState>) -> Json<Vec<Payment>> {
    Json(state.service.scheduler().dead_letters())
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

const VROOM_TIMEOUT: Duration = Duration::from_secs(30);
const OSRM_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
pub struct OptimizerJob {
    pub id: i64,
    pub location: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizerVehicle {
    pub id: i64,
    pub start: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
struct VroomOptions {
    g: bool,
}

#[derive(Debug, Clone, Serialize)]
struct VroomRequest<'a> {
    jobs: &'a [OptimizerJob],
    vehicles: &'a [OptimizerVehicle],
    options: VroomOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct VroomResponse {
    routes: Vec<VroomRoute>,
}

#[derive(Debug, Clone, Deserialize)]
struct VroomRoute {
    vehicle: i64,
    steps: Vec<VroomStep>,
}

#[derive(Debug, Clone, Deserialize)]
struct VroomStep {
    #[serde(default)]
    job: Option<i64>,
}

/// One stop of a produced plan, in visit order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStop {
    pub vehicle_id: i64,
    pub job_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteGeometry {
    pub geometry: String,
    pub distance: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct OsrmResponse {
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Clone, Deserialize)]
struct OsrmRoute {
    geometry: String,
    distance: f64,
    duration: f64,
}

/// Thin client over the two mission/route-planning dependencies (spec
/// §6.2). Both calls are best-effort: failure of either is non-fatal to the
/// request and is only logged, so callers get a usable (if degraded) plan
/// instead of an error.
#[derive(Clone)]
pub struct OptimizerClient {
    http: reqwest::Client,
    vroom_url: Option<String>,
    osrm_url: Option<String>,
}

impl OptimizerClient {
    pub fn new(http: reqwest::Client, vroom_url: Option<String>, osrm_url: Option<String>) -> Self {
        Self {
            http,
            vroom_url,
            osrm_url,
        }
    }

    /// Calls VROOM for an optimized job/vehicle assignment; on any non-OK
    /// response, timeout, or missing `VROOM_URL` falls back to a greedy
    /// nearest-neighbour assignment so mission planning never hard-fails on
    /// the optimizer being unavailable.
    pub async fn plan(&self, jobs: &[OptimizerJob], vehicles: &[OptimizerVehicle]) -> Vec<PlanStop> {
        match self.try_plan_with_vroom(jobs, vehicles).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %err, "vroom optimization failed, falling back to greedy plan");
                greedy_plan(jobs, vehicles)
            }
        }
    }

    async fn try_plan_with_vroom(
        &self,
        jobs: &[OptimizerJob],
        vehicles: &[OptimizerVehicle],
    ) -> anyhow::Result<Vec<PlanStop>> {
        let url = self
            .vroom_url
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("VROOM_URL not configured"))?;

        let body = VroomRequest {
            jobs,
            vehicles,
            options: VroomOptions { g: true },
        };

        let response = self
            .http
            .post(url)
            .json(&body)
            .timeout(VROOM_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("vroom returned status {}", response.status());
        }

        let parsed: VroomResponse = response.json().await?;
        Ok(parsed
            .routes
            .into_iter()
            .flat_map(|route| {
                route.steps.into_iter().filter_map(move |step| {
                    step.job.map(|job_id| PlanStop {
                        vehicle_id: route.vehicle,
                        job_id,
                    })
                })
            })
            .collect())
    }

    /// Calls OSRM for route geometry/distance/duration between an ordered
    /// sequence of coordinates. Returns `None` on any failure or missing
    /// `OSRM_URL`; the caller proceeds without turn-by-turn geometry.
    pub async fn route(&self, waypoints: &[[f64; 2]]) -> Option<RouteGeometry> {
        let url = self.osrm_url.as_deref()?;
        match self.try_route(url, waypoints).await {
            Ok(geometry) => Some(geometry),
            Err(err) => {
                warn!(error = %err, "osrm route lookup failed");
                None
            }
        }
    }

    async fn try_route(&self, base: &str, waypoints: &[[f64; 2]]) -> anyhow::Result<RouteGeometry> {
        let coords = waypoints
            .iter()
            .map(|[lon, lat]| format!("{lon},{lat}"))
            .collect::<Vec<_>>()
            .join(";");
        let url = format!("{base}/route/v1/driving/{coords}");

        let response = self.http.get(&url).timeout(OSRM_TIMEOUT).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("osrm returned status {}", response.status());
        }

        let parsed: OsrmResponse = response.json().await?;
        let route = parsed
            .routes
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("osrm returned no routes"))?;

        Ok(RouteGeometry {
            geometry: route.geometry,
            distance: route.distance,
            duration: route.duration,
        })
    }
}

/// Deterministic fallback: assigns each job to the nearest vehicle by
/// straight-line distance, in job order. No routing quality guarantees —
/// only enough to keep the mission creation flow usable when VROOM is
/// unreachable.
fn greedy_plan(jobs: &[OptimizerJob], vehicles: &[OptimizerVehicle]) -> Vec<PlanStop> {
    if vehicles.is_empty() {
        return Vec::new();
    }

    jobs.iter()
        .map(|job| {
            let nearest = vehicles
                .iter()
                .min_by(|a, b| {
                    distance_sq(a.start, job.location)
                        .partial_cmp(&distance_sq(b.start, job.location))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("vehicles is non-empty");

            PlanStop {
                vehicle_id: nearest.id,
                job_id: job.id,
            }
        })
        .collect()
}

fn distance_sq(a: [f64; 2], b: [f64; 2]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    dx * dx + dy * dy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_plan_assigns_each_job_to_nearest_vehicle() {
        let jobs = vec![
            OptimizerJob { id: 1, location: [0.0, 0.0] },
            OptimizerJob { id: 2, location: [10.0, 10.0] },
        ];
        let vehicles = vec![
            OptimizerVehicle { id: 100, start: [0.1, 0.1] },
            OptimizerVehicle { id: 200, start: [9.9, 9.9] },
        ];

        let plan = greedy_plan(&jobs, &vehicles);
        assert_eq!(plan, vec![
            PlanStop { vehicle_id: 100, job_id: 1 },
            PlanStop { vehicle_id: 200, job_id: 2 },
        ]);
    }

    #[test]
    fn greedy_plan_is_empty_when_no_vehicles() {
        let jobs = vec![OptimizerJob { id: 1, location: [0.0, 0.0] }];
        assert!(greedy_plan(&jobs, &[]).is_empty());
    }
}

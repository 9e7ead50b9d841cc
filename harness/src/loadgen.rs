use crate::dataset::SyntheticDataset;
use crate::registry::Language;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Absolute tolerance for cost comparisons. Floating-point division artifacts
/// on epoch-derived ids stay orders of magnitude below this.
pub const COST_TOLERANCE: f64 = 1e-3;

pub fn approx_eq(left: f64, right: f64, tolerance: f64) -> bool {
    (left - right).abs() <= tolerance
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Response predicate evaluated against one HTTP check. Field checks search
/// the first array element carrying the field, matching how the endpoints
/// return single-row result sets.
#[derive(Debug, Clone)]
pub enum Check {
    StatusIn(Vec<u16>),
    FieldEqInt { field: &'static str, expected: i64 },
    FieldEqText { field: &'static str, expected: String },
    FieldNear { field: &'static str, expected: f64, tolerance: f64 },
}

/// One HTTP step in a virtual user's chain.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
    pub checks: Vec<Check>,
    pub pause_after: Duration,
    pub trigger_only: bool,
}

/// A scenario: the ordered chain every virtual user executes, plus the
/// run-level trigger toggle seeded into each user's session.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub base_url: String,
    pub steps: Vec<Step>,
    pub trigger_enabled: bool,
}

/// How virtual users arrive over time: open = rate-driven arrivals that
/// ignore response latency, closed = concurrency held constant per level.
#[derive(Debug, Clone)]
pub enum InjectionProfile {
    Open {
        warm_up: Duration,
        users: u32,
        ramp: Duration,
    },
    Closed {
        starting_users: u32,
        increment: u32,
        levels: u32,
        level_duration: Duration,
        ramp: Duration,
    },
}

impl InjectionProfile {
    /// Concurrency at each closed-profile level; empty for open profiles.
    pub fn concurrency_levels(&self) -> Vec<u32> {
        match self {
            InjectionProfile::Open { .. } => Vec::new(),
            InjectionProfile::Closed {
                starting_users,
                increment,
                levels,
                ..
            } => (0..*levels)
                .map(|level| starting_users + increment * level)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTally {
    pub ok: u64,
    pub ko: u64,
}

/// End-of-run aggregate evaluated against the run-level threshold.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub per_request: BTreeMap<String, RequestTally>,
    pub threshold_percent: f64,
}

impl RunReport {
    pub fn total(&self) -> u64 {
        self.per_request.values().map(|t| t.ok + t.ko).sum()
    }

    pub fn successful(&self) -> u64 {
        self.per_request.values().map(|t| t.ok).sum()
    }

    pub fn success_percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.successful() as f64 * 100.0 / total as f64
    }

    pub fn passed(&self) -> bool {
        self.success_percent() >= self.threshold_percent
    }
}

#[derive(Default)]
struct Stats {
    per_request: Mutex<BTreeMap<String, RequestTally>>,
}

impl Stats {
    fn record(&self, name: &str, ok: bool) {
        let mut tallies = self
            .per_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let tally = tallies.entry(name.to_string()).or_default();
        if ok {
            tally.ok += 1;
        } else {
            tally.ko += 1;
        }
    }

    fn into_report(self, threshold_percent: f64) -> RunReport {
        RunReport {
            per_request: self
                .per_request
                .into_inner()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            threshold_percent,
        }
    }
}

/// Builds the binding-verification chain for one run: batch write, mapped
/// write, then read-backs asserting the written values round-trip, with the
/// trigger-path read gated behind the session toggle.
pub fn binding_chain(dataset: &SyntheticDataset, language: Language) -> Result<Vec<Step>> {
    let item_id = dataset.item_id();
    let item_name = format!("Item-{}-{}", language, item_id);
    let trigger_name = format!("R-MQ-{}", item_id);
    let expected_cost = dataset.item.item_cost;
    let write_statuses = vec![200, 201];

    let read_checks = |name: String| {
        vec![
            Check::StatusIn(vec![200, 201]),
            Check::FieldEqInt {
                field: "ProductID",
                expected: item_id,
            },
            Check::FieldEqText {
                field: "Name",
                expected: name,
            },
            Check::FieldNear {
                field: "Cost",
                expected: expected_cost,
                tolerance: COST_TOLERANCE,
            },
        ]
    };

    Ok(vec![
        Step {
            name: "AddProduct",
            method: Method::Post,
            path: "/addproduct".to_string(),
            body: Some(
                serde_json::to_string(&dataset.products)
                    .context("Failed to serialize product batch")?,
            ),
            checks: vec![Check::StatusIn(write_statuses.clone())],
            pause_after: Duration::from_secs(5),
            trigger_only: false,
        },
        Step {
            name: "AddProductWithMapping",
            method: Method::Post,
            path: "/addproductswithmapping".to_string(),
            body: Some(
                serde_json::to_string(&dataset.item)
                    .context("Failed to serialize mapped item")?,
            ),
            checks: vec![Check::StatusIn(write_statuses)],
            pause_after: Duration::from_secs(5),
            trigger_only: false,
        },
        Step {
            name: "GetProducts",
            method: Method::Get,
            path: format!("/getproducts/{}", item_id),
            body: None,
            checks: read_checks(item_name.clone()),
            pause_after: Duration::ZERO,
            trigger_only: false,
        },
        Step {
            name: "GetProductsFunction",
            method: Method::Get,
            path: format!("/getproductsfn/{}", item_name),
            body: None,
            checks: read_checks(item_name),
            pause_after: Duration::from_secs(10),
            trigger_only: false,
        },
        Step {
            name: "RetrieveTriggerMessages",
            method: Method::Get,
            path: format!("/getproductsfn/{}", trigger_name),
            body: None,
            checks: vec![
                Check::StatusIn(vec![200]),
                Check::FieldEqInt {
                    field: "ProductID",
                    expected: item_id,
                },
                Check::FieldEqText {
                    field: "Name",
                    expected: trigger_name,
                },
                Check::FieldNear {
                    field: "Cost",
                    expected: expected_cost,
                    tolerance: COST_TOLERANCE,
                },
            ],
            pause_after: Duration::ZERO,
            trigger_only: true,
        },
    ])
}

/// Runs one scenario under the given injection profile and evaluates the
/// aggregate success percentage against the threshold. Virtual users share
/// nothing mutable; assertion failures stay chain-local.
pub async fn run(
    scenario: Scenario,
    profile: &InjectionProfile,
    threshold_percent: f64,
) -> Result<RunReport> {
    let client = reqwest::Client::builder()
        .build()
        .context("Failed to construct load client")?;
    let scenario = Arc::new(scenario);
    let stats = Arc::new(Stats::default());

    info!("Running scenario {} against {}", scenario.name, scenario.base_url);

    match profile {
        InjectionProfile::Open {
            warm_up,
            users,
            ramp,
        } => {
            if !warm_up.is_zero() {
                info!("Warm-up: holding for {:?} before injecting users", warm_up);
                sleep(*warm_up).await;
            }
            let mut tasks = Vec::with_capacity(*users as usize);
            for index in 0..*users {
                let offset = if *users > 1 {
                    ramp.mul_f64(index as f64 / (*users - 1) as f64)
                } else {
                    Duration::ZERO
                };
                let client = client.clone();
                let scenario = Arc::clone(&scenario);
                let stats = Arc::clone(&stats);
                tasks.push(tokio::spawn(async move {
                    sleep(offset).await;
                    run_chain(&client, &scenario, &stats).await;
                }));
            }
            join_all(tasks).await;
        }
        InjectionProfile::Closed {
            level_duration,
            ramp,
            ..
        } => {
            let levels = profile.concurrency_levels();
            for (index, concurrency) in levels.iter().enumerate() {
                info!("Closed level {}: {} concurrent users", index + 1, concurrency);
                let deadline = Instant::now() + *level_duration;
                let mut workers = Vec::with_capacity(*concurrency as usize);
                for _ in 0..*concurrency {
                    let client = client.clone();
                    let scenario = Arc::clone(&scenario);
                    let stats = Arc::clone(&stats);
                    workers.push(tokio::spawn(async move {
                        while Instant::now() < deadline {
                            run_chain(&client, &scenario, &stats).await;
                        }
                    }));
                }
                join_all(workers).await;
                if index + 1 < levels.len() {
                    sleep(*ramp).await;
                }
            }
        }
    }

    let stats = Arc::try_unwrap(stats)
        .map_err(|_| anyhow::anyhow!("Load tasks still hold the statistics"))?;
    let report = stats.into_report(threshold_percent);
    for (name, tally) in &report.per_request {
        info!("{}: {} ok, {} ko", name, tally.ok, tally.ko);
    }
    info!(
        "Successful requests: {:.1}% (threshold {:.1}%)",
        report.success_percent(),
        report.threshold_percent
    );
    Ok(report)
}

/// Executes one virtual user's chain. The first failed check aborts the
/// remaining steps for this user only.
async fn run_chain(client: &reqwest::Client, scenario: &Scenario, stats: &Stats) {
    for step in &scenario.steps {
        if step.trigger_only && !scenario.trigger_enabled {
            continue;
        }
        let ok = execute_step(client, &scenario.base_url, step).await;
        stats.record(step.name, ok);
        if !ok {
            debug!("Check failed at {}, aborting this user's chain", step.name);
            return;
        }
        if !step.pause_after.is_zero() {
            sleep(step.pause_after).await;
        }
    }
}

async fn execute_step(client: &reqwest::Client, base_url: &str, step: &Step) -> bool {
    let url = format!("{}{}", base_url, step.path);
    let request = match step.method {
        Method::Get => client.get(&url),
        Method::Post => {
            let request = client.post(&url);
            match &step.body {
                Some(body) => request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone()),
                None => request,
            }
        }
    }
    .header(reqwest::header::ACCEPT, "application/json");

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("{} request to {} failed: {}", step.name, url, e);
            return false;
        }
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("{} response body could not be read: {}", step.name, e);
            return false;
        }
    };

    match evaluate_checks(status, &body, &step.checks) {
        None => true,
        Some(failure) => {
            warn!("{} check failed: {}", step.name, failure);
            false
        }
    }
}

/// Evaluates all checks; returns the first failure description, if any.
fn evaluate_checks(status: u16, body: &str, checks: &[Check]) -> Option<String> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    for check in checks {
        match check {
            Check::StatusIn(accepted) => {
                if !accepted.contains(&status) {
                    return Some(format!("status {} not in {:?}", status, accepted));
                }
            }
            Check::FieldEqInt { field, expected } => {
                match find_field(parsed.as_ref(), field).and_then(Value::as_i64) {
                    Some(actual) if actual == *expected => {}
                    other => {
                        return Some(format!(
                            "{} expected {} but found {:?}",
                            field, expected, other
                        ))
                    }
                }
            }
            Check::FieldEqText { field, expected } => {
                match find_field(parsed.as_ref(), field).and_then(Value::as_str) {
                    Some(actual) if actual == expected.as_str() => {}
                    other => {
                        return Some(format!(
                            "{} expected {} but found {:?}",
                            field, expected, other
                        ))
                    }
                }
            }
            Check::FieldNear {
                field,
                expected,
                tolerance,
            } => match find_field(parsed.as_ref(), field).and_then(Value::as_f64) {
                Some(actual) if approx_eq(actual, *expected, *tolerance) => {}
                other => {
                    return Some(format!(
                        "{} expected ~{} (tolerance {}) but found {:?}",
                        field, expected, tolerance, other
                    ))
                }
            },
        }
    }
    None
}

/// Finds the first occurrence of a field: directly on an object, or on the
/// first array element that carries it.
fn find_field<'a>(value: Option<&'a Value>, field: &str) -> Option<&'a Value> {
    match value? {
        Value::Object(map) => map.get(field),
        Value::Array(elements) => elements
            .iter()
            .find_map(|element| element.as_object().and_then(|map| map.get(field))),
        _ => None,
    }
}

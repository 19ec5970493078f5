//! End-to-end scenarios (§8), driven through `Runtime::decide` exactly
//! as the HTTP layer calls it. Each test seeds the feature tables
//! directly rather than through a datasource sync, since the sync
//! adapters are exercised on their own in `src/datasource`.

#![cfg(feature = "integration-test")]

mod common;

use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use cortex_scheduler::config::{Config, GlobalConfig, PipelineConfig, StepConfig};
use cortex_scheduler::db::DbOptions;
use cortex_scheduler::model::feature::az::HostAz;
use cortex_scheduler::model::feature::capabilities::HostCapabilities;
use cortex_scheduler::model::feature::utilization::HostUtilization;
use cortex_scheduler::model::schema::reservations;
use cortex_scheduler::model::HostName;
use cortex_scheduler::pipeline::request::{FlavorSpec, Request, RequestContext, Spec};
use cortex_scheduler::pipeline::Runtime;

use common::TestHarness;

fn step(name: &str, implementation: &str) -> StepConfig {
    StepConfig {
        name: name.to_string(),
        implementation: implementation.to_string(),
        scope: None,
        opts: serde_json::Value::Null,
        disabled_validations: vec![],
    }
}

fn base_config(ctx: &cortex_scheduler::config::context::Context, steps: Vec<StepConfig>) -> Config {
    Config {
        global: GlobalConfig {
            operator_id: "test-op".into(),
            database: DbOptions {
                url: String::new(),
                max_conns: 5,
                min_conns: 1,
            },
            monitor_labels: vec![],
            identity_auth_url: String::new(),
            identity_username: String::new(),
            identity_password: zeroize::Zeroizing::new(String::new()),
            http_addr: ctx.config.global.http_addr.clone(),
        },
        datasources: vec![],
        extractors: vec![],
        pipelines: vec![PipelineConfig {
            name: "default".into(),
            steps,
        }],
    }
}

fn request(hosts: &[&str], flavor_vcpus: i32, flavor_mem: i32) -> Request {
    let hosts: Vec<HostName> = hosts.iter().map(|h| HostName::from(*h)).collect();
    let weights: HashMap<HostName, f64> = hosts.iter().cloned().map(|h| (h, 1.0)).collect();
    Request {
        hosts,
        weights,
        spec: Spec {
            flavor: FlavorSpec {
                name: "m1.small".into(),
                vcpus: flavor_vcpus,
                memory_mb: flavor_mem,
                root_gb: 20,
                extra_specs: HashMap::new(),
            },
            availability_zone: None,
            project_id: "proj-a".into(),
            user_id: "user-a".into(),
            num_instances: 1,
            ignore_hosts: vec![],
            force_hosts: vec![],
            scheduler_hints: serde_json::Value::Null,
            vmware: false,
        },
        pipeline: None,
        context: RequestContext {
            request_id: "req-1".into(),
            global_request_id: None,
        },
    }
}

async fn seed_capabilities(conn: &mut cortex_scheduler::db::Conn<'_>, hosts: &[&str]) {
    let rows: Vec<HostCapabilities> = hosts
        .iter()
        .map(|h| HostCapabilities {
            host_name: h.to_string(),
            traits: serde_json::json!([]),
            cpu_info: serde_json::json!({}),
            hypervisor_type: "QEMU".into(),
            disabled: false,
            agent_down: false,
            computed_at: Utc::now(),
        })
        .collect();
    HostCapabilities::replace_all(rows, conn).await.unwrap();
}

async fn seed_utilization(conn: &mut cortex_scheduler::db::Conn<'_>, rows: Vec<(&str, i64, i64, i64, i64)>) {
    let rows: Vec<HostUtilization> = rows
        .into_iter()
        .map(|(host, vcpus_total, vcpus_used, mem_total, mem_used)| HostUtilization {
            host_name: host.to_string(),
            vcpus_total,
            vcpus_used,
            vcpu_percent: vcpus_used as f64 / vcpus_total as f64 * 100.0,
            mem_total_mb: mem_total,
            mem_used_mb: mem_used,
            mem_percent: mem_used as f64 / mem_total as f64 * 100.0,
            disk_total_gb: 1000,
            disk_used_gb: 0,
            disk_percent: 0.0,
            computed_at: Utc::now(),
        })
        .collect();
    HostUtilization::replace_all(rows, conn).await.unwrap();
}

/// Scenario 1 (§8): a request naming an availability zone keeps only
/// hosts assigned to that zone.
#[tokio::test]
async fn scenario_az_filter_excludes_other_zones() {
    let harness = TestHarness::new().await;
    let mut conn = harness.ctx.pool.conn().await.unwrap();

    seed_capabilities(&mut conn, &["host-a", "host-b"]).await;
    HostAz::replace_all(
        vec![
            HostAz {
                host_name: "host-a".into(),
                az_name: Some("az1".into()),
                computed_at: Utc::now(),
            },
            HostAz {
                host_name: "host-b".into(),
                az_name: Some("az2".into()),
                computed_at: Utc::now(),
            },
        ],
        &mut conn,
    )
    .await
    .unwrap();

    let config = base_config(&harness.ctx, vec![step("az", "filter_correct_az")]);
    let runtime = Runtime::new(config).unwrap();

    let mut req = request(&["host-a", "host-b"], 2, 2048);
    req.spec.availability_zone = Some("az1".into());

    let result = runtime.decide(req, &harness.ctx.pool, &harness.ctx.monitor).await.unwrap();
    assert_eq!(result.ordered_hosts, vec![HostName::from("host-a")]);
}

/// Scenario 3 (§8): a host with 100 vCPU advertised and 40 used has an
/// active reservation of 20 vCPU for the requesting (project, flavor);
/// the reservation unlocks its own share, yielding 60 effective vCPU.
#[tokio::test]
async fn scenario_capacity_honors_reservation_unlock() {
    let harness = TestHarness::new().await;
    let mut conn = harness.ctx.pool.conn().await.unwrap();

    seed_capabilities(&mut conn, &["host-a"]).await;
    seed_utilization(&mut conn, vec![("host-a", 100, 40, 100_000, 0)]).await;

    diesel::insert_into(reservations::table)
        .values((
            reservations::id.eq(uuid::Uuid::new_v4()),
            reservations::project_id.eq("proj-a"),
            reservations::flavor_name.eq("m1.small"),
            reservations::host_name.eq("host-a"),
            reservations::requested_vcpus.eq(20),
            reservations::requested_memory_mb.eq(0),
            reservations::phase.eq("active"),
            reservations::created_at.eq(Utc::now()),
            reservations::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .unwrap();

    let config = base_config(
        &harness.ctx,
        vec![step("capacity", "filter_has_enough_capacity")],
    );
    let runtime = Runtime::new(config).unwrap();

    // 60 effective vCPU / 10 per instance = 6 slots; a request for 6
    // fits, a request for 7 does not.
    let fits = runtime
        .decide(request(&["host-a"], 10, 1), &harness.ctx.pool, &harness.ctx.monitor)
        .await
        .unwrap();
    assert_eq!(fits.ordered_hosts, vec![HostName::from("host-a")]);

    let mut too_big = request(&["host-a"], 10, 1);
    too_big.spec.num_instances = 7;
    let rejected = runtime
        .decide(too_big, &harness.ctx.pool, &harness.ctx.monitor)
        .await
        .unwrap();
    assert!(rejected.ordered_hosts.is_empty());
    assert!(rejected.target_host.is_none());
}

/// Scenario 4 (§8) and `force_hosts` override: `filter_host_instructions`
/// narrows the scope to exactly the caller's forced host list, ignoring
/// every other candidate regardless of its other properties.
#[tokio::test]
async fn scenario_force_hosts_overrides_candidate_set() {
    let harness = TestHarness::new().await;
    let mut conn = harness.ctx.pool.conn().await.unwrap();
    seed_capabilities(&mut conn, &["host-a", "host-b", "host-c"]).await;

    let config = base_config(
        &harness.ctx,
        vec![step("force", "filter_host_instructions")],
    );
    let runtime = Runtime::new(config).unwrap();

    let mut req = request(&["host-a", "host-b", "host-c"], 1, 1);
    req.spec.force_hosts = vec![HostName::from("host-b")];

    let result = runtime.decide(req, &harness.ctx.pool, &harness.ctx.monitor).await.unwrap();
    assert_eq!(result.ordered_hosts, vec![HostName::from("host-b")]);
}

/// Invariant 7 (§8): the target host is `None` exactly when the
/// ordered list is empty.
#[tokio::test]
async fn empty_candidate_set_yields_null_target() {
    let harness = TestHarness::new().await;

    let config = base_config(&harness.ctx, vec![]);
    let runtime = Runtime::new(config).unwrap();

    let req = Request {
        hosts: vec![],
        weights: HashMap::new(),
        ..request(&["host-a"], 1, 1)
    };

    let result = runtime.decide(req, &harness.ctx.pool, &harness.ctx.monitor).await.unwrap();
    assert!(result.ordered_hosts.is_empty());
    assert!(result.target_host.is_none());
}

/// Scenario 2 (§8): all three per-resource weighers enabled; a fully
/// idle host gains the maximum per-resource contribution, a fully
/// loaded host none, and a host absent from the utilization table
/// contributes nothing either.
#[tokio::test]
async fn scenario_resource_balancing_sums_per_resource_contributions() {
    let harness = TestHarness::new().await;
    let mut conn = harness.ctx.pool.conn().await.unwrap();

    seed_capabilities(&mut conn, &["host1", "host2", "host3"]).await;
    HostUtilization::replace_all(
        vec![
            HostUtilization {
                host_name: "host1".into(),
                vcpus_total: 100,
                vcpus_used: 0,
                vcpu_percent: 0.0,
                mem_total_mb: 100,
                mem_used_mb: 0,
                mem_percent: 0.0,
                disk_total_gb: 100,
                disk_used_gb: 0,
                disk_percent: 0.0,
                computed_at: Utc::now(),
            },
            HostUtilization {
                host_name: "host2".into(),
                vcpus_total: 100,
                vcpus_used: 100,
                vcpu_percent: 100.0,
                mem_total_mb: 100,
                mem_used_mb: 100,
                mem_percent: 100.0,
                disk_total_gb: 100,
                disk_used_gb: 100,
                disk_percent: 100.0,
                computed_at: Utc::now(),
            },
        ],
        &mut conn,
    )
    .await
    .unwrap();

    let mut cpu_step = step("cpu_balance", "resource_balancing");
    cpu_step.opts = serde_json::json!({"resources": ["cpu"]});
    let mut ram_step = step("ram_balance", "resource_balancing");
    ram_step.opts = serde_json::json!({"resources": ["ram"]});
    let mut disk_step = step("disk_balance", "resource_balancing");
    disk_step.opts = serde_json::json!({"resources": ["disk"]});

    let config = base_config(&harness.ctx, vec![cpu_step, ram_step, disk_step]);
    let runtime = Runtime::new(config).unwrap();

    let req = request(&["host1", "host2", "host3"], 2, 2048);
    let result = runtime.decide(req, &harness.ctx.pool, &harness.ctx.monitor).await.unwrap();

    let out = &result.aggregated_out_weights;
    assert_eq!(out[&HostName::from("host1")], 3.0);
    assert_eq!(out[&HostName::from("host2")], 0.0);
    assert_eq!(out[&HostName::from("host3")], 0.0);
    assert_eq!(
        result.ordered_hosts,
        vec![HostName::from("host1"), HostName::from("host2"), HostName::from("host3")]
    );
}

/// Scenario 4 (§8): `filter_has_requested_traits` keeps only hosts
/// carrying every required trait.
#[tokio::test]
async fn scenario_required_trait_filter_keeps_only_matching_host() {
    let harness = TestHarness::new().await;
    let mut conn = harness.ctx.pool.conn().await.unwrap();

    HostCapabilities::replace_all(
        vec![
            HostCapabilities {
                host_name: "host1".into(),
                traits: serde_json::json!(["COMPUTE_ACCELERATORS", "CUSTOM_GPU_NVIDIA"]),
                cpu_info: serde_json::json!({}),
                hypervisor_type: "QEMU".into(),
                disabled: false,
                agent_down: false,
                computed_at: Utc::now(),
            },
            HostCapabilities {
                host_name: "host2".into(),
                traits: serde_json::json!(["COMPUTE_STATUS_ENABLED"]),
                cpu_info: serde_json::json!({}),
                hypervisor_type: "QEMU".into(),
                disabled: false,
                agent_down: false,
                computed_at: Utc::now(),
            },
        ],
        &mut conn,
    )
    .await
    .unwrap();

    let config = base_config(
        &harness.ctx,
        vec![step("required_traits", "filter_has_requested_traits")],
    );
    let runtime = Runtime::new(config).unwrap();

    let mut req = request(&["host1", "host2"], 1, 1);
    req.spec
        .flavor
        .extra_specs
        .insert("trait:COMPUTE_ACCELERATORS".to_string(), "required".to_string());

    let result = runtime.decide(req, &harness.ctx.pool, &harness.ctx.monitor).await.unwrap();
    assert_eq!(result.ordered_hosts, vec![HostName::from("host1")]);
}

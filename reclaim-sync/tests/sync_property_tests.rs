use proptest::prelude::*;
use reclaim_core::{Resource, Role};
use reclaim_sync::{
    CycleOutcome, LocalBus, PollerConfig, PollingConfig, RefreshOrchestrator, SyncConfig,
};
use reclaim_test_utils::{fixtures, generators};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

fn arb_poller_config() -> impl Strategy<Value = PollerConfig> {
    (1u64..60, 1u64..120, 1u64..120).prop_map(|(base, max, threshold)| {
        PollerConfig::new(Duration::from_secs(base))
            .with_max_interval(Duration::from_secs(max))
            .with_activity_threshold(Duration::from_secs(threshold))
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn next_interval_never_shrinks_below_base(
        config in arb_poller_config(),
        idle_ms in 0u64..600_000,
    ) {
        let idle = Duration::from_millis(idle_ms);
        let next = config.next_interval(idle);
        let backed_off = (config.base_interval * 3).min(config.max_interval);
        prop_assert!(
            next == config.base_interval
                || next == config.base_interval * 2
                || next == backed_off
        );
        if idle > config.activity_threshold {
            prop_assert!(next <= config.max_interval);
        }
    }

    #[test]
    fn hidden_view_never_refreshes(config in arb_poller_config(), idle_ms in 0u64..600_000) {
        prop_assert!(!config.should_invoke(Duration::from_millis(idle_ms), false));
    }

    #[test]
    fn cycle_touches_only_owned_resources(role in generators::arb_role()) {
        let gateway = Arc::new(fixtures::seeded_gateway());
        let orchestrator = RefreshOrchestrator::new(
            gateway.clone(),
            Arc::new(LocalBus::new().tab()),
            PollingConfig {
                refresh_on_start: false,
                ..PollingConfig::default()
            },
        );

        let outcome = runtime().block_on(async {
            orchestrator.set_identity(Some(fixtures::identity_for(role))).await;
            let outcome = orchestrator.refresh_all().await;
            orchestrator.shutdown().await;
            outcome
        });

        prop_assert_eq!(
            outcome,
            CycleOutcome::Completed { refreshed: role.resources().len(), failed: 0 }
        );
        for resource in Resource::ALL {
            let expected = usize::from(role.owns(resource));
            prop_assert_eq!(gateway.calls(resource), expected);
        }
    }
}

#[test]
fn config_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
api_base_url = "https://pickup.example.org"
request_timeout_ms = 8000
log_format = "json"

[auth]
username = "asha"
role = "admin"
bearer_token = "secret"

[polling]
admin_interval_ms = 12000
refresh_on_start = false

[cache]
enabled = false
"#
    )
    .unwrap();

    let config = SyncConfig::from_path(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.auth.role, Role::Admin);
    assert_eq!(config.polling.base_interval(Role::Admin), Duration::from_secs(12));
    assert_eq!(config.polling.base_interval(Role::User), Duration::from_secs(20));
    assert!(!config.polling.refresh_on_start);
    assert!(!config.cache.enabled);
    assert_eq!(config.cache.max_size, 100);
}

#[test]
fn config_missing_file_reports_path() {
    let err = SyncConfig::from_path(std::path::Path::new("/nonexistent/reclaim.toml")).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/reclaim.toml"));
}

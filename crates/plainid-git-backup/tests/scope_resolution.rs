mod common;

use plainid_git_backup::ErrorKind;
use plainid_git_backup::scope::{EnvSelector, ScopeSelector, resolve_scope};

use common::sample_tenant;

fn env(id: &str, workspaces: &[&str]) -> EnvSelector {
    EnvSelector {
        id: id.into(),
        workspaces: workspaces.iter().map(|s| s.to_string()).collect(),
        identities: None,
    }
}

#[test]
fn wildcard_environment_expands_to_every_live_environment() {
    let tenant = sample_tenant();
    let selector = ScopeSelector {
        environments: vec![env("*", &[])],
        identities: vec![],
    };
    let scope = resolve_scope(&selector, &tenant).expect("resolve");
    assert_eq!(
        scope.pairs(),
        vec![
            ("e1".to_string(), "w1".to_string()),
            ("e1".to_string(), "w2".to_string()),
            ("e2".to_string(), "w3".to_string()),
        ]
    );
    assert_eq!(scope.environments[0].name, "Prod");
    assert_eq!(scope.environments[0].workspaces[1].name, "Marketing");
    assert_eq!(scope.environments[0].identities, vec!["User", "Device"]);
    assert_eq!(scope.environments[1].identities, vec!["User"]);
}

#[test]
fn declared_scope_keeps_order_and_drops_unknown_ids() {
    let tenant = sample_tenant();
    let selector = ScopeSelector {
        environments: vec![
            env("e2", &["w3"]),
            env("missing", &["wx"]),
            env("e1", &["w2", "nope", "w2"]),
        ],
        identities: vec!["User".into(), "User".into()],
    };
    let scope = resolve_scope(&selector, &tenant).expect("resolve");
    assert_eq!(
        scope.pairs(),
        vec![
            ("e2".to_string(), "w3".to_string()),
            ("e1".to_string(), "w2".to_string()),
        ]
    );
    assert_eq!(scope.environments[1].identities, vec!["User"]);
    assert_eq!(tenant.calls_to("list_identities"), 0);
}

#[test]
fn workspace_wildcard_and_env_level_identities() {
    let tenant = sample_tenant();
    let selector = ScopeSelector {
        environments: vec![EnvSelector {
            id: "e1".into(),
            workspaces: vec!["*".into()],
            identities: Some(vec!["*".into()]),
        }],
        identities: vec!["Ignored".into()],
    };
    let scope = resolve_scope(&selector, &tenant).expect("resolve");
    let env = &scope.environments[0];
    assert_eq!(
        env.workspaces.iter().map(|w| w.id.as_str()).collect::<Vec<_>>(),
        vec!["w1", "w2"]
    );
    assert_eq!(env.identities, vec!["User", "Device"]);
    assert_eq!(tenant.calls_to("list_identities e1"), 1);
}

#[test]
fn scope_with_no_live_match_is_empty_not_an_error() {
    let tenant = sample_tenant();
    let selector = ScopeSelector {
        environments: vec![env("e1", &["gone"])],
        identities: vec![],
    };
    let scope = resolve_scope(&selector, &tenant).expect("resolve");
    assert!(scope.is_empty());
    assert!(scope.pairs().is_empty());
}

#[test]
fn inventory_failure_is_a_resolution_error() {
    let mut tenant = sample_tenant();
    tenant.fail_inventory = true;
    let selector = ScopeSelector {
        environments: vec![env("*", &[])],
        identities: vec![],
    };
    let err = resolve_scope(&selector, &tenant).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Resolution);
    assert!(err.to_string().contains("503"), "{err}");
}

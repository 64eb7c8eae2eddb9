//! Pipeline tests against a recording applier.
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use rover::{NetConf, Reconciler};
use rover_common::{Interface, Route, RoutePlan, RoverError, RoverResult};
use rover_network::{ApplyReport, RouteApplier, RouteFailure, RouteOp};

/// Records every plan and answers with a canned outcome.
#[derive(Default)]
struct RecordingApplier {
    calls: RefCell<Vec<(PathBuf, Vec<Interface>, RoutePlan)>>,
    failing_adds: Vec<Route>,
    namespace_error: bool,
}

impl RecordingApplier {
    fn check_namespace(&self, netns: &Path) -> RoverResult<()> {
        if self.namespace_error {
            return Err(RoverError::Namespace {
                path: netns.display().to_string(),
                message: "failed to open: No such file or directory".to_string(),
            });
        }
        Ok(())
    }
}

impl RouteApplier for &RecordingApplier {
    fn open_namespace(&self, netns: &Path) -> RoverResult<()> {
        self.check_namespace(netns)
    }

    fn apply(
        &self,
        netns: &Path,
        interfaces: &[Interface],
        plan: &RoutePlan,
    ) -> RoverResult<ApplyReport> {
        self.check_namespace(netns)?;
        self.calls
            .borrow_mut()
            .push((netns.to_path_buf(), interfaces.to_vec(), plan.clone()));

        let mut report = ApplyReport::default();
        for route in &plan.to_add {
            if self.failing_adds.contains(route) {
                report.failures.push(RouteFailure {
                    op: RouteOp::Add,
                    target: route.to_string(),
                    message: "Network is unreachable".to_string(),
                });
            } else {
                report.added.push(route.clone());
            }
        }
        Ok(report)
    }

    fn verify(&self, netns: &Path, interfaces: &[Interface], plan: &RoutePlan) -> RoverResult<()> {
        self.calls
            .borrow_mut()
            .push((netns.to_path_buf(), interfaces.to_vec(), plan.clone()));
        Ok(())
    }
}

const NETNS: &str = "/var/run/netns/test";

fn conf(extra: &str) -> NetConf {
    let json = format!(
        r#"{{
            "name": "test",
            "type": "route-overwrite",
            "cniVersion": "0.3.1",
            {extra}
            "prevResult": {{
                "interfaces": [{{"name": "dummy0", "sandbox": "netns"}}],
                "ips": [{{"version": "4", "address": "10.0.0.2/24", "gateway": "10.0.0.1", "interface": 0}}],
                "routes": [
                    {{"dst": "0.0.0.0/0", "gw": "10.0.0.1"}},
                    {{"dst": "30.0.0.0/24"}},
                    {{"dst": "20.0.0.0/24", "gw": "10.0.0.254"}}
                ]
            }}
        }}"#
    );
    NetConf::from_slice(json.as_bytes()).unwrap()
}

fn routes(list: &[&str]) -> Vec<Route> {
    list.iter().map(|r| r.parse().unwrap()).collect()
}

#[test]
fn passes_prev_result_through_unchanged() {
    let applier = RecordingApplier::default();
    let result = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf(""))
        .unwrap();

    assert_eq!(result.interfaces.len(), 1);
    assert_eq!(result.interfaces[0].name, "dummy0");
    assert_eq!(result.ips[0].address.to_string(), "10.0.0.2/24");
    assert_eq!(result.ips[0].gateway, Some("10.0.0.1".parse().unwrap()));
    assert_eq!(
        result.routes,
        routes(&["0.0.0.0/0 via 10.0.0.1", "30.0.0.0/24", "20.0.0.0/24 via 10.0.0.254"])
    );
    assert!(applier.calls.borrow().is_empty());
}

#[test]
fn flushroutes_clears_all_routes() {
    let applier = RecordingApplier::default();
    let result = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf(r#""flushroutes": true,"#))
        .unwrap();

    assert!(result.routes.is_empty());
    let calls = applier.calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, PathBuf::from(NETNS));
    assert!(calls[0].2.flush_routes);
}

#[test]
fn flushgateway_clears_default_and_ip_gateways() {
    let applier = RecordingApplier::default();
    let result = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf(r#""flushgateway": true,"#))
        .unwrap();

    assert_eq!(
        result.routes,
        routes(&["30.0.0.0/24", "20.0.0.0/24 via 10.0.0.254"])
    );
    assert_eq!(result.ips[0].gateway, Some("0.0.0.0".parse().unwrap()));

    let calls = applier.calls.borrow();
    let plan = &calls[0].2;
    assert!(plan.flush_gateway);
    assert!(plan.to_delete.iter().any(Route::is_default));
}

#[test]
fn delroutes_then_addroutes() {
    let applier = RecordingApplier::default();
    let result = Reconciler::new(&applier)
        .run(
            Path::new(NETNS),
            &conf(
                r#""delroutes": [{"dst": "0.0.0.0/0"}, {"dst": "20.0.0.0/24"}],
                   "addroutes": [{"dst": "0.0.0.0/0", "gw": "10.0.0.254"}, {"dst": "20.0.0.0/24"}],"#,
            ),
        )
        .unwrap();

    assert_eq!(
        result.routes,
        routes(&["30.0.0.0/24", "0.0.0.0/0 via 10.0.0.254", "20.0.0.0/24"])
    );
    assert_eq!(result.cni_version.as_deref(), Some("0.3.1"));

    let calls = applier.calls.borrow();
    assert_eq!(calls[0].1[0].name, "dummy0");
    assert_eq!(
        calls[0].2.to_add,
        routes(&["0.0.0.0/0 via 10.0.0.254", "20.0.0.0/24"])
    );
}

#[test]
fn args_override_config() {
    let applier = RecordingApplier::default();
    let result = Reconciler::new(&applier)
        .run(
            Path::new(NETNS),
            &conf(
                r#""flushroutes": true,
                   "delroutes": [{"dst": "30.0.0.0/24"}],
                   "args": {"cni": {"flushroutes": false, "addroutes": [{"dst": "40.0.0.0/24"}]}},"#,
            ),
        )
        .unwrap();

    assert_eq!(
        result.routes,
        routes(&["0.0.0.0/0 via 10.0.0.1", "20.0.0.0/24 via 10.0.0.254", "40.0.0.0/24"])
    );
}

#[test_log::test]
fn failed_add_is_fatal() {
    let applier = RecordingApplier {
        failing_adds: routes(&["40.0.0.0/24"]),
        ..Default::default()
    };
    let err = Reconciler::new(&applier)
        .run(
            Path::new(NETNS),
            &conf(r#""addroutes": [{"dst": "50.0.0.0/24"}, {"dst": "40.0.0.0/24"}],"#),
        )
        .unwrap_err();

    match err {
        RoverError::RouteOperation {
            operation, route, ..
        } => {
            assert_eq!(operation, "add");
            assert_eq!(route, "40.0.0.0/24");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test_log::test]
fn namespace_error_yields_no_result() {
    let applier = RecordingApplier {
        namespace_error: true,
        ..Default::default()
    };
    let err = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf(r#""flushgateway": true,"#))
        .unwrap_err();

    assert!(matches!(err, RoverError::Namespace { .. }));
    assert!(err.is_pre_mutation());
}

#[test_log::test]
fn unchanged_routes_still_require_namespace() {
    let applier = RecordingApplier {
        namespace_error: true,
        ..Default::default()
    };
    let err = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf(r#""delroutes": [{"dst": "99.0.0.0/24"}],"#))
        .unwrap_err();

    assert!(matches!(err, RoverError::Namespace { .. }));
    assert!(applier.calls.borrow().is_empty());
}

#[test]
fn missing_prev_result_is_config_error() {
    let applier = RecordingApplier::default();
    let conf = NetConf::from_slice(br#"{"cniVersion": "0.3.1", "flushroutes": true}"#).unwrap();
    let err = Reconciler::new(&applier)
        .run(Path::new(NETNS), &conf)
        .unwrap_err();

    assert!(matches!(err, RoverError::Config { .. }));
    assert!(applier.calls.borrow().is_empty());
}

#[test]
fn check_verifies_same_plan() {
    let applier = RecordingApplier::default();
    let conf = conf(r#""addroutes": [{"dst": "40.0.0.0/24"}],"#);
    Reconciler::new(&applier).check(Path::new(NETNS), &conf).unwrap();

    let calls = applier.calls.borrow();
    assert_eq!(calls[0].2, Reconciler::<&RecordingApplier>::plan(&conf).unwrap());
}

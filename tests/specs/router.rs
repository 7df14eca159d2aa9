//! Spec: the intent router's published behavior on the canonical
//! phrasings.

use cdx_core::route::{route, RouteDecision, SELECT_CONFIDENCE};

#[test]
fn cloudy_run_request_selects_cloud_submit() {
    match route("run the full test suite in the cloud") {
        RouteDecision::Selected(m) => {
            assert_eq!(m.primitive, "cloud_submit");
            assert!(m.confidence >= SELECT_CONFIDENCE, "confidence {}", m.confidence);
        }
        RouteDecision::Ambiguous { candidates } => {
            panic!("expected a selection, got {candidates:?}")
        }
    }
}

#[test]
fn bare_status_check_disambiguates() {
    match route("check the status") {
        RouteDecision::Ambiguous { candidates } => {
            assert!(candidates.len() >= 2, "{candidates:?}");
        }
        RouteDecision::Selected(m) => panic!("expected disambiguation, got {m:?}"),
    }
}

#[test]
fn task_id_literal_pins_the_origin() {
    match route("cancel T-cloud-0abc12") {
        RouteDecision::Selected(m) => {
            assert_eq!(m.primitive, "cloud_cancel");
            assert_eq!(m.task_id.as_deref(), Some("T-cloud-0abc12"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

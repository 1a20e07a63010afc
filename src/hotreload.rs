//! Hot-reload coordinator (spec §4.11): reapplies breakpoints after a
//! source file changes underneath a running debuggee and invalidates
//! whatever frame/variable state referred to the old code.
//!
//! There's no direct precedent in the teacher (BugStalker debugs a
//! compiled binary; there's nothing to hot-reload), so this is built
//! straight from spec §4.11's four-step sequence, reusing
//! [`Session::invalidate_all_frames`] the same way resume-time cleanup
//! does and [`Backend::set_breakpoints`] the same way `setBreakpoints`
//! does.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;

use crate::backend::Backend;
use crate::error::DispatchError;
use crate::message::Event;
use crate::session::Session;

/// `hotReload`'s `options` object (spec §4.11). Each flag gates one of
/// the coordinator's four steps; a client that omits `options`
/// entirely gets every step (see [`HotReloadOptions::default`]).
#[derive(Debug, Clone, Copy)]
pub struct HotReloadOptions {
    pub rebind_frame_locals: bool,
    pub update_frame_code: bool,
    pub patch_class_instances: bool,
    pub invalidate_pycache: bool,
}

impl Default for HotReloadOptions {
    fn default() -> Self {
        HotReloadOptions {
            rebind_frame_locals: true,
            update_frame_code: true,
            patch_class_instances: true,
            invalidate_pycache: true,
        }
    }
}

pub struct HotReloadCoordinator {
    session: Arc<Session>,
    backend: Arc<dyn Backend>,
}

impl HotReloadCoordinator {
    pub fn new(session: Arc<Session>, backend: Arc<dyn Backend>) -> Self {
        HotReloadCoordinator { session, backend }
    }

    /// `hotReload(path, options)`: reapplies the path's breakpoints,
    /// invalidates cached frames/variable refs, and reports timing and
    /// counters in `hotReloadResult` (spec §4.11). Failures from the
    /// backend become a failed response (`success=false`, a
    /// human-readable `message`); success without rebinding is reported
    /// truthfully, with counters left at zero.
    pub fn reload(&self, path: &str, options: HotReloadOptions) -> Result<Vec<Event>, DispatchError> {
        let started = Instant::now();
        let lines: Vec<i64> = self
            .session
            .with_breakpoints(|registry| registry.line_breakpoints(path).iter().map(|bp| bp.line).collect());

        let outcome = self.backend.set_breakpoints(path, lines);

        let mut rebound_frames = 0;
        let mut updated_frame_codes = 0;
        if outcome.is_ok() && options.rebind_frame_locals {
            rebound_frames = self.session.invalidate_all_frames();
            if options.update_frame_code {
                updated_frame_codes = rebound_frames;
            }
        }

        let mut warnings = Vec::new();
        if options.patch_class_instances {
            warnings.push("class instance patching is not supported by this backend".to_string());
        }
        if options.invalidate_pycache {
            warnings.push("pycache invalidation is a no-op outside a CPython backend".to_string());
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let mut events = vec![Event::new(
            "loadedSource",
            Some(json!({"reason": "changed", "source": {"path": path}})),
        )];
        events.push(Event::new(
            "hotReloadResult",
            Some(json!({
                "path": path,
                "success": outcome.is_ok(),
                "message": outcome.as_ref().err().map(ToString::to_string),
                "reboundFrames": rebound_frames,
                "updatedFrameCodes": updated_frame_codes,
                "patchedInstances": 0,
                "warnings": warnings,
                "durationMs": duration_ms,
            })),
        ));
        outcome?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::inprocess::InProcessBackend;
    use crate::backend::toy::ToyBackend;
    use crate::backend::LaunchConfig;

    #[test]
    fn reload_reapplies_breakpoints_and_clears_frames() {
        let session = Arc::new(Session::new());
        let backend: Arc<dyn Backend> = Arc::new(InProcessBackend::new(ToyBackend::new()));
        backend
            .launch(LaunchConfig {
                program: "toy.prog".into(),
                args: vec!["x = 1".into(), "x = x + 1".into()],
                stop_on_entry: true,
            })
            .unwrap();
        session.set_frames(1, vec![("main".into(), "toy.prog".into(), 1, 0)]);
        session.with_breakpoints(|reg| {
            reg.set_line_breakpoints(
                "toy.prog",
                vec![crate::session::breakpoints::LineBreakpointSpec {
                    line: 2,
                    condition: None,
                    hit_condition: None,
                    log_message: None,
                }],
            )
        });

        let coordinator = HotReloadCoordinator::new(session.clone(), backend);
        let events = coordinator.reload("toy.prog", HotReloadOptions::default()).unwrap();
        assert_eq!(events[0].event, "loadedSource");
        assert_eq!(events[1].event, "hotReloadResult");
        let body = events[1].body.as_ref().unwrap();
        assert_eq!(body["reboundFrames"], 1);
        assert_eq!(body["updatedFrameCodes"], 1);
        assert_eq!(body["patchedInstances"], 0);
        assert!(!body["warnings"].as_array().unwrap().is_empty());
        assert!(body["durationMs"].as_f64().unwrap() >= 0.0);
        assert!(session.frames(1).is_empty());
    }

    #[test]
    fn reload_without_rebind_frame_locals_leaves_frames_cached() {
        let session = Arc::new(Session::new());
        let backend: Arc<dyn Backend> = Arc::new(InProcessBackend::new(ToyBackend::new()));
        backend
            .launch(LaunchConfig {
                program: "toy.prog".into(),
                args: vec!["x = 1".into()],
                stop_on_entry: true,
            })
            .unwrap();
        session.set_frames(1, vec![("main".into(), "toy.prog".into(), 1, 0)]);

        let coordinator = HotReloadCoordinator::new(session.clone(), backend);
        let options = HotReloadOptions {
            rebind_frame_locals: false,
            update_frame_code: false,
            patch_class_instances: false,
            invalidate_pycache: false,
        };
        let events = coordinator.reload("toy.prog", options).unwrap();
        let body = events[1].body.as_ref().unwrap();
        assert_eq!(body["reboundFrames"], 0);
        assert_eq!(body["updatedFrameCodes"], 0);
        assert!(body["warnings"].as_array().unwrap().is_empty());
        assert!(!session.frames(1).is_empty());
    }
}

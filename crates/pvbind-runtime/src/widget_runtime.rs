#![forbid(unsafe_code)]

//! The live counterpart of one widget.
//!
//! A [`WidgetRuntime`] is built by the [`RuntimeRegistry`] from a small set
//! of [`RuntimeCapability`] values chosen by widget kind. Every runtime also
//! gets two generic behaviors:
//!
//! - **Primary PV**: a widget with both `pv_name` and `pv_value` gets a
//!   read-only [`NameBinding<PvValue>`] tracked as needing write access.
//! - **Write actions**: each [`ActionInfo::WritePv`] target is acquired and
//!   tracked as needing write access, so the widget's writable signal
//!   reflects it.
//!
//! # State Machine
//!
//! ```text
//! Created --initialize--> Initialized --start--> Started --stop--> Stopped
//! ```
//!
//! Every other call is a [`RuntimeError::InvalidTransition`]. A stopped
//! runtime is never restarted; the orchestrator creates a fresh one.
//!
//! # Ordering
//!
//! `start` sets up the primary binding and write PVs, then starts the
//! capabilities in order; `stop` stops capabilities in reverse order, then
//! releases the write PVs and the primary binding. Container kinds list the
//! children capability last, so children start after, and stop before, their
//! parent's own resources.
//!
//! # Failure Modes
//!
//! A capability that fails or panics is logged at `warn` and does not keep
//! the other capabilities from starting or stopping.
//!
//! [`RuntimeRegistry`]: crate::registry::RuntimeRegistry

use std::fmt;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use parking_lot::Mutex;
use pvbind_core::keys::{ACTIONS, PV_NAME, PV_VALUE};
use pvbind_core::{ActionInfo, PvHandle, PvValue, Widget, local_base_name};

use crate::action::RuntimeAction;
use crate::binding::{BindingContext, BindingOptions, NameBinding};
use crate::context::{RuntimeContext, RuntimeView};
use crate::error::{Result, RuntimeError};
use crate::isolate::isolate;
use crate::tracker::ConnectionTracker;

/// Lifecycle state of a [`WidgetRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    Created,
    Initialized,
    Started,
    Stopped,
}

impl RuntimeState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// What a capability can reach of its runtime.
#[derive(Clone, Debug)]
pub struct RuntimeScope {
    widget: Arc<Widget>,
    binding: BindingContext,
    context: RuntimeContext,
}

impl RuntimeScope {
    #[must_use]
    pub fn widget(&self) -> &Arc<Widget> {
        &self.widget
    }

    /// Pool, tracker, clock, and config for bindings of this widget.
    #[must_use]
    pub fn binding(&self) -> &BindingContext {
        &self.binding
    }

    /// Shared services, used to create child runtimes.
    #[must_use]
    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }
}

/// One composable piece of widget runtime behavior.
///
/// Implementations keep their own state behind interior mutability; the
/// runtime guarantees `start` and `stop` are each called at most once, in
/// that order.
pub trait RuntimeCapability: Send + Sync {
    /// Short name used in log records.
    fn name(&self) -> &'static str;

    /// Actions available without a live connection. Called by `initialize`.
    fn actions(&self, _scope: &RuntimeScope) -> Vec<RuntimeAction> {
        Vec::new()
    }

    /// Acquire PVs and install bindings.
    ///
    /// # Errors
    ///
    /// A failure is logged by the runtime; other capabilities still start.
    fn start(&self, scope: &RuntimeScope) -> Result<()>;

    /// Release everything `start` acquired.
    fn stop(&self, scope: &RuntimeScope);
}

// ---------------------------------------------------------------------------
// WidgetRuntime
// ---------------------------------------------------------------------------

/// Runtime of one widget.
pub struct WidgetRuntime {
    scope: RuntimeScope,
    state: Mutex<RuntimeState>,
    capabilities: Vec<Box<dyn RuntimeCapability>>,
    actions: ArcSwap<Vec<RuntimeAction>>,
    primary: ArcSwapOption<NameBinding<PvValue>>,
    write_pvs: ArcSwap<Vec<PvHandle>>,
}

impl WidgetRuntime {
    /// Runtime for `widget` in the `Created` state.
    #[must_use]
    pub fn new(
        context: &RuntimeContext,
        widget: Arc<Widget>,
        capabilities: Vec<Box<dyn RuntimeCapability>>,
    ) -> Arc<Self> {
        let binding = BindingContext {
            pool: context.pool().clone(),
            tracker: ConnectionTracker::for_widget(&widget),
            clock: context.clock().clone(),
            config: context.config().clone(),
            label: Arc::from(widget.to_string()),
        };
        Arc::new(Self {
            scope: RuntimeScope {
                widget,
                binding,
                context: context.clone(),
            },
            state: Mutex::new(RuntimeState::Created),
            capabilities,
            actions: ArcSwap::from_pointee(Vec::new()),
            primary: ArcSwapOption::empty(),
            write_pvs: ArcSwap::from_pointee(Vec::new()),
        })
    }

    #[must_use]
    pub fn widget(&self) -> &Arc<Widget> {
        &self.scope.widget
    }

    #[must_use]
    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    #[must_use]
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.scope.binding.tracker
    }

    /// Names of the capabilities, in start order.
    #[must_use]
    pub fn capability_names(&self) -> Vec<&'static str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    fn transition(
        &self,
        from: RuntimeState,
        to: RuntimeState,
        operation: &'static str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if *state != from {
            return Err(RuntimeError::InvalidTransition {
                widget: self.scope.widget.id(),
                state: state.as_str(),
                operation,
            });
        }
        *state = to;
        Ok(())
    }

    /// Bind to the widget and collect connection-independent actions.
    ///
    /// Acquires no PVs.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidTransition`] unless `Created`.
    pub fn initialize(&self) -> Result<()> {
        self.transition(RuntimeState::Created, RuntimeState::Initialized, "initialize")?;
        let actions: Vec<RuntimeAction> = self
            .capabilities
            .iter()
            .flat_map(|capability| capability.actions(&self.scope))
            .collect();
        self.actions.store(Arc::new(actions));
        Ok(())
    }

    /// Acquire PVs, install bindings, and start capabilities in order.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidTransition`] unless `Initialized`. Capability
    /// failures are logged, not returned.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        self.transition(RuntimeState::Initialized, RuntimeState::Started, "start")?;
        let widget = &self.scope.widget;
        tracing::debug!(widget = %widget, "starting runtime");

        self.start_primary();
        self.start_write_pvs();
        for capability in &self.capabilities {
            if let Err(err) = isolate(widget.id(), "start", || capability.start(&self.scope)) {
                tracing::warn!(widget = %widget, capability = capability.name(), %err, "capability failed to start");
            }
        }
        self.scope.context.register_live(self);
        Ok(())
    }

    /// Stop capabilities in reverse order, then release this widget's PVs.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::InvalidTransition`] unless `Started`.
    pub fn stop(&self) -> Result<()> {
        self.transition(RuntimeState::Started, RuntimeState::Stopped, "stop")?;
        let widget = &self.scope.widget;

        for capability in self.capabilities.iter().rev() {
            let result = isolate(widget.id(), "stop", || {
                capability.stop(&self.scope);
                Ok(())
            });
            if let Err(err) = result {
                tracing::warn!(widget = %widget, capability = capability.name(), %err, "capability failed to stop");
            }
        }
        self.stop_write_pvs();
        if let Some(primary) = self.primary.swap(None) {
            primary.dispose();
        }
        self.scope.context.unregister_live(widget.id());

        let remaining = self.tracker().pvs();
        if !remaining.is_empty() && self.scope.binding.config.warn_unreleased_pvs {
            let names: Vec<&str> = remaining.iter().map(PvHandle::name).collect();
            tracing::error!(widget = %widget, pvs = ?names, "runtime stopped with unreleased PVs");
        }
        tracing::debug!(widget = %widget, "stopped runtime");
        Ok(())
    }

    fn start_primary(&self) {
        let widget = &self.scope.widget;
        let (Some(name), Some(value)) = (widget.property(PV_NAME), widget.property(PV_VALUE))
        else {
            return;
        };
        let binding = NameBinding::new(
            self.scope.binding.clone(),
            name,
            value,
            BindingOptions::read_only().with_write_access(true),
        );
        self.primary.store(Some(Arc::new(binding)));
    }

    fn start_write_pvs(&self) {
        let Some(actions) = self.scope.widget.property(ACTIONS) else {
            return;
        };
        let cx = &self.scope.binding;
        let mut handles = Vec::new();
        for action in actions.get() {
            let Some(name) = action.pv_name() else {
                continue;
            };
            match cx.pool.acquire(name) {
                Ok(handle) => {
                    cx.tracker.add_pv(&handle, true);
                    handles.push(handle);
                }
                Err(err) => {
                    tracing::warn!(widget = %self.scope.widget, pv = name, %err, "cannot acquire action PV");
                }
            }
        }
        self.write_pvs.store(Arc::new(handles));
    }

    fn stop_write_pvs(&self) {
        let cx = &self.scope.binding;
        let handles = self.write_pvs.swap(Arc::new(Vec::new()));
        for handle in handles.iter() {
            if let Err(err) = cx.tracker.remove_pv(handle) {
                tracing::error!(widget = %self.scope.widget, pv = %handle, %err, "action PV was not tracked");
            }
            if let Err(err) = cx.pool.release(handle) {
                tracing::error!(widget = %self.scope.widget, pv = %handle, %err, "cannot release action PV");
            }
        }
    }

    /// Actions collected by [`initialize`](Self::initialize).
    #[must_use]
    pub fn runtime_actions(&self) -> Vec<RuntimeAction> {
        self.actions.load().as_ref().clone()
    }

    /// PV of the primary binding.
    #[must_use]
    pub fn primary_pv(&self) -> Option<PvHandle> {
        self.primary.load().as_ref().and_then(|binding| binding.pv())
    }

    /// Write to the primary PV.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::NoPrimaryPv`] without a bound primary PV; PV write
    /// errors otherwise.
    pub fn write_primary_pv(&self, value: PvValue) -> Result<()> {
        let pv = self.primary_pv().ok_or(RuntimeError::NoPrimaryPv {
            widget: self.scope.widget.id(),
        })?;
        pv.write(value)?;
        Ok(())
    }

    /// Write to one of the write-action PVs.
    ///
    /// Names are compared without a local PV's type or initializer suffix,
    /// so `loc://x(3)` addresses `loc://x`.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::UnknownPv`] when no write action targets `name`; PV
    /// write errors otherwise.
    pub fn write_pv(&self, name: &str, value: PvValue) -> Result<()> {
        let wanted = local_base_name(name.trim());
        let handles = self.write_pvs.load();
        let pv = handles
            .iter()
            .find(|handle| local_base_name(handle.name()) == wanted)
            .ok_or_else(|| RuntimeError::UnknownPv {
                widget: self.scope.widget.id(),
                name: name.to_owned(),
            })?;
        tracing::debug!(widget = %self.scope.widget, pv = %pv, %value, "writing action PV");
        pv.write(value)?;
        Ok(())
    }

    /// Trigger a model-level write action.
    ///
    /// # Errors
    ///
    /// As [`write_pv`](Self::write_pv); actions that write no PV are a no-op.
    pub fn run_action(&self, action: &ActionInfo) -> Result<()> {
        match action {
            ActionInfo::WritePv { pv_name, value, .. } => {
                self.write_pv(pv_name, PvValue::Text(value.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Every PV currently tracked for this widget.
    #[must_use]
    pub fn pvs(&self) -> Vec<PvHandle> {
        self.tracker().pvs()
    }

    /// Snapshot for hosts and diagnostics.
    #[must_use]
    pub fn view(&self) -> RuntimeView {
        let mut pvs: Vec<String> = self.pvs().iter().map(|pv| pv.name().to_owned()).collect();
        pvs.sort();
        let mut disconnected_pvs: Vec<String> = self
            .tracker()
            .disconnected_pvs()
            .iter()
            .map(|pv| pv.name().to_owned())
            .collect();
        disconnected_pvs.sort();
        let widget = &self.scope.widget;
        RuntimeView {
            widget: widget.id(),
            kind: widget.kind().to_owned(),
            name: widget.name().to_owned(),
            state: self.state(),
            pvs,
            disconnected_pvs,
            actions: self
                .actions
                .load()
                .iter()
                .map(|a| a.label().to_owned())
                .collect(),
        }
    }
}

impl Drop for WidgetRuntime {
    fn drop(&mut self) {
        if self.state() == RuntimeState::Started {
            tracing::warn!(widget = %self.scope.widget, "runtime dropped while started");
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for WidgetRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetRuntime")
            .field("widget", &self.scope.widget.to_string())
            .field("state", &self.state())
            .field("capabilities", &self.capability_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvbind_core::PvSource;
    use pvbind_core::keys::{CONNECTED, PV_WRITABLE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        started: Arc<AtomicUsize>,
        stopped: Arc<AtomicUsize>,
        fail: bool,
    }

    impl RuntimeCapability for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn actions(&self, _scope: &RuntimeScope) -> Vec<RuntimeAction> {
            vec![RuntimeAction::new("Count", "count", || {})]
        }

        fn start(&self, _scope: &RuntimeScope) -> Result<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                panic!("capability exploded");
            }
            Ok(())
        }

        fn stop(&self, _scope: &RuntimeScope) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(fail: bool) -> (Box<dyn RuntimeCapability>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicUsize::new(0));
        let capability = Box::new(Counting {
            started: started.clone(),
            stopped: stopped.clone(),
            fail,
        });
        (capability, started, stopped)
    }

    fn text_update(pv: &str) -> Arc<Widget> {
        Widget::builder("textupdate")
            .name("readback")
            .with(PV_NAME, pv.to_owned())
            .with(PV_VALUE, PvValue::Disconnected)
            .with(CONNECTED, false)
            .with(PV_WRITABLE, false)
            .build()
    }

    #[test]
    fn transitions_are_enforced() {
        let cx = RuntimeContext::default();
        let runtime = WidgetRuntime::new(&cx, Widget::builder("label").build(), Vec::new());
        assert!(matches!(
            runtime.start(),
            Err(RuntimeError::InvalidTransition { state: "created", operation: "start", .. })
        ));
        runtime.initialize().expect("initialize");
        assert!(runtime.initialize().is_err());
        runtime.start().expect("start");
        assert!(runtime.start().is_err());
        runtime.stop().expect("stop");
        assert!(matches!(
            runtime.stop(),
            Err(RuntimeError::InvalidTransition { state: "stopped", .. })
        ));
        assert_eq!(runtime.state(), RuntimeState::Stopped);
    }

    #[test]
    fn primary_binding_follows_pv() {
        let cx = RuntimeContext::default();
        let widget = text_update("loc://temp(21.5)");
        let runtime = WidgetRuntime::new(&cx, widget.clone(), Vec::new());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");

        let value = widget.property(PV_VALUE).expect("pv_value");
        assert_eq!(value.get(), PvValue::Double(21.5));
        assert!(widget.property(CONNECTED).expect("connected").get());
        assert!(widget.property(PV_WRITABLE).expect("writable").get());

        runtime.write_primary_pv(PvValue::Double(3.0)).expect("write");
        assert_eq!(value.get(), PvValue::Double(3.0));

        runtime.stop().expect("stop");
        assert!(cx.pool().is_empty());
        assert!(runtime.primary_pv().is_none());
    }

    #[test]
    fn write_primary_without_primary_fails() {
        let cx = RuntimeContext::default();
        let widget = Widget::builder("label").build();
        let runtime = WidgetRuntime::new(&cx, widget.clone(), Vec::new());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        assert_eq!(
            runtime.write_primary_pv(PvValue::Long(1)),
            Err(RuntimeError::NoPrimaryPv { widget: widget.id() })
        );
        runtime.stop().expect("stop");
    }

    #[test]
    fn write_actions_are_tracked_and_writable() {
        let cx = RuntimeContext::default();
        let widget = Widget::builder("button")
            .with(ACTIONS, vec![ActionInfo::write_pv("loc://reset(0)", "1")])
            .with(PV_WRITABLE, false)
            .build();
        let runtime = WidgetRuntime::new(&cx, widget.clone(), Vec::new());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        assert_eq!(runtime.pvs().len(), 1);
        assert!(widget.property(PV_WRITABLE).expect("writable").get());

        runtime.write_pv("loc://reset", PvValue::Long(1)).expect("write");
        let reset = cx.pool().local().get("loc://reset").expect("local");
        assert_eq!(reset.read(), PvValue::Long(1));

        runtime
            .run_action(&ActionInfo::write_pv("loc://reset(0)", "2"))
            .expect("run action");
        assert_eq!(reset.read(), PvValue::Text("2".into()));

        assert!(matches!(
            runtime.write_pv("loc://other", PvValue::Long(1)),
            Err(RuntimeError::UnknownPv { .. })
        ));
        runtime.stop().expect("stop");
        assert!(cx.pool().is_empty());
    }

    #[test]
    fn capabilities_run_once_and_failures_are_contained() {
        let cx = RuntimeContext::default();
        let (bad, bad_started, bad_stopped) = counting(true);
        let (good, good_started, good_stopped) = counting(false);
        let runtime = WidgetRuntime::new(&cx, Widget::builder("label").build(), vec![bad, good]);
        runtime.initialize().expect("initialize");
        assert_eq!(runtime.runtime_actions().len(), 2);
        runtime.start().expect("start despite capability panic");
        runtime.stop().expect("stop");
        assert_eq!(bad_started.load(Ordering::SeqCst), 1);
        assert_eq!(good_started.load(Ordering::SeqCst), 1);
        assert_eq!(bad_stopped.load(Ordering::SeqCst), 1);
        assert_eq!(good_stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_a_started_runtime_stops_it() {
        let cx = RuntimeContext::default();
        let runtime = WidgetRuntime::new(&cx, text_update("loc://temp"), Vec::new());
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        assert_eq!(cx.pool().len(), 1);
        drop(runtime);
        assert!(cx.pool().is_empty());
    }

    #[test]
    fn view_lists_pvs_and_actions() {
        let cx = RuntimeContext::default();
        let (capability, _, _) = counting(false);
        let runtime = WidgetRuntime::new(&cx, text_update("loc://b"), vec![capability]);
        runtime.initialize().expect("initialize");
        runtime.start().expect("start");
        let view = runtime.view();
        assert_eq!(view.pvs, vec!["loc://b".to_owned()]);
        assert!(view.disconnected_pvs.is_empty());
        assert_eq!(view.actions, vec!["Count".to_owned()]);
        runtime.stop().expect("stop");
    }
}

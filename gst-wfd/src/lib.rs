// SPDX-FileCopyrightText: 2026 Contributors to the wfd-session project.
// SPDX-License-Identifier: Apache-2.0

//! GStreamer runtime for Wi-Fi Display sessions.
//!
//! [`GstRuntime`] implements [`wfd::PipelineRuntime`] on top of GStreamer so a
//! [`wfd::Session`] can build and drive real pipelines.
//!
//! ## GStreamer Concepts (for non-GStreamer developers)
//! - **Element**: A processing unit in a pipeline (source, filter, or sink)
//! - **Bin**: An element containing other elements; a pipeline is the root bin
//! - **Pad**: An element's input or output. *Sometimes* pads, such as a
//!   demuxer's outputs, appear only once data has been inspected
//! - **Bus**: Where elements post messages (state changes, errors, custom
//!   element messages) for the application
//!
//! ## Bus delivery
//!
//! Each watched pipeline gets a thread that pops its bus and forwards the
//! messages the session cares about. Session commands change pipeline states
//! while holding the session's command lock; delivering the resulting
//! messages from another thread keeps them from re-entering that lock.
//! Unwatching flags the thread and wakes it without waiting for it, since
//! the thread may itself be waiting for the command that unwatches it.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gstwfd::GstRuntime;
//! use wfd::{Role, Session, SessionConfig};
//!
//! # fn main() -> Result<(), wfd::Error> {
//! let runtime = Arc::new(GstRuntime::new()?);
//! let session = Session::new(runtime, Role::Sink, SessionConfig::default());
//! session.create()?;
//! session.prepare()?;
//! session.connect()?;
//! # Ok(())
//! # }
//! ```
//!
//! Set `GST_DEBUG=wfd:5` to see this crate's GStreamer logs.

mod bus;

use std::{
    collections::HashMap,
    sync::{
        Arc, LazyLock, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use gst::prelude::*;
use gstreamer as gst;

use wfd::{
    BusCallback, Error, PadAddedCallback, PipelineRuntime, PipelineState, Result, StateChange,
};

/// GStreamer debug category for this crate.
pub(crate) static CAT: LazyLock<gst::DebugCategory> = LazyLock::new(|| {
    gst::DebugCategory::new(
        "wfd",
        gst::DebugColorFlags::empty(),
        Some("Wi-Fi Display session"),
    )
});

/// Bound on each bus wait. A pipeline going to Null flushes its bus, which
/// can swallow the wake-up message.
const BUS_POLL_INTERVAL: gst::ClockTime = gst::ClockTime::from_mseconds(100);

/// The bus thread of one pipeline.
struct BusWatch {
    bus: gst::Bus,
    /// Checked before every delivery.
    stopped: Arc<AtomicBool>,
}

impl BusWatch {
    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let stop = gst::message::Application::new(gst::Structure::new_empty(bus::STOP_WATCH));
        if self.bus.post(stop).is_err() {
            gst::warning!(CAT, "Failed to wake bus watch");
        }
    }
}

/// Pipeline runtime backed by GStreamer.
pub struct GstRuntime {
    /// Active bus watches, by pipeline name.
    watches: Mutex<HashMap<String, BusWatch>>,
}

impl GstRuntime {
    /// Initializes GStreamer and creates the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if GStreamer cannot be initialized.
    pub fn new() -> Result<Self> {
        gst::init().map_err(|e| Error::Internal(format!("GStreamer init failed: {e}")))?;
        tracing::debug!(version = %gst::version_string(), "GStreamer initialized");
        Ok(GstRuntime {
            watches: Mutex::new(HashMap::new()),
        })
    }

    fn as_bin<'a>(&self, element: &'a gst::Element) -> Result<&'a gst::Bin> {
        element
            .downcast_ref::<gst::Bin>()
            .ok_or_else(|| Error::Internal(format!("{} is not a bin", element.name())))
    }

    /// Links `src` to `dst` as soon as `src` grows a compatible output pad.
    fn link_later(&self, src: &gst::Element, dst: &gst::Element) {
        let dst = dst.downgrade();
        src.connect_pad_added(move |src, pad| {
            let Some(dst) = dst.upgrade() else {
                return;
            };
            let Some(sink) = dst.static_pad("sink") else {
                return;
            };
            if sink.is_linked() {
                return;
            }
            match pad.link(&sink) {
                Ok(_) => gst::debug!(CAT, obj = src, "Linked {} to {}", pad.name(), dst.name()),
                Err(err) => gst::debug!(CAT, obj = src, "Not linking {}: {err:?}", pad.name()),
            }
        });
    }
}

impl PipelineRuntime for GstRuntime {
    type Element = gst::Element;
    type Pad = gst::Pad;

    fn create_pipeline(&self, name: &str) -> Result<gst::Element> {
        Ok(gst::Pipeline::with_name(name).upcast())
    }

    fn make_element(&self, factory: &str, name: &str) -> Result<gst::Element> {
        gst::ElementFactory::make(factory)
            .name(name)
            .build()
            .map_err(|e| Error::ConstructionFailure(format!("{factory} ({name}): {e}")))
    }

    fn add_to_bin(&self, bin: &gst::Element, element: &gst::Element) -> Result<()> {
        self.as_bin(bin)?.add(element).map_err(|e| {
            Error::ConstructionFailure(format!(
                "adding {} to {}: {e}",
                element.name(),
                bin.name()
            ))
        })
    }

    fn remove_from_bin(&self, bin: &gst::Element, element: &gst::Element) -> Result<()> {
        self.as_bin(bin)?.remove(element).map_err(|e| {
            Error::Internal(format!(
                "removing {} from {}: {e}",
                element.name(),
                bin.name()
            ))
        })
    }

    fn link(&self, src: &gst::Element, dst: &gst::Element) -> Result<()> {
        if src.link(dst).is_ok() {
            return Ok(());
        }

        // Sometimes pads do not exist yet; link when they appear.
        let dynamic = src.pad_template_list().iter().any(|template| {
            template.direction() == gst::PadDirection::Src
                && template.presence() == gst::PadPresence::Sometimes
        });
        if !dynamic {
            return Err(Error::ConstructionFailure(format!(
                "cannot link {} to {}",
                src.name(),
                dst.name()
            )));
        }
        gst::debug!(CAT, obj = src, "Delaying link to {}", dst.name());
        self.link_later(src, dst);
        Ok(())
    }

    fn link_pad(&self, pad: &gst::Pad, dst: &gst::Element) -> Result<()> {
        let sink = dst
            .static_pad("sink")
            .ok_or_else(|| Error::ConstructionFailure(format!("{} has no sink pad", dst.name())))?;
        pad.link_maybe_ghosting(&sink).map_err(|e| {
            Error::ConstructionFailure(format!("linking {} to {}: {e}", pad.name(), dst.name()))
        })
    }

    fn pad_name(&self, pad: &gst::Pad) -> String {
        pad.name().to_string()
    }

    fn set_state(&self, element: &gst::Element, state: PipelineState) -> Result<StateChange> {
        match element.set_state(bus::to_gst_state(state)) {
            Ok(gst::StateChangeSuccess::Async) => Ok(StateChange::Async),
            Ok(_) => Ok(StateChange::Success),
            Err(_) => Err(Error::Internal(format!(
                "{} failed to change to {state:?}",
                element.name()
            ))),
        }
    }

    fn sync_state_with_parent(&self, element: &gst::Element) -> Result<()> {
        element.sync_state_with_parent().map_err(|e| {
            Error::ConstructionFailure(format!("starting {}: {e}", element.name()))
        })
    }

    fn set_locked_state(&self, element: &gst::Element, locked: bool) {
        element.set_locked_state(locked);
    }

    fn set_string_property(&self, element: &gst::Element, name: &str, value: &str) -> Result<()> {
        if element.find_property(name).is_none() {
            return Err(Error::ConstructionFailure(format!(
                "{} has no property {name}",
                element.name()
            )));
        }
        element.set_property_from_str(name, value);
        Ok(())
    }

    fn connect_pad_added(
        &self,
        element: &gst::Element,
        callback: PadAddedCallback<gst::Pad>,
    ) -> Result<()> {
        element.connect_pad_added(move |_, pad| callback(pad.clone()));
        Ok(())
    }

    fn watch_bus(&self, pipeline: &gst::Element, callback: BusCallback) -> Result<()> {
        let bus = pipeline
            .bus()
            .ok_or_else(|| Error::Internal(format!("{} has no bus", pipeline.name())))?;
        let name = pipeline.name().to_string();
        let mut watches = self
            .watches
            .lock()
            .map_err(|e| Error::Internal(format!("bus watch mutex poisoned: {e}")))?;
        if watches.contains_key(&name) {
            return Err(Error::Internal(format!("{name} is already watched")));
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let weak = pipeline.downgrade();
        thread::Builder::new().name("wfd-bus".into()).spawn({
            let bus = bus.clone();
            let stopped = stopped.clone();
            move || {
                while !stopped.load(Ordering::SeqCst) {
                    let Some(message) = bus.timed_pop(BUS_POLL_INTERVAL) else {
                        continue;
                    };
                    if bus::is_stop(&message) || stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    let Some(pipeline) = weak.upgrade() else {
                        break;
                    };
                    if let Some(message) = bus::translate(&message, &pipeline) {
                        callback(message);
                    }
                }
            }
        })?;

        gst::debug!(CAT, obj = pipeline, "Watching bus");
        watches.insert(name, BusWatch { bus, stopped });
        Ok(())
    }

    fn unwatch_bus(&self, pipeline: &gst::Element) {
        let watch = match self.watches.lock() {
            Ok(mut watches) => watches.remove(pipeline.name().as_str()),
            Err(e) => {
                gst::error!(CAT, obj = pipeline, "Bus watch mutex poisoned: {e}");
                return;
            }
        };
        let Some(watch) = watch else {
            return;
        };

        // Not joined: the watch thread may be waiting on the caller.
        watch.stop();
        gst::debug!(CAT, obj = pipeline, "Stopped watching bus");
    }
}

impl Drop for GstRuntime {
    fn drop(&mut self) {
        if let Ok(watches) = self.watches.get_mut() {
            for (_, watch) in watches.drain() {
                watch.stop();
            }
        }
    }
}

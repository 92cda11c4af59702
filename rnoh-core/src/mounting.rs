//! Mounting managers apply transactions on the MAIN lane.
//!
//! ## Usage
//!
//! The scheduler delegate calls the three phases of every transaction in
//! order: [`MountingManager::will_mount`], [`MountingManager::do_mount`] and
//! one or more [`MountingManager::did_mount`] batches. Everything runs on
//! MAIN.

pub mod arkts;
pub mod capi;

use serde_json::Value;

use crate::{Tag, error::RnohResult, mutation::ShadowViewMutation, shadow_view::ShadowView};

/// Applies shadow-tree mutations to a rendering backend.
pub trait MountingManager: Send + Sync {
    /// Runs before any mutation of the transaction is applied.
    fn will_mount(&self, mutations: &[ShadowViewMutation]);

    /// Receives the whole transaction before it is applied.
    fn do_mount(&self, mutations: &[ShadowViewMutation]);

    /// Applies a batch of the transaction.
    ///
    /// A transaction may arrive as several batches. Instances are finalized
    /// once per batch that touches them, so an instance touched by two
    /// batches of the same transaction is finalized twice.
    fn did_mount(&self, mutations: &[ShadowViewMutation]);

    /// Delivers a JS command to the component behind `view`.
    fn dispatch_command(&self, view: &ShadowView, command_name: &str, args: Value);

    /// Updates whether JS owns the gesture on `view`.
    fn set_is_js_responder(
        &self,
        view: &ShadowView,
        is_js_responder: bool,
        block_native_responder: bool,
    );

    /// Delivers an accessibility event for `view`.
    fn scheduler_did_send_accessibility_event(&self, view: &ShadowView, event_type: &str);

    /// Pushes props to a mounted component outside of the transaction flow.
    fn update_view(&self, tag: Tag, props: Value) -> RnohResult<()>;

    /// Forgets preallocated views nobody claimed.
    fn clear_preallocated_views(&self);
}

//! Mounting through the ArkTS host.
//!
//! Every shadow view is kept in a [`ShadowViewRegistry`]. The `will_mount`,
//! `do_mount` and `did_mount` batches are serialized and sent to the host,
//! which does the rendering.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;
use serde_json::Value;
use tracing::{error, trace};

use super::MountingManager;
use crate::{
    SurfaceId, Tag,
    arkts_bridge::ArkTsChannel,
    config::Architecture,
    error::{RnohError, RnohResult},
    mutation::{MutationType, ShadowViewMutation, serialize_descriptor, serialize_mutations},
    scheduler_delegate::PreliminaryViewAllocator,
    shadow_view::{ShadowView, ShadowViewRegistry},
};

/// Mounting manager that forwards mutations to the ArkTS host.
pub struct MountingManagerArkTs {
    shadow_views: Arc<ShadowViewRegistry>,
    channel: ArkTsChannel,
    preallocated_tags: Mutex<HashSet<Tag>>,
}

impl MountingManagerArkTs {
    /// Creates a manager writing snapshots into `shadow_views`.
    pub fn new(shadow_views: Arc<ShadowViewRegistry>, channel: ArkTsChannel) -> Self {
        Self {
            shadow_views,
            channel,
            preallocated_tags: Mutex::new(HashSet::default()),
        }
    }

    /// The snapshot store.
    pub fn shadow_views(&self) -> &Arc<ShadowViewRegistry> {
        &self.shadow_views
    }

    /// Latest snapshot for `tag`.
    pub fn find_shadow_view(&self, tag: Tag) -> Option<ShadowView> {
        self.shadow_views.find_shadow_view(tag)
    }

    /// Sends the descriptor of `view` to the host ahead of its Create.
    ///
    /// The Create that follows reaches the host as an Update.
    pub fn preallocate_view(&self, view: &ShadowView) {
        let descriptor = match serialize_descriptor(view) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                error!(tag = view.tag, %err, "failed to serialize preallocated view");
                return;
            }
        };
        self.shadow_views.set_shadow_view(view.clone());
        self.preallocated_tags.lock().insert(view.tag);
        self.channel.post(move |host| host.preallocate(descriptor));
    }

    /// Returns `true` when `tag` was preallocated and not created yet.
    pub fn is_preallocated(&self, tag: Tag) -> bool {
        self.preallocated_tags.lock().contains(&tag)
    }

    /// Updates the snapshot store from a batch without involving the host.
    pub fn record_snapshots(&self, mutations: &[ShadowViewMutation]) {
        for mutation in mutations {
            match mutation.mutation_type {
                MutationType::Create | MutationType::Update => {
                    self.shadow_views
                        .set_shadow_view(mutation.new_child_shadow_view.clone());
                }
                MutationType::Delete => {
                    self.shadow_views
                        .clear_shadow_view(mutation.old_child_shadow_view.tag);
                }
                MutationType::Insert | MutationType::Remove | MutationType::RemoveDeleteTree => {}
            }
        }
    }

    /// Serializes a non-empty batch for the host.
    fn serialize_batch(&self, mutations: &[ShadowViewMutation]) -> Option<Value> {
        if mutations.is_empty() {
            return None;
        }
        serialize_mutations(mutations)
            .inspect_err(|err| error!(count = mutations.len(), %err, "failed to serialize mutations"))
            .ok()
    }

    /// Rewrites Creates of preallocated tags into Updates.
    fn claim_preallocated(&self, mutations: &[ShadowViewMutation]) -> Vec<ShadowViewMutation> {
        let mut preallocated = self.preallocated_tags.lock();
        mutations
            .iter()
            .map(|mutation| {
                let tag = mutation.new_child_shadow_view.tag;
                if mutation.mutation_type == MutationType::Create && preallocated.remove(&tag) {
                    trace!(tag, "create of preallocated view sent as update");
                    let mut claimed = mutation.clone();
                    claimed.mutation_type = MutationType::Update;
                    claimed.old_child_shadow_view = mutation.new_child_shadow_view.clone();
                    claimed
                } else {
                    mutation.clone()
                }
            })
            .collect()
    }
}

impl MountingManager for MountingManagerArkTs {
    fn will_mount(&self, mutations: &[ShadowViewMutation]) {
        if let Some(payload) = self.serialize_batch(mutations) {
            self.channel.post(move |host| host.will_mount(payload));
        }
    }

    fn do_mount(&self, mutations: &[ShadowViewMutation]) {
        self.record_snapshots(mutations);
        if let Some(payload) = self.serialize_batch(mutations) {
            self.channel.post(move |host| host.do_mount(payload));
        }
    }

    fn did_mount(&self, mutations: &[ShadowViewMutation]) {
        if mutations.is_empty() {
            return;
        }
        let mutations = self.claim_preallocated(mutations);
        if let Some(payload) = self.serialize_batch(&mutations) {
            self.channel.post(move |host| host.did_mount(payload));
        }
    }

    fn dispatch_command(&self, view: &ShadowView, command_name: &str, args: Value) {
        let tag = view.tag;
        let command_name = command_name.to_string();
        self.channel
            .post(move |host| host.dispatch_command(tag, &command_name, args));
    }

    fn set_is_js_responder(
        &self,
        view: &ShadowView,
        is_js_responder: bool,
        block_native_responder: bool,
    ) {
        let tag = view.tag;
        self.channel.post(move |host| {
            host.set_is_js_responder(tag, is_js_responder, block_native_responder)
        });
    }

    fn scheduler_did_send_accessibility_event(&self, view: &ShadowView, event_type: &str) {
        let tag = view.tag;
        let event_type = event_type.to_string();
        self.channel
            .post(move |host| host.send_accessibility_event(tag, &event_type));
    }

    fn update_view(&self, _tag: Tag, _props: Value) -> RnohResult<()> {
        Err(RnohError::Unsupported {
            operation: "update_view",
            architecture: Architecture::ArkTs,
        })
    }

    fn clear_preallocated_views(&self) {
        self.preallocated_tags.lock().clear();
    }
}

impl PreliminaryViewAllocator for MountingManagerArkTs {
    fn preallocate(&self, _surface_id: SurfaceId, view: &ShadowView) {
        self.preallocate_view(view);
    }
}

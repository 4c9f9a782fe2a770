//! In-memory backend with no GPU behind it.
//!
//! [`HeadlessBackend`] implements [`Backend`] on plain host memory and keeps a
//! faithful model of the parts of an explicit API the frame engine must get
//! right:
//!
//! - submissions stay *pending* until something retires them: a wait on their
//!   fence, [`Backend::wait_idle`], or an explicit [`HeadlessBackend::retire_oldest`].
//!   Work retires in submission order, like a single queue. One-shot
//!   transfers wait for everything submitted before them.
//! - a swapchain goes out of date as soon as the window extent set with
//!   [`HeadlessBackend::set_window_extent`] differs from the one it was built for.
//! - an optional memory budget turns large allocations into
//!   [`RhiError::OutOfDeviceMemory`].
//!
//! Misuse that a validation layer would report is counted in
//! [`HeadlessStats`] rather than aborting, so tests can assert it never happens.

use std::collections::{HashMap, VecDeque};

use ash::vk;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::{
    Backend, BindingSetId, BufferId, CommandContextId, FenceId, ImageId, PipelineId, SamplerId,
    SemaphoreId, SubmitDesc, SwapchainId, tag,
};
use crate::desc::{
    AcquireOutcome, Binding, BindingLayout, BufferDesc, DrawCommand, Extent2D, Format,
    ImageDesc, ImageLayout, PipelineDesc, PresentOutcome, RenderTarget, SwapchainInfo,
};
use crate::error::{RhiError, RhiResult};
use crate::handle::{Handle, ResourceArena};

/// Window extent a new headless backend reports.
pub const DEFAULT_WINDOW_EXTENT: Extent2D = Extent2D::new(1280, 720);

/// Images per headless swapchain.
pub const SWAPCHAIN_IMAGE_COUNT: u32 = 3;

/// Counters describing everything the backend has been asked to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub bytes_allocated: u64,
    pub buffers_created: u64,
    pub images_created: u64,
    pub samplers_created: u64,
    pub swapchains_created: u64,
    pub pipelines_created: u64,
    /// Frame submissions.
    pub submissions: u64,
    /// Blocking transfer submissions.
    pub one_shot_submits: u64,
    /// Submissions currently pending.
    pub in_flight: usize,
    /// Most submissions ever pending at once.
    pub max_in_flight: usize,
    pub fence_waits: u64,
    /// Waits on a fence that was never part of a submission.
    pub unsubmitted_fence_waits: u64,
    /// Records or submits into a context whose previous submission is still pending.
    pub context_reuse_violations: u64,
    /// Resets of a fence whose submission is still pending.
    pub pending_fence_resets: u64,
    /// Objects destroyed while a pending submission references them.
    pub destroyed_while_in_flight: u64,
    /// Host writes into a buffer a pending submission references.
    pub writes_while_in_flight: u64,
    /// Signals of a semaphore that was already signalled.
    pub semaphore_resignals: u64,
    /// Waits on a semaphore nothing has signalled.
    pub unsignaled_semaphore_waits: u64,
    pub acquires: u64,
    pub presents: u64,
    pub wait_idles: u64,
}

/// Live object counts per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub buffers: usize,
    pub images: usize,
    pub samplers: usize,
    pub binding_sets: usize,
    pub fences: usize,
    pub semaphores: usize,
    pub contexts: usize,
    pub swapchains: usize,
    pub pipelines: usize,
}

struct BufferRecord {
    desc: BufferDesc,
    bytes: Vec<u8>,
}

struct ImageRecord {
    desc: ImageDesc,
    pixels: Vec<u8>,
    layouts: Vec<ImageLayout>,
}

struct BindingSetRecord {
    bindings: Vec<Binding>,
}

struct FenceRecord {
    signaled: bool,
    ever_submitted: bool,
}

#[derive(Default)]
struct ContextRecord {
    commands: Vec<DrawCommand>,
    target: Option<RenderTarget>,
}

struct SwapchainRecord {
    info: SwapchainInfo,
    next_image: u32,
}

/// Something a pending submission keeps alive.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Reference {
    Buffer(BufferId),
    Image(ImageId),
    Sampler(SamplerId),
    BindingSet(BindingSetId),
    Pipeline(PipelineId),
    Swapchain(SwapchainId),
}

struct Submission {
    fence: FenceId,
    context: CommandContextId,
    references: Vec<Reference>,
}

struct State {
    buffers: ResourceArena<tag::Buffer, BufferRecord>,
    images: ResourceArena<tag::Image, ImageRecord>,
    samplers: ResourceArena<tag::Sampler, ()>,
    binding_sets: ResourceArena<tag::BindingSet, BindingSetRecord>,
    fences: ResourceArena<tag::Fence, FenceRecord>,
    /// Value is whether the semaphore is signalled.
    semaphores: ResourceArena<tag::Semaphore, bool>,
    contexts: ResourceArena<tag::CommandContext, ContextRecord>,
    swapchains: ResourceArena<tag::Swapchain, SwapchainRecord>,
    pipelines: ResourceArena<tag::Pipeline, PipelineDesc>,
    pending: VecDeque<Submission>,
    binding_sets_by_layout: HashMap<BindingLayout, u64>,
    window_extent: Extent2D,
    suboptimal_next_present: bool,
    fail_next_record: bool,
    stats: HeadlessStats,
}

impl State {
    fn new(window_extent: Extent2D) -> Self {
        Self {
            buffers: ResourceArena::new(),
            images: ResourceArena::new(),
            samplers: ResourceArena::new(),
            binding_sets: ResourceArena::new(),
            fences: ResourceArena::new(),
            semaphores: ResourceArena::new(),
            contexts: ResourceArena::new(),
            swapchains: ResourceArena::new(),
            pipelines: ResourceArena::new(),
            pending: VecDeque::new(),
            binding_sets_by_layout: HashMap::new(),
            window_extent,
            suboptimal_next_present: false,
            fail_next_record: false,
            stats: HeadlessStats::default(),
        }
    }

    fn is_referenced(&self, reference: Reference) -> bool {
        self.pending
            .iter()
            .any(|submission| submission.references.contains(&reference))
    }

    fn note_destroy(&mut self, reference: Reference) {
        if self.is_referenced(reference) {
            self.stats.destroyed_while_in_flight += 1;
        }
    }

    fn signal_semaphore(&mut self, semaphore: SemaphoreId) {
        if let Some(signaled) = self.semaphores.get_mut(semaphore) {
            if *signaled {
                self.stats.semaphore_resignals += 1;
            }
            *signaled = true;
        }
    }

    fn consume_semaphore(&mut self, semaphore: SemaphoreId) {
        if let Some(signaled) = self.semaphores.get_mut(semaphore) {
            if !*signaled {
                self.stats.unsignaled_semaphore_waits += 1;
            }
            *signaled = false;
        }
    }

    fn context_pending(&self, context: CommandContextId) -> bool {
        self.pending.iter().any(|s| s.context == context)
    }

    fn drain_queue(&mut self) {
        while self.retire_front() {}
    }

    fn retire_front(&mut self) -> bool {
        let Some(submission) = self.pending.pop_front() else {
            return false;
        };
        if let Some(fence) = self.fences.get_mut(submission.fence) {
            fence.signaled = true;
        }
        self.stats.in_flight = self.pending.len();
        trace!("Retired submission on fence {}", submission.fence);
        true
    }

    fn references_of(&self, context: &ContextRecord) -> Vec<Reference> {
        let mut references = Vec::new();
        if let Some(target) = context.target {
            references.push(Reference::Swapchain(target.swapchain));
            references.push(Reference::Image(target.depth));
        }
        for command in &context.commands {
            match *command {
                DrawCommand::BindPipeline(pipeline) => {
                    references.push(Reference::Pipeline(pipeline));
                }
                DrawCommand::BindSet { set, .. } => {
                    references.push(Reference::BindingSet(set));
                    if let Some(record) = self.binding_sets.get(set) {
                        for binding in &record.bindings {
                            match *binding {
                                Binding::Uniform(buffer) => {
                                    references.push(Reference::Buffer(buffer));
                                }
                                Binding::Texture { image, sampler } => {
                                    references.push(Reference::Image(image));
                                    references.push(Reference::Sampler(sampler));
                                }
                            }
                        }
                    }
                }
                DrawCommand::BindVertexBuffer(buffer) | DrawCommand::BindIndexBuffer(buffer) => {
                    references.push(Reference::Buffer(buffer));
                }
                DrawCommand::DrawIndexed { .. } => {}
            }
        }
        references
    }

    fn check_command_handles(&self, commands: &[DrawCommand]) -> RhiResult<()> {
        for command in commands {
            match *command {
                DrawCommand::BindPipeline(pipeline) => {
                    require(self.pipelines.contains(pipeline), "pipeline", pipeline)?;
                }
                DrawCommand::BindSet { set, .. } => {
                    require(self.binding_sets.contains(set), "binding set", set)?;
                }
                DrawCommand::BindVertexBuffer(buffer) | DrawCommand::BindIndexBuffer(buffer) => {
                    require(self.buffers.contains(buffer), "buffer", buffer)?;
                }
                DrawCommand::DrawIndexed { .. } => {}
            }
        }
        Ok(())
    }
}

fn require<T>(live: bool, kind: &'static str, handle: Handle<T>) -> RhiResult<()> {
    if live {
        Ok(())
    } else {
        Err(stale(kind, handle))
    }
}

fn stale<T>(kind: &'static str, handle: Handle<T>) -> RhiError {
    RhiError::StaleHandle {
        kind,
        handle: handle.to_string(),
    }
}

/// A [`Backend`] that runs entirely in host memory.
pub struct HeadlessBackend {
    state: Mutex<State>,
    memory_budget: Option<u64>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_window_extent(DEFAULT_WINDOW_EXTENT)
    }

    pub fn with_window_extent(extent: Extent2D) -> Self {
        Self {
            state: Mutex::new(State::new(extent)),
            memory_budget: None,
        }
    }

    /// A backend whose allocations fail once `bytes` are in use.
    pub fn with_memory_budget(bytes: u64) -> Self {
        Self {
            state: Mutex::new(State::new(DEFAULT_WINDOW_EXTENT)),
            memory_budget: Some(bytes),
        }
    }

    /// Simulate the window changing size. Swapchains built for another extent
    /// report out-of-date from then on.
    pub fn set_window_extent(&self, extent: Extent2D) {
        self.state.lock().window_extent = extent;
    }

    pub fn window_extent(&self) -> Extent2D {
        self.state.lock().window_extent
    }

    /// Make the next present report suboptimal.
    pub fn force_suboptimal_present(&self) {
        self.state.lock().suboptimal_next_present = true;
    }

    /// Make the next `record` call fail as a lost device would.
    pub fn fail_next_record(&self) {
        self.state.lock().fail_next_record = true;
    }

    /// Whether `semaphore` is currently signalled.
    pub fn is_semaphore_signaled(&self, semaphore: SemaphoreId) -> bool {
        self.state
            .lock()
            .semaphores
            .get(semaphore)
            .copied()
            .unwrap_or(false)
    }

    /// Let the oldest pending submission finish. Returns false if none was pending.
    pub fn retire_oldest(&self) -> bool {
        self.state.lock().retire_front()
    }

    /// Let every pending submission finish.
    pub fn retire_all(&self) {
        self.state.lock().drain_queue();
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.lock().stats.clone()
    }

    /// Binding sets ever created with `layout`.
    pub fn binding_sets_created(&self, layout: BindingLayout) -> u64 {
        self.state
            .lock()
            .binding_sets_by_layout
            .get(&layout)
            .copied()
            .unwrap_or(0)
    }

    pub fn live_counts(&self) -> LiveCounts {
        let state = self.state.lock();
        LiveCounts {
            buffers: state.buffers.len(),
            images: state.images.len(),
            samplers: state.samplers.len(),
            binding_sets: state.binding_sets.len(),
            fences: state.fences.len(),
            semaphores: state.semaphores.len(),
            contexts: state.contexts.len(),
            swapchains: state.swapchains.len(),
            pipelines: state.pipelines.len(),
        }
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(buffer).map(|b| b.bytes.clone())
    }

    pub fn image_pixels(&self, image: ImageId) -> Option<Vec<u8>> {
        self.state.lock().images.get(image).map(|i| i.pixels.clone())
    }

    pub fn image_desc(&self, image: ImageId) -> Option<ImageDesc> {
        self.state.lock().images.get(image).map(|i| i.desc)
    }

    /// Every layout the image has been in, oldest first.
    pub fn image_layout_history(&self, image: ImageId) -> Option<Vec<ImageLayout>> {
        self.state.lock().images.get(image).map(|i| i.layouts.clone())
    }

    /// The commands last recorded into `context`.
    pub fn recorded_commands(&self, context: CommandContextId) -> Option<Vec<DrawCommand>> {
        self.state
            .lock()
            .contexts
            .get(context)
            .map(|c| c.commands.clone())
    }

    pub fn swapchain_info(&self, swapchain: SwapchainId) -> Option<SwapchainInfo> {
        self.state.lock().swapchains.get(swapchain).map(|s| s.info)
    }

    pub fn is_buffer_live(&self, buffer: BufferId) -> bool {
        self.state.lock().buffers.contains(buffer)
    }

    pub fn is_image_live(&self, image: ImageId) -> bool {
        self.state.lock().images.contains(image)
    }

    pub fn is_fence_live(&self, fence: FenceId) -> bool {
        self.state.lock().fences.contains(fence)
    }

    pub fn is_binding_set_live(&self, set: BindingSetId) -> bool {
        self.state.lock().binding_sets.contains(set)
    }

    pub fn is_swapchain_live(&self, swapchain: SwapchainId) -> bool {
        self.state.lock().swapchains.contains(swapchain)
    }

    pub fn is_pipeline_live(&self, pipeline: PipelineId) -> bool {
        self.state.lock().pipelines.contains(pipeline)
    }

    fn reserve(&self, state: &mut State, what: &'static str, size: u64) -> RhiResult<()> {
        if let Some(budget) = self.memory_budget
            && state.stats.bytes_allocated + size > budget
        {
            return Err(RhiError::OutOfDeviceMemory { what, size });
        }
        state.stats.bytes_allocated += size;
        Ok(())
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferId> {
        let mut state = self.state.lock();
        self.reserve(&mut state, "buffer", desc.size)?;
        state.stats.buffers_created += 1;
        Ok(state.buffers.insert(BufferRecord {
            desc: *desc,
            bytes: vec![0; desc.size as usize],
        }))
    }

    fn destroy_buffer(&self, buffer: BufferId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::Buffer(buffer));
        if let Some(record) = state.buffers.remove(buffer) {
            state.stats.bytes_allocated -= record.desc.size;
        }
    }

    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut state = self.state.lock();
        if state.is_referenced(Reference::Buffer(buffer)) {
            state.stats.writes_while_in_flight += 1;
        }
        let record = state
            .buffers
            .get_mut(buffer)
            .ok_or_else(|| stale("buffer", buffer))?;
        if !record.desc.visibility.is_host_visible() {
            return Err(RhiError::InvalidAccess(format!(
                "buffer {} is not host-visible",
                buffer
            )));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > record.bytes.len() {
            return Err(RhiError::InvalidAccess(format!(
                "write {}..{} past end of buffer {}",
                start, end, buffer
            )));
        }
        record.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn copy_buffer(&self, src: BufferId, dst: BufferId, size: u64) -> RhiResult<()> {
        let mut state = self.state.lock();
        // Transfers queue behind every frame already submitted.
        state.drain_queue();
        let len = size as usize;
        let bytes = {
            let source = state.buffers.get(src).ok_or_else(|| stale("buffer", src))?;
            source
                .bytes
                .get(..len)
                .ok_or_else(|| {
                    RhiError::InvalidAccess(format!("copy of {} bytes overruns buffer {}", len, src))
                })?
                .to_vec()
        };
        let target = state
            .buffers
            .get_mut(dst)
            .ok_or_else(|| stale("buffer", dst))?;
        let Some(window) = target.bytes.get_mut(..len) else {
            return Err(RhiError::InvalidAccess(format!(
                "copy of {} bytes overruns buffer {}",
                len, dst
            )));
        };
        window.copy_from_slice(&bytes);
        state.stats.one_shot_submits += 1;
        Ok(())
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<ImageId> {
        let mut state = self.state.lock();
        let size = desc.byte_size();
        self.reserve(&mut state, "image", size)?;
        state.stats.images_created += 1;
        Ok(state.images.insert(ImageRecord {
            desc: *desc,
            pixels: vec![0; size as usize],
            layouts: vec![ImageLayout::Undefined],
        }))
    }

    fn destroy_image(&self, image: ImageId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::Image(image));
        if let Some(record) = state.images.remove(image) {
            state.stats.bytes_allocated -= record.desc.byte_size();
        }
    }

    fn copy_buffer_to_image(
        &self,
        src: BufferId,
        dst: ImageId,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        let mut state = self.state.lock();
        // Transfers queue behind every frame already submitted.
        state.drain_queue();
        let bytes = {
            let source = state.buffers.get(src).ok_or_else(|| stale("buffer", src))?;
            let len = width as usize * height as usize * 4;
            if len > source.bytes.len() {
                return Err(RhiError::InvalidAccess(format!(
                    "buffer {} too small for a {}x{} copy",
                    src, width, height
                )));
            }
            source.bytes[..len].to_vec()
        };
        let image = state.images.get_mut(dst).ok_or_else(|| stale("image", dst))?;
        if image.desc.extent != Extent2D::new(width, height) {
            return Err(RhiError::InvalidAccess(format!(
                "copy extent {}x{} does not match image {} ({}x{})",
                width, height, dst, image.desc.extent.width, image.desc.extent.height
            )));
        }
        if image.layouts.last() != Some(&ImageLayout::Undefined) {
            image.layouts.push(ImageLayout::Undefined);
        }
        image.layouts.push(ImageLayout::TransferDst);
        image.pixels.copy_from_slice(&bytes);
        image.layouts.push(ImageLayout::ShaderReadOnly);
        state.stats.one_shot_submits += 1;
        Ok(())
    }

    fn create_sampler(&self) -> RhiResult<SamplerId> {
        let mut state = self.state.lock();
        state.stats.samplers_created += 1;
        Ok(state.samplers.insert(()))
    }

    fn destroy_sampler(&self, sampler: SamplerId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::Sampler(sampler));
        state.samplers.remove(sampler);
    }

    fn create_binding_set(
        &self,
        layout: BindingLayout,
        bindings: &[Binding],
    ) -> RhiResult<BindingSetId> {
        layout.validate(bindings)?;
        let mut state = self.state.lock();
        for binding in bindings {
            match *binding {
                Binding::Uniform(buffer) => {
                    require(state.buffers.contains(buffer), "buffer", buffer)?;
                }
                Binding::Texture { image, sampler } => {
                    require(state.images.contains(image), "image", image)?;
                    require(state.samplers.contains(sampler), "sampler", sampler)?;
                }
            }
        }
        *state.binding_sets_by_layout.entry(layout).or_insert(0) += 1;
        let set = state.binding_sets.insert(BindingSetRecord {
            bindings: bindings.to_vec(),
        });
        debug!("Created {:?} binding set {}", layout, set);
        Ok(set)
    }

    fn destroy_binding_set(&self, set: BindingSetId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::BindingSet(set));
        state.binding_sets.remove(set);
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceId> {
        Ok(self.state.lock().fences.insert(FenceRecord {
            signaled,
            ever_submitted: false,
        }))
    }

    fn destroy_fence(&self, fence: FenceId) {
        let mut state = self.state.lock();
        if state.pending.iter().any(|s| s.fence == fence) {
            state.stats.destroyed_while_in_flight += 1;
        }
        state.fences.remove(fence);
    }

    fn wait_fence(&self, fence: FenceId, _timeout_ns: u64) -> RhiResult<()> {
        let mut state = self.state.lock();
        let ever_submitted = state
            .fences
            .get(fence)
            .ok_or_else(|| stale("fence", fence))?
            .ever_submitted;
        state.stats.fence_waits += 1;
        if !ever_submitted {
            state.stats.unsubmitted_fence_waits += 1;
        }

        // The queue executes in order: everything up to this fence's
        // submission finishes before it signals.
        if let Some(position) = state.pending.iter().position(|s| s.fence == fence) {
            for _ in 0..=position {
                state.retire_front();
            }
        }

        match state.fences.get(fence) {
            Some(record) if record.signaled => Ok(()),
            // Nothing will ever signal it; a real device would hang here.
            _ => Err(RhiError::Vulkan(vk::Result::TIMEOUT)),
        }
    }

    fn reset_fence(&self, fence: FenceId) -> RhiResult<()> {
        let mut state = self.state.lock();
        if state.pending.iter().any(|s| s.fence == fence) {
            state.stats.pending_fence_resets += 1;
        }
        let record = state
            .fences
            .get_mut(fence)
            .ok_or_else(|| stale("fence", fence))?;
        record.signaled = false;
        Ok(())
    }

    fn create_semaphore(&self) -> RhiResult<SemaphoreId> {
        Ok(self.state.lock().semaphores.insert(false))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreId) {
        self.state.lock().semaphores.remove(semaphore);
    }

    fn create_command_context(&self) -> RhiResult<CommandContextId> {
        Ok(self.state.lock().contexts.insert(ContextRecord::default()))
    }

    fn destroy_command_context(&self, context: CommandContextId) {
        let mut state = self.state.lock();
        if state.context_pending(context) {
            state.stats.destroyed_while_in_flight += 1;
        }
        state.contexts.remove(context);
    }

    fn record(
        &self,
        context: CommandContextId,
        target: &RenderTarget,
        commands: &[DrawCommand],
    ) -> RhiResult<()> {
        let mut state = self.state.lock();
        require(state.contexts.contains(context), "command context", context)?;
        require(
            state.swapchains.contains(target.swapchain),
            "swapchain",
            target.swapchain,
        )?;
        require(state.images.contains(target.depth), "image", target.depth)?;
        state.check_command_handles(commands)?;
        if std::mem::take(&mut state.fail_next_record) {
            return Err(RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST));
        }

        if state.context_pending(context) {
            state.stats.context_reuse_violations += 1;
        }

        if let Some(record) = state.contexts.get_mut(context) {
            record.commands = commands.to_vec();
            record.target = Some(*target);
        }
        Ok(())
    }

    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()> {
        let mut state = self.state.lock();
        require(state.semaphores.contains(submit.wait), "semaphore", submit.wait)?;
        require(
            state.semaphores.contains(submit.signal),
            "semaphore",
            submit.signal,
        )?;
        let signaled = state
            .fences
            .get(submit.fence)
            .ok_or_else(|| stale("fence", submit.fence))?
            .signaled;
        if signaled {
            return Err(RhiError::Vulkan(vk::Result::ERROR_UNKNOWN));
        }
        if state.context_pending(submit.context) {
            state.stats.context_reuse_violations += 1;
        }

        let references = {
            let context = state
                .contexts
                .get(submit.context)
                .ok_or_else(|| stale("command context", submit.context))?;
            state.references_of(context)
        };

        state.consume_semaphore(submit.wait);
        state.signal_semaphore(submit.signal);
        if let Some(fence) = state.fences.get_mut(submit.fence) {
            fence.ever_submitted = true;
        }
        state.pending.push_back(Submission {
            fence: submit.fence,
            context: submit.context,
            references,
        });
        state.stats.submissions += 1;
        state.stats.in_flight = state.pending.len();
        state.stats.max_in_flight = state.stats.max_in_flight.max(state.pending.len());
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state.lock();
        state.drain_queue();
        state.stats.wait_idles += 1;
        Ok(())
    }

    fn create_swapchain(&self, extent: Extent2D) -> RhiResult<(SwapchainId, SwapchainInfo)> {
        if extent.is_zero() {
            return Err(RhiError::Swapchain(format!(
                "cannot create a {}x{} swapchain",
                extent.width, extent.height
            )));
        }
        let mut state = self.state.lock();
        let info = SwapchainInfo {
            extent,
            format: Format::Bgra8Srgb,
            image_count: SWAPCHAIN_IMAGE_COUNT,
        };
        state.stats.swapchains_created += 1;
        let id = state.swapchains.insert(SwapchainRecord {
            info,
            next_image: 0,
        });
        debug!("Created headless swapchain {} ({}x{})", id, extent.width, extent.height);
        Ok((id, info))
    }

    fn destroy_swapchain(&self, swapchain: SwapchainId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::Swapchain(swapchain));
        state.swapchains.remove(swapchain);
    }

    fn create_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineId> {
        let mut state = self.state.lock();
        state.stats.pipelines_created += 1;
        Ok(state.pipelines.insert(desc.clone()))
    }

    fn destroy_pipeline(&self, pipeline: PipelineId) {
        let mut state = self.state.lock();
        state.note_destroy(Reference::Pipeline(pipeline));
        state.pipelines.remove(pipeline);
    }

    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        signal: SemaphoreId,
    ) -> RhiResult<AcquireOutcome> {
        let mut state = self.state.lock();
        require(state.semaphores.contains(signal), "semaphore", signal)?;
        state.stats.acquires += 1;
        let window_extent = state.window_extent;
        let record = state
            .swapchains
            .get_mut(swapchain)
            .ok_or_else(|| stale("swapchain", swapchain))?;
        if record.info.extent != window_extent {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let image_index = record.next_image;
        record.next_image = (record.next_image + 1) % record.info.image_count;
        state.signal_semaphore(signal);
        Ok(AcquireOutcome::Acquired {
            image_index,
            suboptimal: false,
        })
    }

    fn present(
        &self,
        swapchain: SwapchainId,
        image_index: u32,
        wait: SemaphoreId,
    ) -> RhiResult<PresentOutcome> {
        let mut state = self.state.lock();
        require(state.semaphores.contains(wait), "semaphore", wait)?;
        let window_extent = state.window_extent;
        let info = state
            .swapchains
            .get(swapchain)
            .ok_or_else(|| stale("swapchain", swapchain))?
            .info;
        if image_index >= info.image_count {
            return Err(RhiError::InvalidAccess(format!(
                "image index {} out of range for swapchain {}",
                image_index, swapchain
            )));
        }
        state.consume_semaphore(wait);
        state.stats.presents += 1;
        if info.extent != window_extent {
            return Ok(PresentOutcome::OutOfDate);
        }
        if std::mem::take(&mut state.suboptimal_next_present) {
            return Ok(PresentOutcome::Suboptimal);
        }
        Ok(PresentOutcome::Presented)
    }
}

//! Device ownership, submission and synchronization
//!
//! `GpuContext` bundles the adapter, device and queue the rest of the harness
//! works against. It can wrap objects supplied by an external bootstrap or
//! request its own headless device.

use crate::command::RecordedSequence;
use crate::error::{DeviceError, Result};
use crate::format::TexelFormat;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Interval between non-blocking polls while waiting with a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// How `wait_for_idle` behaves
#[derive(Debug, Clone, Default)]
pub struct SyncPolicy {
    /// Maximum time to wait for the device; `None` blocks indefinitely
    pub timeout: Option<Duration>,
    /// When raised, `wait_for_idle` returns `DeviceError::Cancelled` at its next check
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Options for the headless device bootstrap
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Backends the instance may pick an adapter from
    pub backends: wgpu::Backends,
    /// Adapter preference passed to `request_adapter`
    pub power_preference: wgpu::PowerPreference,
    /// Only accept a software fallback adapter
    pub force_fallback_adapter: bool,
    /// Timeout and cancellation applied to every wait for idle
    pub sync: SyncPolicy,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            sync: SyncPolicy::default(),
        }
    }
}

/// Handle for a submitted command sequence
#[derive(Debug)]
#[must_use = "submitted work must be waited on before its outputs are read"]
pub struct Submission {
    /// Label of the submitted command sequence
    pub(crate) label: String,
    /// Queue index returned by `Queue::submit`
    pub(crate) index: wgpu::SubmissionIndex,
}

impl Submission {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn index(&self) -> &wgpu::SubmissionIndex {
        &self.index
    }
}

/// The device, its queue and the synchronization policy
#[derive(Debug)]
pub struct GpuContext {
    pub(crate) adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    sync: SyncPolicy,
}

impl GpuContext {
    /// Requests a headless compute device
    ///
    /// Adapter-specific format features are requested when the adapter offers
    /// them so that formats such as `R8Uint` can be used as storage textures.
    ///
    /// # Arguments
    /// * `options` - Backend selection, adapter preference and sync policy
    ///
    /// # Returns
    /// A context owning the adapter, device and queue, or
    /// `DeviceError::NoAdapter` / `DeviceError::RequestDevice`
    pub async fn new(options: ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: options.power_preference,
                compatible_surface: None,
                force_fallback_adapter: options.force_fallback_adapter,
            })
            .await
            .map_err(DeviceError::from)?;

        let required_features = adapter.features() & wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("texel-harness device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: Default::default(),
            })
            .await
            .map_err(DeviceError::from)?;

        let info = adapter.get_info();
        tracing::info!(adapter = %info.name, backend = ?info.backend, "GPU device acquired");

        Ok(Self::from_parts(adapter, device, queue, options.sync))
    }

    /// Blocking variant of [`GpuContext::new`]
    pub fn new_blocking(options: ContextOptions) -> Result<Self> {
        pollster::block_on(Self::new(options))
    }

    /// Wraps a device supplied by an external bootstrap
    pub fn from_parts(adapter: wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue, sync: SyncPolicy) -> Self {
        Self { adapter, device, queue, sync }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn sync_policy(&self) -> &SyncPolicy {
        &self.sync
    }

    /// Whether `format` can be bound as a read-write storage texture
    pub fn supports_read_write_storage(&self, format: TexelFormat) -> bool {
        let wgpu_format = format.to_wgpu();
        let features = if self.device.features().contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES) {
            self.adapter.get_texture_format_features(wgpu_format)
        } else {
            wgpu_format.guaranteed_format_features(self.device.features())
        };
        features.allowed_usages.contains(wgpu::TextureUsages::STORAGE_BINDING) && features.flags.contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE)
    }

    /// Hands a recorded sequence to the queue; returns without waiting
    ///
    /// # Arguments
    /// * `sequence` - A sequence closed with [`CommandSequence::end`](crate::CommandSequence::end)
    ///
    /// # Returns
    /// A handle for the submission; its outputs are readable after `wait_for_idle`
    pub fn submit(&self, sequence: RecordedSequence) -> Submission {
        let RecordedSequence { label, buffer } = sequence;
        let index = self.queue.submit(std::iter::once(buffer));
        tracing::debug!(sequence = %label, "command sequence submitted");
        Submission { label, index }
    }

    /// Blocks until every submitted sequence has completed on the device
    ///
    /// Outputs written by submitted work are only safe to read after this
    /// returns `Ok`.
    ///
    /// # Errors
    /// `DeviceError::Timeout` when the policy's deadline passes,
    /// `DeviceError::Cancelled` when its flag is raised and
    /// `DeviceError::Poll` when the device is lost
    pub fn wait_for_idle(&self) -> Result<()> {
        if self.sync.timeout.is_none() && self.sync.cancel.is_none() {
            self.device.poll(wgpu::PollType::Wait).map_err(DeviceError::from)?;
            return Ok(());
        }

        let done = Arc::new(AtomicBool::new(false));
        let signal = Arc::clone(&done);
        self.queue.on_submitted_work_done(move || signal.store(true, Ordering::Release));

        let deadline = self.sync.timeout.map(|timeout| (Instant::now() + timeout, timeout));
        loop {
            if self.sync.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Acquire)) {
                tracing::warn!("wait for idle cancelled");
                return Err(DeviceError::Cancelled.into());
            }
            self.device.poll(wgpu::PollType::Poll).map_err(DeviceError::from)?;
            if done.load(Ordering::Acquire) {
                return Ok(());
            }
            if let Some((deadline, timeout)) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(?timeout, "device did not become idle in time");
                    return Err(DeviceError::Timeout(timeout).into());
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Runs `f` inside a validation error scope and reports captured errors
    pub(crate) fn validated<R>(&self, context: &str, f: impl FnOnce(&wgpu::Device) -> R) -> Result<R> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(value),
            Some(error) => Err(DeviceError::Validation {
                context: context.to_string(),
                message: error.to_string(),
            }
            .into()),
        }
    }
}

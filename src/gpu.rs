// src/gpu.rs
// Explicit GPU context passed to every GPU-capable component.
// This file exists so device/queue ownership is a constructed value rather than a process-wide singleton.
// RELEVANT FILES:src/targets.rs,src/accel/mod.rs

use std::sync::Arc;

/// GPU availability for components that can run with or without a device.
///
/// Every consumer of this enum must provide a CPU code path for
/// `NotAvailable`, so the crate stays fully functional headless.
#[derive(Clone)]
pub enum GpuContext {
    Available {
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
    },
    NotAvailable,
}

impl GpuContext {
    /// Blocking device acquisition. Returns `NotAvailable` when no
    /// suitable adapter exists instead of failing, so callers can treat
    /// a GPU as an optional capability.
    pub fn request() -> Self {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })) {
            Some(adapter) => adapter,
            None => {
                log::warn!("no suitable GPU adapter, falling back to CPU targets");
                return GpuContext::NotAvailable;
            }
        };

        match pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                label: Some("emberray-device"),
            },
            None,
        )) {
            Ok((device, queue)) => GpuContext::Available {
                device: Arc::new(device),
                queue: Arc::new(queue),
            },
            Err(e) => {
                log::warn!("request_device failed ({e}), falling back to CPU targets");
                GpuContext::NotAvailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, GpuContext::Available { .. })
    }
}

/// Align to WebGPU's required bytes-per-row for texture copies.
#[inline]
pub fn align_copy_bpr(unpadded: u32) -> u32 {
    let a = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    ((unpadded + a - 1) / a) * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_row_alignment() {
        assert_eq!(align_copy_bpr(256), 256);
        assert_eq!(align_copy_bpr(257), 512);
        assert_eq!(align_copy_bpr(1), 256);
    }
}

// src/targets.rs
// Render target set: one primary accumulation target plus two ping-pong
// blend targets for alpha compositing. GPU-backed when a device exists,
// CPU float buffers otherwise, behind the same interface.
// RELEVANT FILES:src/gpu.rs,src/scheduler.rs,src/backend.rs

use std::sync::Arc;

use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Which physical surface a tile render writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    Primary,
    /// Blend target selected by the current ping-pong parity
    Blend(bool),
}

enum TargetBackend {
    Gpu {
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        primary: wgpu::Texture,
        blend: [wgpu::Texture; 2],
    },
    Cpu {
        /// RGBA f32, row-major
        primary: Vec<f32>,
        blend: [Vec<f32>; 2],
    },
}

/// Accumulation surfaces, allocated 1x1 and resized on demand.
///
/// Alpha output cannot be accumulated in place with opaque blending, so
/// passes that carry transparency composite through the two blend
/// targets, swapping read/write roles each pass to avoid aliasing.
pub struct RenderTargetSet {
    backend: TargetBackend,
    width: u32,
    height: u32,
    blend_parity: bool,
    disposed: bool,
}

impl RenderTargetSet {
    pub fn new(gpu: &GpuContext) -> Self {
        let backend = match gpu {
            GpuContext::Available { device, queue } => TargetBackend::Gpu {
                primary: create_target(device, 1, 1, "accum-primary"),
                blend: [
                    create_target(device, 1, 1, "accum-blend-0"),
                    create_target(device, 1, 1, "accum-blend-1"),
                ],
                device: Arc::clone(device),
                queue: Arc::clone(queue),
            },
            GpuContext::NotAvailable => TargetBackend::Cpu {
                primary: vec![0.0; 4],
                blend: [vec![0.0; 4], vec![0.0; 4]],
            },
        };
        Self {
            backend,
            width: 1,
            height: 1,
            blend_parity: false,
            disposed: false,
        }
    }

    fn check_alive(&self) -> Result<()> {
        if self.disposed {
            Err(RenderError::Disposed("render target set"))
        } else {
            Ok(())
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Reallocates all three targets when the size changed. Returns true
    /// on reallocation; contents are undefined afterwards, so callers
    /// reset accumulation.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<bool> {
        self.check_alive()?;
        let width = width.max(1);
        let height = height.max(1);
        if width == self.width && height == self.height {
            return Ok(false);
        }
        match &mut self.backend {
            TargetBackend::Gpu {
                device,
                primary,
                blend,
                ..
            } => {
                primary.destroy();
                blend[0].destroy();
                blend[1].destroy();
                *primary = create_target(device, width, height, "accum-primary");
                *blend = [
                    create_target(device, width, height, "accum-blend-0"),
                    create_target(device, width, height, "accum-blend-1"),
                ];
            }
            TargetBackend::Cpu { primary, blend } => {
                let len = (width * height * 4) as usize;
                *primary = vec![0.0; len];
                *blend = [vec![0.0; len], vec![0.0; len]];
            }
        }
        self.width = width;
        self.height = height;
        Ok(true)
    }

    /// Clears every target to transparent black
    pub fn clear(&mut self) -> Result<()> {
        self.check_alive()?;
        match &mut self.backend {
            TargetBackend::Gpu {
                device,
                queue,
                primary,
                blend,
            } => {
                let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("target-clear"),
                });
                for texture in [&*primary, &blend[0], &blend[1]] {
                    clear_pass(&mut encoder, texture);
                }
                queue.submit([encoder.finish()]);
            }
            TargetBackend::Cpu { primary, blend } => {
                primary.fill(0.0);
                blend[0].fill(0.0);
                blend[1].fill(0.0);
            }
        }
        Ok(())
    }

    /// Current ping-pong parity: `false` means blend[0] is the write
    /// target, `true` means blend[1]
    pub fn blend_parity(&self) -> bool {
        self.blend_parity
    }

    /// Swap blend target roles; called once per completed sample pass
    pub fn swap_blend(&mut self) {
        self.blend_parity = !self.blend_parity;
    }

    pub fn reset_parity(&mut self) {
        self.blend_parity = false;
    }

    /// CPU pixel access (None on the GPU backend); RGBA f32 row-major
    pub fn cpu_pixels(&self, role: TargetRole) -> Option<&[f32]> {
        match &self.backend {
            TargetBackend::Cpu { primary, blend } => Some(match role {
                TargetRole::Primary => primary.as_slice(),
                TargetRole::Blend(parity) => blend[parity as usize].as_slice(),
            }),
            TargetBackend::Gpu { .. } => None,
        }
    }

    pub fn cpu_pixels_mut(&mut self, role: TargetRole) -> Option<&mut [f32]> {
        match &mut self.backend {
            TargetBackend::Cpu { primary, blend } => Some(match role {
                TargetRole::Primary => primary.as_mut_slice(),
                TargetRole::Blend(parity) => blend[parity as usize].as_mut_slice(),
            }),
            TargetBackend::Gpu { .. } => None,
        }
    }

    /// GPU texture access (None on the CPU backend)
    pub fn texture(&self, role: TargetRole) -> Option<&wgpu::Texture> {
        match &self.backend {
            TargetBackend::Gpu { primary, blend, .. } => Some(match role {
                TargetRole::Primary => primary,
                TargetRole::Blend(parity) => &blend[parity as usize],
            }),
            TargetBackend::Cpu { .. } => None,
        }
    }

    /// Releases target memory. Any later operation fails with
    /// `RenderError::Disposed`.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let TargetBackend::Gpu {
            primary, blend, ..
        } = &self.backend
        {
            primary.destroy();
            blend[0].destroy();
            blend[1].destroy();
        }
        if let TargetBackend::Cpu { primary, blend } = &mut self.backend {
            primary.clear();
            primary.shrink_to_fit();
            for b in blend.iter_mut() {
                b.clear();
                b.shrink_to_fit();
            }
        }
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

fn create_target(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn clear_pass(encoder: &mut wgpu::CommandEncoder, texture: &wgpu::Texture) {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("target-clear-pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

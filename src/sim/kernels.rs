// smoothing kernels shared (in semantics) with the WGSL compute passes
use std::f32::consts::PI;

/// Normalization factors precomputed from the smoothing radius. The GPU passes
/// receive these as uniforms instead of recomputing `pow` per particle. They
/// are plain fields so the tuning variants that scale them differently stay a
/// configuration concern.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelScales {
    /// Spiky² kernel, used by the density pass.
    pub spiky_pow2: f32,
    /// Derivative of Spiky², used by the pressure gradient.
    pub spiky_pow2_derivative: f32,
    /// Poly6 kernel, used as the viscosity weight.
    pub poly6: f32,
}

impl KernelScales {
    pub fn for_radius(h: f32) -> Self {
        Self {
            spiky_pow2: 6.0 / (PI * h.powi(4)),
            spiky_pow2_derivative: 12.0 / (PI * h.powi(4)),
            poly6: 4.0 / (PI * h.powi(8)),
        }
    }
}

/// Spiky²: scale * (h - d)² for d < h, else 0.
#[inline]
pub fn density_kernel(dst: f32, h: f32, scale: f32) -> f32 {
    if dst < h {
        let v = h - dst;
        v * v * scale
    } else {
        0.0
    }
}

/// Slope of the density kernel; negative inside the support radius.
#[inline]
pub fn density_derivative(dst: f32, h: f32, scale: f32) -> f32 {
    if dst < h { -(h - dst) * scale } else { 0.0 }
}

/// Poly6 on the squared distance: scale * (h² - d²)³ for d² < h², else 0.
#[inline]
pub fn viscosity_kernel(dst2: f32, h: f32, scale: f32) -> f32 {
    let h2 = h * h;
    if dst2 < h2 {
        let v = h2 - dst2;
        v * v * v * scale
    } else {
        0.0
    }
}

//! Data-parallel compute devices.
//!
//! Two kernels run on a device: spring relaxation over a flattened
//! [`RelaxProblem`] and one pass of the grid Fast Iterative Method. Host and
//! device alternate under a [`PhaseProtocol`]: a parallel phase on the
//! device, a barrier that brings results back, then a sequential phase on
//! the host (projection, flips, active-list rebuild) before the next
//! parallel phase.
//!
//! [`CpuDevice`] runs both kernels on rayon and is always available.
//! With the `gpu` feature, `WgpuDevice` runs them as WGSL compute shaders in
//! single precision. [`select_device`] falls back to the CPU device when no
//! adapter can be found or a shader fails to build.

mod cpu;
mod hybrid;
#[cfg(feature = "gpu")]
mod wgpu_device;

use nalgebra::Point2;

use crate::algo::eikmesh::RelaxProblem;
use crate::algo::eikonal::{CellGrid, FimPass, UpdateOrder};
use crate::error::DeviceError;

pub use cpu::CpuDevice;
pub use hybrid::{DeviceFimSolver, HybridEikMesh, HybridOptions};
#[cfg(feature = "gpu")]
pub use wgpu_device::WgpuDevice;

/// A device that runs the relaxation and iterative-update kernels.
///
/// Relaxation state is uploaded once per cycle and then stepped in place;
/// the topology and desired lengths stay fixed until the next upload.
pub trait ComputeDevice: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Upload positions, adjacency and desired lengths.
    fn upload_relax(&mut self, problem: &RelaxProblem) -> Result<(), DeviceError>;

    /// Advance the uploaded positions by `steps` relaxation steps.
    fn relax_steps(&mut self, steps: usize) -> Result<(), DeviceError>;

    /// Read the current positions back, one per uploaded slot.
    fn download_positions(&mut self) -> Result<Vec<Point2<f64>>, DeviceError>;

    /// Compute one iterative-method pass over `active` without touching `grid`.
    fn fim_pass(
        &mut self,
        grid: &CellGrid,
        active: &[usize],
        order: UpdateOrder,
        tolerance: f64,
    ) -> Result<FimPass, DeviceError>;
}

/// Pick the best available device.
///
/// With `prefer_gpu` and the `gpu` feature enabled, a wgpu device is tried
/// first; any failure is logged and the CPU device is returned instead.
pub fn select_device(prefer_gpu: bool) -> Box<dyn ComputeDevice> {
    if prefer_gpu {
        #[cfg(feature = "gpu")]
        match WgpuDevice::new() {
            Ok(device) => {
                tracing::info!(device = device.name(), "using GPU compute device");
                return Box::new(device);
            }
            Err(err) => {
                tracing::warn!(error = %err, "GPU device unavailable; falling back to CPU");
            }
        }
        #[cfg(not(feature = "gpu"))]
        tracing::warn!("built without the gpu feature; falling back to CPU");
    }
    Box::new(CpuDevice::new())
}

/// Phase of a host/device cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No cycle in progress.
    #[default]
    Idle,
    /// Kernels running on the device.
    Parallel,
    /// Results synchronized to the host.
    Barrier,
    /// Host-side mutation.
    Sequential,
}

impl Phase {
    /// Lower-case name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Parallel => "parallel",
            Phase::Barrier => "barrier",
            Phase::Sequential => "sequential",
        }
    }
}

/// Enforces `parallel -> barrier -> sequential` ordering.
///
/// A parallel phase may start from idle or after a sequential phase. Any
/// other transition is a [`DeviceError::PhaseViolation`] and leaves the
/// phase unchanged.
#[derive(Debug, Clone, Default)]
pub struct PhaseProtocol {
    phase: Phase,
    cycles: usize,
}

impl PhaseProtocol {
    /// A protocol in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Completed parallel phases.
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Enter the parallel phase.
    pub fn begin_parallel(&mut self) -> Result<(), DeviceError> {
        self.transition("begin parallel phase", &[Phase::Idle, Phase::Sequential], Phase::Parallel)
    }

    /// Synchronize device results to the host.
    pub fn barrier(&mut self) -> Result<(), DeviceError> {
        self.transition("synchronize", &[Phase::Parallel], Phase::Barrier)?;
        self.cycles += 1;
        Ok(())
    }

    /// Enter the sequential phase.
    pub fn begin_sequential(&mut self) -> Result<(), DeviceError> {
        self.transition("begin sequential phase", &[Phase::Barrier], Phase::Sequential)
    }

    /// Return to idle after a sequential phase.
    pub fn finish(&mut self) -> Result<(), DeviceError> {
        self.transition("finish", &[Phase::Idle, Phase::Sequential], Phase::Idle)
    }

    /// Abandon the current cycle and return to idle.
    pub fn abort(&mut self) {
        if self.phase != Phase::Idle {
            tracing::debug!(phase = self.phase.name(), "phase cycle aborted");
        }
        self.phase = Phase::Idle;
    }

    fn transition(&mut self, action: &'static str, from: &[Phase], to: Phase) -> Result<(), DeviceError> {
        if !from.contains(&self.phase) {
            return Err(DeviceError::PhaseViolation {
                action,
                phase: self.phase.name(),
            });
        }
        self.phase = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_accepts_full_cycles() {
        let mut protocol = PhaseProtocol::new();
        for _ in 0..3 {
            protocol.begin_parallel().unwrap();
            protocol.barrier().unwrap();
            protocol.begin_sequential().unwrap();
        }
        protocol.finish().unwrap();
        assert_eq!(protocol.phase(), Phase::Idle);
        assert_eq!(protocol.cycles(), 3);
    }

    #[test]
    fn test_protocol_rejects_out_of_order_steps() {
        let mut protocol = PhaseProtocol::new();
        assert!(matches!(
            protocol.barrier(),
            Err(DeviceError::PhaseViolation { phase: "idle", .. })
        ));
        assert!(protocol.begin_sequential().is_err());

        protocol.begin_parallel().unwrap();
        // Host mutation without synchronizing first
        assert!(matches!(
            protocol.begin_sequential(),
            Err(DeviceError::PhaseViolation { phase: "parallel", .. })
        ));
        assert!(protocol.begin_parallel().is_err());
        assert!(protocol.finish().is_err());
        assert_eq!(protocol.phase(), Phase::Parallel);

        protocol.barrier().unwrap();
        assert!(protocol.begin_parallel().is_err());
        protocol.begin_sequential().unwrap();
        assert_eq!(protocol.cycles(), 1);
    }

    #[test]
    fn test_select_device_without_gpu_preference() {
        let device = select_device(false);
        assert_eq!(device.name(), "cpu");
    }
}
